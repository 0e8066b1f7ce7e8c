//! Payload normalization for URL-embedded text
//!
//! Payloads arrive as a single URL path segment, so they cannot carry
//! literal spaces or the URL-reserved base64 characters. Each transport
//! encoding is undone here before the payload is hashed.

use crate::error::DecodeError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::str::FromStr;

/// Transport encoding of a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// Plain text with `_` standing in for spaces
    #[default]
    Raw,
    /// Standard base64 with `+`, `/` and `=` written as `.`, `_` and `-`
    Base64,
    /// Bitcoin-alphabet base58
    Base58,
}

impl Encoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Raw => "raw",
            Encoding::Base64 => "b64",
            Encoding::Base58 => "b58",
        }
    }
}

impl FromStr for Encoding {
    type Err = DecodeError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag {
            "" | "none" | "raw" => Ok(Encoding::Raw),
            "b64" => Ok(Encoding::Base64),
            "b58" => Ok(Encoding::Base58),
            other => Err(DecodeError::UnknownEncoding(other.to_string())),
        }
    }
}

/// Decoded payload bytes, the input to key derivation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedInput(Vec<u8>);

impl NormalizedInput {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_text(&self) -> Result<&str, DecodeError> {
        Ok(std::str::from_utf8(&self.0)?)
    }
}

/// Undo the transport encoding of `payload`.
///
/// An empty result is not an error; callers decide what empty input means.
pub fn normalize(payload: &str, encoding: Encoding) -> Result<NormalizedInput, DecodeError> {
    let bytes = match encoding {
        Encoding::Raw => payload.replace('_', " ").into_bytes(),
        Encoding::Base64 => decode_base64_url_custom(payload)?,
        Encoding::Base58 => bs58::decode(payload).into_vec()?,
    };
    Ok(NormalizedInput(bytes))
}

/// Decode the URL-safe base64 variant (`.` `_` `-` for `+` `/` `=`)
pub fn decode_base64_url_custom(payload: &str) -> Result<Vec<u8>, DecodeError> {
    let standard: String = payload
        .chars()
        .map(|c| match c {
            '.' => '+',
            '_' => '/',
            '-' => '=',
            other => other,
        })
        .collect();
    Ok(STANDARD.decode(standard)?)
}

/// Encode bytes with the URL-safe base64 variant accepted by [`normalize`]
pub fn encode_base64_url_custom(bytes: &[u8]) -> String {
    STANDARD
        .encode(bytes)
        .chars()
        .map(|c| match c {
            '+' => '.',
            '/' => '_',
            '=' => '-',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_replaces_underscores() {
        let input = normalize("hi_there", Encoding::Raw).unwrap();
        assert_eq!(input.to_text().unwrap(), "hi there");
    }

    #[test]
    fn test_base64_known_vector() {
        let input = normalize("aGk-", Encoding::Base64).unwrap();
        assert_eq!(input.as_bytes(), b"hi");
    }

    #[test]
    fn test_base64_substitutes_reserved_characters() {
        // 0xfb 0xff encodes to "+/8=" in the standard alphabet
        assert_eq!(encode_base64_url_custom(&[0xfb, 0xff]), "._8-");
        let input = normalize("._8-", Encoding::Base64).unwrap();
        assert_eq!(input.as_bytes(), &[0xfb, 0xff]);
    }

    #[test]
    fn test_base58_known_vector() {
        let input = normalize("8wr", Encoding::Base58).unwrap();
        assert_eq!(input.as_bytes(), b"hi");
    }

    #[test]
    fn test_round_trips() {
        let samples: Vec<Vec<u8>> = vec![
            b"hi".to_vec(),
            "Door deze ontdekking".as_bytes().to_vec(),
            vec![0x00, 0x89, 0xff, 0x00],
            (0u8..=255).collect(),
        ];

        for bytes in samples {
            let b64 = encode_base64_url_custom(&bytes);
            assert!(!b64.contains(['+', '/', '=']));
            assert_eq!(normalize(&b64, Encoding::Base64).unwrap().into_bytes(), bytes);

            let b58 = bs58::encode(&bytes).into_string();
            assert_eq!(normalize(&b58, Encoding::Base58).unwrap().into_bytes(), bytes);
        }
    }

    #[test]
    fn test_malformed_payloads_fail() {
        assert!(matches!(
            normalize("a", Encoding::Base64),
            Err(DecodeError::Base64(_))
        ));
        assert!(matches!(
            normalize("aGk", Encoding::Base64),
            Err(DecodeError::Base64(_))
        ));
        assert!(matches!(
            normalize("0OIl", Encoding::Base58),
            Err(DecodeError::Base58(_))
        ));
    }

    #[test]
    fn test_empty_payload_is_not_an_error() {
        for encoding in [Encoding::Raw, Encoding::Base64, Encoding::Base58] {
            assert!(normalize("", encoding).unwrap().is_empty());
        }
    }

    #[test]
    fn test_invalid_utf8_text() {
        let input = normalize(&encode_base64_url_custom(&[0x89]), Encoding::Base64).unwrap();
        assert!(matches!(input.to_text(), Err(DecodeError::InvalidUtf8(_))));
    }

    #[test]
    fn test_encoding_tags() {
        assert_eq!("none".parse::<Encoding>().unwrap(), Encoding::Raw);
        assert_eq!("b64".parse::<Encoding>().unwrap(), Encoding::Base64);
        assert_eq!("b58".parse::<Encoding>().unwrap(), Encoding::Base58);
        assert!("b32".parse::<Encoding>().is_err());
        assert_eq!(Encoding::Base58.as_str(), "b58");
    }
}
