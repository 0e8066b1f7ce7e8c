//! Canonical cache keys
//!
//! A key is the SHA-256 digest of a canonical serialization of the request,
//! rendered as lowercase hex. It only identifies content for deduplication:
//! it is not an integrity check and makes no promise against crafted
//! collisions.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Length of a rendered key in hex characters
pub const KEY_LEN: usize = 64;

/// Hex digest identifying one artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse a rendered key, rejecting anything that is not 64 lowercase hex chars
    pub fn parse(s: &str) -> Option<Self> {
        let valid = s.len() == KEY_LEN
            && s
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(s.to_string()))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Named string fields describing one generation request.
///
/// Fields are kept sorted, so insertion order never affects the key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestContext(BTreeMap<String, String>);

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(field.into(), value.into())
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(field, value);
        self
    }

    /// Fill in `field` only when it is absent, so that omitting an optional
    /// field and passing its default produce the same key
    pub fn with_default(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.entry(field.into()).or_insert_with(|| value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Compact JSON with keys in lexicographic order
    pub fn canonical_json(&self) -> String {
        let object: serde_json::Map<String, serde_json::Value> = self
            .0
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        serde_json::Value::Object(object).to_string()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RequestContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl From<BTreeMap<String, String>> for RequestContext {
    fn from(fields: BTreeMap<String, String>) -> Self {
        Self(fields)
    }
}

impl From<HashMap<String, String>> for RequestContext {
    fn from(fields: HashMap<String, String>) -> Self {
        fields.into_iter().collect()
    }
}

/// Derives cache keys, optionally scoped to a namespace.
///
/// The namespace names the generating configuration (template set, voice,
/// build). Changing it moves every request to a fresh key, which retires old
/// entries without purging the store.
#[derive(Debug, Clone, Default)]
pub struct KeyDeriver {
    namespace: Option<String>,
}

impl KeyDeriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty namespace is the same as none
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            namespace: (!namespace.is_empty()).then_some(namespace),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn derive(&self, ctx: &RequestContext) -> CacheKey {
        self.derive_bytes(ctx.canonical_json().as_bytes())
    }

    pub fn derive_bytes(&self, bytes: &[u8]) -> CacheKey {
        let mut hasher = Sha256::new();
        if let Some(namespace) = &self.namespace {
            hasher.update(namespace.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(bytes);
        CacheKey(hex::encode(hasher.finalize()))
    }
}

/// Key for `ctx` without a namespace
pub fn derive(ctx: &RequestContext) -> CacheKey {
    KeyDeriver::new().derive(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn og_context() -> RequestContext {
        RequestContext::new()
            .with("icon", "a")
            .with("title", "b")
            .with("img", "c")
    }

    #[test]
    fn test_key_ignores_insertion_order() {
        let forward = og_context();
        let reversed = RequestContext::new()
            .with("img", "c")
            .with("title", "b")
            .with("icon", "a");

        assert_eq!(derive(&forward), derive(&reversed));
    }

    #[test]
    fn test_key_changes_with_any_field() {
        let base = derive(&og_context());

        for field in ["icon", "title", "img"] {
            let changed = og_context().with(field, "other");
            assert_ne!(derive(&changed), base, "changing {field} kept the key");
        }

        let extra = og_context().with("template", "template.html");
        assert_ne!(derive(&extra), base);
    }

    #[test]
    fn test_default_matches_explicit_value() {
        let omitted = og_context().with_default("template", "template.html");
        let explicit = og_context()
            .with("template", "template.html")
            .with_default("template", "template.html");
        let custom = og_context()
            .with("template", "dark.html")
            .with_default("template", "template.html");

        assert_eq!(derive(&omitted), derive(&explicit));
        assert_eq!(custom.get("template"), Some("dark.html"));
        assert_ne!(derive(&omitted), derive(&custom));
    }

    #[test]
    fn test_canonical_json_is_sorted_and_escaped() {
        let ctx = og_context().with("title", "say \"hi\"");
        assert_eq!(
            ctx.canonical_json(),
            r#"{"icon":"a","img":"c","title":"say \"hi\""}"#
        );
    }

    #[test]
    fn test_known_digest() {
        let key = KeyDeriver::new().derive_bytes(b"");
        assert_eq!(
            key.as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(key.as_str().len(), KEY_LEN);
    }

    #[test]
    fn test_namespace_scopes_keys() {
        let plain = KeyDeriver::new().derive_bytes(b"hi there");
        let v1 = KeyDeriver::with_namespace("v1").derive_bytes(b"hi there");
        let v2 = KeyDeriver::with_namespace("v2").derive_bytes(b"hi there");
        let blank = KeyDeriver::with_namespace("").derive_bytes(b"hi there");

        assert_ne!(plain, v1);
        assert_ne!(v1, v2);
        assert_eq!(plain, blank);

        assert_eq!(KeyDeriver::with_namespace("v1").namespace(), Some("v1"));
        assert_eq!(KeyDeriver::with_namespace("").namespace(), None);
    }

    #[test]
    fn test_parse_round_trips_rendered_keys() {
        let key = derive(&og_context());
        assert_eq!(CacheKey::parse(key.as_str()), Some(key));
        assert_eq!(CacheKey::parse("abc"), None);
        assert_eq!(CacheKey::parse(&"G".repeat(KEY_LEN)), None);
        assert_eq!(CacheKey::parse(&"A".repeat(KEY_LEN)), None);
    }

    #[test]
    fn test_context_from_hash_map() {
        let map: HashMap<String, String> = [("b", "2"), ("a", "1")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let ctx = RequestContext::from(map);

        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx.iter().next(), Some(("a", "1")));
    }
}
