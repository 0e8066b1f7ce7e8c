//! OpenGraph image rendering
//!
//! Templates are HTML files with `[[=field]]` placeholders. The filled page
//! is rasterized by `wkhtmltoimage` into a 1200x630 PNG.

use artifact_cache::RequestContext;
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// OpenGraph image size
pub const OG_WIDTH: u32 = 1200;
pub const OG_HEIGHT: u32 = 630;

#[derive(Debug)]
pub enum RenderError {
    Template(Box<std::io::Error>),
    Spawn(Box<std::io::Error>),
    Process { status: String, stderr: String },
    EmptyOutput,
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Template(err) => write!(f, "Failed to load template: {}", err),
            RenderError::Spawn(err) => write!(f, "Failed to run renderer: {}", err),
            RenderError::Process { status, stderr } => {
                write!(f, "Renderer exited with {}: {}", status, stderr)
            }
            RenderError::EmptyOutput => write!(f, "Renderer produced no image"),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Template(err) | RenderError::Spawn(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

/// Turns a template and request context into PNG bytes
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, template: &Path, ctx: &RequestContext) -> Result<Vec<u8>, RenderError>;
}

/// Renderer backed by the `wkhtmltoimage` binary
pub struct WkhtmlRenderer {
    binary: String,
}

impl WkhtmlRenderer {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn rasterize(&self, html: &str) -> Result<Vec<u8>, RenderError> {
        let width = OG_WIDTH.to_string();
        let height = OG_HEIGHT.to_string();

        let mut child = Command::new(&self.binary)
            .args(["--quiet", "--format", "png", "--encoding", "UTF-8"])
            .args(["--width", width.as_str(), "--height", height.as_str()])
            .args(["--crop-w", width.as_str(), "--crop-h", height.as_str()])
            .args(["-", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // A timed-out render must not leave the process behind
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RenderError::Spawn(Box::new(e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(html.as_bytes())
                .await
                .map_err(|e| RenderError::Spawn(Box::new(e)))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| RenderError::Spawn(Box::new(e)))?;

        if !output.status.success() {
            return Err(RenderError::Process {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        if output.stdout.is_empty() {
            return Err(RenderError::EmptyOutput);
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl Renderer for WkhtmlRenderer {
    async fn render(&self, template: &Path, ctx: &RequestContext) -> Result<Vec<u8>, RenderError> {
        let source = tokio::fs::read_to_string(template)
            .await
            .map_err(|e| RenderError::Template(Box::new(e)))?;

        let html = fill_template(&source, ctx);
        debug!(template = ?template, size = html.len(), "Rasterizing template");
        self.rasterize(&html).await
    }
}

/// Replace `[[=field]]` (or `[[ field ]]`) with the HTML-escaped field value.
/// Unknown fields render as nothing.
pub fn fill_template(template: &str, ctx: &RequestContext) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("[[") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let Some(end) = after.find("]]") else {
            out.push_str(&rest[start..]);
            return out;
        };

        let expr = after[..end].trim();
        let field = expr.strip_prefix('=').unwrap_or(expr).trim();
        if let Some(value) = ctx.get(field) {
            out.push_str(&escape_html(value));
        }
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    out
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            other => escaped.push(other),
        }
    }
    escaped
}
