//! OpenGraph preview image generation

use crate::error::{Result, ServiceError};
use crate::render::Renderer;
use crate::types::OpenGraphRequest;
use artifact_cache::{ArtifactCache, ComputeError, KeyDeriver, LookupResult, RequestContext};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Generates cached PNG previews from request contexts
pub struct ImageService {
    cache: ArtifactCache,
    keys: KeyDeriver,
    renderer: Arc<dyn Renderer>,
    template_dir: PathBuf,
    default_template: String,
}

impl ImageService {
    pub fn new(
        cache: ArtifactCache,
        keys: KeyDeriver,
        renderer: Arc<dyn Renderer>,
        template_dir: PathBuf,
        default_template: String,
    ) -> Self {
        Self {
            cache,
            keys,
            renderer,
            template_dir,
            default_template,
        }
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// The canonical context for a request, with the template default applied
    pub fn context_for(&self, request: OpenGraphRequest) -> RequestContext {
        let mut ctx: RequestContext = request.extra.into_iter().collect();
        ctx.insert("icon", request.icon);
        ctx.insert("title", request.title);
        ctx.insert("img", request.img);
        if let Some(template) = request.template {
            ctx.insert("template", template);
        }
        ctx.with_default("template", self.default_template.as_str())
    }

    pub async fn generate(&self, request: OpenGraphRequest) -> Result<LookupResult> {
        let ctx = self.context_for(request);

        let has_content = ["icon", "title", "img"]
            .iter()
            .any(|field| ctx.get(field).is_some_and(|v| !v.trim().is_empty()));
        if !has_content {
            debug!("Image request has no content");
            return Ok(self.cache.record_empty());
        }

        let template_name = ctx.get("template").unwrap_or(&self.default_template);
        let template = resolve_template(&self.template_dir, template_name)?;

        let key = self.keys.derive(&ctx);
        debug!(key = %key, template = %template_name, "Generating image");

        let renderer = Arc::clone(&self.renderer);
        let result = self
            .cache
            .get_or_compute(&key, || async move {
                renderer
                    .render(&template, &ctx)
                    .await
                    .map_err(ComputeError::from)
            })
            .await?;
        Ok(result)
    }
}

/// Resolve a template name inside `dir`, rejecting anything but a bare file name
pub fn resolve_template(dir: &Path, name: &str) -> Result<PathBuf> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(file)), None) => Ok(dir.join(file)),
        _ => Err(ServiceError::InvalidTemplate(name.to_string())),
    }
}

/// Request used by the `/demo` route
pub fn demo_request() -> OpenGraphRequest {
    OpenGraphRequest {
        icon: "https://news.su6.nl/static/icons/nu.svg".to_string(),
        title: "Door deze ontdekking gaat je telefoon straks tot twee keer zo lang mee"
            .to_string(),
        img: concat!(
            "https://media.nu.nl/m/zh2x98aada6s_sqr256.jpg/",
            "door-deze-ontdekking-gaat-je-telefoon-straks-tot-twee-keer-zo-lang-mee.jpg"
        )
        .to_string(),
        ..OpenGraphRequest::default()
    }
}
