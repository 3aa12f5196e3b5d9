//! Orchestration: one [`Pdf`] holds a render configuration, the resolved
//! render engine and, when protection is requested, a crypto engine.
//!
//! ```no_run
//! use pdf_relay::{Pdf, PluginDescriptor};
//!
//! let pdf = Pdf::builder()
//!     .engine(PluginDescriptor::named("WkHtmlToPdf"))
//!     .option("title", "Quarterly report")
//!     .build()?;
//! let bytes = pdf.output("<h1>Q3</h1>")?;
//! # Ok::<(), pdf_relay::PdfError>(())
//! ```

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::cache::{CacheRegistry, PdfCache};
use crate::config::{merge_options, Options, Permission, Permissions, RenderConfig};
use crate::crypto::{CryptoEngine, CryptoJob};
use crate::engine::{RenderEngine, RenderJob};
use crate::error::{PdfError, Result};
use crate::process::CancelToken;
use crate::registry::{CryptoDescriptor, EngineDescriptor, PluginDescriptor, Registry};

/// Collects defaults, options and engine choices for a [`Pdf`].
///
/// Explicit options override defaults key by key. An engine or crypto
/// descriptor set on the builder wins over the `engine`/`crypto` option.
pub struct PdfBuilder {
    defaults: Options,
    options: Options,
    engine: Option<EngineDescriptor>,
    crypto: Option<CryptoDescriptor>,
    registry: Option<Arc<Registry>>,
    caches: Option<CacheRegistry>,
    cancel: Option<CancelToken>,
}

impl Default for PdfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self {
            defaults: Options::new(),
            options: Options::new(),
            engine: None,
            crypto: None,
            registry: None,
            caches: None,
            cancel: None,
        }
    }

    /// Process-wide defaults, applied under the explicit options.
    #[must_use]
    pub fn defaults(mut self, defaults: Options) -> Self {
        self.defaults = defaults;
        self
    }

    #[must_use]
    pub fn options(mut self, options: Options) -> Self {
        self.options.extend(options);
        self
    }

    #[must_use]
    pub fn option(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.options.insert(key.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn engine(mut self, engine: EngineDescriptor) -> Self {
        self.engine = Some(engine);
        self
    }

    #[must_use]
    pub fn crypto(mut self, crypto: CryptoDescriptor) -> Self {
        self.crypto = Some(crypto);
        self
    }

    #[must_use]
    pub fn registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    #[must_use]
    pub fn caches(mut self, caches: CacheRegistry) -> Self {
        self.caches = Some(caches);
        self
    }

    #[must_use]
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Validate everything and resolve the engines. No external tool runs.
    pub fn build(self) -> Result<Pdf> {
        let merged = merge_options(&self.defaults, &self.options);
        let config = RenderConfig::from_options(&merged)?;
        let registry = self.registry.unwrap_or_default();
        let caches = self.caches.unwrap_or_default();

        let engine = match self.engine {
            Some(descriptor) => descriptor,
            None => descriptor_option(&merged, "engine")?
                .ok_or_else(|| PdfError::config("no render engine configured"))?,
        };
        let engine = registry.resolve_engine(engine)?;

        let crypto = match self.crypto {
            Some(descriptor) => Some(descriptor),
            None => descriptor_option(&merged, "crypto")?,
        };
        let crypto = crypto
            .map(|descriptor| registry.resolve_crypto(descriptor))
            .transpose()?;

        let mut pdf = Pdf {
            config: RenderConfig::default(),
            engine,
            crypto,
            cache: None,
            registry,
            caches,
            cancel: self.cancel,
        };
        pdf.set_config(config)?;
        Ok(pdf)
    }
}

fn descriptor_option<T: ?Sized>(
    options: &Options,
    key: &str,
) -> Result<Option<PluginDescriptor<T>>> {
    match options.get(key) {
        None | Some(Value::Null) | Some(Value::Bool(false)) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(value) => PluginDescriptor::from_value(value).map(Some),
    }
}

/// A configured PDF renderer.
pub struct Pdf {
    config: RenderConfig,
    engine: Box<dyn RenderEngine>,
    crypto: Option<Box<dyn CryptoEngine>>,
    cache: Option<Arc<dyn PdfCache>>,
    registry: Arc<Registry>,
    caches: CacheRegistry,
    cancel: Option<CancelToken>,
}

impl fmt::Debug for Pdf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pdf")
            .field("engine", &self.engine.name())
            .field("crypto", &self.crypto.as_ref().map(|c| c.name()))
            .field("cache", &self.config.cache())
            .field("protect", &self.config.protect())
            .finish_non_exhaustive()
    }
}

impl Pdf {
    pub fn builder() -> PdfBuilder {
        PdfBuilder::new()
    }

    /// Shorthand for a builder with only explicit options.
    pub fn from_options(options: Options) -> Result<Self> {
        PdfBuilder::new().options(options).build()
    }

    /// Render `html` to PDF bytes, protecting them when configured to.
    ///
    /// With caching on, an identical earlier request is answered from the
    /// cache. Cache failures are logged and never fail the call.
    pub fn output(&self, html: &str) -> Result<Vec<u8>> {
        let key = self.cache.as_ref().map(|_| self.cache_key(html));
        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            match cache.read(key) {
                Ok(Some(pdf)) if !pdf.is_empty() => {
                    log::debug!("render cache hit {key}");
                    return Ok(pdf);
                }
                Ok(_) => log::debug!("render cache miss {key}"),
                Err(e) => log::warn!("render cache read failed: {e}"),
            }
        }

        let job = RenderJob {
            html,
            config: &self.config,
            cancel: self.cancel.as_ref(),
            protect: self.config.protect() && self.crypto.is_none(),
        };
        let mut pdf = self.engine.output(&job).inspect_err(|e| self.log_failure(e))?;
        log::info!("{} rendered {} bytes", self.engine.name(), pdf.len());

        if let Some(crypto) = self.crypto.as_ref().filter(|_| self.config.protect()) {
            let job = CryptoJob {
                pdf: &pdf,
                config: &self.config,
                cancel: self.cancel.as_ref(),
            };
            pdf = crypto.encrypt(&job).inspect_err(|e| self.log_failure(e))?;
            log::info!("{} protected the document", crypto.name());
        }

        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Err(e) = cache.write(key, &pdf) {
                log::warn!("render cache write failed: {e}");
            }
        }
        Ok(pdf)
    }

    /// Render `html` and write the bytes to `destination`. With
    /// `create_dirs`, missing parent directories are created first.
    pub fn write(&self, destination: impl AsRef<Path>, create_dirs: bool, html: &str) -> Result<()> {
        let destination = destination.as_ref();
        let pdf = self.output(html)?;
        if create_dirs {
            if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(destination, &pdf)?;
        log::debug!("wrote {} bytes to {}", pdf.len(), destination.display());
        Ok(())
    }

    /// Suggested download name: the `filename` option, else the title
    /// turned into a slug, else `document.pdf`.
    pub fn filename(&self) -> String {
        if let Some(name) = self.config.filename().filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        match self.config.title().map(slug).filter(|s| !s.is_empty()) {
            Some(slug) => format!("{slug}.pdf"),
            None => "document.pdf".to_string(),
        }
    }

    /// Whether the response layer should force a download.
    pub fn download(&self) -> bool {
        self.config.download()
    }

    /// Deterministic key over everything that shapes the output.
    pub fn cache_key(&self, html: &str) -> String {
        let material = json!({
            "engine": self.engine.name(),
            "engineOptions": self.engine.fingerprint(),
            "crypto": self.crypto.as_ref().map(|c| c.name()),
            "cryptoOptions": self.crypto.as_ref().map(|c| c.fingerprint()),
            "config": serde_json::to_value(&self.config).unwrap_or_default(),
            "html": html,
        });
        hex::encode(Sha256::digest(material.to_string().as_bytes()))
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn engine(&self) -> &dyn RenderEngine {
        self.engine.as_ref()
    }

    pub fn crypto(&self) -> Option<&dyn CryptoEngine> {
        self.crypto.as_deref()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Replace the render engine. Without a crypto engine, a protected
    /// configuration needs one that encrypts on its own.
    pub fn set_engine(&mut self, descriptor: EngineDescriptor) -> Result<()> {
        let engine = self.registry.resolve_engine(descriptor)?;
        check_protection(&self.config, engine.as_ref(), self.crypto.as_deref())?;
        self.engine = engine;
        Ok(())
    }

    /// Replace the crypto engine. The current permissions must still be
    /// grantable by the new one.
    pub fn set_crypto(&mut self, descriptor: CryptoDescriptor) -> Result<()> {
        let crypto = self.registry.resolve_crypto(descriptor)?;
        if self.config.protect() {
            check_permissions(&self.config, crypto.name(), |p| crypto.permission_implemented(p))?;
        }
        self.crypto = Some(crypto);
        Ok(())
    }

    /// Replace the render configuration after checking it against the
    /// engines and cache stores this `Pdf` holds.
    pub fn set_config(&mut self, config: RenderConfig) -> Result<()> {
        config.validate()?;
        check_protection(&config, self.engine.as_ref(), self.crypto.as_deref())?;
        let cache = config
            .cache()
            .map(|name| self.caches.get(name))
            .transpose()?;
        self.config = config;
        self.cache = cache;
        Ok(())
    }

    /// Command lines and stderr go to the debug log only.
    fn log_failure(&self, error: &PdfError) {
        if let Some(detail) = error.diagnostics() {
            log::debug!("{error}\n{detail}");
        }
    }
}

/// A protected configuration needs a crypto engine, or a render engine that
/// encrypts on its own, able to grant every requested permission.
fn check_protection(
    config: &RenderConfig,
    engine: &dyn RenderEngine,
    crypto: Option<&dyn CryptoEngine>,
) -> Result<()> {
    if !config.protect() {
        return Ok(());
    }
    match crypto {
        Some(crypto) => {
            check_permissions(config, crypto.name(), |p| crypto.permission_implemented(p))
        }
        None if engine.encrypts() => {
            check_permissions(config, engine.name(), |p| engine.permission_implemented(p))
        }
        None => Err(PdfError::config(
            "protection requested but no crypto engine is configured",
        )),
    }
}

fn check_permissions(
    config: &RenderConfig,
    name: &str,
    implemented: impl Fn(Permission) -> bool,
) -> Result<()> {
    if let Permissions::Only(list) = config.permissions() {
        if let Some(missing) = list.iter().find(|p| !implemented(**p)) {
            return Err(PdfError::config(format!(
                "permission not implemented in crypto engine {name}: {}",
                missing.as_str()
            )));
        }
    }
    Ok(())
}

/// Lowercase ASCII words joined by `-`.
fn slug(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: Arc<AtomicUsize>,
    }

    impl RenderEngine for Counting {
        fn name(&self) -> &str {
            "Counting"
        }

        fn output(&self, job: &RenderJob<'_>) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("%PDF-{}", job.html).into_bytes())
        }
    }

    /// Grants only printing.
    struct PrintOnly;

    impl CryptoEngine for PrintOnly {
        fn name(&self) -> &str {
            "PrintOnly"
        }

        fn permission_implemented(&self, permission: Permission) -> bool {
            permission == Permission::Print
        }

        fn encrypt(&self, job: &CryptoJob<'_>) -> Result<Vec<u8>> {
            let mut out = b"locked:".to_vec();
            out.extend_from_slice(job.pdf);
            Ok(out)
        }
    }

    fn counting() -> (EngineDescriptor, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = PluginDescriptor::Instance(Box::new(Counting {
            calls: calls.clone(),
        }) as Box<dyn RenderEngine>);
        (engine, calls)
    }

    fn options(value: Value) -> Options {
        let Value::Object(map) = value else {
            unreachable!()
        };
        map
    }

    #[test]
    fn missing_engine_is_a_configuration_error() {
        let err = Pdf::builder().build().unwrap_err();
        assert!(matches!(err, PdfError::Configuration(_)));
    }

    #[test]
    fn engine_from_options_and_defaults() {
        let pdf = Pdf::builder()
            .defaults(options(json!({"engine": "Builtin", "pageSize": "Letter"})))
            .option("pageSize", "A5")
            .build()
            .unwrap();
        assert_eq!(pdf.engine().name(), "Builtin");
        assert_eq!(pdf.config().page_size(), "A5");
    }

    #[test]
    fn protection_needs_a_crypto_engine() {
        let (engine, _) = counting();
        let err = Pdf::builder()
            .engine(engine)
            .option("protect", true)
            .option("ownerPassword", "secret")
            .build()
            .unwrap_err();
        assert!(matches!(err, PdfError::Configuration(_)));
    }

    #[test]
    fn unsupported_permission_is_rejected_at_build() {
        let (engine, _) = counting();
        let err = Pdf::builder()
            .engine(engine)
            .crypto(PluginDescriptor::Instance(Box::new(PrintOnly)))
            .options(options(json!({
                "protect": true,
                "ownerPassword": "secret",
                "permissions": ["print", "fill_in"]
            })))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("fill_in"));
    }

    #[test]
    fn protected_output_runs_crypto_after_render() {
        let (engine, _) = counting();
        let pdf = Pdf::builder()
            .engine(engine)
            .crypto(PluginDescriptor::Instance(Box::new(PrintOnly)))
            .options(options(json!({
                "protect": true,
                "userPassword": "u",
                "permissions": ["print"]
            })))
            .build()
            .unwrap();
        assert_eq!(pdf.output("x").unwrap(), b"locked:%PDF-x");
    }

    #[test]
    fn cache_answers_repeated_requests() {
        let (engine, calls) = counting();
        let store = Arc::new(MemoryCache::new(8));
        let mut caches = CacheRegistry::empty();
        caches.register("pdf", store.clone());
        let pdf = Pdf::builder()
            .engine(engine)
            .caches(caches)
            .option("cache", true)
            .build()
            .unwrap();

        assert_eq!(pdf.output("<p>a</p>").unwrap(), pdf.output("<p>a</p>").unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        pdf.output("<p>b</p>").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn unknown_cache_name_is_a_configuration_error() {
        let (engine, _) = counting();
        let err = Pdf::builder()
            .engine(engine)
            .option("cache", "redis")
            .build()
            .unwrap_err();
        assert!(matches!(err, PdfError::Configuration(_)));
    }

    #[test]
    fn cache_key_tracks_config_and_html() {
        let (engine, _) = counting();
        let mut pdf = Pdf::builder().engine(engine).build().unwrap();
        let a = pdf.cache_key("<p>a</p>");
        assert_eq!(a, pdf.cache_key("<p>a</p>"));
        assert_ne!(a, pdf.cache_key("<p>b</p>"));
        assert_eq!(a.len(), 64);

        pdf.set_config(pdf.config().clone().with_title("Other")).unwrap();
        assert_ne!(a, pdf.cache_key("<p>a</p>"));
    }

    #[test]
    fn filename_fallbacks() {
        let (engine, _) = counting();
        let mut pdf = Pdf::builder().engine(engine).build().unwrap();
        assert_eq!(pdf.filename(), "document.pdf");
        pdf.set_config(RenderConfig::default().with_title("Q3 Report: Final!"))
            .unwrap();
        assert_eq!(pdf.filename(), "q3-report-final.pdf");
        pdf.set_config(RenderConfig::default().with_filename("custom.pdf"))
            .unwrap();
        assert_eq!(pdf.filename(), "custom.pdf");
    }

    #[test]
    fn set_engine_replaces_the_engine() {
        let (engine, _) = counting();
        let mut pdf = Pdf::builder().engine(engine).build().unwrap();
        pdf.set_engine(PluginDescriptor::named("Builtin")).unwrap();
        assert_eq!(pdf.engine().name(), "Builtin");
        assert!(pdf.set_engine(PluginDescriptor::named("Nope")).is_err());
        assert_eq!(pdf.engine().name(), "Builtin");
    }

    #[test]
    fn write_creates_parent_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let (engine, _) = counting();
        let pdf = Pdf::builder().engine(engine).build().unwrap();
        let target = tmp.path().join("nested/dir/out.pdf");

        assert!(pdf.write(&target, false, "x").is_err());
        pdf.write(&target, true, "x").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"%PDF-x");
    }
}
