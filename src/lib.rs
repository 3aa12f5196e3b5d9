//! # pdf-relay – pluggable HTML → PDF rendering
//!
//! This crate turns an HTML string into PDF bytes by handing it to one of
//! several render engines, then optionally protects the result with a
//! crypto engine. The moving parts are:
//!
//! 1. **Configure** – option maps → [`RenderConfig`] ([`config`])
//! 2. **Resolve** – names or descriptors → engines ([`registry`])
//! 3. **Command** – configuration → argument vector ([`command`])
//! 4. **Run** – child process with concurrent pipes ([`process`])
//! 5. **Render** – wkhtmltopdf, PrinceXML, builtin, remote service ([`engine`])
//! 6. **Protect** – pdftk ([`crypto`])
//!
//! [`Pdf`] ties them together and adds caching ([`cache`]).

pub mod cache;
pub mod command;
pub mod config;
pub mod crypto;
pub mod document;
pub mod engine;
pub mod error;
pub mod process;
pub mod registry;
pub mod staging;

// Re-exports for convenience
pub use cache::{CacheRegistry, DirectoryCache, MemoryCache, PdfCache};
pub use config::{Banner, Margins, Options, Orientation, Permission, Permissions, RenderConfig};
pub use crypto::{CryptoEngine, CryptoJob};
pub use document::{Pdf, PdfBuilder};
pub use engine::{RenderEngine, RenderJob};
pub use error::{ErrorClass, PdfError, Result};
pub use process::{CancelToken, SuccessPolicy};
pub use registry::{CryptoDescriptor, EngineDescriptor, PluginDescriptor, Registry};
