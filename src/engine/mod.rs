//! Render engines – strategies that turn HTML plus a [`RenderConfig`] into
//! raw PDF bytes.
//!
//! Built-in variants:
//! - [`WkHtmlToPdfEngine`] – external process, HTML on stdin
//! - [`PrinceXmlEngine`] – external process, HTML on stdin
//! - [`BuiltinEngine`] – in-process rendering with `printpdf`
//! - [`RemoteServiceEngine`] – conversion web service client

use std::path::PathBuf;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{Options, Permission, RenderConfig};
use crate::error::{PdfError, Result};
use crate::process::{CancelToken, ProcessRunner, SuccessPolicy};

pub mod builtin;
pub mod prince;
pub mod remote;
pub mod wkhtmltopdf;

pub use builtin::BuiltinEngine;
pub use prince::PrinceXmlEngine;
pub use remote::{
    ClientError, ClientSpec, ConversionClient, HttpConversionClient, RemoteServiceEngine,
};
pub use wkhtmltopdf::WkHtmlToPdfEngine;

/// Everything one `output()` call reads.
#[derive(Debug, Clone, Copy)]
pub struct RenderJob<'a> {
    pub html: &'a str,
    pub config: &'a RenderConfig,
    pub cancel: Option<&'a CancelToken>,
    /// Ask an engine that can encrypt on its own to protect the output.
    /// Off whenever a separate crypto engine runs afterwards.
    pub protect: bool,
}

impl<'a> RenderJob<'a> {
    pub fn new(html: &'a str, config: &'a RenderConfig) -> Self {
        Self {
            html,
            config,
            cancel: None,
            protect: config.protect(),
        }
    }
}

/// The capability every render engine provides.
pub trait RenderEngine: Send + Sync {
    /// Registry name of the implementation.
    fn name(&self) -> &str;

    /// Produce raw PDF bytes. Stateless: each call depends only on `job`
    /// and the engine's own options.
    fn output(&self, job: &RenderJob<'_>) -> Result<Vec<u8>>;

    /// Whether the engine can password-protect its own output.
    fn encrypts(&self) -> bool {
        false
    }

    /// Whether native protection can grant `permission`.
    fn permission_implemented(&self, _permission: Permission) -> bool {
        false
    }

    /// Engine options that influence the output, folded into cache keys.
    fn fingerprint(&self) -> Value {
        Value::Null
    }
}

/// Process settings shared by every engine that shells out.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ToolSettings {
    /// Binary name (searched on `PATH`) or path.
    pub binary: Option<String>,
    /// Working directory of the child process.
    pub cwd: Option<PathBuf>,
    /// Kill the child after this many milliseconds.
    pub timeout: Option<u64>,
    pub success_policy: Option<SuccessPolicy>,
}

impl ToolSettings {
    pub fn binary_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.binary.as_deref().unwrap_or(default)
    }

    pub fn runner(&self, cancel: Option<&CancelToken>) -> ProcessRunner {
        ProcessRunner::new()
            .cwd(self.cwd.clone())
            .timeout(self.timeout.map(Duration::from_millis))
            .cancel_token(cancel.cloned())
    }
}

/// Deserialize an engine's option map into its typed settings.
pub(crate) fn settings<T: DeserializeOwned>(engine: &str, options: &Options) -> Result<T> {
    serde_json::from_value(Value::Object(options.clone()))
        .map_err(|e| PdfError::config(format!("invalid {engine} options: {e}")))
}
