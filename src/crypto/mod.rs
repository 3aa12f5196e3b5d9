//! Crypto engines – post-processing steps that password-protect a rendered
//! PDF and restrict what readers may do with it.

use serde_json::Value;

use crate::config::{Permission, RenderConfig};
use crate::error::Result;
use crate::process::CancelToken;

pub mod pdftk;

pub use pdftk::PdftkCrypto;

/// Everything one `encrypt()` call reads.
#[derive(Debug, Clone, Copy)]
pub struct CryptoJob<'a> {
    pub pdf: &'a [u8],
    pub config: &'a RenderConfig,
    pub cancel: Option<&'a CancelToken>,
}

impl<'a> CryptoJob<'a> {
    pub fn new(pdf: &'a [u8], config: &'a RenderConfig) -> Self {
        Self {
            pdf,
            config,
            cancel: None,
        }
    }
}

pub trait CryptoEngine: Send + Sync {
    /// Registry name of the implementation.
    fn name(&self) -> &str;

    /// Whether this engine can grant `permission`.
    fn permission_implemented(&self, permission: Permission) -> bool;

    /// Return the protected form of `job.pdf`.
    fn encrypt(&self, job: &CryptoJob<'_>) -> Result<Vec<u8>>;

    fn fingerprint(&self) -> Value {
        Value::Null
    }
}
