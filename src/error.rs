//! Error taxonomy for rendering and protection.
//!
//! Every failure is one of four kinds so callers can branch on the kind
//! rather than on message text. Captured stderr and command lines are kept
//! out of `Display`: they can echo the document title or header/footer text.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PdfError>;

/// How the calling application should present a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Operator configuration is wrong ("server misconfigured").
    Misconfigured,
    /// The external tool or library failed ("rendering failed").
    RenderFailed,
}

#[derive(Debug, Error)]
pub enum PdfError {
    /// Invalid or missing setup, detected before any tool runs.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A name or descriptor did not resolve to a usable engine.
    #[error("resolution error: {0}")]
    Resolution(String),

    /// The external tool (or library) failed.
    #[error("{tool} failed: {reason}{}", exit_suffix(.exit_code))]
    ExternalTool {
        tool: String,
        reason: String,
        exit_code: Option<i32>,
        stderr: String,
        command: Option<String>,
    },

    /// The tool completed but wrote nothing to stdout.
    #[error("{tool} did not return any data")]
    EmptyOutput { tool: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_suffix(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" (exit code {code})"),
        None => String::new(),
    }
}

impl PdfError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn resolution(msg: impl Into<String>) -> Self {
        Self::Resolution(msg.into())
    }

    /// An external tool failure without process details (library and
    /// remote-service variants).
    pub fn tool(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExternalTool {
            tool: tool.into(),
            reason: reason.into(),
            exit_code: None,
            stderr: String::new(),
            command: None,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Configuration(_) | Self::Resolution(_) => ErrorClass::Misconfigured,
            Self::ExternalTool { .. } | Self::EmptyOutput { .. } | Self::Io(_) => {
                ErrorClass::RenderFailed
            }
        }
    }

    /// Sensitive detail for logs: the command that ran and its stderr.
    ///
    /// Returns `None` for errors that carry no process detail.
    pub fn diagnostics(&self) -> Option<String> {
        match self {
            Self::ExternalTool {
                stderr, command, ..
            } => {
                let mut out = String::new();
                if let Some(cmd) = command {
                    out.push_str("command: ");
                    out.push_str(cmd);
                }
                if !stderr.is_empty() {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str("stderr: ");
                    out.push_str(stderr.trim_end());
                }
                (!out.is_empty()).then_some(out)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_hides_command_and_stderr() {
        let err = PdfError::ExternalTool {
            tool: "wkhtmltopdf".into(),
            reason: "system error".into(),
            exit_code: Some(1),
            stderr: "Loading 'Secret title'".into(),
            command: Some("wkhtmltopdf --title 'Secret title' - -".into()),
        };
        let shown = err.to_string();
        assert_eq!(shown, "wkhtmltopdf failed: system error (exit code 1)");
        assert!(!shown.contains("Secret"));

        let diag = err.diagnostics().unwrap();
        assert!(diag.contains("--title 'Secret title'"));
        assert!(diag.contains("stderr: Loading"));
    }

    #[test]
    fn classes() {
        assert_eq!(PdfError::config("x").class(), ErrorClass::Misconfigured);
        assert_eq!(PdfError::resolution("x").class(), ErrorClass::Misconfigured);
        assert_eq!(PdfError::tool("t", "boom").class(), ErrorClass::RenderFailed);
        let empty = PdfError::EmptyOutput { tool: "t".into() };
        assert_eq!(empty.class(), ErrorClass::RenderFailed);
        assert_eq!(empty.to_string(), "t did not return any data");
        assert!(empty.diagnostics().is_none());
    }
}
