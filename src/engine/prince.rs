//! PrinceXML – commercial HTML/CSS typesetter, HTML on stdin.
//!
//! Any stderr output fails the render unless the success policy is
//! `lenient`; otherwise the default `standard` policy applies. When asked
//! to protect the output, Prince encrypts it itself and withholds
//! permissions with its `--disallow-*` flags.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::command::CommandLine;
use crate::config::{Options, Permission, Permissions};
use crate::engine::{settings, RenderEngine, RenderJob, ToolSettings};
use crate::error::{PdfError, Result};
use crate::process::{resolve_binary, SuccessPolicy};

const DEFAULT_BINARY: &str = "prince";

/// Permissions Prince can withhold, and the flag that withholds each.
const DISALLOW_FLAGS: [(Permission, &str); 4] = [
    (Permission::Print, "--disallow-print"),
    (Permission::Modify, "--disallow-modify"),
    (Permission::CopyContents, "--disallow-copy"),
    (Permission::Annotate, "--disallow-annotate"),
];

/// Document metadata and encryption strength.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Metadata {
    subject: Option<String>,
    author: Option<String>,
    keywords: Option<String>,
    creator: Option<String>,
    #[serde(alias = "key_bits")]
    key_bits: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Settings {
    #[serde(flatten)]
    tool: ToolSettings,
    /// Resolves relative links in the document.
    base_url: Option<String>,
    options: Metadata,
}

#[derive(Debug)]
pub struct PrinceXmlEngine {
    settings: Settings,
}

impl PrinceXmlEngine {
    pub const NAME: &'static str = "PrinceXml";

    pub fn from_options(options: &Options) -> Result<Self> {
        Ok(Self {
            settings: settings(Self::NAME, options)?,
        })
    }

    pub fn binary(&self) -> &str {
        self.settings.tool.binary_or(DEFAULT_BINARY)
    }

    pub fn command(&self, program: &str, job: &RenderJob<'_>) -> CommandLine {
        let config = job.config;
        let meta = &self.settings.options;
        let mut line = CommandLine::new(program);
        line.literal("--input=auto");
        if let Some(url) = &self.settings.base_url {
            line.value(format!("--baseurl={url}"));
        }
        line.literal("--javascript");
        if let Some(title) = config.title().filter(|t| !t.is_empty()) {
            line.value(format!("--pdf-title={title}"));
        }
        for (flag, value) in [
            ("pdf-subject", &meta.subject),
            ("pdf-author", &meta.author),
            ("pdf-keywords", &meta.keywords),
            ("pdf-creator", &meta.creator),
        ] {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                line.value(format!("--{flag}={value}"));
            }
        }

        let user = config.user_password().filter(|p| !p.is_empty());
        let owner = config.owner_password().filter(|p| !p.is_empty());
        if job.protect && (user.is_some() || owner.is_some()) {
            line.literal("--encrypt");
            if let Some(bits) = meta.key_bits {
                line.literal(format!("--key-bits={bits}"));
            }
            if let Some(user) = user {
                line.value(format!("--user-password={user}"));
            }
            if let Some(owner) = owner {
                line.value(format!("--owner-password={owner}"));
            }
            for (permission, flag) in DISALLOW_FLAGS {
                let granted = match config.permissions() {
                    Permissions::None => false,
                    Permissions::All => true,
                    Permissions::Only(list) => list.contains(&permission),
                };
                if !granted {
                    line.literal(flag);
                }
            }
        }

        line.literal("-").literal("-o").literal("-");
        line
    }
}

impl RenderEngine for PrinceXmlEngine {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn output(&self, job: &RenderJob<'_>) -> Result<Vec<u8>> {
        let binary = resolve_binary(self.binary())?;
        let command = self.command(&binary.to_string_lossy(), job);
        let output = self
            .settings
            .tool
            .runner(job.cancel)
            .run(&command, job.html.as_bytes())?;

        // Prince reports every problem on stderr, often with exit code 0,
        // so stderr is fatal under any policy but `lenient`.
        let policy = self.settings.tool.success_policy.unwrap_or(SuccessPolicy::Standard);
        if policy != SuccessPolicy::Lenient && !output.stderr.trim().is_empty() {
            return Err(PdfError::ExternalTool {
                tool: "prince".into(),
                reason: "reported errors".into(),
                exit_code: output.exit_code,
                stderr: output.stderr,
                command: Some(command.to_string()),
            });
        }
        policy.classify("prince", &command, output)
    }

    fn encrypts(&self) -> bool {
        true
    }

    fn permission_implemented(&self, permission: Permission) -> bool {
        DISALLOW_FLAGS.iter().any(|(p, _)| *p == permission)
    }

    fn fingerprint(&self) -> Value {
        serde_json::to_value(&self.settings).unwrap_or_default()
    }
}
