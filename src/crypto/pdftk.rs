//! pdftk – protects a PDF by piping it through `pdftk - output -`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::command::CommandLine;
use crate::config::{Options, Permission, Permissions};
use crate::crypto::{CryptoEngine, CryptoJob};
use crate::engine::{settings, ToolSettings};
use crate::error::{PdfError, Result};
use crate::process::resolve_binary;

const DEFAULT_BINARY: &str = "pdftk";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Settings {
    #[serde(flatten)]
    tool: ToolSettings,
}

#[derive(Debug)]
pub struct PdftkCrypto {
    settings: Settings,
}

/// pdftk's name for a permission tag.
fn allow_flag(permission: Permission) -> &'static str {
    match permission {
        Permission::Print => "Printing",
        Permission::DegradedPrint => "DegradedPrinting",
        Permission::Modify => "ModifyContents",
        Permission::Assembly => "Assembly",
        Permission::CopyContents => "CopyContents",
        Permission::ScreenReaders => "ScreenReaders",
        Permission::Annotate => "ModifyAnnotations",
        Permission::FillIn => "FillIn",
    }
}

impl PdftkCrypto {
    pub const NAME: &'static str = "Pdftk";

    pub fn from_options(options: &Options) -> Result<Self> {
        Ok(Self {
            settings: settings(Self::NAME, options)?,
        })
    }

    pub fn binary(&self) -> &str {
        self.settings.tool.binary_or(DEFAULT_BINARY)
    }

    /// Build the pdftk invocation. Fails when the passwords are missing or
    /// identical.
    pub fn command(&self, program: &str, job: &CryptoJob<'_>) -> Result<CommandLine> {
        let config = job.config;
        config.check_passwords()?;

        let mut line = CommandLine::new(program);
        line.literal("-").literal("output").literal("-");
        if let Some(owner) = config.owner_password().filter(|p| !p.is_empty()) {
            line.literal("owner_pw").value(owner);
        }
        if let Some(user) = config.user_password().filter(|p| !p.is_empty()) {
            line.literal("user_pw").value(user);
        }

        let allowed: Vec<&str> = match config.permissions() {
            Permissions::None => Vec::new(),
            Permissions::All => vec!["AllFeatures"],
            Permissions::Only(list) => list.iter().map(|p| allow_flag(*p)).collect(),
        };
        if !allowed.is_empty() {
            line.literal("allow");
            for flag in allowed {
                line.literal(flag);
            }
        }
        Ok(line)
    }
}

impl CryptoEngine for PdftkCrypto {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn permission_implemented(&self, _permission: Permission) -> bool {
        // Every tag has a pdftk counterpart.
        true
    }

    fn encrypt(&self, job: &CryptoJob<'_>) -> Result<Vec<u8>> {
        let binary = resolve_binary(self.binary())?;
        let command = self.command(&binary.to_string_lossy(), job)?;
        let output = self
            .settings
            .tool
            .runner(job.cancel)
            .run(&command, job.pdf)?;

        if !output.success() {
            return Err(PdfError::ExternalTool {
                tool: "pdftk".into(),
                reason: "could not protect the document".into(),
                exit_code: output.exit_code,
                stderr: output.stderr,
                command: Some(command.to_string()),
            });
        }
        if output.stdout.is_empty() {
            return Err(PdfError::EmptyOutput {
                tool: "pdftk".into(),
            });
        }
        Ok(output.stdout)
    }

    fn fingerprint(&self) -> Value {
        serde_json::to_value(&self.settings).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderConfig;
    use pretty_assertions::assert_eq;

    fn command(config: &RenderConfig) -> Result<String> {
        let crypto = PdftkCrypto::from_options(&Options::new())?;
        Ok(crypto
            .command("pdftk", &CryptoJob::new(b"%PDF-", config))?
            .to_string())
    }

    #[test]
    fn passwords_and_permission_list() {
        let config = RenderConfig::default()
            .with_protection(Some("user"), Some("owner"))
            .with_permissions(Permissions::Only(vec![
                Permission::Print,
                Permission::Annotate,
                Permission::FillIn,
            ]));
        assert_eq!(
            command(&config).unwrap(),
            "pdftk - output - owner_pw 'owner' user_pw 'user' \
             allow Printing ModifyAnnotations FillIn"
        );
    }

    #[test]
    fn all_permissions() {
        let config = RenderConfig::default()
            .with_protection(None, Some("owner"))
            .with_permissions(Permissions::All);
        assert_eq!(
            command(&config).unwrap(),
            "pdftk - output - owner_pw 'owner' allow AllFeatures"
        );
    }

    #[test]
    fn no_permissions_omits_allow() {
        let config = RenderConfig::default().with_protection(Some("only-user"), None);
        assert_eq!(command(&config).unwrap(), "pdftk - output - user_pw 'only-user'");
    }

    #[test]
    fn password_rules_are_checked_before_running() {
        let none = RenderConfig::default().with_protection(None, None);
        assert!(matches!(command(&none), Err(PdfError::Configuration(_))));

        let same = RenderConfig::default().with_protection(Some("pw"), Some("pw"));
        let err = command(&same).unwrap_err();
        assert!(err.to_string().contains("cannot be the same"));
    }

    #[test]
    fn every_permission_is_implemented() {
        let crypto = PdftkCrypto::from_options(&Options::new()).unwrap();
        assert!(Permission::ALL
            .into_iter()
            .all(|p| crypto.permission_implemented(p)));
        assert_eq!(allow_flag(Permission::DegradedPrint), "DegradedPrinting");
    }
}
