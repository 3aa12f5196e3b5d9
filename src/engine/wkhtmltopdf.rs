//! wkhtmltopdf – headless WebKit print engine driven over stdin/stdout.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::command::{CommandBuilder, CommandLine};
use crate::config::{format_number, Banner, Options};
use crate::engine::{settings, RenderEngine, RenderJob, ToolSettings};
use crate::error::Result;
use crate::process::{resolve_binary, SuccessPolicy};
use crate::staging::Staging;

const DEFAULT_BINARY: &str = "wkhtmltopdf";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Settings {
    #[serde(flatten)]
    tool: ToolSettings,
    /// Passthrough flags, merged over the generated ones.
    options: Options,
    /// Where header/footer HTML fragments are staged.
    staging_dir: Option<PathBuf>,
}

#[derive(Debug)]
pub struct WkHtmlToPdfEngine {
    settings: Settings,
    staging: Staging,
}

impl WkHtmlToPdfEngine {
    pub const NAME: &'static str = "WkHtmlToPdf";

    pub fn from_options(options: &Options) -> Result<Self> {
        let settings: Settings = settings(Self::NAME, options)?;
        let staging = settings
            .staging_dir
            .clone()
            .map(Staging::new)
            .unwrap_or_default();
        Ok(Self { settings, staging })
    }

    /// Binary as configured, before resolution.
    pub fn binary(&self) -> &str {
        self.settings.tool.binary_or(DEFAULT_BINARY)
    }

    /// Build the full command line for `job`, invoking `program`.
    pub fn command(&self, program: &str, job: &RenderJob<'_>) -> Result<CommandLine> {
        let config = job.config;
        let mut options = Options::new();
        options.insert("quiet".into(), json!(true));
        options.insert("print-media-type".into(), json!(true));
        options.insert("orientation".into(), json!(config.orientation().as_str()));
        options.insert("page-size".into(), json!(config.page_size()));
        options.insert("encoding".into(), json!(config.encoding()));
        options.insert("title".into(), json!(config.title()));
        options.insert("javascript-delay".into(), json!(config.delay()));
        options.insert("window-status".into(), json!(config.window_status()));
        for (side, margin) in config.margins().sides() {
            if let Some(mm) = margin {
                options.insert(
                    format!("margin-{side}"),
                    Value::String(format!("{}mm", format_number(mm))),
                );
            }
        }
        for (key, value) in &self.settings.options {
            options.insert(key.clone(), value.clone());
        }

        let mut builder = CommandBuilder::new(program).options(&options)?;
        self.banner(&mut builder, "footer", config.footer())?;
        self.banner(&mut builder, "header", config.header())?;
        // Read the page from stdin, write the PDF to stdout.
        builder.literal("-").literal("-");
        Ok(builder.build())
    }

    fn banner(&self, builder: &mut CommandBuilder, kind: &str, banner: &Banner) -> Result<()> {
        for (location, text) in banner.locations() {
            if let Some(text) = text {
                builder.literal(format!("--{kind}-{location}")).value(text);
            }
        }
        if let Some(html) = &banner.html {
            let path = self.staging.stage(html.as_bytes(), "html")?;
            builder
                .literal(format!("--{kind}-html"))
                .value(path.to_string_lossy());
        }
        Ok(())
    }
}

impl RenderEngine for WkHtmlToPdfEngine {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn output(&self, job: &RenderJob<'_>) -> Result<Vec<u8>> {
        let binary = resolve_binary(self.binary())?;
        let command = self.command(&binary.to_string_lossy(), job)?;
        let output = self
            .settings
            .tool
            .runner(job.cancel)
            .run(&command, job.html.as_bytes())?;
        self.settings
            .tool
            .success_policy
            .unwrap_or(SuccessPolicy::Standard)
            .classify("wkhtmltopdf", &command, output)
    }

    fn fingerprint(&self) -> Value {
        serde_json::to_value(&self.settings).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Margins, RenderConfig};
    use pretty_assertions::assert_eq;

    fn engine(options: Value) -> WkHtmlToPdfEngine {
        let Value::Object(map) = options else {
            unreachable!()
        };
        WkHtmlToPdfEngine::from_options(&map).unwrap()
    }

    fn command(engine: &WkHtmlToPdfEngine, config: &RenderConfig) -> Result<String> {
        let job = RenderJob::new("<p>x</p>", config);
        Ok(engine.command("wkhtmltopdf", &job)?.to_string())
    }

    #[test]
    fn overrides_keep_declared_order() {
        let engine = engine(json!({
            "options": {"quiet": false, "encoding": "ISO-8859-1"}
        }));
        let config = RenderConfig::default().with_title("Quarterly report");
        assert_eq!(
            command(&engine, &config).unwrap(),
            "wkhtmltopdf --print-media-type --orientation 'portrait' --page-size 'A4' \
             --encoding 'ISO-8859-1' --title 'Quarterly report' - -"
        );
    }

    #[test]
    fn margins_get_millimeter_suffix() {
        let engine = engine(json!({}));
        let config = RenderConfig::default()
            .with_title("Quarterly report")
            .with_margins(Margins::from_sides(Some(0.0), Some(0.0), Some(0.0), Some(0.0)));
        assert_eq!(
            command(&engine, &config).unwrap(),
            "wkhtmltopdf --quiet --print-media-type --orientation 'portrait' --page-size 'A4' \
             --encoding 'UTF-8' --title 'Quarterly report' --margin-bottom '0mm' \
             --margin-left '0mm' --margin-right '0mm' --margin-top '0mm' - -"
        );
    }

    #[test]
    fn passthrough_option_shapes() {
        let engine = engine(json!({
            "options": {
                "boolean": true,
                "string": "value",
                "integer": 42,
                "array": {"first": "firstValue", "second": "secondValue"}
            }
        }));
        assert_eq!(
            command(&engine, &RenderConfig::default()).unwrap(),
            "wkhtmltopdf --quiet --print-media-type --orientation 'portrait' --page-size 'A4' \
             --encoding 'UTF-8' --boolean --string 'value' --integer '42' \
             --array 'first' 'firstValue' --array 'second' 'secondValue' - -"
        );
    }

    #[test]
    fn cover_and_toc_sub_blocks() {
        let engine = engine(json!({
            "options": {
                "encoding": "UTF-16",
                "title": "Test",
                "cover": "cover.html",
                "toc": {"zoom": 5, "encoding": "ISO-8859-1"}
            }
        }));
        assert_eq!(
            command(&engine, &RenderConfig::default()).unwrap(),
            "wkhtmltopdf --quiet --print-media-type --orientation 'portrait' --page-size 'A4' \
             --encoding 'UTF-16' --title 'Test' cover 'cover.html' \
             toc --zoom '5' --encoding 'ISO-8859-1' - -"
        );
    }

    #[test]
    fn cover_without_url_fails_before_running() {
        let engine = engine(json!({
            "options": {"cover": {"enable-smart-shrinking": true, "zoom": 10}}
        }));
        let err = command(&engine, &RenderConfig::default()).unwrap_err();
        assert!(matches!(err, crate::error::PdfError::Configuration(_)));
    }

    #[test]
    fn render_settings_become_flags() {
        let config = RenderConfig::default()
            .with_orientation(crate::config::Orientation::Landscape)
            .with_page_size("Letter")
            .with_delay(500)
            .with_window_status("ready")
            .with_footer(Banner::new(Some("left"), None, Some("[page]/[topage]")))
            .with_header(Banner::new(None, Some("Bob's header"), None));
        assert_eq!(
            command(&engine(json!({})), &config).unwrap(),
            "wkhtmltopdf --quiet --print-media-type --orientation 'landscape' \
             --page-size 'Letter' --encoding 'UTF-8' --javascript-delay '500' \
             --window-status 'ready' --footer-left 'left' --footer-right '[page]/[topage]' \
             --header-center 'Bob'\\''s header' - -"
        );
    }

    #[test]
    fn html_banners_are_staged() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(json!({"stagingDir": tmp.path()}));
        let mut header = Banner::default();
        header.html = Some("<div>Header</div>".into());
        let config = RenderConfig::default().with_header(header);

        let job = RenderJob::new("", &config);
        let first = engine.command("wkhtmltopdf", &job).unwrap();
        let second = engine.command("wkhtmltopdf", &job).unwrap();
        assert_eq!(first, second);

        let argv = first.argv();
        let at = argv.iter().position(|a| *a == "--header-html").unwrap();
        let staged = std::path::Path::new(argv[at + 1]);
        assert!(staged.starts_with(tmp.path()));
        assert_eq!(std::fs::read_to_string(staged).unwrap(), "<div>Header</div>");
    }

    #[test]
    fn missing_binary_is_reported() {
        let engine = engine(json!({"binary": "/foo/bar"}));
        let config = RenderConfig::default();
        let err = engine.output(&RenderJob::new("<p/>", &config)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "bar failed: binary is not found or not executable: /foo/bar"
        );
    }
}
