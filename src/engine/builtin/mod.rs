//! Builtin engine – renders in-process with `printpdf`, no external tool.
//!
//! The document is flattened to text blocks ([`markup`]), wrapped and
//! paginated ([`layout`]), then drawn with the standard Helvetica fonts.
//! Header and footer text is repeated on every page; `[page]` and
//! `[topage]` are replaced with the page number and the page count.

use printpdf::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{Banner, Options, Orientation, RenderConfig};
use crate::engine::{settings, RenderEngine, RenderJob};
use crate::error::{PdfError, Result};

pub mod layout;
pub mod markup;

use layout::{Frame, PageFormat, PlacedLine, PT_PER_MM};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Settings {
    /// Body text size in points.
    font_size: f32,
    /// Line advance as a multiple of the font size.
    line_height: f32,
    /// Margin in millimeters for sides the render config leaves unset.
    margin: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            font_size: 11.0,
            line_height: 1.4,
            margin: 15.0,
        }
    }
}

#[derive(Debug, Default)]
pub struct BuiltinEngine {
    settings: Settings,
}

impl BuiltinEngine {
    pub const NAME: &'static str = "Builtin";

    pub fn from_options(options: &Options) -> Result<Self> {
        let settings: Settings = settings(Self::NAME, options)?;
        if settings.font_size <= 0.0 || settings.line_height <= 0.0 || settings.margin < 0.0 {
            return Err(PdfError::config(
                "Builtin options need a positive fontSize and lineHeight and a non-negative margin",
            ));
        }
        Ok(Self { settings })
    }

    fn frame(&self, config: &RenderConfig, format: &PageFormat) -> Frame {
        let margins = config.margins();
        let side = |mm: Option<f64>| mm.map_or(self.settings.margin, |m| m as f32) * PT_PER_MM;
        Frame {
            width: format.width_pt(),
            height: format.height_pt(),
            top: side(margins.top),
            right: side(margins.right),
            bottom: side(margins.bottom),
            left: side(margins.left),
        }
    }

    /// Lines for a header or footer, with placeholders filled in.
    fn banner_lines(
        &self,
        banner: &Banner,
        frame: &Frame,
        baseline: f32,
        page: usize,
        pages: usize,
    ) -> Vec<PlacedLine> {
        let size = self.settings.font_size * 0.8;
        banner
            .locations()
            .into_iter()
            .filter_map(|(location, text)| {
                let text = text?
                    .replace("[page]", &page.to_string())
                    .replace("[topage]", &pages.to_string());
                let width = layout::text_width(&text, size);
                let x = match location {
                    "center" => (frame.width - width) / 2.0,
                    "right" => frame.width - frame.right - width,
                    _ => frame.left,
                };
                Some(PlacedLine {
                    x: x.max(0.0),
                    y: baseline,
                    size,
                    bold: false,
                    text,
                })
            })
            .collect()
    }
}

/// The backend format name: the page size, with `-L` for landscape.
pub fn page_format(config: &RenderConfig) -> String {
    match config.orientation() {
        Orientation::Portrait => config.page_size().to_string(),
        Orientation::Landscape => format!("{}-L", config.page_size()),
    }
}

impl RenderEngine for BuiltinEngine {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn output(&self, job: &RenderJob<'_>) -> Result<Vec<u8>> {
        let config = job.config;
        let format_name = page_format(config);
        let format = PageFormat::parse(&format_name)?;
        let frame = self.frame(config, &format);
        log::debug!("builtin rendering {format_name} ({}x{} mm)", format.width_mm, format.height_mm);

        if config.header().html.is_some() || config.footer().html.is_some() {
            log::debug!("builtin engine ignores header/footer html fragments");
        }

        let blocks = markup::parse_blocks(job.html);
        let pages = layout::paginate(
            &blocks,
            &frame,
            self.settings.font_size,
            self.settings.line_height,
        );
        if job.cancel.is_some_and(|c| c.is_cancelled()) {
            return Err(PdfError::tool("builtin", "cancelled"));
        }

        let count = pages.len();
        let header_y = frame.height - frame.top / 2.0 - self.settings.font_size * 0.4;
        let footer_y = frame.bottom / 2.0;
        let mut pdf_pages = Vec::with_capacity(count);
        for (index, lines) in pages.iter().enumerate() {
            let number = index + 1;
            let mut ops = Vec::new();
            for line in lines
                .iter()
                .chain(&self.banner_lines(config.header(), &frame, header_y, number, count))
                .chain(&self.banner_lines(config.footer(), &frame, footer_y, number, count))
            {
                draw_line(&mut ops, line);
            }
            pdf_pages.push(PdfPage::new(
                Mm(format.width_mm),
                Mm(format.height_mm),
                ops,
            ));
        }

        let mut doc = PdfDocument::new(config.title().unwrap_or("Document"));
        doc.with_pages(pdf_pages);
        let mut warnings = Vec::new();
        let bytes = doc.save(&PdfSaveOptions::default(), &mut warnings);
        if !warnings.is_empty() {
            log::debug!("printpdf reported {} warnings", warnings.len());
        }
        log::info!("builtin rendered {count} page(s), {} bytes", bytes.len());
        Ok(bytes)
    }

    fn fingerprint(&self) -> Value {
        serde_json::to_value(&self.settings).unwrap_or_default()
    }
}

fn draw_line(ops: &mut Vec<Op>, line: &PlacedLine) {
    if line.text.is_empty() {
        return;
    }
    let font = if line.bold {
        BuiltinFont::HelveticaBold
    } else {
        BuiltinFont::Helvetica
    };
    ops.push(Op::StartTextSection);
    ops.push(Op::SetTextCursor {
        pos: Point {
            x: Pt(line.x),
            y: Pt(line.y),
        },
    });
    ops.push(Op::SetFontSizeBuiltinFont {
        size: Pt(line.size),
        font,
    });
    ops.push(Op::WriteTextBuiltinFont {
        items: vec![TextItem::Text(to_ascii(&line.text))],
        font,
    });
    ops.push(Op::EndTextSection);
}

/// Builtin fonts cover a single-byte encoding; keep text to printable ASCII.
fn to_ascii(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            ' '..='~' => out.push(c),
            '\u{00A0}' | '\t' => out.push(' '),
            '\u{2018}' | '\u{2019}' | '\u{201A}' => out.push('\''),
            '\u{201C}' | '\u{201D}' | '\u{201E}' => out.push('"'),
            '\u{2013}' | '\u{2014}' | '\u{2022}' => out.push('-'),
            '\u{2026}' => out.push_str("..."),
            '\u{20AC}' => out.push_str("EUR"),
            _ => out.push('?'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(html: &str, config: &RenderConfig) -> Vec<u8> {
        BuiltinEngine::default()
            .output(&RenderJob::new(html, config))
            .unwrap()
    }

    #[test]
    fn landscape_requests_the_l_suffix() {
        let config = RenderConfig::default()
            .with_orientation(Orientation::Landscape)
            .with_page_size("A4");
        assert_eq!(page_format(&config), "A4-L");
        assert_eq!(page_format(&RenderConfig::default()), "A4");
    }

    #[test]
    fn renders_a_pdf_document() {
        let bytes = render("<h1>Hello</h1><p>World</p>", &RenderConfig::default());
        assert!(bytes.starts_with(b"%PDF-"));
    }

    #[test]
    fn empty_html_still_renders_one_page() {
        let bytes = render("", &RenderConfig::default().with_title("Empty"));
        assert!(bytes.starts_with(b"%PDF-"));
    }

    #[test]
    fn unknown_page_size_is_a_configuration_error() {
        let config = RenderConfig::default().with_page_size("Napkin");
        let err = BuiltinEngine::default()
            .output(&RenderJob::new("<p>x</p>", &config))
            .unwrap_err();
        assert!(matches!(err, PdfError::Configuration(_)));
    }

    #[test]
    fn banner_placeholders_are_numbered() {
        let engine = BuiltinEngine::default();
        let config = RenderConfig::default();
        let frame = engine.frame(&config, &PageFormat::parse("A4").unwrap());
        let banner = Banner::new(Some("Report"), None, Some("[page]/[topage]"));
        let lines = engine.banner_lines(&banner, &frame, 20.0, 2, 5);
        let texts: Vec<_> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, ["Report", "2/5"]);
        assert!(lines[1].x > lines[0].x);
    }

    #[test]
    fn config_margins_override_the_default() {
        let engine = BuiltinEngine::default();
        let config =
            RenderConfig::default().with_margins(crate::config::Margins::uniform(0.0));
        let frame = engine.frame(&config, &PageFormat::parse("A4").unwrap());
        assert_eq!(frame.left, 0.0);
        assert_eq!(frame.top, 0.0);
    }

    #[test]
    fn text_is_kept_to_ascii() {
        assert_eq!(to_ascii("caf\u{e9} \u{2018}ok\u{2019} \u{2026}"), "caf? 'ok' ...");
    }

    #[test]
    fn rejects_nonsense_settings() {
        let serde_json::Value::Object(map) = serde_json::json!({"fontSize": 0}) else {
            unreachable!()
        };
        assert!(BuiltinEngine::from_options(&map).is_err());
    }
}
