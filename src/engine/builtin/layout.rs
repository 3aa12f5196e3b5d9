//! Page geometry, line wrapping and pagination for the builtin engine.
//!
//! Widths are estimated at half the font size per character, which is
//! close to the average advance of Helvetica for Latin text.

use crate::error::{PdfError, Result};

use super::markup::{Block, BlockKind};

/// Points per millimeter.
pub const PT_PER_MM: f32 = 72.0 / 25.4;

const CHAR_WIDTH: f32 = 0.5;

/// Named paper size, in millimeters, portrait.
const PAPER_SIZES: &[(&str, f32, f32)] = &[
    ("A3", 297.0, 420.0),
    ("A4", 210.0, 297.0),
    ("A5", 148.0, 210.0),
    ("Letter", 215.9, 279.4),
    ("Legal", 215.9, 355.6),
    ("Tabloid", 279.4, 431.8),
];

/// A concrete page size. `"A4"` is portrait, `"A4-L"` landscape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageFormat {
    pub width_mm: f32,
    pub height_mm: f32,
}

impl PageFormat {
    pub fn parse(format: &str) -> Result<Self> {
        let (name, landscape) = match format.strip_suffix("-L") {
            Some(name) => (name, true),
            None => (format, false),
        };
        let &(_, w, h) = PAPER_SIZES
            .iter()
            .find(|(known, _, _)| known.eq_ignore_ascii_case(name))
            .ok_or_else(|| PdfError::config(format!("unsupported page size `{name}`")))?;
        Ok(if landscape {
            Self {
                width_mm: h,
                height_mm: w,
            }
        } else {
            Self {
                width_mm: w,
                height_mm: h,
            }
        })
    }

    pub fn width_pt(&self) -> f32 {
        self.width_mm * PT_PER_MM
    }

    pub fn height_pt(&self) -> f32 {
        self.height_mm * PT_PER_MM
    }
}

/// The printable area of a page, in points.
#[derive(Debug, Clone, Copy)]
pub struct Frame {
    pub width: f32,
    pub height: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl Frame {
    pub fn content_width(&self) -> f32 {
        (self.width - self.left - self.right).max(0.0)
    }
}

/// One line of text, placed on a page. `y` is the baseline measured from
/// the bottom edge, as PDF coordinates are.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub bold: bool,
    pub text: String,
}

pub fn text_width(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * CHAR_WIDTH
}

/// Greedy word wrap. Words longer than a line are split by characters.
pub fn wrap(text: &str, size: f32, max_width: f32) -> Vec<String> {
    let max_chars = ((max_width / (size * CHAR_WIDTH)).floor() as usize).max(1);
    let mut lines = Vec::new();
    let mut line = String::new();
    let mut line_len = 0;

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if line_len > 0 {
                lines.push(std::mem::take(&mut line));
                line_len = 0;
            }
            let rest = word.split_off(max_chars);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        let needed = if line_len == 0 { word.len() } else { line_len + 1 + word.len() };
        if needed > max_chars && line_len > 0 {
            lines.push(std::mem::take(&mut line));
            line_len = 0;
        }
        if line_len > 0 {
            line.push(' ');
            line_len += 1;
        }
        line.extend(word.iter());
        line_len += word.len();
    }
    if line_len > 0 {
        lines.push(line);
    }
    lines
}

/// Lay blocks out top to bottom and break into pages.
///
/// Always returns at least one (possibly empty) page.
pub fn paginate(
    blocks: &[Block],
    frame: &Frame,
    font_size: f32,
    line_height: f32,
) -> Vec<Vec<PlacedLine>> {
    let mut pages = vec![Vec::new()];
    let top = frame.height - frame.top;
    let floor = frame.bottom;
    let mut cursor = top;

    for block in blocks {
        let size = font_size * block.scale();
        let advance = size * line_height;
        let (indent, text) = match block.kind {
            BlockKind::ListItem => (size * 1.5, format!("- {}", block.text)),
            _ => (0.0, block.text.clone()),
        };

        for line in wrap(&text, size, frame.content_width() - indent) {
            if cursor - advance < floor && cursor < top {
                pages.push(Vec::new());
                cursor = top;
            }
            cursor -= advance;
            if let Some(page) = pages.last_mut() {
                page.push(PlacedLine {
                    x: frame.left + indent,
                    y: cursor + (advance - size) / 2.0,
                    size,
                    bold: block.bold(),
                    text: line,
                });
            }
        }
        cursor -= font_size * line_height * 0.5;
    }
    pages
}
