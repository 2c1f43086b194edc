//! Page layout for the evaluation report.
//!
//! Coordinates are millimetres from the top-left corner of an A4 page. Text is wrapped
//! with average glyph widths for the PDF base-14 faces, which is close enough for
//! left-aligned prose and keeps layout independent of the renderer.

use serde::Serialize;

pub const PAGE_WIDTH_MM: f32 = 210.0;
pub const PAGE_HEIGHT_MM: f32 = 297.0;
pub const MARGIN_MM: f32 = 20.0;
pub const TOP_MM: f32 = 20.0;
const PT_TO_MM: f32 = 0.352_778;
const SEPARATOR_MM: f32 = 10.0;
const FOOTER_OFFSET_MM: f32 = 10.0;
const FOOTER_SIZE: f32 = 8.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Face {
    Regular,
    Bold,
    Mono,
}

impl Face {
    /// Average advance width as a fraction of the font size.
    fn avg_width(self) -> f32 {
        match self {
            Face::Regular => 0.50,
            Face::Bold => 0.55,
            Face::Mono => 0.60,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0x00, 0x00, 0x00);
    pub const GRAY: Rgb = Rgb(0x96, 0x96, 0x96);
    pub const RULE: Rgb = Rgb(0xc8, 0xc8, 0xc8);
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TextLine {
    pub x: f32,
    /// Baseline, from the top edge.
    pub y: f32,
    pub size: f32,
    pub face: Face,
    pub color: Rgb,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Item {
    Text(TextLine),
    Rule { y: f32 },
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Page {
    pub items: Vec<Item>,
    pub footer: Option<TextLine>,
}

/// Style of one text block.
#[derive(Clone, Copy, Debug)]
pub struct Style {
    pub size: f32,
    pub face: Face,
    pub color: Rgb,
    pub indent: f32,
}

impl Style {
    pub const fn new(size: f32, face: Face, color: Rgb) -> Self {
        Self { size, face, color, indent: 0.0 }
    }

    pub const fn indented(self, indent: f32) -> Self {
        Self { indent, ..self }
    }

    fn line_height(&self) -> f32 {
        self.size * 0.5
    }
}

/// Rough rendered width of `text` in millimetres.
pub fn text_width(text: &str, size: f32, face: Face) -> f32 {
    text.chars().count() as f32 * size * face.avg_width() * PT_TO_MM
}

/// Greedy word wrap within `max_width`. Explicit newlines are kept, words wider than the
/// line are split, and an empty input still occupies one line.
pub fn wrap_text(text: &str, size: f32, face: Face, max_width: f32) -> Vec<String> {
    let fits = |s: &str| text_width(s, size, face) <= max_width;
    let mut lines = Vec::new();
    for raw in text.split('\n') {
        let raw = raw.trim_end_matches('\r');
        let mut current = String::new();
        for word in raw.split(' ') {
            let candidate = if current.is_empty() { word.to_string() } else { format!("{current} {word}") };
            if fits(&candidate) {
                current = candidate;
                continue;
            }
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            // Break over-long words by characters.
            for ch in word.chars() {
                current.push(ch);
                if !fits(&current) && current.chars().count() > 1 {
                    current.pop();
                    lines.push(std::mem::take(&mut current));
                    current.push(ch);
                }
            }
        }
        lines.push(current);
    }
    lines
}

/// Accumulates pages while tracking the vertical cursor.
pub struct LayoutBuilder {
    pages: Vec<Page>,
    y: f32,
}

impl Default for LayoutBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutBuilder {
    pub fn new() -> Self {
        Self { pages: vec![Page::default()], y: TOP_MM }
    }

    fn bottom_limit() -> f32 {
        PAGE_HEIGHT_MM - MARGIN_MM
    }

    fn new_page(&mut self) {
        self.pages.push(Page::default());
        self.y = TOP_MM;
    }

    fn fits(&self, height: f32) -> bool {
        self.y + height <= Self::bottom_limit()
    }

    fn ensure_room(&mut self, height: f32) {
        if !self.fits(height) && self.y > TOP_MM {
            self.new_page();
        }
    }

    fn push(&mut self, item: Item) {
        if let Some(page) = self.pages.last_mut() {
            page.items.push(item);
        }
    }

    /// Vertical gap, never forcing a page break on its own.
    pub fn gap(&mut self, mm: f32) {
        self.y = (self.y + mm).min(Self::bottom_limit());
    }

    /// Write a wrapped text block. The whole block moves to a new page when it does not
    /// fit; blocks taller than a page continue line by line.
    pub fn text(&mut self, text: &str, style: Style) {
        let max_width = PAGE_WIDTH_MM - 2.0 * MARGIN_MM - style.indent;
        let lines = wrap_text(text, style.size, style.face, max_width);
        let line_height = style.line_height();
        let block_height = lines.len() as f32 * line_height + 2.0;

        self.ensure_room(block_height);
        for line in lines {
            self.ensure_room(line_height);
            self.push(Item::Text(TextLine {
                x: MARGIN_MM + style.indent,
                y: self.y,
                size: style.size,
                face: style.face,
                color: style.color,
                text: line,
            }));
            self.y += line_height;
        }
        self.y += 2.0;
    }

    pub fn separator(&mut self) {
        self.ensure_room(SEPARATOR_MM);
        let y = self.y;
        self.push(Item::Rule { y });
        self.y += SEPARATOR_MM;
    }

    /// Second pass: total page count is final, stamp "page X of N" on every page.
    pub fn finish(self, footer_label: &str) -> Vec<Page> {
        let mut pages = self.pages;
        let total = pages.len();
        for (idx, page) in pages.iter_mut().enumerate() {
            page.footer = Some(TextLine {
                x: MARGIN_MM,
                y: PAGE_HEIGHT_MM - FOOTER_OFFSET_MM,
                size: FOOTER_SIZE,
                face: Face::Regular,
                color: Rgb::GRAY,
                text: format!("Página {} de {} - {}", idx + 1, total, footer_label),
            });
        }
        pages
    }
}
