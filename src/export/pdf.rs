use printpdf::{BuiltinFont, Color, IndirectFontRef, Line, Mm, PdfDocument, PdfLayerReference, Point};

use super::layout::{Face, Item, Page, Rgb, TextLine, MARGIN_MM, PAGE_HEIGHT_MM, PAGE_WIDTH_MM};
use super::ExportError;

const LAYER: &str = "Contenido";

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    mono: IndirectFontRef,
}

impl Fonts {
    fn get(&self, face: Face) -> &IndirectFontRef {
        match face {
            Face::Regular => &self.regular,
            Face::Bold => &self.bold,
            Face::Mono => &self.mono,
        }
    }
}

fn pdf_err<E: std::fmt::Debug>(e: E) -> ExportError {
    ExportError::Pdf(format!("{e:?}"))
}

fn color(c: Rgb) -> Color {
    Color::Rgb(printpdf::Rgb::new(
        f32::from(c.0) / 255.0,
        f32::from(c.1) / 255.0,
        f32::from(c.2) / 255.0,
        None,
    ))
}

/// Layout y is measured from the top; PDF user space grows upwards.
fn flip(y: f32) -> Mm {
    Mm(PAGE_HEIGHT_MM - y)
}

fn draw_text(layer: &PdfLayerReference, fonts: &Fonts, line: &TextLine) {
    if line.text.is_empty() {
        return;
    }
    layer.set_fill_color(color(line.color));
    layer.use_text(line.text.clone(), line.size, Mm(line.x), flip(line.y), fonts.get(line.face));
}

fn draw_rule(layer: &PdfLayerReference, y: f32) {
    layer.set_outline_color(color(Rgb::RULE));
    layer.set_outline_thickness(0.5);
    layer.add_line(Line {
        points: vec![
            (Point::new(Mm(MARGIN_MM), flip(y)), false),
            (Point::new(Mm(PAGE_WIDTH_MM - MARGIN_MM), flip(y)), false),
        ],
        is_closed: false,
    });
}

/// Draw laid-out pages into a PDF using the built-in Helvetica/Courier faces.
pub fn render_pdf(title: &str, pages: &[Page]) -> Result<Vec<u8>, ExportError> {
    let (doc, first_page, first_layer) =
        PdfDocument::new(title, Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), LAYER);
    let fonts = Fonts {
        regular: doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_err)?,
        bold: doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(pdf_err)?,
        mono: doc.add_builtin_font(BuiltinFont::Courier).map_err(pdf_err)?,
    };

    for (idx, page) in pages.iter().enumerate() {
        let layer = if idx == 0 {
            doc.get_page(first_page).get_layer(first_layer)
        } else {
            let (p, l) = doc.add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), LAYER);
            doc.get_page(p).get_layer(l)
        };
        for item in &page.items {
            match item {
                Item::Text(line) => draw_text(&layer, &fonts, line),
                Item::Rule { y } => draw_rule(&layer, *y),
            }
        }
        if let Some(footer) = &page.footer {
            draw_text(&layer, &fonts, footer);
        }
    }

    doc.save_to_bytes().map_err(pdf_err)
}
