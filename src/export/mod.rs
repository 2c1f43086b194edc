//! Evaluation report export.
//!
//! `build_report` lays the session out into pages (content first, footers once the
//! page count is final); `render_pdf` turns those pages into bytes.

use chrono::{DateTime, Local};
use thiserror::Error;

use crate::domain::{ClinicalCase, EvaluationResult, StudentInfo};

pub mod layout;
pub mod pdf;

use layout::{Face, LayoutBuilder, Page, Rgb, Style};

pub const PDF_MIME: &str = "application/pdf";
const REPORT_TITLE: &str = "INFORME DE SIMULACIÓN CLÍNICA - RES. 3280";
const FOOTER_LABEL: &str = "Simulador Clínico 3280";

const BRAND: Rgb = Rgb(0x03, 0x69, 0xa1);
const MUTED: Rgb = Rgb(0x64, 0x74, 0x8b);
const HEADING: Rgb = Rgb(0x33, 0x33, 0x33);
const ACCENT: Rgb = Rgb(0x0e, 0xa5, 0xe9);
const PROSE: Rgb = Rgb(0x47, 0x55, 0x69);
const INK: Rgb = Rgb(0x1e, 0x29, 0x3b);
const FAVORABLE: Rgb = Rgb(0x16, 0xa3, 0x4a);
const UNFAVORABLE: Rgb = Rgb(0xdc, 0x26, 0x26);
const POSITIVE: Rgb = Rgb(0x15, 0x80, 0x3d);
const IMPROVE: Rgb = Rgb(0xc2, 0x41, 0x0c);
const RECOMMEND: Rgb = Rgb(0x1d, 0x4e, 0xd8);

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("PDF generation failed: {0}")]
    Pdf(String),
}

/// Everything a report is made of.
#[derive(Clone, Copy, Debug)]
pub struct ReportInput<'a> {
    pub student: &'a StudentInfo,
    pub case: &'a ClinicalCase,
    pub orders: &'a str,
    pub evaluation: &'a EvaluationResult,
}

/// A finished file ready for download.
#[derive(Clone, Debug)]
pub struct ReportFile {
    pub filename: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

fn style(size: f32, face: Face, color: Rgb) -> Style {
    Style::new(size, face, color)
}

fn opt(v: &Option<String>) -> &str {
    v.as_deref().unwrap_or("-")
}

/// Lay out the report. Output depends only on `input` and `generated_at`.
pub fn build_report(input: &ReportInput<'_>, generated_at: DateTime<Local>) -> Vec<Page> {
    let ReportInput { student, case, orders, evaluation } = *input;
    let body = style(10.0, Face::Regular, Rgb::BLACK);
    let label = style(10.0, Face::Bold, Rgb::BLACK);
    let section = style(12.0, Face::Bold, HEADING);
    let detail = style(9.0, Face::Regular, PROSE);
    let bullet = style(9.0, Face::Regular, INK).indented(5.0);

    let mut b = LayoutBuilder::new();

    b.text(REPORT_TITLE, style(16.0, Face::Bold, BRAND));
    b.gap(2.0);
    b.text(
        &format!("Fecha de Generación: {}", generated_at.format("%d/%m/%Y %H:%M:%S")),
        style(10.0, Face::Regular, MUTED),
    );
    b.separator();

    b.text("INFORMACIÓN DEL ESTUDIANTE", section);
    b.text(&format!("Nombre: {}", student.name), body);
    b.text(&format!("Cédula: {}", student.id_number), body);
    b.text(&format!("Tema Asignado: {}", case.topic.label()), style(10.0, Face::Bold, ACCENT));
    b.gap(5.0);

    let p = &case.patient_info;
    b.text("DETALLES DEL CASO CLÍNICO", section);
    b.text(&format!("Título: {}", case.title), label);
    b.text(&format!("Paciente: {}, {}, {}.", p.name, p.age, p.gender), body);
    let residence = if p.residence.is_empty() { String::new() } else { format!(" | Residencia: {}", p.residence) };
    b.text(&format!("Ocupación: {} | Régimen: {}{}", p.occupation, p.insurance_type, residence), body);
    b.gap(2.0);

    b.text("Motivo de Consulta:", label);
    b.text(&case.chief_complaint, style(10.0, Face::Regular, PROSE));
    b.gap(2.0);

    b.text("Enfermedad Actual:", label);
    b.text(&case.history_of_present_illness, style(10.0, Face::Regular, PROSE));
    b.gap(2.0);

    b.text("Antecedentes:", label);
    b.text(&format!("Personales: {}", case.past_medical_history), style(9.0, Face::Regular, Rgb::BLACK));
    b.text(&format!("Familiares: {}", case.family_history), style(9.0, Face::Regular, Rgb::BLACK));
    b.gap(2.0);

    let v = &case.vitals;
    b.text("Signos Vitales y Físico:", label);
    b.text(
        &format!(
            "TA: {} | FC: {} | FR: {} | T: {} | SatO2: {} | Peso: {} | Talla: {} | IMC: {}",
            opt(&v.bp), opt(&v.hr), opt(&v.rr), opt(&v.temp), opt(&v.o2), opt(&v.weight), opt(&v.height), opt(&v.bmi)
        ),
        style(9.0, Face::Regular, Rgb::BLACK),
    );
    b.text(&case.physical_exam, detail);
    b.gap(2.0);

    b.text("Paraclínicos:", label);
    b.text(&case.labs_and_images, detail);
    if !case.context_hints.is_empty() {
        b.text(&format!("Contexto: {}", case.context_hints), detail);
    }
    b.separator();

    b.text("RESPUESTA DEL ESTUDIANTE (ÓRDENES MÉDICAS)", section);
    b.text(orders, style(9.0, Face::Mono, INK));
    b.separator();

    b.text("EVALUACIÓN Y RETROALIMENTACIÓN", section);
    let score_color = if evaluation.is_favorable() { FAVORABLE } else { UNFAVORABLE };
    b.text(
        &format!("CALIFICACIÓN FINAL: {:.1} / 5.0", evaluation.score),
        style(14.0, Face::Bold, score_color),
    );
    b.gap(2.0);

    b.text("Resumen de Manejo Ideal:", label);
    b.text(&evaluation.clinical_summary, style(10.0, Face::Regular, PROSE));
    b.gap(4.0);

    b.text("Aspectos Positivos:", style(10.0, Face::Bold, POSITIVE));
    for item in &evaluation.positive_aspects {
        b.text(&format!("• {item}"), bullet);
    }
    b.gap(2.0);

    b.text("Oportunidades de Mejora:", style(10.0, Face::Bold, IMPROVE));
    for item in &evaluation.areas_for_improvement {
        b.text(&format!("• {item}"), bullet);
    }
    b.gap(2.0);

    b.text("Recomendaciones (Res. 3280):", style(10.0, Face::Bold, RECOMMEND));
    for item in &evaluation.recommendations {
        b.text(&format!("-> {item}"), bullet);
    }

    b.finish(FOOTER_LABEL)
}

/// Keep identifiers filename- and header-safe.
fn sanitize(id: &str) -> String {
    let cleaned: String = id
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() { "sin_id".into() } else { cleaned }
}

pub fn report_filename(id_number: &str, generated_at: DateTime<Local>) -> String {
    format!("Reporte_Caso_{}_{}.pdf", sanitize(id_number), generated_at.timestamp_millis())
}

/// Lay out and render the report as a PDF.
pub fn export_report(input: &ReportInput<'_>, generated_at: DateTime<Local>) -> Result<ReportFile, ExportError> {
    let pages = build_report(input, generated_at);
    let bytes = pdf::render_pdf(REPORT_TITLE, &pages)?;
    tracing::info!(
        target: "export",
        case_id = %input.case.id,
        pages = pages.len(),
        bytes = bytes.len(),
        "Report rendered"
    );
    Ok(ReportFile {
        filename: report_filename(&input.student.id_number, generated_at),
        mime: PDF_MIME,
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::layout::Item;
    use crate::workflow::tests::{full_case, pepito, sample_case, sample_evaluation};
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Local> {
        Local.timestamp_millis_opt(1_700_000_000_000).single().unwrap()
    }

    fn all_text(pages: &[Page]) -> Vec<String> {
        pages
            .iter()
            .flat_map(|p| p.items.iter())
            .filter_map(|i| match i {
                Item::Text(t) => Some(t.text.clone()),
                Item::Rule { .. } => None,
            })
            .collect()
    }

    #[test]
    fn report_reproduces_case_and_evaluation() {
        let student = pepito();
        let case = sample_case();
        let evaluation = sample_evaluation();
        let input = ReportInput { student: &student, case: &case, orders: "1. Ingreso\n2. Monitoreo fetal", evaluation: &evaluation };
        let pages = build_report(&input, fixed_time());
        assert!(!pages.is_empty());

        let text = all_text(&pages);
        assert!(text.contains(&"Nombre: Pepito Pérez".to_string()));
        assert!(text.contains(&"Cédula: 123456789".to_string()));
        assert!(text.contains(&"Tema Asignado: Atención del parto".to_string()));
        assert!(text.contains(&"1. Ingreso".to_string()));
        assert!(text.contains(&"2. Monitoreo fetal".to_string()));
        assert!(text.contains(&"CALIFICACIÓN FINAL: 4.2 / 5.0".to_string()));
        assert!(text.contains(&"• A".to_string()));
        assert!(text.contains(&"-> C".to_string()));

        let score_line = pages
            .iter()
            .flat_map(|p| p.items.iter())
            .find_map(|i| match i {
                Item::Text(t) if t.text.starts_with("CALIFICACIÓN") => Some(t.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(score_line.color, FAVORABLE);
    }

    #[test]
    fn fully_populated_case_reaches_every_report_line() {
        let student = pepito();
        let case = full_case();
        let evaluation = sample_evaluation();
        let input = ReportInput { student: &student, case: &case, orders: "Hospitalizar en sala de partos", evaluation: &evaluation };
        let pages = build_report(&input, fixed_time());
        // Wrapped lines drop the space they broke on.
        let joined = all_text(&pages).join(" ");

        for expected in [
            "Título: Primigestante de 39 semanas en trabajo de parto",
            "Paciente: Laura Restrepo, 27 años, Femenino.",
            "Ocupación: Docente | Régimen: Contributivo | Residencia: Vereda El Carmen, Rionegro",
            "Me duele mucho el vientre",
            "Contracciones regulares desde hace 6 horas.",
            "Personales: G1P0, controles prenatales completos.",
            "Familiares: Madre con hipertensión crónica.",
            "TA: 118/76 mmHg",
            "FC: 84 lpm",
            "FR: 18 rpm",
            "T: 36.7 °C",
            "SatO2: 98%",
            "Peso: 68 kg",
            "Talla: 1.62 m",
            "IMC: 25.9",
            "Altura uterina 33 cm, FCF 140 lpm, dilatación 5 cm.",
            "Ecografía de tercer trimestre normal.",
            "Contexto: Hospital de primer nivel en zona rural.",
            "Hospitalizar en sala de partos",
            "Resumen de Manejo Ideal:",
        ] {
            assert!(joined.contains(expected), "missing {expected:?}");
        }
        assert!(!joined.contains(": -"));

        let total = pages.len();
        for (i, page) in pages.iter().enumerate() {
            let footer = &page.footer.as_ref().unwrap().text;
            assert_eq!(footer, &format!("Página {} de {} - Simulador Clínico 3280", i + 1, total));
        }
    }

    #[test]
    fn low_score_uses_unfavorable_colour() {
        let student = pepito();
        let case = sample_case();
        let mut evaluation = sample_evaluation();
        evaluation.score = 2.5;
        let input = ReportInput { student: &student, case: &case, orders: "", evaluation: &evaluation };
        let pages = build_report(&input, fixed_time());
        let colored = pages
            .iter()
            .flat_map(|p| p.items.iter())
            .any(|i| matches!(i, Item::Text(t) if t.text.starts_with("CALIFICACIÓN") && t.color == UNFAVORABLE));
        assert!(colored);
    }

    #[test]
    fn long_orders_paginate_with_consistent_footers() {
        let student = pepito();
        let case = sample_case();
        let evaluation = sample_evaluation();
        let orders = "Solicitar hemograma, hemoclasificación y VDRL.\n".repeat(150);
        let input = ReportInput { student: &student, case: &case, orders: &orders, evaluation: &evaluation };
        let pages = build_report(&input, fixed_time());
        let total = pages.len();
        assert!(total >= 3);
        for (i, page) in pages.iter().enumerate() {
            let footer = &page.footer.as_ref().unwrap().text;
            assert_eq!(footer, &format!("Página {} de {} - Simulador Clínico 3280", i + 1, total));
        }
    }

    #[test]
    fn same_session_yields_same_layout() {
        let student = pepito();
        let case = sample_case();
        let evaluation = sample_evaluation();
        let input = ReportInput { student: &student, case: &case, orders: "Conducta expectante", evaluation: &evaluation };
        assert_eq!(build_report(&input, fixed_time()), build_report(&input, fixed_time()));
    }

    #[test]
    fn filename_embeds_sanitized_id_and_millis() {
        assert_eq!(report_filename("123456789", fixed_time()), "Reporte_Caso_123456789_1700000000000.pdf");
        assert_eq!(report_filename("12 34/5", fixed_time()), "Reporte_Caso_12_34_5_1700000000000.pdf");
        assert_eq!(report_filename("  ", fixed_time()), "Reporte_Caso_sin_id_1700000000000.pdf");
    }

    #[test]
    fn export_produces_pdf_bytes() {
        let student = pepito();
        let case = sample_case();
        let evaluation = sample_evaluation();
        let input = ReportInput { student: &student, case: &case, orders: "Remisión", evaluation: &evaluation };
        let file = export_report(&input, fixed_time()).unwrap();
        assert!(file.bytes.starts_with(b"%PDF"));
        assert_eq!(file.mime, PDF_MIME);
        assert!(file.filename.starts_with("Reporte_Caso_123456789_"));
    }
}
