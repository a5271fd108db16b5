//! Paginated fixed-layout document: a minimal PDF 1.4 writer.
//!
//! Helvetica text on an A4 grid, automatic page breaks, JPEG chart images
//! embedded as DCTDecode XObjects. Only what the report needs — this is
//! not a general PDF library.

use anyhow::{bail, Result};

use super::table::{Table, NO_CONFIG, NO_OVERLAY, NO_SCORES, NO_UPDATES, NO_VARIANT_GRAPHS};
use super::{ChartImage, ReportModel};

const PAGE_W: f64 = 595.0; // A4 portrait, points
const PAGE_H: f64 = 842.0;
const MARGIN: f64 = 30.0;
const USABLE_W: f64 = PAGE_W - 2.0 * MARGIN;

const TITLE_SIZE: f64 = 24.0;
const SECTION_SIZE: f64 = 18.0;
const BODY_SIZE: f64 = 10.0;
const HEADER_SIZE: f64 = 12.0;
// Average Helvetica glyph width as a fraction of font size, for fitting.
const GLYPH_W: f64 = 0.5;

/// Escape a string for a PDF literal, dropping non Latin-1 bytes.
fn pdf_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            '\\' => out.push_str("\\\\"),
            '\n' | '\r' => out.push(' '),
            c if (c as u32) < 256 => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

fn truncate_to_width(text: &str, width: f64, size: f64) -> String {
    let max_chars = (width / (GLYPH_W * size)).floor() as usize;
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}

/// One page's content stream under construction.
struct Page {
    content: String,
    y: f64,
}

impl Page {
    fn new() -> Self {
        Self { content: String::new(), y: PAGE_H - MARGIN }
    }

    fn text(&mut self, x: f64, size: f64, line: &str) {
        self.y -= size * 1.3;
        self.content.push_str(&format!(
            "BT /F1 {} Tf {:.1} {:.1} Td ({}) Tj ET\n",
            size,
            x,
            self.y,
            pdf_escape(line)
        ));
    }

    fn centered(&mut self, size: f64, line: &str) {
        let width = line.chars().count() as f64 * GLYPH_W * size;
        let x = ((PAGE_W - width) / 2.0).max(MARGIN);
        self.text(x, size, line);
    }

    fn rule(&mut self) {
        self.content.push_str(&format!(
            "{:.1} {:.1} m {:.1} {:.1} l S\n",
            MARGIN,
            self.y - 2.0,
            PAGE_W - MARGIN,
            self.y - 2.0
        ));
    }

    fn image(&mut self, name: &str, w: f64, h: f64) {
        self.y -= h + 6.0;
        self.content.push_str(&format!(
            "q {:.1} 0 0 {:.1} {:.1} {:.1} cm /{} Do Q\n",
            w, h, MARGIN, self.y, name
        ));
    }

    fn fits(&self, height: f64) -> bool {
        self.y - height >= MARGIN
    }
}

struct Document {
    done: Vec<Page>,
    current: Page,
    images: Vec<ChartImage>,
}

impl Document {
    fn new() -> Self {
        Self { done: Vec::new(), current: Page::new(), images: Vec::new() }
    }

    fn page(&mut self) -> &mut Page {
        &mut self.current
    }

    fn break_page(&mut self) {
        let finished = std::mem::replace(&mut self.current, Page::new());
        self.done.push(finished);
    }

    fn ensure(&mut self, height: f64) {
        if !self.current.fits(height) {
            self.break_page();
        }
    }

    fn section(&mut self, title: &str) {
        self.ensure(SECTION_SIZE * 3.0);
        self.page().y -= 8.0;
        self.page().text(MARGIN, SECTION_SIZE, title);
    }

    fn paragraph(&mut self, text: &str) {
        self.ensure(BODY_SIZE * 2.0);
        self.page().text(MARGIN, BODY_SIZE, text);
    }

    fn table(&mut self, table: &Table, placeholder: &str) {
        if table.is_empty() {
            self.paragraph(placeholder);
            return;
        }
        let cols = table.header.len();
        let col_w = USABLE_W / cols as f64;
        self.ensure(HEADER_SIZE * 3.0);

        let header_line = |page: &mut Page| {
            let y_before = page.y;
            for (i, cell) in table.header.iter().enumerate() {
                let x = MARGIN + i as f64 * col_w;
                page.y = y_before;
                page.text(x, HEADER_SIZE, &truncate_to_width(cell, col_w - 4.0, HEADER_SIZE));
            }
            page.rule();
        };
        header_line(self.page());

        for row in &table.rows {
            if !self.current.fits(BODY_SIZE * 2.0) {
                self.break_page();
                header_line(self.page());
            }
            let page = self.page();
            let y_before = page.y;
            for (i, cell) in row.iter().enumerate() {
                let x = MARGIN + i as f64 * col_w;
                page.y = y_before;
                page.text(x, BODY_SIZE, &truncate_to_width(cell, col_w - 4.0, BODY_SIZE));
            }
        }
    }

    fn chart(&mut self, image: &ChartImage) -> Result<()> {
        if image.jpeg.len() < 4 || image.jpeg[0] != 0xFF || image.jpeg[1] != 0xD8 {
            bail!("chart image `{}` is not a JPEG", image.label);
        }
        // Scale to usable width, capped at 260pt tall.
        let scale = (USABLE_W / f64::from(image.width)).min(260.0 / f64::from(image.height));
        let (w, h) = (f64::from(image.width) * scale, f64::from(image.height) * scale);
        self.ensure(h + 12.0);
        let name = format!("Im{}", self.images.len() + 1);
        self.images.push(image.clone());
        self.page().image(&name, w, h);
        Ok(())
    }
}

/// Serialize objects + xref. Object layout: 1 catalog, 2 page tree,
/// 3 font, 4.. images, then page/content pairs.
fn serialize(doc: Document) -> Vec<u8> {
    let mut pages = doc.done;
    pages.push(doc.current);

    let n_images = doc.images.len();
    let first_page_obj = 4 + n_images;
    let mut objects: Vec<(usize, Vec<u8>)> = Vec::new();

    let kids: Vec<String> = (0..pages.len())
        .map(|i| format!("{} 0 R", first_page_obj + 2 * i))
        .collect();
    objects.push((1, b"<< /Type /Catalog /Pages 2 0 R >>".to_vec()));
    objects.push((
        2,
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            pages.len()
        )
        .into_bytes(),
    ));
    objects.push((
        3,
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_vec(),
    ));

    for (i, image) in doc.images.iter().enumerate() {
        let mut body = format!(
            "<< /Type /XObject /Subtype /Image /Width {} /Height {} \
             /ColorSpace /DeviceRGB /BitsPerComponent 8 /Filter /DCTDecode /Length {} >>\nstream\n",
            image.width,
            image.height,
            image.jpeg.len()
        )
        .into_bytes();
        body.extend_from_slice(&image.jpeg);
        body.extend_from_slice(b"\nendstream");
        objects.push((4 + i, body));
    }

    let xobjects: String = (0..n_images)
        .map(|i| format!("/Im{} {} 0 R ", i + 1, 4 + i))
        .collect();
    for (i, page) in pages.iter().enumerate() {
        let page_obj = first_page_obj + 2 * i;
        let content_obj = page_obj + 1;
        objects.push((
            page_obj,
            format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] \
                 /Resources << /Font << /F1 3 0 R >> /XObject << {} >> >> /Contents {} 0 R >>",
                PAGE_W, PAGE_H, xobjects, content_obj
            )
            .into_bytes(),
        ));
        let stream = page.content.as_bytes();
        let mut body =
            format!("<< /Length {} >>\nstream\n", stream.len()).into_bytes();
        body.extend_from_slice(stream);
        body.extend_from_slice(b"\nendstream");
        objects.push((content_obj, body));
    }

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = vec![0usize; objects.len() + 1];
    for (id, body) in &objects {
        offsets[*id] = out.len();
        out.extend_from_slice(format!("{} 0 obj\n", id).as_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(b"\nendobj\n");
    }

    let xref_at = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets.iter().skip(1) {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_at
        )
        .as_bytes(),
    );
    out
}

pub fn encode(model: &ReportModel) -> Result<Vec<u8>> {
    let mut doc = Document::new();
    doc.page().centered(TITLE_SIZE, &model.title);
    doc.page().centered(BODY_SIZE, &model.generated_at);
    doc.page().rule();

    doc.section("Configuration");
    doc.table(&model.tables.config, NO_CONFIG);

    doc.section("Score Overview");
    match &model.overlay_image {
        Some(image) => doc.chart(image)?,
        None => doc.paragraph(NO_OVERLAY),
    }

    doc.section("Best Scores");
    doc.table(&model.tables.best, NO_SCORES);

    doc.section("Score Summary");
    doc.table(&model.tables.summary, NO_SCORES);

    doc.section("Running Updates");
    doc.table(&model.tables.updates, NO_UPDATES);

    doc.section("Individual Graphs");
    let mut any_image = false;
    for (label, image) in &model.trend_images {
        if let Some(image) = image {
            doc.paragraph(label);
            doc.chart(image)?;
            any_image = true;
        }
    }
    if !any_image {
        doc.paragraph(NO_VARIANT_GRAPHS);
    }

    doc.paragraph(&format!("report fingerprint: {}", model.fingerprint));
    Ok(serialize(doc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{ChartRenderer, Exporter, NullRenderer, ReportFormat};
    use crate::snapshot::capture;
    use crate::state::DashState;

    #[test]
    fn escapes_pdf_delimiters() {
        assert_eq!(pdf_escape("a(b)c\\d"), "a\\(b\\)c\\\\d");
    }

    #[test]
    fn emits_well_formed_skeleton() {
        let snap = capture(&DashState::new(10));
        let bytes = Exporter::new(Box::new(NullRenderer))
            .export(&snap, ReportFormat::Pdf)
            .unwrap()
            .bytes;
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.starts_with("%PDF-1.4"));
        assert!(text.contains("/Type /Catalog"));
        assert!(text.contains("trailer"));
        assert!(text.ends_with("%%EOF\n"));
    }

    #[test]
    fn long_tables_break_across_pages() {
        use crate::protocol::StreamMessage;
        use crate::state::{RunningUpdate, Stage};
        let mut state = DashState::new(500);
        let batch: Vec<RunningUpdate> = (0..200)
            .map(|i| RunningUpdate {
                timestamp: i,
                generation: 1,
                num_type: "f32".to_string(),
                mode: "solo".to_string(),
                variant: 0,
                stage: Stage::Running,
                message: format!("line {}", i),
            })
            .collect();
        state.apply(StreamMessage::Running(batch));
        let snap = capture(&state);
        let bytes = Exporter::default().export(&snap, ReportFormat::Pdf).unwrap().bytes;
        let text = String::from_utf8_lossy(&bytes);
        let pages = text.matches("/Type /Page ").count();
        assert!(pages >= 2, "expected page break, got {} page(s)", pages);
    }

    #[test]
    fn non_jpeg_chart_fails_encoding_without_side_effects() {
        struct BadRenderer;
        impl ChartRenderer for BadRenderer {
            fn render_overlay(
                &self,
                _: &[u32],
                _: &[crate::aggregate::OverlaySeries],
            ) -> Option<crate::report::ChartImage> {
                Some(crate::report::ChartImage {
                    label: "overlay".to_string(),
                    width: 10,
                    height: 10,
                    jpeg: vec![0, 1, 2],
                })
            }
            fn render_trend(
                &self,
                _: &crate::aggregate::TrendSeries,
            ) -> Option<crate::report::ChartImage> {
                None
            }
        }
        let snap = capture(&DashState::new(10));
        let exporter = Exporter::new(Box::new(BadRenderer));
        assert!(exporter.export(&snap, ReportFormat::Pdf).is_err());
        // The same snapshot still exports fine to other formats.
        assert!(exporter.export(&snap, ReportFormat::Preview).is_ok());
    }
}
