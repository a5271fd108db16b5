//! Word document output as single-file WordprocessingML (the Word 2003
//! XML format). No archive container needed: one XML stream, tables as
//! `w:tbl`, chart JPEGs inlined through `w:binData`. Word opens it
//! directly via the `mso-application` processing instruction.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use super::html::escape;
use super::table::{Table, NO_CONFIG, NO_OVERLAY, NO_SCORES, NO_UPDATES, NO_VARIANT_GRAPHS};
use super::{ChartImage, ReportModel};

// Run sizes are half-points: 48 = 24pt title, 36 = 18pt heading.
const TITLE_SZ: u32 = 48;
const HEADING_SZ: u32 = 36;

fn run(out: &mut String, text: &str, sz: Option<u32>, bold: bool) {
    out.push_str("<w:r><w:rPr>");
    if bold {
        out.push_str("<w:b/>");
    }
    if let Some(sz) = sz {
        out.push_str(&format!("<w:sz w:val=\"{}\"/>", sz));
    }
    out.push_str("</w:rPr><w:t>");
    out.push_str(&escape(text));
    out.push_str("</w:t></w:r>");
}

fn paragraph(out: &mut String, text: &str) {
    out.push_str("<w:p>");
    run(out, text, None, false);
    out.push_str("</w:p>\n");
}

fn heading(out: &mut String, text: &str, sz: u32, centered: bool) {
    out.push_str("<w:p>");
    if centered {
        out.push_str("<w:pPr><w:jc w:val=\"center\"/></w:pPr>");
    }
    run(out, text, Some(sz), true);
    out.push_str("</w:p>\n");
}

fn table_xml(out: &mut String, table: &Table, placeholder: &str) {
    if table.is_empty() {
        paragraph(out, placeholder);
        return;
    }
    out.push_str(
        "<w:tbl><w:tblPr><w:tblBorders>\
         <w:top w:val=\"single\" w:sz=\"4\"/><w:bottom w:val=\"single\" w:sz=\"4\"/>\
         <w:left w:val=\"single\" w:sz=\"4\"/><w:right w:val=\"single\" w:sz=\"4\"/>\
         <w:insideH w:val=\"single\" w:sz=\"4\"/><w:insideV w:val=\"single\" w:sz=\"4\"/>\
         </w:tblBorders></w:tblPr>\n",
    );
    out.push_str("<w:tr>");
    for cell in &table.header {
        out.push_str("<w:tc><w:p>");
        run(out, cell, None, true);
        out.push_str("</w:p></w:tc>");
    }
    out.push_str("</w:tr>\n");
    for row in &table.rows {
        out.push_str("<w:tr>");
        for cell in row {
            out.push_str("<w:tc><w:p>");
            run(out, cell, None, false);
            out.push_str("</w:p></w:tc>");
        }
        out.push_str("</w:tr>\n");
    }
    out.push_str("</w:tbl>\n<w:p/>\n");
}

fn image_xml(out: &mut String, image: &ChartImage, index: usize) {
    // Display size in points; cap width at the printable area (~535pt).
    let scale = (535.0 / f64::from(image.width)).min(1.0);
    let (w, h) = (
        f64::from(image.width) * scale,
        f64::from(image.height) * scale,
    );
    out.push_str(&format!(
        "<w:p><w:r><w:pict>\
         <w:binData w:name=\"wordml://chart{idx}.jpg\">{data}</w:binData>\
         <v:shape style=\"width:{w:.0}pt;height:{h:.0}pt\">\
         <v:imagedata src=\"wordml://chart{idx}.jpg\" o:title=\"{title}\"/>\
         </v:shape>\
         </w:pict></w:r></w:p>\n",
        idx = index,
        data = BASE64.encode(&image.jpeg),
        w = w,
        h = h,
        title = escape(&image.label),
    ));
}

pub fn encode(model: &ReportModel) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n");
    out.push_str("<?mso-application progid=\"Word.Document\"?>\n");
    out.push_str(
        "<w:wordDocument \
         xmlns:w=\"http://schemas.microsoft.com/office/word/2003/wordml\" \
         xmlns:v=\"urn:schemas-microsoft-com:vml\" \
         xmlns:o=\"urn:schemas-microsoft-com:office:office\">\n<w:body>\n",
    );

    heading(&mut out, &model.title, TITLE_SZ, true);
    out.push_str("<w:p><w:pPr><w:jc w:val=\"center\"/></w:pPr>");
    run(&mut out, &model.generated_at, None, false);
    out.push_str("</w:p>\n");

    let mut image_index = 0usize;

    heading(&mut out, "Configuration", HEADING_SZ, false);
    table_xml(&mut out, &model.tables.config, NO_CONFIG);

    heading(&mut out, "Score Overview", HEADING_SZ, false);
    match &model.overlay_image {
        Some(image) => {
            image_index += 1;
            image_xml(&mut out, image, image_index);
        }
        None => paragraph(&mut out, NO_OVERLAY),
    }

    heading(&mut out, "Best Scores", HEADING_SZ, false);
    table_xml(&mut out, &model.tables.best, NO_SCORES);

    heading(&mut out, "Score Summary", HEADING_SZ, false);
    table_xml(&mut out, &model.tables.summary, NO_SCORES);

    heading(&mut out, "Running Updates", HEADING_SZ, false);
    table_xml(&mut out, &model.tables.updates, NO_UPDATES);

    heading(&mut out, "Individual Graphs", HEADING_SZ, false);
    let mut any_image = false;
    for (label, image) in &model.trend_images {
        if let Some(image) = image {
            paragraph(&mut out, label);
            image_index += 1;
            image_xml(&mut out, image, image_index);
            any_image = true;
        }
    }
    if !any_image {
        paragraph(&mut out, NO_VARIANT_GRAPHS);
    }

    paragraph(&mut out, &format!("report fingerprint: {}", model.fingerprint));
    out.push_str("</w:body>\n</w:wordDocument>\n");
    out
}
