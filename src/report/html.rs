//! Flowable preview markup. Section order and placeholder sentences match
//! the documents byte-for-byte on data content; only the decoration is
//! HTML's.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use super::table::{Table, NO_CONFIG, NO_OVERLAY, NO_SCORES, NO_UPDATES, NO_VARIANT_GRAPHS};
use super::{ChartImage, ReportModel};

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn table_html(out: &mut String, table: &Table, placeholder: &str) {
    if table.is_empty() {
        out.push_str(&format!("<p>{}</p>\n", escape(placeholder)));
        return;
    }
    out.push_str("<table border=\"1\" cellspacing=\"0\" cellpadding=\"6\">\n<tr>");
    for cell in &table.header {
        out.push_str(&format!("<th>{}</th>", escape(cell)));
    }
    out.push_str("</tr>\n");
    for row in &table.rows {
        out.push_str("<tr>");
        for cell in row {
            out.push_str(&format!("<td>{}</td>", escape(cell)));
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</table>\n");
}

fn image_html(out: &mut String, image: &ChartImage) {
    out.push_str(&format!(
        "<p><img src=\"data:image/jpeg;base64,{}\" width=\"{}\" height=\"{}\" alt=\"{}\"/></p>\n",
        BASE64.encode(&image.jpeg),
        image.width,
        image.height,
        escape(&image.label),
    ));
}

pub fn encode(model: &ReportModel) -> String {
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"/><title>");
    out.push_str(&escape(&model.title));
    out.push_str("</title></head>\n<body>\n");
    out.push_str(&format!(
        "<h1 style=\"text-align:center;\">{}</h1>\n",
        escape(&model.title)
    ));
    out.push_str(&format!(
        "<p style=\"text-align:center;\">{}</p>\n<hr/>\n",
        escape(&model.generated_at)
    ));

    out.push_str("<h2>Configuration</h2>\n");
    table_html(&mut out, &model.tables.config, NO_CONFIG);

    out.push_str("<h2>Score Overview</h2>\n");
    match &model.overlay_image {
        Some(image) => image_html(&mut out, image),
        None => out.push_str(&format!("<p>{}</p>\n", NO_OVERLAY)),
    }

    out.push_str("<h2>Best Scores</h2>\n");
    table_html(&mut out, &model.tables.best, NO_SCORES);

    out.push_str("<h2>Score Summary</h2>\n");
    table_html(&mut out, &model.tables.summary, NO_SCORES);

    out.push_str("<h2>Running Updates</h2>\n");
    table_html(&mut out, &model.tables.updates, NO_UPDATES);

    out.push_str("<h2>Individual Graphs</h2>\n");
    let mut any_image = false;
    for (label, image) in &model.trend_images {
        if let Some(image) = image {
            out.push_str(&format!("<p><strong>{}</strong></p>\n", escape(label)));
            image_html(&mut out, image);
            any_image = true;
        }
    }
    if !any_image {
        out.push_str(&format!("<p>{}</p>\n", NO_VARIANT_GRAPHS));
    }

    out.push_str(&format!(
        "<hr/>\n<p><small>report fingerprint: {}</small></p>\n",
        model.fingerprint
    ));
    out.push_str("</body>\n</html>\n");
    out
}
