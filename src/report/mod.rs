//! Snapshot export: one frozen [`Snapshot`] in, one document out.
//!
//! Every format renders from the same [`ReportModel`] — tables built once,
//! chart images collected once — so identical snapshots produce identical
//! data values in the preview, the PDF and the word document. A sha256
//! fingerprint of the table content is stamped into each artifact to make
//! that equality checkable after the fact.

pub mod docx;
pub mod html;
pub mod pdf;
pub mod table;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use crate::aggregate::{OverlaySeries, TrendSeries};
use crate::logging::{log, obj, v_num, v_str, Domain, Level};
use crate::snapshot::Snapshot;
use table::{build_tables, fmt_datetime, Tables};

pub const REPORT_TITLE: &str = "OpenFluke Experiment Report";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Preview,
    Pdf,
    Docx,
}

impl ReportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFormat::Preview => "preview",
            ReportFormat::Pdf => "pdf",
            ReportFormat::Docx => "docx",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Preview => "html",
            ReportFormat::Pdf => "pdf",
            // Single-file WordprocessingML; Word opens it natively.
            ReportFormat::Docx => "doc.xml",
        }
    }

    pub const ALL: [ReportFormat; 3] =
        [ReportFormat::Preview, ReportFormat::Pdf, ReportFormat::Docx];
}

/// A rasterized chart, supplied by the renderer collaborator. JPEG so the
/// PDF encoder can embed it without transcoding.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartImage {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub jpeg: Vec<u8>,
}

/// The seam where a real rasterizer plugs in. Returning `None` is always
/// legal; exporters substitute an explicit placeholder instead of failing.
pub trait ChartRenderer: Send + Sync {
    fn render_overlay(&self, generations: &[u32], series: &[OverlaySeries]) -> Option<ChartImage>;
    fn render_trend(&self, trend: &TrendSeries) -> Option<ChartImage>;
}

/// Default renderer: no rasterizer attached, every section shows its
/// placeholder text.
pub struct NullRenderer;

impl ChartRenderer for NullRenderer {
    fn render_overlay(&self, _: &[u32], _: &[OverlaySeries]) -> Option<ChartImage> {
        None
    }

    fn render_trend(&self, _: &TrendSeries) -> Option<ChartImage> {
        None
    }
}

/// Everything an encoder needs, fully materialized.
#[derive(Debug, Clone)]
pub struct ReportModel {
    pub title: String,
    pub generated_at: String,
    pub fingerprint: String,
    pub tables: Tables,
    pub overlay_image: Option<ChartImage>,
    /// One entry per `(num_type, mode)` trend, image optional.
    pub trend_images: Vec<(String, Option<ChartImage>)>,
}

/// sha256 over header and cell content of all four tables. Images and
/// timestamps are excluded on purpose: the fingerprint tracks data values,
/// which is exactly what must match across formats.
fn fingerprint(tables: &Tables) -> String {
    let mut hasher = Sha256::new();
    for table in [&tables.config, &tables.best, &tables.summary, &tables.updates] {
        for cell in &table.header {
            hasher.update(cell.as_bytes());
            hasher.update([0x1f]);
        }
        hasher.update([0x1e]);
        for row in &table.rows {
            for cell in row {
                hasher.update(cell.as_bytes());
                hasher.update([0x1f]);
            }
            hasher.update([0x1e]);
        }
    }
    hex::encode(hasher.finalize())
}

/// One finished export.
#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub format: ReportFormat,
    pub file_name: String,
    pub fingerprint: String,
    pub taken_at: i64,
    pub bytes: Vec<u8>,
}

pub struct Exporter {
    renderer: Box<dyn ChartRenderer>,
}

impl Exporter {
    pub fn new(renderer: Box<dyn ChartRenderer>) -> Self {
        Self { renderer }
    }

    /// Build the shared model: rendering phase (chart images) then
    /// assembling phase (tables + fingerprint).
    pub fn assemble(&self, snapshot: &Snapshot) -> ReportModel {
        self.phase(snapshot, "rendering");
        let overlay_image = self.renderer.render_overlay(&snapshot.generations, &snapshot.overlay);
        let trend_images = snapshot
            .trends
            .iter()
            .map(|trend| (trend.key.label(), self.renderer.render_trend(trend)))
            .collect();

        self.phase(snapshot, "assembling");
        let tables = build_tables(snapshot);
        let fingerprint = fingerprint(&tables);
        ReportModel {
            title: REPORT_TITLE.to_string(),
            generated_at: fmt_datetime(snapshot.taken_at),
            fingerprint,
            tables,
            overlay_image,
            trend_images,
        }
    }

    /// Render one snapshot to one format. Failure is recoverable: state
    /// and previously produced artifacts are untouched, and the same
    /// snapshot can be re-exported to any format afterwards.
    pub fn export(&self, snapshot: &Snapshot, format: ReportFormat) -> Result<ExportArtifact> {
        let model = self.assemble(snapshot);
        self.encode(snapshot, &model, format)
    }

    /// Encode an already-assembled model. Lets the caller share one model
    /// across all three formats of the same snapshot.
    pub fn encode(
        &self,
        snapshot: &Snapshot,
        model: &ReportModel,
        format: ReportFormat,
    ) -> Result<ExportArtifact> {
        self.phase(snapshot, "encoding");
        let encoded = match format {
            ReportFormat::Preview => Ok(html::encode(model).into_bytes()),
            ReportFormat::Pdf => pdf::encode(model),
            ReportFormat::Docx => Ok(docx::encode(model).into_bytes()),
        };
        match encoded {
            Ok(bytes) => {
                let artifact = ExportArtifact {
                    format,
                    file_name: format!(
                        "openfluke_report_{}.{}",
                        snapshot.taken_at,
                        format.extension()
                    ),
                    fingerprint: model.fingerprint.clone(),
                    taken_at: snapshot.taken_at,
                    bytes,
                };
                log(
                    Level::Info,
                    Domain::Export,
                    "done",
                    obj(&[
                        ("format", v_str(format.as_str())),
                        ("file", v_str(&artifact.file_name)),
                        ("bytes", v_num(artifact.bytes.len() as f64)),
                        ("fingerprint", v_str(&artifact.fingerprint[..16])),
                    ]),
                );
                Ok(artifact)
            }
            Err(err) => {
                log(
                    Level::Error,
                    Domain::Export,
                    "failed",
                    obj(&[
                        ("format", v_str(format.as_str())),
                        ("phase", v_str("encoding")),
                        ("error", v_str(&format!("{:#}", err))),
                    ]),
                );
                Err(err).with_context(|| format!("{} export failed", format.as_str()))
            }
        }
    }

    fn phase(&self, snapshot: &Snapshot, phase: &str) {
        log(
            Level::Debug,
            Domain::Export,
            phase,
            obj(&[("taken_at", v_num(snapshot.taken_at as f64))]),
        );
    }
}

impl Default for Exporter {
    fn default() -> Self {
        Self::new(Box::new(NullRenderer))
    }
}
