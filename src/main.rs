use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};

use flukeboard::feed::{control_channel, run_feed};
use flukeboard::layout::{LayoutStore, Widget};
use flukeboard::logging::{log, obj, v_num, v_str, Domain, Level};
use flukeboard::protocol::ControlMessage;
use flukeboard::report::{ExportArtifact, Exporter, ReportFormat};
use flukeboard::snapshot::capture;
use flukeboard::state::{Config, DashState};

/// Default panel set, written once into an empty layout table.
fn default_layout() -> Vec<Widget> {
    let titles = [
        ("status", "Cluster Status"),
        ("config", "Experiment Configuration"),
        ("scores", "Score Overview"),
        ("updates", "Running Updates"),
        ("graphs", "Individual Graphs"),
    ];
    titles
        .iter()
        .enumerate()
        .map(|(position, (id, title))| Widget {
            id: (*id).to_string(),
            title: (*title).to_string(),
            position: position as i64,
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("ws_url", v_str(&cfg.ws_url)),
            ("export_secs", v_num(cfg.export_secs as f64)),
            ("export_dir", v_str(&cfg.export_dir)),
            ("max_update_log", v_num(cfg.max_update_log as f64)),
        ]),
    );

    std::fs::create_dir_all(&cfg.export_dir)
        .with_context(|| format!("creating export dir `{}`", cfg.export_dir))?;

    let mut store = LayoutStore::new(&cfg.sqlite_path)?;
    store.init()?;
    if store.load_layout()?.is_empty() {
        store.save_layout(&default_layout())?;
        log(Level::Info, Domain::Layout, "layout_seeded", obj(&[]));
    }

    let (events_tx, mut events_rx) = mpsc::channel(cfg.channel_capacity);
    let (control, control_rx) = control_channel(cfg.channel_capacity);
    let feed_url = cfg.ws_url.clone();
    tokio::spawn(async move {
        match run_feed(feed_url, events_tx, control_rx).await {
            Ok(()) => log(Level::Info, Domain::Stream, "feed_ended", obj(&[])),
            Err(err) => log(
                Level::Error,
                Domain::Stream,
                "feed_failed",
                obj(&[("error", v_str(&format!("{:#}", err)))]),
            ),
        }
    });

    let exporter = Arc::new(Exporter::default());
    let (artifacts_tx, mut artifacts_rx) = mpsc::channel::<ExportArtifact>(ReportFormat::ALL.len());
    let mut ticker = interval(Duration::from_secs(cfg.export_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // Single-writer loop: all store mutation and journal writes happen here.
    let mut state = DashState::new(cfg.max_update_log);
    let mut last_exported_version = 0u64;
    let mut autorun_sent = !cfg.autorun;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log(
                    Level::Info,
                    Domain::System,
                    "shutdown",
                    obj(&[
                        ("applied", v_num(state.applied() as f64)),
                        ("ignored_unknown", v_num(state.ignored_unknown() as f64)),
                    ]),
                );
                break;
            }
            Some(msg) = events_rx.recv() => {
                let kind = msg.kind().to_string();
                let applied = state.apply(msg);
                log(
                    Level::Debug,
                    Domain::State,
                    "applied",
                    obj(&[
                        ("kind", v_str(&kind)),
                        ("result", v_str(&format!("{:?}", applied))),
                        ("version", v_num(state.version() as f64)),
                    ]),
                );
                if !autorun_sent && control.is_ready() {
                    autorun_sent = control.send(ControlMessage::run());
                }
            }
            Some(artifact) = artifacts_rx.recv() => {
                if let Err(err) = store.record_export(&artifact) {
                    log(
                        Level::Error,
                        Domain::Layout,
                        "journal_failed",
                        obj(&[
                            ("file", v_str(&artifact.file_name)),
                            ("error", v_str(&format!("{:#}", err))),
                        ]),
                    );
                }
            }
            _ = ticker.tick() => {
                if state.version() == last_exported_version {
                    log(
                        Level::Debug,
                        Domain::Export,
                        "skipped_unchanged",
                        obj(&[("version", v_num(state.version() as f64))]),
                    );
                    continue;
                }
                last_exported_version = state.version();
                // Capture synchronously between applies; encoding runs off
                // this task against the frozen snapshot.
                let snapshot = capture(&state);
                let exporter = Arc::clone(&exporter);
                let dir = cfg.export_dir.clone();
                let results = artifacts_tx.clone();
                tokio::spawn(async move {
                    let model = exporter.assemble(&snapshot);
                    for format in ReportFormat::ALL {
                        // Failures are logged by the exporter; the other
                        // formats still go out.
                        let Ok(artifact) = exporter.encode(&snapshot, &model, format) else {
                            continue;
                        };
                        let path = Path::new(&dir).join(&artifact.file_name);
                        if let Err(err) = std::fs::write(&path, &artifact.bytes) {
                            log(
                                Level::Error,
                                Domain::Export,
                                "write_failed",
                                obj(&[
                                    ("file", v_str(&artifact.file_name)),
                                    ("error", v_str(&err.to_string())),
                                ]),
                            );
                            continue;
                        }
                        let _ = results.send(artifact).await;
                    }
                });
            }
        }
    }
    Ok(())
}
