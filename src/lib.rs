//! Headless telemetry core for the OpenFluke experiment dashboard.
//!
//! A websocket feed of status, config, score and progress messages is
//! folded into a single in-memory store; immutable snapshots of that
//! store are aggregated and exported as HTML, PDF and Word reports on a
//! timer. Widget layout and the export journal persist in sqlite.

pub mod aggregate;
pub mod feed;
pub mod layout;
pub mod logging;
pub mod protocol;
pub mod report;
pub mod snapshot;
pub mod state;
