//! Websocket client for the status stream.
//!
//! Connects to the backend's status endpoint, decodes each text frame and
//! forwards it over a channel to the single state-owning task. Malformed
//! frames are logged and dropped; the stream never takes the process down.
//! Reconnection policy is the caller's concern: `run_feed` returns when
//! the connection ends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::logging::{log, obj, v_num, v_str, Domain, Level};
use crate::protocol::{decode, ControlMessage, StreamMessage};

/// Sender side for outbound `experiment_control` frames. Sends are gated
/// on the socket being open: a command issued while disconnected is a
/// logged no-op, never an error and never queued for later.
#[derive(Clone)]
pub struct ControlHandle {
    ready: Arc<AtomicBool>,
    tx: mpsc::Sender<ControlMessage>,
}

impl ControlHandle {
    /// Returns whether the command was accepted for sending.
    pub fn send(&self, msg: ControlMessage) -> bool {
        if !self.ready.load(Ordering::SeqCst) {
            log(
                Level::Warn,
                Domain::Stream,
                "control_dropped",
                obj(&[
                    ("action", v_str(&msg.action)),
                    ("reason", v_str("socket not open")),
                ]),
            );
            return false;
        }
        match self.tx.try_send(msg) {
            Ok(()) => true,
            Err(err) => {
                log(
                    Level::Warn,
                    Domain::Stream,
                    "control_dropped",
                    obj(&[("reason", v_str(&err.to_string()))]),
                );
                false
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Feed-side end of the control channel.
pub struct ControlReceiver {
    ready: Arc<AtomicBool>,
    rx: mpsc::Receiver<ControlMessage>,
}

pub fn control_channel(capacity: usize) -> (ControlHandle, ControlReceiver) {
    let ready = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel(capacity);
    (
        ControlHandle { ready: Arc::clone(&ready), tx },
        ControlReceiver { ready, rx },
    )
}

/// Connect-decode-forward loop for one connection. Returns when the
/// socket closes or the event receiver is dropped.
pub async fn run_feed(
    ws_url: String,
    events: mpsc::Sender<StreamMessage>,
    mut control: ControlReceiver,
) -> Result<()> {
    Url::parse(&ws_url).with_context(|| format!("invalid status stream url `{}`", ws_url))?;
    let (ws, _) = connect_async(ws_url.as_str())
        .await
        .with_context(|| format!("connecting to `{}`", ws_url))?;
    control.ready.store(true, Ordering::SeqCst);
    log(Level::Info, Domain::Stream, "connected", obj(&[("url", v_str(&ws_url))]));

    let (mut write, mut read) = ws.split();
    loop {
        tokio::select! {
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match decode(&text) {
                            Ok(msg) => {
                                // Unrecognized kinds flow through too; the
                                // store counts them as no-ops.
                                if events.send(msg).await.is_err() {
                                    break;
                                }
                            }
                            Err(err) => {
                                log(
                                    Level::Warn,
                                    Domain::Stream,
                                    "frame_dropped",
                                    obj(&[
                                        ("error", v_str(&err.to_string())),
                                        ("bytes", v_num(text.len() as f64)),
                                    ]),
                                );
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if write.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // binary/pong frames are not part of the protocol
                    Some(Err(err)) => {
                        log(
                            Level::Warn,
                            Domain::Stream,
                            "read_error",
                            obj(&[("error", v_str(&err.to_string()))]),
                        );
                        break;
                    }
                }
            }
            cmd = control.rx.recv() => {
                match cmd {
                    Some(cmd) => {
                        log(
                            Level::Info,
                            Domain::Stream,
                            "control_sent",
                            obj(&[("action", v_str(&cmd.action))]),
                        );
                        if write.send(Message::Text(cmd.to_frame())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    control.ready.store(false, Ordering::SeqCst);
    log(Level::Warn, Domain::Stream, "disconnected", obj(&[("url", v_str(&ws_url))]));
    Ok(())
}
