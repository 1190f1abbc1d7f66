// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stdio transport: framed script envelopes in, framed bridge envelopes out.
//
// The calling thread reads and routes inbound frames; a dedicated writer
// thread drains the runtime's outbound channel. The session ends at end of
// input or on an unrecoverable framing error. Undecodable frames are skipped.

use std::io::{Read, Write};
use std::thread::JoinHandle;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, instrument, warn};

use tether_core::codec::{decode_script_envelope, encode_bridge_envelope, read_frame, write_frame};
use tether_core::error::{Result, TetherError};
use tether_core::protocol::BridgeEnvelope;
use tether_core::types::CallResponse;
use tether_runtime::{BridgeRuntime, Platform};

use crate::lifecycle::{self, AppState};

/// Frame counts for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeSummary {
    pub frames_in: usize,
    pub frames_out: usize,
    /// Inbound frames that did not decode as an envelope.
    pub rejected: usize,
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Encode `envelope`, swapping an oversized call result for an error so the
/// caller is not left waiting.
fn encode_capped(envelope: &BridgeEnvelope, cap: usize) -> Result<Vec<u8>> {
    let frame = encode_bridge_envelope(envelope)?;
    if frame.len() <= cap {
        return Ok(frame);
    }
    match envelope {
        BridgeEnvelope::CallResult { call_id, .. } => {
            warn!(call = %call_id, size = frame.len(), cap, "call result over the frame cap");
            encode_bridge_envelope(&BridgeEnvelope::CallResult {
                call_id: *call_id,
                response: CallResponse::err(format!("result exceeds the {cap}-byte frame cap")),
            })
        }
        _ => Err(TetherError::Protocol(format!(
            "outbound frame too large: {} > {cap}",
            frame.len()
        ))),
    }
}

fn spawn_writer(
    mut outbound: UnboundedReceiver<BridgeEnvelope>,
    mut output: impl Write + Send + 'static,
    cap: usize,
) -> Result<JoinHandle<usize>> {
    let handle = std::thread::Builder::new()
        .name("tether-writer".into())
        .spawn(move || {
            let mut written = 0;
            while let Some(envelope) = outbound.blocking_recv() {
                let frame = match encode_capped(&envelope, cap) {
                    Ok(frame) => frame,
                    Err(err) => {
                        warn!(error = %err, "outbound envelope dropped");
                        continue;
                    }
                };
                let sent = write_frame(&mut output, &frame, cap)
                    .and_then(|()| output.flush().map_err(TetherError::from));
                if let Err(err) = sent {
                    error!(error = %err, "output closed; writer stopping");
                    break;
                }
                written += 1;
            }
            debug!(written, "writer finished");
            written
        })?;
    Ok(handle)
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Run one session over `input`/`output`, then shut the runtime down.
#[instrument(skip_all, fields(platform = runtime.platform().name()))]
pub fn serve<P: Platform>(
    mut runtime: BridgeRuntime<P>,
    outbound: UnboundedReceiver<BridgeEnvelope>,
    mut input: impl Read,
    output: impl Write + Send + 'static,
) -> Result<ServeSummary> {
    let inbound_cap = runtime.config().max_inbound_frame;
    let writer = spawn_writer(outbound, output, runtime.config().max_outbound_frame)?;

    runtime.ready();
    let bus = runtime.bus();
    lifecycle::bridge_ready(&bus, runtime.platform().name(), &runtime.config().session);
    lifecycle::app_state(&bus, AppState::Active);

    let mut summary = ServeSummary::default();
    let mut failure = None;
    loop {
        let payload = match read_frame(&mut input, inbound_cap) {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                info!("script side closed the stream");
                break;
            }
            Err(err) => {
                error!(error = %err, "inbound stream unusable");
                failure = Some(err);
                break;
            }
        };
        summary.frames_in += 1;

        let envelope = match decode_script_envelope(&payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                summary.rejected += 1;
                warn!(error = %err, "undecodable envelope skipped");
                continue;
            }
        };
        if let Err(err) = runtime.handle_envelope(envelope) {
            error!(error = %err, "UI thread unavailable");
            failure = Some(err);
            break;
        }
    }

    lifecycle::app_state(&bus, AppState::Background);
    runtime.shutdown();
    // Dropping the runtime closes the outbound channel and ends the writer.
    drop(bus);
    drop(runtime);
    summary.frames_out = writer
        .join()
        .map_err(|_| TetherError::Dispatch("writer thread panicked".into()))?;

    info!(
        frames_in = summary.frames_in,
        frames_out = summary.frames_out,
        rejected = summary.rejected,
        "session ended"
    );
    match failure {
        Some(err) => Err(err),
        None => Ok(summary),
    }
}
