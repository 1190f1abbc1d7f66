// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Length-prefixed JSON framing for byte-stream transports.
//
// Each frame is a 4-byte big-endian payload length followed by one JSON
// document. Oversized frames are rejected before any payload is allocated.

use std::io::{self, Read, Write};

use crate::error::{Result, TetherError};
use crate::protocol::{BridgeEnvelope, ScriptEnvelope};

/// Default cap for frames in either direction (1 MiB).
pub const DEFAULT_FRAME_CAP: usize = 1_048_576;

/// Read one frame. Returns `Ok(None)` on a clean end of stream (EOF before
/// the length prefix).
pub fn read_frame(reader: &mut impl Read, max_payload: usize) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0_u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_payload {
        return Err(TetherError::Protocol(format!(
            "frame too large: {len} > {max_payload}"
        )));
    }

    let mut payload = vec![0_u8; len];
    reader.read_exact(&mut payload)?;
    Ok(Some(payload))
}

/// Write one frame and its length prefix.
pub fn write_frame(writer: &mut impl Write, payload: &[u8], max_payload: usize) -> Result<()> {
    if payload.len() > max_payload {
        return Err(TetherError::Protocol(format!(
            "frame too large: {} > {max_payload}",
            payload.len()
        )));
    }

    let len = u32::try_from(payload.len())
        .map_err(|_| TetherError::Protocol("payload exceeds u32".into()))?;

    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    Ok(())
}

pub fn decode_script_envelope(payload: &[u8]) -> Result<ScriptEnvelope> {
    Ok(serde_json::from_slice(payload)?)
}

pub fn encode_bridge_envelope(envelope: &BridgeEnvelope) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(envelope)?)
}
