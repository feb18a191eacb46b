//! Trade journal — append-only record of settled trades with checksums
//!
//! Every settled trade is appended and fsynced before the settlement is
//! considered complete, so the trade history survives a crash. On open the
//! journal is scanned back; a torn or corrupt tail entry (a crash mid-write)
//! is detected by its CRC32C and truncated away, keeping everything before
//! it.
//!
//! # Binary format (per entry)
//! ```text
//! [body_len:  u32]
//! [sequence:  u64]
//! [timestamp: i64]   // Unix nanos of the trade's creation
//! [payload_len: u32][payload: bytes]   // bincode-encoded Trade
//! [checksum: u32]    // CRC32C over sequence+timestamp+payload
//! ```

use crc32c::crc32c;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;
use types::trade::Trade;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

// ── Wire helpers ────────────────────────────────────────────────────

fn compute_checksum(sequence: u64, timestamp: i64, payload: &[u8]) -> u32 {
    let mut buf = Vec::with_capacity(8 + 8 + payload.len());
    buf.extend_from_slice(&sequence.to_le_bytes());
    buf.extend_from_slice(&timestamp.to_le_bytes());
    buf.extend_from_slice(payload);
    crc32c(&buf)
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    bytes
        .get(offset..offset + 4)
        .map(|b| u32::from_le_bytes(b.try_into().unwrap()))
}

fn read_u64(bytes: &[u8], offset: usize) -> Option<u64> {
    bytes
        .get(offset..offset + 8)
        .map(|b| u64::from_le_bytes(b.try_into().unwrap()))
}

/// Scan journal bytes, returning decoded trades and the length of the
/// valid prefix. Stops at the first torn or corrupt entry.
fn scan(bytes: &[u8]) -> (Vec<Trade>, u64) {
    let mut trades = Vec::new();
    let mut offset = 0usize;

    loop {
        let Some(body_len) = read_u32(bytes, offset) else {
            break;
        };
        let body_start = offset + 4;
        let body_end = body_start + body_len as usize;
        if bytes.len() < body_end || body_len < 24 {
            break; // torn tail
        }

        let Some(sequence) = read_u64(bytes, body_start) else {
            break;
        };
        let timestamp = match read_u64(bytes, body_start + 8) {
            Some(raw) => raw as i64,
            None => break,
        };
        let Some(payload_len) = read_u32(bytes, body_start + 16) else {
            break;
        };
        let payload_start = body_start + 20;
        let payload_end = payload_start + payload_len as usize;
        if payload_end + 4 != body_end {
            break;
        }
        let payload = &bytes[payload_start..payload_end];
        let Some(stored_crc) = read_u32(bytes, payload_end) else {
            break;
        };

        if compute_checksum(sequence, timestamp, payload) != stored_crc {
            break;
        }
        let Ok(trade) = bincode::deserialize::<Trade>(payload) else {
            break;
        };

        trades.push(trade);
        offset = body_end;
    }

    (trades, offset as u64)
}

// ── Journal ─────────────────────────────────────────────────────────

/// Append-only journal of settled trades.
pub struct TradeJournal {
    path: PathBuf,
    writer: BufWriter<File>,
    sequence: u64,
}

impl TradeJournal {
    /// Open (or create) a journal, recovering every intact trade already
    /// on disk. A corrupt tail is truncated with a warning.
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, Vec<Trade>), JournalError> {
        let path = path.as_ref().to_path_buf();

        let trades = match std::fs::read(&path) {
            Ok(bytes) => {
                let total = bytes.len() as u64;
                let (trades, valid_len) = scan(&bytes);
                if valid_len < total {
                    warn!(
                        path = %path.display(),
                        dropped_bytes = total - valid_len,
                        "truncating corrupt journal tail"
                    );
                    let file = OpenOptions::new().write(true).open(&path)?;
                    file.set_len(valid_len)?;
                    file.sync_all()?;
                }
                trades
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err.into()),
        };

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let journal = Self {
            path,
            writer: BufWriter::new(file),
            sequence: trades.len() as u64,
        };
        Ok((journal, trades))
    }

    /// Append one trade and sync it to disk before returning.
    pub fn append(&mut self, trade: &Trade) -> Result<(), JournalError> {
        let payload =
            bincode::serialize(trade).map_err(|e| JournalError::Serialization(e.to_string()))?;
        let timestamp = trade.created_at.timestamp_nanos_opt().unwrap_or(0);
        let checksum = compute_checksum(self.sequence, timestamp, &payload);

        let payload_len = payload.len() as u32;
        // body = 8 (seq) + 8 (ts) + 4 (payload_len) + payload + 4 (crc)
        let body_len: u32 = 8 + 8 + 4 + payload_len + 4;

        let mut buf = Vec::with_capacity(4 + body_len as usize);
        buf.extend_from_slice(&body_len.to_le_bytes());
        buf.extend_from_slice(&self.sequence.to_le_bytes());
        buf.extend_from_slice(&timestamp.to_le_bytes());
        buf.extend_from_slice(&payload_len.to_le_bytes());
        buf.extend_from_slice(&payload);
        buf.extend_from_slice(&checksum.to_le_bytes());

        self.writer.write_all(&buf)?;
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;

        self.sequence += 1;
        Ok(())
    }

    /// Number of trades appended over the journal's lifetime.
    pub fn len(&self) -> u64 {
        self.sequence
    }

    pub fn is_empty(&self) -> bool {
        self.sequence == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
