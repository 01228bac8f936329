//! Error types for the gateway library
//!
//! Contract violations and persistence failures are reported as [`BridgeError`].
//! Application edges (startup, config loading) wrap these in `anyhow`.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the library layer
#[derive(Debug, Error)]
pub enum BridgeError {
    /// MIDI channel outside 0-15
    #[error("MIDI channel {0} out of range (must be 0-15)")]
    ChannelOutOfRange(u8),

    /// Display row index past the end of the profile table
    #[error("row {index} out of range (table has {len} rows)")]
    IndexOutOfRange { index: usize, len: usize },

    /// Profile file could not be written
    #[error("unable to save profile to {}: {source}", path.display())]
    ProfileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Profile file could not be read
    #[error("unable to read profile {}: {source}", path.display())]
    ProfileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// XML serialization failed
    #[error("profile XML error: {0}")]
    Xml(String),

    /// The outbound writer thread panicked or could not be joined
    #[error("outbound writer thread failed to join")]
    WriterJoin,
}

/// Library result alias
pub type Result<T> = std::result::Result<T, BridgeError>;
