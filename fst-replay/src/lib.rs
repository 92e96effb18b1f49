// Copyright 2025 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

mod model;
mod pack;
mod registry;
mod replay;
mod session;
mod trace;

/// Cargo.toml version of this library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Simulated time, in the ticks used by the waveform file.
pub type Time = u64;

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    /// The same hierarchical name was registered or matched more than once.
    #[error("signal `{0}` is registered more than once")]
    DuplicateSignal(String),
    /// `bind` was called for a name that was never registered.
    #[error("signal `{0}` was never registered")]
    UnknownSignal(String),
    /// The waveform disagrees with the registration about a signal's width.
    #[error("width mismatch for `{name}`: registered as {registered} bits, waveform reports {reported}")]
    WidthMismatch {
        name: String,
        registered: u32,
        reported: u32,
    },
    /// Two registered signals resolved to the same reader facility.
    #[error("facility {0} is bound to more than one signal")]
    DuplicateFacility(u32),
    /// A registered signal has no counterpart in the waveform hierarchy.
    #[error("signal `{0}` was not found in the waveform")]
    SignalNotInWaveform(String),
    /// The signal exists but does not carry two-state bit vector data.
    #[error("signal `{0}` does not carry a bit vector value")]
    NotABitVector(String),
    /// The reader delivered a value change for a facility nobody registered.
    #[error("value change for unregistered facility {0}")]
    UnknownFacility(u32),
    #[error("failed to read the waveform:\n{0}")]
    Fst(String),
    #[error("failed to write the replay trace: {0}")]
    Trace(#[from] fst_writer::FstWriteError),
    #[error("io error")]
    Io(#[from] std::io::Error),
}

impl From<fst_reader::ReaderError> for ReplayError {
    fn from(value: fst_reader::ReaderError) -> Self {
        ReplayError::Fst(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ReplayError>;

pub use model::{Model, PortId};
pub use replay::{Mismatch, ReplaySummary};
pub use session::{BoundSession, Session};
pub use trace::TraceSink;
