//! Out-of-band transcript shipping and the archive that receives it.

pub mod archive;
pub mod db;
pub mod error;
pub mod forwarder;
pub mod signature;
pub mod sink;

pub use archive::TranscriptArchive;
pub use error::{HistoryError, Result};
pub use forwarder::{ForwarderStats, HistoryForwarder};
pub use sink::{HistorySink, HttpHistorySink};
