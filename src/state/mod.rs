//! Local persistent state.
//!
//! - [`MappingStore`]: identifier -> matched entry, the sole record of which
//!   assets have been archived.
//! - [`FailureLog`]: assets scanned without a match.
//! - [`ArchiveIndex`]: archives that need no download at their current checksum.
//! - [`BatchReport`]: legacy per-minute summary of enumerated Photos items.

pub mod archive_index;
pub mod batch_report;
pub mod error;
pub mod failure_log;
pub mod store;
pub mod types;

pub use archive_index::ArchiveIndex;
pub use batch_report::BatchReport;
pub use error::StateError;
pub use failure_log::FailureLog;
pub use store::MappingStore;
pub use types::{MappingEntry, MissingFields, SourceDescriptor};
