//! Reports derived from the mapping store: identifier gap analysis and the
//! spreadsheet mirror.

pub mod gaps;
pub mod sheet;

pub use self::gaps::{find_gaps, log_gaps, SequenceGap};
pub use self::sheet::{merge_rows, mirror, SheetMerge};
