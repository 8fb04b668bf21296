//! The corpus: works, segments, document records, and the versioned store
//! that holds them.

mod snapshot;
mod store;
mod types;

pub use snapshot::{CorpusSnapshot, WorkEntry};
pub use store::CorpusStore;
pub use types::{
    compute_content_hash, get_current_timestamp, CorpusStats, Segment, SegmentKey, SourceRecord,
    Work,
};
