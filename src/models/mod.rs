pub mod digest;
pub mod index_file;
pub mod usage;

pub use digest::{ChunkDigest, InvalidDigest, DIGEST_HEX_LEN};
pub use index_file::{ExtractionError, IndexFile, IndexKind, ReferenceBatch};
pub use usage::{
    ChunkSizeResult, ChunkStatus, Completion, ReferenceCount, ScanOutcome, ScanPhase,
    UsageStatistics,
};
