pub mod aggregation;
pub mod analyzer;
pub mod chunk_sizer;
pub mod error;
pub mod guest_discovery;
pub mod index_locator;
pub mod reference_counter;
pub mod reference_extractor;
pub mod scheduler;

pub use aggregation::{aggregate, ExtractionTally};
pub use analyzer::ChunkUsageAnalyzer;
pub use chunk_sizer::ChunkSizer;
pub use error::{ScanError, ScanResult};
pub use guest_discovery::{discover_guest_paths, guest_label};
pub use index_locator::{IndexLocator, LocatedIndexes};
pub use reference_counter::{FoldedReferences, ReferenceCounter};
pub use reference_extractor::{
    parse_json_output, parse_text_output, ChunkSectionParser, IndexInspector, ReferenceExtractor,
};
pub use scheduler::{PhaseOutput, ProgressCallback, Scheduler};
