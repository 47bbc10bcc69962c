//! Collaborator capability traits and in-memory implementations.
//!
//! The router, sync manager and phase manager only ever see these traits as
//! `Arc<dyn Trait>`; the concrete implementation is chosen once when the
//! system is assembled.

pub mod embedding;
pub mod extraction;
pub mod precise;
pub mod retry;
pub mod semantic;

pub use embedding::{EmbeddingProvider, MockEmbeddingProvider, cosine_similarity};
pub use extraction::{ConceptExtractor, ExtractedConcept, KeywordConceptExtractor};
pub use precise::{
    Column, CoverageMapping, Dataset, MemoryPreciseStore, PreciseStore, Row, UPDATED_AT_COLUMN,
};
pub use retry::RetryingExtractor;
pub use semantic::{MemorySemanticStore, PayloadFilter, SemanticHit, SemanticStore, StoredConcept};
