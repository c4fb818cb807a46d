//! Token-bounded chunking: the packing engine plus the batch pass that
//! drives it over the archived backlog.

pub mod engine;
pub mod pass;

pub use engine::{Chunk, ChunkingEngine, is_balanced};
pub use pass::{ChunkPass, EMBEDDING_DIMENSIONS, Embedder, PassSummary};
