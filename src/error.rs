use thiserror::Error;

/// Crate-wide error type for the ingestion pipeline.
///
/// Backend failures (HTTP, database, object store, tokenizer) are wrapped with
/// a short operation context at the call site, mirroring how the stores and
/// queue report which statement or request failed. Parse-gate rejections are
/// deliberately *not* represented here: a rejected page is a terminal recorded
/// outcome of the worker, not a pipeline fault.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Unrecoverable startup configuration problem (missing credentials,
    /// malformed URL in the environment). The only error class that is fatal
    /// to a process.
    #[error("configuration: {0}")]
    Config(String),

    /// HTTP transport failure after the retry policy is exhausted, or a
    /// non-success status on a required request.
    #[error("http: {message}")]
    Http { message: String },

    /// HTML parsing machinery failure (selector compilation, not page
    /// content; bad page content is a gate rejection, never an error).
    #[error("html: {message}")]
    Html { message: String },

    /// Work-queue backend failure (declare, publish, receive, ack).
    #[error("queue: {message}")]
    Queue { message: String },

    /// Relational store failure (connect, transaction, statement).
    #[error("metadata store: {message}")]
    Store { message: String },

    /// Object-store failure (put/get of archived blobs, gzip codec).
    #[error("content store: {message}")]
    Archive { message: String },

    /// Tokenizer or text-segmentation failure in the chunking engine.
    #[error("chunking: {message}")]
    Chunking { message: String },

    /// A metadata record failed validation at construction.
    #[error("invalid article record: {0}")]
    InvalidRecord(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
