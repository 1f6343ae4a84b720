//! Content-addressed blob storage interface.
//!
//! Blobs are identified solely by the lowercase-hex SHA-256 of their bytes.
//! Storing the same content twice is a success, not an error.

use async_trait::async_trait;
use tokio::io::AsyncRead;

/// Result type for blob store operations.
pub type Result<T> = std::result::Result<T, BlobStoreError>;

/// Errors that can occur during blob store operations.
#[derive(Debug, thiserror::Error)]
pub enum BlobStoreError {
    #[error("blob {digest} not found")]
    NotFound { digest: String },

    #[error("invalid digest {digest:?}: {reason}")]
    InvalidDigest {
        digest: String,
        reason: &'static str,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata of a stored blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobStat {
    /// Lowercase-hex SHA-256 of the content.
    pub digest: String,
    /// Content length in bytes.
    pub size: u64,
}

/// Readable handle to a blob's bytes, owned by the caller.
pub type BlobRead = Box<dyn AsyncRead + Send + Unpin>;

/// Interface for content-addressed blob persistence.
///
/// Implementations:
/// - `FilesystemBlobStore`: sharded local directory with atomic installs
/// - `MemoryBlobStore`: in-process fake
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stream bytes into the store and return the resulting stat.
    ///
    /// Reads from the stream's current position until end-of-input. If a
    /// blob with the same digest already exists, the existing blob's stat
    /// is returned (deduplication).
    async fn store(&self, reader: &mut (dyn AsyncRead + Send + Unpin)) -> Result<BlobStat>;

    /// Open a blob for reading.
    async fn open_read(&self, digest: &str) -> Result<BlobRead>;

    /// Check whether a blob exists without reading its body.
    async fn exists(&self, digest: &str) -> Result<bool>;
}
