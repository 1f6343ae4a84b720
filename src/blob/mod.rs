//! Content-addressed blob storage backends.
//!
//! All backends identify a blob by the SHA-256 of its contents; storing
//! identical bytes twice yields the same digest and exactly one stored copy.

mod filesystem;
mod memory;

pub use filesystem::FilesystemBlobStore;
pub use memory::MemoryBlobStore;

use std::sync::Arc;

use tracing::info;

use crate::config::BlobStoreConfig;
use crate::interfaces::blob_store::{BlobStore, Result};

/// Initialize the blob store from configuration.
pub async fn init_blob_store(config: &BlobStoreConfig) -> Result<Arc<dyn BlobStore>> {
    info!(
        root = %config.root_path.display(),
        fsync = config.fsync,
        "Blob store: filesystem"
    );
    let store = FilesystemBlobStore::new(config).await?;
    Ok(Arc::new(store))
}
