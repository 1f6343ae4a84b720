//! Local filesystem CAS backend.
//!
//! Blobs live in a sharded directory structure keyed by their digest:
//! ```text
//! {root}/
//!   tmp/                          ephemeral staging files
//!   objects/{aa}/{bb}/{digest}    64-hex digest, split 2+2+60
//! ```
//!
//! Writes stream into a uniquely named file under `tmp/` and are installed
//! with an atomic rename, so a blob becomes visible all at once and readers
//! never observe a partial file. Identical content converges on one path.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};
use ulid::Ulid;

use crate::config::BlobStoreConfig;
use crate::digest::{self, CHUNK_SIZE};
use crate::interfaces::blob_store::{BlobRead, BlobStat, BlobStore, BlobStoreError, Result};

const TMP_DIR: &str = "tmp";
const OBJECTS_DIR: &str = "objects";

/// Filesystem-backed content-addressed blob store.
pub struct FilesystemBlobStore {
    root: PathBuf,
    fsync: bool,
}

impl FilesystemBlobStore {
    /// Open a store rooted at `config.root_path`, creating the directory
    /// skeleton if needed. An empty `objects/` tree is a valid empty store.
    pub async fn new(config: &BlobStoreConfig) -> Result<Self> {
        let root = config.root_path.clone();
        fs::create_dir_all(root.join(TMP_DIR)).await?;
        fs::create_dir_all(root.join(OBJECTS_DIR)).await?;
        Ok(Self {
            root,
            fsync: config.fsync,
        })
    }

    /// Final path for a digest: `objects/aa/bb/<digest>`.
    fn object_path(&self, digest: &str) -> PathBuf {
        self.root
            .join(OBJECTS_DIR)
            .join(&digest[0..2])
            .join(&digest[2..4])
            .join(digest)
    }

    fn check_digest(digest: &str) -> Result<()> {
        if digest::is_valid(digest) {
            Ok(())
        } else {
            Err(BlobStoreError::InvalidDigest {
                digest: digest.to_string(),
                reason: "expected 64 lowercase hex characters",
            })
        }
    }

    /// Stream into the staging file, then install under `objects/`.
    async fn stage_and_install(
        &self,
        tmp_path: &Path,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<BlobStat> {
        let mut file = fs::File::create(tmp_path).await?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut size = 0u64;

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            file.write_all(&buf[..n]).await?;
            size += n as u64;
        }

        file.flush().await?;
        if self.fsync {
            file.sync_all().await?;
        }
        drop(file);

        let digest = hex::encode(hasher.finalize());
        let dest = self.object_path(&digest);

        // Concurrent writers of identical content converge here: whoever
        // loses the race discards its staging file and reuses the winner's.
        if fs::metadata(&dest).await.is_ok() {
            fs::remove_file(tmp_path).await?;
            debug!(digest = %digest, size, "blob already present, deduplicated");
            return Ok(BlobStat { digest, size });
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(tmp_path, &dest).await?;
        if self.fsync {
            sync_dir(dest.parent().unwrap_or(&self.root)).await?;
        }

        debug!(digest = %digest, size, "stored blob");
        Ok(BlobStat { digest, size })
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn store(&self, reader: &mut (dyn AsyncRead + Send + Unpin)) -> Result<BlobStat> {
        let tmp_path = self
            .root
            .join(TMP_DIR)
            .join(format!("{}.partial", Ulid::new()));

        let result = self.stage_and_install(&tmp_path, reader).await;
        if result.is_err() {
            // No caller-visible partial blob: the staging file is unlinked
            // on every failure path before the error surfaces.
            if let Err(cleanup) = fs::remove_file(&tmp_path).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %tmp_path.display(), error = %cleanup, "failed to remove staging file");
                }
            }
        }
        result
    }

    async fn open_read(&self, digest: &str) -> Result<BlobRead> {
        Self::check_digest(digest)?;
        match fs::File::open(self.object_path(digest)).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(BlobStoreError::NotFound {
                digest: digest.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, digest: &str) -> Result<bool> {
        Self::check_digest(digest)?;
        match fs::metadata(self.object_path(digest)).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Flush directory metadata so the rename survives a crash.
#[cfg(unix)]
async fn sync_dir(path: &Path) -> std::io::Result<()> {
    let dir = fs::File::open(path).await?;
    dir.sync_all().await
}

#[cfg(not(unix))]
async fn sync_dir(_path: &Path) -> std::io::Result<()> {
    // The platform offers no directory fsync primitive.
    Ok(())
}
