//! In-memory CAS fake for tests of layers above the blob store.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::digest::{self, hash_stream};
use crate::interfaces::blob_store::{BlobRead, BlobStat, BlobStore, BlobStoreError, Result};

/// Non-durable blob store keyed by digest.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
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
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn store(&self, reader: &mut (dyn AsyncRead + Send + Unpin)) -> Result<BlobStat> {
        let mut bytes = Vec::new();
        let (digest, size) = {
            let mut tee = TeeReader {
                inner: reader,
                sink: &mut bytes,
            };
            hash_stream(&mut tee).await?
        };

        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(digest.clone())
            .or_insert(bytes);

        Ok(BlobStat { digest, size })
    }

    async fn open_read(&self, digest: &str) -> Result<BlobRead> {
        Self::check_digest(digest)?;
        let blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        match blobs.get(digest) {
            Some(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
            None => Err(BlobStoreError::NotFound {
                digest: digest.to_string(),
            }),
        }
    }

    async fn exists(&self, digest: &str) -> Result<bool> {
        Self::check_digest(digest)?;
        let blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(blobs.contains_key(digest))
    }
}

/// Copies everything read from `inner` into `sink`, so one pass both hashes
/// and captures the payload.
struct TeeReader<'a> {
    inner: &'a mut (dyn AsyncRead + Send + Unpin),
    sink: &'a mut Vec<u8>,
}

impl AsyncRead for TeeReader<'_> {
    fn poll_read(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        let poll = std::pin::Pin::new(&mut *self.inner).poll_read(cx, buf);
        if let std::task::Poll::Ready(Ok(())) = &poll {
            self.sink.extend_from_slice(&buf.filled()[before..]);
        }
        poll
    }
}
