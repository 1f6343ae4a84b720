//! Digest primitives.
//!
//! Blob identities are raw SHA-256 digests rendered as 64 lowercase hex
//! characters; the algorithm identifier is never encoded in the string.

use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Length of a SHA-256 digest in hex form.
pub const DIGEST_HEX_LEN: usize = 64;

/// Read granularity for streaming hashes and blob staging.
pub(crate) const CHUNK_SIZE: usize = 1024 * 1024;

/// Check whether a string is a well-formed digest: exactly 64 lowercase hex
/// characters. Uppercase is rejected.
pub fn is_valid(digest: &str) -> bool {
    digest.len() == DIGEST_HEX_LEN
        && digest
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Hash a stream to end-of-input in bounded chunks.
///
/// Returns the hex digest and the number of bytes observed. The source is
/// never buffered whole.
pub async fn hash_stream<R>(reader: &mut R) -> std::io::Result<(String, u64)>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut size = 0u64;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }

    Ok((hex::encode(hasher.finalize()), size))
}
