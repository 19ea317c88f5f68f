#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Streaming content digests for migration verification.
//!
//! Every object is hashed exactly once, while its bytes stream from the
//! source into the local staging file: [`DualHasher`] folds the same pass
//! into an MD5 (rendered as the padded-base64 `Content-MD5` form blob
//! services store) and a SHA-256 (rendered as lowercase hex, the form
//! embedded in object keys). The destination side uses [`Md5Hasher`] alone
//! to report the checksum it stored.
//!
//! [`copy_and_hash`] is the shared tee loop: it moves bytes from a reader to
//! a writer and feeds each chunk to whichever hasher rides along, so no
//! caller ever re-reads data it just wrote.

use std::fmt::Write as _;
use std::io::{self, ErrorKind, Read, Write};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use digest::Digest;
use md5::Md5;
use sha2::Sha256;

/// Chunk size for [`copy_and_hash`] reads.
const COPY_BUF_LEN: usize = 64 * 1024;

/// Digest state fed chunk-by-chunk as a stream passes through
/// [`copy_and_hash`].
pub trait StreamHasher {
    /// Feeds one chunk of the stream into the digest state.
    fn update(&mut self, chunk: &[u8]);
}

/// Rendered digests of one fully streamed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestPair {
    /// MD5 as standard padded base64, the `Content-MD5` form.
    pub content_md5: String,
    /// SHA-256 as lowercase hex.
    pub sha256_hex: String,
}

/// MD5 and SHA-256 computed together over a single pass.
#[derive(Debug, Default)]
pub struct DualHasher {
    md5: Md5,
    sha256: Sha256,
}

impl DualHasher {
    /// Creates a hasher with empty digest state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Finalises both digests and renders them.
    #[must_use]
    pub fn finalize(self) -> DigestPair {
        DigestPair {
            content_md5: STANDARD.encode(self.md5.finalize()),
            sha256_hex: lower_hex(&self.sha256.finalize()),
        }
    }
}

impl StreamHasher for DualHasher {
    fn update(&mut self, chunk: &[u8]) {
        Digest::update(&mut self.md5, chunk);
        Digest::update(&mut self.sha256, chunk);
    }
}

/// MD5-only state for the destination side's stored checksum.
#[derive(Debug, Default)]
pub struct Md5Hasher {
    inner: Md5,
}

impl Md5Hasher {
    /// Creates a hasher with empty digest state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Finalises the digest, rendered as standard padded base64.
    #[must_use]
    pub fn finalize(self) -> String {
        STANDARD.encode(self.inner.finalize())
    }
}

impl StreamHasher for Md5Hasher {
    fn update(&mut self, chunk: &[u8]) {
        Digest::update(&mut self.inner, chunk);
    }
}

/// Copies `reader` to `writer`, feeding every chunk through `hasher`.
///
/// Returns the number of bytes copied. The stream is consumed exactly once,
/// so callers can verify digests without re-reading what they just wrote.
pub fn copy_and_hash<R, W, H>(reader: &mut R, writer: &mut W, hasher: &mut H) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
    H: StreamHasher,
{
    let mut buf = vec![0_u8; COPY_BUF_LEN];
    let mut copied = 0_u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buf[..n])?;
        hasher.update(&buf[..n]);
        copied += n as u64;
    }
    Ok(copied)
}

fn lower_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}
