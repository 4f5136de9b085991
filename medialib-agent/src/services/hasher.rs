//! Content fingerprinting
//!
//! Computes the cheap sample hash (leading `sample_size` bytes) and the
//! optional whole-file hash under the configured algorithm. All reads are
//! synchronous; callers run these on the blocking thread pool while
//! holding a worker permit.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use xxhash_rust::xxh64::Xxh64;

/// Streaming read chunk for full-file hashing.
const CHUNK_SIZE: usize = 1024 * 1024;

/// Hasher errors. All are per-file and non-fatal: the caller emits the
/// base record without hashes and moves on.
#[derive(Debug, Error)]
pub enum HashError {
    #[error("Cannot open {0}: {1}")]
    Open(PathBuf, std::io::Error),

    #[error("Read error on {0}: {1}")]
    Read(PathBuf, std::io::Error),
}

/// Supported fingerprint algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgo {
    Blake3,
    Xxhash64,
    Sha256,
}

impl HashAlgo {
    /// Parse a configured algorithm name. Unknown values fall back to
    /// SHA-256, matching the historical behavior when a preferred
    /// algorithm was unavailable.
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "blake3" => HashAlgo::Blake3,
            "xxhash64" => HashAlgo::Xxhash64,
            "sha256" => HashAlgo::Sha256,
            other => {
                tracing::warn!(algo = %other, "Unknown hash algorithm, falling back to sha256");
                HashAlgo::Sha256
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgo::Blake3 => "blake3",
            HashAlgo::Xxhash64 => "xxhash64",
            HashAlgo::Sha256 => "sha256",
        }
    }
}

enum Digester {
    Blake3(blake3::Hasher),
    Xxhash64(Xxh64),
    Sha256(Sha256),
}

impl Digester {
    fn new(algo: HashAlgo) -> Self {
        match algo {
            HashAlgo::Blake3 => Digester::Blake3(blake3::Hasher::new()),
            HashAlgo::Xxhash64 => Digester::Xxhash64(Xxh64::new(0)),
            HashAlgo::Sha256 => Digester::Sha256(Sha256::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Digester::Blake3(h) => {
                h.update(data);
            }
            Digester::Xxhash64(h) => h.update(data),
            Digester::Sha256(h) => h.update(data),
        }
    }

    fn finish_hex(self) -> String {
        match self {
            Digester::Blake3(h) => h.finalize().to_hex().to_string(),
            Digester::Xxhash64(h) => format!("{:016x}", h.digest()),
            Digester::Sha256(h) => format!("{:x}", h.finalize()),
        }
    }
}

/// Hex digest of the first `min(sample_size, file size)` bytes.
pub fn sample_hash(path: &Path, algo: HashAlgo, sample_size: u64) -> Result<String, HashError> {
    let file = File::open(path).map_err(|e| HashError::Open(path.to_path_buf(), e))?;
    let mut digester = Digester::new(algo);
    let mut reader = file.take(sample_size);
    let mut buf = vec![0u8; CHUNK_SIZE.min(sample_size.max(1) as usize)];
    loop {
        let n = reader
            .read(&mut buf)
            .map_err(|e| HashError::Read(path.to_path_buf(), e))?;
        if n == 0 {
            break;
        }
        digester.update(&buf[..n]);
    }
    Ok(digester.finish_hex())
}

/// Hex digest of the entire file, streamed in one pass.
pub fn full_hash(path: &Path, algo: HashAlgo) -> Result<String, HashError> {
    let mut file = File::open(path).map_err(|e| HashError::Open(path.to_path_buf(), e))?;
    let mut digester = Digester::new(algo);
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| HashError::Read(path.to_path_buf(), e))?;
        if n == 0 {
            break;
        }
        digester.update(&buf[..n]);
    }
    Ok(digester.finish_hex())
}

/// Sample hash plus, when requested, the full-file hash.
pub fn hash_file(
    path: &Path,
    algo: HashAlgo,
    sample_size: u64,
    do_full: bool,
) -> Result<(String, Option<String>), HashError> {
    let sample = sample_hash(path, algo, sample_size)?;
    let full = if do_full {
        Some(full_hash(path, algo)?)
    } else {
        None
    };
    Ok((sample, full))
}
