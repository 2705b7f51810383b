//! Digest engine.
//!
//! Every byte the copy engine reads is fed through a [`Hasher`] obtained
//! from a [`DigestAlgorithm`]. The algorithm is pluggable so that the
//! verification protocol does not depend on a specific primitive; the
//! built-in choices are listed in [`DigestKind`].

use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Chunk size used for every streaming read in the crate (64 KiB).
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Streaming digest state.
pub trait Hasher: Send {
    /// Feed more bytes into the digest.
    fn update(&mut self, data: &[u8]);

    /// Consume the state and return the lowercase hexadecimal digest.
    fn finalize_hex(self: Box<Self>) -> String;
}

/// A digest algorithm: a name plus a factory for fresh [`Hasher`] states.
pub trait DigestAlgorithm: Send + Sync {
    /// Algorithm name as shown in logs (e.g. `sha1`).
    fn name(&self) -> &str;

    /// Create a fresh streaming state.
    fn hasher(&self) -> Box<dyn Hasher>;

    /// Length of every hex digest this algorithm produces, if fixed.
    ///
    /// Ledger replay uses it to reject records written with another
    /// algorithm instead of reporting them as mismatches.
    fn digest_len(&self) -> Option<usize> {
        None
    }
}

/// Built-in digest algorithms.
///
/// The default is SHA-1, whose manifests are readable by `sha1sum -c`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DigestKind {
    /// SHA-1 (40 hex chars)
    #[default]
    Sha1,
    /// SHA-256 (64 hex chars)
    Sha256,
    /// BLAKE3 (64 hex chars)
    Blake3,
}

impl DigestKind {
    /// Length of the hex digest produced by this algorithm.
    pub const fn hex_len(self) -> usize {
        match self {
            Self::Sha1 => 40,
            Self::Sha256 | Self::Blake3 => 64,
        }
    }
}

impl std::str::FromStr for DigestKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            "blake3" => Ok(Self::Blake3),
            other => Err(format!("unknown digest algorithm: {other}")),
        }
    }
}

impl DigestAlgorithm for DigestKind {
    fn name(&self) -> &str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Blake3 => "blake3",
        }
    }

    fn hasher(&self) -> Box<dyn Hasher> {
        match self {
            Self::Sha1 => Box::new(Sha1State(<sha1::Sha1 as sha1::Digest>::new())),
            Self::Sha256 => Box::new(Sha256State(<sha2::Sha256 as sha2::Digest>::new())),
            Self::Blake3 => Box::new(Blake3State(blake3::Hasher::new())),
        }
    }

    fn digest_len(&self) -> Option<usize> {
        Some(self.hex_len())
    }
}

struct Sha1State(sha1::Sha1);

impl Hasher for Sha1State {
    fn update(&mut self, data: &[u8]) {
        sha1::Digest::update(&mut self.0, data);
    }

    fn finalize_hex(self: Box<Self>) -> String {
        to_hex(&sha1::Digest::finalize(self.0))
    }
}

struct Sha256State(sha2::Sha256);

impl Hasher for Sha256State {
    fn update(&mut self, data: &[u8]) {
        sha2::Digest::update(&mut self.0, data);
    }

    fn finalize_hex(self: Box<Self>) -> String {
        to_hex(&sha2::Digest::finalize(self.0))
    }
}

struct Blake3State(blake3::Hasher);

impl Hasher for Blake3State {
    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn finalize_hex(self: Box<Self>) -> String {
        self.0.finalize().to_hex().to_string()
    }
}

/// Lowercase hex encoding of a digest.
pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Stream a whole reader through a fresh hasher in [`CHUNK_SIZE`] chunks.
pub fn digest_reader<R: Read>(algorithm: &dyn DigestAlgorithm, mut reader: R) -> io::Result<String> {
    let mut hasher = algorithm.hasher();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize_hex())
}

/// Digest the full logical content of a file.
pub fn digest_file(algorithm: &dyn DigestAlgorithm, path: &Path) -> io::Result<String> {
    digest_reader(algorithm, File::open(path)?)
}
