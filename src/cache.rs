//! On-disk artifact cache. A cache entry stores the token stream, the
//! parsed program and the ids of functions that went hot, keyed by the
//! hash of the source that produced them. Anything suspicious about an
//! entry turns the lookup into a miss; the cache is never trusted over
//! the source.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::ast::node::Program;
use crate::lexer::token::{Token, TokenId};

const MAGIC: &[u8; 4] = b"RBTC";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = MAGIC.len() + 4 + 32;
const ENTRY_EXTENSION: &str = "rbc";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to write cache entry: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode cache entry: {0}")]
    Encode(String),
}

/// The serializable portion of a compiled program. Compiled closures
/// are not persisted; `hot_functions` marks which bodies to recompile
/// eagerly after a hit.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct CompiledUnit {
    pub source_hash: String,
    /// Module name and source hash of every file module the program
    /// loaded. A changed dependency invalidates the entry.
    pub dependencies: Vec<(String, String)>,
    pub created_at: i64,
    pub tokens: Vec<Token>,
    pub program: Program,
    pub hot_functions: Vec<TokenId>,
}

impl CompiledUnit {
    pub fn new(
        source: &str,
        tokens: Vec<Token>,
        program: Program,
        hot_functions: Vec<TokenId>,
        dependencies: Vec<(String, String)>,
    ) -> Self {
        Self {
            source_hash: source_hash(source),
            dependencies,
            created_at: chrono::Utc::now().timestamp(),
            tokens,
            program,
            hot_functions,
        }
    }
}

pub fn source_hash(source: &str) -> String {
    hex(&Sha256::digest(source.as_bytes()))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[derive(Debug, Clone)]
pub struct ArtifactCache {
    dir: PathBuf,
}

impl ArtifactCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn entry_path(&self, hash: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", hash, ENTRY_EXTENSION))
    }

    /// Looks up the entry for `source`. Returns `None` on any
    /// mismatch: missing file, wrong magic or version, checksum
    /// failure, undecodable payload, or a payload recorded for a
    /// different source.
    pub fn load(&self, source: &str) -> Option<CompiledUnit> {
        let hash = source_hash(source);
        let bytes = fs::read(self.entry_path(&hash)).ok()?;
        if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
            return None;
        }

        let version = u32::from_le_bytes(bytes[4..8].try_into().ok()?);
        if version != FORMAT_VERSION {
            return None;
        }

        let checksum = &bytes[8..HEADER_LEN];
        let payload = &bytes[HEADER_LEN..];
        if Sha256::digest(payload).as_slice() != checksum {
            return None;
        }

        let unit: CompiledUnit = serde_json::from_slice(payload).ok()?;
        if unit.source_hash != hash {
            return None;
        }
        Some(unit)
    }

    /// Writes the entry atomically: the payload goes to a temporary
    /// file first and is renamed into place.
    pub fn store(&self, unit: &CompiledUnit) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir)?;

        let payload =
            serde_json::to_vec(unit).map_err(|e| CacheError::Encode(e.to_string()))?;
        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(Sha256::digest(&payload).as_slice());
        bytes.extend_from_slice(&payload);

        let path = self.entry_path(&unit.source_hash);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    pub fn remove(&self, source: &str) -> Result<(), CacheError> {
        let path = self.entry_path(&source_hash(source));
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
