//! Local disk store for cached object bytes.
//!
//! Stores one file per cache key in a flat directory. Keys are encoded
//! into filesystem-safe filenames with a reversible escape scheme, so the
//! store can be rescanned after a restart to rebuild the recency index.
//!
//! In-progress writes land in a `.part` file and are renamed into place
//! on completion, so `contains()` never observes a partially written
//! entry and aborted writes leave nothing behind.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use super::types::CacheError;

/// File extension for completed cache entries.
const ENTRY_SUFFIX: &str = ".obj";

/// File extension for in-progress writes.
const PART_SUFFIX: &str = ".part";

/// Distinguishes part files when several writers target the same key.
static WRITER_SEQ: AtomicU64 = AtomicU64::new(0);

/// One entry discovered by a directory scan.
#[derive(Debug, Clone)]
pub struct ScanEntry {
    /// Decoded cache key.
    pub key: String,
    /// Size of the cached bytes.
    pub size_bytes: u64,
    /// File mtime as epoch milliseconds (0 if unavailable).
    pub modified_millis: i64,
}

/// Byte-addressable local persistence keyed by cache key.
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(root: PathBuf) -> Result<Self, CacheError> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// The store's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Encode a cache key into a filesystem-safe filename.
    ///
    /// Alphanumerics plus `.`, `-` and `_` pass through; every other byte
    /// is escaped as `%XX`. The encoding is reversible via
    /// [`filename_to_key`](Self::filename_to_key).
    pub fn key_to_filename(key: &str) -> String {
        let mut name = String::with_capacity(key.len() + ENTRY_SUFFIX.len());
        for byte in key.bytes() {
            match byte {
                b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'.' | b'-' | b'_' => {
                    name.push(byte as char)
                }
                other => name.push_str(&format!("%{:02X}", other)),
            }
        }
        name.push_str(ENTRY_SUFFIX);
        name
    }

    /// Decode a filename back to a cache key.
    ///
    /// Returns `None` for filenames not produced by
    /// [`key_to_filename`](Self::key_to_filename), including `.part` files.
    pub fn filename_to_key(filename: &str) -> Option<String> {
        let encoded = filename.strip_suffix(ENTRY_SUFFIX)?;
        let mut bytes = Vec::with_capacity(encoded.len());
        let mut chars = encoded.bytes();

        while let Some(byte) = chars.next() {
            if byte == b'%' {
                let hi = chars.next()?;
                let lo = chars.next()?;
                let hex = [hi, lo];
                let hex = std::str::from_utf8(&hex).ok()?;
                bytes.push(u8::from_str_radix(hex, 16).ok()?);
            } else {
                bytes.push(byte);
            }
        }

        String::from_utf8(bytes).ok()
    }

    /// Compute the on-disk path for a cache key.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(Self::key_to_filename(key))
    }

    /// Open a streaming writer for a new entry.
    ///
    /// Bytes accumulate in a `.part` file until [`EntryWriter::finish`]
    /// renames it into place. Each writer gets its own part file, so
    /// concurrent writers for the same key never interleave; whichever
    /// finishes last owns the final entry.
    pub async fn writer(&self, key: &str) -> Result<EntryWriter, CacheError> {
        if key.is_empty() {
            return Err(CacheError::InvalidKey("empty key".to_string()));
        }

        let final_path = self.path_for(key);
        let seq = WRITER_SEQ.fetch_add(1, Ordering::Relaxed);
        let part_name = format!("{}.{}{}", Self::key_to_filename(key), seq, PART_SUFFIX);
        let part_path = self.root.join(part_name);

        let file = File::create(&part_path).await?;

        Ok(EntryWriter {
            file,
            part_path,
            final_path,
            bytes_written: 0,
        })
    }

    /// Open a streaming reader over an entry's bytes.
    pub async fn reader(&self, key: &str) -> Result<ReaderStream<File>, CacheError> {
        let file = File::open(self.path_for(key)).await?;
        Ok(ReaderStream::new(file))
    }

    /// Check whether the bytes for a key are actually present on disk.
    ///
    /// This is the drift defense: an index record alone is not proof.
    pub async fn contains(&self, key: &str) -> bool {
        match tokio::fs::metadata(self.path_for(key)).await {
            Ok(meta) => meta.is_file(),
            Err(_) => false,
        }
    }

    /// Delete the entry for a key.
    ///
    /// Idempotent: returns `Ok(None)` if the entry was already absent,
    /// `Ok(Some(bytes_freed))` if a file was removed.
    pub async fn remove(&self, key: &str) -> Result<Option<u64>, CacheError> {
        let path = self.path_for(key);

        let size = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(Some(size)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Total bytes resident in the store, recomputed by scanning.
    ///
    /// Scanning rather than trusting a counter tolerates drift from
    /// out-of-band deletes or crashes mid-write.
    pub async fn usage(&self) -> Result<u64, CacheError> {
        let mut total = 0u64;
        let mut dir = tokio::fs::read_dir(&self.root).await?;

        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.ends_with(ENTRY_SUFFIX) {
                continue;
            }
            if let Ok(meta) = entry.metadata().await {
                if meta.is_file() {
                    total += meta.len();
                }
            }
        }

        Ok(total)
    }

    /// Scan the store directory, decoding every entry's key, size and mtime.
    ///
    /// Used at startup to rebuild the recency index. Files that do not
    /// decode to a key (including `.part` leftovers) are skipped.
    pub async fn scan(&self) -> Result<Vec<ScanEntry>, CacheError> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.root).await?;

        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(key) = Self::filename_to_key(name) else {
                continue;
            };

            let meta = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };

            let modified_millis = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as i64)
                .unwrap_or(0);

            entries.push(ScanEntry {
                key,
                size_bytes: meta.len(),
                modified_millis,
            });
        }

        Ok(entries)
    }
}

/// Streaming writer for one cache entry.
///
/// Call [`finish`](Self::finish) to commit the entry or
/// [`abort`](Self::abort) to discard it. Dropping without either leaves a
/// `.part` file that scans and usage accounting ignore.
pub struct EntryWriter {
    file: File,
    part_path: PathBuf,
    final_path: PathBuf,
    bytes_written: u64,
}

impl EntryWriter {
    /// Append a chunk to the entry.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.file.write_all(chunk).await?;
        self.bytes_written += chunk.len() as u64;
        Ok(())
    }

    /// Bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Flush and rename the entry into place.
    ///
    /// Returns the total bytes committed.
    pub async fn finish(mut self) -> io::Result<u64> {
        self.file.flush().await?;
        tokio::fs::rename(&self.part_path, &self.final_path).await?;
        Ok(self.bytes_written)
    }

    /// Discard the partial write, removing the `.part` file.
    pub async fn abort(self) {
        drop(self.file);
        let _ = tokio::fs::remove_file(&self.part_path).await;
    }
}
