//! On-disk tier.
//!
//! Each asset is one file named by the SHA-256 of its id. The file starts
//! with a fixed-width header holding the NUL-padded type name, followed by
//! the raw payload:
//!
//! ```text
//! [type name, NUL padded to TYPE_HEADER_LEN bytes][payload ...]
//! ```
//!
//! A file shorter than the header is corrupt.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::error::CacheError;
use crate::asset::Asset;

/// Width of the type header in bytes.
pub const TYPE_HEADER_LEN: usize = 32;

/// Extension of cache files.
const CACHE_FILE_EXTENSION: &str = "asset";

/// Result of deleting files from the disk tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearResult {
    pub files_deleted: u64,
    pub bytes_freed: u64,
}

/// Encode an asset as a cache file body.
pub fn encode_entry(asset_type: &str, payload: &[u8]) -> Result<Vec<u8>, CacheError> {
    let type_bytes = asset_type.as_bytes();
    if type_bytes.is_empty() || type_bytes.len() > TYPE_HEADER_LEN || type_bytes.contains(&0) {
        return Err(CacheError::TypeTooLong {
            asset_type: asset_type.to_string(),
            max: TYPE_HEADER_LEN,
        });
    }

    let mut body = Vec::with_capacity(TYPE_HEADER_LEN + payload.len());
    body.extend_from_slice(type_bytes);
    body.resize(TYPE_HEADER_LEN, 0);
    body.extend_from_slice(payload);
    Ok(body)
}

/// Split a cache file body into type name and payload.
///
/// `path` is only used for error reporting.
pub fn decode_entry(path: &Path, body: &[u8]) -> Result<(String, Vec<u8>), CacheError> {
    if body.len() < TYPE_HEADER_LEN {
        return Err(CacheError::Corrupt {
            path: path.to_path_buf(),
            reason: format!(
                "{} bytes is shorter than the {} byte type header",
                body.len(),
                TYPE_HEADER_LEN
            ),
        });
    }

    let (header, payload) = body.split_at(TYPE_HEADER_LEN);
    let type_len = header.iter().position(|&b| b == 0).unwrap_or(TYPE_HEADER_LEN);
    let asset_type = std::str::from_utf8(&header[..type_len])
        .ok()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| CacheError::Corrupt {
            path: path.to_path_buf(),
            reason: "unreadable type header".to_string(),
        })?;

    Ok((asset_type.to_string(), payload.to_vec()))
}

/// File name for an asset id.
pub fn file_name_for(id: &str) -> String {
    let digest = Sha256::digest(id.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}.{}", hex, CACHE_FILE_EXTENSION)
}

/// Disk tier of the asset cache.
#[derive(Debug, Clone)]
pub struct DiskStore {
    directory: PathBuf,
}

impl DiskStore {
    /// Open the store, creating the directory if needed.
    pub fn open(directory: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let directory = directory.into();
        fs::create_dir_all(&directory).map_err(|e| CacheError::io(&directory, e))?;
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the cache file for an asset id.
    pub fn path_for(&self, id: &str) -> PathBuf {
        self.directory.join(file_name_for(id))
    }

    /// Read an asset. Returns `Ok(None)` when no file exists.
    pub fn read(&self, id: &str) -> Result<Option<Asset>, CacheError> {
        let path = self.path_for(id);
        let body = match fs::read(&path) {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io(path, e)),
        };

        let (asset_type, payload) = decode_entry(&path, &body)?;
        Ok(Some(Asset::new(id, asset_type, payload)))
    }

    /// Write an asset, replacing any previous file.
    ///
    /// The body goes to a temporary file first and is renamed into place so
    /// readers never observe a half-written entry.
    pub fn write(&self, asset: &Asset) -> Result<(), CacheError> {
        let body = encode_entry(asset.asset_type(), asset.data())?;
        let path = self.path_for(asset.id());
        let tmp_path = path.with_extension("tmp");

        fs::write(&tmp_path, &body).map_err(|e| CacheError::io(&tmp_path, e))?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            CacheError::io(&path, e)
        })?;

        debug!(asset_id = %asset.id(), path = %path.display(), bytes = body.len(), "Asset written to disk cache");
        Ok(())
    }

    /// Remove an asset's file. Returns whether a file existed.
    pub fn remove(&self, id: &str) -> Result<bool, CacheError> {
        let path = self.path_for(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }

    /// Delete every cache file.
    pub fn clear(&self) -> Result<ClearResult, CacheError> {
        let mut result = ClearResult::default();
        for (path, len, _) in self.entries()? {
            match fs::remove_file(&path) {
                Ok(()) => {
                    result.files_deleted += 1;
                    result.bytes_freed += len;
                }
                Err(e) => debug!(path = %path.display(), error = %e, "Could not remove cache file"),
            }
        }
        info!(
            files = result.files_deleted,
            bytes = result.bytes_freed,
            "Disk cache cleared"
        );
        Ok(result)
    }

    /// Count cache files and their total size.
    pub fn stats(&self) -> Result<(u64, u64), CacheError> {
        let entries = self.entries()?;
        let bytes = entries.iter().map(|(_, len, _)| len).sum();
        Ok((entries.len() as u64, bytes))
    }

    /// Delete oldest-modified files until the tier is at most `max_bytes`.
    pub fn enforce_limit(&self, max_bytes: u64) -> Result<ClearResult, CacheError> {
        let mut entries = self.entries()?;
        let mut total: u64 = entries.iter().map(|(_, len, _)| len).sum();
        let mut result = ClearResult::default();
        if total <= max_bytes {
            return Ok(result);
        }

        entries.sort_by_key(|(_, _, modified)| *modified);
        for (path, len, _) in entries {
            if total <= max_bytes {
                break;
            }
            if fs::remove_file(&path).is_ok() {
                total -= len;
                result.files_deleted += 1;
                result.bytes_freed += len;
            }
        }

        info!(
            files = result.files_deleted,
            bytes = result.bytes_freed,
            limit = max_bytes,
            "Disk cache was over limit"
        );
        Ok(result)
    }

    /// Cache files with their size and modification time.
    fn entries(&self) -> Result<Vec<(PathBuf, u64, SystemTime)>, CacheError> {
        let read_dir = fs::read_dir(&self.directory).map_err(|e| CacheError::io(&self.directory, e))?;

        let mut entries = Vec::new();
        for entry in read_dir.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(CACHE_FILE_EXTENSION) {
                continue;
            }
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            entries.push((path, metadata.len(), modified));
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_encode_layout() {
        let body = encode_entry("Texture", &[1, 2, 3]).unwrap();
        assert_eq!(body.len(), TYPE_HEADER_LEN + 3);
        assert_eq!(&body[..7], b"Texture");
        assert!(body[7..TYPE_HEADER_LEN].iter().all(|&b| b == 0));
        assert_eq!(&body[TYPE_HEADER_LEN..], &[1, 2, 3]);
    }

    #[test]
    fn test_encode_rejects_long_type() {
        let long = "T".repeat(TYPE_HEADER_LEN + 1);
        assert!(matches!(
            encode_entry(&long, &[]),
            Err(CacheError::TypeTooLong { .. })
        ));
        assert!(encode_entry("", &[]).is_err());
    }

    #[test]
    fn test_encode_full_width_type() {
        let exact = "T".repeat(TYPE_HEADER_LEN);
        let body = encode_entry(&exact, &[9]).unwrap();
        let (asset_type, payload) = decode_entry(Path::new("x"), &body).unwrap();
        assert_eq!(asset_type, exact);
        assert_eq!(payload, vec![9]);
    }

    #[test]
    fn test_decode_short_file_is_corrupt() {
        let result = decode_entry(Path::new("short"), &[b'T'; TYPE_HEADER_LEN - 1]);
        assert!(matches!(result, Err(CacheError::Corrupt { .. })));
    }

    #[test]
    fn test_decode_empty_header_is_corrupt() {
        let body = vec![0u8; TYPE_HEADER_LEN + 4];
        assert!(decode_entry(Path::new("empty"), &body).is_err());
    }

    #[test]
    fn test_decode_header_only() {
        let body = encode_entry("Sound", &[]).unwrap();
        let (asset_type, payload) = decode_entry(Path::new("x"), &body).unwrap();
        assert_eq!(asset_type, "Sound");
        assert!(payload.is_empty());
    }

    #[test]
    fn test_file_name_is_stable_hash() {
        let name = file_name_for("a1");
        assert_eq!(name, file_name_for("a1"));
        assert_ne!(name, file_name_for("a2"));
        assert!(name.ends_with(".asset"));
        assert_eq!(name.len(), 64 + ".asset".len());
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();
        let asset = Asset::new("a1", "Mesh", vec![5; 100]);

        store.write(&asset).unwrap();
        let read = store.read("a1").unwrap().unwrap();

        assert_eq!(read.id(), "a1");
        assert_eq!(read.asset_type(), "Mesh");
        assert_eq!(read.data(), asset.data());
    }

    #[test]
    fn test_read_missing() {
        let dir = TempDir::new().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();
        assert!(store.read("nope").unwrap().is_none());
    }

    #[test]
    fn test_remove() {
        let dir = TempDir::new().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();
        store.write(&Asset::new("a1", "Mesh", vec![1])).unwrap();

        assert!(store.remove("a1").unwrap());
        assert!(!store.remove("a1").unwrap());
        assert!(store.read("a1").unwrap().is_none());
    }

    #[test]
    fn test_stats_and_clear() {
        let dir = TempDir::new().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();
        store.write(&Asset::new("a1", "Mesh", vec![1; 10])).unwrap();
        store.write(&Asset::new("a2", "Mesh", vec![1; 20])).unwrap();
        // Unrelated files are left alone
        fs::write(dir.path().join("notes.txt"), b"hello").unwrap();

        let (files, bytes) = store.stats().unwrap();
        assert_eq!(files, 2);
        assert_eq!(bytes, (2 * TYPE_HEADER_LEN + 30) as u64);

        let result = store.clear().unwrap();
        assert_eq!(result.files_deleted, 2);
        assert_eq!(result.bytes_freed, bytes);
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_enforce_limit_removes_oldest() {
        let dir = TempDir::new().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();

        store.write(&Asset::new("old", "Mesh", vec![0; 100])).unwrap();
        let old_path = store.path_for("old");
        let past = SystemTime::now() - std::time::Duration::from_secs(3600);
        fs::File::options()
            .write(true)
            .open(&old_path)
            .unwrap()
            .set_modified(past)
            .unwrap();
        store.write(&Asset::new("new", "Mesh", vec![0; 100])).unwrap();

        let entry_size = (TYPE_HEADER_LEN + 100) as u64;
        let result = store.enforce_limit(entry_size).unwrap();

        assert_eq!(result.files_deleted, 1);
        assert!(store.read("old").unwrap().is_none());
        assert!(store.read("new").unwrap().is_some());
    }

    #[test]
    fn test_enforce_limit_under_limit_is_noop() {
        let dir = TempDir::new().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();
        store.write(&Asset::new("a1", "Mesh", vec![0; 10])).unwrap();

        let result = store.enforce_limit(1_000_000).unwrap();
        assert_eq!(result, ClearResult::default());
    }
}
