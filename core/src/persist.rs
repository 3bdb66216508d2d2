use crate::{DocId, Error, Result};
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree};
use std::fs::{create_dir_all, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub const META_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaFile {
    pub version: u32,
    pub created_at: String,
    pub bucket_size: u32,
}

impl MetaFile {
    pub fn new(bucket_size: u32) -> Self {
        let created_at = time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default();
        Self { version: META_VERSION, created_at, bucket_size }
    }
}

#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn db(&self) -> PathBuf { self.root.join("db") }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }
    pub fn docs_dir(&self) -> PathBuf { self.root.join("docs") }

    /// Content blob location relative to the index root: docs/{bucket}/{slot}.gz
    pub fn content_rel(doc_id: DocId, bucket_size: u32) -> String {
        let bucket_size = bucket_size.max(1);
        format!("docs/{:04}/{:04}.gz", doc_id / bucket_size, doc_id % bucket_size)
    }

    pub fn resolve(&self, rel: &str) -> PathBuf { self.root.join(rel) }
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let mut f = File::open(paths.meta())?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}

pub(crate) fn encode_u32(value: u32) -> [u8; 4] {
    value.to_be_bytes()
}

pub(crate) fn decode_u32(bytes: &[u8]) -> Result<u32> {
    let raw: [u8; 4] = bytes
        .try_into()
        .map_err(|_| Error::Corrupt(format!("expected 4 bytes, found {}", bytes.len())))?;
    Ok(u32::from_be_bytes(raw))
}

pub(crate) fn abort<T>(err: impl Into<Error>) -> ConflictableTransactionResult<T, Error> {
    Err(ConflictableTransactionError::Abort(err.into()))
}

/// Hand out the next id stored under `key` in the counters tree. Ids start at 1.
pub(crate) fn allocate_id(counters: &TransactionalTree, key: &str) -> ConflictableTransactionResult<u32, Error> {
    let next = match counters.get(key)? {
        Some(raw) => match decode_u32(&raw) {
            Ok(v) => v,
            Err(e) => return abort(e),
        },
        None => 1,
    };
    let Some(after) = next.checked_add(1) else {
        return abort(Error::Corrupt(format!("id space exhausted for {key}")));
    };
    counters.insert(key, &encode_u32(after)[..])?;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn content_paths_are_bucketed() {
        assert_eq!(IndexPaths::content_rel(1, 1000), "docs/0000/0001.gz");
        assert_eq!(IndexPaths::content_rel(999, 1000), "docs/0000/0999.gz");
        assert_eq!(IndexPaths::content_rel(1000, 1000), "docs/0001/0000.gz");
        assert_eq!(IndexPaths::content_rel(12345, 1000), "docs/0012/0345.gz");
        assert_eq!(IndexPaths::content_rel(7, 3), "docs/0002/0001.gz");
    }

    #[test]
    fn meta_survives_a_save_load_cycle() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        save_meta(&paths, &MetaFile::new(250)).unwrap();
        let meta = load_meta(&paths).unwrap();
        assert_eq!(meta.bucket_size, 250);
        assert_eq!(meta.version, META_VERSION);
    }

    #[test]
    fn short_counter_is_corrupt() {
        assert!(matches!(decode_u32(&[0, 1]), Err(crate::Error::Corrupt(_))));
        assert_eq!(decode_u32(&encode_u32(77)).unwrap(), 77);
    }
}
