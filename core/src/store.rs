use crate::persist::{abort, allocate_id, decode_u32, encode_u32, IndexPaths};
use crate::terms::COUNTERS_TREE;
use crate::{DocId, DocumentRecord, Error, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sled::transaction::{ConflictableTransactionResult, TransactionalTree, Transactional};
use sled::{Db, Tree};
use std::fs::{self, File};
use std::io::{Read, Write};

const DOCUMENTS_TREE: &str = "documents";
const SOURCES_TREE: &str = "sources";
const NEXT_DOC_ID: &str = "next_doc_id";

/// Document metadata keyed by id, a source-reference lookup, and the
/// bucketed on-disk blobs holding compressed full content.
#[derive(Clone)]
pub struct DocumentStore {
    documents: Tree,
    sources: Tree,
    counters: Tree,
    paths: IndexPaths,
    bucket_size: u32,
}

/// Record a new document inside an open transaction and return its id.
pub(crate) fn insert_document(
    documents: &TransactionalTree,
    sources: &TransactionalTree,
    counters: &TransactionalTree,
    record: &DocumentRecord,
    bucket_size: u32,
    with_content: bool,
) -> ConflictableTransactionResult<DocId, Error> {
    if sources.get(record.source_reference.as_str())?.is_some() {
        return abort(Error::DuplicateSource(record.source_reference.clone()));
    }
    let doc_id = allocate_id(counters, NEXT_DOC_ID)?;
    let mut record = record.clone();
    if with_content {
        record.content_path = Some(IndexPaths::content_rel(doc_id, bucket_size));
    }
    let bytes = match bincode::serialize(&record) {
        Ok(b) => b,
        Err(e) => return abort(e),
    };
    documents.insert(&encode_u32(doc_id)[..], bytes)?;
    sources.insert(record.source_reference.as_str(), &encode_u32(doc_id)[..])?;
    Ok(doc_id)
}

/// First `max_chars` characters of `content`.
pub fn preview_of(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((idx, _)) => content[..idx].to_string(),
        None => content.to_string(),
    }
}

impl DocumentStore {
    pub fn open(db: &Db, paths: IndexPaths, bucket_size: u32) -> Result<Self> {
        Ok(Self {
            documents: db.open_tree(DOCUMENTS_TREE)?,
            sources: db.open_tree(SOURCES_TREE)?,
            counters: db.open_tree(COUNTERS_TREE)?,
            paths,
            bucket_size: bucket_size.max(1),
        })
    }

    pub(crate) fn documents_tree(&self) -> &Tree { &self.documents }
    pub(crate) fn sources_tree(&self) -> &Tree { &self.sources }
    pub fn bucket_size(&self) -> u32 { self.bucket_size }

    pub fn create_document(
        &self,
        title: &str,
        source_reference: &str,
        preview: &str,
        content: Option<&str>,
    ) -> Result<DocId> {
        let record = DocumentRecord {
            title: title.to_string(),
            source_reference: source_reference.to_string(),
            preview: preview.to_string(),
            active: true,
            content_path: None,
        };
        let bucket_size = self.bucket_size;
        let doc_id = (&self.documents, &self.sources, &self.counters).transaction(
            |(documents, sources, counters)| {
                insert_document(documents, sources, counters, &record, bucket_size, content.is_some())
            },
        )?;
        if let Some(text) = content {
            self.attach_content(doc_id, text)?;
        }
        Ok(doc_id)
    }

    /// Write the blob for a committed document. When the blob cannot be
    /// written the document keeps its index entries but loses its
    /// `content_path`, so it reads back as stored without content.
    /// Returns whether the blob was written.
    pub(crate) fn attach_content(&self, doc_id: DocId, content: &str) -> Result<bool> {
        let rel = IndexPaths::content_rel(doc_id, self.bucket_size);
        let err = match self.write_content(&rel, content) {
            Ok(()) => return Ok(true),
            Err(err) => err,
        };
        tracing::warn!(doc_id, path = %rel, error = %err, "content blob not written; keeping document without content");
        let _ = fs::remove_file(self.paths.resolve(&rel));
        let mut record = self.get_document(doc_id)?;
        record.content_path = None;
        self.documents.insert(encode_u32(doc_id), bincode::serialize(&record)?)?;
        Ok(false)
    }

    /// Compress `content` into the blob at `rel`, creating the bucket on demand.
    fn write_content(&self, rel: &str, content: &str) -> Result<()> {
        let path = self.paths.resolve(rel);
        if let Some(bucket) = path.parent() {
            fs::create_dir_all(bucket)?;
        }
        let mut encoder = GzEncoder::new(File::create(&path)?, Compression::default());
        encoder.write_all(content.as_bytes())?;
        encoder.finish()?;
        Ok(())
    }

    pub fn get_document(&self, doc_id: DocId) -> Result<DocumentRecord> {
        let raw = self
            .documents
            .get(encode_u32(doc_id))?
            .ok_or_else(|| Error::document_not_found(doc_id))?;
        Ok(bincode::deserialize(&raw)?)
    }

    /// Decompressed full content, or `None` when the document was stored without it.
    pub fn get_content(&self, doc_id: DocId) -> Result<Option<String>> {
        let record = self.get_document(doc_id)?;
        let Some(rel) = record.content_path else { return Ok(None) };
        let mut text = String::new();
        GzDecoder::new(File::open(self.paths.resolve(&rel))?).read_to_string(&mut text)?;
        Ok(Some(text))
    }

    pub fn set_active(&self, doc_id: DocId, active: bool) -> Result<()> {
        let mut record = self.get_document(doc_id)?;
        if record.active == active {
            return Ok(());
        }
        record.active = active;
        self.documents.insert(encode_u32(doc_id), bincode::serialize(&record)?)?;
        tracing::info!(doc_id, active, "document visibility changed");
        Ok(())
    }

    pub fn is_active(&self, doc_id: DocId) -> Result<bool> {
        Ok(self.get_document(doc_id)?.active)
    }

    pub fn find_source(&self, source_reference: &str) -> Result<Option<DocId>> {
        self.sources.get(source_reference)?.map(|raw| decode_u32(&raw)).transpose()
    }

    /// All documents in insertion order.
    pub fn list_all(&self) -> Result<Vec<(DocId, DocumentRecord)>> {
        self.list_where(|_| true)
    }

    pub fn list_active(&self) -> Result<Vec<(DocId, DocumentRecord)>> {
        self.list_where(|r| r.active)
    }

    pub fn list_inactive(&self) -> Result<Vec<(DocId, DocumentRecord)>> {
        self.list_where(|r| !r.active)
    }

    fn list_where(&self, keep: impl Fn(&DocumentRecord) -> bool) -> Result<Vec<(DocId, DocumentRecord)>> {
        let mut out = Vec::new();
        for entry in self.documents.iter() {
            let (key, value) = entry?;
            let record: DocumentRecord = bincode::deserialize(&value)?;
            if keep(&record) {
                out.push((decode_u32(&key)?, record));
            }
        }
        Ok(out)
    }

    pub fn len(&self) -> usize { self.documents.len() }

    pub fn is_empty(&self) -> bool { self.documents.is_empty() }
}
