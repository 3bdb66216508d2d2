use crate::blacklist::Blacklist;
use crate::persist::{load_meta, save_meta, IndexPaths, MetaFile};
use crate::query::{Query, TermLookup};
use crate::store::{insert_document, preview_of, DocumentStore};
use crate::terms::{create_term, put_posting, TermIndex};
use crate::tokenizer::term_frequencies;
use crate::{DocId, DocumentRecord, EngineConfig, Error, NewDocument, Posting, Result};
use parking_lot::RwLock;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, Transactional};
use sled::Db;
use std::fs::create_dir_all;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub terms: usize,
    pub documents: usize,
    pub active_documents: usize,
    pub postings: usize,
}

/// Owns every storage handle of one index directory.
///
/// Mutations take the write side of an internal lock and reads take the read
/// side, so a query is always evaluated against a consistent view.
pub struct Engine {
    db: Db,
    paths: IndexPaths,
    config: EngineConfig,
    terms: TermIndex,
    docs: DocumentStore,
    blacklist: Blacklist,
    lock: RwLock<()>,
}

struct PreparedDocument {
    record: DocumentRecord,
    content: String,
    frequencies: Vec<(String, u32)>,
}

impl Engine {
    pub fn open<P: AsRef<Path>>(root: P, mut config: EngineConfig) -> Result<Self> {
        let paths = IndexPaths::new(root);
        create_dir_all(&paths.root)?;
        if paths.meta().exists() {
            let meta = load_meta(&paths)?;
            if meta.bucket_size != config.bucket_size {
                tracing::warn!(
                    configured = config.bucket_size,
                    stored = meta.bucket_size,
                    "bucket size is fixed at index creation; using stored value"
                );
                config.bucket_size = meta.bucket_size;
            }
        } else {
            save_meta(&paths, &MetaFile::new(config.bucket_size))?;
        }

        let db = sled::open(paths.db())?;
        let terms = TermIndex::open(&db)?;
        let docs = DocumentStore::open(&db, paths.clone(), config.bucket_size)?;
        let blacklist = Blacklist::open(&db)?;
        tracing::info!(
            root = %paths.root.display(),
            terms = terms.term_count(),
            documents = docs.len(),
            "index opened"
        );
        Ok(Self { db, paths, config, terms, docs, blacklist, lock: RwLock::new(()) })
    }

    pub fn config(&self) -> &EngineConfig { &self.config }

    pub fn root(&self) -> &Path { &self.paths.root }

    pub fn ingest(&self, title: &str, source_reference: &str, content: &str) -> Result<DocId> {
        let ids = self.ingest_batch(&[NewDocument::new(title, source_reference, content)])?;
        Ok(ids[0])
    }

    /// Index several documents as one unit: metadata, terms and postings of the
    /// whole batch commit together or not at all. Compressed content is written
    /// after the commit.
    pub fn ingest_batch(&self, batch: &[NewDocument]) -> Result<Vec<DocId>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let prepared: Vec<PreparedDocument> = batch.iter().map(|d| self.prepare(d)).collect();
        let bucket_size = self.docs.bucket_size();
        let with_content = self.config.store_content;

        let _guard = self.lock.write();
        let trees = (
            self.terms.terms_tree(),
            self.terms.postings_tree(),
            self.terms.counters_tree(),
            self.docs.documents_tree(),
            self.docs.sources_tree(),
        );
        let ids = trees.transaction(|(terms, postings, counters, documents, sources)| {
            let mut ids = Vec::with_capacity(prepared.len());
            for doc in &prepared {
                let doc_id =
                    insert_document(documents, sources, counters, &doc.record, bucket_size, with_content)?;
                for (term, hits) in &doc.frequencies {
                    let term_id = create_term(terms, counters, term)?;
                    put_posting(postings, term_id, doc_id, *hits)?;
                }
                ids.push(doc_id);
            }
            Ok::<_, ConflictableTransactionError<Error>>(ids)
        })?;

        let mut missing = 0usize;
        if with_content {
            for (doc_id, doc) in ids.iter().zip(&prepared) {
                if !self.docs.attach_content(*doc_id, &doc.content)? {
                    missing += 1;
                }
            }
        }
        self.db.flush()?;
        tracing::info!(
            documents = ids.len(),
            first = ids[0],
            missing_content = missing,
            "ingestion committed"
        );
        Ok(ids)
    }

    fn prepare(&self, doc: &NewDocument) -> PreparedDocument {
        let mut frequencies: Vec<(String, u32)> =
            term_frequencies([doc.content.as_str(), doc.title.as_str()]).into_iter().collect();
        frequencies.sort();
        PreparedDocument {
            record: DocumentRecord {
                title: doc.title.clone(),
                source_reference: doc.source_reference.clone(),
                preview: preview_of(&doc.content, self.config.preview_chars),
                active: true,
                content_path: None,
            },
            content: doc.content.clone(),
            frequencies,
        }
    }

    pub fn contains_source(&self, source_reference: &str) -> Result<bool> {
        let _guard = self.lock.read();
        Ok(self.docs.find_source(source_reference)?.is_some())
    }

    /// Documents containing `term`, most hits first. Blacklisted terms match
    /// nothing unless the term is wrapped in double quotes (`"the"`).
    pub fn search_term(&self, term: &str) -> Result<Vec<DocId>> {
        let _guard = self.lock.read();
        match term.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
            Some(inner) => self.lookup(inner, true),
            None => self.lookup(term, false),
        }
    }

    /// Like [`Engine::search_term`] but ignores the blacklist.
    pub fn search_exact(&self, term: &str) -> Result<Vec<DocId>> {
        let _guard = self.lock.read();
        self.lookup(term, true)
    }

    pub fn postings(&self, term: &str) -> Result<Vec<Posting>> {
        let _guard = self.lock.read();
        match self.terms.get_term_id(&term.to_lowercase())? {
            Some(term_id) => self.terms.postings_for(term_id),
            None => Ok(Vec::new()),
        }
    }

    fn lookup(&self, term: &str, exact: bool) -> Result<Vec<DocId>> {
        let term = term.to_lowercase();
        if !exact && self.blacklist.contains(&term)? {
            return Ok(Vec::new());
        }
        let Some(term_id) = self.terms.get_term_id(&term)? else {
            return Ok(Vec::new());
        };
        Ok(self.terms.postings_for(term_id)?.into_iter().map(|p| p.doc_id).collect())
    }

    /// Evaluate a boolean query. A malformed query is `Error::InvalidQuery`,
    /// a valid query without matches is `Ok(vec![])`.
    pub fn search(&self, query: &str) -> Result<Vec<DocId>> {
        let parsed = Query::parse(query)?;
        self.run(&parsed)
    }

    pub fn run(&self, query: &Query) -> Result<Vec<DocId>> {
        let _guard = self.lock.read();
        tracing::debug!(%query, "evaluating query");
        query.evaluate(&Snapshot(self))
    }

    /// [`Engine::search`] restricted to active documents.
    pub fn search_active(&self, query: &str) -> Result<Vec<DocId>> {
        self.run_active(&Query::parse(query)?)
    }

    pub fn run_active(&self, query: &Query) -> Result<Vec<DocId>> {
        let _guard = self.lock.read();
        let ids = query.evaluate(&Snapshot(self))?;
        let mut visible = Vec::with_capacity(ids.len());
        for id in ids {
            if self.docs.is_active(id)? {
                visible.push(id);
            }
        }
        Ok(visible)
    }

    /// Words of `query` that took part in matching, for highlighting.
    pub fn highlight_terms(&self, query: &Query) -> Result<Vec<String>> {
        let _guard = self.lock.read();
        let mut out = Vec::new();
        for leaf in query.terms() {
            if leaf.exact || !self.blacklist.contains(leaf.word)? {
                out.push(leaf.word.to_string());
            }
        }
        Ok(out)
    }

    pub fn suggest(&self, term: &str) -> Result<Vec<String>> {
        let _guard = self.lock.read();
        self.terms.similar_terms(&term.to_lowercase(), self.config.suggest_distance)
    }

    pub fn blacklist_add(&self, word: &str) -> Result<bool> {
        let _guard = self.lock.write();
        let added = self.blacklist.add(word)?;
        if added {
            tracing::info!(word, "blacklisted");
        }
        Ok(added)
    }

    pub fn blacklist_contains(&self, word: &str) -> Result<bool> {
        let _guard = self.lock.read();
        self.blacklist.contains(word)
    }

    pub fn blacklist_list(&self) -> Result<Vec<String>> {
        let _guard = self.lock.read();
        self.blacklist.list()
    }

    pub fn activate(&self, doc_id: DocId) -> Result<()> {
        let _guard = self.lock.write();
        self.docs.set_active(doc_id, true)
    }

    pub fn deactivate(&self, doc_id: DocId) -> Result<()> {
        let _guard = self.lock.write();
        self.docs.set_active(doc_id, false)
    }

    pub fn get_document(&self, doc_id: DocId) -> Result<DocumentRecord> {
        let _guard = self.lock.read();
        self.docs.get_document(doc_id)
    }

    pub fn get_content(&self, doc_id: DocId) -> Result<Option<String>> {
        let _guard = self.lock.read();
        self.docs.get_content(doc_id)
    }

    pub fn list_documents(&self) -> Result<Vec<(DocId, DocumentRecord)>> {
        let _guard = self.lock.read();
        self.docs.list_all()
    }

    pub fn list_active(&self) -> Result<Vec<(DocId, DocumentRecord)>> {
        let _guard = self.lock.read();
        self.docs.list_active()
    }

    pub fn list_inactive(&self) -> Result<Vec<(DocId, DocumentRecord)>> {
        let _guard = self.lock.read();
        self.docs.list_inactive()
    }

    pub fn stats(&self) -> Result<IndexStats> {
        let _guard = self.lock.read();
        Ok(IndexStats {
            terms: self.terms.term_count(),
            documents: self.docs.len(),
            active_documents: self.docs.list_active()?.len(),
            postings: self.terms.posting_count(),
        })
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

/// Query leaf resolution for a caller already holding the read lock.
struct Snapshot<'a>(&'a Engine);

impl TermLookup for Snapshot<'_> {
    fn documents(&self, term: &str, exact: bool) -> Result<Vec<DocId>> {
        self.0.lookup(term, exact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reopen_keeps_stored_bucket_size() {
        let dir = tempdir().unwrap();
        {
            let cfg = EngineConfig { bucket_size: 10, ..EngineConfig::default() };
            let engine = Engine::open(dir.path(), cfg).unwrap();
            engine.ingest("t", "a", "alpha beta").unwrap();
        }
        let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();
        assert_eq!(engine.config().bucket_size, 10);
        assert_eq!(engine.search_term("alpha").unwrap(), vec![1]);
    }

    #[test]
    fn title_terms_are_indexed() {
        let dir = tempdir().unwrap();
        let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();
        let id = engine.ingest("Quarterly Report", "r.txt", "numbers and more numbers").unwrap();
        assert_eq!(engine.search_term("quarterly").unwrap(), vec![id]);
        assert_eq!(engine.postings("numbers").unwrap(), vec![Posting { doc_id: id, hits: 2 }]);
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let dir = tempdir().unwrap();
        let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();
        assert!(engine.ingest_batch(&[]).unwrap().is_empty());
        assert_eq!(engine.stats().unwrap().documents, 0);
    }
}
