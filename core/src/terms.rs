use crate::distance::levenshtein;
use crate::persist::{abort, allocate_id, decode_u32, encode_u32};
use crate::{DocId, Error, Posting, Result, TermId};
use sled::transaction::{ConflictableTransactionResult, TransactionalTree, Transactional};
use sled::{Db, Tree};
use std::cmp::Reverse;

const TERMS_TREE: &str = "terms";
const POSTINGS_TREE: &str = "postings";
pub(crate) const COUNTERS_TREE: &str = "counters";
const NEXT_TERM_ID: &str = "next_term_id";

/// Term dictionary plus one postings collection per term.
///
/// Postings live in a single tree keyed by `term_id ++ doc_id`, so a term's
/// postings are a key prefix and a `(term, document)` pair can only be stored once.
#[derive(Clone)]
pub struct TermIndex {
    terms: Tree,
    postings: Tree,
    counters: Tree,
}

fn posting_key(term_id: TermId, doc_id: DocId) -> Vec<u8> {
    let mut key = Vec::with_capacity(8);
    key.extend_from_slice(&encode_u32(term_id));
    key.extend_from_slice(&encode_u32(doc_id));
    key
}

/// Look up `term`, inserting it with a fresh id when missing.
pub(crate) fn create_term(
    terms: &TransactionalTree,
    counters: &TransactionalTree,
    term: &str,
) -> ConflictableTransactionResult<TermId, Error> {
    if let Some(raw) = terms.get(term)? {
        return match decode_u32(&raw) {
            Ok(id) => Ok(id),
            Err(e) => abort(e),
        };
    }
    let id = allocate_id(counters, NEXT_TERM_ID)?;
    terms.insert(term, &encode_u32(id)[..])?;
    Ok(id)
}

pub(crate) fn put_posting(
    postings: &TransactionalTree,
    term_id: TermId,
    doc_id: DocId,
    hits: u32,
) -> ConflictableTransactionResult<(), Error> {
    postings.insert(posting_key(term_id, doc_id), &encode_u32(hits)[..])?;
    Ok(())
}

impl TermIndex {
    pub fn open(db: &Db) -> Result<Self> {
        Ok(Self {
            terms: db.open_tree(TERMS_TREE)?,
            postings: db.open_tree(POSTINGS_TREE)?,
            counters: db.open_tree(COUNTERS_TREE)?,
        })
    }

    pub(crate) fn terms_tree(&self) -> &Tree { &self.terms }
    pub(crate) fn postings_tree(&self) -> &Tree { &self.postings }
    pub(crate) fn counters_tree(&self) -> &Tree { &self.counters }

    pub fn get_term_id(&self, term: &str) -> Result<Option<TermId>> {
        self.terms.get(term)?.map(|raw| decode_u32(&raw)).transpose()
    }

    pub fn get_or_create_term(&self, term: &str) -> Result<TermId> {
        if let Some(id) = self.get_term_id(term)? {
            return Ok(id);
        }
        let id = (&self.terms, &self.counters)
            .transaction(|(terms, counters)| create_term(terms, counters, term))?;
        tracing::debug!(term, term_id = id, "created term");
        Ok(id)
    }

    pub fn add_posting(&self, term_id: TermId, doc_id: DocId, hits: u32) -> Result<()> {
        self.postings.insert(posting_key(term_id, doc_id), &encode_u32(hits)[..])?;
        Ok(())
    }

    /// Postings for a term, most hits first, ties by ascending document id.
    pub fn postings_for(&self, term_id: TermId) -> Result<Vec<Posting>> {
        let mut out = Vec::new();
        for entry in self.postings.scan_prefix(encode_u32(term_id)) {
            let (key, value) = entry?;
            if key.len() != 8 {
                return Err(Error::Corrupt(format!("posting key of {} bytes", key.len())));
            }
            out.push(Posting { doc_id: decode_u32(&key[4..])?, hits: decode_u32(&value)? });
        }
        out.sort_by_key(|p| (Reverse(p.hits), p.doc_id));
        Ok(out)
    }

    /// Every stored term whose edit distance to `term` is strictly below
    /// `max_distance`, closest first, ties alphabetical.
    pub fn similar_terms(&self, term: &str, max_distance: usize) -> Result<Vec<String>> {
        let mut scored: Vec<(usize, String)> = Vec::new();
        for entry in self.terms.iter() {
            let (key, _) = entry?;
            let candidate = std::str::from_utf8(&key)
                .map_err(|e| Error::Corrupt(format!("term is not utf-8: {e}")))?;
            let distance = levenshtein(term, candidate);
            if distance < max_distance {
                scored.push((distance, candidate.to_string()));
            }
        }
        scored.sort();
        Ok(scored.into_iter().map(|(_, t)| t).collect())
    }

    pub fn term_count(&self) -> usize { self.terms.len() }

    pub fn posting_count(&self) -> usize { self.postings.len() }
}
