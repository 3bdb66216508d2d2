use crate::Result;
use sled::{Db, Tree};

const BLACKLIST_TREE: &str = "blacklist";

/// Words that bare (unquoted) query terms never match. Stored lowercase.
#[derive(Clone)]
pub struct Blacklist {
    words: Tree,
}

impl Blacklist {
    pub fn open(db: &Db) -> Result<Self> {
        Ok(Self { words: db.open_tree(BLACKLIST_TREE)? })
    }

    /// Returns true when the word was newly added. Blank input is never stored.
    pub fn add(&self, word: &str) -> Result<bool> {
        let word = normalize(word);
        if word.is_empty() {
            return Ok(false);
        }
        Ok(self.words.insert(word.as_bytes(), &b""[..])?.is_none())
    }

    pub fn contains(&self, word: &str) -> Result<bool> {
        let word = normalize(word);
        if word.is_empty() {
            return Ok(false);
        }
        Ok(self.words.contains_key(word.as_bytes())?)
    }

    pub fn list(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for entry in self.words.iter() {
            let (key, _) = entry?;
            out.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(out)
    }
}

fn normalize(word: &str) -> String {
    word.trim().to_lowercase()
}
