use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// (sha, path) -> rebuilt content, last writer wins
#[derive(Debug, Default)]
pub struct ReconstructionCache {
    entries: RwLock<HashMap<(String, String), String>>,
}

impl ReconstructionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, sha: &str, path: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(sha.to_string(), path.to_string()))
            .cloned()
    }

    pub fn insert(&self, sha: &str, path: &str, content: String) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((sha.to_string(), path.to_string()), content);
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
