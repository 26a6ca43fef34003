//! Classification cache keyed by (account, uid).
//!
//! Entries live for the whole process: no TTL, no capacity bound, last write wins.

use moka::future::Cache;

use crate::classify::Category;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub account_id: String,
    pub uid: u32,
}

impl CacheKey {
    pub fn new(account_id: &str, uid: u32) -> Self {
        Self {
            account_id: account_id.to_string(),
            uid,
        }
    }
}

#[derive(Clone)]
pub struct ClassificationCache {
    entries: Cache<CacheKey, Category>,
}

impl Default for ClassificationCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassificationCache {
    pub fn new() -> Self {
        Self {
            entries: Cache::builder().build(),
        }
    }

    pub async fn get(&self, account_id: &str, uid: u32) -> Option<Category> {
        self.entries.get(&CacheKey::new(account_id, uid)).await
    }

    /// Store a category, overwriting any previous entry.
    pub async fn put(&self, account_id: &str, uid: u32, category: Category) -> Category {
        self.entries
            .insert(CacheKey::new(account_id, uid), category)
            .await;
        category
    }

    /// Store a category and hand back what was there before the write.
    pub async fn replace(&self, account_id: &str, uid: u32, category: Category) -> Option<Category> {
        let previous = self.get(account_id, uid).await;
        self.put(account_id, uid, category).await;
        previous
    }
}
