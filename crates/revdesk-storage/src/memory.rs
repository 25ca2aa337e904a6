//! In-process review store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use revdesk_core::{NewReview, Review};
use tokio::sync::Mutex;

use crate::{ReviewStore, StoreError};

#[derive(Debug, Default)]
pub struct MemoryReviewStore {
    rows: Mutex<BTreeMap<String, Review>>,
    unavailable: AtomicBool,
}

impl MemoryReviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every operation fail with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn all(&self) -> Vec<Review> {
        self.rows.lock().await.values().cloned().collect()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ReviewStore for MemoryReviewStore {
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Review>, StoreError> {
        self.check_available()?;
        Ok(self.rows.lock().await.get(external_id).cloned())
    }

    async fn insert_if_absent(&self, review: NewReview) -> Result<Option<Review>, StoreError> {
        self.check_available()?;
        let mut rows = self.rows.lock().await;
        if rows.contains_key(&review.external_id) {
            return Ok(None);
        }
        let stored = Review::from(review);
        rows.insert(stored.external_id.clone(), stored.clone());
        Ok(Some(stored))
    }

    async fn mark_answered(&self, external_id: &str) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut rows = self.rows.lock().await;
        match rows.get_mut(external_id) {
            Some(review) => {
                review.answered = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count(&self) -> Result<u64, StoreError> {
        self.check_available()?;
        Ok(self.rows.lock().await.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use revdesk_core::{Enrichment, IncomingReview};

    fn new_review(external_id: &str) -> NewReview {
        NewReview::from_incoming(
            IncomingReview {
                external_id: external_id.into(),
                product_id: None,
                product_name: None,
                rating: 4,
                text: "Нормально".into(),
                customer_name: Some("Ольга".into()),
                created_at: None,
            },
            Enrichment::default(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn second_insert_with_same_external_id_is_a_no_op() {
        let store = MemoryReviewStore::new();
        let first = store.insert_if_absent(new_review("r-1")).await.expect("insert");
        let second = store.insert_if_absent(new_review("r-1")).await.expect("insert");

        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(store.count().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn mark_answered_flips_only_existing_rows() {
        let store = MemoryReviewStore::new();
        store.insert_if_absent(new_review("r-2")).await.expect("insert");

        assert!(store.mark_answered("r-2").await.expect("mark"));
        assert!(!store.mark_answered("missing").await.expect("mark"));
        let stored = store
            .find_by_external_id("r-2")
            .await
            .expect("find")
            .expect("row");
        assert!(stored.answered);
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_operation() {
        let store = MemoryReviewStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.find_by_external_id("r-3").await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.insert_if_absent(new_review("r-3")).await.is_err());

        store.set_unavailable(false);
        assert!(store.insert_if_absent(new_review("r-3")).await.expect("insert").is_some());
    }
}
