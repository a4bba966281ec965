use std::sync::Arc;

use crate::{
    db::RecommendationStore,
    error::AppResult,
    models::{AlbumId, Candidate, CatalogAlbum, UserId},
};

/// Pairs written per statement
const CHUNK_SIZE: usize = 1_000;

/// Idempotent writer and reader of recommendation pairs.
///
/// Writes are "insert or do nothing" on the (user, album) pair and skip any
/// album missing from the local catalog, so recording twice is a no-op and no
/// pair can reference an unknown album.
pub struct RecommendationSink {
    store: Arc<dyn RecommendationStore>,
}

impl RecommendationSink {
    pub fn new(store: Arc<dyn RecommendationStore>) -> Self {
        Self { store }
    }

    /// Returns `true` when the pair was new.
    pub async fn record(&self, user_id: UserId, album_id: AlbumId) -> AppResult<bool> {
        self.store
            .insert_recommendation(&Candidate::new(user_id, album_id))
            .await
    }

    /// Records every pair in chunked set-based statements and returns how
    /// many were new.
    pub async fn record_all(&self, candidates: &[Candidate]) -> AppResult<u64> {
        let mut written = 0;

        for chunk in candidates.chunks(CHUNK_SIZE) {
            written += self.store.insert_recommendations(chunk).await?;
        }

        tracing::info!(
            submitted = candidates.len(),
            written,
            "Recorded recommendations"
        );

        Ok(written)
    }

    /// Up to `limit` of a user's recommended albums, in random order.
    pub async fn recommendations_for(
        &self,
        user_id: UserId,
        limit: i64,
    ) -> AppResult<Vec<CatalogAlbum>> {
        self.store.recommendations_for(user_id, limit.max(0)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::MockRecommendationStore;
    use mockall::predicate::eq;

    #[tokio::test]
    async fn test_record_all_chunks_and_sums() {
        let mut store = MockRecommendationStore::new();
        store
            .expect_insert_recommendations()
            .times(3)
            .returning(|chunk| {
                assert!(chunk.len() <= CHUNK_SIZE);
                Ok(chunk.len() as u64 - 1)
            });

        let candidates: Vec<Candidate> = (0..2_500)
            .map(|n| Candidate::new(1, AlbumId(format!("album-{}", n))))
            .collect();

        let sink = RecommendationSink::new(Arc::new(store));
        let written = sink.record_all(&candidates).await.unwrap();

        assert_eq!(written, 2_497);
    }

    #[tokio::test]
    async fn test_record_all_empty_writes_nothing() {
        let mut store = MockRecommendationStore::new();
        store.expect_insert_recommendations().never();

        let sink = RecommendationSink::new(Arc::new(store));

        assert_eq!(sink.record_all(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_record_reports_duplicate_as_false() {
        let mut store = MockRecommendationStore::new();
        let mut seen = false;
        store
            .expect_insert_recommendation()
            .with(eq(Candidate::new(1, AlbumId::from("y"))))
            .times(2)
            .returning(move |_| {
                let first = !seen;
                seen = true;
                Ok(first)
            });

        let sink = RecommendationSink::new(Arc::new(store));

        assert!(sink.record(1, AlbumId::from("y")).await.unwrap());
        assert!(!sink.record(1, AlbumId::from("y")).await.unwrap());
    }

    #[tokio::test]
    async fn test_negative_limit_is_clamped() {
        let mut store = MockRecommendationStore::new();
        store
            .expect_recommendations_for()
            .with(eq(1), eq(0))
            .returning(|_, _| Ok(vec![]));

        let sink = RecommendationSink::new(Arc::new(store));

        assert!(sink.recommendations_for(1, -5).await.unwrap().is_empty());
    }
}
