use std::sync::Arc;

use crate::{db::RatingStore, error::AppResult, models::Signal};

/// Reads the positive ratings that seed a run
pub struct SignalReader {
    ratings: Arc<dyn RatingStore>,
    threshold: i32,
}

impl SignalReader {
    pub fn new(ratings: Arc<dyn RatingStore>, threshold: i32) -> Self {
        Self { ratings, threshold }
    }

    /// Every rating at or above the positive threshold, read fresh.
    ///
    /// Order carries no meaning and the same user may contribute several
    /// signals for one artist; generation tolerates both.
    pub async fn read_positive_signals(&self) -> AppResult<Vec<Signal>> {
        let signals = self.ratings.positive_signals(self.threshold).await?;

        tracing::info!(
            threshold = self.threshold,
            count = signals.len(),
            "Read positive signals"
        );

        Ok(signals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::MockRatingStore;
    use crate::error::AppError;
    use crate::models::AlbumId;
    use mockall::predicate::eq;

    fn signal(user_id: i64, album: &str) -> Signal {
        Signal {
            user_id,
            album_id: AlbumId::from(album),
            artist_name: "Nova".to_string(),
            artist_id: None,
        }
    }

    #[tokio::test]
    async fn test_reads_with_configured_threshold() {
        let mut ratings = MockRatingStore::new();
        ratings
            .expect_positive_signals()
            .with(eq(4))
            .times(1)
            .returning(|_| Ok(vec![signal(1, "x"), signal(1, "x")]));

        let reader = SignalReader::new(Arc::new(ratings), 4);
        let signals = reader.read_positive_signals().await.unwrap();

        // Duplicates pass through untouched
        assert_eq!(signals.len(), 2);
    }

    #[tokio::test]
    async fn test_storage_failure_propagates() {
        let mut ratings = MockRatingStore::new();
        ratings
            .expect_positive_signals()
            .returning(|_| Err(AppError::Database(sqlx::Error::PoolTimedOut)));

        let reader = SignalReader::new(Arc::new(ratings), 3);
        let result = reader.read_positive_signals().await;

        assert!(matches!(result, Err(ref e) if e.is_fatal()));
    }
}
