use std::sync::Arc;

use crate::models::AuthEvent;
use crate::repositories::AuthEventRepository;

/// Writes audit events without ever failing the caller.
#[derive(Clone)]
pub struct AuditRecorder {
    events: Arc<dyn AuthEventRepository>,
}

impl AuditRecorder {
    pub fn new(events: Arc<dyn AuthEventRepository>) -> Self {
        Self { events }
    }

    pub async fn record(&self, event: AuthEvent) {
        if let Err(e) = self.events.create(&event).await {
            tracing::warn!(
                error = %e,
                event_type = event.event_type.as_str(),
                user_id = ?event.user_id,
                "Failed to record auth event"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AuthEventType;
    use crate::repositories::{memory::MemoryStore, RepoError};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    struct BrokenEvents;

    #[async_trait]
    impl AuthEventRepository for BrokenEvents {
        async fn create(&self, _: &AuthEvent) -> Result<(), RepoError> {
            Err(RepoError::Internal(anyhow::anyhow!("disk full")))
        }
        async fn find_by_user(&self, _: Uuid, _: i64, _: i64) -> Result<Vec<AuthEvent>, RepoError> {
            Ok(vec![])
        }
        async fn find_by_tenant(&self, _: Uuid, _: i64, _: i64) -> Result<Vec<AuthEvent>, RepoError> {
            Ok(vec![])
        }
        async fn find_by_type(
            &self,
            _: AuthEventType,
            _: i64,
            _: i64,
        ) -> Result<Vec<AuthEvent>, RepoError> {
            Ok(vec![])
        }
        async fn find_by_user_and_type_since(
            &self,
            _: Uuid,
            _: AuthEventType,
            _: DateTime<Utc>,
        ) -> Result<Vec<AuthEvent>, RepoError> {
            Ok(vec![])
        }
        async fn count_recent_by_ip_and_type(
            &self,
            _: &str,
            _: AuthEventType,
            _: DateTime<Utc>,
        ) -> Result<i64, RepoError> {
            Ok(0)
        }
        async fn delete_older_than(&self, _: DateTime<Utc>) -> Result<u64, RepoError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_failed_write_is_swallowed() {
        let recorder = AuditRecorder::new(Arc::new(BrokenEvents));
        recorder.record(AuthEvent::new(AuthEventType::Logout)).await;
    }

    #[tokio::test]
    async fn test_event_is_persisted() {
        let store = Arc::new(MemoryStore::new());
        let recorder = AuditRecorder::new(store.clone());
        let user = Uuid::new_v4();

        recorder
            .record(AuthEvent::new(AuthEventType::Logout).user(user))
            .await;

        let events = store.find_by_user(user, 0, 10).await.unwrap();
        assert_eq!(events.len(), 1);
    }
}
