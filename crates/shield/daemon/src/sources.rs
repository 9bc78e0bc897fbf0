//! Activity sources backed by the shield store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shield_activity::{ActivityError, ActivityResult, ActivitySource, SignalKind};
use shield_storage::{HealthCheckStore, ShieldStorage};
use shield_types::UserId;

/// Treats the latest answered health check as the user's "last seen".
pub struct HealthCheckActivitySource {
    storage: Arc<dyn ShieldStorage>,
    window: usize,
}

impl HealthCheckActivitySource {
    pub fn new(storage: Arc<dyn ShieldStorage>) -> Self {
        Self {
            storage,
            window: shield_activity::HEALTH_CHECK_WINDOW,
        }
    }
}

#[async_trait]
impl ActivitySource for HealthCheckActivitySource {
    fn kind(&self) -> SignalKind {
        SignalKind::LastSeen
    }

    async fn latest(&self, user_id: &UserId) -> ActivityResult<Option<DateTime<Utc>>> {
        let checks = self
            .storage
            .recent_health_checks(user_id, self.window)
            .await
            .map_err(|e| ActivityError::Source {
                source_name: "health_checks",
                message: e.to_string(),
            })?;
        Ok(checks.iter().filter_map(|c| c.responded_at).max())
    }
}
