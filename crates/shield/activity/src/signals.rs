//! Activity signal sources.
//!
//! Each source is an independent collaborator (auth, document access,
//! profile presence). Any of them may be stale or unreachable, so none is
//! treated as authoritative.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shield_types::UserId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use crate::error::{ActivityError, ActivityResult};

/// The kind of raw signal a source reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    /// Last successful login from the identity provider.
    Login,
    /// Last time the user opened or changed a stored document.
    DocumentAccess,
    /// Profile "last seen" marker.
    LastSeen,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Login => "login",
            SignalKind::DocumentAccess => "document_access",
            SignalKind::LastSeen => "last_seen",
        }
    }
}

/// A read-only source of the latest activity timestamp for a user.
#[async_trait]
pub trait ActivitySource: Send + Sync {
    fn kind(&self) -> SignalKind;

    /// `Ok(None)` means the source has never seen the user.
    async fn latest(&self, user_id: &UserId) -> ActivityResult<Option<DateTime<Utc>>>;
}

/// Fixed-table source, useful for tests and for hosts that pre-load
/// timestamps from another system.
pub struct StaticActivitySource {
    kind: SignalKind,
    entries: RwLock<HashMap<UserId, DateTime<Utc>>>,
    failing: AtomicBool,
}

impl StaticActivitySource {
    pub fn new(kind: SignalKind) -> Self {
        Self {
            kind,
            entries: RwLock::new(HashMap::new()),
            failing: AtomicBool::new(false),
        }
    }

    pub fn record(&self, user_id: UserId, at: DateTime<Utc>) {
        let mut guard = self.entries.write().unwrap_or_else(|e| e.into_inner());
        guard.insert(user_id, at);
    }

    /// Make every subsequent lookup fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl ActivitySource for StaticActivitySource {
    fn kind(&self) -> SignalKind {
        self.kind
    }

    async fn latest(&self, user_id: &UserId) -> ActivityResult<Option<DateTime<Utc>>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ActivityError::Source {
                source_name: self.kind.as_str(),
                message: "source unavailable".to_string(),
            });
        }
        let guard = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(guard.get(user_id).copied())
    }
}
