//! Reporting of accepted inconsistency windows between the identity provider
//! and the local store.

use std::sync::Mutex;

use serde::Serialize;

use warden_core::{IdpUid, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DriftEvent {
    /// A provider account exists without a local record: the local insert
    /// failed and deleting the account afterwards failed too.
    OrphanedAccount {
        idp_uid: IdpUid,
        user_name: String,
        error: String,
    },
    /// A local update was committed but not pushed to the provider.
    UpdateNotPropagated {
        user_id: UserId,
        idp_uid: Option<IdpUid>,
        error: String,
    },
}

impl DriftEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            DriftEvent::OrphanedAccount { .. } => "orphaned_account",
            DriftEvent::UpdateNotPropagated { .. } => "update_not_propagated",
        }
    }
}

pub trait ReconciliationSink: Send + Sync {
    fn report(&self, event: DriftEvent);
}

/// Default sink: one error-level event per drift.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ReconciliationSink for LogSink {
    fn report(&self, event: DriftEvent) {
        match &event {
            DriftEvent::OrphanedAccount {
                idp_uid,
                user_name,
                error,
            } => tracing::error!(
                kind = event.kind(),
                idp_uid = %idp_uid,
                user_name = %user_name,
                error = %error,
                "identity provider account left without local record"
            ),
            DriftEvent::UpdateNotPropagated {
                user_id,
                idp_uid,
                error,
            } => tracing::error!(
                kind = event.kind(),
                user_id = %user_id,
                idp_uid = ?idp_uid,
                error = %error,
                "local user update not propagated to identity provider"
            ),
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<DriftEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DriftEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl ReconciliationSink for RecordingSink {
    fn report(&self, event: DriftEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn events_serialize_with_kind_tag() {
        let event = DriftEvent::UpdateNotPropagated {
            user_id: UserId::from_uuid(Uuid::now_v7()),
            idp_uid: None,
            error: "boom".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "update_not_propagated");
        assert_eq!(value["error"], "boom");
    }

    #[test]
    fn recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        let uid = IdpUid::from_uuid(Uuid::new_v4());
        sink.report(DriftEvent::OrphanedAccount {
            idp_uid: uid,
            user_name: "a".to_string(),
            error: "x".to_string(),
        });
        LogSink.report(sink.events()[0].clone());
        assert_eq!(sink.events().len(), 1);
        assert_eq!(sink.events()[0].kind(), "orphaned_account");
    }
}
