// Copyright 2025 the Runebender Xilem Authors
// SPDX-License-Identifier: Apache-2.0

//! Edit records and change notifications.

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::changes::Change;
use crate::error::HandlerError;

/// Persistence state of an edit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistStatus {
    /// Committed to the cache, not yet written
    Pending,
    /// Written to the backend
    Committed,
    /// Gave up after `attempts` store attempts
    Failed { attempts: u32, message: String },
}

impl PersistStatus {
    /// Whether the status is final
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// A committed edit.
///
/// Records are cheap to clone; clones share the persistence status.
#[derive(Debug, Clone)]
pub struct EditRecord {
    id: u64,
    glyph_name: String,
    change: Change,
    rollback: Change,
    comment: String,
    originator: Option<String>,
    timestamp: DateTime<Utc>,
    status: watch::Receiver<PersistStatus>,
}

impl EditRecord {
    pub(crate) fn new(
        id: u64,
        glyph_name: String,
        change: Change,
        rollback: Change,
        comment: String,
        originator: Option<String>,
        status: watch::Receiver<PersistStatus>,
    ) -> Self {
        Self {
            id,
            glyph_name,
            change,
            rollback,
            comment,
            originator,
            timestamp: Utc::now(),
            status,
        }
    }

    /// Handler-unique, increasing id
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn glyph_name(&self) -> &str {
        &self.glyph_name
    }

    pub fn change(&self) -> &Change {
        &self.change
    }

    pub fn rollback(&self) -> &Change {
        &self.rollback
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn originator(&self) -> Option<&str> {
        self.originator.as_deref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn status(&self) -> PersistStatus {
        self.status.borrow().clone()
    }

    /// Wait until the edit is written or has permanently failed.
    ///
    /// Returns the last known status if the handler goes away first.
    pub async fn wait_persisted(&self) -> PersistStatus {
        let mut status = self.status.clone();
        if let Ok(settled) = status.wait_for(PersistStatus::is_settled).await {
            return settled.clone();
        }
        status.borrow().clone()
    }

    /// [`wait_persisted`](Self::wait_persisted) as a `Result`
    pub async fn persisted(&self) -> Result<(), HandlerError> {
        match self.wait_persisted().await {
            PersistStatus::Committed => Ok(()),
            PersistStatus::Failed { attempts, message } => Err(HandlerError::Persist {
                name: self.glyph_name.clone(),
                attempts,
                message,
            }),
            PersistStatus::Pending => Err(HandlerError::Closed),
        }
    }
}

/// Broadcast after every committed edit
#[derive(Debug, Clone)]
pub struct ChangeNotification {
    pub glyph_name: String,
    pub change: Change,
    pub originator: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_persisted_sees_settled_status() {
        let (tx, rx) = watch::channel(PersistStatus::Pending);
        let record = EditRecord::new(
            1,
            "A".to_string(),
            Change::empty(),
            Change::empty(),
            "Test edit".to_string(),
            None,
            rx,
        );
        assert_eq!(record.status(), PersistStatus::Pending);

        let waiter = {
            let record = record.clone();
            tokio::spawn(async move { record.wait_persisted().await })
        };
        tx.send_replace(PersistStatus::Committed);
        assert_eq!(waiter.await.unwrap(), PersistStatus::Committed);
        assert_eq!(record.status(), PersistStatus::Committed);
    }

    #[tokio::test]
    async fn test_wait_persisted_returns_when_sender_dropped() {
        let (tx, rx) = watch::channel(PersistStatus::Pending);
        let record = EditRecord::new(
            1,
            "A".to_string(),
            Change::empty(),
            Change::empty(),
            String::new(),
            Some("client-1".to_string()),
            rx,
        );
        drop(tx);
        assert_eq!(record.wait_persisted().await, PersistStatus::Pending);
        assert!(matches!(record.persisted().await, Err(HandlerError::Closed)));
        assert_eq!(record.originator(), Some("client-1"));
    }

    #[tokio::test]
    async fn test_persisted_reports_failure() {
        let (tx, rx) = watch::channel(PersistStatus::Pending);
        let record = EditRecord::new(
            7,
            "B".to_string(),
            Change::empty(),
            Change::empty(),
            String::new(),
            None,
            rx,
        );
        tx.send_replace(PersistStatus::Failed {
            attempts: 3,
            message: "disk full".to_string(),
        });
        let err = record.persisted().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to persist glyph 'B' after 3 attempts: disk full"
        );
    }
}
