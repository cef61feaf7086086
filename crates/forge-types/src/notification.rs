//! Notifications emitted on terminal job events, and the per-user
//! preference gating them (`spec.md` §3, §4.4, §9).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::uuid_shim::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    JobCompleted,
    JobFailed,
    JobCancelled,
    System,
    Recommendation,
}

impl NotificationType {
    /// The pipeline only ever originates the three job-terminal kinds;
    /// `System`/`Recommendation` exist in the type for API
    /// completeness with the wider notification surface this pipeline
    /// is carved out of, but C4 never constructs them.
    pub fn from_job_status(status: crate::job::JobStatus) -> Option<Self> {
        use crate::job::JobStatus;
        match status {
            JobStatus::Completed => Some(Self::JobCompleted),
            JobStatus::Failed => Some(Self::JobFailed),
            JobStatus::Cancelled => Some(Self::JobCancelled),
            JobStatus::Pending | JobStatus::Running => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: UserId,
    pub title: String,
    pub message: String,
    pub notification_type: NotificationType,
    pub read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub related_job_id: Option<i64>,
    pub related_artifact_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: UserId,
    pub title: String,
    pub message: String,
    pub notification_type: NotificationType,
    pub related_job_id: Option<i64>,
    pub related_artifact_id: Option<i64>,
}

/// The only recognized preference key (`spec.md` §9 Design Note):
/// absence of a row for a user is treated as `notifications_enabled =
/// false`, a conservative default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub user_id: UserId,
    pub notifications_enabled: bool,
}

impl NotificationPreferences {
    pub fn disabled(user_id: UserId) -> Self {
        Self {
            user_id,
            notifications_enabled: false,
        }
    }

    pub fn allows(&self, _kind: NotificationType) -> bool {
        self.notifications_enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobStatus;

    #[test]
    fn running_and_pending_produce_no_notification() {
        assert!(NotificationType::from_job_status(JobStatus::Pending).is_none());
        assert!(NotificationType::from_job_status(JobStatus::Running).is_none());
    }

    #[test]
    fn terminal_statuses_map_to_notification_types() {
        assert_eq!(
            NotificationType::from_job_status(JobStatus::Completed),
            Some(NotificationType::JobCompleted)
        );
        assert_eq!(
            NotificationType::from_job_status(JobStatus::Failed),
            Some(NotificationType::JobFailed)
        );
        assert_eq!(
            NotificationType::from_job_status(JobStatus::Cancelled),
            Some(NotificationType::JobCancelled)
        );
    }

    #[test]
    fn absent_preferences_default_to_disabled() {
        let prefs = NotificationPreferences::disabled(UserId(uuid::Uuid::nil()));
        assert!(!prefs.allows(NotificationType::JobCompleted));
    }
}
