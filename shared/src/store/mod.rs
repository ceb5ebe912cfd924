//! Persistence for reports, notifications and user profiles
//!
//! Two backends implement the same traits: [`dynamo::DynamoStore`] for the
//! hosted table and [`local::LocalStore`] for a per-record key-value store.
//! Report updates are compare-and-swap on [`Report::version`].

pub mod dynamo;
pub mod local;

use async_trait::async_trait;

use crate::error::ServiceResult;
use crate::types::{Notification, Principal, Report};

#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Fails with `Conflict` if the id is taken
    async fn create_report(&self, report: &Report) -> ServiceResult<()>;

    async fn get_report(&self, id: &str) -> ServiceResult<Option<Report>>;

    async fn list_reports(&self) -> ServiceResult<Vec<Report>>;

    async fn list_reports_by_submitter(&self, submitter_id: &str) -> ServiceResult<Vec<Report>>;

    /// Replace the stored report only if its version is still
    /// `expected_version`, otherwise `Conflict`
    async fn update_report(&self, report: &Report, expected_version: u64) -> ServiceResult<()>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create_notification(&self, notification: &Notification) -> ServiceResult<()>;

    async fn list_notifications(&self, recipient_id: &str) -> ServiceResult<Vec<Notification>>;

    /// Returns false when the notification does not exist
    async fn mark_read(&self, recipient_id: &str, notification_id: &str) -> ServiceResult<bool>;

    /// Returns how many were removed
    async fn clear_notifications(&self, recipient_id: &str) -> ServiceResult<usize>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `Conflict` if the uid is taken
    async fn create_user(&self, user: &Principal) -> ServiceResult<()>;

    async fn get_user(&self, uid: &str) -> ServiceResult<Option<Principal>>;

    async fn list_users(&self) -> ServiceResult<Vec<Principal>>;

    /// Fails with `NotFound` for an unknown uid
    async fn set_active(&self, uid: &str, is_active: bool) -> ServiceResult<()>;

    async fn delete_user(&self, uid: &str) -> ServiceResult<()>;
}
