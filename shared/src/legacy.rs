//! Whole-array local storage layout
//!
//! Older clients kept every record in three JSON arrays under the keys
//! `incident_reports`, `user_notifications` and `hazard_local_users`, and
//! saved by rewriting the whole array. Two writers holding stale copies
//! silently overwrite each other. [`import_legacy`] moves those arrays onto
//! per-record keys; [`LegacySnapshot`] keeps the old read/write behavior for
//! tooling that still has to speak the old layout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{storage_error, ServiceError, ServiceResult};
use crate::lifecycle::{self, ReviewAction};
use crate::store::local::{LocalKv, LocalStore};
use crate::store::{NotificationStore, ReportStore, UserStore};
use crate::types::{Location, Notification, NotificationType, Principal, Report, ReportStatus, Role};

pub const LEGACY_REPORTS_KEY: &str = "incident_reports";
pub const LEGACY_NOTIFICATIONS_KEY: &str = "user_notifications";
pub const LEGACY_USERS_KEY: &str = "hazard_local_users";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyReport {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub user_email: String,
    #[serde(default)]
    pub user_name: String,
    pub description: String,
    #[serde(default)]
    pub location: Option<Location>,
    /// Inline data URL in old clients
    #[serde(default)]
    pub image: String,
    pub status: ReportStatus,
    #[serde(default)]
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<LegacyReport> for Report {
    fn from(legacy: LegacyReport) -> Self {
        Report {
            id: legacy.id,
            submitter_id: legacy.user_id,
            submitter_email: legacy.user_email,
            submitter_name: legacy.user_name,
            description: legacy.description,
            location: legacy.location,
            image_ref: legacy.image,
            status: legacy.status,
            admin_notes: legacy.admin_notes,
            reviewed_by: None,
            reviewed_by_email: None,
            created_at: legacy.created_at,
            updated_at: legacy.updated_at.unwrap_or(legacy.created_at),
            version: 0,
        }
    }
}

impl From<&Report> for LegacyReport {
    fn from(report: &Report) -> Self {
        LegacyReport {
            id: report.id.clone(),
            user_id: report.submitter_id.clone(),
            user_email: report.submitter_email.clone(),
            user_name: report.submitter_name.clone(),
            description: report.description.clone(),
            location: report.location.clone(),
            image: report.image_ref.clone(),
            status: report.status,
            admin_notes: report.admin_notes.clone(),
            created_at: report.created_at,
            updated_at: Some(report.updated_at),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyNotification {
    id: String,
    user_id: String,
    #[serde(rename = "type")]
    notification_type: NotificationType,
    title: String,
    message: String,
    #[serde(default)]
    read: bool,
    created_at: DateTime<Utc>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyUser {
    uid: String,
    email: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    role: Role,
    #[serde(default = "active_by_default")]
    is_active: bool,
    created_at: DateTime<Utc>,
}

fn active_by_default() -> bool {
    true
}

async fn read_array<T: serde::de::DeserializeOwned>(kv: &LocalKv, key: &str) -> ServiceResult<Vec<T>> {
    match kv.get(key).await {
        Some(raw) => serde_json::from_str(&raw).map_err(storage_error("parse legacy array")),
        None => Ok(Vec::new()),
    }
}

/// One client's in-memory copy of the report array
#[derive(Debug, Clone)]
pub struct LegacySnapshot {
    kv: LocalKv,
    reports: Vec<Report>,
}

impl LegacySnapshot {
    pub async fn load(kv: &LocalKv) -> ServiceResult<Self> {
        let reports = read_array::<LegacyReport>(kv, LEGACY_REPORTS_KEY)
            .await?
            .into_iter()
            .map(Report::from)
            .collect();
        Ok(Self {
            kv: kv.clone(),
            reports,
        })
    }

    pub fn reports(&self) -> &[Report] {
        &self.reports
    }

    /// Apply a review to this copy only; nothing is written until [`save`](Self::save)
    pub fn review(
        &mut self,
        report_id: &str,
        action: ReviewAction,
        actor: &Principal,
    ) -> ServiceResult<Notification> {
        let slot = self
            .reports
            .iter_mut()
            .find(|r| r.id == report_id)
            .ok_or_else(|| ServiceError::NotFound("Report not found".to_string()))?;
        let outcome = lifecycle::transition(slot, action, actor, None, Utc::now())?;
        *slot = outcome.report;
        Ok(outcome.notification)
    }

    /// Overwrite the stored array with this copy
    pub async fn save(&self) -> ServiceResult<()> {
        let legacy: Vec<LegacyReport> = self.reports.iter().map(LegacyReport::from).collect();
        let raw = serde_json::to_string(&legacy).map_err(storage_error("encode legacy array"))?;
        self.kv.set(LEGACY_REPORTS_KEY, raw).await
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub reports: usize,
    pub notifications: usize,
    pub users: usize,
    pub skipped: usize,
}

impl ImportSummary {
    pub fn is_empty(&self) -> bool {
        self.reports + self.notifications + self.users + self.skipped == 0
    }
}

/// Move the legacy arrays onto per-record keys and drop the arrays.
/// Records whose id already exists are skipped.
pub async fn import_legacy(store: &LocalStore) -> ServiceResult<ImportSummary> {
    let kv = store.kv();
    let mut summary = ImportSummary::default();

    for legacy in read_array::<LegacyReport>(kv, LEGACY_REPORTS_KEY).await? {
        let report = Report::from(legacy);
        match store.create_report(&report).await {
            Ok(()) => summary.reports += 1,
            Err(ServiceError::Conflict(_)) => summary.skipped += 1,
            Err(e) => return Err(e),
        }
    }

    for legacy in read_array::<LegacyNotification>(kv, LEGACY_NOTIFICATIONS_KEY).await? {
        let notification = Notification {
            id: legacy.id,
            recipient_id: legacy.user_id,
            notification_type: legacy.notification_type,
            title: legacy.title,
            message: legacy.message,
            read: legacy.read,
            created_at: legacy.created_at,
            data: legacy.data,
        };
        store.create_notification(&notification).await?;
        summary.notifications += 1;
    }

    for legacy in read_array::<LegacyUser>(kv, LEGACY_USERS_KEY).await? {
        let user = Principal {
            uid: legacy.uid,
            email: legacy.email,
            display_name: legacy.display_name,
            role: legacy.role,
            is_active: legacy.is_active,
            created_at: legacy.created_at,
        };
        match store.create_user(&user).await {
            Ok(()) => summary.users += 1,
            Err(ServiceError::Conflict(_)) => summary.skipped += 1,
            Err(e) => return Err(e),
        }
    }

    for key in [LEGACY_REPORTS_KEY, LEGACY_NOTIFICATIONS_KEY, LEGACY_USERS_KEY] {
        kv.remove(key).await?;
    }

    if !summary.is_empty() {
        tracing::info!(
            "Imported legacy data: {} reports, {} notifications, {} users ({} skipped)",
            summary.reports,
            summary.notifications,
            summary.users,
            summary.skipped
        );
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORTS_JSON: &str = r#"[
        {"id":"u1_1","userId":"u1","userEmail":"u1@example.com","description":"pothole",
         "location":"Main St","image":"data:image/jpeg;base64,AAAA","status":"pending",
         "createdAt":"2024-01-01T10:00:00Z"},
        {"id":"u1_2","userId":"u1","description":"broken lamp","status":"pending",
         "createdAt":"2024-01-02T10:00:00Z"},
        {"id":"u2_1","userId":"u2","description":"oil spill","status":"reviewed",
         "adminNotes":"Approved by admin","createdAt":"2024-01-03T10:00:00Z"}
    ]"#;

    fn admin() -> Principal {
        Principal::new("a1", "a1@example.com", "Ada").with_role(Role::Admin)
    }

    async fn seeded_kv() -> LocalKv {
        let kv = LocalKv::new();
        kv.set(LEGACY_REPORTS_KEY, REPORTS_JSON.to_string()).await.unwrap();
        kv
    }

    #[tokio::test]
    async fn stale_snapshot_overwrites_earlier_write() {
        let kv = seeded_kv().await;

        let mut tab_a = LegacySnapshot::load(&kv).await.unwrap();
        let mut tab_b = LegacySnapshot::load(&kv).await.unwrap();
        assert_eq!(tab_a.reports().len(), 3);

        tab_a.review("u1_1", ReviewAction::Approve, &admin()).unwrap();
        tab_a.save().await.unwrap();

        tab_b.review("u1_2", ReviewAction::Decline, &admin()).unwrap();
        tab_b.save().await.unwrap();

        let stored = LegacySnapshot::load(&kv).await.unwrap();
        let status = |id: &str| stored.reports().iter().find(|r| r.id == id).unwrap().status;
        // tab A's approval is lost
        assert_eq!(status("u1_1"), ReportStatus::Pending);
        assert_eq!(status("u1_2"), ReportStatus::Declined);
    }

    #[tokio::test]
    async fn import_moves_arrays_to_record_keys() {
        let kv = seeded_kv().await;
        kv.set(
            LEGACY_NOTIFICATIONS_KEY,
            r#"[{"id":"n1","userId":"u2","type":"report_approved","title":"Report Approved",
                 "message":"ok","read":false,"createdAt":"2024-01-03T11:00:00Z"}]"#
                .to_string(),
        )
        .await
        .unwrap();
        kv.set(
            LEGACY_USERS_KEY,
            r#"[{"uid":"u1","email":"u1@example.com","displayName":"Una","role":"user",
                 "createdAt":"2023-12-01T00:00:00Z"}]"#
                .to_string(),
        )
        .await
        .unwrap();

        let store = LocalStore::new(kv.clone());
        let summary = import_legacy(&store).await.unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                reports: 3,
                notifications: 1,
                users: 1,
                skipped: 0
            }
        );

        let approved = store.get_report("u2_1").await.unwrap().unwrap();
        assert_eq!(approved.status, ReportStatus::Approved);
        assert_eq!(store.list_notifications("u2").await.unwrap().len(), 1);
        assert!(store.get_user("u1").await.unwrap().unwrap().is_active);
        assert!(kv.get(LEGACY_REPORTS_KEY).await.is_none());

        // second run finds nothing left
        assert!(import_legacy(&store).await.unwrap().is_empty());
    }
}
