//! Review service
//!
//! Every store mutation goes through here: the caller's role is checked with
//! [`policy::authorize`], report transitions come from
//! [`lifecycle::transition`] and are persisted with a version check.

use chrono::Utc;
use std::sync::Arc;

use crate::error::{ServiceError, ServiceResult};
use crate::lifecycle::{self, ReviewAction};
use crate::policy::{self, Capability};
use crate::store::{NotificationStore, ReportStore, UserStore};
use crate::types::{
    CreateProfileRequest, Notification, NotificationType, OutreachRequest, Principal, Report,
    ReportStatus, Role, SubmitReportRequest,
};
use crate::validation;
use crate::views::{self, StatusCounts, StatusFilter};

#[derive(Clone)]
pub struct HazardService {
    reports: Arc<dyn ReportStore>,
    notifications: Arc<dyn NotificationStore>,
    users: Arc<dyn UserStore>,
}

impl HazardService {
    pub fn new(
        reports: Arc<dyn ReportStore>,
        notifications: Arc<dyn NotificationStore>,
        users: Arc<dyn UserStore>,
    ) -> Self {
        Self {
            reports,
            notifications,
            users,
        }
    }

    /// Same backend for all three record kinds
    pub fn with_store<S>(store: Arc<S>) -> Self
    where
        S: ReportStore + NotificationStore + UserStore + 'static,
    {
        Self::new(store.clone(), store.clone(), store)
    }

    // ========== PRINCIPALS ==========

    /// Load the caller's profile; unknown or disabled accounts are refused
    pub async fn resolve_principal(&self, uid: &str) -> ServiceResult<Principal> {
        let principal = self
            .users
            .get_user(uid)
            .await?
            .ok_or_else(|| ServiceError::Authentication("No profile for this account".to_string()))?;

        if !principal.is_active {
            tracing::warn!("Refused disabled account {}", uid);
            return Err(ServiceError::Authentication(
                "This account has been deactivated".to_string(),
            ));
        }
        Ok(principal)
    }

    pub async fn register_profile(
        &self,
        uid: &str,
        req: &CreateProfileRequest,
    ) -> ServiceResult<Principal> {
        validation::validate_display_name(&req.display_name)?;
        validation::validate_email(&req.email)?;

        let principal = Principal::new(uid, req.email.trim(), req.display_name.trim());
        self.users.create_user(&principal).await?;
        tracing::info!("Registered profile {} ({})", uid, principal.email);
        Ok(principal)
    }

    // ========== REPORTS ==========

    pub async fn submit_report(
        &self,
        actor: &Principal,
        req: &SubmitReportRequest,
    ) -> ServiceResult<Report> {
        policy::authorize(actor, Capability::SubmitReport)?;
        let submission = validation::validate_submission(req)?;

        let now = Utc::now();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let report = Report {
            id: format!("{}_{}", actor.uid, &suffix[..12]),
            submitter_id: actor.uid.clone(),
            submitter_email: actor.email.clone(),
            submitter_name: actor.display_name.clone(),
            description: submission.description,
            location: submission.location,
            image_ref: submission.image_ref,
            status: ReportStatus::Pending,
            admin_notes: None,
            reviewed_by: None,
            reviewed_by_email: None,
            created_at: now,
            updated_at: now,
            version: 0,
        };

        self.reports.create_report(&report).await?;
        tracing::info!("Report {} submitted by {}", report.id, actor.uid);
        Ok(report)
    }

    /// The caller's own reports, newest first
    pub async fn my_reports(&self, actor: &Principal) -> ServiceResult<Vec<Report>> {
        policy::authorize(actor, Capability::ReadOwnReports)?;
        let mut reports = self.reports.list_reports_by_submitter(&actor.uid).await?;
        views::newest_first(&mut reports);
        Ok(reports)
    }

    pub async fn all_reports(
        &self,
        actor: &Principal,
        filter: StatusFilter,
    ) -> ServiceResult<Vec<Report>> {
        policy::authorize(actor, Capability::ReadAllReports)?;
        let reports = self.reports.list_reports().await?;
        Ok(views::filter_by_status(&reports, filter))
    }

    pub async fn dashboard(&self, actor: &Principal) -> ServiceResult<StatusCounts> {
        policy::authorize(actor, Capability::ReadAllReports)?;
        let reports = self.reports.list_reports().await?;
        Ok(views::count_by_status(&reports))
    }

    /// Approve, decline or resolve a pending report and notify its submitter.
    /// A report that was processed concurrently fails with `State`.
    pub async fn review_report(
        &self,
        actor: &Principal,
        report_id: &str,
        action: ReviewAction,
        notes: Option<&str>,
    ) -> ServiceResult<Report> {
        policy::authorize(actor, Capability::ReviewReports)?;

        let current = self
            .reports
            .get_report(report_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Report not found".to_string()))?;

        let outcome = lifecycle::transition(&current, action, actor, notes, Utc::now())?;

        self.reports
            .update_report(&outcome.report, current.version)
            .await
            .map_err(|e| match e {
                ServiceError::Conflict(_) => {
                    tracing::warn!("Report {} was processed concurrently", report_id);
                    ServiceError::State(format!(
                        "Report {} has already been processed",
                        report_id
                    ))
                }
                other => other,
            })?;

        tracing::info!(
            "Report {} {} by {}",
            report_id,
            outcome.report.status,
            actor.uid
        );

        // The transition stands even if the notice is lost
        if let Err(e) = self.notifications.create_notification(&outcome.notification).await {
            tracing::error!(
                "Failed to notify {} about report {}: {}",
                outcome.report.submitter_id,
                report_id,
                e
            );
        }

        Ok(outcome.report)
    }

    pub async fn report_history(&self, actor: &Principal) -> ServiceResult<Vec<Report>> {
        policy::authorize(actor, Capability::ViewReportHistory)?;
        let reports = self.reports.list_reports().await?;
        Ok(views::history(&reports))
    }

    /// Tell every active admin about a newly stored report. Returns how many
    /// notices were written.
    pub async fn announce_new_report(&self, report_id: &str) -> ServiceResult<usize> {
        let report = self
            .reports
            .get_report(report_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Report not found".to_string()))?;

        let place = report.location_label();
        let now = Utc::now();
        let admins: Vec<Principal> = self
            .users
            .list_users()
            .await?
            .into_iter()
            .filter(|u| u.role.is_admin() && u.is_active)
            .collect();

        let mut sent = 0;
        for admin in &admins {
            let notice = Notification::new(
                admin.uid.clone(),
                NotificationType::NewHazardReport,
                "New Hazard Report",
                format!(
                    "{} reported a hazard at {}.",
                    display_or_email(&report.submitter_name, &report.submitter_email),
                    place
                ),
                now,
            )
            .with_data(serde_json::json!({
                "reportId": report.id,
                "location": place,
            }));

            match self.notifications.create_notification(&notice).await {
                Ok(()) => sent += 1,
                Err(e) => tracing::error!("Failed to notify admin {}: {}", admin.uid, e),
            }
        }

        tracing::info!("Announced report {} to {} admins", report_id, sent);
        Ok(sent)
    }

    // ========== NOTIFICATIONS ==========

    pub async fn send_outreach(
        &self,
        actor: &Principal,
        req: &OutreachRequest,
    ) -> ServiceResult<Notification> {
        policy::authorize(actor, Capability::SendOutreach)?;

        let message = req.message.trim();
        if message.is_empty() {
            return Err(ServiceError::Validation("Message is required".to_string()));
        }
        if self.users.get_user(&req.recipient_id).await?.is_none() {
            return Err(ServiceError::NotFound("Recipient not found".to_string()));
        }

        let title = req
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or("Message from the safety team");

        let notice = Notification::new(
            req.recipient_id.clone(),
            NotificationType::AdminReachOut,
            title,
            message,
            Utc::now(),
        )
        .with_data(serde_json::json!({ "senderId": actor.uid }));

        self.notifications.create_notification(&notice).await?;
        tracing::info!("{} contacted {}", actor.uid, req.recipient_id);
        Ok(notice)
    }

    pub async fn notifications(&self, actor: &Principal) -> ServiceResult<Vec<Notification>> {
        policy::authorize(actor, Capability::ReadOwnNotifications)?;
        self.notifications.list_notifications(&actor.uid).await
    }

    pub async fn mark_notification_read(
        &self,
        actor: &Principal,
        notification_id: &str,
    ) -> ServiceResult<()> {
        policy::authorize(actor, Capability::MarkNotificationsRead)?;
        if self.notifications.mark_read(&actor.uid, notification_id).await? {
            Ok(())
        } else {
            Err(ServiceError::NotFound("Notification not found".to_string()))
        }
    }

    pub async fn clear_notifications(&self, actor: &Principal) -> ServiceResult<usize> {
        policy::authorize(actor, Capability::MarkNotificationsRead)?;
        let removed = self.notifications.clear_notifications(&actor.uid).await?;
        tracing::info!("Cleared {} notifications for {}", removed, actor.uid);
        Ok(removed)
    }

    // ========== ADMIN ACCOUNTS ==========

    pub async fn list_admins(&self, actor: &Principal) -> ServiceResult<Vec<Principal>> {
        policy::authorize(actor, Capability::ManageAdmins)?;
        let mut admins: Vec<Principal> = self
            .users
            .list_users()
            .await?
            .into_iter()
            .filter(|u| u.role.is_admin())
            .collect();
        admins.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(admins)
    }

    pub async fn set_admin_active(
        &self,
        actor: &Principal,
        uid: &str,
        is_active: bool,
    ) -> ServiceResult<Principal> {
        policy::authorize(actor, Capability::ManageAdmins)?;
        if uid == actor.uid {
            return Err(ServiceError::Validation(
                "You cannot change your own account status".to_string(),
            ));
        }

        let mut target = self.admin_account(uid).await?;
        self.users.set_active(uid, is_active).await?;
        target.is_active = is_active;
        tracing::info!(
            "{} set admin {} active={}",
            actor.uid,
            uid,
            is_active
        );
        Ok(target)
    }

    pub async fn delete_admin(&self, actor: &Principal, uid: &str) -> ServiceResult<()> {
        policy::authorize(actor, Capability::ManageAdmins)?;
        if uid == actor.uid {
            return Err(ServiceError::Validation(
                "You cannot delete your own account".to_string(),
            ));
        }

        self.admin_account(uid).await?;
        self.users.delete_user(uid).await?;
        tracing::info!("{} deleted admin {}", actor.uid, uid);
        Ok(())
    }

    async fn admin_account(&self, uid: &str) -> ServiceResult<Principal> {
        let target = self
            .users
            .get_user(uid)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;
        if target.role != Role::Admin {
            return Err(ServiceError::Validation(format!(
                "{} is not an admin account",
                target.email
            )));
        }
        Ok(target)
    }
}

fn display_or_email<'a>(name: &'a str, email: &'a str) -> &'a str {
    if name.trim().is_empty() {
        email
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::local::{LocalKv, LocalStore};
    use crate::types::Location;

    struct Fixture {
        service: HazardService,
        store: Arc<LocalStore>,
        user: Principal,
        admin: Principal,
        super_admin: Principal,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(LocalStore::new(LocalKv::new()));
        let user = Principal::new("u1", "una@example.com", "Una");
        let admin = Principal::new("a1", "ada@example.com", "Ada").with_role(Role::Admin);
        let super_admin =
            Principal::new("s1", "sam@example.com", "Sam").with_role(Role::SuperAdmin);
        for p in [&user, &admin, &super_admin] {
            store.create_user(p).await.unwrap();
        }
        Fixture {
            service: HazardService::with_store(store.clone()),
            store,
            user,
            admin,
            super_admin,
        }
    }

    fn pothole() -> SubmitReportRequest {
        SubmitReportRequest {
            description: "pothole".into(),
            location: Some(Location::Text("Main St".into())),
            image_ref: Some("reports/u1/photo.jpg".into()),
        }
    }

    #[tokio::test]
    async fn submit_then_approve_notifies_submitter() {
        let f = fixture().await;
        let report = f.service.submit_report(&f.user, &pothole()).await.unwrap();
        assert_eq!(report.status, ReportStatus::Pending);
        assert!(report.id.starts_with("u1_"));

        let approved = f
            .service
            .review_report(&f.admin, &report.id, ReviewAction::Approve, None)
            .await
            .unwrap();
        assert_eq!(approved.status, ReportStatus::Approved);
        assert_eq!(approved.reviewed_by.as_deref(), Some("a1"));

        let notices = f.service.notifications(&f.user).await.unwrap();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].notification_type, NotificationType::ReportApproved);
        assert!(notices[0].message.contains("Main St"));
    }

    #[tokio::test]
    async fn second_review_fails_without_second_notice() {
        let f = fixture().await;
        let report = f.service.submit_report(&f.user, &pothole()).await.unwrap();

        f.service
            .review_report(&f.admin, &report.id, ReviewAction::Decline, Some("duplicate"))
            .await
            .unwrap();
        let err = f
            .service
            .review_report(&f.super_admin, &report.id, ReviewAction::Approve, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::State(_)));

        let stored = f.store.get_report(&report.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReportStatus::Declined);
        assert_eq!(stored.admin_notes.as_deref(), Some("duplicate"));
        assert_eq!(stored.version, 1);
        assert_eq!(f.service.notifications(&f.user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stale_writer_is_refused_as_state_error() {
        let f = fixture().await;
        let report = f.service.submit_report(&f.user, &pothole()).await.unwrap();

        // someone else processes it after we loaded version 0
        let mut other = report.clone();
        other.status = ReportStatus::Resolved;
        other.version = 1;
        f.store.update_report(&other, 0).await.unwrap();

        let stale = lifecycle::transition(&report, ReviewAction::Approve, &f.admin, None, Utc::now())
            .unwrap();
        let err = f.store.update_report(&stale.report, 0).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        let err = f
            .service
            .review_report(&f.admin, &report.id, ReviewAction::Approve, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::State(_)));
    }

    #[tokio::test]
    async fn plain_user_cannot_review_or_list() {
        let f = fixture().await;
        let report = f.service.submit_report(&f.user, &pothole()).await.unwrap();

        let err = f
            .service
            .review_report(&f.user, &report.id, ReviewAction::Approve, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Authorization(_)));

        // refused before the lookup, so a missing id is still a role error
        let err = f
            .service
            .review_report(&f.user, "missing", ReviewAction::Resolve, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Authorization(_)));

        assert!(matches!(
            f.service.all_reports(&f.user, StatusFilter::All).await,
            Err(ServiceError::Authorization(_))
        ));
        assert!(matches!(
            f.service.dashboard(&f.user).await,
            Err(ServiceError::Authorization(_))
        ));
    }

    #[tokio::test]
    async fn unknown_report_is_not_found() {
        let f = fixture().await;
        let err = f
            .service
            .review_report(&f.admin, "nope", ReviewAction::Approve, None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Report not found");
    }

    #[tokio::test]
    async fn dashboard_and_history_follow_reviews() {
        let f = fixture().await;
        let mut ids = Vec::new();
        for _ in 0..4 {
            ids.push(f.service.submit_report(&f.user, &pothole()).await.unwrap().id);
        }
        f.service
            .review_report(&f.admin, &ids[0], ReviewAction::Approve, None)
            .await
            .unwrap();
        f.service
            .review_report(&f.admin, &ids[1], ReviewAction::Resolve, None)
            .await
            .unwrap();

        let counts = f.service.dashboard(&f.admin).await.unwrap();
        assert_eq!(counts.pending, 2);
        assert_eq!(counts.approved, 1);
        assert_eq!(counts.resolved, 1);
        assert_eq!(counts.total, 4);

        let pending = f
            .service
            .all_reports(&f.admin, StatusFilter::Only(ReportStatus::Pending))
            .await
            .unwrap();
        assert_eq!(pending.len(), 2);

        let history = f.service.report_history(&f.super_admin).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|r| r.reviewed_by_email.is_some()));

        assert_eq!(f.service.my_reports(&f.user).await.unwrap().len(), 4);
        assert!(f.service.my_reports(&f.admin).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn disabled_account_cannot_resolve() {
        let f = fixture().await;
        assert_eq!(f.service.resolve_principal("u1").await.unwrap().uid, "u1");

        f.store.set_active("u1", false).await.unwrap();
        assert!(matches!(
            f.service.resolve_principal("u1").await,
            Err(ServiceError::Authentication(_))
        ));
        assert!(matches!(
            f.service.resolve_principal("ghost").await,
            Err(ServiceError::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn register_profile_defaults_to_user() {
        let f = fixture().await;
        let req = CreateProfileRequest {
            email: "new@example.com".into(),
            display_name: "Newt".into(),
        };
        let profile = f.service.register_profile("n1", &req).await.unwrap();
        assert_eq!(profile.role, Role::User);
        assert!(matches!(
            f.service.register_profile("n1", &req).await,
            Err(ServiceError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn new_report_reaches_active_admins_only() {
        let f = fixture().await;
        let idle = Principal::new("a2", "idle@example.com", "Idle").with_role(Role::Admin);
        f.store.create_user(&idle).await.unwrap();
        f.store.set_active("a2", false).await.unwrap();

        let report = f.service.submit_report(&f.user, &pothole()).await.unwrap();
        assert_eq!(f.service.announce_new_report(&report.id).await.unwrap(), 2);

        let notices = f.service.notifications(&f.admin).await.unwrap();
        assert_eq!(notices[0].notification_type, NotificationType::NewHazardReport);
        assert!(f.store.list_notifications("a2").await.unwrap().is_empty());
        assert!(f.store.list_notifications("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn notifications_are_scoped_to_the_caller() {
        let f = fixture().await;
        let req = OutreachRequest {
            recipient_id: "u1".into(),
            title: None,
            message: "Please send a clearer photo".into(),
        };
        let sent = f.service.send_outreach(&f.admin, &req).await.unwrap();
        assert_eq!(sent.notification_type, NotificationType::AdminReachOut);

        assert!(matches!(
            f.service.mark_notification_read(&f.admin, &sent.id).await,
            Err(ServiceError::NotFound(_))
        ));
        f.service.mark_notification_read(&f.user, &sent.id).await.unwrap();
        assert!(f.service.notifications(&f.user).await.unwrap()[0].read);

        assert_eq!(f.service.clear_notifications(&f.user).await.unwrap(), 1);
        assert!(f.service.notifications(&f.user).await.unwrap().is_empty());

        assert!(matches!(
            f.service.send_outreach(&f.user, &req).await,
            Err(ServiceError::Authorization(_))
        ));
    }

    #[tokio::test]
    async fn super_admin_manages_other_admins() {
        let f = fixture().await;

        assert!(matches!(
            f.service.list_admins(&f.admin).await,
            Err(ServiceError::Authorization(_))
        ));
        assert_eq!(f.service.list_admins(&f.super_admin).await.unwrap().len(), 2);

        let updated = f
            .service
            .set_admin_active(&f.super_admin, "a1", false)
            .await
            .unwrap();
        assert!(!updated.is_active);
        assert!(!f.store.get_user("a1").await.unwrap().unwrap().is_active);

        assert!(matches!(
            f.service.set_admin_active(&f.super_admin, "s1", false).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            f.service.delete_admin(&f.super_admin, "u1").await,
            Err(ServiceError::Validation(_))
        ));

        f.service.delete_admin(&f.super_admin, "a1").await.unwrap();
        assert!(f.store.get_user("a1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn outreach_needs_a_message_and_a_known_recipient() {
        let f = fixture().await;
        let to = |recipient: &str, message: &str| OutreachRequest {
            recipient_id: recipient.into(),
            title: None,
            message: message.into(),
        };

        assert!(matches!(
            f.service.send_outreach(&f.admin, &to("ghost", "Please call us")).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            f.service.send_outreach(&f.admin, &to("u1", "   ")).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(f.store.list_notifications("u1").await.unwrap().is_empty());

        let notice = f
            .service
            .send_outreach(&f.admin, &to("u1", " Please call us "))
            .await
            .unwrap();
        assert_eq!(notice.message, "Please call us");
        assert_eq!(notice.title, "Message from the safety team");
    }

    #[tokio::test]
    async fn super_admin_cannot_delete_themself() {
        let f = fixture().await;
        assert!(matches!(
            f.service.delete_admin(&f.super_admin, "s1").await,
            Err(ServiceError::Validation(_))
        ));
        assert!(f.store.get_user("s1").await.unwrap().is_some());

        assert!(matches!(
            f.service.delete_admin(&f.super_admin, "ghost").await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn announcing_an_unknown_report_is_not_found() {
        let f = fixture().await;
        assert!(matches!(
            f.service.announce_new_report("missing").await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(f.store.list_notifications("a1").await.unwrap().is_empty());
    }
}
