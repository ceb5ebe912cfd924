//! Report review state machine
//!
//! `pending` is the only state with outgoing transitions. `approved`,
//! `declined` and `resolved` are terminal; there is no reopen action.
//! [`transition`] is pure: callers persist the returned report and emit the
//! returned notification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{ServiceError, ServiceResult};
use crate::policy::{self, Capability};
use crate::types::{Notification, NotificationType, Principal, Report, ReportStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Approve,
    Decline,
    /// Hazard was physically fixed, not only acknowledged
    Resolve,
}

impl ReviewAction {
    pub fn target_status(&self) -> ReportStatus {
        match self {
            ReviewAction::Approve => ReportStatus::Approved,
            ReviewAction::Decline => ReportStatus::Declined,
            ReviewAction::Resolve => ReportStatus::Resolved,
        }
    }

    pub fn notification_type(&self) -> NotificationType {
        match self {
            ReviewAction::Approve => NotificationType::ReportApproved,
            ReviewAction::Decline => NotificationType::ReportDeclined,
            ReviewAction::Resolve => NotificationType::ReportResolved,
        }
    }

    pub fn default_notes(&self) -> &'static str {
        match self {
            ReviewAction::Approve => "Approved by admin",
            ReviewAction::Decline => "Declined by admin",
            ReviewAction::Resolve => "Resolved by admin",
        }
    }
}

impl FromStr for ReviewAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(ReviewAction::Approve),
            "decline" => Ok(ReviewAction::Decline),
            "resolve" => Ok(ReviewAction::Resolve),
            other => Err(format!("Unknown review action: {}", other)),
        }
    }
}

/// Outcome of a legal transition
#[derive(Debug, Clone)]
pub struct Transition {
    pub report: Report,
    pub notification: Notification,
}

pub fn transition(
    report: &Report,
    action: ReviewAction,
    actor: &Principal,
    notes: Option<&str>,
    now: DateTime<Utc>,
) -> ServiceResult<Transition> {
    // Role first: a plain user is refused whatever the report state
    policy::authorize(actor, Capability::ReviewReports)?;

    if !actor.is_active {
        return Err(ServiceError::Authentication("Account is disabled".to_string()));
    }

    if report.status != ReportStatus::Pending {
        return Err(ServiceError::State(format!(
            "Report {} has already been processed ({})",
            report.id, report.status
        )));
    }

    let notes = notes
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| action.default_notes())
        .to_string();

    let mut next = report.clone();
    next.status = action.target_status();
    next.admin_notes = Some(notes);
    next.reviewed_by = Some(actor.uid.clone());
    next.reviewed_by_email = Some(actor.email.clone());
    next.updated_at = now;
    next.version = report.version + 1;

    let notification = submitter_notice(&next, action, now);

    Ok(Transition {
        report: next,
        notification,
    })
}

fn submitter_notice(report: &Report, action: ReviewAction, now: DateTime<Utc>) -> Notification {
    let place = report.location_label();
    let (title, message) = match action {
        ReviewAction::Approve => (
            "Report Approved",
            format!("Your hazard report at {} has been approved.", place),
        ),
        ReviewAction::Decline => (
            "Report Declined",
            format!("Your hazard report at {} has been declined.", place),
        ),
        ReviewAction::Resolve => (
            "Hazard Resolved",
            format!("The hazard you reported at {} has been resolved.", place),
        ),
    };

    Notification::new(
        report.submitter_id.clone(),
        action.notification_type(),
        title,
        message,
        now,
    )
    .with_data(serde_json::json!({
        "reportId": report.id,
        "location": place,
        "status": report.status,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Location, Role};

    fn pending_report() -> Report {
        let created = DateTime::parse_from_rfc3339("2024-03-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        Report {
            id: "u1_abc".into(),
            submitter_id: "u1".into(),
            submitter_email: "u1@example.com".into(),
            submitter_name: "Una".into(),
            description: "pothole".into(),
            location: Some(Location::Text("Main St".into())),
            image_ref: "reports/u1/photo.jpg".into(),
            status: ReportStatus::Pending,
            admin_notes: None,
            reviewed_by: None,
            reviewed_by_email: None,
            created_at: created,
            updated_at: created,
            version: 0,
        }
    }

    fn admin() -> Principal {
        Principal::new("a1", "admin@example.com", "Ada").with_role(Role::Admin)
    }

    #[test]
    fn approve_sets_status_notes_and_notifies_submitter() {
        let report = pending_report();
        let now = Utc::now();
        let t = transition(&report, ReviewAction::Approve, &admin(), None, now).unwrap();

        assert_eq!(t.report.status, ReportStatus::Approved);
        assert_eq!(t.report.admin_notes.as_deref(), Some("Approved by admin"));
        assert_eq!(t.report.reviewed_by.as_deref(), Some("a1"));
        assert_eq!(t.report.updated_at, now);
        assert_eq!(t.report.created_at, report.created_at);
        assert_eq!(t.report.version, 1);

        assert_eq!(t.notification.recipient_id, "u1");
        assert_eq!(t.notification.notification_type, NotificationType::ReportApproved);
        assert!(t.notification.message.contains("Main St"));
        assert_eq!(t.notification.data.as_ref().unwrap()["reportId"], "u1_abc");
    }

    #[test]
    fn supplied_notes_win_over_default() {
        let t = transition(
            &pending_report(),
            ReviewAction::Decline,
            &admin(),
            Some("  Duplicate of an earlier report "),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(t.report.status, ReportStatus::Declined);
        assert_eq!(t.report.admin_notes.as_deref(), Some("Duplicate of an earlier report"));
        assert_eq!(t.notification.notification_type, NotificationType::ReportDeclined);
    }

    #[test]
    fn blank_notes_fall_back_to_default() {
        let t = transition(
            &pending_report(),
            ReviewAction::Resolve,
            &admin(),
            Some("   "),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(t.report.admin_notes.as_deref(), Some("Resolved by admin"));
        assert_eq!(t.notification.notification_type, NotificationType::ReportResolved);
    }

    #[test]
    fn terminal_reports_do_not_move() {
        for status in [ReportStatus::Approved, ReportStatus::Declined, ReportStatus::Resolved] {
            let mut report = pending_report();
            report.status = status;
            for action in [ReviewAction::Approve, ReviewAction::Decline, ReviewAction::Resolve] {
                let err = transition(&report, action, &admin(), None, Utc::now()).unwrap_err();
                assert!(matches!(err, ServiceError::State(_)), "{:?} -> {:?}", status, action);
            }
        }
    }

    #[test]
    fn plain_users_are_refused_in_every_state() {
        let user = Principal::new("u2", "u2@example.com", "Uma");
        for status in ReportStatus::ALL {
            let mut report = pending_report();
            report.status = status;
            let err = transition(&report, ReviewAction::Approve, &user, None, Utc::now()).unwrap_err();
            assert!(matches!(err, ServiceError::Authorization(_)), "status {:?}", status);
        }
    }

    #[test]
    fn disabled_admin_cannot_review() {
        let mut actor = admin();
        actor.is_active = false;
        let err = transition(&pending_report(), ReviewAction::Approve, &actor, None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, ServiceError::Authentication(_)));
    }

    #[test]
    fn missing_location_uses_placeholder() {
        let mut report = pending_report();
        report.location = None;
        let t = transition(&report, ReviewAction::Approve, &admin(), None, Utc::now()).unwrap();
        assert!(t.notification.message.contains("an unspecified location"));
    }

    #[test]
    fn actions_parse_from_path_segments() {
        assert_eq!("approve".parse::<ReviewAction>().unwrap(), ReviewAction::Approve);
        assert_eq!("resolve".parse::<ReviewAction>().unwrap(), ReviewAction::Resolve);
        assert!("reopen".parse::<ReviewAction>().is_err());
    }
}
