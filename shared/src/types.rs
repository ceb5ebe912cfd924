use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ========== USER ==========
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    /// Admin and super admin both count as reviewers.
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "super_admin" => Ok(Role::SuperAdmin),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

fn default_true() -> bool {
    true
}

/// An authenticated user profile
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Principal {
    pub uid: String,
    pub email: String,
    pub display_name: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Principal {
    pub fn new(uid: impl Into<String>, email: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: email.into(),
            display_name: display_name.into(),
            role: Role::User,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateProfileRequest {
    pub email: String,
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub is_active: bool,
}

// ========== REPORT ==========
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    #[serde(alias = "reviewed")]
    Approved,
    Declined,
    Resolved,
}

impl ReportStatus {
    pub const ALL: [ReportStatus; 4] = [
        ReportStatus::Pending,
        ReportStatus::Approved,
        ReportStatus::Declined,
        ReportStatus::Resolved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Approved => "approved",
            ReportStatus::Declined => "declined",
            ReportStatus::Resolved => "resolved",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReportStatus::Pending)
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReportStatus::Pending),
            "approved" | "reviewed" => Ok(ReportStatus::Approved),
            "declined" => Ok(ReportStatus::Declined),
            "resolved" => Ok(ReportStatus::Resolved),
            other => Err(format!("Unknown report status: {}", other)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum Location {
    Coordinates { latitude: f64, longitude: f64 },
    Text(String),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Text(text) => f.write_str(text),
            Location::Coordinates { latitude, longitude } => {
                write!(f, "{:.5}, {:.5}", latitude, longitude)
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Report {
    pub id: String,
    pub submitter_id: String,
    pub submitter_email: String,
    pub submitter_name: String,
    pub description: String,
    #[serde(default)]
    pub location: Option<Location>,
    pub image_ref: String,
    pub status: ReportStatus,
    #[serde(default)]
    pub admin_notes: Option<String>,
    #[serde(default)]
    pub reviewed_by: Option<String>,
    #[serde(default)]
    pub reviewed_by_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
}

impl Report {
    /// Human readable location used in notification text.
    pub fn location_label(&self) -> String {
        self.location
            .as_ref()
            .map(|l| l.to_string())
            .unwrap_or_else(|| "an unspecified location".to_string())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SubmitReportRequest {
    pub description: String,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub image_ref: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ReviewRequest {
    #[serde(default)]
    pub notes: Option<String>,
}

// ========== NOTIFICATION ==========
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    ReportApproved,
    ReportDeclined,
    ReportResolved,
    System,
    NewHazardReport,
    AdminReachOut,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::ReportApproved => "report_approved",
            NotificationType::ReportDeclined => "report_declined",
            NotificationType::ReportResolved => "report_resolved",
            NotificationType::System => "system",
            NotificationType::NewHazardReport => "new_hazard_report",
            NotificationType::AdminReachOut => "admin_reach_out",
        }
    }
}

impl FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "report_approved" => Ok(NotificationType::ReportApproved),
            "report_declined" => Ok(NotificationType::ReportDeclined),
            "report_resolved" => Ok(NotificationType::ReportResolved),
            "system" => Ok(NotificationType::System),
            "new_hazard_report" => Ok(NotificationType::NewHazardReport),
            "admin_reach_out" => Ok(NotificationType::AdminReachOut),
            other => Err(format!("Unknown notification type: {}", other)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Notification {
    pub id: String,
    pub recipient_id: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Notification {
    pub fn new(
        recipient_id: impl Into<String>,
        notification_type: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            recipient_id: recipient_id.into(),
            notification_type,
            title: title.into(),
            message: message.into(),
            read: false,
            created_at,
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[derive(Debug, Deserialize)]
pub struct OutreachRequest {
    pub recipient_id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct PhotoUploadRequest {
    pub file_name: String,
    pub content_type: String,
}

#[derive(Debug, Serialize)]
pub struct PhotoUpload {
    pub image_ref: String,
    pub upload_url: String,
    pub method: String,
    pub content_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reviewed_is_read_as_approved() {
        let status: ReportStatus = serde_json::from_str("\"reviewed\"").unwrap();
        assert_eq!(status, ReportStatus::Approved);
        assert_eq!("reviewed".parse::<ReportStatus>().unwrap(), ReportStatus::Approved);
        assert_eq!(serde_json::to_string(&status).unwrap(), "\"approved\"");
    }

    #[test]
    fn location_accepts_text_or_coordinates() {
        let text: Location = serde_json::from_str("\"Main St\"").unwrap();
        assert_eq!(text, Location::Text("Main St".to_string()));

        let coords: Location =
            serde_json::from_str(r#"{"latitude": 51.5, "longitude": -0.12}"#).unwrap();
        assert_eq!(coords.to_string(), "51.50000, -0.12000");
    }

    #[test]
    fn notification_type_serializes_with_wire_names() {
        let json = serde_json::to_value(NotificationType::AdminReachOut).unwrap();
        assert_eq!(json, serde_json::json!("admin_reach_out"));
        assert_eq!(
            "new_hazard_report".parse::<NotificationType>().unwrap(),
            NotificationType::NewHazardReport
        );
    }

    #[test]
    fn principal_defaults_to_active_user() {
        let p: Principal = serde_json::from_str(
            r#"{"uid":"u1","email":"a@b.co","display_name":"A","created_at":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(p.role, Role::User);
        assert!(p.is_active);
    }
}
