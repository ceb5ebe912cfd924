//! Role based authorization
//!
//! Every mutating or privileged service call goes through [`authorize`],
//! whichever store backs the request.

use crate::error::{ServiceError, ServiceResult};
use crate::types::{Principal, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    SubmitReport,
    ReadOwnReports,
    ReadOwnNotifications,
    MarkNotificationsRead,
    ReadAllReports,
    ReviewReports,
    SendOutreach,
    ManageAdmins,
    ViewReportHistory,
}

impl Capability {
    pub fn describe(&self) -> &'static str {
        match self {
            Capability::SubmitReport => "submit reports",
            Capability::ReadOwnReports => "read their reports",
            Capability::ReadOwnNotifications => "read their notifications",
            Capability::MarkNotificationsRead => "update their notifications",
            Capability::ReadAllReports => "read all reports",
            Capability::ReviewReports => "review reports",
            Capability::SendOutreach => "contact users",
            Capability::ManageAdmins => "manage admin accounts",
            Capability::ViewReportHistory => "view report history",
        }
    }
}

const USER_CAPABILITIES: &[Capability] = &[
    Capability::SubmitReport,
    Capability::ReadOwnReports,
    Capability::ReadOwnNotifications,
    Capability::MarkNotificationsRead,
];

const ADMIN_CAPABILITIES: &[Capability] = &[
    Capability::SubmitReport,
    Capability::ReadOwnReports,
    Capability::ReadOwnNotifications,
    Capability::MarkNotificationsRead,
    Capability::ReadAllReports,
    Capability::ReviewReports,
    Capability::SendOutreach,
];

const SUPER_ADMIN_CAPABILITIES: &[Capability] = &[
    Capability::SubmitReport,
    Capability::ReadOwnReports,
    Capability::ReadOwnNotifications,
    Capability::MarkNotificationsRead,
    Capability::ReadAllReports,
    Capability::ReviewReports,
    Capability::SendOutreach,
    Capability::ManageAdmins,
    Capability::ViewReportHistory,
];

pub fn capabilities(role: Role) -> &'static [Capability] {
    match role {
        Role::User => USER_CAPABILITIES,
        Role::Admin => ADMIN_CAPABILITIES,
        Role::SuperAdmin => SUPER_ADMIN_CAPABILITIES,
    }
}

pub fn can(role: Role, capability: Capability) -> bool {
    capabilities(role).contains(&capability)
}

pub fn authorize(principal: &Principal, capability: Capability) -> ServiceResult<()> {
    if can(principal.role, capability) {
        return Ok(());
    }

    tracing::warn!(
        "Denied {:?} for {} (role {})",
        capability,
        principal.uid,
        principal.role
    );
    Err(ServiceError::Authorization(format!(
        "Role '{}' is not allowed to {}",
        principal.role,
        capability.describe()
    )))
}
