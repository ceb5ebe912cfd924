use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ServiceError, ServiceResult};
use crate::types::{Location, SignupRequest, SubmitReportRequest};

pub const MIN_PASSWORD_LENGTH: usize = 8;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid"));

pub fn validate_email(email: &str) -> ServiceResult<()> {
    if EMAIL_RE.is_match(email.trim()) {
        Ok(())
    } else {
        Err(ServiceError::Validation("Please enter a valid email address".to_string()))
    }
}

pub fn validate_password(password: &str) -> ServiceResult<()> {
    let length = password.chars().count();
    if length < MIN_PASSWORD_LENGTH {
        return Err(ServiceError::Validation(format!(
            "Password must be at least {} characters ({} more needed)",
            MIN_PASSWORD_LENGTH,
            MIN_PASSWORD_LENGTH - length
        )));
    }
    if !password.chars().any(char::is_uppercase) {
        return Err(ServiceError::Validation(
            "Password must contain an uppercase letter".to_string(),
        ));
    }
    if !password.chars().any(char::is_lowercase) {
        return Err(ServiceError::Validation(
            "Password must contain a lowercase letter".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(ServiceError::Validation("Password must contain a number".to_string()));
    }
    if !password
        .chars()
        .any(|c| !c.is_alphanumeric() && !c.is_whitespace())
    {
        return Err(ServiceError::Validation(
            "Password must contain a special character".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_display_name(name: &str) -> ServiceResult<()> {
    if name.trim().is_empty() {
        return Err(ServiceError::Validation("Name is required".to_string()));
    }
    Ok(())
}

pub fn validate_signup(req: &SignupRequest) -> ServiceResult<()> {
    validate_display_name(&req.display_name)?;
    validate_email(&req.email)?;
    validate_password(&req.password)
}

/// Checked submission fields
#[derive(Debug, Clone, PartialEq)]
pub struct ValidSubmission {
    pub description: String,
    pub location: Option<Location>,
    pub image_ref: String,
}

pub fn validate_submission(req: &SubmitReportRequest) -> ServiceResult<ValidSubmission> {
    let description = req.description.trim();
    if description.is_empty() {
        return Err(ServiceError::Validation(
            "Please describe the hazard".to_string(),
        ));
    }

    let image_ref = req
        .image_ref
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .ok_or_else(|| ServiceError::Validation("Please attach a photo of the hazard".to_string()))?;

    let location = match &req.location {
        Some(Location::Text(text)) if text.trim().is_empty() => None,
        Some(Location::Text(text)) => Some(Location::Text(text.trim().to_string())),
        Some(Location::Coordinates { latitude, longitude }) => {
            if !(-90.0..=90.0).contains(latitude) || !(-180.0..=180.0).contains(longitude) {
                return Err(ServiceError::Validation(format!(
                    "Coordinates out of range: {}, {}",
                    latitude, longitude
                )));
            }
            Some(Location::Coordinates {
                latitude: *latitude,
                longitude: *longitude,
            })
        }
        None => None,
    };

    Ok(ValidSubmission {
        description: description.to_string(),
        location,
        image_ref: image_ref.to_string(),
    })
}
