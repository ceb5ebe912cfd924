use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::config::CognitoSettings;
use crate::error::{ServiceError, ServiceResult};
use crate::service::HazardService;
use crate::types::{CreateProfileRequest, Principal, SignupRequest};
use crate::validation;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub id_token: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i32,
    pub profile: Principal,
}

type HmacSha256 = Hmac<Sha256>;

/// Compute the SECRET_HASH for Cognito authentication
fn compute_secret_hash(username: &str, client_id: &str, client_secret: &str) -> ServiceResult<String> {
    let message = format!("{}{}", username, client_id);
    let mut mac = HmacSha256::new_from_slice(client_secret.as_bytes())
        .map_err(|e| ServiceError::Config(format!("Invalid Cognito client secret: {}", e)))?;
    mac.update(message.as_bytes());
    Ok(general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

/// `sub` claim of an unverified JWT. Only used on tokens Cognito just issued.
fn token_subject(id_token: &str) -> ServiceResult<String> {
    let invalid = || ServiceError::Authentication("Malformed identity token".to_string());

    let payload = id_token.split('.').nth(1).ok_or_else(invalid)?;
    let bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|_| invalid())?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).map_err(|_| invalid())?;
    claims
        .get("sub")
        .and_then(|s| s.as_str())
        .map(str::to_string)
        .ok_or_else(invalid)
}

fn login_failure_message(error_message: &str) -> &'static str {
    if error_message.contains("NotAuthorizedException") {
        "Incorrect email or password"
    } else if error_message.contains("UserNotConfirmedException") {
        "Please verify your email before logging in"
    } else if error_message.contains("UserNotFoundException") {
        "No account found with this email"
    } else if error_message.contains("PasswordResetRequiredException") {
        "Password reset required"
    } else if error_message.contains("TooManyRequestsException") {
        "Too many login attempts. Please try again later"
    } else {
        "Login failed. Please check your credentials"
    }
}

/// Authenticate with Cognito and load the matching profile.
/// Deactivated profiles are refused even when the password is right.
pub async fn login(
    cognito_client: &CognitoClient,
    settings: &CognitoSettings,
    service: &HazardService,
    req: &LoginRequest,
) -> ServiceResult<LoginResponse> {
    tracing::info!("Authenticating user: {}", req.email);

    let secret_hash = compute_secret_hash(&req.email, &settings.client_id, &settings.client_secret)?;

    let response = cognito_client
        .initiate_auth()
        .auth_flow(aws_sdk_cognitoidentityprovider::types::AuthFlowType::UserPasswordAuth)
        .client_id(&settings.client_id)
        .auth_parameters("USERNAME", &req.email)
        .auth_parameters("PASSWORD", &req.password)
        .auth_parameters("SECRET_HASH", &secret_hash)
        .send()
        .await
        .map_err(|e| {
            let error_message = format!("{:?}", e);
            tracing::error!("Cognito authentication error: {}", error_message);
            ServiceError::Authentication(login_failure_message(&error_message).to_string())
        })?;

    let Some(auth_result) = response.authentication_result() else {
        tracing::error!("No authentication result returned");
        return Err(ServiceError::Authentication(
            "No authentication result returned".to_string(),
        ));
    };

    let id_token = auth_result.id_token().unwrap_or_default().to_string();
    let profile = service.resolve_principal(&token_subject(&id_token)?).await?;
    tracing::info!("Authentication successful for user: {}", req.email);

    Ok(LoginResponse {
        id_token,
        access_token: auth_result.access_token().unwrap_or_default().to_string(),
        refresh_token: auth_result.refresh_token().unwrap_or_default().to_string(),
        expires_in: auth_result.expires_in(),
        profile,
    })
}

fn signup_failure(error_message: &str) -> ServiceError {
    if error_message.contains("UsernameExistsException") {
        ServiceError::Conflict("An account with this email already exists".to_string())
    } else if error_message.contains("InvalidPasswordException") {
        ServiceError::Validation(
            "Password must contain at least 8 characters with uppercase, lowercase, number, and special character"
                .to_string(),
        )
    } else if error_message.contains("InvalidParameterException") {
        ServiceError::Validation("Invalid email or password format".to_string())
    } else {
        ServiceError::Validation(
            "Signup failed. Please check your credentials and try again.".to_string(),
        )
    }
}

/// Register with Cognito, then create a `user` profile under the Cognito sub
pub async fn signup(
    cognito_client: &CognitoClient,
    settings: &CognitoSettings,
    service: &HazardService,
    req: &SignupRequest,
) -> ServiceResult<Principal> {
    validation::validate_signup(req)?;
    let email = req.email.trim();
    tracing::info!("Signing up user: {}", email);

    let secret_hash = compute_secret_hash(email, &settings.client_id, &settings.client_secret)?;
    let email_attribute = aws_sdk_cognitoidentityprovider::types::AttributeType::builder()
        .name("email")
        .value(email)
        .build()
        .map_err(|e| ServiceError::Validation(format!("Invalid email attribute: {}", e)))?;

    let response = cognito_client
        .sign_up()
        .client_id(&settings.client_id)
        .username(email)
        .password(&req.password)
        .secret_hash(&secret_hash)
        .user_attributes(email_attribute)
        .send()
        .await
        .map_err(|e| {
            let error_message = format!("{:?}", e);
            tracing::error!("Cognito signup error: {}", error_message);
            signup_failure(&error_message)
        })?;

    match &settings.user_pool_id {
        Some(user_pool_id) => {
            if let Err(e) = cognito_client
                .admin_confirm_sign_up()
                .user_pool_id(user_pool_id)
                .username(email)
                .send()
                .await
            {
                // User can still verify via email
                tracing::error!("Failed to auto-confirm user: {:?}", e);
            } else {
                tracing::info!("User auto-confirmed: {}", email);
            }
        }
        None => tracing::warn!("COGNITO_USER_POOL_ID not set; skipping auto-confirm"),
    }

    service
        .register_profile(
            response.user_sub(),
            &CreateProfileRequest {
                email: email.to_string(),
                display_name: req.display_name.clone(),
            },
        )
        .await
}
