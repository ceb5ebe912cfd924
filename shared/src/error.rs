use lambda_http::{http::StatusCode, Body, Error, Response};
use thiserror::Error;

/// Errors raised by the hazard report service and its stores
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Authentication(String),

    #[error("{0}")]
    Authorization(String),

    /// Transition attempted on a report that is no longer pending
    #[error("{0}")]
    State(String),

    #[error("{0}")]
    NotFound(String),

    /// Stored version changed underneath a compare-and-swap write
    #[error("{0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Unavailable(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "ValidationError",
            ServiceError::Authentication(_) => "AuthenticationError",
            ServiceError::Authorization(_) => "AuthorizationError",
            ServiceError::State(_) => "StateError",
            ServiceError::NotFound(_) => "NotFound",
            ServiceError::Conflict(_) => "Conflict",
            ServiceError::Storage(_) => "StorageError",
            ServiceError::Config(_) => "ConfigError",
            ServiceError::Unavailable(_) => "ServiceUnavailable",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Authorization(_) => StatusCode::FORBIDDEN,
            ServiceError::State(_) | ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Storage(_) | ServiceError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServiceError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Render as the JSON error body every endpoint returns
    pub fn into_response(self) -> Result<Response<Body>, Error> {
        let status = self.status();
        // Storage details stay in the logs
        let message = match &self {
            ServiceError::Storage(detail) | ServiceError::Config(detail) => {
                tracing::error!("{}: {}", self.kind(), detail);
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        Ok(Response::builder()
            .status(status)
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .body(
                serde_json::json!({
                    "error": self.kind(),
                    "message": message,
                })
                .to_string()
                .into(),
            )
            .map_err(Box::new)?)
    }
}

/// Map an SDK or IO failure into a logged storage error
pub(crate) fn storage_error<E: std::fmt::Debug>(operation: &'static str) -> impl Fn(E) -> ServiceError {
    move |e| {
        tracing::error!("{} failed: {:?}", operation, e);
        ServiceError::Storage(format!("{} failed: {:?}", operation, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_json(resp: &Response<Body>) -> serde_json::Value {
        match resp.body() {
            Body::Text(text) => serde_json::from_str(text).unwrap(),
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[test]
    fn state_error_maps_to_conflict() {
        let resp = ServiceError::State("Report already processed".into())
            .into_response()
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body = body_json(&resp);
        assert_eq!(body["error"], "StateError");
        assert_eq!(body["message"], "Report already processed");
    }

    #[test]
    fn storage_details_are_not_leaked() {
        let resp = ServiceError::Storage("table hazard-reports missing".into())
            .into_response()
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(&resp)["message"], "An internal error occurred");
    }

    #[test]
    fn authorization_is_forbidden() {
        assert_eq!(
            ServiceError::Authorization("nope".into()).status(),
            StatusCode::FORBIDDEN
        );
    }
}
