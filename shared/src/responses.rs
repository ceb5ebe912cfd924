use crate::error::{ServiceError, ServiceResult};
use lambda_http::{http::StatusCode, Body, Error, Response};
use serde::{de::DeserializeOwned, Serialize};

/// JSON response with the CORS header the frontend expects
pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(value)?.into())
        .map_err(Box::new)?)
}

/// Render a service result, success with `status` or the mapped error
pub fn respond<T: Serialize>(
    status: StatusCode,
    result: ServiceResult<T>,
) -> Result<Response<Body>, Error> {
    match result {
        Ok(value) => json(status, &value),
        Err(e) => e.into_response(),
    }
}

pub fn not_found() -> Result<Response<Body>, Error> {
    json(StatusCode::NOT_FOUND, &serde_json::json!({"error": "Not found"}))
}

pub fn method_not_allowed() -> Result<Response<Body>, Error> {
    json(
        StatusCode::METHOD_NOT_ALLOWED,
        &serde_json::json!({"error": "Method not allowed"}),
    )
}

pub fn preflight() -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Access-Control-Allow-Origin", "*")
        .header(
            "Access-Control-Allow-Methods",
            "GET,POST,PATCH,DELETE,OPTIONS",
        )
        .header(
            "Access-Control-Allow-Headers",
            "Content-Type,Authorization,X-User-Id",
        )
        .body(Body::Empty)
        .map_err(Box::new)?)
}

pub fn body_str(body: &Body) -> ServiceResult<&str> {
    match body {
        Body::Text(text) => Ok(text.as_str()),
        Body::Binary(bytes) => std::str::from_utf8(bytes).map_err(|e| {
            tracing::error!("Request body is not UTF-8: {}", e);
            ServiceError::Validation("Request body must be UTF-8 encoded JSON".to_string())
        }),
        Body::Empty => Ok(""),
    }
}

/// Parse a JSON request body
pub fn parse_body<T: DeserializeOwned>(body: &Body) -> ServiceResult<T> {
    serde_json::from_str(body_str(body)?).map_err(|e| {
        tracing::error!("Failed to parse request body: {}", e);
        ServiceError::Validation(format!("Invalid request body: {}", e))
    })
}

/// Like [`parse_body`] but an empty body yields the default value
pub fn parse_optional_body<T: DeserializeOwned + Default>(body: &Body) -> ServiceResult<T> {
    if body_str(body)?.trim().is_empty() {
        Ok(T::default())
    } else {
        parse_body(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReviewRequest;

    #[test]
    fn empty_body_gives_default_review() {
        let req: ReviewRequest = parse_optional_body(&Body::Empty).unwrap();
        assert!(req.notes.is_none());
    }

    #[test]
    fn malformed_body_is_a_validation_error() {
        let err = parse_body::<ReviewRequest>(&Body::Text("{not json".into())).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn binary_body_must_be_utf8() {
        let err = parse_body::<ReviewRequest>(&Body::Binary(vec![0xff, 0xfe, 0xfd])).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ref m) if m.contains("UTF-8")));

        let req: ReviewRequest =
            parse_optional_body(&Body::Binary(br#"{"notes":"fixed"}"#.to_vec())).unwrap();
        assert_eq!(req.notes.as_deref(), Some("fixed"));
    }
}
