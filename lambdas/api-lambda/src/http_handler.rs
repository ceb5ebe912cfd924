use hazard_shared::{
    auth,
    error::ServiceError,
    images,
    lifecycle::ReviewAction,
    responses::{self, parse_body, parse_optional_body, respond},
    types::{
        CreateProfileRequest, OutreachRequest, PhotoUploadRequest, Principal, ReviewRequest,
        SetActiveRequest, SignupRequest, SubmitReportRequest,
    },
    views::StatusFilter,
    AppState,
};
use lambda_http::{
    http::{Method, StatusCode},
    Body, Error, Request, RequestExt, Response,
};
use std::sync::Arc;

/// Main Lambda handler - routes requests to auth, report and admin endpoints
pub(crate) async fn function_handler(
    event: Request,
    state: Arc<AppState>,
) -> Result<Response<Body>, Error> {
    let method = event.method().clone();
    let path = event.uri().path().to_string();
    tracing::info!("API Lambda invoked - Method: {} Path: {}", method, path);

    // Handle CORS preflight
    if method == Method::OPTIONS {
        return responses::preflight();
    }

    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    // Auth endpoints (no identity yet)
    match (&method, parts.as_slice()) {
        (&Method::POST, ["login"]) => return login(&event, &state).await,
        (&Method::POST, ["signup"]) => return signup(&event, &state).await,
        (_, ["login"]) | (_, ["signup"]) => return responses::method_not_allowed(),
        _ => {}
    }

    // For HTTP APIs with JWT authorizer, claims are in requestContext.authorizer.jwt.claims
    // The X-User-Id header only counts when the config allows it
    let Some(user_id) = caller_id(&event, state.config.allow_header_identity) else {
        return ServiceError::Authentication("Missing user identity".to_string()).into_response();
    };

    // Profile creation is the only call made before a profile exists
    if parts.as_slice() == ["users"] {
        return match method {
            Method::POST => match parse_body::<CreateProfileRequest>(event.body()) {
                Ok(req) => respond(
                    StatusCode::CREATED,
                    state.service.register_profile(&user_id, &req).await,
                ),
                Err(e) => e.into_response(),
            },
            _ => responses::method_not_allowed(),
        };
    }

    let actor = match state.service.resolve_principal(&user_id).await {
        Ok(actor) => actor,
        Err(e) => return e.into_response(),
    };

    route(&event, &state, &actor, &method, &parts).await
}

fn caller_id(event: &Request, allow_header: bool) -> Option<String> {
    let jwt_sub = event
        .request_context_ref()
        .and_then(|ctx| ctx.authorizer())
        .and_then(|auth| auth.jwt.as_ref())
        .and_then(|jwt| jwt.claims.get("sub"))
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());
    if jwt_sub.is_some() || !allow_header {
        return jwt_sub;
    }

    event
        .headers()
        .get("X-User-Id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

async fn login(event: &Request, state: &AppState) -> Result<Response<Body>, Error> {
    let (Some(client), Some(settings)) = (&state.cognito_client, &state.config.cognito) else {
        return ServiceError::Unavailable("Sign-in is not configured".to_string()).into_response();
    };
    let req: auth::LoginRequest = match parse_body(event.body()) {
        Ok(req) => req,
        Err(e) => return e.into_response(),
    };
    respond(
        StatusCode::OK,
        auth::login(client, settings, &state.service, &req).await,
    )
}

async fn signup(event: &Request, state: &AppState) -> Result<Response<Body>, Error> {
    let (Some(client), Some(settings)) = (&state.cognito_client, &state.config.cognito) else {
        return ServiceError::Unavailable("Sign-up is not configured".to_string()).into_response();
    };
    let req: SignupRequest = match parse_body(event.body()) {
        Ok(req) => req,
        Err(e) => return e.into_response(),
    };
    respond(
        StatusCode::CREATED,
        auth::signup(client, settings, &state.service, &req).await,
    )
}

async fn route(
    event: &Request,
    state: &AppState,
    actor: &Principal,
    method: &Method,
    parts: &[&str],
) -> Result<Response<Body>, Error> {
    let service = &state.service;
    let body = event.body();

    match (method, parts) {
        // GET /users/me - own profile
        (&Method::GET, ["users", "me"]) => responses::json(StatusCode::OK, actor),

        // POST /uploads - presigned photo upload
        (&Method::POST, ["uploads"]) => {
            let Some(s3_client) = &state.s3_client else {
                return ServiceError::Unavailable("Photo uploads are not configured".to_string())
                    .into_response();
            };
            match parse_body::<PhotoUploadRequest>(body) {
                Ok(req) => respond(
                    StatusCode::OK,
                    images::presign_photo_upload(s3_client, &state.config.photo_bucket, actor, &req)
                        .await,
                ),
                Err(e) => e.into_response(),
            }
        }

        // Reports
        (&Method::POST, ["reports"]) => match parse_body::<SubmitReportRequest>(body) {
            Ok(req) => respond(StatusCode::CREATED, service.submit_report(actor, &req).await),
            Err(e) => e.into_response(),
        },
        (&Method::GET, ["reports"]) => respond(StatusCode::OK, service.my_reports(actor).await),

        // Admin review
        (&Method::GET, ["admin", "reports"]) => {
            let filter = event
                .query_string_parameters_ref()
                .and_then(|params| params.first("status"))
                .unwrap_or("all")
                .parse::<StatusFilter>()
                .map_err(ServiceError::Validation);
            match filter {
                Ok(filter) => respond(StatusCode::OK, service.all_reports(actor, filter).await),
                Err(e) => e.into_response(),
            }
        }
        (&Method::GET, ["admin", "reports", "stats"]) => {
            respond(StatusCode::OK, service.dashboard(actor).await)
        }
        (&Method::POST, ["admin", "reports", report_id, action]) => {
            let Ok(action) = action.parse::<ReviewAction>() else {
                return responses::not_found();
            };
            match parse_optional_body::<ReviewRequest>(body) {
                Ok(req) => respond(
                    StatusCode::OK,
                    service
                        .review_report(actor, report_id, action, req.notes.as_deref())
                        .await,
                ),
                Err(e) => e.into_response(),
            }
        }
        (&Method::GET, ["admin", "history"]) => {
            respond(StatusCode::OK, service.report_history(actor).await)
        }
        (&Method::POST, ["admin", "outreach"]) => match parse_body::<OutreachRequest>(body) {
            Ok(req) => respond(StatusCode::CREATED, service.send_outreach(actor, &req).await),
            Err(e) => e.into_response(),
        },

        // Admin accounts
        (&Method::GET, ["admin", "admins"]) => {
            respond(StatusCode::OK, service.list_admins(actor).await)
        }
        (&Method::PATCH, ["admin", "admins", uid]) => match parse_body::<SetActiveRequest>(body) {
            Ok(req) => respond(
                StatusCode::OK,
                service.set_admin_active(actor, uid, req.is_active).await,
            ),
            Err(e) => e.into_response(),
        },
        (&Method::DELETE, ["admin", "admins", uid]) => {
            let result = service
                .delete_admin(actor, uid)
                .await
                .map(|()| serde_json::json!({"message": "Admin deleted"}));
            respond(StatusCode::OK, result)
        }

        // Notifications
        (&Method::GET, ["notifications"]) => {
            respond(StatusCode::OK, service.notifications(actor).await)
        }
        (&Method::DELETE, ["notifications"]) => {
            let result = service
                .clear_notifications(actor)
                .await
                .map(|removed| serde_json::json!({"removed": removed}));
            respond(StatusCode::OK, result)
        }
        (&Method::POST, ["notifications", notification_id, "read"]) => {
            let result = service
                .mark_notification_read(actor, notification_id)
                .await
                .map(|()| serde_json::json!({"id": notification_id, "read": true}));
            respond(StatusCode::OK, result)
        }

        (_, ["users", "me"])
        | (_, ["uploads"])
        | (_, ["reports"])
        | (_, ["notifications"])
        | (_, ["admin", "admins"])
        | (_, ["admin", "admins", _]) => responses::method_not_allowed(),

        _ => responses::not_found(),
    }
}
