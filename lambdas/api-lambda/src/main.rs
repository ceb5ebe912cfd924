use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use aws_sdk_s3::Client as S3Client;
use hazard_shared::{build_service, config::Config, AppState};
use lambda_http::{run, service_fn, tracing, Error, Request};
use std::sync::Arc;

mod http_handler;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing::init_default_subscriber();

    let config = Config::from_env()?;

    // Initialize AWS clients once at startup
    let sdk_config = aws_config::load_from_env().await;
    let service = build_service(&config, &sdk_config).await?;
    let cognito_client = config
        .cognito
        .as_ref()
        .map(|_| CognitoClient::new(&sdk_config));

    let state = AppState::new(
        config,
        service,
        cognito_client,
        Some(S3Client::new(&sdk_config)),
    );

    run(service_fn(move |event: Request| {
        let state = Arc::clone(&state);
        async move { http_handler::function_handler(event, state).await }
    }))
    .await
}
