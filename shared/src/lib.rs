pub mod types;
pub mod error;
pub mod responses;
pub mod config;
pub mod policy;
pub mod lifecycle;
pub mod views;
pub mod validation;
pub mod store;
pub mod legacy;
pub mod service;
pub mod auth;
pub mod images;

use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use aws_sdk_dynamodb::Client as DynamoClient;
use aws_sdk_s3::Client as S3Client;
use std::sync::Arc;

use config::{Config, StoreBackend};
use error::ServiceResult;
use service::HazardService;
use store::dynamo::DynamoStore;
use store::local::{LocalKv, LocalStore};

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub service: HazardService,
    /// `None` when Cognito is not configured
    pub cognito_client: Option<CognitoClient>,
    pub s3_client: Option<S3Client>,
}

impl AppState {
    pub fn new(
        config: Config,
        service: HazardService,
        cognito_client: Option<CognitoClient>,
        s3_client: Option<S3Client>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            service,
            cognito_client,
            s3_client,
        })
    }
}

/// Build the service over the configured backend. The local backend imports
/// any whole-array data left by older clients first.
pub async fn build_service(
    config: &Config,
    sdk_config: &aws_config::SdkConfig,
) -> ServiceResult<HazardService> {
    match config.store_backend {
        StoreBackend::Dynamo => {
            tracing::info!("Using DynamoDB table {}", config.table_name);
            let store = DynamoStore::new(DynamoClient::new(sdk_config), &config.table_name);
            Ok(HazardService::with_store(Arc::new(store)))
        }
        StoreBackend::Local => {
            let kv = match &config.local_store_path {
                Some(path) => LocalKv::open(path).await?,
                None => {
                    tracing::warn!("LOCAL_STORE_PATH not set, records are kept in memory");
                    LocalKv::new()
                }
            };
            let store = LocalStore::new(kv);
            legacy::import_legacy(&store).await?;
            Ok(HazardService::with_store(Arc::new(store)))
        }
    }
}
