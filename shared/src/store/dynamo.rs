//! Single-table DynamoDB backend
//!
//! Reports:        PK=HAZARD#{id}   SK=METADATA
//! Users:          PK=USER#{uid}    SK=USER#{uid}
//! Notifications:  PK=USER#{uid}    SK=NOTIFICATION#{id}

use async_trait::async_trait;
use aws_sdk_dynamodb::types::{AttributeValue, DeleteRequest, WriteRequest};
use aws_sdk_dynamodb::Client as DynamoClient;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::{NotificationStore, ReportStore, UserStore};
use crate::error::{storage_error, ServiceError, ServiceResult};
use crate::types::{Location, Notification, Principal, Report};

type Item = HashMap<String, AttributeValue>;

const BATCH_LIMIT: usize = 25;
const BATCH_ATTEMPTS: u64 = 5;

#[derive(Debug, Clone)]
pub struct DynamoStore {
    client: DynamoClient,
    table_name: String,
}

impl DynamoStore {
    pub fn new(client: DynamoClient, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    /// Scan every item of one entity type, following pagination
    async fn scan_entities(
        &self,
        entity_type: &str,
        extra_filter: Option<(&str, &str)>,
    ) -> ServiceResult<Vec<Item>> {
        let mut items = Vec::new();
        let mut start_key: Option<Item> = None;

        loop {
            let mut req = self
                .client
                .scan()
                .table_name(&self.table_name)
                .expression_attribute_values(":type", s(entity_type))
                .set_exclusive_start_key(start_key.take());

            req = match extra_filter {
                Some((attribute, value)) => req
                    .filter_expression("entity_type = :type AND #f = :f")
                    .expression_attribute_names("#f", attribute)
                    .expression_attribute_values(":f", s(value)),
                None => req.filter_expression("entity_type = :type"),
            };

            let resp = req.send().await.map_err(storage_error("scan"))?;
            items.extend(resp.items().iter().cloned());

            match resp.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }

        Ok(items)
    }

    async fn query_notifications(&self, recipient_id: &str) -> ServiceResult<Vec<Item>> {
        let mut items = Vec::new();
        let mut start_key: Option<Item> = None;

        loop {
            let resp = self
                .client
                .query()
                .table_name(&self.table_name)
                .key_condition_expression("PK = :pk AND begins_with(SK, :prefix)")
                .expression_attribute_values(":pk", s(user_pk(recipient_id)))
                .expression_attribute_values(":prefix", s("NOTIFICATION#"))
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(storage_error("query notifications"))?;

            items.extend(resp.items().iter().cloned());

            match resp.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }

        Ok(items)
    }
}

// ========== KEYS & ATTRIBUTES ==========

fn report_pk(id: &str) -> String {
    format!("HAZARD#{}", id)
}

fn user_pk(uid: &str) -> String {
    format!("USER#{}", uid)
}

fn notification_sk(id: &str) -> String {
    format!("NOTIFICATION#{}", id)
}

fn s(value: impl Into<String>) -> AttributeValue {
    AttributeValue::S(value.into())
}

fn get_s<'a>(item: &'a Item, key: &str) -> Option<&'a String> {
    item.get(key).and_then(|v| v.as_s().ok())
}

fn require_s(item: &Item, key: &str) -> ServiceResult<String> {
    get_s(item, key)
        .cloned()
        .ok_or_else(|| ServiceError::Storage(format!("Item is missing attribute '{}'", key)))
}

fn get_time(item: &Item, key: &str) -> ServiceResult<DateTime<Utc>> {
    let raw = require_s(item, key)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ServiceError::Storage(format!("Bad timestamp in '{}': {}", key, e)))
}

fn get_json<T: serde::de::DeserializeOwned>(item: &Item, key: &str) -> ServiceResult<Option<T>> {
    match get_s(item, key) {
        Some(raw) => serde_json::from_str(raw)
            .map(Some)
            .map_err(|e| ServiceError::Storage(format!("Bad JSON in '{}': {}", key, e))),
        None => Ok(None),
    }
}

fn parse_attr<T: std::str::FromStr<Err = String>>(item: &Item, key: &str) -> ServiceResult<T> {
    require_s(item, key)?.parse().map_err(ServiceError::Storage)
}

pub(crate) fn report_to_item(report: &Report) -> ServiceResult<Item> {
    let pk = report_pk(&report.id);
    let mut item = HashMap::new();
    item.insert("PK".to_string(), s(pk));
    item.insert("SK".to_string(), s("METADATA"));
    item.insert("entity_type".to_string(), s("hazard"));
    item.insert("report_id".to_string(), s(&report.id));
    item.insert("submitter_id".to_string(), s(&report.submitter_id));
    item.insert("submitter_email".to_string(), s(&report.submitter_email));
    item.insert("submitter_name".to_string(), s(&report.submitter_name));
    item.insert("description".to_string(), s(&report.description));
    item.insert("image_ref".to_string(), s(&report.image_ref));
    item.insert("status".to_string(), s(report.status.as_str()));
    item.insert("created_at".to_string(), s(report.created_at.to_rfc3339()));
    item.insert("updated_at".to_string(), s(report.updated_at.to_rfc3339()));
    item.insert("version".to_string(), AttributeValue::N(report.version.to_string()));

    if let Some(location) = &report.location {
        let json = serde_json::to_string(location).map_err(storage_error("encode location"))?;
        item.insert("location".to_string(), s(json));
    }
    if let Some(notes) = &report.admin_notes {
        item.insert("admin_notes".to_string(), s(notes));
    }
    if let Some(by) = &report.reviewed_by {
        item.insert("reviewed_by".to_string(), s(by));
    }
    if let Some(email) = &report.reviewed_by_email {
        item.insert("reviewed_by_email".to_string(), s(email));
    }
    Ok(item)
}

pub(crate) fn report_from_item(item: &Item) -> ServiceResult<Report> {
    let version = item
        .get("version")
        .and_then(|v| v.as_n().ok())
        .and_then(|n| n.parse::<u64>().ok())
        .unwrap_or(0);

    Ok(Report {
        id: require_s(item, "report_id")?,
        submitter_id: require_s(item, "submitter_id")?,
        submitter_email: get_s(item, "submitter_email").cloned().unwrap_or_default(),
        submitter_name: get_s(item, "submitter_name").cloned().unwrap_or_default(),
        description: require_s(item, "description")?,
        location: get_json::<Location>(item, "location")?,
        image_ref: get_s(item, "image_ref").cloned().unwrap_or_default(),
        status: parse_attr(item, "status")?,
        admin_notes: get_s(item, "admin_notes").cloned(),
        reviewed_by: get_s(item, "reviewed_by").cloned(),
        reviewed_by_email: get_s(item, "reviewed_by_email").cloned(),
        created_at: get_time(item, "created_at")?,
        updated_at: get_time(item, "updated_at")?,
        version,
    })
}

pub(crate) fn user_to_item(user: &Principal) -> Item {
    let pk = user_pk(&user.uid);
    let mut item = HashMap::new();
    item.insert("PK".to_string(), s(pk.clone()));
    item.insert("SK".to_string(), s(pk));
    item.insert("entity_type".to_string(), s("user"));
    item.insert("uid".to_string(), s(&user.uid));
    item.insert("email".to_string(), s(&user.email));
    item.insert("display_name".to_string(), s(&user.display_name));
    item.insert("role".to_string(), s(user.role.as_str()));
    item.insert("is_active".to_string(), AttributeValue::Bool(user.is_active));
    item.insert("created_at".to_string(), s(user.created_at.to_rfc3339()));
    item
}

pub(crate) fn user_from_item(item: &Item) -> ServiceResult<Principal> {
    Ok(Principal {
        uid: require_s(item, "uid")?,
        email: get_s(item, "email").cloned().unwrap_or_default(),
        display_name: get_s(item, "display_name").cloned().unwrap_or_default(),
        role: parse_attr(item, "role")?,
        is_active: item
            .get("is_active")
            .and_then(|v| v.as_bool().ok())
            .copied()
            .unwrap_or(true),
        created_at: get_time(item, "created_at")?,
    })
}

pub(crate) fn notification_to_item(notification: &Notification) -> ServiceResult<Item> {
    let mut item = HashMap::new();
    item.insert("PK".to_string(), s(user_pk(&notification.recipient_id)));
    item.insert("SK".to_string(), s(notification_sk(&notification.id)));
    item.insert("entity_type".to_string(), s("notification"));
    item.insert("notification_id".to_string(), s(&notification.id));
    item.insert("recipient_id".to_string(), s(&notification.recipient_id));
    item.insert("type".to_string(), s(notification.notification_type.as_str()));
    item.insert("title".to_string(), s(&notification.title));
    item.insert("message".to_string(), s(&notification.message));
    item.insert("read".to_string(), AttributeValue::Bool(notification.read));
    item.insert("created_at".to_string(), s(notification.created_at.to_rfc3339()));
    if let Some(data) = &notification.data {
        item.insert("data".to_string(), s(data.to_string()));
    }
    Ok(item)
}

pub(crate) fn notification_from_item(item: &Item) -> ServiceResult<Notification> {
    Ok(Notification {
        id: require_s(item, "notification_id")?,
        recipient_id: require_s(item, "recipient_id")?,
        notification_type: parse_attr(item, "type")?,
        title: get_s(item, "title").cloned().unwrap_or_default(),
        message: get_s(item, "message").cloned().unwrap_or_default(),
        read: item
            .get("read")
            .and_then(|v| v.as_bool().ok())
            .copied()
            .unwrap_or(false),
        created_at: get_time(item, "created_at")?,
        data: get_json(item, "data")?,
    })
}

// ========== STORES ==========

#[async_trait]
impl ReportStore for DynamoStore {
    async fn create_report(&self, report: &Report) -> ServiceResult<()> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(report_to_item(report)?))
            .condition_expression("attribute_not_exists(PK)")
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .map(|se| se.is_conditional_check_failed_exception())
                    .unwrap_or(false)
                {
                    ServiceError::Conflict(format!("Report {} already exists", report.id))
                } else {
                    storage_error("put report")(e)
                }
            })?;

        tracing::info!("Report stored: {}", report.id);
        Ok(())
    }

    async fn get_report(&self, id: &str) -> ServiceResult<Option<Report>> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("PK", s(report_pk(id)))
            .key("SK", s("METADATA"))
            .send()
            .await
            .map_err(storage_error("get report"))?;

        result.item().map(report_from_item).transpose()
    }

    async fn list_reports(&self) -> ServiceResult<Vec<Report>> {
        self.scan_entities("hazard", None)
            .await?
            .iter()
            .map(report_from_item)
            .collect()
    }

    async fn list_reports_by_submitter(&self, submitter_id: &str) -> ServiceResult<Vec<Report>> {
        self.scan_entities("hazard", Some(("submitter_id", submitter_id)))
            .await?
            .iter()
            .map(report_from_item)
            .collect()
    }

    async fn update_report(&self, report: &Report, expected_version: u64) -> ServiceResult<()> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(report_to_item(report)?))
            .condition_expression(version_condition(expected_version))
            .expression_attribute_names("#version", "version")
            .expression_attribute_values(":expected", AttributeValue::N(expected_version.to_string()))
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .map(|se| se.is_conditional_check_failed_exception())
                    .unwrap_or(false)
                {
                    ServiceError::Conflict(format!(
                        "Report {} changed since version {}",
                        report.id, expected_version
                    ))
                } else {
                    storage_error("update report")(e)
                }
            })?;

        tracing::info!("Report {} updated to version {}", report.id, report.version);
        Ok(())
    }
}

#[async_trait]
impl NotificationStore for DynamoStore {
    async fn create_notification(&self, notification: &Notification) -> ServiceResult<()> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(notification_to_item(notification)?))
            .send()
            .await
            .map_err(storage_error("put notification"))?;
        Ok(())
    }

    async fn list_notifications(&self, recipient_id: &str) -> ServiceResult<Vec<Notification>> {
        let mut notifications = self
            .query_notifications(recipient_id)
            .await?
            .iter()
            .map(notification_from_item)
            .collect::<ServiceResult<Vec<_>>>()?;
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notifications)
    }

    async fn mark_read(&self, recipient_id: &str, notification_id: &str) -> ServiceResult<bool> {
        let result = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("PK", s(user_pk(recipient_id)))
            .key("SK", s(notification_sk(notification_id)))
            .update_expression("SET #read = :read")
            .condition_expression("attribute_exists(PK)")
            .expression_attribute_names("#read", "read")
            .expression_attribute_values(":read", AttributeValue::Bool(true))
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e)
                if e.as_service_error()
                    .map(|se| se.is_conditional_check_failed_exception())
                    .unwrap_or(false) =>
            {
                Ok(false)
            }
            Err(e) => Err(storage_error("mark notification read")(e)),
        }
    }

    async fn clear_notifications(&self, recipient_id: &str) -> ServiceResult<usize> {
        let items = self.query_notifications(recipient_id).await?;
        let mut requests = Vec::with_capacity(items.len());

        for item in &items {
            let mut key = HashMap::new();
            for attr in ["PK", "SK"] {
                if let Some(value) = item.get(attr) {
                    key.insert(attr.to_string(), value.clone());
                }
            }
            let delete = DeleteRequest::builder()
                .set_key(Some(key))
                .build()
                .map_err(storage_error("build delete request"))?;
            requests.push(WriteRequest::builder().delete_request(delete).build());
        }

        let mut deleted = 0;
        for chunk in requests.chunks(BATCH_LIMIT) {
            let mut attempts = 0;
            let mut unprocessed = Some(chunk.to_vec());

            while let Some(batch) = unprocessed {
                attempts += 1;
                if attempts > BATCH_ATTEMPTS {
                    tracing::warn!(
                        "Max retry attempts reached, {} notifications for {} not deleted",
                        batch.len(),
                        recipient_id
                    );
                    break;
                }

                deleted += batch.len();
                let result = self
                    .client
                    .batch_write_item()
                    .request_items(&self.table_name, batch)
                    .send()
                    .await
                    .map_err(storage_error("clear notifications"))?;

                unprocessed = pending_writes(result.unprocessed_items(), &self.table_name);
                if let Some(pending) = &unprocessed {
                    deleted -= pending.len();
                    tracing::info!(
                        "Retrying {} unprocessed deletes (attempt {})",
                        pending.len(),
                        attempts
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(100 * attempts)).await;
                }
            }
        }

        tracing::info!("Cleared {} notifications for {}", deleted, recipient_id);
        Ok(deleted)
    }
}

#[async_trait]
impl UserStore for DynamoStore {
    async fn create_user(&self, user: &Principal) -> ServiceResult<()> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(user_to_item(user)))
            .condition_expression("attribute_not_exists(PK)")
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .map(|se| se.is_conditional_check_failed_exception())
                    .unwrap_or(false)
                {
                    ServiceError::Conflict(format!("User {} already exists", user.uid))
                } else {
                    storage_error("put user")(e)
                }
            })?;
        Ok(())
    }

    async fn get_user(&self, uid: &str) -> ServiceResult<Option<Principal>> {
        let pk = user_pk(uid);
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("PK", s(pk.clone()))
            .key("SK", s(pk))
            .send()
            .await
            .map_err(storage_error("get user"))?;

        result.item().map(user_from_item).transpose()
    }

    async fn list_users(&self) -> ServiceResult<Vec<Principal>> {
        self.scan_entities("user", None)
            .await?
            .iter()
            .map(user_from_item)
            .collect()
    }

    async fn set_active(&self, uid: &str, is_active: bool) -> ServiceResult<()> {
        let pk = user_pk(uid);
        self.client
            .update_item()
            .table_name(&self.table_name)
            .key("PK", s(pk.clone()))
            .key("SK", s(pk))
            .update_expression("SET is_active = :active")
            .condition_expression("attribute_exists(PK)")
            .expression_attribute_values(":active", AttributeValue::Bool(is_active))
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .map(|se| se.is_conditional_check_failed_exception())
                    .unwrap_or(false)
                {
                    ServiceError::NotFound("User not found".to_string())
                } else {
                    storage_error("update user")(e)
                }
            })?;
        Ok(())
    }

    async fn delete_user(&self, uid: &str) -> ServiceResult<()> {
        let pk = user_pk(uid);
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key("PK", s(pk.clone()))
            .key("SK", s(pk))
            .condition_expression("attribute_exists(PK)")
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .map(|se| se.is_conditional_check_failed_exception())
                    .unwrap_or(false)
                {
                    ServiceError::NotFound("User not found".to_string())
                } else {
                    storage_error("delete user")(e)
                }
            })?;
        Ok(())
    }
}

/// Missing items read as version 0, so that case also matches an absent attribute
fn version_condition(expected_version: u64) -> &'static str {
    if expected_version == 0 {
        "attribute_exists(PK) AND (attribute_not_exists(#version) OR #version = :expected)"
    } else {
        "attribute_exists(PK) AND #version = :expected"
    }
}

/// Writes DynamoDB handed back for this table, if any remain
fn pending_writes(
    unprocessed: Option<&HashMap<String, Vec<WriteRequest>>>,
    table_name: &str,
) -> Option<Vec<WriteRequest>> {
    unprocessed
        .and_then(|items| items.get(table_name))
        .filter(|requests| !requests.is_empty())
        .cloned()
}
