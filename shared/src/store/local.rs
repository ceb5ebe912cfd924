//! Key-value backend
//!
//! Every record lives under its own key (`incident_reports/{id}`,
//! `user_notifications/{uid}/{id}`, `hazard_local_users/{uid}`) so a write
//! only ever touches one record. The map can be mirrored to a JSON file.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{NotificationStore, ReportStore, UserStore};
use crate::error::{storage_error, ServiceError, ServiceResult};
use crate::types::{Notification, Principal, Report};

pub const REPORTS_PREFIX: &str = "incident_reports/";
pub const NOTIFICATIONS_PREFIX: &str = "user_notifications/";
pub const USERS_PREFIX: &str = "hazard_local_users/";

/// Shared string map, optionally backed by a file
#[derive(Debug, Clone, Default)]
pub struct LocalKv {
    entries: Arc<RwLock<BTreeMap<String, String>>>,
    path: Option<Arc<PathBuf>>,
}

impl LocalKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the map from `path` if it exists; every write is flushed back
    pub async fn open(path: impl Into<PathBuf>) -> ServiceResult<Self> {
        let path = path.into();
        let entries: BTreeMap<String, String> = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(storage_error("parse local store"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(storage_error("read local store")(e)),
        };

        tracing::info!(
            "Opened local store at {} ({} keys)",
            path.display(),
            entries.len()
        );

        Ok(Self {
            entries: Arc::new(RwLock::new(entries)),
            path: Some(Arc::new(path)),
        })
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn set(&self, key: &str, value: String) -> ServiceResult<()> {
        self.update(key, |_| Ok(Some(value))).await
    }

    pub async fn remove(&self, key: &str) -> ServiceResult<bool> {
        let mut entries = self.entries.write().await;
        let Some(previous) = entries.remove(key) else {
            return Ok(false);
        };
        if let Err(e) = self.flush(&entries).await {
            entries.insert(key.to_string(), previous);
            return Err(e);
        }
        Ok(true)
    }

    pub async fn remove_prefix(&self, prefix: &str) -> ServiceResult<usize> {
        let mut entries = self.entries.write().await;
        let keys: Vec<String> = entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        if keys.is_empty() {
            return Ok(0);
        }

        let removed: Vec<(String, String)> = keys
            .into_iter()
            .filter_map(|k| entries.remove(&k).map(|v| (k, v)))
            .collect();
        if let Err(e) = self.flush(&entries).await {
            entries.extend(removed);
            return Err(e);
        }
        Ok(removed.len())
    }

    pub async fn scan_prefix(&self, prefix: &str) -> Vec<(String, String)> {
        self.entries
            .read()
            .await
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Read, check and write one key under a single write lock. `apply` gets
    /// the current value and returns the replacement; `None` deletes the key.
    /// The map only changes once the file write has succeeded.
    pub async fn update<F>(&self, key: &str, apply: F) -> ServiceResult<()>
    where
        F: FnOnce(Option<&String>) -> ServiceResult<Option<String>>,
    {
        let mut entries = self.entries.write().await;
        let next = apply(entries.get(key))?;
        if next.as_ref() == entries.get(key) {
            return Ok(());
        }

        let previous = match next {
            Some(value) => entries.insert(key.to_string(), value),
            None => entries.remove(key),
        };
        if let Err(e) = self.flush(&entries).await {
            match previous {
                Some(value) => entries.insert(key.to_string(), value),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn flush(&self, entries: &BTreeMap<String, String>) -> ServiceResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(entries).map_err(storage_error("encode local store"))?;
        tokio::fs::write(path.as_ref(), bytes)
            .await
            .map_err(storage_error("write local store"))
    }
}

fn encode<T: Serialize>(value: &T) -> ServiceResult<String> {
    serde_json::to_string(value).map_err(storage_error("encode record"))
}

fn decode<T: DeserializeOwned>(raw: &str) -> ServiceResult<T> {
    serde_json::from_str(raw).map_err(storage_error("decode record"))
}

fn report_key(id: &str) -> String {
    format!("{}{}", REPORTS_PREFIX, id)
}

fn notification_prefix(recipient_id: &str) -> String {
    format!("{}{}/", NOTIFICATIONS_PREFIX, recipient_id)
}

fn notification_key(recipient_id: &str, id: &str) -> String {
    format!("{}{}", notification_prefix(recipient_id), id)
}

fn user_key(uid: &str) -> String {
    format!("{}{}", USERS_PREFIX, uid)
}

#[derive(Debug, Clone, Default)]
pub struct LocalStore {
    kv: LocalKv,
}

impl LocalStore {
    pub fn new(kv: LocalKv) -> Self {
        Self { kv }
    }

    pub fn kv(&self) -> &LocalKv {
        &self.kv
    }

    async fn decode_prefix<T: DeserializeOwned>(&self, prefix: &str) -> ServiceResult<Vec<T>> {
        self.kv
            .scan_prefix(prefix)
            .await
            .iter()
            .map(|(_, raw)| decode(raw))
            .collect()
    }
}

#[async_trait]
impl ReportStore for LocalStore {
    async fn create_report(&self, report: &Report) -> ServiceResult<()> {
        let encoded = encode(report)?;
        self.kv
            .update(&report_key(&report.id), |current| match current {
                Some(_) => Err(ServiceError::Conflict(format!(
                    "Report {} already exists",
                    report.id
                ))),
                None => Ok(Some(encoded)),
            })
            .await
    }

    async fn get_report(&self, id: &str) -> ServiceResult<Option<Report>> {
        match self.kv.get(&report_key(id)).await {
            Some(raw) => decode(&raw).map(Some),
            None => Ok(None),
        }
    }

    async fn list_reports(&self) -> ServiceResult<Vec<Report>> {
        self.decode_prefix(REPORTS_PREFIX).await
    }

    async fn list_reports_by_submitter(&self, submitter_id: &str) -> ServiceResult<Vec<Report>> {
        let reports: Vec<Report> = self.decode_prefix(REPORTS_PREFIX).await?;
        Ok(reports
            .into_iter()
            .filter(|r| r.submitter_id == submitter_id)
            .collect())
    }

    async fn update_report(&self, report: &Report, expected_version: u64) -> ServiceResult<()> {
        let encoded = encode(report)?;
        self.kv
            .update(&report_key(&report.id), |current| {
                let current = current
                    .ok_or_else(|| ServiceError::NotFound("Report not found".to_string()))?;
                let stored: Report = decode(current)?;
                if stored.version != expected_version {
                    return Err(ServiceError::Conflict(format!(
                        "Report {} changed (version {} != {})",
                        report.id, stored.version, expected_version
                    )));
                }
                Ok(Some(encoded))
            })
            .await
    }
}

#[async_trait]
impl NotificationStore for LocalStore {
    async fn create_notification(&self, notification: &Notification) -> ServiceResult<()> {
        self.kv
            .set(
                &notification_key(&notification.recipient_id, &notification.id),
                encode(notification)?,
            )
            .await
    }

    async fn list_notifications(&self, recipient_id: &str) -> ServiceResult<Vec<Notification>> {
        let mut notifications: Vec<Notification> =
            self.decode_prefix(&notification_prefix(recipient_id)).await?;
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notifications)
    }

    async fn mark_read(&self, recipient_id: &str, notification_id: &str) -> ServiceResult<bool> {
        let mut found = false;
        self.kv
            .update(&notification_key(recipient_id, notification_id), |current| {
                let Some(raw) = current else {
                    return Ok(None);
                };
                let mut notification: Notification = decode(raw)?;
                notification.read = true;
                found = true;
                encode(&notification).map(Some)
            })
            .await?;
        Ok(found)
    }

    async fn clear_notifications(&self, recipient_id: &str) -> ServiceResult<usize> {
        self.kv.remove_prefix(&notification_prefix(recipient_id)).await
    }
}

#[async_trait]
impl UserStore for LocalStore {
    async fn create_user(&self, user: &Principal) -> ServiceResult<()> {
        let encoded = encode(user)?;
        self.kv
            .update(&user_key(&user.uid), |current| match current {
                Some(_) => Err(ServiceError::Conflict(format!(
                    "User {} already exists",
                    user.uid
                ))),
                None => Ok(Some(encoded)),
            })
            .await
    }

    async fn get_user(&self, uid: &str) -> ServiceResult<Option<Principal>> {
        match self.kv.get(&user_key(uid)).await {
            Some(raw) => decode(&raw).map(Some),
            None => Ok(None),
        }
    }

    async fn list_users(&self) -> ServiceResult<Vec<Principal>> {
        self.decode_prefix(USERS_PREFIX).await
    }

    async fn set_active(&self, uid: &str, is_active: bool) -> ServiceResult<()> {
        self.kv
            .update(&user_key(uid), |current| {
                let raw = current.ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;
                let mut user: Principal = decode(raw)?;
                user.is_active = is_active;
                encode(&user).map(Some)
            })
            .await
    }

    async fn delete_user(&self, uid: &str) -> ServiceResult<()> {
        if self.kv.remove(&user_key(uid)).await? {
            Ok(())
        } else {
            Err(ServiceError::NotFound("User not found".to_string()))
        }
    }
}
