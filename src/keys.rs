//! API key management (`/keys`).

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::{
    client::path_segment, decode::decode_list, wire::null_as_default, ApiResponse,
    MetaBaseClient, QueryParams, Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    System,
    User,
    Service,
}

impl KeyType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Service => "service",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Active,
    Inactive,
    Revoked,
    Expired,
}

impl KeyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Revoked => "revoked",
            Self::Expired => "expired",
        }
    }
}

/// API key as stored by the server. The secret itself is only present in
/// the response to [`KeyManager::create`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_prefix: Option<String>,
    #[serde(rename = "type")]
    pub kind: KeyType,
    pub status: KeyStatus,
    #[serde(default, deserialize_with = "null_as_default")]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub usage_count: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: Map<String, Value>,
}

impl ApiKey {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|granted| granted == scope)
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|expires_at| Utc::now() > expires_at)
    }

    /// Active and not past its expiry.
    pub fn is_valid(&self) -> bool {
        self.status == KeyStatus::Active && !self.is_expired()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CreateKeyRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: KeyType,
    pub scopes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl CreateKeyRequest {
    pub fn new(name: impl Into<String>, kind: KeyType) -> Self {
        Self {
            name: name.into(),
            kind,
            scopes: Vec::new(),
            tenant_id: None,
            project_id: None,
            user_id: None,
            expires_at: None,
            metadata: Map::new(),
        }
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

/// Partial update; `None` fields are left unchanged.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct UpdateKeyRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<KeyStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

/// Filter for [`KeyManager::list`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyFilter {
    pub tenant_id: Option<String>,
    pub project_id: Option<String>,
    pub kind: Option<KeyType>,
    pub status: Option<KeyStatus>,
    pub user_id: Option<String>,
    pub limit: u64,
    pub offset: u64,
}

impl Default for KeyFilter {
    fn default() -> Self {
        Self {
            tenant_id: None,
            project_id: None,
            kind: None,
            status: None,
            user_id: None,
            limit: 50,
            offset: 0,
        }
    }
}

impl KeyFilter {
    fn to_params(&self) -> QueryParams {
        let mut params = QueryParams::new();
        params.push_opt("tenant_id", self.tenant_id.as_deref());
        params.push_opt("project_id", self.project_id.as_deref());
        params.push_opt("type", self.kind.map(KeyType::as_str));
        params.push_opt("status", self.status.map(KeyStatus::as_str));
        params.push_opt("user_id", self.user_id.as_deref());
        params.push("limit", self.limit.to_string());
        params.push("offset", self.offset.to_string());
        params
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyUsageStats {
    pub key_id: String,
    pub usage_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub top_endpoints: Vec<EndpointUsage>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointUsage {
    pub endpoint: String,
    pub count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
}

fn key_path(id: &str) -> Result<String> {
    Ok(format!("/keys/{}", path_segment(id)?))
}

/// Key management calls, borrowed from a [`MetaBaseClient`].
#[derive(Clone, Copy, Debug)]
pub struct KeyManager<'a> {
    client: &'a MetaBaseClient,
}

impl MetaBaseClient {
    pub fn keys(&self) -> KeyManager<'_> {
        KeyManager { client: self }
    }
}

impl KeyManager<'_> {
    pub async fn create(&self, request: &CreateKeyRequest) -> Result<ApiResponse<ApiKey>> {
        let body = serde_json::to_value(request)?;
        self.client
            .execute_as(Method::POST, "/keys", Some(body), &QueryParams::new())
            .await
    }

    pub async fn list(&self, filter: Option<&KeyFilter>) -> Result<ApiResponse<Vec<ApiKey>>> {
        let params = filter.cloned().unwrap_or_default().to_params();
        let response = self
            .client
            .execute(Method::GET, "/keys", None, &params)
            .await?;
        Ok(decode_list(response))
    }

    pub async fn get(&self, id: &str) -> Result<ApiResponse<ApiKey>> {
        self.client
            .execute_as(Method::GET, &key_path(id)?, None, &QueryParams::new())
            .await
    }

    pub async fn update(&self, id: &str, request: &UpdateKeyRequest) -> Result<ApiResponse<ApiKey>> {
        let body = serde_json::to_value(request)?;
        self.client
            .execute_as(Method::PUT, &key_path(id)?, Some(body), &QueryParams::new())
            .await
    }

    /// Marks a key as revoked.
    pub async fn revoke(&self, id: &str) -> Result<ApiResponse<ApiKey>> {
        let body = json!({ "status": KeyStatus::Revoked });
        self.client
            .execute_as(Method::PUT, &key_path(id)?, Some(body), &QueryParams::new())
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<ApiResponse<Value>> {
        self.client
            .execute(Method::DELETE, &key_path(id)?, None, &QueryParams::new())
            .await
    }

    pub async fn usage(&self, id: &str) -> Result<ApiResponse<KeyUsageStats>> {
        self.client
            .execute_as(Method::GET, &format!("{}/usage", key_path(id)?), None, &QueryParams::new())
            .await
    }
}
