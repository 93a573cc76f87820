//! REST client for the vRealize Operations suite API
//!
//! Every call carries `Authorization: vRealizeOpsToken <token>`. The token is
//! acquired with [`VropsClient::login`] and reused; when the suite API answers
//! 401 the client logs in again with the same credential and retries once.

use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use super::{
    async_trait, ErrorNotifier, MetricPublisher, ResourceMetrics, ResourceResolver, StatsPayload,
    SyncError,
};
use crate::settings::{Credential, VropsConfig};

const TOKEN_PATH: &str = "/suite-api/api/auth/token/acquire";
const RESOURCES_PATH: &str = "/suite-api/api/resources";
const STATS_PATH: &str = "/suite-api/api/resources/stats";
const EVENTS_PATH: &str = "/suite-api/api/events";

/// Configuration for the backend client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// e.g. `https://10.0.2.1`
    pub base_url: String,
    /// Resource that failure notifications are raised against
    pub adapter_instance_id: String,
    pub verify_tls: bool,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, adapter_instance_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            adapter_instance_id: adapter_instance_id.into(),
            verify_tls: false,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn from_settings(vrops: &VropsConfig) -> Self {
        Self {
            verify_tls: vrops.verify_tls,
            ..Self::new(vrops.base_url(), vrops.adapter_instance_id.clone())
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct ResourceList {
    #[serde(rename = "resourceList", default)]
    resource_list: Vec<Resource>,
}

#[derive(Debug, Deserialize)]
struct Resource {
    identifier: String,
    #[serde(rename = "resourceKey")]
    resource_key: ResourceKey,
}

#[derive(Debug, Deserialize)]
struct ResourceKey {
    #[serde(rename = "resourceIdentifiers", default)]
    resource_identifiers: Vec<ResourceIdentifier>,
}

#[derive(Debug, Deserialize)]
struct ResourceIdentifier {
    #[serde(rename = "identifierType")]
    identifier_type: IdentifierType,
    value: String,
}

#[derive(Debug, Deserialize)]
struct IdentifierType {
    name: String,
}

impl Resource {
    /// Value of the identifier whose type is `ID`
    fn fleet_id(&self) -> Option<&str> {
        self.resource_key
            .resource_identifiers
            .iter()
            .find(|identifier| identifier.identifier_type.name == "ID")
            .map(|identifier| identifier.value.as_str())
    }
}

/// vROps suite API client
pub struct VropsClient {
    config: ClientConfig,
    base: Url,
    http: reqwest::Client,
    token: RwLock<Option<String>>,
    credential: RwLock<Option<Credential>>,
}

impl VropsClient {
    pub fn new(config: ClientConfig) -> Result<Self, SyncError> {
        let base = Url::parse(&config.base_url)?;
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!config.verify_tls)
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            config,
            base,
            http,
            token: RwLock::new(None),
            credential: RwLock::new(None),
        })
    }

    /// Use an already acquired token
    #[cfg(test)]
    pub(crate) fn with_token(self, token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
            ..self
        }
    }

    /// Acquire an access token and keep it for later calls
    pub async fn login(&self, credential: &Credential) -> Result<(), SyncError> {
        let body = json!({
            "username": credential.username,
            "password": credential.password.as_deref().unwrap_or_default(),
        });

        let response = self
            .http
            .post(self.endpoint(TOKEN_PATH)?)
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .await?;
        let token: TokenResponse = check(response).await?.json().await?;

        *self.token.write().await = Some(token.token);
        *self.credential.write().await = Some(credential.clone());
        info!(base_url = %self.config.base_url, "Acquired vROps access token");
        Ok(())
    }

    fn endpoint(&self, path: &str) -> Result<Url, SyncError> {
        Ok(self.base.join(path)?)
    }

    async fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, SyncError> {
        let token = self
            .token
            .read()
            .await
            .clone()
            .ok_or(SyncError::Unauthenticated)?;
        Ok(request.header(AUTHORIZATION, format!("vRealizeOpsToken {token}")))
    }

    /// Send with the current token; on 401 log in again and retry once
    async fn send(&self, request: RequestBuilder) -> Result<Response, SyncError> {
        let retry = request.try_clone();
        let response = self.authorized(request).await?.send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return check(response).await;
        }

        let credential = self.credential.read().await.clone();
        let (Some(retry), Some(credential)) = (retry, credential) else {
            return check(response).await;
        };

        warn!("vROps token rejected, acquiring a new one");
        self.login(&credential).await?;
        let response = self.authorized(retry).await?.send().await?;
        check(response).await
    }

    async fn try_notify(&self, message: &str) -> Result<(), SyncError> {
        let mut url = self.endpoint(EVENTS_PATH)?;
        url.query_pairs_mut().append_pair("_no_links", "true");

        let event = json!({
            "eventType": "NOTIFICATION",
            "cancelTimeUTC": 0,
            "severity": "WARNING",
            "keyIndicator": false,
            "managedExternally": false,
            "resourceId": self.config.adapter_instance_id,
            "message": message,
            "startTimeUTC": chrono::Utc::now().timestamp_millis(),
        });

        let request = self.http.post(url).header(ACCEPT, "*/*").json(&event);
        self.send(request).await?;
        Ok(())
    }
}

/// Turn a non-success status into [`SyncError::Status`]
async fn check(response: Response) -> Result<Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SyncError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl ResourceResolver for VropsClient {
    async fn resource_map(
        &self,
        adapter_kind: &str,
        resource_kind: &str,
    ) -> Result<BTreeMap<String, String>, SyncError> {
        let mut url = self.endpoint(RESOURCES_PATH)?;
        url.query_pairs_mut()
            .append_pair("adapterInstanceId", &self.config.adapter_instance_id)
            .append_pair("adapterKind", adapter_kind)
            .append_pair("resourceKind", resource_kind)
            .append_pair("resourceStatus", "DATA_RECEIVING")
            .append_pair("_no_links", "true");

        let request = self.http.get(url).header(ACCEPT, "application/json");
        let list: ResourceList = self.send(request).await?.json().await?;

        let map: BTreeMap<String, String> = list
            .resource_list
            .iter()
            .filter_map(|resource| {
                resource
                    .fleet_id()
                    .map(|id| (id.to_string(), resource.identifier.clone()))
            })
            .collect();

        debug!(
            adapter_kind = %adapter_kind,
            resource_kind = %resource_kind,
            resources = map.len(),
            "Resolved resource mapping"
        );
        Ok(map)
    }
}

#[async_trait]
impl MetricPublisher for VropsClient {
    async fn publish(&self, batch: &[ResourceMetrics]) -> Result<(), SyncError> {
        let mut url = self.endpoint(STATS_PATH)?;
        url.query_pairs_mut()
            .append_pair("disableAnalyticsProcessing", "false")
            .append_pair("_no_links", "true");

        let request = self
            .http
            .post(url)
            .header(ACCEPT, "*/*")
            .json(&StatsPayload::new(batch));
        self.send(request).await?;

        info!(resources = batch.len(), "Published metrics to vROps");
        Ok(())
    }
}

#[async_trait]
impl ErrorNotifier for VropsClient {
    async fn notify(&self, message: &str) {
        match self.try_notify(message).await {
            Ok(()) => info!("Notification event sent"),
            Err(e) => warn!(error = %e, "Failed to send notification event"),
        }
    }
}
