//! HTTP implementation of [`FulfillmentBackend`] against a running
//! `logisticsd`.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use logistics_core::ServiceError;

use crate::backend::FulfillmentBackend;
use crate::catalog::{CatalogEntry, CatalogKind};
use crate::manifest::Manifest;
use crate::model::{
    BoxesView, Completion, CollectorInfo, CollectorProfile, FinalizeRequest, PackedBox,
    SaveBoxRequest, WorkOrder,
};

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NextNumber {
    next_box_number: u64,
}

/// Map a non-success response onto the shared error taxonomy.
///
/// Anything that is not a client-side rejection is a remote failure.
fn error_from_status(status: u16, body: &str) -> ServiceError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| format!("HTTP {status}: {body}"));
    match status {
        400 => ServiceError::Validation(message),
        404 => ServiceError::NotFound(message),
        409 => ServiceError::Conflict(message),
        412 => ServiceError::Precondition(message),
        _ => ServiceError::Storage(message),
    }
}

fn transport(e: reqwest::Error) -> ServiceError {
    ServiceError::Storage(format!("request failed: {e}"))
}

/// Talks to the fulfillment routes mounted under `{base_url}/fulfillment`.
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/fulfillment{}", self.base_url, path)
    }

    fn order_url(&self, id: &str, rest: &str) -> String {
        self.url(&format!("/work-orders/{}{rest}", urlencoding::encode(id)))
    }

    async fn parse<R: DeserializeOwned>(resp: reqwest::Response) -> Result<R, ServiceError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(error_from_status(status.as_u16(), &body));
        }
        resp.json::<R>()
            .await
            .map_err(|e| ServiceError::Storage(format!("response body: {e}")))
    }

    async fn get<R: DeserializeOwned>(&self, url: String) -> Result<R, ServiceError> {
        let resp = self.http.get(&url).send().await.map_err(transport)?;
        Self::parse(resp).await
    }

    async fn post<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        url: String,
        body: &B,
    ) -> Result<R, ServiceError> {
        let resp = self.http.post(&url).json(body).send().await.map_err(transport)?;
        Self::parse(resp).await
    }
}

#[async_trait]
impl FulfillmentBackend for HttpBackend {
    async fn work_order(&self, id: &str) -> Result<WorkOrder, ServiceError> {
        self.get(self.order_url(id, "")).await
    }

    async fn next_box_number(&self, work_order_id: &str) -> Result<u64, ServiceError> {
        let body: NextNumber = self.get(self.order_url(work_order_id, "/next-box-number")).await?;
        Ok(body.next_box_number)
    }

    async fn save_box(&self, work_order_id: &str, req: &SaveBoxRequest) -> Result<PackedBox, ServiceError> {
        self.post(self.order_url(work_order_id, "/boxes"), req).await
    }

    async fn delete_box(&self, work_order_id: &str, box_number: u64) -> Result<(), ServiceError> {
        let url = self.order_url(work_order_id, &format!("/boxes/{box_number}"));
        let resp = self.http.delete(&url).send().await.map_err(transport)?;
        let _: serde_json::Value = Self::parse(resp).await?;
        Ok(())
    }

    async fn boxes(&self, work_order_id: &str) -> Result<BoxesView, ServiceError> {
        self.get(self.order_url(work_order_id, "/boxes")).await
    }

    async fn collector_info(&self, work_order_id: &str) -> Result<Option<CollectorInfo>, ServiceError> {
        self.get(self.order_url(work_order_id, "/collector-info")).await
    }

    async fn save_collector_info(
        &self,
        work_order_id: &str,
        info: &CollectorInfo,
    ) -> Result<CollectorInfo, ServiceError> {
        self.post(self.order_url(work_order_id, "/collector-info"), info).await
    }

    async fn collectors(&self) -> Result<Vec<CollectorProfile>, ServiceError> {
        self.get(self.url("/collectors")).await
    }

    async fn manifest(&self, work_order_id: &str) -> Result<Option<Manifest>, ServiceError> {
        self.get(self.order_url(work_order_id, "/manifest")).await
    }

    async fn save_manifest(&self, work_order_id: &str, manifest: &Manifest) -> Result<Manifest, ServiceError> {
        let url = self.order_url(work_order_id, "/manifest");
        let resp = self.http.put(&url).json(manifest).send().await.map_err(transport)?;
        Self::parse(resp).await
    }

    async fn finalize(&self, work_order_id: &str, req: &FinalizeRequest) -> Result<Completion, ServiceError> {
        self.post(self.order_url(work_order_id, "/@finalize"), req).await
    }

    async fn reopen(&self, work_order_id: &str) -> Result<WorkOrder, ServiceError> {
        self.post(self.order_url(work_order_id, "/@reopen"), &serde_json::json!({})).await
    }

    async fn catalog(&self, kind: CatalogKind) -> Result<Vec<CatalogEntry>, ServiceError> {
        self.get(self.url(&format!("/catalog/{}", kind.route_segment()))).await
    }
}
