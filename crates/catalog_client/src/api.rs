//! Network boundary: the image-management service as seen by the controller.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    domain::{ImageId, PolicyId},
    error::{ProblemDetail, ServiceError},
    protocol::{
        IdReference, ImageCollection, ImageRecord, ItemList, JobStatus, RfwPolicy, RfwStatus,
        RunJobRequest,
    },
};
use tracing::debug;
use url::Url;

/// Operations the catalog controller needs from the image service.
///
/// `Ok(None)` is the service answering "nothing" (missing resource, empty
/// body); `Err` is a transport or protocol failure.
#[async_trait]
pub trait ImageApi: Send + Sync {
    async fn add_images(&self, batch: &ImageCollection)
        -> Result<Option<ItemList<ImageRecord>>>;
    async fn get_all_images(&self) -> Result<Option<ItemList<ImageRecord>>>;
    async fn get_images_by_tag(&self, tag: &str) -> Result<Option<ItemList<IdReference>>>;
    async fn get_images_by_url(&self, url: &str) -> Result<Option<ItemList<IdReference>>>;
    async fn get_image(&self, id: &ImageId) -> Result<Option<ImageRecord>>;
    async fn get_rfw_policies(&self) -> Result<Option<ItemList<RfwPolicy>>>;
    async fn rfw_status(&self) -> Result<bool>;
    async fn run_image_job(&self, image_id: &ImageId, policy_id: &PolicyId, tag: &str)
        -> Result<()>;
    async fn get_job(&self, policy_id: &PolicyId) -> Result<JobStatus>;
}

pub struct HttpImageApi {
    http: Client,
    base_url: Url,
}

impl HttpImageApi {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: &str) -> Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("invalid api base url: {base_url}"))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(anyhow!("api base url must start with http:// or https://"));
        }
        if base_url.cannot_be_a_base() {
            return Err(anyhow!("api base url cannot carry a path: {base_url}"));
        }
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_optional<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, &str)],
    ) -> Result<Option<T>> {
        debug!(%url, "GET");
        let mut request = self.http.get(url);
        if !query.is_empty() {
            request = request.query(query);
        }
        let response = request.send().await?;
        decode_optional(response).await
    }
}

async fn decode_optional<T: DeserializeOwned>(response: Response) -> Result<Option<T>> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND || status == StatusCode::NO_CONTENT {
        return Ok(None);
    }
    if !status.is_success() {
        return Err(error_from_response(response).await);
    }
    // A literal `null` body also decodes to `None`.
    Ok(response.json::<Option<T>>().await?)
}

async fn error_from_response(response: Response) -> anyhow::Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ProblemDetail>(&body) {
        Ok(problem) => ServiceError {
            status: status.as_u16(),
            problem,
        }
        .into(),
        Err(_) => anyhow!("image service returned {status}: {body}"),
    }
}

#[async_trait]
impl ImageApi for HttpImageApi {
    async fn add_images(
        &self,
        batch: &ImageCollection,
    ) -> Result<Option<ItemList<ImageRecord>>> {
        let url = self.endpoint(&["images"]);
        debug!(%url, count = batch.items.len(), "POST image batch");
        let response = self.http.post(url).json(batch).send().await?;
        decode_optional(response).await
    }

    async fn get_all_images(&self) -> Result<Option<ItemList<ImageRecord>>> {
        self.get_optional(self.endpoint(&["images"]), &[]).await
    }

    async fn get_images_by_tag(&self, tag: &str) -> Result<Option<ItemList<IdReference>>> {
        self.get_optional(self.endpoint(&["images"]), &[("tag", tag)])
            .await
    }

    async fn get_images_by_url(&self, url: &str) -> Result<Option<ItemList<IdReference>>> {
        self.get_optional(self.endpoint(&["images"]), &[("url", url)])
            .await
    }

    async fn get_image(&self, id: &ImageId) -> Result<Option<ImageRecord>> {
        self.get_optional(self.endpoint(&["images", id.as_str()]), &[])
            .await
    }

    async fn get_rfw_policies(&self) -> Result<Option<ItemList<RfwPolicy>>> {
        self.get_optional(self.endpoint(&["rfw", "policies"]), &[])
            .await
    }

    async fn rfw_status(&self) -> Result<bool> {
        let status: Option<RfwStatus> = self
            .get_optional(self.endpoint(&["rfw", "status"]), &[])
            .await?;
        Ok(status.is_some_and(|s| s.enabled))
    }

    async fn run_image_job(
        &self,
        image_id: &ImageId,
        policy_id: &PolicyId,
        tag: &str,
    ) -> Result<()> {
        let url = self.endpoint(&["rfw", "policies", policy_id.as_str(), "jobs"]);
        debug!(%url, image_id = %image_id, "POST rfw job");
        let response = self
            .http
            .post(url)
            .json(&RunJobRequest {
                image_id: image_id.clone(),
                tag: tag.to_string(),
            })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(())
    }

    async fn get_job(&self, policy_id: &PolicyId) -> Result<JobStatus> {
        self.get_optional(
            self.endpoint(&["rfw", "policies", policy_id.as_str(), "jobs"]),
            &[],
        )
        .await?
        .ok_or_else(|| anyhow!("no job found for policy {policy_id}"))
    }
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
