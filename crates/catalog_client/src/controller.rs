//! Catalog controller: turns user actions into image-service calls and folds
//! their results back into observable view state.
//!
//! Queries are never cancelled. When two overlap, whichever resolves last
//! overwrites the image list, even if it was issued first.

use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;
use shared::{
    domain::{FilterMode, ImageId, PolicyId, ViewMode},
    protocol::{IdReference, ImageRecord, ItemList, JobStatus},
};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::{
    api::ImageApi,
    error::CatalogError,
    factory::ResourceFactory,
    form::{AddImageForm, InvalidRfwTag},
    state::{CatalogAlert, CatalogState, FilterCriterion},
    tasks::{DetachedTasks, FailurePolicy},
};

#[derive(Debug, Clone, Copy, Default)]
pub struct ControllerOptions {
    /// Gate for bulk selection; when false select/deselect-all do nothing.
    pub product_enabled: bool,
}

pub struct CatalogController {
    api: Arc<dyn ImageApi>,
    factory: Arc<dyn ResourceFactory>,
    options: ControllerOptions,
    state: watch::Sender<CatalogState>,
    alerts: broadcast::Sender<CatalogAlert>,
    tasks: DetachedTasks,
}

impl CatalogController {
    pub fn new(
        api: Arc<dyn ImageApi>,
        factory: Arc<dyn ResourceFactory>,
        options: ControllerOptions,
    ) -> Self {
        let (state, _) = watch::channel(CatalogState::default());
        let (alerts, _) = broadcast::channel(64);
        Self {
            api,
            factory,
            options,
            state,
            alerts,
            tasks: DetachedTasks::new(),
        }
    }

    /// Queries RFW availability, resets state, and loads the unfiltered
    /// catalog together with the policy list.
    pub async fn init(&self) {
        self.state.send_replace(CatalogState::default());

        let status = async {
            match self.api.rfw_status().await {
                Ok(enabled) => self.state.send_modify(|s| {
                    s.rfw_enabled = enabled;
                    s.rfw_policies_exist = enabled;
                }),
                Err(err) => warn!("catalog: rfw status query failed: {err:#}"),
            }
        };

        tokio::join!(
            status,
            self.get_rfw_policies(),
            self.get_images(FilterMode::All, Some("")),
        );
    }

    pub fn subscribe(&self) -> watch::Receiver<CatalogState> {
        self.state.subscribe()
    }

    pub fn subscribe_alerts(&self) -> broadcast::Receiver<CatalogAlert> {
        self.alerts.subscribe()
    }

    pub fn snapshot(&self) -> CatalogState {
        self.state.borrow().clone()
    }

    pub fn tasks(&self) -> &DetachedTasks {
        &self.tasks
    }

    fn alert(&self, alert: CatalogAlert) {
        let _ = self.alerts.send(alert);
    }

    pub fn reset_add_image_fields(&self) {
        self.state.send_modify(|s| s.form = AddImageForm::default());
    }

    pub fn update_form(&self, edit: impl FnOnce(&mut AddImageForm)) {
        self.state.send_modify(|s| edit(&mut s.form));
    }

    /// Submits whatever is currently in the form buffer.
    pub async fn submit_form(&self) -> Result<usize, CatalogError> {
        let form = self.state.borrow().form.clone();
        self.add_image(&form).await
    }

    /// Validates the form, sends every described image as one batch, and
    /// enrolls each created image in the selected RFW policy.
    ///
    /// Returns the number of images the service created.
    pub async fn add_image(&self, form: &AddImageForm) -> Result<usize, CatalogError> {
        let submission = match form.prepare(self.factory.as_ref()) {
            Ok(submission) => submission,
            Err(InvalidRfwTag(tag)) => {
                warn!(tag = %tag, "catalog: rejected rfw tag");
                self.alert(CatalogAlert::InvalidRfwTag);
                return Err(CatalogError::InvalidRfwTag(tag));
            }
        };

        let batch = self.factory.create_image_collection(submission.resources);

        let created = match self.api.add_images(&batch).await {
            Ok(Some(created)) => created,
            Ok(None) => {
                warn!("catalog: image service returned no result for batch add");
                self.alert(CatalogAlert::AddFailed);
                return Err(CatalogError::Rejected);
            }
            Err(err) => {
                warn!("catalog: batch add failed: {err:#}");
                self.alert(CatalogAlert::AddFailed);
                return Err(CatalogError::AddFailed(err));
            }
        };

        for image in &created.items {
            match &image.id {
                Some(id) => {
                    self.run_image_job(
                        id.clone(),
                        submission.policy_id.clone(),
                        &submission.job_tag,
                    );
                }
                None => debug!(url = %image.url, "catalog: created image has no id; no job"),
            }
        }

        info!(count = created.items.len(), "catalog: images added");
        self.reset_add_image_fields();
        self.go_catalog_view();
        Ok(created.items.len())
    }

    pub fn update_filter(&self, filter: FilterCriterion) {
        self.state.send_modify(|s| s.filter = filter);
    }

    /// Runs the query described by the filter currently held in state.
    pub async fn apply_filter(&self) {
        let filter = self.state.borrow().filter.clone();
        self.get_images(filter.mode, filter.content.as_deref()).await;
    }

    /// String-keyed entry point; unknown criteria are ignored.
    pub async fn get_images_by(&self, find_by: &str, content: Option<&str>) {
        match FilterMode::parse(find_by) {
            Some(mode) => self.get_images(mode, content).await,
            None => debug!(find_by, "catalog: unknown filter criterion"),
        }
    }

    /// Replaces the image list with the result of the query, or leaves it
    /// alone when the query fails. Does nothing until `content` is present.
    pub async fn get_images(&self, mode: FilterMode, content: Option<&str>) {
        let Some(content) = content else {
            return;
        };
        self.state.send_modify(|s| s.loading = true);
        debug!(mode = mode.as_str(), content, "catalog: querying images");

        let result = match mode {
            FilterMode::All => self
                .api
                .get_all_images()
                .await
                .map(|list| list.map(|l| l.items)),
            FilterMode::Tag => {
                let refs = self.api.get_images_by_tag(content).await;
                self.fetch_referenced(refs).await
            }
            FilterMode::Id => self
                .api
                .get_image(&ImageId::from(content))
                .await
                .map(|image| image.map(|i| vec![i])),
            FilterMode::Url => {
                let refs = self.api.get_images_by_url(content).await;
                self.fetch_referenced(refs).await
            }
        };

        match result {
            Ok(Some(images)) => self.state.send_modify(|s| s.images = images),
            Ok(None) => debug!(mode = mode.as_str(), "catalog: query returned nothing"),
            Err(err) => warn!(mode = mode.as_str(), "catalog: image query failed: {err:#}"),
        }
    }

    /// Fetches every referenced image concurrently and keeps reference order.
    async fn fetch_referenced(
        &self,
        refs: Result<Option<ItemList<IdReference>>>,
    ) -> Result<Option<Vec<ImageRecord>>> {
        let Some(refs) = refs? else {
            return Ok(None);
        };

        let lookups = refs.items.iter().map(|r| self.api.get_image(&r.id));
        let fetched = join_all(lookups)
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(fetched.into_iter().flatten().collect()))
    }

    pub fn select_all_images(&self) {
        self.set_all_selected(true);
    }

    pub fn deselect_all_images(&self) {
        self.set_all_selected(false);
    }

    fn set_all_selected(&self, selected: bool) {
        if !self.options.product_enabled {
            return;
        }
        self.state.send_modify(|s| {
            for image in &mut s.images {
                image.selected = selected;
            }
        });
    }

    /// Flips the selection flag of one loaded image; returns false if absent.
    pub fn toggle_image_selection(&self, id: &ImageId) -> bool {
        self.state.send_if_modified(|s| {
            let Some(image) = s.images.iter_mut().find(|i| i.id.as_ref() == Some(id)) else {
                return false;
            };
            image.selected = !image.selected;
            s.selected_image = Some(id.clone());
            true
        })
    }

    pub fn go_add_images(&self) {
        self.state.send_modify(|s| s.view = ViewMode::Add);
    }

    pub fn go_catalog_view(&self) {
        self.state.send_modify(|s| {
            s.view = ViewMode::Catalog;
            s.images.clear();
        });
    }

    pub async fn get_rfw_policies(&self) {
        let policies = match self.api.get_rfw_policies().await {
            Ok(Some(list)) => list.items,
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!("catalog: rfw policy query failed: {err:#}");
                Vec::new()
            }
        };
        self.state.send_modify(|s| s.rfw_policies = policies);
    }

    /// Starts a detached RFW job for the image. Without a policy nothing is
    /// submitted and `false` is returned.
    pub fn run_image_job(
        &self,
        image_id: ImageId,
        policy_id: Option<PolicyId>,
        job_tag: &str,
    ) -> bool {
        let Some(policy_id) = policy_id else {
            return false;
        };
        let api = Arc::clone(&self.api);
        let tag = job_tag.to_string();
        self.tasks.spawn("run_image_job", FailurePolicy::Log, async move {
            api.run_image_job(&image_id, &policy_id, &tag).await
        });
        true
    }

    pub async fn get_job(&self, policy_id: &PolicyId) -> Option<JobStatus> {
        match self.api.get_job(policy_id).await {
            Ok(status) => Some(status),
            Err(err) => {
                warn!(policy_id = %policy_id, "catalog: job status query failed: {err:#}");
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
