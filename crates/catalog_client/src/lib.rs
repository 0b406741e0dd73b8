//! Client-side controller for an image catalog backed by a remote
//! image-management service.

pub mod api;
pub mod controller;
pub mod error;
pub mod factory;
pub mod form;
pub mod state;
pub mod tasks;

pub use api::{HttpImageApi, ImageApi};
pub use controller::{CatalogController, ControllerOptions};
pub use error::CatalogError;
pub use factory::{DefaultResourceFactory, ResourceFactory};
pub use form::AddImageForm;
pub use state::{CatalogAlert, CatalogState, FilterCriterion};
pub use tasks::{DetachedTasks, FailurePolicy};
