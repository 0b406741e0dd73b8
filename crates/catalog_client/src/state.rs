//! View-bound state published to presentation layers.

use std::fmt;

use serde::Serialize;
use shared::{
    domain::{FilterMode, ImageId, ViewMode},
    protocol::{ImageRecord, RfwPolicy},
};

use crate::form::AddImageForm;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterCriterion {
    pub mode: FilterMode,
    /// `None` until the user has entered something to filter by.
    pub content: Option<String>,
}

impl FilterCriterion {
    pub fn new(mode: FilterMode, content: impl Into<String>) -> Self {
        Self {
            mode,
            content: Some(content.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogState {
    pub images: Vec<ImageRecord>,
    pub view: ViewMode,
    /// Raised by every image query and never lowered again.
    pub loading: bool,
    pub rfw_policies: Vec<RfwPolicy>,
    pub rfw_enabled: bool,
    pub rfw_policies_exist: bool,
    pub form: AddImageForm,
    pub add_images_with_ids: bool,
    pub filter: FilterCriterion,
    pub selected_image: Option<ImageId>,
}

impl Default for CatalogState {
    fn default() -> Self {
        Self {
            images: Vec::new(),
            view: ViewMode::Catalog,
            loading: false,
            rfw_policies: Vec::new(),
            rfw_enabled: false,
            rfw_policies_exist: false,
            form: AddImageForm::default(),
            add_images_with_ids: true,
            filter: FilterCriterion::default(),
            selected_image: None,
        }
    }
}

/// Blocking user-facing notices raised by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogAlert {
    InvalidRfwTag,
    AddFailed,
}

impl fmt::Display for CatalogAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRfwTag => f.write_str("Tags can only be a single alphabetic word"),
            Self::AddFailed => f.write_str("ERROR: Unable to add image(s)"),
        }
    }
}
