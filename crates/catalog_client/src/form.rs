//! Add-image form buffer and the input parsing applied on submission.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use shared::{
    domain::{ImageId, PolicyId},
    protocol::ImageResource,
};

use crate::factory::ResourceFactory;

static RFW_TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z]*$").expect("static rfw tag pattern"));

/// Transient input buffer behind the "add images" view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddImageForm {
    pub image_id: Option<String>,
    pub image_url: Option<String>,
    /// Newline-delimited list of additional URLs.
    pub bulk_urls: Option<String>,
    /// Comma-delimited tags applied to every image in the submission.
    pub tags: Option<String>,
    pub rfw_tag: Option<String>,
    pub rfw_policy: Option<PolicyId>,
}

impl AddImageForm {
    /// Explicit id for the single-URL image; an empty string counts as unset.
    pub fn explicit_id(&self) -> Option<ImageId> {
        self.image_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .map(ImageId::from)
    }

    pub fn prepare(
        &self,
        factory: &dyn ResourceFactory,
    ) -> Result<PreparedSubmission, InvalidRfwTag> {
        let tags = non_empty(&self.tags).map(parse_tags);

        let job_tag = match non_empty(&self.rfw_tag) {
            Some(tag) if !is_valid_rfw_tag(tag) => return Err(InvalidRfwTag(tag.to_string())),
            Some(tag) => tag.to_string(),
            None => String::new(),
        };

        let mut resources = Vec::new();
        if let Some(url) = non_empty(&self.image_url) {
            resources.push(factory.create_image_resource(url, self.explicit_id(), tags.clone()));
        }
        if let Some(bulk) = non_empty(&self.bulk_urls) {
            for url in split_bulk_urls(bulk) {
                resources.push(factory.create_image_resource(url, None, tags.clone()));
            }
        }

        Ok(PreparedSubmission {
            resources,
            job_tag,
            policy_id: self.rfw_policy.clone(),
        })
    }
}

/// Validated contents of a form, ready to be sent as one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedSubmission {
    pub resources: Vec<ImageResource>,
    pub job_tag: String,
    pub policy_id: Option<PolicyId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRfwTag(pub String);

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Strips every whitespace character, then splits on commas.
///
/// Empty segments (`"a,,b"`) are kept as-is.
pub fn parse_tags(raw: &str) -> Vec<String> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    compact.split(',').map(str::to_string).collect()
}

pub fn is_valid_rfw_tag(tag: &str) -> bool {
    RFW_TAG_PATTERN.is_match(tag)
}

/// Non-empty lines of a bulk URL field, accepting `\n` and `\r\n` endings.
pub fn split_bulk_urls(raw: &str) -> impl Iterator<Item = &str> {
    raw.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.is_empty())
}

#[cfg(test)]
#[path = "tests/form_tests.rs"]
mod tests;
