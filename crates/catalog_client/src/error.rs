use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("rfw tag must be a single alphabetic word, got {0:?}")]
    InvalidRfwTag(String),
    #[error("image service did not accept the batch")]
    Rejected,
    #[error("failed to add images: {0}")]
    AddFailed(#[source] anyhow::Error),
}
