//! Construction of request descriptors sent to the image service.

use shared::{
    domain::ImageId,
    protocol::{ImageCollection, ImageResource},
};

pub trait ResourceFactory: Send + Sync {
    fn create_image_resource(
        &self,
        url: &str,
        id: Option<ImageId>,
        tags: Option<Vec<String>>,
    ) -> ImageResource;

    fn create_image_collection(&self, resources: Vec<ImageResource>) -> ImageCollection;
}

pub struct DefaultResourceFactory;

impl ResourceFactory for DefaultResourceFactory {
    fn create_image_resource(
        &self,
        url: &str,
        id: Option<ImageId>,
        tags: Option<Vec<String>>,
    ) -> ImageResource {
        ImageResource {
            url: url.to_string(),
            id,
            tags,
        }
    }

    fn create_image_collection(&self, resources: Vec<ImageResource>) -> ImageCollection {
        ImageCollection { items: resources }
    }
}
