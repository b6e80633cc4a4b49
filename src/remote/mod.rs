/// Remote image collection
///
/// This module handles:
/// - The `ImageSource` seam the collection store talks to
/// - The HTTP implementation against the image API (http.rs)

pub mod http;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;

use crate::error::GalleryError;
use crate::state::data::ImageRecord;

pub use http::HttpImageSource;

/// Where the canonical list of images lives.
///
/// Implementations report network problems as `GalleryError::Transport`
/// and malformed payloads as `GalleryError::Validation`.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Fetch the full list, in server order.
    async fn fetch_images(&self) -> Result<Vec<ImageRecord>, GalleryError>;

    /// Delete one image on the server.
    async fn delete_image(&self, id: i64) -> Result<(), GalleryError>;
}
