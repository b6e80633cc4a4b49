use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

use super::ImageSource;
use crate::error::GalleryError;
use crate::state::data::ImageRecord;

/// Image API client
///
/// `GET {base}/images` returns a JSON array of images,
/// `DELETE {base}/images/{id}` removes one.
#[derive(Debug, Clone)]
pub struct HttpImageSource {
    client: Client,
    base: String,
}

impl HttpImageSource {
    pub fn new(base: &str, timeout: Duration) -> Result<Self, GalleryError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| GalleryError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    pub fn images_url(&self) -> String {
        format!("{}/images", self.base)
    }

    pub fn image_url(&self, id: i64) -> String {
        format!("{}/images/{}", self.base, id)
    }
}

#[async_trait]
impl ImageSource for HttpImageSource {
    async fn fetch_images(&self) -> Result<Vec<ImageRecord>, GalleryError> {
        let response = self.client.get(self.images_url()).send().await?;
        check_status(response.status())?;

        let body: Value = response.json().await?;
        parse_image_list(body)
    }

    async fn delete_image(&self, id: i64) -> Result<(), GalleryError> {
        let response = self.client.delete(self.image_url(id)).send().await?;
        check_status(response.status())
    }
}

fn check_status(status: StatusCode) -> Result<(), GalleryError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(GalleryError::Transport(format!("server responded with {status}")))
    }
}

/// Validate the `/images` payload
///
/// Anything other than an array of image-shaped objects is rejected as a whole.
pub fn parse_image_list(body: Value) -> Result<Vec<ImageRecord>, GalleryError> {
    let entries = match body {
        Value::Array(entries) => entries,
        other => {
            return Err(GalleryError::Validation(format!(
                "expected an array of images, got {}",
                json_kind(&other)
            )))
        }
    };

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            serde_json::from_value(entry).map_err(|e| {
                GalleryError::Validation(format!("image at index {index} is malformed: {e}"))
            })
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
