/// Shared data structures for the application state
///
/// These structs represent the data model that flows between
/// the stores and the rendering layer.

use serde::{Deserialize, Serialize};

use crate::error::GalleryError;

/// Represents a single image in the remote collection
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    /// Server-assigned, stable ID
    pub id: i64,
    pub title: String,
    /// Where the image itself can be fetched from
    pub url: String,
}

/// Lifecycle of the collection list
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoadStatus {
    #[default]
    Loading,
    Ready,
    Error,
}

/// Everything the rendering layer needs to draw the grid
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CollectionState {
    /// Server order, minus optimistic removals
    pub items: Vec<ImageRecord>,
    pub status: LoadStatus,
    /// Failure of the most recent load
    pub last_error: Option<GalleryError>,
    /// Failure of the most recently settled delete
    pub delete_error: Option<GalleryError>,
}

impl CollectionState {
    pub fn ids(&self) -> Vec<i64> {
        self.items.iter().map(|image| image.id).collect()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.items.iter().any(|image| image.id == id)
    }

    /// Message to show to the user, if any
    pub fn error_message(&self) -> Option<String> {
        self.delete_error
            .as_ref()
            .or(self.last_error.as_ref())
            .map(|err| err.to_string())
    }
}

/// A rectangular region drawn over an image
///
/// Coordinates are image-local pixels.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Annotation {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Tag / category colour, e.g. "#ff0000"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl Annotation {
    /// Width and height must both be strictly positive
    pub fn has_valid_size(&self) -> bool {
        is_positive(self.width) && is_positive(self.height)
    }

    /// Convert a whole set to JSON for storage
    pub fn list_to_json(annotations: &[Annotation]) -> Result<String, serde_json::Error> {
        serde_json::to_string(annotations)
    }

    /// Parse a whole set from storage
    pub fn list_from_json(json: &str) -> Result<Vec<Annotation>, serde_json::Error> {
        serde_json::from_str(json)
    }
}

pub(crate) fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// Annotation set of the most recently changed image
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnnotationView {
    pub image_id: Option<i64>,
    pub annotations: Vec<Annotation>,
}
