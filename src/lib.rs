//! Image gallery state
//!
//! Two independent stores behind a small intent dispatcher:
//! - `CollectionStore` caches the remote image list and deletes optimistically
//! - `AnnotationStore` keeps rectangular annotations per image, written
//!   through to durable storage

pub mod config;
pub mod error;
pub mod gallery;
pub mod remote;
pub mod state;
pub mod storage;

pub use config::{GalleryConfig, RequestPolicy};
pub use error::GalleryError;
pub use gallery::{Gallery, Intent};
pub use remote::{HttpImageSource, ImageSource};
pub use state::{
    Annotation, AnnotationStore, AnnotationView, CollectionState, CollectionStore, ImageRecord,
    LoadStatus,
};
pub use storage::{AnnotationStorage, MemoryStorage, SqliteStorage};
