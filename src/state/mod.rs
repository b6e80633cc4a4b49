/// State management module
///
/// This module handles all application state, including:
/// - The remote image list and optimistic deletes (collection.rs)
/// - Per-image annotation overlays (annotations.rs)
/// - Shared data structures (data.rs)

pub mod annotations;
pub mod collection;
pub mod data;

pub use annotations::AnnotationStore;
pub use collection::{CollectionStore, MutationPhase};
pub use data::{Annotation, AnnotationView, CollectionState, ImageRecord, LoadStatus};
