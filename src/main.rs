use env_logger::Env;
use log::{error, info, warn};
use std::process::ExitCode;

use photo_gallery::{
    AnnotationStorage, AnnotationStore, CollectionStore, Gallery, GalleryConfig,
    HttpImageSource, Intent, MemoryStorage, SqliteStorage,
};

/// Composition root: build the stores once, hand them to the gallery,
/// and report what the initial load produced.
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = match GalleryConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let source = match HttpImageSource::new(&config.api_base, config.policy.timeout) {
        Ok(source) => source,
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };
    info!("Image API: {}", config.api_base);
    let collection = CollectionStore::new(source, config.policy);

    // Annotations are optional; without a database they just don't persist
    match SqliteStorage::open(&config.db_path) {
        Ok(storage) => run(Gallery::new(collection, AnnotationStore::new(storage))).await,
        Err(err) => {
            warn!("Annotations will not be saved: {err}");
            let annotations = AnnotationStore::new(MemoryStorage::new());
            run(Gallery::new(collection, annotations)).await
        }
    }
}

async fn run<P: AnnotationStorage>(gallery: Gallery<HttpImageSource, P>) -> ExitCode {
    if let Err(err) = gallery.dispatch(Intent::Refresh).await {
        error!("Could not load images: {err}");
        return ExitCode::FAILURE;
    }

    let state = gallery.state();
    info!("Ready. {} images in gallery.", state.items.len());
    for image in &state.items {
        println!("{:>6}  {}  {}", image.id, image.title, image.url);
    }

    ExitCode::SUCCESS
}
