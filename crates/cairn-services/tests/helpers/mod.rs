#![allow(dead_code)]

pub mod fixtures;

use cairn_core::{Config, StoreConfig};
use cairn_db::InMemoryFileRepository;
use cairn_processing::ThumbnailGenerator;
use cairn_services::FileStore;
use std::sync::Arc;

/// Store over a fresh in-memory repository.
pub struct TestStore {
    pub store: Arc<FileStore>,
    pub repo: InMemoryFileRepository,
}

pub fn test_config() -> StoreConfig {
    StoreConfig {
        upload_concurrency: 8,
        bulk_upload_concurrency: 3,
        thumbnail_max_dimension: 32,
        public_base_url: "https://files.test".to_string(),
        ..StoreConfig::default()
    }
}

pub fn setup_store() -> TestStore {
    setup_store_with(test_config())
}

pub fn setup_store_with(config: StoreConfig) -> TestStore {
    let repo = InMemoryFileRepository::new();
    let store = FileStore::new(Config::new(config), Arc::new(repo.clone()))
        .expect("store should build");
    TestStore {
        store: Arc::new(store),
        repo,
    }
}

/// Store whose image post-processing goes through `thumbnailer`.
pub fn setup_store_with_thumbnailer(thumbnailer: Arc<dyn ThumbnailGenerator>) -> TestStore {
    let repo = InMemoryFileRepository::new();
    let store = FileStore::new(Config::new(test_config()), Arc::new(repo.clone()))
        .expect("store should build")
        .with_thumbnailer(Some(thumbnailer));
    TestStore {
        store: Arc::new(store),
        repo,
    }
}
