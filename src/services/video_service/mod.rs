use crate::config::AppConfig;
use crate::services::storage::StorageService;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

pub mod counters;
pub mod query;
pub mod types;
pub mod upload;

pub use types::{UploadPart, UploadRequest, VideoWithTags};

pub struct VideoService {
    db: DatabaseConnection,
    storage: Arc<dyn StorageService>,
    config: AppConfig,
}

impl VideoService {
    pub fn new(db: DatabaseConnection, storage: Arc<dyn StorageService>, config: AppConfig) -> Self {
        Self {
            db,
            storage,
            config,
        }
    }

    pub fn storage(&self) -> &Arc<dyn StorageService> {
        &self.storage
    }
}
