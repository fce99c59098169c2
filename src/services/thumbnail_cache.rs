use crate::api::error::AppError;
use crate::services::storage::{MediaKind, StorageService};
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Thumbnail {
    pub data: Bytes,
    pub content_type: String,
}

#[derive(Debug, Clone)]
struct CachedThumbnail {
    thumbnail: Thumbnail,
    inserted_at: Instant,
}

/// Read-through cache for thumbnail bytes. Stored names are never reused, so
/// entries only leave through eviction.
#[derive(Clone)]
pub struct ThumbnailCache {
    store: Arc<DashMap<String, CachedThumbnail>>,
    max_entries: usize,
}

impl ThumbnailCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            store: Arc::new(DashMap::new()),
            max_entries,
        }
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<Thumbnail> {
        self.store.get(name).map(|entry| entry.thumbnail.clone())
    }

    pub fn insert(&self, name: String, thumbnail: Thumbnail) {
        if self.max_entries == 0 {
            return;
        }
        while self.store.len() >= self.max_entries && !self.store.contains_key(&name) {
            self.evict_oldest();
        }
        self.store.insert(
            name,
            CachedThumbnail {
                thumbnail,
                inserted_at: Instant::now(),
            },
        );
    }

    fn evict_oldest(&self) {
        let oldest = self
            .store
            .iter()
            .min_by_key(|entry| entry.inserted_at)
            .map(|entry| entry.key().clone());

        if let Some(key) = oldest {
            self.store.remove(&key);
            debug!(thumbnail = %key, "Thumbnail cache EVICT");
        }
    }

    /// Returns the cached thumbnail or reads it from storage.
    pub async fn load(
        &self,
        storage: &dyn StorageService,
        name: &str,
    ) -> Result<Thumbnail, AppError> {
        if let Some(hit) = self.get(name) {
            return Ok(hit);
        }

        let path = storage
            .resolve(MediaKind::Thumbnail, name)
            .map_err(|_| AppError::BadRequest("Invalid filename".to_string()))?;

        let data = match tokio::fs::read(&path).await {
            Ok(data) => Bytes::from(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::NotFound("Thumbnail not found".to_string()));
            }
            Err(e) => return Err(AppError::Internal(format!("Failed to read thumbnail: {}", e))),
        };

        let content_type = infer::get(&data)
            .map(|kind| kind.mime_type().to_string())
            .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string());

        let thumbnail = Thumbnail { data, content_type };
        self.insert(name.to_string(), thumbnail.clone());
        Ok(thumbnail)
    }
}
