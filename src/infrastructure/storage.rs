use crate::config::AppConfig;
use crate::services::storage::LocalStorageService;
use std::sync::Arc;
use tracing::info;

pub async fn setup_storage(config: &AppConfig) -> anyhow::Result<Arc<LocalStorageService>> {
    info!(
        "💾 Local Storage: videos={} thumbnails={}",
        config.video_dir.display(),
        config.thumbnail_dir.display()
    );

    let storage = LocalStorageService::new(&config.video_dir, &config.thumbnail_dir);
    storage.ensure_directories().await?;

    info!("✅ Upload directories are ready");

    Ok(Arc::new(storage))
}
