pub mod comment_rate_limiter;
pub mod comment_service;
pub mod login_guard;
pub mod storage;
pub mod thumbnail_cache;
pub mod upload_commit;
pub mod user_service;
pub mod video_service;
pub mod worker;
