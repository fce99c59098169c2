use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for the video backend
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Maximum video size in bytes (default: 200 MiB)
    pub max_video_size: usize,

    /// Budget for writing the video into staging, in milliseconds (default: 60000)
    pub upload_timeout_ms: u64,

    /// Final directory for videos; staged files live in its `temp` subdirectory
    pub video_dir: PathBuf,

    /// Final directory for thumbnails; staged files live in its `temp` subdirectory
    pub thumbnail_dir: PathBuf,

    /// JWT Secret Key (Required in production)
    pub jwt_secret: String,

    /// JWT lifetime in hours (default: 24)
    pub jwt_ttl_hours: i64,

    /// Base URL used when building activation links
    pub public_base_url: String,

    /// Allowed CORS Origins (comma separated)
    pub allowed_origins: Vec<String>,

    /// Comments a user may post per window (default: 60)
    pub comments_per_window: usize,

    /// Comment rate-limit window in minutes (default: 60)
    pub comment_window_minutes: i64,

    /// Maximum comment length in characters (default: 2000)
    pub max_comment_length: usize,

    /// Failed logins per address before it is blocked (default: 5)
    pub max_login_attempts: u32,

    /// Login block duration in minutes (default: 1)
    pub login_block_minutes: i64,

    /// Activation token lifetime in hours (default: 24)
    pub activation_ttl_hours: i64,

    /// Staged files older than this with no matching record are removed (default: 24)
    pub staging_cleanup_age_hours: u64,

    /// Thumbnails kept in the in-memory read cache (default: 256)
    pub thumbnail_cache_entries: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_video_size: 200 * 1024 * 1024, // 200 MiB
            upload_timeout_ms: 60_000,
            video_dir: PathBuf::from("uploads/videos"),
            thumbnail_dir: PathBuf::from("uploads/thumbnails"),
            jwt_secret: "secret".to_string(),
            jwt_ttl_hours: 24,
            public_base_url: "http://localhost:3000".to_string(),
            allowed_origins: vec![
                "http://localhost:4200".to_string(),
                "http://localhost:5173".to_string(), // Vite default
                "http://127.0.0.1:4200".to_string(),
            ],
            comments_per_window: 60,
            comment_window_minutes: 60,
            max_comment_length: 2000,
            max_login_attempts: 5,
            login_block_minutes: 1,
            activation_ttl_hours: 24,
            staging_cleanup_age_hours: 24,
            thumbnail_cache_entries: 256,
        }
    }
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            max_video_size: parsed("MAX_VIDEO_SIZE", default.max_video_size),
            upload_timeout_ms: parsed("UPLOAD_TIMEOUT_MS", default.upload_timeout_ms),
            video_dir: env::var("VIDEO_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.video_dir),
            thumbnail_dir: env::var("THUMBNAIL_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.thumbnail_dir),
            jwt_secret: env::var("JWT_SECRET").unwrap_or(default.jwt_secret), // strictly enforced in production()
            jwt_ttl_hours: parsed("JWT_TTL_HOURS", default.jwt_ttl_hours),
            public_base_url: env::var("PUBLIC_BASE_URL").unwrap_or(default.public_base_url),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(default.allowed_origins),
            comments_per_window: parsed("COMMENTS_PER_WINDOW", default.comments_per_window),
            comment_window_minutes: parsed(
                "COMMENT_WINDOW_MINUTES",
                default.comment_window_minutes,
            ),
            max_comment_length: parsed("MAX_COMMENT_LENGTH", default.max_comment_length),
            max_login_attempts: parsed("MAX_LOGIN_ATTEMPTS", default.max_login_attempts),
            login_block_minutes: parsed("LOGIN_BLOCK_MINUTES", default.login_block_minutes),
            activation_ttl_hours: parsed("ACTIVATION_TTL_HOURS", default.activation_ttl_hours),
            staging_cleanup_age_hours: parsed(
                "STAGING_CLEANUP_AGE_HOURS",
                default.staging_cleanup_age_hours,
            ),
            thumbnail_cache_entries: parsed(
                "THUMBNAIL_CACHE_ENTRIES",
                default.thumbnail_cache_entries,
            ),
        }
    }

    /// Create config for development (short timeouts are left at defaults, local dirs)
    pub fn development() -> Self {
        Self {
            video_dir: PathBuf::from("dev-uploads/videos"),
            thumbnail_dir: PathBuf::from("dev-uploads/thumbnails"),
            ..Self::default()
        }
    }

    /// Create config for production (strict security)
    pub fn production() -> Self {
        let from_env = Self::from_env();
        Self {
            jwt_secret: env::var("JWT_SECRET").expect("CRITICAL: JWT_SECRET must be set"),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_default(),
            ..from_env
        }
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_timeout_ms)
    }

    pub fn comment_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.comment_window_minutes)
    }

    pub fn login_block(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.login_block_minutes)
    }
}
