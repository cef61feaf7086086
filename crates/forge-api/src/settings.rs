//! Environment-driven configuration (`spec.md` §6.6), loaded the way
//! `ob-poc-web/src/main.rs` reads `DATABASE_URL`/`SERVER_PORT`: a
//! `dotenvy::dotenv()` call at process start, then plain
//! `std::env::var` reads with typed fallbacks. No config-file support.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub artifact_root: String,
    pub render_engine_base_url: String,
    pub render_poll_interval: Duration,
    pub job_max_duration: Duration,
    pub worker_pool_size: usize,
    pub server_port: u16,
    pub thumbnail_max_dim: u32,
    pub cancel_poll_interval: Duration,
    pub worker_health_timeout: Duration,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            database_url: env_or("DATABASE_URL", "postgresql:///forge"),
            artifact_root: env_or("ARTIFACT_ROOT", "./artifacts"),
            render_engine_base_url: env_or("RENDER_ENGINE_BASE_URL", "http://127.0.0.1:8188"),
            render_poll_interval: Duration::from_millis(env_parsed("RENDER_POLL_INTERVAL_MS", 1500)),
            job_max_duration: Duration::from_secs(env_parsed("JOB_MAX_DURATION_SECS", 600)),
            worker_pool_size: env_parsed("WORKER_POOL_SIZE", 4usize),
            server_port: env_parsed("SERVER_PORT", 8080u16),
            thumbnail_max_dim: env_parsed("THUMBNAIL_MAX_DIM", 256u32),
            cancel_poll_interval: Duration::from_millis(env_parsed("CANCEL_POLL_INTERVAL_MS", 1000)),
            worker_health_timeout: Duration::from_secs(1),
        }
    }
}
