use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub public_dir: String,
    pub progress_step: u8,
    pub progress_interval: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        let progress_step = env::var("DROPLINE_PROGRESS_STEP")
            .ok()
            .and_then(|val| val.parse().ok())
            .filter(|step| *step > 0)
            .unwrap_or(10);
        let progress_interval_ms = env::var("DROPLINE_PROGRESS_INTERVAL_MS")
            .ok()
            .and_then(|val| val.parse().ok())
            .unwrap_or(300);

        Self {
            port: env::var("DROPLINE_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            public_dir: env::var("DROPLINE_PUBLIC_DIR").unwrap_or_else(|_| "public".to_string()),
            progress_step,
            progress_interval: Duration::from_millis(progress_interval_ms),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            public_dir: "public".to_string(),
            progress_step: 10,
            progress_interval: Duration::from_millis(300),
        }
    }
}
