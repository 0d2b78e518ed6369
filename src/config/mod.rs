use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default delay, in minutes, for both the per-upload timer and the sweep interval
pub const DEFAULT_DELETE_DELAY_MINUTES: u64 = 30;

/// What happens to a file once it is reclaimed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyMode {
    /// Move into the holding directory; never unlinked by this service
    On,
    /// Unlink permanently
    Off,
}

impl SafetyMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "on" | "true" | "1" | "yes" => Some(Self::On),
            "off" | "false" | "0" | "no" => Some(Self::Off),
            _ => None,
        }
    }
}

/// Upload lifecycle configuration
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Minutes before an unattached upload is reclaimed, also the sweep interval (default: 30)
    pub delete_delay_minutes: u64,

    /// Move reclaimed files aside instead of deleting them (default: on)
    pub safety_mode: SafetyMode,

    /// Directory holding active uploads (default: "public/uploaded")
    pub upload_dir: PathBuf,

    /// Holding area for reclaimed files when safety mode is on (default: "public/reclaimed")
    pub reclaimed_dir: PathBuf,

    /// Prefix of the public path stored on each record, e.g. "https://cdn.example.com"
    pub public_root_path: String,

    /// JWT secret used to validate bearer tokens
    pub jwt_secret: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            delete_delay_minutes: DEFAULT_DELETE_DELAY_MINUTES,
            safety_mode: SafetyMode::On,
            upload_dir: PathBuf::from("public/uploaded"),
            reclaimed_dir: PathBuf::from("public/reclaimed"),
            public_root_path: String::new(),
            jwt_secret: "secret".to_string(),
        }
    }
}

impl UploadConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            delete_delay_minutes: env::var("UPLOAD_DELETE_DELAY_MINUTES")
                .ok()
                .map(|v| parse_delay_minutes(&v))
                .unwrap_or(default.delete_delay_minutes),

            safety_mode: env::var("UPLOAD_SAFETY_MODE")
                .ok()
                .map(|v| {
                    SafetyMode::parse(&v).unwrap_or_else(|| {
                        tracing::warn!("Unrecognised UPLOAD_SAFETY_MODE '{}', keeping it on", v);
                        SafetyMode::On
                    })
                })
                .unwrap_or(default.safety_mode),

            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.upload_dir),

            reclaimed_dir: env::var("RECLAIMED_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.reclaimed_dir),

            public_root_path: env::var("PUBLIC_ROOT_PATH")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(default.public_root_path),

            jwt_secret: env::var("JWT_SECRET").unwrap_or(default.jwt_secret),
        }
    }

    /// Create config for development (local directories, soft deletion)
    pub fn development() -> Self {
        Self {
            public_root_path: "http://localhost:3000".to_string(),
            ..Self::default()
        }
    }

    pub fn delete_delay(&self) -> Duration {
        Duration::from_secs(self.delete_delay_minutes.saturating_mul(60))
    }

    /// Public path stored on the record for a file saved under `file_name`
    pub fn public_path(&self, file_name: &str) -> String {
        format!("{}/uploaded/{}", self.public_root_path, file_name)
    }
}

fn parse_delay_minutes(value: &str) -> u64 {
    match value.trim().parse::<u64>() {
        Ok(minutes) if minutes >= 1 => minutes,
        _ => {
            tracing::warn!(
                "Invalid UPLOAD_DELETE_DELAY_MINUTES '{}', using {} minutes",
                value,
                DEFAULT_DELETE_DELAY_MINUTES
            );
            DEFAULT_DELETE_DELAY_MINUTES
        }
    }
}
