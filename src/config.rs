use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;

use chrono::Duration;
use serde::Deserialize;

use crate::storage::MediaKind;

/// Application settings, read from `PORTAL_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: usize,
    #[serde(default = "default_video_extensions")]
    pub allowed_video_extensions: Vec<String>,
    #[serde(default = "default_image_extensions")]
    pub allowed_image_extensions: Vec<String>,
    #[serde(default = "default_entitlement_days")]
    pub entitlement_days: u32,
    #[serde(default = "default_recent_activity_limit")]
    pub recent_activity_limit: u32,
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,
    #[serde(default)]
    pub session_secure_cookie: bool,
    #[serde(default = "default_session_idle_minutes")]
    pub session_idle_minutes: i64,
    #[serde(default = "default_reset_token_minutes")]
    pub reset_token_minutes: i64,
    #[serde(default = "default_admin_login")]
    pub default_admin_login: String,
    pub default_admin_password: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            upload_dir: default_upload_dir(),
            max_upload_size: default_max_upload_size(),
            allowed_video_extensions: default_video_extensions(),
            allowed_image_extensions: default_image_extensions(),
            entitlement_days: default_entitlement_days(),
            recent_activity_limit: default_recent_activity_limit(),
            ffprobe_path: default_ffprobe_path(),
            session_secure_cookie: false,
            session_idle_minutes: default_session_idle_minutes(),
            reset_token_minutes: default_reset_token_minutes(),
            default_admin_login: default_admin_login(),
            default_admin_password: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("PORTAL_").from_env()
    }

    pub fn entitlement_duration(&self) -> Duration {
        Duration::days(i64::from(self.entitlement_days))
    }

    pub fn reset_token_ttl(&self) -> Duration {
        Duration::minutes(self.reset_token_minutes)
    }

    /// Checks the file extension against the allow-list for `kind`, ignoring case.
    pub fn is_allowed(&self, kind: MediaKind, file_name: &str) -> bool {
        let Some((_, extension)) = file_name.rsplit_once('.') else {
            return false;
        };
        let allowed = if kind.is_video() {
            &self.allowed_video_extensions
        } else {
            &self.allowed_image_extensions
        };
        allowed
            .iter()
            .any(|a| a.trim_start_matches('.').eq_ignore_ascii_case(extension))
    }
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 8000)
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_max_upload_size() -> usize {
    1000 * 1024 * 1024
}

fn default_video_extensions() -> Vec<String> {
    ["mp4", "avi", "mkv", "mov", "wmv"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_image_extensions() -> Vec<String> {
    ["png", "jpg", "jpeg", "gif"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_entitlement_days() -> u32 {
    30
}

fn default_recent_activity_limit() -> u32 {
    10
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_session_idle_minutes() -> i64 {
    24 * 60
}

fn default_reset_token_minutes() -> i64 {
    30
}

fn default_admin_login() -> String {
    "admin".to_owned()
}
