use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://simplegon-desktop.local:8080";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    pub api_url: String,
    pub timeout_secs: u64,
    pub with_credentials: bool,
    pub session_db: PathBuf,
    pub retry_attempts: u32,
    pub retry_base_ms: u64,
    pub device_poll_secs: u64,
    pub job_poll_secs: u64,
    pub notification_poll_secs: u64,
    pub water_poll_secs: u64,
    #[serde(default, skip_serializing)]
    pub login_email: Option<String>,
    #[serde(default, skip_serializing)]
    pub login_password: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_url: DEFAULT_API_URL.to_string(),
            timeout_secs: 30,
            with_credentials: true,
            session_db: PathBuf::from("./aman_session.db"),
            retry_attempts: 3,
            retry_base_ms: 200,
            device_poll_secs: 5,
            job_poll_secs: 5,
            notification_poll_secs: 10,
            water_poll_secs: 30,
            login_email: None,
            login_password: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        let api_url = env::var("AMAN_API_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_url);
        let session_db = env::var("AMAN_SESSION_DB")
            .map(PathBuf::from)
            .unwrap_or(defaults.session_db);

        Ok(Config {
            api_url,
            timeout_secs: get_env_var("AMAN_TIMEOUT_SECS", defaults.timeout_secs).max(1),
            with_credentials: get_env_var_bool("AMAN_WITH_CREDENTIALS", defaults.with_credentials),
            session_db,
            retry_attempts: get_env_var("AMAN_RETRY_ATTEMPTS", defaults.retry_attempts).max(1),
            retry_base_ms: get_env_var("AMAN_RETRY_BASE_MS", defaults.retry_base_ms),
            device_poll_secs: get_env_var("AMAN_DEVICE_POLL_SECS", defaults.device_poll_secs).max(1),
            job_poll_secs: get_env_var("AMAN_JOB_POLL_SECS", defaults.job_poll_secs).max(1),
            notification_poll_secs: get_env_var(
                "AMAN_NOTIFICATION_POLL_SECS",
                defaults.notification_poll_secs,
            )
            .max(1),
            water_poll_secs: get_env_var("AMAN_WATER_POLL_SECS", defaults.water_poll_secs).max(1),
            login_email: env::var("AMAN_EMAIL").ok(),
            login_password: env::var("AMAN_PASSWORD").ok(),
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn get_config_file_path() -> PathBuf {
        let config_dir = env::var("CONFIG_DIR").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(config_dir).join("aman_config.json")
    }

    pub fn load_from_file() -> Result<Self> {
        Self::load_from(&Self::get_config_file_path())
    }

    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Credentials are never written out.
    pub fn save_to_file(&self) -> Result<()> {
        self.save_to(&Self::get_config_file_path())
    }

    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        let mut file = fs::File::create(path)?;
        file.write_all(contents.as_bytes())?;
        Ok(())
    }
}

/// Unset or unparseable values (including ones out of range for `T`) fall
/// back to `default`.
fn get_env_var<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|val| val.trim().parse().ok())
        .unwrap_or(default)
}

fn get_env_var_bool(key: &str, default: bool) -> bool {
    match env::var(key).ok().as_deref().map(str::trim) {
        Some("1") | Some("true") | Some("yes") => true,
        Some("0") | Some("false") | Some("no") => false,
        _ => default,
    }
}
