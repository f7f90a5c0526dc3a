use crate::error::UploaderError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SUFFIX: &str = ".wbmomo";
pub const DEFAULT_WORKERS: usize = 1;

/// Environment variable that relocates the config directory (tests, portable installs)
pub const HOME_ENV: &str = "AUTO_UPLOADER_HOME";

const ENV_DIRECTORY: &str = "AUTO_UPLOADER_DIRECTORY";
const ENV_ENDPOINT: &str = "AUTO_UPLOADER_ENDPOINT";
const ENV_TOKEN: &str = "AUTO_UPLOADER_TOKEN";
const ENV_DESTINATION: &str = "AUTO_UPLOADER_DESTINATION";
const ENV_SUFFIX: &str = "AUTO_UPLOADER_SUFFIX";
const ENV_WORKERS: &str = "AUTO_UPLOADER_WORKERS";

/// Persisted uploader configuration (`~/.auto-uploader/config.json`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploaderConfig {
    #[serde(rename = "directoryPath")]
    pub directory_path: Option<String>,
    #[serde(rename = "endpointUrl")]
    pub endpoint_url: Option<String>,
    #[serde(rename = "authToken")]
    pub auth_token: Option<String>,
    #[serde(rename = "destinationPath")]
    pub destination_path: Option<String>,
    #[serde(default = "default_suffix")]
    pub suffix: String,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(rename = "scanExisting", default)]
    pub scan_existing: bool,
    #[serde(default)]
    pub stability: StabilitySettings,
    #[serde(default)]
    pub transfer: TransferSettings,
}

fn default_suffix() -> String {
    DEFAULT_SUFFIX.to_string()
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            directory_path: None,
            endpoint_url: None,
            auth_token: None,
            destination_path: None,
            suffix: default_suffix(),
            workers: default_workers(),
            scan_existing: false,
            stability: StabilitySettings::default(),
            transfer: TransferSettings::default(),
        }
    }
}

/// Size-sampling parameters for the stability detector
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StabilitySettings {
    #[serde(rename = "intervalMs")]
    pub interval_ms: u64,
    #[serde(rename = "maxAttempts")]
    pub max_attempts: u32,
    #[serde(rename = "fallbackDelayMs")]
    pub fallback_delay_ms: u64,
}

impl Default for StabilitySettings {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            max_attempts: 10,
            fallback_delay_ms: 1000,
        }
    }
}

impl StabilitySettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn fallback_delay(&self) -> Duration {
        Duration::from_millis(self.fallback_delay_ms)
    }
}

/// Network timeouts and retry delay for the upload client
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferSettings {
    #[serde(rename = "connectTimeoutSecs")]
    pub connect_timeout_secs: u64,
    #[serde(rename = "readTimeoutSecs")]
    pub read_timeout_secs: u64,
    #[serde(rename = "retryDelayMs")]
    pub retry_delay_ms: u64,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 15,
            read_timeout_secs: 60,
            retry_delay_ms: 2000,
        }
    }
}

impl TransferSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// What the caller hands to a watch session. Immutable once the session starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    pub directory: PathBuf,
    pub endpoint_url: String,
    pub auth_token: String,
    pub destination_path: Option<String>,
}

impl WatchConfig {
    pub fn new(
        directory: impl Into<PathBuf>,
        endpoint_url: impl Into<String>,
        auth_token: impl Into<String>,
        destination_path: Option<String>,
    ) -> Self {
        Self {
            directory: directory.into(),
            endpoint_url: endpoint_url.into(),
            auth_token: auth_token.into(),
            destination_path,
        }
    }
}

/// Pipeline tuning that travels alongside a `WatchConfig`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchOptions {
    pub suffix: String,
    pub workers: usize,
    pub scan_existing: bool,
    pub stability: StabilitySettings,
    pub transfer: TransferSettings,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            suffix: default_suffix(),
            workers: default_workers(),
            scan_existing: false,
            stability: StabilitySettings::default(),
            transfer: TransferSettings::default(),
        }
    }
}

impl UploaderConfig {
    /// Validate required fields and produce the session config
    pub fn watch_config(&self) -> Result<WatchConfig, UploaderError> {
        let directory = non_blank(&self.directory_path)
            .ok_or_else(|| UploaderError::Validation("No directory configured".to_string()))?;
        let endpoint = non_blank(&self.endpoint_url)
            .ok_or_else(|| UploaderError::Validation("No endpoint URL configured".to_string()))?;
        let token = non_blank(&self.auth_token)
            .ok_or_else(|| UploaderError::Validation("No auth token configured".to_string()))?;

        validate_endpoint_url(&endpoint)?;

        let expanded = shellexpand::tilde(&directory).to_string();

        Ok(WatchConfig {
            directory: PathBuf::from(expanded),
            endpoint_url: endpoint,
            auth_token: token,
            destination_path: non_blank(&self.destination_path),
        })
    }

    pub fn watch_options(&self) -> WatchOptions {
        let suffix = if self.suffix.trim().is_empty() {
            default_suffix()
        } else {
            self.suffix.trim().to_string()
        };

        WatchOptions {
            suffix,
            workers: self.workers.max(1),
            scan_existing: self.scan_existing,
            stability: self.stability,
            transfer: self.transfer,
        }
    }

    /// Apply `AUTO_UPLOADER_*` overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string());

        if let Some(v) = get(ENV_DIRECTORY).filter(|v| !v.is_empty()) {
            self.directory_path = Some(v);
        }
        if let Some(v) = get(ENV_ENDPOINT).filter(|v| !v.is_empty()) {
            self.endpoint_url = Some(v);
        }
        if let Some(v) = get(ENV_TOKEN).filter(|v| !v.is_empty()) {
            self.auth_token = Some(v);
        }
        if let Some(v) = get(ENV_DESTINATION) {
            self.destination_path = Some(v);
        }
        if let Some(v) = get(ENV_SUFFIX).filter(|v| !v.is_empty()) {
            self.suffix = v;
        }
        if let Some(v) = get(ENV_WORKERS) {
            self.workers = v.parse::<usize>().map(|n| n.max(1)).unwrap_or(DEFAULT_WORKERS);
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
}

pub fn validate_endpoint_url(endpoint: &str) -> Result<(), UploaderError> {
    let parsed = url::Url::parse(endpoint)
        .map_err(|e| UploaderError::Validation(format!("Invalid endpoint URL '{}': {}", endpoint, e)))?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(UploaderError::Validation(format!(
            "Unsupported endpoint scheme '{}'",
            other
        ))),
    }
}

pub fn get_config_dir() -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Ok(custom) = std::env::var(HOME_ENV) {
        if !custom.trim().is_empty() {
            return Ok(PathBuf::from(shellexpand::tilde(custom.trim()).to_string()));
        }
    }

    if let Some(home_dir) = dirs::home_dir() {
        Ok(home_dir.join(".auto-uploader"))
    } else {
        Err("Could not find home directory".into())
    }
}

pub fn get_config_file_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
    Ok(get_config_dir()?.join("config.json"))
}

pub fn get_logs_dir() -> Result<PathBuf, Box<dyn std::error::Error>> {
    Ok(get_config_dir()?.join("logs"))
}

fn ensure_private_dir(dir: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;

        // Set permissions to 700 (read/write/execute for owner only) on Unix systems
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = fs::metadata(dir)?;
            let mut permissions = metadata.permissions();
            permissions.set_mode(0o700);
            fs::set_permissions(dir, permissions)?;
        }
    }
    Ok(())
}

pub fn ensure_config_dir() -> Result<(), Box<dyn std::error::Error>> {
    ensure_private_dir(&get_config_dir()?)
}

pub fn ensure_logs_dir() -> Result<(), Box<dyn std::error::Error>> {
    ensure_private_dir(&get_logs_dir()?)
}

pub fn load_config() -> Result<UploaderConfig, Box<dyn std::error::Error>> {
    ensure_config_dir()?;

    let config_file = get_config_file_path()?;

    let mut config = if config_file.exists() {
        let content = fs::read_to_string(config_file)?;
        serde_json::from_str::<UploaderConfig>(&content)?
    } else {
        UploaderConfig::default()
    };

    config.apply_env_overrides();
    Ok(config)
}

pub fn save_config(config: &UploaderConfig) -> Result<(), Box<dyn std::error::Error>> {
    ensure_config_dir()?;

    let config_file = get_config_file_path()?;
    let content = serde_json::to_string_pretty(config)?;

    fs::write(&config_file, content)?;

    // The file holds the auth token: owner read/write only
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = fs::metadata(&config_file)?;
        let mut permissions = metadata.permissions();
        permissions.set_mode(0o600);
        fs::set_permissions(&config_file, permissions)?;
    }

    Ok(())
}

pub fn clear_config() -> Result<(), Box<dyn std::error::Error>> {
    save_config(&UploaderConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn complete_config() -> UploaderConfig {
        UploaderConfig {
            directory_path: Some("/data/in".to_string()),
            endpoint_url: Some("https://upload.example.com/api/files".to_string()),
            auth_token: Some("secret".to_string()),
            ..UploaderConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = UploaderConfig::default();
        assert_eq!(config.suffix, ".wbmomo");
        assert_eq!(config.workers, 1);
        assert!(!config.scan_existing);
        assert_eq!(config.stability.interval(), Duration::from_millis(500));
        assert_eq!(config.stability.max_attempts, 10);
        assert_eq!(config.stability.fallback_delay(), Duration::from_millis(1000));
        assert_eq!(config.transfer.connect_timeout(), Duration::from_secs(15));
        assert_eq!(config.transfer.read_timeout(), Duration::from_secs(60));
        assert_eq!(config.transfer.retry_delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_deserialize_partial_json_uses_defaults() {
        let json = r#"{
            "directoryPath": "/data/in",
            "endpointUrl": "http://localhost:8080/upload",
            "authToken": "abc"
        }"#;
        let config: UploaderConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.directory_path.as_deref(), Some("/data/in"));
        assert_eq!(config.suffix, DEFAULT_SUFFIX);
        assert_eq!(config.workers, DEFAULT_WORKERS);
        assert_eq!(config.destination_path, None);
    }

    #[test]
    fn test_watch_config_requires_fields() {
        let mut config = complete_config();
        config.auth_token = Some("   ".to_string());
        let err = config.watch_config().unwrap_err();
        assert!(err.to_string().contains("auth token"));

        let mut config = complete_config();
        config.endpoint_url = None;
        assert!(config.watch_config().is_err());
    }

    #[test]
    fn test_watch_config_rejects_bad_endpoint() {
        let mut config = complete_config();
        config.endpoint_url = Some("ftp://example.com/drop".to_string());
        assert!(config.watch_config().is_err());

        config.endpoint_url = Some("not a url".to_string());
        assert!(config.watch_config().is_err());
    }

    #[test]
    fn test_watch_config_blank_destination_is_none() {
        let mut config = complete_config();
        config.destination_path = Some("  ".to_string());
        let watch = config.watch_config().unwrap();
        assert_eq!(watch.destination_path, None);
        assert_eq!(watch.directory, PathBuf::from("/data/in"));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("AUTO_UPLOADER_DIRECTORY", " /tmp/drop "),
            ("AUTO_UPLOADER_TOKEN", "tok"),
            ("AUTO_UPLOADER_SUFFIX", ".bin"),
            ("AUTO_UPLOADER_WORKERS", "4"),
        ]);
        let mut config = complete_config();
        config.apply_overrides_from(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.directory_path.as_deref(), Some("/tmp/drop"));
        assert_eq!(config.auth_token.as_deref(), Some("tok"));
        assert_eq!(config.suffix, ".bin");
        assert_eq!(config.workers, 4);
        assert_eq!(
            config.endpoint_url.as_deref(),
            Some("https://upload.example.com/api/files")
        );
    }

    #[test]
    fn test_invalid_worker_override_falls_back() {
        let mut config = complete_config();
        config.workers = 3;
        config.apply_overrides_from(|k| (k == "AUTO_UPLOADER_WORKERS").then(|| "many".to_string()));
        assert_eq!(config.workers, DEFAULT_WORKERS);

        config.apply_overrides_from(|k| (k == "AUTO_UPLOADER_WORKERS").then(|| "0".to_string()));
        assert_eq!(config.workers, 1);
    }

    #[test]
    fn test_watch_options_clamps_workers() {
        let mut config = complete_config();
        config.workers = 0;
        config.suffix = " ".to_string();
        let options = config.watch_options();
        assert_eq!(options.workers, 1);
        assert_eq!(options.suffix, DEFAULT_SUFFIX);
    }
}
