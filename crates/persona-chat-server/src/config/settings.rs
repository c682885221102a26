use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// Where uploaded artifacts (and their normalized text) land
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// One JSON history file per session
    #[serde(default = "default_history_dir")]
    pub history_dir: PathBuf,
    /// Bundled sample used by `/run_demo`
    #[serde(default = "default_demo_path")]
    pub demo_path: PathBuf,
    #[serde(default)]
    pub purge_on_startup: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct UploadConfig {
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IngestionConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
    #[serde(default = "default_max_pdf_pages")]
    pub max_pdf_pages: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DispatcherConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GeminiConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
    #[serde(default = "default_detection_model")]
    pub detection_model: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("data/uploads")
}

fn default_history_dir() -> PathBuf {
    PathBuf::from("data/chat_history")
}

fn default_demo_path() -> PathBuf {
    PathBuf::from("assets/demo/demo.pdf")
}

fn default_max_bytes() -> usize {
    70 * 1024 * 1024 // 70 MiB
}

fn default_allowed_extensions() -> Vec<String> {
    ["txt", "pdf", "doc", "docx", "json", "zip"]
        .iter()
        .map(|e| e.to_string())
        .collect()
}

fn default_max_attempts() -> u32 {
    2
}

fn default_attempt_timeout_secs() -> u64 {
    60
}

fn default_max_pdf_pages() -> usize {
    10
}

fn default_workers() -> usize {
    8
}

fn default_queue_capacity() -> usize {
    64
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_detection_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_chat_model() -> String {
    "gemini-1.5-pro".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            history_dir: default_history_dir(),
            demo_path: default_demo_path(),
            purge_on_startup: false,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
            max_pdf_pages: default_max_pdf_pages(),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_gemini_base_url(),
            detection_model: default_detection_model(),
            chat_model: default_chat_model(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl IngestionConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }
}

impl UploadConfig {
    pub fn is_allowed(&self, extension: &str) -> bool {
        let extension = extension.to_lowercase();
        self.allowed_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&extension))
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut settings = Self::from_sources(Self::environment())?;

        if settings.gemini.api_key.is_empty() {
            if let Ok(key) = std::env::var("GOOGLE_AI_API_KEY") {
                settings.gemini.api_key = key;
            }
        }

        settings.validate()?;
        Ok(settings)
    }

    /// `APP_<SECTION>__<KEY>`, e.g. `APP_GEMINI__API_KEY`
    fn environment() -> Environment {
        Environment::with_prefix("APP")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn from_sources(environment: Environment) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name("config/settings").required(false))
            .add_source(environment)
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dispatcher.workers == 0 {
            anyhow::bail!("dispatcher.workers must be at least 1");
        }

        if self.dispatcher.queue_capacity == 0 {
            anyhow::bail!("dispatcher.queue_capacity must be at least 1");
        }

        if self.ingestion.max_attempts == 0 {
            anyhow::bail!("ingestion.max_attempts must be at least 1");
        }

        if self.upload.allowed_extensions.is_empty() {
            anyhow::bail!("upload.allowed_extensions must not be empty");
        }

        Ok(())
    }

    pub fn require_api_key(&self) -> Result<()> {
        if self.gemini.api_key.trim().is_empty() {
            anyhow::bail!(
                "Gemini API key missing: set APP_GEMINI__API_KEY or GOOGLE_AI_API_KEY"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_limits() {
        let settings = Settings::default();

        assert_eq!(settings.upload.max_bytes, 70 * 1024 * 1024);
        assert_eq!(settings.ingestion.max_attempts, 2);
        assert_eq!(settings.ingestion.attempt_timeout(), Duration::from_secs(60));
        assert_eq!(settings.ingestion.max_pdf_pages, 10);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_extension_allow_list_is_case_insensitive() {
        let upload = UploadConfig::default();

        assert!(upload.is_allowed("PDF"));
        assert!(upload.is_allowed("zip"));
        assert!(!upload.is_allowed("exe"));
    }

    #[test]
    fn test_validate_rejects_empty_pool() {
        let mut settings = Settings::default();
        settings.dispatcher.workers = 0;

        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_env_overrides_use_single_underscore_prefix() {
        let mut vars = config::Map::new();
        vars.insert("APP_GEMINI__API_KEY".to_string(), "from-env".to_string());
        vars.insert("APP_SERVER__PORT".to_string(), "9191".to_string());
        vars.insert("APP_DISPATCHER__WORKERS".to_string(), "3".to_string());

        let settings = Settings::from_sources(Settings::environment().source(Some(vars))).unwrap();

        assert_eq!(settings.gemini.api_key, "from-env");
        assert_eq!(settings.server.port, 9191);
        assert_eq!(settings.dispatcher.workers, 3);
        assert!(settings.require_api_key().is_ok());
    }

    #[test]
    fn test_missing_api_key_is_reported() {
        let settings = Settings::default();
        assert!(settings.require_api_key().is_err());
    }
}
