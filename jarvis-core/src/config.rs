// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Every section has defaults so a bare environment is enough to start
use crate::paths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub user: UserConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub phone_number_id: String,
    #[serde(default)]
    pub verify_token: String,
    /// Meta app secret; webhook signatures are only checked when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_secret: Option<String>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

// Custom Debug impl to redact sensitive fields
impl std::fmt::Debug for WhatsAppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhatsAppConfig")
            .field("access_token", &redact(&self.access_token))
            .field("phone_number_id", &self.phone_number_id)
            .field("verify_token", &redact(&self.verify_token))
            .field("app_secret", &self.app_secret.as_ref().map(|_| "[REDACTED]"))
            .field("api_version", &self.api_version)
            .finish()
    }
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            phone_number_id: String::new(),
            verify_token: String::new(),
            app_secret: None,
            api_version: default_api_version(),
        }
    }
}

impl WhatsAppConfig {
    /// Sending and downloading need a token and a phone number id
    pub fn require_credentials(&self) -> Result<()> {
        if self.access_token.trim().is_empty() {
            anyhow::bail!(
                "whatsapp.access_token is required (set in config.toml or WHATSAPP_ACCESS_TOKEN env var)"
            );
        }
        if self.phone_number_id.trim().is_empty() {
            anyhow::bail!(
                "whatsapp.phone_number_id is required (set in config.toml or WHATSAPP_PHONE_NUMBER_ID env var)"
            );
        }
        Ok(())
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,
}

// Custom Debug impl to redact api_key
impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("transcription_model", &self.transcription_model)
            .finish()
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            transcription_model: default_transcription_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Path to the claude binary; discovered when unset
    pub binary: Option<String>,
    /// Project directory the agent works in
    #[serde(default = "default_working_dir")]
    pub working_dir: String,
    /// Chat platform named in every prompt
    #[serde(default = "default_platform")]
    pub platform: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            binary: None,
            working_dir: default_working_dir(),
            platform: default_platform(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Overrides the XDG data directory
    pub data_dir: Option<String>,
    /// Archived messages older than this are pruned at startup
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            retention_days: default_retention_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    /// Owner's phone number; recipient of scheduled tasks and check-ins
    pub phone_number: Option<String>,
    /// IANA timezone used for prompts and queued-message timestamps
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            phone_number: None,
            timezone: default_timezone(),
        }
    }
}

fn default_api_version() -> String {
    "v21.0".to_string()
}

fn default_transcription_model() -> String {
    "gpt-4o-transcribe".to_string()
}

fn default_working_dir() -> String {
    ".".to_string()
}

fn default_platform() -> String {
    "WhatsApp".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_retention_days() -> u32 {
    90
}

fn default_timezone() -> String {
    "Europe/Vienna".to_string()
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() {
        ""
    } else {
        "[REDACTED]"
    }
}

/// Expand tilde (~) to home directory in paths
fn expand_tilde(path: &str) -> String {
    let home = || directories::BaseDirs::new().map(|b| b.home_dir().to_path_buf());
    if let Some(stripped) = path.strip_prefix("~/") {
        match home() {
            Some(dir) => return dir.join(stripped).to_string_lossy().to_string(),
            None => tracing::warn!(
                path = %path,
                "Failed to expand tilde in path: could not determine home directory"
            ),
        }
    } else if path == "~" {
        if let Some(dir) = home() {
            return dir.to_string_lossy().to_string();
        }
    }
    path.to_string()
}

impl Config {
    /// Find the config file, checking multiple locations in order:
    /// 1. JARVIS_CONFIG_PATH env var (if set)
    /// 2. ./config.toml (current directory - for development)
    /// 3. ~/.config/jarvis/config.toml (XDG config dir)
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var("JARVIS_CONFIG_PATH") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
        }

        let local_config = PathBuf::from("config.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        let xdg_config = paths::config_file();
        if xdg_config.exists() {
            return Some(xdg_config);
        }

        None
    }

    /// Load configuration from config.toml with environment variable overrides
    pub fn load() -> Result<Self> {
        let mut config = if let Some(config_path) = Self::find_config_file() {
            tracing::info!(
                path = %config_path.display(),
                "Loading configuration from file"
            );
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            toml::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?
        } else {
            tracing::info!("No config file found, using environment variables and defaults");
            Config::default()
        };

        config.apply_env_overrides()?;

        config.agent.working_dir = expand_tilde(&config.agent.working_dir);
        if let Some(dir) = config.storage.data_dir.take() {
            config.storage.data_dir = Some(expand_tilde(&dir));
        }

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("WHATSAPP_ACCESS_TOKEN") {
            self.whatsapp.access_token = val;
        }
        if let Ok(val) = std::env::var("WHATSAPP_PHONE_NUMBER_ID") {
            self.whatsapp.phone_number_id = val;
        }
        if let Ok(val) = std::env::var("WHATSAPP_VERIFY_TOKEN") {
            self.whatsapp.verify_token = val;
        }
        if let Ok(val) = std::env::var("WHATSAPP_APP_SECRET") {
            self.whatsapp.app_secret = Some(val).filter(|s| !s.is_empty());
        }
        if let Ok(val) = std::env::var("OPENAI_API_KEY") {
            self.openai.api_key = Some(val).filter(|s| !s.is_empty());
        }
        if let Ok(val) = std::env::var("CLAUDE_PATH") {
            self.agent.binary = Some(val).filter(|s| !s.is_empty());
        }
        if let Ok(val) = std::env::var("USER_PHONE_NUMBER") {
            self.user.phone_number = Some(val).filter(|s| !s.is_empty());
        }
        if let Ok(val) = std::env::var("JARVIS_TIMEZONE") {
            self.user.timezone = val;
        }
        if let Ok(val) = std::env::var("JARVIS_DATA_DIR") {
            self.storage.data_dir = Some(val);
        }
        if let Ok(val) = std::env::var("HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("PORT") {
            self.server.port = val
                .parse()
                .with_context(|| format!("PORT must be a valid port number, got: {}", val))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.user.timezone.parse::<chrono_tz::Tz>().is_err() {
            anyhow::bail!(
                "Invalid timezone '{}'. Use IANA timezone names like 'Europe/Vienna', 'America/Chicago', 'UTC'",
                self.user.timezone
            );
        }
        if self.server.port == 0 {
            anyhow::bail!("server.port must be non-zero");
        }
        if self.storage.retention_days == 0 {
            anyhow::bail!("storage.retention_days must be at least 1");
        }
        Ok(())
    }

    /// Reference timezone; `validate` guarantees it parses
    pub fn timezone(&self) -> Result<chrono_tz::Tz> {
        self.user
            .timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|e| anyhow::anyhow!("Invalid timezone '{}': {}", self.user.timezone, e))
    }

    pub fn data_dir(&self) -> PathBuf {
        self.storage
            .data_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(paths::data_dir)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.storage.retention_days))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.whatsapp.api_version, "v21.0");
        assert_eq!(config.openai.transcription_model, "gpt-4o-transcribe");
        assert_eq!(config.user.timezone, "Europe/Vienna");
        assert_eq!(config.storage.retention_days, 90);
        assert_eq!(config.agent.platform, "WhatsApp");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config: Config = toml::from_str(
            r#"
                [whatsapp]
                access_token = "tok"
                phone_number_id = "123"

                [server]
                port = 9000
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.whatsapp.api_version, "v21.0");
        assert!(config.whatsapp.require_credentials().is_ok());
    }

    #[test]
    fn test_missing_credentials_are_reported() {
        let config = Config::default();
        let err = config.whatsapp.require_credentials().unwrap_err();
        assert!(err.to_string().contains("access_token"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = WhatsAppConfig {
            access_token: "EAAG-secret".to_string(),
            verify_token: "verify-me".to_string(),
            app_secret: Some("app-secret".to_string()),
            ..WhatsAppConfig::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("EAAG-secret"));
        assert!(!debug.contains("verify-me"));
        assert!(!debug.contains("app-secret"));
        assert!(debug.contains("[REDACTED]"));

        let openai = OpenAiConfig {
            api_key: Some("sk-live".to_string()),
            ..OpenAiConfig::default()
        };
        assert!(!format!("{:?}", openai).contains("sk-live"));
    }

    #[test]
    fn test_invalid_timezone_fails_validation() {
        let mut config = Config::default();
        config.user.timezone = "Mars/Olympus".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Mars/Olympus"));
    }

    #[test]
    fn test_data_dir_override() {
        let mut config = Config::default();
        config.storage.data_dir = Some("/srv/jarvis".to_string());
        assert_eq!(config.data_dir(), PathBuf::from("/srv/jarvis"));
        assert_eq!(config.retention(), chrono::Duration::days(90));
    }

    #[test]
    fn test_expand_tilde_leaves_absolute_paths() {
        assert_eq!(expand_tilde("/opt/jarvis"), "/opt/jarvis");
    }

    /// Clear every variable `Config::load` reads
    fn clear_config_env_vars() {
        for key in [
            "JARVIS_CONFIG_PATH",
            "WHATSAPP_ACCESS_TOKEN",
            "WHATSAPP_PHONE_NUMBER_ID",
            "WHATSAPP_VERIFY_TOKEN",
            "WHATSAPP_APP_SECRET",
            "OPENAI_API_KEY",
            "CLAUDE_PATH",
            "USER_PHONE_NUMBER",
            "JARVIS_TIMEZONE",
            "JARVIS_DATA_DIR",
            "HOST",
            "PORT",
        ] {
            std::env::remove_var(key);
        }
    }

    /// Write a config file and point `JARVIS_CONFIG_PATH` at it
    fn setup_config(contents: &str) -> tempfile::TempDir {
        let tmpdir = tempfile::tempdir().unwrap();
        let path = tmpdir.path().join("config.toml");
        std::fs::write(&path, contents).unwrap();
        std::env::set_var("JARVIS_CONFIG_PATH", &path);
        tmpdir
    }

    const FILE_CONFIG: &str = r#"
        [whatsapp]
        access_token = "from-file"
        phone_number_id = "123"

        [server]
        port = 9000
    "#;

    #[test]
    #[serial]
    fn test_load_reads_file_values() {
        clear_config_env_vars();
        let _dir = setup_config(FILE_CONFIG);

        let config = Config::load().unwrap();
        assert_eq!(config.whatsapp.access_token, "from-file");
        assert_eq!(config.whatsapp.phone_number_id, "123");
        assert_eq!(config.server.port, 9000);
        assert!(config.whatsapp.app_secret.is_none());

        clear_config_env_vars();
    }

    #[test]
    #[serial]
    fn test_env_overrides_file_values() {
        clear_config_env_vars();
        let _dir = setup_config(FILE_CONFIG);
        std::env::set_var("WHATSAPP_ACCESS_TOKEN", "from-env");
        std::env::set_var("WHATSAPP_APP_SECRET", "shh");
        std::env::set_var("PORT", "9100");

        let config = Config::load().unwrap();
        assert_eq!(config.whatsapp.access_token, "from-env");
        assert_eq!(config.whatsapp.phone_number_id, "123");
        assert_eq!(config.whatsapp.app_secret.as_deref(), Some("shh"));
        assert_eq!(config.server.port, 9100);

        clear_config_env_vars();
    }

    #[test]
    #[serial]
    fn test_unparseable_port_is_a_load_error() {
        clear_config_env_vars();
        let _dir = setup_config(FILE_CONFIG);
        std::env::set_var("PORT", "not-a-port");

        let err = Config::load().unwrap_err();
        assert!(err.to_string().contains("PORT"));

        clear_config_env_vars();
    }

    #[test]
    #[serial]
    fn test_unknown_timezone_is_a_load_error() {
        clear_config_env_vars();
        let _dir = setup_config(FILE_CONFIG);
        std::env::set_var("JARVIS_TIMEZONE", "Nowhere/Special");

        assert!(Config::load().is_err());

        clear_config_env_vars();
    }
}
