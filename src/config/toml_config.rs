use crate::utils::error::{GatewayError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const DEFAULT_DELIMITER: u8 = b'|';

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub audit: AuditConfig,
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

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default)]
    pub entry_record_delimiter: String,
    #[serde(default)]
    pub ip_validation_enabled: bool,
    #[serde(default = "default_true")]
    pub data_validation_enabled: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            entry_record_delimiter: String::new(),
            ip_validation_enabled: false,
            data_validation_enabled: true,
        }
    }
}

impl WebConfig {
    /// 空字串時退回預設的 `|`
    pub fn delimiter(&self) -> u8 {
        match self.entry_record_delimiter.as_bytes() {
            [byte] => *byte,
            _ => DEFAULT_DELIMITER,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_request_url")]
    pub request_url: String,
    #[serde(default = "default_request_fields")]
    pub request_fields: Vec<String>,
    #[serde(default)]
    pub blocked_countries: HashSet<String>,
    #[serde(default)]
    pub blocked_providers: Vec<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            request_url: default_request_url(),
            request_fields: default_request_fields(),
            blocked_countries: HashSet::new(),
            blocked_providers: Vec::new(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_request_url() -> String {
    "http://ip-api.com/json".to_string()
}

fn default_request_fields() -> Vec<String> {
    ["status", "message", "countryCode", "isp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditBackend {
    /// 只在行程內保存，重啟即遺失
    Memory,
    #[default]
    Jsonl,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default)]
    pub backend: AuditBackend,
    #[serde(default = "default_audit_path")]
    pub path: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            backend: AuditBackend::default(),
            path: default_audit_path(),
        }
    }
}

fn default_audit_path() -> PathBuf {
    PathBuf::from("./audit/requests.jsonl")
}

impl GatewayConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(GatewayError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| GatewayError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${GEO_API_URL})，未設定的保留原文
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| GatewayError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("server.host", &self.server.host)?;
        validation::validate_positive_number("server.port", self.server.port as usize, 1)?;

        validation::validate_delimiter(
            "web.entry_record_delimiter",
            &self.web.entry_record_delimiter,
        )?;

        validation::validate_url("validation.request_url", &self.validation.request_url)?;
        for field in &self.validation.request_fields {
            validation::validate_non_empty_string("validation.request_fields", field)?;
        }
        validation::validate_range("validation.timeout_ms", self.validation.timeout_ms, 1, 60_000)?;

        if self.audit.backend == AuditBackend::Jsonl {
            let path = self.audit.path.to_string_lossy();
            validation::validate_path("audit.path", &path)?;
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Validate for GatewayConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
