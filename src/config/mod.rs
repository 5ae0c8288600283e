pub mod handle;
pub mod toml_config;

pub use handle::ConfigHandle;
pub use toml_config::{AuditBackend, GatewayConfig, ValidationConfig, WebConfig};

#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "entry-gate")]
#[command(about = "Converts delimited entry documents to JSON behind an IP reputation gate")]
pub struct CliConfig {
    /// Path to TOML configuration file
    #[arg(short, long, env = "ENTRY_GATE_CONFIG", default_value = "entry-gate.toml")]
    pub config: PathBuf,

    /// Override server.host from config
    #[arg(long)]
    pub host: Option<String>,

    /// Override server.port from config
    #[arg(long)]
    pub port: Option<u16>,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub log_json: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    /// 預設路徑的檔案不存在時使用內建預設值
    pub fn load(&self) -> crate::utils::error::Result<GatewayConfig> {
        let mut config = if self.config.exists() {
            GatewayConfig::from_file(&self.config)?
        } else if self.config == PathBuf::from("entry-gate.toml") {
            tracing::warn!("No entry-gate.toml found, using built-in defaults");
            GatewayConfig::default()
        } else {
            return Err(crate::utils::error::GatewayError::MissingConfigError {
                field: self.config.display().to_string(),
            });
        };

        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }

        Ok(config)
    }
}
