use std::fs;

use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "app_config.toml";

/// Where host commands come from and reports go to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostLinkKind {
    /// Newline-delimited JSON on stdin/stdout.
    Stdio,
    /// No host: run the define phase, print the definitions and return.
    None,
}

/// `[bridge]` section of `app_config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// Warnings kept per collect pass; later ones are logged and dropped.
    pub max_warnings: usize,
    /// Longest warning message in bytes; longer ones are truncated.
    pub max_warning_len: usize,
    pub host_link: HostLinkKind,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        BridgeSettings {
            max_warnings: 40,
            max_warning_len: 256,
            host_link: HostLinkKind::Stdio,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SettingsWrapper {
    #[serde(default)]
    bridge: BridgeSettings,
}

impl BridgeSettings {
    /// A missing file yields the defaults.
    pub fn from_file(file_path: &str) -> Result<Self, String> {
        match fs::read_to_string(file_path) {
            Ok(content) => Self::from_toml_str(&content),
            Err(e) => {
                eprintln!("Warning: Could not read config file '{}': {}. Using defaults.", file_path, e);
                Ok(BridgeSettings::default())
            }
        }
    }

    pub fn from_toml_str(config_str: &str) -> Result<Self, String> {
        toml::from_str::<SettingsWrapper>(config_str)
            .map(|wrapper| wrapper.bridge)
            .map_err(|e| format!("Failed to parse config file: {}", e))
    }
}
