/*
 * Configuration management for the bridge logger
 *
 * This module handles:
 * - Parsing the [logging] section of app_config.toml
 * - Defining the LogType enum for output destinations (Console, File)
 * - Defining the LogLevel enum for severity levels (Debug, Info, Warn, Error)
 * - Providing default configuration values for all settings
 *
 * Console output goes to stderr. Stdout belongs to the host link, which
 * streams collect reports as JSON lines, so the logger must never write there.
 */

 use serde::{Deserialize, Serialize};
 use std::fs;

 /// Log severity levels, ordered by increasing severity.
 #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
 pub enum LogLevel {
     Debug,
     Info,
     Warn,
     Error,
 }

 // Separate implementation of Deserialize to handle case-insensitive values
 impl<'de> Deserialize<'de> for LogLevel {
     fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
     where
         D: serde::Deserializer<'de>,
     {
         let s = String::deserialize(deserializer)?;
         match s.to_lowercase().as_str() {
             "debug" => Ok(LogLevel::Debug),
             "info" => Ok(LogLevel::Info),
             "warn" | "warning" => Ok(LogLevel::Warn),
             "error" => Ok(LogLevel::Error),
             _ => Err(serde::de::Error::unknown_variant(
                 &s,
                 &["debug", "info", "warn", "warning", "error"],
             )),
         }
     }
 }

 impl LogLevel {
     pub fn as_str(&self) -> &'static str {
         match self {
             LogLevel::Debug => "DEBUG",
             LogLevel::Info => "INFO",
             LogLevel::Warn => "WARN",
             LogLevel::Error => "ERROR",
         }
     }

     /// Maps the integer used across the C boundary (0 = debug .. 3 = error).
     /// Anything above the known range is treated as an error so it is never lost.
     pub fn from_raw(raw: i32) -> Self {
         match raw {
             i32::MIN..=0 => LogLevel::Debug,
             1 => LogLevel::Info,
             2 => LogLevel::Warn,
             _ => LogLevel::Error,
         }
     }
 }

 /// Supported output types for logging
 #[derive(Debug, Clone, PartialEq, Serialize)]
 pub enum LogType {
     Console,
     File,
 }

 impl<'de> Deserialize<'de> for LogType {
     fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
     where
         D: serde::Deserializer<'de>,
     {
         let s = String::deserialize(deserializer)?;
         match s.to_lowercase().as_str() {
             "console" => Ok(LogType::Console),
             "file" => Ok(LogType::File),
             _ => Err(serde::de::Error::unknown_variant(&s, &["console", "file"])),
         }
     }
 }

 /// Configuration for the logger
 #[derive(Debug, Clone, Serialize, Deserialize)]
 pub struct LogConfig {
     /// Type of output (console, file)
     #[serde(rename = "type")]
     pub log_type: LogType,

     /// Minimum log level to record
     pub threshold: LogLevel,

     /// File path for file-based logging
     #[serde(default)]
     pub file_path: Option<String>,

     /// Folder for log files
     #[serde(default)]
     pub log_folder: Option<String>,

     /// Whether to use async logging (default: true)
     #[serde(default = "default_async_logging")]
     pub async_logging: bool,

     /// Whether to force flush after every write (default: false)
     #[serde(default)]
     pub force_flush: bool,
 }

 fn default_async_logging() -> bool {
     true
 }

 impl Default for LogConfig {
     fn default() -> Self {
         LogConfig {
             log_type: LogType::Console,
             threshold: LogLevel::Info,
             file_path: None,
             log_folder: None,
             async_logging: true,
             force_flush: false,
         }
     }
 }

 /// Configuration wrapper to handle the [logging] section in TOML.
 /// Other sections of the same file (e.g. [bridge]) are ignored here.
 #[derive(Debug, Clone, Deserialize)]
 struct ConfigWrapper {
     logging: LogConfig,
 }

 impl LogConfig {
     /// Create configuration from a TOML file. A missing file yields the defaults.
     pub fn from_file(file_path: &str) -> Result<Self, String> {
         let config_str = match fs::read_to_string(file_path) {
             Ok(content) => content,
             Err(e) => {
                 eprintln!("Warning: Could not read config file '{}': {}. Using defaults.", file_path, e);
                 return Ok(LogConfig::default());
             }
         };

         Self::from_toml_str(&config_str)
     }

     /// Parses either a document with a [logging] section or a bare LogConfig table.
     pub fn from_toml_str(config_str: &str) -> Result<Self, String> {
         match toml::from_str::<ConfigWrapper>(config_str) {
             Ok(wrapper) => Ok(wrapper.logging),
             Err(e) => toml::from_str::<LogConfig>(config_str)
                 .map_err(|_| format!("Failed to parse config file: {}", e)),
         }
     }

     /// Resolves `log_folder` + `file_path` into the path the file output opens.
     pub fn resolved_file_path(&self) -> Result<String, String> {
         let file_path = self.file_path.as_ref()
             .ok_or_else(|| "File path not specified in configuration".to_string())?;

         match &self.log_folder {
             Some(folder) => {
                 fs::create_dir_all(folder)
                     .map_err(|e| format!("Failed to create log directory '{}': {}", folder, e))?;
                 Ok(std::path::Path::new(folder).join(file_path).to_string_lossy().into_owned())
             }
             None => Ok(file_path.clone()),
         }
     }
 }

 #[cfg(test)]
 mod tests {
     use super::*;

     #[test]
     fn parses_logging_section_and_ignores_other_tables() {
         let config = LogConfig::from_toml_str(
             r#"
             [logging]
             type = "File"
             threshold = "warning"
             file_path = "bridge.log"
             async_logging = false

             [bridge]
             max_warnings = 10
             "#,
         )
         .unwrap();

         assert_eq!(config.log_type, LogType::File);
         assert_eq!(config.threshold, LogLevel::Warn);
         assert_eq!(config.file_path.as_deref(), Some("bridge.log"));
         assert!(!config.async_logging);
         assert!(!config.force_flush);
     }

     #[test]
     fn missing_file_falls_back_to_defaults() {
         let config = LogConfig::from_file("/nonexistent/app_config.toml").unwrap();
         assert_eq!(config.log_type, LogType::Console);
         assert_eq!(config.threshold, LogLevel::Info);
     }

     #[test]
     fn unknown_output_type_is_rejected() {
         assert!(LogConfig::from_toml_str("[logging]\ntype = \"http\"\nthreshold = \"info\"\n").is_err());
     }

     #[test]
     fn raw_levels_clamp_into_range() {
         assert_eq!(LogLevel::from_raw(-4), LogLevel::Debug);
         assert_eq!(LogLevel::from_raw(1), LogLevel::Info);
         assert_eq!(LogLevel::from_raw(2), LogLevel::Warn);
         assert_eq!(LogLevel::from_raw(17), LogLevel::Error);
         assert!(LogLevel::Debug < LogLevel::Info && LogLevel::Warn < LogLevel::Error);
     }
 }
