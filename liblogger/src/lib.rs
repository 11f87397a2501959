/*
 * Main library entry point that exposes the public API
 *
 * This file defines the public interface for the logging library, including:
 * - Re-exporting the Logger struct for initialization
 * - Re-exporting LogConfig, LogLevel and LogType for custom configuration
 * - Defining logging macros (log_debug, log_info, log_warn, log_error, log_at)
 *
 * The macros capture file, line and module information automatically.
 * `log_at` takes the level as a value, which is what the bridge uses when a
 * plugin forwards a log line with its own severity and structured fields.
 */

mod config;
mod outputs;
mod logger;

pub use logger::{Logger, format_fields};
pub use config::LogConfig;
pub use config::LogLevel;
pub use config::LogType;

#[cfg(feature = "proc_macros")]
pub use liblogger_macros::*;

#[macro_export]
macro_rules! log_debug {
    ($message:expr) => {
        $crate::Logger::debug($message, None, file!(), line!(), module_path!())
    };
    ($message:expr, $context:expr) => {
        $crate::Logger::debug($message, $context, file!(), line!(), module_path!())
    };
}

#[macro_export]
macro_rules! log_info {
    ($message:expr) => {
        $crate::Logger::info($message, None, file!(), line!(), module_path!())
    };
    ($message:expr, $context:expr) => {
        $crate::Logger::info($message, $context, file!(), line!(), module_path!())
    };
}

#[macro_export]
macro_rules! log_warn {
    ($message:expr) => {
        $crate::Logger::warn($message, None, file!(), line!(), module_path!())
    };
    ($message:expr, $context:expr) => {
        $crate::Logger::warn($message, $context, file!(), line!(), module_path!())
    };
}

#[macro_export]
macro_rules! log_error {
    ($message:expr) => {
        $crate::Logger::error($message, None, file!(), line!(), module_path!())
    };
    ($message:expr, $context:expr) => {
        $crate::Logger::error($message, $context, file!(), line!(), module_path!())
    };
}

#[macro_export]
macro_rules! log_at {
    ($level:expr, $message:expr, $context:expr) => {
        $crate::Logger::log($level, $message, $context, file!(), line!(), module_path!())
    };
}
