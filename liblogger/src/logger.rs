/*
 * Logger implementation module
 *
 * This file implements the core Logger functionality which includes:
 * - Creation and initialization of the global logger instance
 * - Configuration of the logger from TOML files or programmatically
 * - Asynchronous logging through a Tokio worker fed by a bounded channel
 * - Automatic fallback to synchronous logging when the channel is full
 * - Structured key/value fields rendered after the message
 *
 * The Logger is a process-wide singleton behind a OnceCell. Logging never
 * fails the caller: write errors are reported on stderr and dropped.
 */

 use once_cell::sync::OnceCell;
 use std::sync::{Arc, Mutex, atomic::{AtomicU64, Ordering}};
 use std::path::Path;
 use std::io::{self, Write};
 use chrono::Utc;
 use tokio::sync::{mpsc::{self, Sender, Receiver}, oneshot};
 use tokio::runtime::Runtime;
 use tokio::time::{timeout, Duration as TokioDuration};

 use crate::config::{LogConfig, LogLevel};
 use crate::outputs::{LogOutput, AsyncLogOutput, AsyncLogOutputTrait, create_outputs};

 static LOGGER_INSTANCE: OnceCell<Arc<Mutex<LoggerInner>>> = OnceCell::new();
 static RUNTIME: OnceCell<Runtime> = OnceCell::new();

 const CHANNEL_CAPACITY: usize = 256;
 const DROPPED_REPORT_INTERVAL: u64 = 100;

 struct LogMessage {
     timestamp: String,
     level: LogLevel,
     message: String,
     context: Option<String>,
     file: String,
     line: u32,
     module: String,
 }

 enum LogCommand {
     Entry(LogMessage),
     Shutdown(oneshot::Sender<()>),
 }

 struct LoggerInner {
     config: Option<LogConfig>,
     output: Option<Box<dyn LogOutput>>,
     async_sender: Option<Sender<LogCommand>>,
     /// Messages that could not be queued and went through the sync path instead
     dropped_logs: AtomicU64,
     log_counter: AtomicU64,
 }

 impl LoggerInner {
     fn new() -> Self {
         LoggerInner {
             config: None,
             output: None,
             async_sender: None,
             dropped_logs: AtomicU64::new(0),
             log_counter: AtomicU64::new(0),
         }
     }

     fn init_with_config(&mut self, config: LogConfig) -> Result<(), String> {
         let (output, async_output) = create_outputs(&config)?;
         self.output = Some(output);
         self.async_sender = None;

         if let Some(async_output) = async_output {
             let runtime = RUNTIME.get_or_try_init(|| {
                 tokio::runtime::Builder::new_multi_thread()
                     .worker_threads(1)
                     .thread_name("liblogger")
                     .enable_all()
                     .build()
                     .map_err(|e| format!("Failed to create Tokio runtime: {}", e))
             })?;

             let (tx, rx) = mpsc::channel::<LogCommand>(CHANNEL_CAPACITY);
             self.async_sender = Some(tx);

             runtime.spawn(async move {
                 process_log_commands(rx, async_output).await;
             });
         }

         self.config = Some(config);
         Ok(())
     }

     fn enabled(&self, level: LogLevel) -> bool {
         match self.config {
             Some(ref config) => level >= config.threshold,
             None => true,
         }
     }

     fn log(&mut self, level: LogLevel, message: &str, context: Option<&str>, file: &str, line: u32, module: &str) {
         if !self.enabled(level) {
             return;
         }

         let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();

         let count = self.log_counter.fetch_add(1, Ordering::Relaxed) + 1;
         if count % DROPPED_REPORT_INTERVAL == 0 {
             self.report_dropped_logs();
         }

         if let Some(ref sender) = self.async_sender {
             let log_message = LogMessage {
                 timestamp: timestamp.clone(),
                 level,
                 message: message.to_string(),
                 context: context.map(|s| s.to_string()),
                 file: file.to_string(),
                 line,
                 module: module.to_string(),
             };

             if sender.try_send(LogCommand::Entry(log_message)).is_ok() {
                 return;
             }
             // Channel full or closed
             self.dropped_logs.fetch_add(1, Ordering::Relaxed);
         }

         self.log_sync(&timestamp, level, message, context, file, line, module);
     }

     fn report_dropped_logs(&mut self) {
         let dropped = self.dropped_logs.swap(0, Ordering::Relaxed);
         if dropped > 0 {
             let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
             let warning_message = format!("{} log messages bypassed the async queue due to backpressure", dropped);
             self.log_sync(&timestamp, LogLevel::Warn, &warning_message, None, "logger.rs", 0, "liblogger");
         }
     }

     #[allow(clippy::too_many_arguments)]
     fn log_sync(&mut self, timestamp: &str, level: LogLevel, message: &str,
                 context: Option<&str>, file: &str, line: u32, module: &str) {
         let formatted_message = format_log_message(timestamp, level, message, context, file, line, module);

         match self.output {
             Some(ref mut output) => {
                 if let Err(e) = output.write_log(&formatted_message) {
                     eprintln!("Failed to write log: {}", e);
                 }
             }
             None => {
                 let _ = writeln!(io::stderr(), "{}", formatted_message);
             }
         }
     }
 }

 fn format_log_message(timestamp: &str, level: LogLevel, message: &str,
                       context: Option<&str>, file: &str, line: u32, module: &str) -> String {
     let level_str = level.as_str();
     match context {
         Some(ctx) => format!("{} [{}] [{}:{}] [{}] {} | {}",
             timestamp, level_str, file, line, module, message, ctx),
         None => format!("{} [{}] [{}:{}] [{}] {}",
             timestamp, level_str, file, line, module, message),
     }
 }

 /// Renders ordered key/value fields as the context part of a log line.
 /// Returns `None` for an empty field set so the line carries no trailing separator.
 pub fn format_fields<K: AsRef<str>, V: AsRef<str>>(fields: &[(K, V)]) -> Option<String> {
     if fields.is_empty() {
         return None;
     }

     let rendered: Vec<String> = fields
         .iter()
         .map(|(k, v)| format!("{}={}", k.as_ref(), v.as_ref()))
         .collect();
     Some(rendered.join(" "))
 }

 async fn process_log_commands(mut receiver: Receiver<LogCommand>, mut output: AsyncLogOutput) {
     while let Some(cmd) = receiver.recv().await {
         match cmd {
             LogCommand::Entry(msg) => {
                 let formatted_message = format_log_message(
                     &msg.timestamp, msg.level, &msg.message,
                     msg.context.as_deref(), &msg.file, msg.line, &msg.module);

                 if let Err(e) = output.write_log_async(&formatted_message).await {
                     eprintln!("Async logging error: {}", e);
                 }
             }
             LogCommand::Shutdown(completion_sender) => {
                 let _ = completion_sender.send(());
                 break;
             }
         }
     }
 }

 fn instance() -> &'static Arc<Mutex<LoggerInner>> {
     LOGGER_INSTANCE.get_or_init(|| Arc::new(Mutex::new(LoggerInner::new())))
 }

 pub struct Logger;

 impl Logger {
     /// Initialize the logger with default configuration file "app_config.toml"
     pub fn init() {
         if let Err(e) = Self::init_with_config_file("app_config.toml") {
             eprintln!("Failed to initialize logger: {}", e);
         }
     }

     /// Initialize the logger with a specific configuration file
     pub fn init_with_config_file(config_path: &str) -> Result<(), String> {
         let config = LogConfig::from_file(config_path)?;
         Self::init_with_config(config)
     }

     /// Initialize (or re-initialize) the logger with a LogConfig struct
     pub fn init_with_config(config: LogConfig) -> Result<(), String> {
         let mut logger_guard = match instance().lock() {
             Ok(guard) => guard,
             Err(poisoned) => poisoned.into_inner(),
         };

         logger_guard.init_with_config(config)
     }

     pub fn debug(message: &str, context: Option<String>, file: &'static str, line: u32, module: &'static str) {
         Self::log(LogLevel::Debug, message, context, file, line, module)
     }

     pub fn info(message: &str, context: Option<String>, file: &'static str, line: u32, module: &'static str) {
         Self::log(LogLevel::Info, message, context, file, line, module)
     }

     pub fn warn(message: &str, context: Option<String>, file: &'static str, line: u32, module: &'static str) {
         Self::log(LogLevel::Warn, message, context, file, line, module)
     }

     pub fn error(message: &str, context: Option<String>, file: &'static str, line: u32, module: &'static str) {
         Self::log(LogLevel::Error, message, context, file, line, module)
     }

     /// Logs at a level chosen at runtime.
     pub fn log(level: LogLevel, message: &str, context: Option<String>, file: &str, line: u32, module: &str) {
         let file_name = Path::new(file)
             .file_name()
             .and_then(|n| n.to_str())
             .unwrap_or(file);

         match instance().lock() {
             Ok(mut logger) => logger.log(level, message, context.as_deref(), file_name, line, module),
             Err(_) => {
                 let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
                 let log_line = format!("{} [{}] [{}:{}] [{}] {} | MUTEX POISONED\n",
                     timestamp, level.as_str(), file_name, line, module, message);
                 let _ = io::stderr().write_all(log_line.as_bytes());
             }
         }
     }

     /// True when a message at `level` would pass the configured threshold.
     pub fn is_enabled(level: LogLevel) -> bool {
         instance().lock().map(|logger| logger.enabled(level)).unwrap_or(true)
     }

     /// Shutdown the logger gracefully, ensuring all queued lines are written.
     /// Must not be called from inside a Tokio runtime.
     pub fn shutdown() -> Result<(), String> {
         let Some(rt) = RUNTIME.get() else {
             return Ok(());
         };

         let sender = match instance().lock() {
             Ok(mut guard) => {
                 guard.report_dropped_logs();
                 guard.async_sender.take()
             }
             Err(_) => None,
         };

         let Some(sender) = sender else {
             return Ok(());
         };

         let (completion_tx, completion_rx) = oneshot::channel();
         rt.block_on(async move {
             sender.send(LogCommand::Shutdown(completion_tx)).await
                 .map_err(|e| format!("Failed to send shutdown command: {}", e))?;

             match timeout(TokioDuration::from_secs(5), completion_rx).await {
                 Ok(Ok(())) => Ok(()),
                 Ok(Err(_)) => Err("Shutdown completion channel was closed".to_string()),
                 Err(_) => Err("Logger shutdown timed out after 5 seconds".to_string()),
             }
         })
     }

     pub fn get_dropped_log_count() -> u64 {
         instance()
             .lock()
             .map(|guard| guard.dropped_logs.load(Ordering::Relaxed))
             .unwrap_or(0)
     }
 }

 #[cfg(test)]
 mod tests {
     use super::*;
     use crate::config::LogType;

     #[test]
     fn fields_render_in_order() {
         let fields = vec![("zone", "eu-1"), ("attempt", "2")];
         assert_eq!(format_fields(&fields[..]).as_deref(), Some("zone=eu-1 attempt=2"));
         assert_eq!(format_fields::<&str, &str>(&[]), None);
     }

     #[test]
     fn formatted_line_carries_location_and_context() {
         let line = format_log_message("T", LogLevel::Warn, "disk slow", Some("dev=sda"), "a.rs", 7, "m");
         assert_eq!(line, "T [WARN] [a.rs:7] [m] disk slow | dev=sda");
     }

     #[test]
     fn sync_file_logger_respects_threshold() {
         let dir = tempfile::tempdir().unwrap();
         let path = dir.path().join("bridge.log");
         let config = LogConfig {
             log_type: LogType::File,
             threshold: LogLevel::Info,
             file_path: Some(path.to_string_lossy().into_owned()),
             log_folder: None,
             async_logging: false,
             force_flush: true,
         };
         Logger::init_with_config(config).unwrap();

         Logger::debug("hidden", None, file!(), line!(), module_path!());
         Logger::log(LogLevel::Error, "visible", format_fields(&[("k", "v")]), file!(), line!(), module_path!());

         let written = std::fs::read_to_string(&path).unwrap();
         assert!(!written.contains("hidden"));
         assert!(written.contains("[ERROR]"));
         assert!(written.contains("visible | k=v"));
         assert!(!Logger::is_enabled(LogLevel::Debug));
     }
 }
