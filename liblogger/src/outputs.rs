/*
 * Log output implementations
 *
 * This module defines the logging backends:
 * - ConsoleOutput: Writes logs to stderr
 * - FileOutput / AsyncFileOutput: Append logs to a file sharing one handle
 *
 * Each output implements the LogOutput trait (sync path) and the
 * AsyncLogOutputTrait (background worker path). Factory functions create the
 * appropriate output for a configuration.
 */

 use std::fs::{File, OpenOptions};
 use std::io::{self, Write};
 use std::path::Path;
 use std::sync::{Arc, Mutex};
 use tokio::io::{AsyncWriteExt, stderr};
 use async_trait::async_trait;
 use crate::config::{LogConfig, LogType};

 pub trait LogOutput: Send + Sync {
     fn write_log(&mut self, formatted_message: &str) -> Result<(), String>;
 }

 #[async_trait]
 pub trait AsyncLogOutputTrait: Send + Sync {
     async fn write_log_async(&mut self, formatted_message: &str) -> Result<(), String>;
 }

 pub enum AsyncLogOutput {
     Console(ConsoleOutput),
     File(AsyncFileOutput),
 }

 pub struct ConsoleOutput;

 impl LogOutput for ConsoleOutput {
     fn write_log(&mut self, formatted_message: &str) -> Result<(), String> {
         writeln!(io::stderr(), "{}", formatted_message)
             .map_err(|e| format!("Failed to write to console: {}", e))
     }
 }

 #[async_trait]
 impl AsyncLogOutputTrait for ConsoleOutput {
     async fn write_log_async(&mut self, formatted_message: &str) -> Result<(), String> {
         let mut err = stderr();
         let mut log_bytes = formatted_message.as_bytes().to_vec();
         log_bytes.push(b'\n');

         err.write_all(&log_bytes).await
             .map_err(|e| format!("Failed to write to console: {}", e))?;
         err.flush().await
             .map_err(|e| format!("Failed to flush console output: {}", e))
     }
 }

 pub struct FileOutput {
     file_handle: Arc<Mutex<File>>,
     force_flush: bool,
 }

 pub struct AsyncFileOutput {
     file_handle: Arc<Mutex<File>>,
     force_flush: bool,
 }

 fn append_line(file_handle: &Arc<Mutex<File>>, force_flush: bool, formatted_message: &str) -> Result<(), String> {
     let mut file = file_handle.lock()
         .map_err(|_| "Failed to lock file mutex".to_string())?;

     file.write_all(formatted_message.as_bytes())
         .map_err(|e| format!("Failed to write to log file: {}", e))?;
     file.write_all(b"\n")
         .map_err(|e| format!("Failed to write newline to log file: {}", e))?;

     if force_flush {
         file.flush()
             .map_err(|e| format!("Failed to flush log file: {}", e))?;
     }

     Ok(())
 }

 impl LogOutput for FileOutput {
     fn write_log(&mut self, formatted_message: &str) -> Result<(), String> {
         append_line(&self.file_handle, self.force_flush, formatted_message)
     }
 }

 #[async_trait]
 impl AsyncLogOutputTrait for AsyncFileOutput {
     async fn write_log_async(&mut self, formatted_message: &str) -> Result<(), String> {
         append_line(&self.file_handle, self.force_flush, formatted_message)
     }
 }

 /// Opens the file once and hands out a sync and an async writer sharing the handle.
 pub fn create_file_output(file_path: &str, force_flush: bool) -> Result<(FileOutput, AsyncFileOutput), String> {
     if let Some(parent) = Path::new(file_path).parent() {
         if !parent.as_os_str().is_empty() && !parent.exists() {
             std::fs::create_dir_all(parent)
                 .map_err(|e| format!("Failed to create log directory: {}", e))?;
         }
     }

     let file = OpenOptions::new()
         .create(true)
         .append(true)
         .open(file_path)
         .map_err(|e| format!("Failed to open log file: {}", e))?;

     let file_handle = Arc::new(Mutex::new(file));

     Ok((
         FileOutput { file_handle: Arc::clone(&file_handle), force_flush },
         AsyncFileOutput { file_handle, force_flush },
     ))
 }

 #[async_trait]
 impl AsyncLogOutputTrait for AsyncLogOutput {
     async fn write_log_async(&mut self, formatted_message: &str) -> Result<(), String> {
         match self {
             AsyncLogOutput::Console(output) => output.write_log_async(formatted_message).await,
             AsyncLogOutput::File(output) => output.write_log_async(formatted_message).await,
         }
     }
 }

 /// Creates the sync output and, when async logging is on, its async twin.
 pub fn create_outputs(config: &LogConfig) -> Result<(Box<dyn LogOutput>, Option<AsyncLogOutput>), String> {
     match config.log_type {
         LogType::Console => {
             let async_output = config.async_logging.then(|| AsyncLogOutput::Console(ConsoleOutput));
             Ok((Box::new(ConsoleOutput), async_output))
         }
         LogType::File => {
             let full_path = config.resolved_file_path()?;
             let (file_output, async_file_output) = create_file_output(&full_path, config.force_flush)?;
             let async_output = config.async_logging.then(|| AsyncLogOutput::File(async_file_output));
             Ok((Box::new(file_output), async_output))
         }
     }
 }
