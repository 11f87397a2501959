//! Transport between the host collector and the controller.
//!
//! The controller only sees a pair of channels. `stdio_link` feeds them from
//! newline-delimited JSON on stdin/stdout; `channel_link` hands the other ends
//! to an in-process host.

use liblogger::{log_debug, log_error, log_warn};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc::{self, Receiver, Sender};

use crate::context_state::{Sample, Warning};
use crate::definition::DefinitionSnapshot;

const LINK_BUFFER: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum HostCommand {
    Load {
        id: String,
        #[serde(default)]
        config: String,
        #[serde(default)]
        requested: Vec<String>,
    },
    Collect { id: String },
    Cancel { id: String },
    Unload { id: String },
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectReport {
    pub id: String,
    pub samples: Vec<Sample>,
    pub warnings: Vec<Warning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "report", rename_all = "snake_case")]
pub enum HostReport {
    Ready {
        name: String,
        version: String,
        definitions: DefinitionSnapshot,
    },
    Loaded { id: String, error: Option<String> },
    Collected(CollectReport),
    Cancelled { id: String, error: Option<String> },
    Unloaded { id: String, error: Option<String> },
    Rejected { error: String },
}

impl HostReport {
    pub fn id(&self) -> Option<&str> {
        match self {
            HostReport::Loaded { id, .. }
            | HostReport::Cancelled { id, .. }
            | HostReport::Unloaded { id, .. } => Some(id),
            HostReport::Collected(report) => Some(&report.id),
            HostReport::Ready { .. } | HostReport::Rejected { .. } => None,
        }
    }
}

/// Controller side of a link.
pub struct HostLink {
    pub commands: Receiver<HostCommand>,
    pub reports: Sender<HostReport>,
}

/// Host side of an in-process link.
pub struct HostHandle {
    pub commands: Sender<HostCommand>,
    pub reports: Receiver<HostReport>,
}

pub fn channel_link() -> (HostLink, HostHandle) {
    let (command_tx, command_rx) = mpsc::channel(LINK_BUFFER);
    let (report_tx, report_rx) = mpsc::channel(LINK_BUFFER);
    (
        HostLink { commands: command_rx, reports: report_tx },
        HostHandle { commands: command_tx, reports: report_rx },
    )
}

/// JSON lines over the process's stdin/stdout. Must be called inside a Tokio runtime.
pub fn stdio_link() -> HostLink {
    let (link, host) = channel_link();
    let HostHandle { commands: command_tx, reports: mut report_rx } = host;

    let rejections = link.reports.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match parse_command(&line) {
                        Ok(cmd) => {
                            if command_tx.send(cmd).await.is_err() {
                                break;
                            }
                        }
                        Err(error) => {
                            log_warn!(&format!("Rejected host command: {}", error));
                            let _ = rejections.send(HostReport::Rejected { error }).await;
                        }
                    }
                }
                Ok(None) => {
                    log_debug!("Host closed stdin");
                    break;
                }
                Err(e) => {
                    log_error!(&format!("Failed to read host command: {}", e));
                    break;
                }
            }
        }
    });

    tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(report) = report_rx.recv().await {
            let line = match render_report(&report) {
                Ok(line) => line,
                Err(e) => {
                    log_error!(&format!("Failed to encode report: {}", e));
                    continue;
                }
            };
            if stdout.write_all(line.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
                log_error!("Host stdout closed");
                break;
            }
        }
    });

    link
}

pub fn parse_command(line: &str) -> Result<HostCommand, String> {
    serde_json::from_str(line).map_err(|e| format!("invalid command {:?}: {}", line, e))
}

/// One JSON document terminated by a newline.
pub fn render_report(report: &HostReport) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(report)?;
    line.push('\n');
    Ok(line)
}
