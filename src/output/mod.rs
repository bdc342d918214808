use crate::models::AccessLogEntry;
use crate::notify::{Notification, NotificationSink};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const CSV_HEADER: &str = "Timestamp,Level,Message,Source,IP Address";
const CSV_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Output handler for notifications
pub struct OutputHandler {
    format: OutputFormat,
    writer: Option<Box<dyn Write + Send>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Jsonl,
    Console,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "jsonl" => OutputFormat::Jsonl,
            "console" => OutputFormat::Console,
            _ => OutputFormat::Jsonl,
        }
    }
}

impl OutputHandler {
    /// Create a new output handler; without a file everything goes to stdout
    pub fn new(format: OutputFormat, file_path: Option<PathBuf>) -> Result<Self, Box<dyn std::error::Error>> {
        let writer: Option<Box<dyn Write + Send>> = match (&format, file_path) {
            (OutputFormat::Console, _) => None,
            (_, Some(path)) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;
                Some(Box::new(BufWriter::new(file)))
            }
            (_, None) => None,
        };

        Ok(OutputHandler { format, writer })
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn write_notification(&mut self, notification: &Notification) -> Result<(), Box<dyn std::error::Error>> {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(notification)?;
                self.write_output(&format!("{}\n", json))?;
            }
            OutputFormat::Jsonl => {
                let json = serde_json::to_string(notification)?;
                self.write_output(&format!("{}\n", json))?;
            }
            OutputFormat::Console => {
                let output = console_text(notification);
                self.write_output(&output)?;
            }
        }
        Ok(())
    }

    fn write_output(&mut self, data: &str) -> Result<(), Box<dyn std::error::Error>> {
        match &mut self.writer {
            Some(writer) => {
                writer.write_all(data.as_bytes())?;
                writer.flush()?;
            }
            None => {
                print!("{}", data);
                std::io::stdout().flush()?;
            }
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(writer) = &mut self.writer {
            writer.flush()?;
        }
        Ok(())
    }
}

fn console_text(notification: &Notification) -> String {
    let tag = match notification {
        Notification::TokenCreated { .. } => "TOKEN",
        Notification::Novelty { .. } => "ACCESS",
        Notification::Failure { .. } => "ERROR",
    };
    let mut text = format!("[{}] {}\n", tag, notification.summary());
    if let Notification::Novelty { alert } = notification {
        for entry in &alert.new_entries {
            text.push_str(&format!(
                "    {} {} {} {}: {}\n",
                entry.timestamp.format(CSV_TIME_FORMAT),
                entry.ip_address,
                entry.level,
                entry.source,
                entry.message
            ));
        }
    }
    text
}

/// Notification sink writing through an [`OutputHandler`]
pub struct OutputSink {
    handler: Mutex<OutputHandler>,
}

impl OutputSink {
    pub fn new(handler: OutputHandler) -> Self {
        OutputSink {
            handler: Mutex::new(handler),
        }
    }
}

impl NotificationSink for OutputSink {
    fn notify(&self, notification: Notification) {
        match self.handler.lock() {
            Ok(mut handler) => {
                if let Err(e) = handler.write_notification(&notification) {
                    log::error!("Failed to write notification: {}", e);
                }
            }
            Err(_) => log::error!("Output handler lock poisoned"),
        }
    }
}

/// Access-log entries as CSV, header first
///
/// Only the message is quoted; embedded quotes are doubled.
pub fn logs_to_csv(entries: &[AccessLogEntry]) -> String {
    let mut csv = String::from(CSV_HEADER);
    csv.push('\n');
    for entry in entries {
        csv.push_str(&format!(
            "{},{},\"{}\",{},{}\n",
            entry.timestamp.format(CSV_TIME_FORMAT),
            entry.level,
            entry.message.replace('"', "\"\""),
            entry.source,
            entry.ip_address
        ));
    }
    csv
}

pub fn write_csv(path: &Path, entries: &[AccessLogEntry]) -> std::io::Result<()> {
    std::fs::write(path, logs_to_csv(entries))
}
