//! Diagnostic output. Events go to stderr as colored text or JSON lines.

use colored::{ColoredString, Colorize};
use lazy_static::lazy_static;
use serde::Serialize;
use std::io::{self, Write};
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Success,
    Warn,
    Error,
    Debug,
}

impl Level {
    fn paint(self, message: &str) -> ColoredString {
        match self {
            Level::Info => message.normal(),
            Level::Success => message.green().bold(),
            Level::Warn => message.yellow().bold(),
            Level::Error => message.red().bold(),
            Level::Debug => message.cyan(),
        }
    }
}

/// Process-wide output settings, fixed once at startup.
#[derive(Debug, Clone, Copy)]
struct OutputSettings {
    format: OutputFormat,
    color: bool,
    debug: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            color: true,
            debug: false,
        }
    }
}

lazy_static! {
    static ref SETTINGS: RwLock<OutputSettings> = RwLock::new(OutputSettings::default());
}

fn settings() -> OutputSettings {
    match SETTINGS.read() {
        Ok(s) => *s,
        Err(poisoned) => *poisoned.into_inner(),
    }
}

pub fn init(format: OutputFormat, color: bool, debug: bool) {
    if let Ok(mut s) = SETTINGS.write() {
        *s = OutputSettings {
            format,
            color,
            debug,
        };
    }
}

/// One JSON line on stderr.
#[derive(Serialize)]
struct Event<'a> {
    level: Level,
    code: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
}

fn strip_ansi(input: &str) -> String {
    // Remove CSI sequences like \x1b[0m and \x1b[1;32m
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == 0x1b && i + 1 < bytes.len() && bytes[i + 1] == b'[' {
            i += 2;
            while i < bytes.len() {
                let b = bytes[i];
                i += 1;
                if (b'@'..=b'~').contains(&b) {
                    break;
                }
            }
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn render_line(
    settings: &OutputSettings,
    level: Level,
    code: &str,
    message: &str,
    data: Option<serde_json::Value>,
) -> String {
    match settings.format {
        OutputFormat::Text if settings.color => level.paint(message).to_string(),
        OutputFormat::Text => message.to_string(),
        OutputFormat::Json => {
            let message = strip_ansi(message);
            let event = Event {
                level,
                code,
                message: &message,
                data,
            };
            serde_json::to_string(&event).unwrap_or_else(|_| message.clone())
        }
    }
}

/// Print a diagnostic event.
///
/// Everything goes to stderr: stdout belongs to the installer that invoked us.
pub fn emit(level: Level, code: &str, message: &str, data: Option<serde_json::Value>) {
    let settings = settings();
    if level == Level::Debug && !settings.debug {
        return;
    }
    let line = render_line(&settings, level, code, message, data);
    let _ = writeln!(io::stderr(), "{}", line);
}

pub fn get_output_format() -> OutputFormat {
    settings().format
}

pub mod prelude {
    pub use super::{Level, OutputFormat, emit, get_output_format};
}
