//! Failure reporting: a human hint on stderr plus an optional JSON-lines file
//! the calling installer collects.

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use crate::policy::CheckOutcome;
use crate::ui::prelude::*;

/// One line of the structured failure report.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FailureRecord {
    pub stage: String,
    pub level: &'static str,
    pub errtype: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    pub date: String,
    pub error: String,
}

pub struct Reporter {
    stage: String,
    report_file: Option<PathBuf>,
    records: Vec<FailureRecord>,
}

impl Reporter {
    pub fn new(stage: impl Into<String>, report_file: Option<PathBuf>) -> Self {
        Self {
            stage: stage.into(),
            report_file,
            records: Vec::new(),
        }
    }

    /// Records emitted so far, in order.
    pub fn records(&self) -> &[FailureRecord] {
        &self.records
    }

    /// Print the hint for a warning or fatal outcome and append its record.
    /// `Ok` outcomes are ignored.
    pub fn report(&mut self, outcome: &CheckOutcome) {
        let (level, ui_level, prefix, code) = match outcome {
            CheckOutcome::Ok => return,
            CheckOutcome::Warn(_) => ("warning", Level::Warn, "WARNING", "repocheck.check.warn"),
            CheckOutcome::Fatal(_) => ("fatal", Level::Error, "ERROR", "repocheck.check.fatal"),
        };
        let Some(finding) = outcome.finding() else {
            return;
        };

        let record = FailureRecord {
            stage: self.stage.clone(),
            level,
            errtype: finding.kind.errtype(),
            repo: finding.repo.as_ref().map(ToString::to_string),
            date: Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
            error: finding.message.clone(),
        };

        emit(
            ui_level,
            code,
            &format!("{}: {}", prefix, finding.message),
            serde_json::to_value(&record).ok(),
        );
        if let Err(e) = self.append(&record) {
            emit(
                Level::Warn,
                "repocheck.report.write_failed",
                &format!("Could not write failure report: {:#}", e),
                None,
            );
        }
        self.records.push(record);
    }

    fn append(&self, record: &FailureRecord) -> Result<()> {
        let Some(path) = &self.report_file else {
            return Ok(());
        };
        let line = serde_json::to_string(record).context("serializing failure record")?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening {}", path.display()))?;
        writeln!(file, "{}", line).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}
