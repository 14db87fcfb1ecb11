//! Append-only event logs.
//!
//! Two fixed schemas are written: alert rows `(Date, Time, Event, Image)` and
//! crowd count rows `(Date, Time, People_Count)`. Each file gets exactly one
//! header row, written before any data row.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::EngineError;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// How an existing log file's header is treated when a run starts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderPolicy {
    /// Fail with `LogSchemaMismatch` if the header differs.
    #[default]
    Validate,
    /// Trust any existing file.
    Lenient,
}

impl std::str::FromStr for HeaderPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "validate" => Ok(HeaderPolicy::Validate),
            "lenient" => Ok(HeaderPolicy::Lenient),
            other => Err(anyhow!("unknown header policy '{}'", other)),
        }
    }
}

/// A fixed-schema log row.
pub trait LogRecord {
    const HEADER: &'static [&'static str];

    fn to_row(&self) -> Vec<String>;
}

/// Alert row shared by intrusion and crowd-overload events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Time")]
    pub time: String,
    #[serde(rename = "Event")]
    pub event: String,
    #[serde(rename = "Image")]
    pub image: String,
}

impl EventRecord {
    pub fn new(at: DateTime<Local>, event: &str, image: &str) -> Self {
        Self {
            date: at.format(DATE_FORMAT).to_string(),
            time: at.format(TIME_FORMAT).to_string(),
            event: event.to_string(),
            image: image.to_string(),
        }
    }
}

impl LogRecord for EventRecord {
    const HEADER: &'static [&'static str] = &["Date", "Time", "Event", "Image"];

    fn to_row(&self) -> Vec<String> {
        vec![
            self.date.clone(),
            self.time.clone(),
            self.event.clone(),
            self.image.clone(),
        ]
    }
}

/// Periodic crowd size row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountRecord {
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Time")]
    pub time: String,
    #[serde(rename = "People_Count")]
    pub people_count: u32,
}

impl CountRecord {
    pub fn new(at: DateTime<Local>, people_count: u32) -> Self {
        Self {
            date: at.format(DATE_FORMAT).to_string(),
            time: at.format(TIME_FORMAT).to_string(),
            people_count,
        }
    }
}

impl LogRecord for CountRecord {
    const HEADER: &'static [&'static str] = &["Date", "Time", "People_Count"];

    fn to_row(&self) -> Vec<String> {
        vec![
            self.date.clone(),
            self.time.clone(),
            self.people_count.to_string(),
        ]
    }
}

/// Append-only row store.
///
/// Rows are only ever appended; nothing here rewrites, reorders or deletes.
pub trait EventSink: Send {
    /// Make sure the store exists and starts with `header`.
    fn ensure_initialized(&mut self, header: &[&str]) -> Result<()>;

    /// Append one row.
    fn append(&mut self, row: &[String]) -> Result<()>;

    /// Human-readable location for log lines.
    fn location(&self) -> String;
}

pub fn append_record<R: LogRecord>(sink: &mut dyn EventSink, record: &R) -> Result<()> {
    sink.append(&record.to_row())
}

/// CSV file log. The file is opened per operation in append mode and closed
/// again, so prior content is never touched.
pub struct CsvEventLog {
    path: PathBuf,
    policy: HeaderPolicy,
}

impl CsvEventLog {
    pub fn new(path: impl Into<PathBuf>, policy: HeaderPolicy) -> Self {
        Self {
            path: path.into(),
            policy,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_failure(&self, reason: impl std::fmt::Display) -> anyhow::Error {
        EngineError::LogWriteFailure {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
        .into()
    }

    fn write_header(&self, header: &[&str]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.write_failure(e))?;
        }
        let mut writer = csv::Writer::from_path(&self.path).map_err(|e| self.write_failure(e))?;
        writer
            .write_record(header)
            .map_err(|e| self.write_failure(e))?;
        writer.flush().map_err(|e| self.write_failure(e))?;
        log::info!("created log {} [{}]", self.path.display(), header.join(", "));
        Ok(())
    }
}

impl EventSink for CsvEventLog {
    fn ensure_initialized(&mut self, header: &[&str]) -> Result<()> {
        let existing_len = match fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => 0,
            Err(e) => return Err(self.write_failure(e)),
        };
        if existing_len == 0 {
            return self.write_header(header);
        }
        if self.policy == HeaderPolicy::Lenient {
            return Ok(());
        }
        let found = read_header(&self.path)?;
        if found.iter().map(String::as_str).ne(header.iter().copied()) {
            return Err(EngineError::LogSchemaMismatch {
                path: self.path.clone(),
                expected: header.iter().map(|h| h.to_string()).collect(),
                found,
            }
            .into());
        }
        Ok(())
    }

    fn append(&mut self, row: &[String]) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.write_failure(e))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.write_record(row).map_err(|e| self.write_failure(e))?;
        writer.flush().map_err(|e| self.write_failure(e))?;
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

fn read_header(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| anyhow!("failed to open {}: {}", path.display(), e))?;
    let mut record = csv::StringRecord::new();
    reader
        .read_record(&mut record)
        .map_err(|e| anyhow!("failed to read header of {}: {}", path.display(), e))?;
    Ok(record.iter().map(|field| field.trim().to_string()).collect())
}

/// Read every data row of a log written with a matching header.
pub fn read_records<R: DeserializeOwned>(path: &Path) -> Result<Vec<R>> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| anyhow!("failed to open {}: {}", path.display(), e))?;
    let records = reader
        .deserialize()
        .enumerate()
        .map(|(i, row)| row.map_err(|e| anyhow!("{} row {}: {}", path.display(), i + 2, e)))
        .collect::<Result<Vec<R>>>()?;
    Ok(records)
}

pub fn read_count_log(path: &Path) -> Result<Vec<CountRecord>> {
    read_records(path)
}

/// In-memory sink for tests and dry runs. Clones share the same rows.
#[derive(Clone, Debug, Default)]
pub struct MemoryEventLog {
    name: String,
    header: Arc<Mutex<Option<Vec<String>>>>,
    rows: Arc<Mutex<Vec<Vec<String>>>>,
    fail_appends: bool,
}

impl MemoryEventLog {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// A sink whose appends always fail, for exercising degradation paths.
    pub fn failing(name: &str) -> Self {
        Self {
            fail_appends: true,
            ..Self::new(name)
        }
    }

    pub fn header(&self) -> Option<Vec<String>> {
        self.header.lock().ok().and_then(|h| h.clone())
    }

    pub fn rows(&self) -> Vec<Vec<String>> {
        self.rows.lock().map(|rows| rows.clone()).unwrap_or_default()
    }
}

impl EventSink for MemoryEventLog {
    fn ensure_initialized(&mut self, header: &[&str]) -> Result<()> {
        let mut guard = self
            .header
            .lock()
            .map_err(|_| anyhow!("memory log lock poisoned"))?;
        if guard.is_none() {
            *guard = Some(header.iter().map(|h| h.to_string()).collect());
        }
        Ok(())
    }

    fn append(&mut self, row: &[String]) -> Result<()> {
        if self.fail_appends {
            return Err(EngineError::LogWriteFailure {
                path: PathBuf::from(self.location()),
                reason: "sink configured to fail".to_string(),
            }
            .into());
        }
        self.rows
            .lock()
            .map_err(|_| anyhow!("memory log lock poisoned"))?
            .push(row.to_vec());
        Ok(())
    }

    fn location(&self) -> String {
        format!("memory://{}", self.name)
    }
}
