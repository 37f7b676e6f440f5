use chrono::{DateTime, Local, TimeZone};

use crate::error::{Error, Result};

pub type MessageId = String;

/// Placeholder written for any field the provider did not return.
pub const MISSING: &str = "N/A";

pub const EXPORT_HEADER: [&str; 6] = [
    "SENDER",
    "DATE",
    "SUBJECT",
    "EMAIL BODY",
    "historyID",
    "threadId",
];

/// Search hit; only the id is needed to fetch the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSummary {
    pub id: MessageId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDetail {
    pub id: MessageId,
    pub sender: Option<String>,
    pub subject: Option<String>,
    /// Epoch milliseconds as reported by the provider.
    pub internal_date_ms: i64,
    pub snippet: Option<String>,
    pub history_id: Option<String>,
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRow {
    pub sender: String,
    pub date: String,
    pub subject: String,
    pub body: String,
    pub history_id: String,
    pub thread_id: String,
}

impl ExportRow {
    pub fn from_detail(detail: &MessageDetail) -> Result<Self> {
        Ok(Self {
            sender: or_missing(&detail.sender),
            date: format_timestamp(detail.internal_date_ms)?,
            subject: or_missing(&detail.subject),
            body: or_missing(&detail.snippet),
            history_id: or_missing(&detail.history_id),
            thread_id: or_missing(&detail.thread_id),
        })
    }

    /// Fields in header order.
    pub fn fields(&self) -> [&str; 6] {
        [
            &self.sender,
            &self.date,
            &self.subject,
            &self.body,
            &self.history_id,
            &self.thread_id,
        ]
    }
}

fn or_missing(v: &Option<String>) -> String {
    v.clone().unwrap_or_else(|| MISSING.to_string())
}

/// Render epoch milliseconds as local wall-clock time.
pub fn format_timestamp(epoch_ms: i64) -> Result<String> {
    format_timestamp_in(epoch_ms, &Local)
}

/// Sub-second precision is dropped (integer division truncates toward zero).
pub fn format_timestamp_in<Tz>(epoch_ms: i64, tz: &Tz) -> Result<String>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let secs = epoch_ms / 1000;
    let utc = DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| Error::query(format!("timestamp {epoch_ms} out of range")))?;
    Ok(utc
        .with_timezone(tz)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string())
}
