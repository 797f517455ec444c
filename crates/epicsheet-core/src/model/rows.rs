use tracing::warn;

use crate::model::{
    Epic, EpicState, EpicStatus, MetadataEntry, Platform, StatusUpdate, UpdateKind,
};
use crate::sheet::{Record, SheetRow};

fn state_or_backlog(record: &Record) -> EpicState {
    let raw = record.text("current_status");
    if raw.trim().is_empty() {
        return EpicState::Backlog;
    }
    raw.parse().unwrap_or_else(|_| {
        warn!(epic_id = %record.text("epic_id"), value = %raw, "unknown epic status, reading as backlog");
        EpicState::Backlog
    })
}

fn platform_or_none(record: &Record) -> Option<Platform> {
    let raw = record.opt_text("platform")?;
    raw.parse()
        .map_err(|_| {
            warn!(row = record.row(), value = %raw, "unknown platform, ignoring");
        })
        .ok()
}

fn progress(record: &Record, column: &str) -> u8 {
    u8::try_from(record.int(column).clamp(0, 100)).unwrap_or(0)
}

impl SheetRow for Epic {
    const COLUMNS: &'static [&'static str] = &[
        "epic_id",
        "epic_name",
        "epic_url",
        "current_status",
        "ios_assignee",
        "android_assignee",
        "js_assignee",
        "start_date",
        "target_date",
        "prd_link",
        "tip_link",
        "created_quarter",
    ];

    fn from_record(record: &Record) -> Self {
        let created_quarter = record.opt_text("created_quarter").and_then(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| {
                    warn!(epic_id = %record.text("epic_id"), value = %raw, "malformed created_quarter, treating as unassigned");
                })
                .ok()
        });
        Self {
            epic_id: record.text("epic_id").trim().to_string(),
            epic_name: record.text("epic_name"),
            epic_url: record.text("epic_url"),
            current_status: state_or_backlog(record),
            ios_assignee: record.text("ios_assignee"),
            android_assignee: record.text("android_assignee"),
            js_assignee: record.text("js_assignee"),
            start_date: record.text("start_date"),
            target_date: record.text("target_date"),
            prd_link: record.opt_text("prd_link"),
            tip_link: record.opt_text("tip_link"),
            created_quarter,
        }
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.epic_id.clone(),
            self.epic_name.clone(),
            self.epic_url.clone(),
            self.current_status.as_str().to_string(),
            self.ios_assignee.clone(),
            self.android_assignee.clone(),
            self.js_assignee.clone(),
            self.start_date.clone(),
            self.target_date.clone(),
            self.prd_link.clone().unwrap_or_default(),
            self.tip_link.clone().unwrap_or_default(),
            self.created_quarter.map(|q| q.label()).unwrap_or_default(),
        ]
    }
}

impl SheetRow for EpicStatus {
    const COLUMNS: &'static [&'static str] = &[
        "epic_id",
        "ios_progress",
        "android_progress",
        "js_progress",
        "overall_status",
        "last_comment",
        "last_updated",
        "updated_by",
    ];

    fn from_record(record: &Record) -> Self {
        Self {
            epic_id: record.text("epic_id").trim().to_string(),
            ios_progress: progress(record, "ios_progress"),
            android_progress: progress(record, "android_progress"),
            js_progress: progress(record, "js_progress"),
            overall_status: record.text("overall_status"),
            last_comment: record.text("last_comment"),
            last_updated: record.text("last_updated"),
            updated_by: record.text("updated_by"),
        }
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.epic_id.clone(),
            self.ios_progress.to_string(),
            self.android_progress.to_string(),
            self.js_progress.to_string(),
            self.overall_status.clone(),
            self.last_comment.clone(),
            self.last_updated.clone(),
            self.updated_by.clone(),
        ]
    }
}

impl SheetRow for StatusUpdate {
    const COLUMNS: &'static [&'static str] = &[
        "timestamp",
        "epic_id",
        "update_type",
        "platform",
        "message",
        "author",
    ];

    fn from_record(record: &Record) -> Self {
        let raw_kind = record.text("update_type");
        let kind = raw_kind.parse().unwrap_or_else(|_| {
            warn!(row = record.row(), value = %raw_kind, "unknown update type, reading as comment");
            UpdateKind::Comment
        });
        Self {
            timestamp: record.text("timestamp"),
            epic_id: record.text("epic_id").trim().to_string(),
            kind,
            platform: platform_or_none(record),
            message: record.text("message"),
            author: record.text("author"),
        }
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.timestamp.clone(),
            self.epic_id.clone(),
            self.kind.as_str().to_string(),
            self.platform.map(|p| p.as_str().to_string()).unwrap_or_default(),
            self.message.clone(),
            self.author.clone(),
        ]
    }
}

impl SheetRow for MetadataEntry {
    const COLUMNS: &'static [&'static str] = &["key", "value", "updated_at"];

    fn from_record(record: &Record) -> Self {
        Self {
            key: record.text("key").trim().to_string(),
            value: record.text("value").trim().to_string(),
            updated_at: record.text("updated_at"),
        }
    }

    fn to_row(&self) -> Vec<String> {
        vec![self.key.clone(), self.value.clone(), self.updated_at.clone()]
    }
}
