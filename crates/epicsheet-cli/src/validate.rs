use crate::output::CliError;
use chrono::NaiveDate;
use epicsheet_core::model::{EpicState, Platform, epic_id_from_url};

pub const MIN_EPIC_NAME_LEN: usize = 3;
pub const MAX_AUTHOR_LEN: usize = 64;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: &'static str,
    pub value: String,
    pub reason: String,
    pub suggestion: String,
    pub code: &'static str,
}

impl ValidationError {
    pub fn new(
        field: &'static str,
        value: impl Into<String>,
        reason: impl Into<String>,
        suggestion: impl Into<String>,
        code: &'static str,
    ) -> Self {
        Self {
            field,
            value: value.into(),
            reason: reason.into(),
            suggestion: suggestion.into(),
            code,
        }
    }

    pub fn to_cli_error(&self) -> CliError {
        CliError::with_details(
            format!("invalid {} '{}': {}", self.field, self.value, self.reason),
            self.suggestion.clone(),
            self.code,
        )
    }
}

/// Assignees are mentions: `@` followed by at least one character.
pub fn validate_assignee(field: &'static str, s: &str) -> Result<(), ValidationError> {
    if s.starts_with('@') && s.chars().count() > 1 {
        return Ok(());
    }
    Err(ValidationError::new(
        field,
        s,
        "must be a mention starting with '@'",
        "use a mention like @jane",
        "invalid_assignee",
    ))
}

pub fn validate_date(field: &'static str, s: &str) -> Result<NaiveDate, ValidationError> {
    let shaped = s.len() == 10
        && s.bytes()
            .enumerate()
            .all(|(i, b)| if i == 4 || i == 7 { b == b'-' } else { b.is_ascii_digit() });
    let parsed = shaped
        .then(|| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        .flatten();
    parsed.ok_or_else(|| {
        ValidationError::new(
            field,
            s,
            "must be a calendar date in YYYY-MM-DD form",
            "use a date like 2026-03-31",
            "invalid_date",
        )
    })
}

pub fn validate_epic_name(s: &str) -> Result<(), ValidationError> {
    if s.trim().chars().count() >= MIN_EPIC_NAME_LEN {
        return Ok(());
    }
    Err(ValidationError::new(
        "name",
        s,
        format!("must be at least {MIN_EPIC_NAME_LEN} characters"),
        "give the epic a descriptive name",
        "invalid_name",
    ))
}

pub fn validate_epic_url(s: &str) -> Result<String, ValidationError> {
    epic_id_from_url(s).map_err(|_| {
        ValidationError::new(
            "url",
            s,
            "must end in /browse/PROJECT-123",
            "use a tracker URL like https://company.atlassian.net/browse/PROJ-123",
            "invalid_url",
        )
    })
}

pub fn validate_author(s: &str) -> Result<(), ValidationError> {
    if s.chars().count() > MAX_AUTHOR_LEN {
        return Err(ValidationError::new(
            "author",
            s,
            format!("must be <= {MAX_AUTHOR_LEN} characters"),
            "use a shorter author name",
            "invalid_author",
        ));
    }
    if s.chars().any(char::is_control) {
        return Err(ValidationError::new(
            "author",
            s,
            "must not contain control characters",
            "remove control characters from the author",
            "invalid_author",
        ));
    }
    Ok(())
}

pub fn validate_progress(value: u32) -> Result<(), ValidationError> {
    if value <= 100 {
        return Ok(());
    }
    Err(ValidationError::new(
        "progress",
        value.to_string(),
        "must be between 0 and 100",
        "pass a percentage like 40",
        "invalid_progress",
    ))
}

pub fn validate_state(s: &str) -> Result<EpicState, ValidationError> {
    s.parse().map_err(|_| {
        ValidationError::new(
            "status",
            s,
            "expected one of backlog, kickoff, planning, development, code_review, testing, ready_to_release, released, done, on_hold",
            "use --status development, --status testing, etc.",
            "invalid_status",
        )
    })
}

pub fn validate_platform(s: &str) -> Result<Platform, ValidationError> {
    s.parse().map_err(|_| {
        ValidationError::new(
            "platform",
            s,
            "expected one of iOS, Android, JS",
            "use --platform ios|android|js",
            "invalid_platform",
        )
    })
}

/// Fields of a new epic as typed on the command line.
#[derive(Debug, Clone, Copy)]
pub struct EpicInput<'a> {
    pub name: &'a str,
    pub url: &'a str,
    pub ios: &'a str,
    pub android: &'a str,
    pub js: &'a str,
    pub start: &'a str,
    pub target: &'a str,
}

/// Every problem with `input`, not just the first.
pub fn validate_new_epic(input: &EpicInput<'_>) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if let Err(e) = validate_epic_url(input.url) {
        errors.push(e);
    }
    for (field, value) in [
        ("ios_assignee", input.ios),
        ("android_assignee", input.android),
        ("js_assignee", input.js),
    ] {
        if let Err(e) = validate_assignee(field, value) {
            errors.push(e);
        }
    }
    let start = validate_date("start_date", input.start);
    let target = validate_date("target_date", input.target);
    match (&start, &target) {
        (Ok(start), Ok(target)) if start > target => errors.push(ValidationError::new(
            "start_date",
            input.start,
            format!("must not be after target_date {}", input.target),
            "swap the dates or move the target later",
            "invalid_date_range",
        )),
        _ => {}
    }
    errors.extend(start.err());
    errors.extend(target.err());
    if let Err(e) = validate_epic_name(input.name) {
        errors.push(e);
    }
    errors
}
