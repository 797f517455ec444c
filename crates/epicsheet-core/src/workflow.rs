//! Composite writes: each one updates the status snapshot and records an
//! event, in the order a reader of the tracker expects to see them.
//!
//! All workflows accept either a bare epic id or a tracker URL and refuse
//! to touch epics that do not exist, so a typo never creates an orphan
//! status row.

use tracing::info;

use crate::error::StoreError;
use crate::model::{
    EpicState, NewStatusUpdate, Platform, StatusPatch, StatusUpdate, UpdateKind, epic_id_from_url,
};
use crate::store::EpicStore;

/// Accept `PROJ-12` or `https://…/browse/PROJ-12`.
///
/// # Errors
///
/// [`StoreError::InvalidUrl`] for anything that looks like a URL but does
/// not end in a browse segment, or for an empty reference.
pub fn resolve_epic_ref(reference: &str) -> Result<String, StoreError> {
    let reference = reference.trim();
    if reference.contains('/') {
        return epic_id_from_url(reference);
    }
    if reference.is_empty() {
        return Err(StoreError::InvalidUrl(String::new()));
    }
    Ok(reference.to_string())
}

fn existing_epic(store: &EpicStore, reference: &str) -> Result<String, StoreError> {
    let epic_id = resolve_epic_ref(reference)?;
    if store.find_epic(&epic_id)?.is_none() {
        return Err(StoreError::WorkItemNotFound(epic_id));
    }
    Ok(epic_id)
}

/// `"{p}% complete"`, with ` - comment` appended when there is one.
#[must_use]
pub fn progress_message(progress: u32, comment: Option<&str>) -> String {
    match comment.map(str::trim).filter(|c| !c.is_empty()) {
        Some(comment) => format!("{progress}% complete - {comment}"),
        None => format!("{progress}% complete"),
    }
}

/// `"Status changed: {state}"`, with ` - reason` appended when there is one.
#[must_use]
pub fn status_change_message(state: EpicState, reason: Option<&str>) -> String {
    match reason.map(str::trim).filter(|r| !r.is_empty()) {
        Some(reason) => format!("Status changed: {state} - {reason}"),
        None => format!("Status changed: {state}"),
    }
}

/// Set one platform's progress and log a `progress` event.
///
/// # Errors
///
/// [`StoreError::InvalidProgress`] above 100 (checked before any I/O),
/// [`StoreError::WorkItemNotFound`], or any store error.
pub fn record_progress(
    store: &EpicStore,
    reference: &str,
    platform: Platform,
    progress: u32,
    comment: Option<&str>,
    author: &str,
) -> Result<StatusUpdate, StoreError> {
    if progress > 100 {
        return Err(StoreError::InvalidProgress(progress));
    }
    let epic_id = existing_epic(store, reference)?;

    let mut patch = StatusPatch::default().progress(platform, progress).by(author);
    if let Some(comment) = comment.filter(|c| !c.trim().is_empty()) {
        patch = patch.comment(comment);
    }
    store.update_status_snapshot(&epic_id, &patch)?;

    let event = store.append_event(
        NewStatusUpdate::new(&epic_id, UpdateKind::Progress, progress_message(progress, comment), author)
            .on(Some(platform)),
    )?;
    info!(epic_id = %epic_id, platform = %platform, progress, "recorded progress");
    Ok(event)
}

/// Mark a platform as finished: progress 100 plus a progress event.
///
/// # Errors
///
/// Same as [`record_progress`].
pub fn complete_platform(
    store: &EpicStore,
    reference: &str,
    platform: Platform,
    author: &str,
) -> Result<StatusUpdate, StoreError> {
    let epic_id = existing_epic(store, reference)?;
    let patch = StatusPatch::default()
        .progress(platform, 100)
        .comment(format!("{platform} development complete"))
        .by(author);
    store.update_status_snapshot(&epic_id, &patch)?;
    store.append_event(
        NewStatusUpdate::new(&epic_id, UpdateKind::Progress, "Development complete (100%)", author)
            .on(Some(platform)),
    )
}

/// Replace the snapshot's last comment and log a `comment` event.
///
/// # Errors
///
/// [`StoreError::WorkItemNotFound`], or any store error.
pub fn add_comment(
    store: &EpicStore,
    reference: &str,
    comment: &str,
    platform: Option<Platform>,
    author: &str,
) -> Result<StatusUpdate, StoreError> {
    let epic_id = existing_epic(store, reference)?;
    store.update_status_snapshot(&epic_id, &StatusPatch::default().comment(comment).by(author))?;
    store.append_event(NewStatusUpdate::new(&epic_id, UpdateKind::Comment, comment, author).on(platform))
}

/// Log a `blocker` event, then surface it in the snapshot comment.
///
/// # Errors
///
/// [`StoreError::WorkItemNotFound`], or any store error.
pub fn report_blocker(
    store: &EpicStore,
    reference: &str,
    platform: Platform,
    description: &str,
    author: &str,
) -> Result<StatusUpdate, StoreError> {
    let epic_id = existing_epic(store, reference)?;
    let event = store.append_event(
        NewStatusUpdate::new(&epic_id, UpdateKind::Blocker, description, author).on(Some(platform)),
    )?;
    store.update_status_snapshot(
        &epic_id,
        &StatusPatch::default()
            .comment(format!("[{platform}] blocker: {description}"))
            .by(author),
    )?;
    info!(epic_id = %epic_id, platform = %platform, "reported blocker");
    Ok(event)
}

/// Log a `resolved` event, closing the platform's open blockers.
///
/// # Errors
///
/// [`StoreError::WorkItemNotFound`], or any store error.
pub fn resolve_blocker(
    store: &EpicStore,
    reference: &str,
    platform: Platform,
    resolution: &str,
    author: &str,
) -> Result<StatusUpdate, StoreError> {
    let epic_id = existing_epic(store, reference)?;
    let event = store.append_event(
        NewStatusUpdate::new(&epic_id, UpdateKind::Resolved, resolution, author).on(Some(platform)),
    )?;
    store.update_status_snapshot(
        &epic_id,
        &StatusPatch::default()
            .comment(format!("[{platform}] blocker resolved: {resolution}"))
            .by(author),
    )?;
    info!(epic_id = %epic_id, platform = %platform, "resolved blocker");
    Ok(event)
}

/// Move the epic to `state`, log it, and mirror it into the snapshot.
///
/// # Errors
///
/// [`StoreError::WorkItemNotFound`], or any store error.
pub fn change_status(
    store: &EpicStore,
    reference: &str,
    state: EpicState,
    reason: Option<&str>,
    author: &str,
) -> Result<StatusUpdate, StoreError> {
    let epic_id = resolve_epic_ref(reference)?;
    store.change_work_item_status(&epic_id, state)?;

    let message = status_change_message(state, reason);
    let event = store.append_event(NewStatusUpdate::new(
        &epic_id,
        UpdateKind::StatusChange,
        message.clone(),
        author,
    ))?;
    store.update_status_snapshot(
        &epic_id,
        &StatusPatch::default()
            .overall_status(state.as_str())
            .comment(message)
            .by(author),
    )?;
    Ok(event)
}
