//! Read-side views over a [`SheetData`] snapshot.
//!
//! Everything here is pure: no I/O, no clock. Callers fetch once through
//! [`crate::EpicStore::fetch_all_data`] and run as many queries as they
//! like against the same snapshot.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{
    Epic, EpicState, EpicStatus, Platform, SheetData, StatusUpdate, UpdateKind, sort_newest_first,
};

/// Events shown by [`epic_details`].
pub const RECENT_EVENTS: usize = 10;
/// Default page size of [`timeline`].
pub const DEFAULT_TIMELINE_LIMIT: usize = 50;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EpicFilter {
    pub status: Option<EpicState>,
    /// Matches any platform assignee exactly.
    pub assignee: Option<String>,
}

/// An epic joined with its status snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EpicOverview {
    #[serde(flatten)]
    pub epic: Epic,
    pub status: Option<EpicStatus>,
}

impl EpicOverview {
    fn of(data: &SheetData, epic: &Epic) -> Self {
        Self {
            epic: epic.clone(),
            status: data.status(&epic.epic_id).cloned(),
        }
    }
}

#[must_use]
pub fn list_epics(data: &SheetData, filter: &EpicFilter) -> Vec<EpicOverview> {
    data.epics
        .iter()
        .filter(|e| filter.status.is_none_or(|s| e.current_status == s))
        .filter(|e| filter.assignee.as_deref().is_none_or(|a| e.is_assigned_to(a)))
        .map(|e| EpicOverview::of(data, e))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EpicDetails {
    #[serde(flatten)]
    pub overview: EpicOverview,
    /// Newest first.
    pub recent_updates: Vec<StatusUpdate>,
}

#[must_use]
pub fn epic_details(data: &SheetData, epic_id: &str) -> Option<EpicDetails> {
    let epic = data.epic(epic_id)?;
    Some(EpicDetails {
        overview: EpicOverview::of(data, epic),
        recent_updates: timeline(data, epic_id, RECENT_EVENTS),
    })
}

/// The `limit` most recent events of one epic, newest first.
#[must_use]
pub fn timeline(data: &SheetData, epic_id: &str, limit: usize) -> Vec<StatusUpdate> {
    let mut updates: Vec<StatusUpdate> = data.updates_for(epic_id).cloned().collect();
    sort_newest_first(&mut updates);
    updates.truncate(limit);
    updates
}

/// Average progress per platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlatformAverages {
    pub ios: u8,
    pub android: u8,
    pub js: u8,
}

impl PlatformAverages {
    #[must_use]
    pub const fn get(&self, platform: Platform) -> u8 {
        match platform {
            Platform::Ios => self.ios,
            Platform::Android => self.android,
            Platform::Js => self.js,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamProgress {
    pub active_epics: usize,
    /// Active epics per state, in lifecycle order.
    pub by_status: Vec<(EpicState, usize)>,
    /// Over active epics that have a snapshot; zero when none do.
    pub average_progress: PlatformAverages,
    pub open_blockers: Vec<StatusUpdate>,
}

#[must_use]
pub fn team_progress(data: &SheetData) -> TeamProgress {
    let active: Vec<&Epic> = data
        .epics
        .iter()
        .filter(|e| e.current_status.is_active())
        .collect();

    let mut counts: BTreeMap<EpicState, usize> = BTreeMap::new();
    for epic in &active {
        *counts.entry(epic.current_status).or_default() += 1;
    }

    let snapshots: Vec<&EpicStatus> = active
        .iter()
        .filter_map(|e| data.status(&e.epic_id))
        .collect();
    let average = |platform: Platform| -> u8 {
        if snapshots.is_empty() {
            return 0;
        }
        let total: usize = snapshots.iter().map(|s| usize::from(s.progress(platform))).sum();
        let n = snapshots.len();
        u8::try_from((total * 2 + n) / (2 * n)).unwrap_or(100)
    };

    TeamProgress {
        active_epics: active.len(),
        by_status: counts.into_iter().collect(),
        average_progress: PlatformAverages {
            ios: average(Platform::Ios),
            android: average(Platform::Android),
            js: average(Platform::Js),
        },
        open_blockers: open_blockers(&data.updates),
    }
}

/// Blockers with no later `resolved` event on the same epic and platform.
///
/// One resolution closes every earlier blocker it matches. Blockers with an
/// unreadable timestamp can never be shown resolved.
#[must_use]
pub fn open_blockers(updates: &[StatusUpdate]) -> Vec<StatusUpdate> {
    updates
        .iter()
        .filter(|u| u.kind == UpdateKind::Blocker)
        .filter(|blocker| {
            let Some(raised) = blocker.parsed_timestamp() else {
                return true;
            };
            !updates.iter().any(|r| {
                r.kind == UpdateKind::Resolved
                    && r.epic_id == blocker.epic_id
                    && r.platform == blocker.platform
                    && r.parsed_timestamp().is_some_and(|at| at > raised)
            })
        })
        .cloned()
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EpicBlockers {
    pub epic_id: String,
    /// Falls back to the id for blockers on unknown epics.
    pub epic_name: String,
    pub blockers: Vec<StatusUpdate>,
}

/// Open blockers grouped by epic, epics in id order.
#[must_use]
pub fn unresolved_blockers(data: &SheetData) -> Vec<EpicBlockers> {
    let mut grouped: BTreeMap<String, Vec<StatusUpdate>> = BTreeMap::new();
    for blocker in open_blockers(&data.updates) {
        grouped.entry(blocker.epic_id.clone()).or_default().push(blocker);
    }
    grouped
        .into_iter()
        .map(|(epic_id, blockers)| EpicBlockers {
            epic_name: data
                .epic(&epic_id)
                .map_or_else(|| epic_id.clone(), |e| e.epic_name.clone()),
            epic_id,
            blockers,
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssigneeEpics {
    pub active: Vec<EpicOverview>,
    /// `done` or `released`.
    pub completed: Vec<EpicOverview>,
}

/// Epics assigned to `assignee`, on `platform` only when given.
#[must_use]
pub fn search_by_assignee(
    data: &SheetData,
    assignee: &str,
    platform: Option<Platform>,
) -> AssigneeEpics {
    let mut out = AssigneeEpics::default();
    for epic in &data.epics {
        let assigned = match platform {
            Some(platform) => epic.assignee(platform) == assignee,
            None => epic.is_assigned_to(assignee),
        };
        if !assigned {
            continue;
        }
        let overview = EpicOverview::of(data, epic);
        if epic.current_status.is_complete() {
            out.completed.push(overview);
        } else {
            out.active.push(overview);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewStatusUpdate;

    fn epic(id: &str, state: EpicState, ios: &str, android: &str) -> Epic {
        Epic {
            epic_id: id.into(),
            epic_name: format!("{id} name"),
            epic_url: String::new(),
            current_status: state,
            ios_assignee: ios.into(),
            android_assignee: android.into(),
            js_assignee: String::new(),
            start_date: String::new(),
            target_date: String::new(),
            prd_link: None,
            tip_link: None,
            created_quarter: None,
        }
    }

    fn status(id: &str, ios: u8, android: u8, js: u8) -> EpicStatus {
        EpicStatus {
            ios_progress: ios,
            android_progress: android,
            js_progress: js,
            ..EpicStatus::new(id)
        }
    }

    fn event(id: &str, kind: UpdateKind, platform: Option<Platform>, ts: &str) -> StatusUpdate {
        NewStatusUpdate::new(id, kind, format!("{kind} at {ts}"), "@a")
            .on(platform)
            .at(ts.to_string())
    }

    fn data() -> SheetData {
        SheetData {
            epics: vec![
                epic("A-1", EpicState::Development, "@kim", "@lee"),
                epic("A-2", EpicState::Testing, "@lee", ""),
                epic("A-3", EpicState::Done, "@kim", ""),
                epic("A-4", EpicState::Backlog, "", "@kim"),
            ],
            statuses: vec![status("A-1", 50, 20, 0), status("A-2", 81, 40, 10), status("A-3", 100, 100, 100)],
            updates: vec![
                event("A-1", UpdateKind::Comment, None, "2025-01-01T00:00:00Z"),
                event("A-1", UpdateKind::Blocker, Some(Platform::Ios), "2025-01-02T00:00:00Z"),
                event("A-1", UpdateKind::Progress, Some(Platform::Ios), "2025-01-03T00:00:00Z"),
                event("A-2", UpdateKind::Blocker, Some(Platform::Js), "2025-01-04T00:00:00Z"),
                event("A-2", UpdateKind::Resolved, Some(Platform::Js), "2025-01-05T00:00:00Z"),
            ],
        }
    }

    #[test]
    fn list_filters_combine() {
        let data = data();
        assert_eq!(list_epics(&data, &EpicFilter::default()).len(), 4);
        let kim = list_epics(
            &data,
            &EpicFilter {
                status: None,
                assignee: Some("@kim".into()),
            },
        );
        assert_eq!(kim.len(), 3);
        let kim_dev = list_epics(
            &data,
            &EpicFilter {
                status: Some(EpicState::Development),
                assignee: Some("@kim".into()),
            },
        );
        assert_eq!(kim_dev.len(), 1);
        assert_eq!(kim_dev[0].status.as_ref().map(|s| s.ios_progress), Some(50));
    }

    #[test]
    fn details_show_recent_events_newest_first() {
        let data = data();
        let details = epic_details(&data, "A-1").expect("exists");
        assert_eq!(details.recent_updates.len(), 3);
        assert_eq!(details.recent_updates[0].kind, UpdateKind::Progress);
        assert!(epic_details(&data, "Z-9").is_none());
    }

    #[test]
    fn timeline_truncates() {
        let data = data();
        let events = timeline(&data, "A-1", 2);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].kind, UpdateKind::Blocker);
        assert!(timeline(&data, "A-4", DEFAULT_TIMELINE_LIMIT).is_empty());
    }

    #[test]
    fn team_progress_counts_active_only() {
        let progress = team_progress(&data());
        assert_eq!(progress.active_epics, 2);
        assert_eq!(
            progress.by_status,
            vec![(EpicState::Development, 1), (EpicState::Testing, 1)]
        );
        // (50 + 81) / 2 = 65.5 rounds up
        assert_eq!(progress.average_progress.ios, 66);
        assert_eq!(progress.average_progress.android, 30);
        assert_eq!(progress.average_progress.get(Platform::Js), 5);
        assert_eq!(progress.open_blockers.len(), 1);
    }

    #[test]
    fn team_progress_without_snapshots_is_zero() {
        let data = SheetData {
            epics: vec![epic("B-1", EpicState::Kickoff, "", "")],
            ..SheetData::default()
        };
        assert_eq!(team_progress(&data).average_progress, PlatformAverages::default());
    }

    #[test]
    fn resolution_must_match_platform_and_come_later() {
        let updates = vec![
            event("A-1", UpdateKind::Blocker, Some(Platform::Ios), "2025-01-02T00:00:00Z"),
            event("A-1", UpdateKind::Blocker, Some(Platform::Ios), "2025-01-03T00:00:00Z"),
            event("A-1", UpdateKind::Resolved, Some(Platform::Android), "2025-01-04T00:00:00Z"),
            event("A-1", UpdateKind::Blocker, None, "2025-01-05T00:00:00Z"),
            event("A-1", UpdateKind::Resolved, Some(Platform::Ios), "2025-01-02T12:00:00Z"),
            event("A-1", UpdateKind::Resolved, None, "2025-01-06T00:00:00Z"),
        ];
        let open = open_blockers(&updates);
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].timestamp, "2025-01-03T00:00:00Z");
    }

    #[test]
    fn blockers_grouped_with_names() {
        let mut data = data();
        data.updates.push(event("GONE-1", UpdateKind::Blocker, None, "2025-02-01T00:00:00Z"));
        let grouped = unresolved_blockers(&data);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].epic_id, "A-1");
        assert_eq!(grouped[0].epic_name, "A-1 name");
        assert_eq!(grouped[1].epic_name, "GONE-1");
    }

    #[test]
    fn assignee_split_by_completion() {
        let data = data();
        let kim = search_by_assignee(&data, "@kim", None);
        assert_eq!(kim.active.len(), 2);
        assert_eq!(kim.completed.len(), 1);

        let kim_android = search_by_assignee(&data, "@kim", Some(Platform::Android));
        assert_eq!(kim_android.active.len(), 1);
        assert_eq!(kim_android.active[0].epic.epic_id, "A-4");
        assert!(kim_android.completed.is_empty());
    }
}
