//! Interactive delta selection

use dialoguer::MultiSelect;
use pushsync::{Delta, DeltaEntry, DeltaStatus, Selector, StatusFilter, SyncError};

/// Lets the user toggle which delta entries a commit applies
pub struct InteractiveSelector {
    preselect: StatusFilter,
}

impl InteractiveSelector {
    /// Entries matching `preselect` start out checked
    pub fn new(preselect: StatusFilter) -> Self {
        Self { preselect }
    }
}

impl Selector for InteractiveSelector {
    fn select(&mut self, delta: &Delta) -> pushsync::Result<Vec<DeltaEntry>> {
        let items: Vec<String> = delta.iter().map(ToString::to_string).collect();
        let defaults = initial_checks(delta, &self.preselect);

        let chosen = MultiSelect::new()
            .with_prompt("Select changes to push (space to toggle, enter to confirm)")
            .items(&items)
            .defaults(&defaults)
            .interact()
            .map_err(|e| SyncError::Selection(e.to_string()))?;

        Ok(chosen.into_iter().map(|i| delta.entries()[i].clone()).collect())
    }
}

fn initial_checks(delta: &Delta, preselect: &StatusFilter) -> Vec<bool> {
    delta.iter().map(|entry| preselect.matches(entry.status)).collect()
}

/// Non-interactive selection used for `--all` and `--skip-deletes`
pub fn status_filter(skip_deletes: bool) -> StatusFilter {
    if skip_deletes {
        StatusFilter::uploads_only()
    } else {
        StatusFilter::all()
    }
}

/// Short marker for a status, shown next to progress lines
pub fn marker(status: DeltaStatus) -> &'static str {
    match status {
        DeltaStatus::Create => "+",
        DeltaStatus::Change => "~",
        DeltaStatus::Delete => "-",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pushsync::{ContentHash, ContentRecord, RepoPath};

    fn record() -> ContentRecord {
        ContentRecord {
            hash: ContentHash::of(b"x"),
            last_editor: "frank".to_string(),
            last_edit: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_skip_deletes_unchecks_deletes() {
        let delta = Delta::new(vec![
            DeltaEntry::create(RepoPath::new("a.txt")),
            DeltaEntry::delete(RepoPath::new("b.txt"), &record()),
        ]);
        assert_eq!(initial_checks(&delta, &status_filter(true)), vec![true, false]);
        assert_eq!(initial_checks(&delta, &status_filter(false)), vec![true, true]);
    }

    #[test]
    fn test_markers_are_distinct() {
        assert_ne!(marker(DeltaStatus::Create), marker(DeltaStatus::Change));
        assert_ne!(marker(DeltaStatus::Change), marker(DeltaStatus::Delete));
    }
}
