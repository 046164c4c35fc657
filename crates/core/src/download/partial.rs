//! Per-file selection inside a paused task.

use crate::media::{parse_release, EpisodeSet};

use super::{FilePriority, FileSelection, SelectionStyle, TaskFile};

/// Outcome of matching a task's files against the needed episodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialSelection {
    pub selection: FileSelection,
    /// Union of the episodes carried by kept files.
    pub matched: EpisodeSet,
}

/// Keep a file iff its parsed episode set is non-empty and within `needed`.
///
/// Every other file is explicitly deselected.
pub fn select_files(
    files: &[TaskFile],
    needed: &EpisodeSet,
    style: SelectionStyle,
) -> PartialSelection {
    let mut matched = EpisodeSet::new();
    let mut keep = Vec::new();
    let mut drop = Vec::new();

    for file in files {
        let episodes = parse_release(&file.name).episodes;
        if !episodes.is_empty() && episodes.is_subset(needed) {
            matched.extend(episodes);
            keep.push(file.index);
        } else {
            drop.push(file.index);
        }
    }

    let selection = match style {
        SelectionStyle::Mask => FileSelection::Mask { keep, drop },
        SelectionStyle::Priority => {
            let mut entries: Vec<(usize, FilePriority)> = keep
                .into_iter()
                .map(|i| (i, FilePriority::Normal))
                .chain(drop.into_iter().map(|i| (i, FilePriority::Skip)))
                .collect();
            entries.sort_by_key(|(i, _)| *i);
            FileSelection::Priorities(entries)
        }
    };

    PartialSelection { selection, matched }
}
