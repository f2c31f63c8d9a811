//! Which side wins, per change and per property.
//!
//! [`SelectionResolver`] is the policy the apply step consumes. The
//! [`SelectionStore`] is the stateful implementation behind a merge session:
//! it keeps one choice per non-group change, aggregates tri-state checkbox
//! states for groups and parents, and holds granular per-property overrides.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{Change, ChangeId};

/// Selection policy consumed by [`crate::apply`].
pub trait SelectionResolver {
    /// Whether THEIRS wins for this change.
    fn take_theirs(&self, change: &Change) -> bool;

    /// Override for one property of a change. `None` defers to
    /// [`SelectionResolver::take_theirs`] and the heuristic.
    fn take_theirs_for_prop(&self, _change: &Change, _prop: &str) -> Option<bool> {
        None
    }
}

/// Seeding rule: take theirs unless the change conflicts.
pub fn default_take_theirs(change: &Change) -> bool {
    !change.conflicts
}

/// Non-conflicting changes from theirs; conflicts keep ours.
#[derive(Debug, Clone, Copy, Default)]
pub struct Heuristic;

impl SelectionResolver for Heuristic {
    fn take_theirs(&self, change: &Change) -> bool {
        default_take_theirs(change)
    }
}

/// Keep OURS everywhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptOurs;

impl SelectionResolver for AcceptOurs {
    fn take_theirs(&self, _change: &Change) -> bool {
        false
    }

    fn take_theirs_for_prop(&self, _change: &Change, _prop: &str) -> Option<bool> {
        Some(false)
    }
}

/// Take every THEIRS change, conflicts included. OURS-only edits survive.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptTheirs;

impl SelectionResolver for AcceptTheirs {
    fn take_theirs(&self, _change: &Change) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckState {
    Checked,
    Unchecked,
    Partial,
}

impl CheckState {
    fn of(checked: bool) -> Self {
        if checked {
            CheckState::Checked
        } else {
            CheckState::Unchecked
        }
    }

    /// Checkbox glyph used by text renderers.
    pub fn mark(self) -> &'static str {
        match self {
            CheckState::Checked => "[x]",
            CheckState::Unchecked => "[ ]",
            CheckState::Partial => "[~]",
        }
    }
}

/// Stable address of a change: file, type tag and the chain of change ids
/// from the root, so same-named children of different parents stay apart.
/// A sibling repeating an earlier sibling's id gets an ordinal suffix
/// (`email`, `email#1`), so every change in a file has its own path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionKey {
    pub file: String,
    pub node_kind: String,
    pub id_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Choice {
    pub take_theirs: bool,
    /// Set by the user rather than seeded.
    pub explicit: bool,
}

/// Per-file lookup tables built at load.
#[derive(Debug, Default)]
struct FileIndex {
    keys: HashMap<ChangeId, SelectionKey>,
    paths: HashMap<String, ChangeId>,
}

/// Tri-state selection over the change trees of a set of files.
#[derive(Debug, Default)]
pub struct SelectionStore {
    choices: HashMap<SelectionKey, Choice>,
    prop_choices: HashMap<(SelectionKey, String), bool>,
    /// Detail property names per change, for whole-store overrides.
    detail_props: HashMap<SelectionKey, Vec<String>>,
    files: HashMap<String, FileIndex>,
}

impl SelectionStore {
    /// Build a fresh store seeded from `files`. Every non-group change takes
    /// theirs unless it conflicts.
    pub fn load<'a>(files: impl IntoIterator<Item = (&'a str, &'a Change)>) -> Self {
        let mut store = Self::default();
        for (file, root) in files {
            let index = store.files.entry(file.to_string()).or_default();
            let mut seeds = Vec::new();
            index_change(file, root, root.id.clone(), index, &mut seeds);
            for (key, take, props) in seeds {
                if !props.is_empty() {
                    store.detail_props.insert(key.clone(), props);
                }
                store.choices.insert(
                    key,
                    Choice {
                        take_theirs: take,
                        explicit: false,
                    },
                );
            }
        }
        tracing::debug!(files = store.files.len(), entries = store.choices.len(), "selection store seeded");
        store
    }

    /// Number of stored (non-group) choices.
    pub fn len(&self) -> usize {
        self.choices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }

    pub fn key(&self, file: &str, change: &Change) -> Option<&SelectionKey> {
        self.files.get(file)?.keys.get(&change.key)
    }

    pub fn choice(&self, file: &str, change: &Change) -> Option<Choice> {
        self.key(file, change).and_then(|k| self.choices.get(k)).copied()
    }

    /// Stored value, or the seeding rule for changes the store never saw.
    pub fn is_checked(&self, file: &str, change: &Change) -> bool {
        self.choice(file, change)
            .map_or_else(|| default_take_theirs(change), |c| c.take_theirs)
    }

    /// Tri-state of a change: leaves report their stored value; anything
    /// with children aggregates itself (unless a group) and its children.
    pub fn state(&self, file: &str, change: &Change) -> CheckState {
        if change.children.is_empty() {
            return CheckState::of(!change.group && self.is_checked(file, change));
        }
        let own = (!change.group).then(|| CheckState::of(self.is_checked(file, change)));
        let mut states = own
            .into_iter()
            .chain(change.children.iter().map(|c| self.state(file, c)));
        let Some(first) = states.next() else {
            return CheckState::Unchecked;
        };
        if first == CheckState::Partial {
            return CheckState::Partial;
        }
        if states.all(|s| s == first) {
            first
        } else {
            CheckState::Partial
        }
    }

    /// Set a change and every non-group descendant. Parents are never
    /// stored; their state is derived. Granular overrides below are cleared.
    pub fn toggle(&mut self, file: &str, change: &Change, checked: bool) {
        let mut stack = vec![change];
        while let Some(c) = stack.pop() {
            if !c.group {
                if let Some(key) = self.key(file, c).cloned() {
                    self.prop_choices.retain(|(k, _), _| k != &key);
                    self.choices.insert(
                        key,
                        Choice {
                            take_theirs: checked,
                            explicit: true,
                        },
                    );
                }
            }
            stack.extend(c.children.iter());
        }
        tracing::debug!(file, change = %change.key, checked, "selection toggled");
    }

    /// Granular override for one property; `None` clears it.
    pub fn set_prop_choice(&mut self, file: &str, change: &Change, prop: &str, take_theirs: Option<bool>) {
        let Some(key) = self.key(file, change).cloned() else {
            tracing::debug!(file, change = %change.key, "no selection entry for change");
            return;
        };
        let entry = (key, prop.to_string());
        match take_theirs {
            Some(v) => {
                self.prop_choices.insert(entry, v);
            }
            None => {
                self.prop_choices.remove(&entry);
            }
        }
    }

    pub fn prop_choice(&self, file: &str, change: &Change, prop: &str) -> Option<bool> {
        let key = self.key(file, change)?.clone();
        self.prop_choices.get(&(key, prop.to_string())).copied()
    }

    /// Uncheck everything and pin every detail property to OURS, so
    /// theirs-only edits stay out too.
    pub fn accept_all_ours(&mut self) {
        self.set_all(false);
        for (key, props) in &self.detail_props {
            for prop in props {
                self.prop_choices.insert((key.clone(), prop.clone()), false);
            }
        }
    }

    pub fn accept_all_theirs(&mut self) {
        self.set_all(true);
    }

    fn set_all(&mut self, take_theirs: bool) {
        for choice in self.choices.values_mut() {
            *choice = Choice {
                take_theirs,
                explicit: true,
            };
        }
        self.prop_choices.clear();
    }

    /// Look up a change by its id path (`"Customer/attributes/email"`).
    pub fn change_id_for_path(&self, file: &str, id_path: &str) -> Option<ChangeId> {
        self.files.get(file)?.paths.get(id_path).copied()
    }

    /// Resolver view for one file, for use with [`crate::apply`].
    pub fn for_file<'s>(&'s self, file: &'s str) -> FileSelection<'s> {
        FileSelection { store: self, file }
    }
}

fn index_change(
    file: &str,
    change: &Change,
    id_path: String,
    index: &mut FileIndex,
    seeds: &mut Vec<(SelectionKey, bool, Vec<String>)>,
) {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for child in &change.children {
        let n = seen.entry(child.id.as_str()).or_insert(0);
        let segment = if *n == 0 {
            child.id.clone()
        } else {
            format!("{}#{n}", child.id)
        };
        *n += 1;
        index_change(file, child, format!("{id_path}/{segment}"), index, seeds);
    }

    let key = SelectionKey {
        file: file.to_string(),
        node_kind: change.node_kind.clone(),
        id_path,
    };
    if !change.group {
        let props = change
            .details
            .as_ref()
            .map(|d| d.keys().cloned().collect())
            .unwrap_or_default();
        seeds.push((key.clone(), default_take_theirs(change), props));
    }
    index.paths.insert(key.id_path.clone(), change.key);
    index.keys.insert(change.key, key);
}

/// The store seen through one file.
#[derive(Debug, Clone, Copy)]
pub struct FileSelection<'s> {
    store: &'s SelectionStore,
    file: &'s str,
}

impl SelectionResolver for FileSelection<'_> {
    fn take_theirs(&self, change: &Change) -> bool {
        if change.group {
            self.store.state(self.file, change) == CheckState::Checked
        } else {
            self.store.is_checked(self.file, change)
        }
    }

    fn take_theirs_for_prop(&self, change: &Change, prop: &str) -> Option<bool> {
        self.store.prop_choice(self.file, change, prop)
    }
}
