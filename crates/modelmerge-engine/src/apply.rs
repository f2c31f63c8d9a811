//! Apply selected changes to the OURS tree.
//!
//! [`apply`] copies the OURS root (handles preserved) and mutates the copy,
//! so the caller's tree is never touched. Targets are found by handle through
//! the [`MergeDiff`] registry; a missing target is a logged no-op.

use crate::diff3::MergeDiff;
use crate::node::{Node, NodeHandle};
use crate::registry::ContainerKind;
use crate::selection::SelectionResolver;
use crate::types::{Change, ChangeKind};

/// Return a merged copy of `ours` with the selected parts of `change` applied.
pub fn apply<S>(ours: &Node, change: &Change, diff: &MergeDiff, selection: &S) -> Node
where
    S: SelectionResolver + ?Sized,
{
    let mut merged = ours.clone();
    apply_in_place(&mut merged, change, diff, selection);
    merged
}

/// Depth-first application onto a tree that shares handles with the OURS
/// tree the diff was computed from.
pub fn apply_in_place<S>(root: &mut Node, change: &Change, diff: &MergeDiff, selection: &S)
where
    S: SelectionResolver + ?Sized,
{
    if !change.group {
        match change.kind {
            ChangeKind::Add => apply_add(root, change, diff, selection),
            ChangeKind::Remove => apply_remove(root, change, diff, selection),
            ChangeKind::Update | ChangeKind::Rename => apply_update(root, change, diff, selection),
        }
    }
    for child in &change.children {
        apply_in_place(root, child, diff, selection);
    }
}

fn apply_add<S>(root: &mut Node, change: &Change, diff: &MergeDiff, selection: &S)
where
    S: SelectionResolver + ?Sized,
{
    let Some(nodes) = diff.nodes(change.key) else {
        tracing::debug!(change = %change.key, "add has no registry entry");
        return;
    };

    // Both sides added it: reconcile properties like an update.
    if let Some(ours) = nodes.nodes.ours {
        if nodes.nodes.theirs.is_some() {
            apply_details(root, ours, change, selection);
        }
        return;
    }
    if !selection.take_theirs(change) {
        return;
    }

    let (Some(link), Some(source)) = (nodes.parent.as_ref(), nodes.source.as_ref()) else {
        tracing::debug!(change = %change.key, id = %change.id, "add has no insertion point in ours");
        return;
    };
    let Some(parent) = link.ours.and_then(|h| root.find_mut(h)) else {
        tracing::debug!(change = %change.key, property = %link.property, "ours parent not found");
        return;
    };

    let copy = source.detached_copy();
    match link.container {
        ContainerKind::Array => parent.push_child(&link.property, copy),
        ContainerKind::Single => parent.set_child(link.property.clone(), copy),
    }
    tracing::debug!(id = %change.id, property = %link.property, "inserted node from theirs");
}

fn apply_remove<S>(root: &mut Node, change: &Change, diff: &MergeDiff, selection: &S)
where
    S: SelectionResolver + ?Sized,
{
    if !selection.take_theirs(change) {
        return;
    }
    let Some(nodes) = diff.nodes(change.key) else {
        tracing::debug!(change = %change.key, "remove has no registry entry");
        return;
    };
    let (Some(link), Some(target)) = (nodes.parent.as_ref(), nodes.ours_id.as_deref()) else {
        // Already gone from ours, or the root itself.
        return;
    };
    let Some(parent) = link.ours.and_then(|h| root.find_mut(h)) else {
        tracing::debug!(change = %change.key, property = %link.property, "ours parent not found");
        return;
    };

    let ids = diff.identities();
    let removed = match link.container {
        ContainerKind::Array => parent.remove_child_where(&link.property, |n| ids.resolve(n) == target),
        ContainerKind::Single => {
            let matches = parent.child(&link.property).is_some_and(|c| ids.resolve(c) == target);
            if matches {
                parent.remove_prop(&link.property);
            }
            matches
        }
    };
    if removed {
        tracing::debug!(id = %target, property = %link.property, "removed node from ours");
    } else {
        tracing::debug!(id = %target, property = %link.property, "remove target not found");
    }
}

fn apply_update<S>(root: &mut Node, change: &Change, diff: &MergeDiff, selection: &S)
where
    S: SelectionResolver + ?Sized,
{
    let Some(nodes) = diff.nodes(change.key) else {
        tracing::debug!(change = %change.key, "update has no registry entry");
        return;
    };
    if let (Some(ours), Some(_)) = (nodes.nodes.ours, nodes.nodes.theirs) {
        apply_details(root, ours, change, selection);
    }
}

/// Per property: an explicit override wins; otherwise a change taken from
/// theirs takes every property theirs changed; otherwise only properties
/// that theirs alone changed.
fn apply_details<S>(root: &mut Node, target: NodeHandle, change: &Change, selection: &S)
where
    S: SelectionResolver + ?Sized,
{
    let Some(details) = change.details.as_ref() else {
        return;
    };
    let Some(node) = root.find_mut(target) else {
        tracing::debug!(change = %change.key, node = %target, "ours node not found");
        return;
    };

    let take_all = selection.take_theirs(change);
    for (prop, delta) in details {
        let take = match selection.take_theirs_for_prop(change, prop) {
            Some(choice) => choice,
            None if take_all => delta.theirs_changed(),
            None => delta.theirs_changed() && !delta.ours_changed(),
        };
        if take {
            node.write_scalar(prop, delta.theirs.clone());
        }
    }
}
