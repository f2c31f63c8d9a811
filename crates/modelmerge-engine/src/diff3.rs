//! Three-way structural diff.
//!
//! Walks aligned BASE/OURS/THEIRS trees and produces a [`Change`] tree. Single
//! child properties are aligned by property name, child arrays by
//! [`align_slots`]. Each emitted change is registered with the node handles it
//! describes, so the apply step can find its targets later.

use crate::hints::Hints;
use crate::identity::IdentityResolver;
use crate::matcher::align_slots;
use crate::node::{Node, Prop};
use crate::reflect::reflect;
use crate::registry::{ChangeNodes, ChangeRegistry, ContainerKind, ParentLink};
use crate::scalar::{diff_scalar_props, has_conflicts};
use crate::types::{Change, ChangeId, ChangeKind, MergeScenario};

/// Result of one diff run: the change tree plus the registry and identity
/// cache it was computed with. The three are only meaningful together.
#[derive(Debug)]
pub struct MergeDiff {
    root: Option<Change>,
    registry: ChangeRegistry,
    identities: IdentityResolver,
}

impl MergeDiff {
    /// Root of the change tree; `None` when the revisions do not differ.
    pub fn change(&self) -> Option<&Change> {
        self.root.as_ref()
    }

    pub fn registry(&self) -> &ChangeRegistry {
        &self.registry
    }

    pub fn identities(&self) -> &IdentityResolver {
        &self.identities
    }

    pub fn hints(&self) -> &Hints {
        self.identities.hints()
    }

    pub fn nodes(&self, key: ChangeId) -> Option<&ChangeNodes> {
        self.registry.get(key)
    }

    pub fn has_conflicts(&self) -> bool {
        self.root.as_ref().is_some_and(|c| c.conflicts)
    }
}

/// Diff three revisions of a tree. Any side may be absent.
pub fn diff3(base: Option<&Node>, ours: Option<&Node>, theirs: Option<&Node>, hints: &Hints) -> MergeDiff {
    let mut walker = Walker {
        ids: IdentityResolver::new(hints.clone()),
        registry: ChangeRegistry::default(),
        next_key: 0,
    };
    let root = walker.visit(MergeScenario::new(base, ours, theirs), None, None);
    tracing::debug!(
        changes = root.as_ref().map_or(0, Change::count),
        conflicts = root.as_ref().is_some_and(|c| c.conflicts),
        "diff3 complete"
    );
    MergeDiff {
        root,
        registry: walker.registry,
        identities: walker.ids,
    }
}

struct Walker {
    ids: IdentityResolver,
    registry: ChangeRegistry,
    next_key: u32,
}

impl Walker {
    fn next_key(&mut self) -> ChangeId {
        let key = ChangeId(self.next_key);
        self.next_key += 1;
        key
    }

    fn visit(
        &mut self,
        nodes: MergeScenario<Option<&Node>>,
        slot_ids: Option<MergeScenario<Option<String>>>,
        parent: Option<ParentLink>,
    ) -> Option<Change> {
        let primary = nodes.ours.or(nodes.theirs).or(nodes.base)?;
        let key = self.next_key();

        let hidden = self.ids.hints().hidden_props(primary.kind());
        let details = diff_scalar_props(nodes.base, nodes.ours, nodes.theirs, hidden);
        let own_conflict = has_conflicts(&details);

        let mut children = Vec::new();
        self.visit_singletons(nodes, &mut children);
        self.visit_arrays(nodes, primary.kind(), &mut children);

        let ids = slot_ids.unwrap_or_else(|| nodes.map(|n| n.map(|n| self.ids.resolve(n))));
        let id = ids
            .ours
            .clone()
            .or_else(|| ids.theirs.clone())
            .or_else(|| ids.base.clone())
            .unwrap_or_default();

        let kind = match (nodes.base, nodes.ours, nodes.theirs) {
            (None, _, _) => ChangeKind::Add,
            (Some(_), None, _) | (Some(_), Some(_), None) => ChangeKind::Remove,
            (Some(_), Some(_), Some(_)) => {
                let renamed = self
                    .ids
                    .hints()
                    .key_prop(primary.kind())
                    .is_some_and(|p| details.contains_key(p));
                if renamed {
                    ChangeKind::Rename
                } else {
                    ChangeKind::Update
                }
            }
        };
        if kind == ChangeKind::Update && details.is_empty() && children.is_empty() {
            return None;
        }

        let source = match (&parent, nodes.base, nodes.ours) {
            (Some(link), None, None) if link.ours.is_some() => nodes.theirs.or(nodes.base).cloned(),
            _ => None,
        };
        self.registry.insert(
            key,
            ChangeNodes {
                nodes: nodes.map(|n| n.map(Node::handle)),
                parent,
                ours_id: ids.ours,
                source,
            },
        );

        let label = self
            .ids
            .hints()
            .label_for(primary)
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| id.clone());
        let conflicts = own_conflict || children.iter().any(|c| c.conflicts);
        Some(Change {
            key,
            id,
            node_kind: primary.kind().to_string(),
            kind,
            details: (!details.is_empty()).then_some(details),
            conflicts,
            children,
            label,
            group: false,
        })
    }

    fn visit_singletons(&mut self, nodes: MergeScenario<Option<&Node>>, out: &mut Vec<Change>) {
        let mut names: Vec<String> = Vec::new();
        for node in [nodes.ours, nodes.theirs, nodes.base].into_iter().flatten() {
            for name in reflect(node, self.ids.hints()).singletons {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }

        for name in names {
            for node in [nodes.base, nodes.ours, nodes.theirs].into_iter().flatten() {
                if matches!(node.prop(&name), Some(Prop::Children(_))) {
                    tracing::debug!(kind = %node.kind(), property = %name, "property is a child on one side and an array on another");
                }
            }
            let link = ParentLink {
                ours: nodes.ours.map(Node::handle),
                theirs: nodes.theirs.map(Node::handle),
                property: name.clone(),
                container: ContainerKind::Single,
            };
            let child = nodes.map(|n| n.and_then(|n| n.child(&name)));
            if let Some(change) = self.visit(child, None, Some(link)) {
                out.push(change);
            }
        }
    }

    fn visit_arrays(&mut self, nodes: MergeScenario<Option<&Node>>, parent_kind: &str, out: &mut Vec<Change>) {
        let mut names: Vec<String> = Vec::new();
        for node in [nodes.ours, nodes.theirs, nodes.base].into_iter().flatten() {
            for name in reflect(node, self.ids.hints()).arrays {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }

        for name in names {
            let items = nodes.map(|n| n.map_or(&[][..], |n| n.children(&name)));
            let slots = align_slots(items.base, items.ours, items.theirs, &self.ids);
            let group_key = self.next_key();

            let mut children = Vec::new();
            for slot in slots {
                let link = ParentLink {
                    ours: nodes.ours.map(Node::handle),
                    theirs: nodes.theirs.map(Node::handle),
                    property: name.clone(),
                    container: ContainerKind::Array,
                };
                if let Some(change) = self.visit(slot.items, Some(slot.ids), Some(link)) {
                    children.push(change);
                }
            }
            if children.is_empty() {
                continue;
            }

            let conflicts = children.iter().any(|c| c.conflicts);
            out.push(Change {
                key: group_key,
                id: name.clone(),
                node_kind: format!("{parent_kind}.{name}"),
                kind: ChangeKind::Update,
                details: None,
                conflicts,
                children,
                label: name,
                group: true,
            });
        }
    }
}
