//! Array item alignment across the three revisions.
//!
//! Items are correlated by resolved identity first. An item with no identity
//! match falls back to the first slot still empty on its side whose
//! structural signature matches, so an item whose name changed still lines up
//! with its BASE slot. Named items only fall back onto slots holding a BASE
//! item; id-less items may also join a slot the other side added. Two distinct
//! items that share a signature can be paired this way; the pairing is kept as
//! the documented behavior.

use crate::identity::IdentityResolver;
use crate::node::Node;
use crate::types::MergeScenario;

/// One aligned position of an array property.
#[derive(Debug, Clone)]
pub struct Slot<'a> {
    pub items: MergeScenario<Option<&'a Node>>,
    pub ids: MergeScenario<Option<String>>,
    signature: String,
}

impl<'a> Slot<'a> {
    /// Identity of the slot: ours, else theirs, else base.
    pub fn id(&self) -> &str {
        self.ids
            .ours
            .as_deref()
            .or(self.ids.theirs.as_deref())
            .or(self.ids.base.as_deref())
            .unwrap_or_default()
    }

    fn has_id(&self, id: &str) -> bool {
        [&self.ids.base, &self.ids.ours, &self.ids.theirs]
            .into_iter()
            .flatten()
            .any(|s| s == id)
    }
}

#[derive(Clone, Copy)]
enum Side {
    Ours,
    Theirs,
}

impl Side {
    fn item<'a>(self, slot: &Slot<'a>) -> Option<&'a Node> {
        match self {
            Side::Ours => slot.items.ours,
            Side::Theirs => slot.items.theirs,
        }
    }

    fn fill<'a>(self, slot: &mut Slot<'a>, node: &'a Node, id: String) {
        match self {
            Side::Ours => {
                slot.items.ours = Some(node);
                slot.ids.ours = Some(id);
            }
            Side::Theirs => {
                slot.items.theirs = Some(node);
                slot.ids.theirs = Some(id);
            }
        }
    }
}

/// Align the items of one array property. Slots follow BASE order, then new
/// OURS items, then new THEIRS items.
pub fn align_slots<'a>(
    base: &'a [Node],
    ours: &'a [Node],
    theirs: &'a [Node],
    ids: &IdentityResolver,
) -> Vec<Slot<'a>> {
    let mut slots: Vec<Slot<'a>> = base
        .iter()
        .map(|node| Slot {
            items: MergeScenario::new(Some(node), None, None),
            ids: MergeScenario::new(Some(ids.resolve(node)), None, None),
            signature: ids.signature(node),
        })
        .collect();

    place_side(&mut slots, ours, Side::Ours, ids);
    place_side(&mut slots, theirs, Side::Theirs, ids);
    slots
}

fn place_side<'a>(slots: &mut Vec<Slot<'a>>, items: &'a [Node], side: Side, ids: &IdentityResolver) {
    let resolved: Vec<(String, String)> = items
        .iter()
        .map(|n| (ids.resolve(n), ids.signature(n)))
        .collect();
    let mut placed = vec![false; items.len()];

    // Identity matches first, so a signature fallback never steals a slot
    // that a later item would have matched by id.
    for (i, node) in items.iter().enumerate() {
        let id = &resolved[i].0;
        if let Some(slot) = slots
            .iter_mut()
            .find(|s| side.item(s).is_none() && s.has_id(id))
        {
            side.fill(slot, node, id.clone());
            placed[i] = true;
        }
    }

    for (i, node) in items.iter().enumerate() {
        if placed[i] {
            continue;
        }
        let (id, signature) = &resolved[i];
        let named = ids.identity_prop(node).is_some();
        let by_signature = slots.iter_mut().find(|s| {
            side.item(s).is_none() && &s.signature == signature && (!named || s.items.base.is_some())
        });
        match by_signature {
            Some(slot) => {
                tracing::trace!(id = %id, slot = %slot.id(), "paired by signature");
                side.fill(slot, node, id.clone());
            }
            None => {
                let mut slot = Slot {
                    items: MergeScenario::default(),
                    ids: MergeScenario::default(),
                    signature: signature.clone(),
                };
                side.fill(&mut slot, node, id.clone());
                slots.push(slot);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hints::{Hint, Hints};

    fn attr(name: &str, ty: &str) -> Node {
        Node::new("Attribute")
            .with_scalar("name", name)
            .with_scalar("type", ty)
    }

    fn summary(slots: &[Slot<'_>]) -> Vec<(Option<String>, Option<String>, Option<String>)> {
        slots
            .iter()
            .map(|s| (s.ids.base.clone(), s.ids.ours.clone(), s.ids.theirs.clone()))
            .collect()
    }

    fn some(s: &str) -> Option<String> {
        Some(s.to_string())
    }

    #[test]
    fn test_align_by_identity_across_reorder() {
        let hints = Hints::default();
        let ids = IdentityResolver::new(hints);
        let base = vec![attr("a", "int"), attr("b", "int")];
        let ours = vec![attr("b", "int"), attr("a", "int")];
        let theirs = vec![attr("a", "int"), attr("b", "int"), attr("c", "text")];
        let slots = align_slots(&base, &ours, &theirs, &ids);
        assert_eq!(
            summary(&slots),
            vec![
                (some("a"), some("a"), some("a")),
                (some("b"), some("b"), some("b")),
                (None, None, some("c")),
            ]
        );
    }

    fn point(x: i64) -> Node {
        Node::new("Point").with_scalar("x", x)
    }

    #[test]
    fn test_id_less_items_pair_by_signature() {
        let hints = Hints::default();
        let ids = IdentityResolver::new(hints);
        let base = vec![point(1), point(2)];
        let ours = vec![point(2), point(1)];
        let theirs = vec![point(1), point(3)];
        let slots = align_slots(&base, &ours, &theirs, &ids);
        // Synthetic ids differ per instance, so only signatures line these up.
        assert_eq!(slots.len(), 3);
        assert!(slots[0].items.ours.unwrap().structurally_equal(&point(1)));
        assert!(slots[1].items.ours.unwrap().structurally_equal(&point(2)));
        assert!(slots[1].items.theirs.is_none());
        assert!(slots[2].items.base.is_none());
        assert_eq!(slots[2].id(), slots[2].ids.theirs.as_deref().unwrap());
    }

    #[test]
    fn test_renamed_item_keeps_its_base_slot() {
        let hints = Hints::default();
        let ids = IdentityResolver::new(hints);
        let base = vec![attr("a", "int"), attr("c", "text")];
        let ours = vec![attr("c", "text"), attr("b", "int")];
        let slots = align_slots(&base, &ours, &base, &ids);
        assert_eq!(
            summary(&slots),
            vec![
                (some("a"), some("b"), some("a")),
                (some("c"), some("c"), some("c")),
            ]
        );
    }

    #[test]
    fn test_renamed_key_prop_pairs_with_base() {
        let hints = Hints::default().with_type("Relation", Hint::keyed("code"));
        let ids = IdentityResolver::new(hints);
        let rel = |code: &str| Node::new("Relation").with_scalar("code", code).with_scalar("target", "Order");
        let base = vec![rel("R1")];
        let theirs = vec![rel("R2")];
        let slots = align_slots(&base, &base, &theirs, &ids);
        assert_eq!(summary(&slots), vec![(some("R1"), some("R1"), some("R2"))]);
    }

    #[test]
    fn test_named_items_never_join_added_slots() {
        let hints = Hints::default();
        let ids = IdentityResolver::new(hints);
        let ours = vec![attr("x", "int")];
        let theirs = vec![attr("y", "int")];
        let slots = align_slots(&[], &ours, &theirs, &ids);
        assert_eq!(
            summary(&slots),
            vec![(None, some("x"), None), (None, None, some("y"))]
        );
    }

    #[test]
    fn test_identity_match_beats_earlier_signature_match() {
        let hints = Hints::default();
        let ids = IdentityResolver::new(hints);
        // "x" is new and shares a signature with "a", but "a" still exists in ours.
        let base = vec![attr("a", "int")];
        let ours = vec![attr("x", "int"), attr("a", "int")];
        let slots = align_slots(&base, &ours, &base, &ids);
        assert_eq!(
            summary(&slots),
            vec![(some("a"), some("a"), some("a")), (None, some("x"), None)]
        );
    }

    #[test]
    fn test_independent_adds_get_separate_slots() {
        let hints = Hints::default();
        let ids = IdentityResolver::new(hints);
        let base = vec![attr("a1", "int")];
        let ours = vec![attr("a1", "int"), attr("a2", "int")];
        let theirs = vec![attr("a1", "int"), attr("a3", "text")];
        let slots = align_slots(&base, &ours, &theirs, &ids);
        assert_eq!(
            summary(&slots),
            vec![
                (some("a1"), some("a1"), some("a1")),
                (None, some("a2"), None),
                (None, None, some("a3")),
            ]
        );
    }
}
