//! # modelmerge-engine
//!
//! Structural three-way merge for tree-shaped documents such as parsed data
//! models (entities, attributes, relationships, diagrams).
//!
//! ## Pipeline
//!
//! 1. **Reflection** ([`reflect`]) splits a node's properties into scalars,
//!    single children and child arrays.
//! 2. **Identity** ([`IdentityResolver`]) gives every node a stable id from
//!    its key property, an id-like property, or a synthetic fallback.
//! 3. **Scalar diff** ([`diff_scalar_props`]) computes per-property deltas
//!    and flags true conflicts.
//! 4. **Diff3** ([`diff3`]) walks the three trees and builds a [`Change`]
//!    tree plus a registry of the node instances each change refers to.
//! 5. **Selection** ([`SelectionStore`]) tracks which side wins, with
//!    tri-state aggregation for groups.
//! 6. **Apply** ([`apply`]) produces the merged OURS tree.
//!
//! ## Example
//!
//! ```rust
//! use modelmerge_engine::{apply, diff3, Heuristic, Hints, Node};
//!
//! let base = Node::new("Entity").with_scalar("name", "Customer").with_scalar("abstract", false);
//! let ours = base.detached_copy();
//! let theirs = Node::new("Entity").with_scalar("name", "Customer").with_scalar("abstract", true);
//!
//! let diff = diff3(Some(&base), Some(&ours), Some(&theirs), &Hints::default());
//! let change = diff.change().expect("theirs changed a property");
//! let merged = apply(&ours, change, &diff, &Heuristic);
//! assert_eq!(merged.scalar("abstract"), Some(&serde_json::json!(true)));
//! ```

pub mod apply;
pub mod diff3;
pub mod hints;
pub mod identity;
pub mod matcher;
pub mod node;
pub mod reflect;
pub mod registry;
pub mod scalar;
pub mod selection;
pub mod types;

pub use apply::{apply, apply_in_place};
pub use diff3::{diff3, MergeDiff};
pub use hints::{Hint, HintError, Hints};
pub use identity::IdentityResolver;
pub use matcher::{align_slots, Slot};
pub use node::{Containment, Node, NodeHandle, Prop, TreeError};
pub use reflect::{reflect, Reflection};
pub use registry::{ChangeNodes, ChangeRegistry, ContainerKind, ParentLink};
pub use scalar::{diff_scalar_props, has_conflicts, Details, PropDelta};
pub use selection::{
    default_take_theirs, AcceptOurs, AcceptTheirs, CheckState, Choice, FileSelection, Heuristic,
    SelectionKey, SelectionResolver, SelectionStore,
};
pub use types::{Change, ChangeId, ChangeKind, MergeScenario};
