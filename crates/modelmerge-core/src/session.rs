use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use modelmerge_engine::{
    apply, diff3, Change, CheckState, Hints, MergeDiff, Node, SelectionResolver, SelectionStore,
};
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::codec::DocumentCodec;
use crate::source::{write_atomic, Revision, RevisionSource};

/// One document under merge: the OURS tree and its diff.
#[derive(Debug)]
pub struct FileMerge {
    pub path: String,
    pub ours: Node,
    pub diff: MergeDiff,
}

impl FileMerge {
    pub fn change(&self) -> Option<&Change> {
        self.diff.change()
    }

    fn apply_with<S: SelectionResolver + ?Sized>(&self, selection: &S) -> Node {
        match self.change() {
            Some(change) => apply(&self.ours, change, &self.diff, selection),
            None => self.ours.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSummary {
    pub path: String,
    pub changes: usize,
    pub conflicts: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<CheckState>,
}

/// Diffs and selection state for a set of files.
#[derive(Debug)]
pub struct MergeSession {
    id: Uuid,
    loaded_at: DateTime<Utc>,
    files: Vec<FileMerge>,
    selection: SelectionStore,
}

impl MergeSession {
    /// Read, parse and diff every file, then seed a fresh selection store.
    /// Any read or parse failure rejects the whole load.
    pub async fn load(
        source: &dyn RevisionSource,
        codec: &dyn DocumentCodec,
        hints: &Hints,
        paths: &[String],
    ) -> anyhow::Result<Self> {
        let id = Uuid::new_v4();
        let mut files = Vec::with_capacity(paths.len());

        for path in paths {
            let base = read_tree(source, codec, path, Revision::Base).await?;
            let ours = read_tree(source, codec, path, Revision::Ours)
                .await?
                .ok_or_else(|| anyhow::anyhow!("{path}: no ours revision, nothing to merge into"))?;
            let theirs = read_tree(source, codec, path, Revision::Theirs).await?;

            let diff = diff3(base.as_ref(), Some(&ours), theirs.as_ref(), hints);
            tracing::info!(
                session = %id,
                file = %path,
                changes = diff.change().map_or(0, Change::count),
                conflicts = diff.has_conflicts(),
                "file diffed"
            );
            files.push(FileMerge {
                path: path.clone(),
                ours,
                diff,
            });
        }

        let selection = SelectionStore::load(
            files
                .iter()
                .filter_map(|f| f.change().map(|c| (f.path.as_str(), c))),
        );

        Ok(Self {
            id,
            loaded_at: Utc::now(),
            files,
            selection,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn files(&self) -> &[FileMerge] {
        &self.files
    }

    pub fn file(&self, path: &str) -> Option<&FileMerge> {
        self.files.iter().find(|f| f.path == path)
    }

    pub fn selection(&self) -> &SelectionStore {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut SelectionStore {
        &mut self.selection
    }

    pub fn accept_all_ours(&mut self) {
        self.selection.accept_all_ours();
    }

    pub fn accept_all_theirs(&mut self) {
        self.selection.accept_all_theirs();
    }

    /// Toggle the change at `id_path` in `file` (and its descendants).
    pub fn toggle_path(&mut self, file: &str, id_path: &str, checked: bool) -> anyhow::Result<()> {
        let merge = self
            .files
            .iter()
            .find(|f| f.path == file)
            .ok_or_else(|| anyhow::anyhow!("file not in session: {file}"))?;
        let key = self
            .selection
            .change_id_for_path(file, id_path)
            .ok_or_else(|| anyhow::anyhow!("{file}: no change at '{id_path}'"))?;
        let change = merge
            .change()
            .and_then(|c| c.find(key))
            .ok_or_else(|| anyhow::anyhow!("{file}: change {key} missing from tree"))?;
        self.selection.toggle(file, change, checked);
        Ok(())
    }

    /// Merged OURS tree per file, using the stored selection.
    pub fn apply_selected(&self) -> Vec<(String, Node)> {
        self.files
            .iter()
            .map(|f| (f.path.clone(), f.apply_with(&self.selection.for_file(&f.path))))
            .collect()
    }

    /// Merged OURS tree per file, using a fixed resolver.
    pub fn apply_with(&self, selection: &dyn SelectionResolver) -> Vec<(String, Node)> {
        self.files
            .iter()
            .map(|f| (f.path.clone(), f.apply_with(selection)))
            .collect()
    }

    pub fn serialize_merged(
        merged: &[(String, Node)],
        codec: &dyn DocumentCodec,
    ) -> anyhow::Result<Vec<(String, String)>> {
        merged
            .iter()
            .map(|(path, node)| Ok((path.clone(), codec.serialize(node)?)))
            .collect()
    }

    /// Serialize and write merged documents under `out_dir`.
    pub async fn write_merged(
        merged: &[(String, Node)],
        codec: &dyn DocumentCodec,
        out_dir: &Path,
    ) -> anyhow::Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(merged.len());
        for (path, text) in Self::serialize_merged(merged, codec)? {
            let target = write_atomic(out_dir, &path, &text).await?;
            tracing::info!(file = %path, out = %target.display(), "merged document written");
            written.push(target);
        }
        Ok(written)
    }

    pub fn summary(&self) -> Vec<FileSummary> {
        self.files
            .iter()
            .map(|f| FileSummary {
                path: f.path.clone(),
                changes: f.change().map_or(0, Change::count),
                conflicts: f.change().map_or(0, Change::conflict_count),
                state: f.change().map(|c| self.selection.state(&f.path, c)),
            })
            .collect()
    }
}

async fn read_tree(
    source: &dyn RevisionSource,
    codec: &dyn DocumentCodec,
    path: &str,
    revision: Revision,
) -> anyhow::Result<Option<Node>> {
    let Some(text) = source.read(path, revision).await? else {
        tracing::debug!(file = %path, %revision, source = source.name(), "revision absent");
        return Ok(None);
    };
    let node = codec
        .parse(&text)
        .map_err(|e| anyhow::anyhow!("{path} ({revision}, {}): {e}", codec.name()))?;
    Ok(Some(node))
}

/// Holds the current session. Each load replaces the previous session
/// wholesale; a load that finishes after a newer one started is dropped.
#[derive(Debug, Default)]
pub struct SessionManager {
    current: Mutex<Option<MergeSession>>,
    generation: AtomicU64,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a new session. Returns `false` when a newer load superseded
    /// this one; the current session is then left as the newer load set it.
    pub async fn load(
        &self,
        source: &dyn RevisionSource,
        codec: &dyn DocumentCodec,
        hints: &Hints,
        paths: &[String],
    ) -> anyhow::Result<bool> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let session = MergeSession::load(source, codec, hints, paths).await?;

        let mut current = self.current.lock().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::info!(generation, session = %session.id(), "discarding superseded session load");
            return Ok(false);
        }
        tracing::info!(generation, session = %session.id(), files = paths.len(), "session loaded");
        *current = Some(session);
        Ok(true)
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Run `f` against the current session, if any.
    pub async fn with_session<R>(&self, f: impl FnOnce(&mut MergeSession) -> R) -> Option<R> {
        let mut current = self.current.lock().await;
        current.as_mut().map(f)
    }

    pub async fn clear(&self) {
        *self.current.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::source::MemoryRevisionSource;
    use modelmerge_engine::{AcceptOurs, AcceptTheirs};
    use std::sync::Arc;
    use tokio::sync::Notify;

    fn entity(attrs: &[&str]) -> String {
        let attrs: Vec<String> = attrs
            .iter()
            .map(|a| format!(r#"{{"$type": "Attribute", "name": "{a}"}}"#))
            .collect();
        format!(
            r#"{{"$type": "Entity", "name": "Customer", "attributes": [{}]}}"#,
            attrs.join(",")
        )
    }

    fn names(node: &Node) -> Vec<&str> {
        node.children("attributes")
            .iter()
            .filter_map(|a| a.str_prop("name"))
            .collect()
    }

    fn scenario() -> MemoryRevisionSource {
        MemoryRevisionSource::new()
            .with("shop.json", Revision::Base, entity(&["a1"]))
            .with("shop.json", Revision::Ours, entity(&["a1", "a2"]))
            .with("shop.json", Revision::Theirs, entity(&["a1", "a3"]))
            .with("same.json", Revision::Base, entity(&["x"]))
            .with("same.json", Revision::Ours, entity(&["x"]))
            .with("same.json", Revision::Theirs, entity(&["x"]))
    }

    fn paths() -> Vec<String> {
        vec!["shop.json".into(), "same.json".into()]
    }

    async fn load(source: &MemoryRevisionSource) -> MergeSession {
        MergeSession::load(source, &JsonCodec::default(), &Hints::default(), &paths())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_load_and_apply_selected() {
        let session = load(&scenario()).await;
        assert_eq!(session.files().len(), 2);
        assert!(session.file("same.json").unwrap().change().is_none());

        let merged = session.apply_selected();
        assert_eq!(names(&merged[0].1), vec!["a1", "a2", "a3"]);
        assert_eq!(names(&merged[1].1), vec!["x"]);

        let summary = session.summary();
        assert_eq!(summary[0].changes, 2);
        assert_eq!(summary[0].conflicts, 0);
        assert_eq!(summary[0].state, Some(CheckState::Checked));
        assert_eq!(summary[1].state, None);
    }

    #[tokio::test]
    async fn test_toggle_path_keeps_ours() {
        let mut session = load(&scenario()).await;
        session.toggle_path("shop.json", "Customer/attributes/a3", false).unwrap();
        let merged = session.apply_selected();
        assert_eq!(names(&merged[0].1), vec!["a1", "a2"]);
        assert_eq!(session.summary()[0].state, Some(CheckState::Partial));

        assert!(session.toggle_path("shop.json", "Customer/nope", true).is_err());
        assert!(session.toggle_path("other.json", "Customer", true).is_err());
    }

    #[tokio::test]
    async fn test_accept_all_and_fixed_resolvers() {
        let mut session = load(&scenario()).await;
        session.accept_all_ours();
        assert_eq!(names(&session.apply_selected()[0].1), vec!["a1", "a2"]);
        assert_eq!(names(&session.apply_with(&AcceptTheirs)[0].1), vec!["a1", "a2", "a3"]);
        assert_eq!(names(&session.apply_with(&AcceptOurs)[0].1), vec!["a1", "a2"]);
    }

    #[tokio::test]
    async fn test_missing_ours_is_an_error() {
        let source = MemoryRevisionSource::new().with("a.json", Revision::Theirs, entity(&["a"]));
        let err = MergeSession::load(&source, &JsonCodec::default(), &Hints::default(), &["a.json".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no ours revision"));
    }

    #[tokio::test]
    async fn test_parse_failure_rejects_load() {
        let source = scenario().with("shop.json", Revision::Theirs, "{ broken");
        let err = MergeSession::load(&source, &JsonCodec::default(), &Hints::default(), &paths())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("shop.json (theirs, json)"));
    }

    #[tokio::test]
    async fn test_write_merged() {
        let dir = tempfile::tempdir().unwrap();
        let session = load(&scenario()).await;
        let codec = JsonCodec::default();
        let written = MergeSession::write_merged(&session.apply_selected(), &codec, dir.path())
            .await
            .unwrap();
        assert_eq!(written.len(), 2);
        let text = std::fs::read_to_string(dir.path().join("shop.json")).unwrap();
        let node = codec.parse(&text).unwrap();
        assert_eq!(names(&node), vec!["a1", "a2", "a3"]);
    }

    /// Blocks every read until released.
    struct GatedSource {
        inner: MemoryRevisionSource,
        gate: Arc<Notify>,
    }

    #[async_trait::async_trait]
    impl RevisionSource for GatedSource {
        fn name(&self) -> &str {
            "gated"
        }

        async fn read(&self, path: &str, revision: Revision) -> anyhow::Result<Option<String>> {
            if revision == Revision::Base {
                self.gate.notified().await;
            }
            self.inner.read(path, revision).await
        }
    }

    #[tokio::test]
    async fn test_superseded_load_is_discarded() {
        let manager = Arc::new(SessionManager::new());
        let gate = Arc::new(Notify::new());
        let slow = GatedSource {
            inner: scenario(),
            gate: gate.clone(),
        };

        let m = manager.clone();
        let first = tokio::spawn(async move {
            m.load(&slow, &JsonCodec::default(), &Hints::default(), &paths()).await
        });
        tokio::task::yield_now().await;
        assert_eq!(manager.generation(), 1);

        let only_same = vec!["same.json".to_string()];
        let installed = manager
            .load(&scenario(), &JsonCodec::default(), &Hints::default(), &only_same)
            .await
            .unwrap();
        assert!(installed);

        // Release the first load: one notify per gated base read.
        gate.notify_one();
        tokio::task::yield_now().await;
        gate.notify_one();
        assert!(!first.await.unwrap().unwrap());

        let files = manager.with_session(|s| s.files().len()).await;
        assert_eq!(files, Some(1));
    }
}
