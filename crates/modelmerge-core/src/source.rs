use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

/// One of the three revisions of a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Revision {
    Base,
    Ours,
    Theirs,
}

impl Revision {
    pub const ALL: [Revision; 3] = [Revision::Base, Revision::Ours, Revision::Theirs];

    pub fn as_str(self) -> &'static str {
        match self {
            Revision::Base => "base",
            Revision::Ours => "ours",
            Revision::Theirs => "theirs",
        }
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where revision contents come from.
#[async_trait::async_trait]
pub trait RevisionSource: Send + Sync {
    /// Human-readable source name for logs.
    fn name(&self) -> &str;

    /// Text of `path` at `revision`; `None` when the file does not exist there.
    async fn read(&self, path: &str, revision: Revision) -> anyhow::Result<Option<String>>;
}

/// Reads `<root>/<base|ours|theirs>/<path>`.
#[derive(Debug, Clone)]
pub struct DirRevisionSource {
    root: PathBuf,
}

impl DirRevisionSource {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, path: &str, revision: Revision) -> anyhow::Result<PathBuf> {
        Ok(self.root.join(revision.as_str()).join(relative(path)?))
    }
}

#[async_trait::async_trait]
impl RevisionSource for DirRevisionSource {
    fn name(&self) -> &str {
        "dir"
    }

    async fn read(&self, path: &str, revision: Revision) -> anyhow::Result<Option<String>> {
        let full = self.path_for(path, revision)?;
        match fs::read_to_string(&full).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(anyhow::anyhow!("failed to read {}: {}", full.display(), e)),
        }
    }
}

/// In-memory revisions, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemoryRevisionSource {
    files: HashMap<(Revision, String), String>,
}

impl MemoryRevisionSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: &str, revision: Revision, text: impl Into<String>) -> Self {
        self.insert(path, revision, text);
        self
    }

    pub fn insert(&mut self, path: &str, revision: Revision, text: impl Into<String>) {
        self.files.insert((revision, path.to_string()), text.into());
    }
}

#[async_trait::async_trait]
impl RevisionSource for MemoryRevisionSource {
    fn name(&self) -> &str {
        "memory"
    }

    async fn read(&self, path: &str, revision: Revision) -> anyhow::Result<Option<String>> {
        Ok(self.files.get(&(revision, path.to_string())).cloned())
    }
}

/// Validate a document path: relative, no `..`.
pub fn relative(path: &str) -> anyhow::Result<&Path> {
    let p = Path::new(path);
    if path.is_empty() {
        anyhow::bail!("empty document path");
    }
    for component in p.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => anyhow::bail!("document path must be relative without '..': {path}"),
        }
    }
    Ok(p)
}

/// Write `content` to `out_dir/path` via a temp file and rename.
pub async fn write_atomic(out_dir: &Path, path: &str, content: &str) -> anyhow::Result<PathBuf> {
    let target = out_dir.join(relative(path)?);
    let parent = target.parent().unwrap_or(out_dir);
    fs::create_dir_all(parent).await?;
    let file_name = target
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{file_name}.tmp"));
    fs::write(&tmp, content).await?;
    fs::rename(&tmp, &target).await?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dir_source_reads_revisions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("ours/models")).unwrap();
        std::fs::write(dir.path().join("ours/models/shop.json"), "{}").unwrap();

        let source = DirRevisionSource::new(dir.path());
        assert_eq!(
            source.read("models/shop.json", Revision::Ours).await.unwrap().as_deref(),
            Some("{}")
        );
        assert_eq!(source.read("models/shop.json", Revision::Base).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_dir_source_rejects_escaping_paths() {
        let source = DirRevisionSource::new("/tmp");
        assert!(source.read("../etc/passwd", Revision::Ours).await.is_err());
        assert!(source.read("/etc/passwd", Revision::Ours).await.is_err());
        assert!(source.read("", Revision::Ours).await.is_err());
    }

    #[tokio::test]
    async fn test_memory_source() {
        let source = MemoryRevisionSource::new().with("a.json", Revision::Theirs, "x");
        assert_eq!(source.read("a.json", Revision::Theirs).await.unwrap().as_deref(), Some("x"));
        assert_eq!(source.read("a.json", Revision::Ours).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_write_atomic_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_atomic(dir.path(), "nested/out.json", "{}\n").await.unwrap();
        assert_eq!(std::fs::read_to_string(&written).unwrap(), "{}\n");
        assert!(!dir.path().join("nested/.out.json.tmp").exists());
    }
}
