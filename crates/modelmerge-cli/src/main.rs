use clap::{Parser, Subcommand};
use modelmerge_core::config::{Settings, Strategy};
use modelmerge_core::logging::init_logging;
use modelmerge_core::{DirRevisionSource, JsonCodec, MergeSession};
use modelmerge_engine::{Change, ChangeKind, PropDelta, SelectionStore};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "modelmerge",
    about = "Structural three-way merge for model documents"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the settings file (hints, logging, merge defaults)
    #[arg(long, default_value = ".modelmerge/settings.json")]
    config: PathBuf,

    /// Directory for log files
    #[arg(long, default_value = ".modelmerge/logs")]
    log_dir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the change tree of each file
    Diff {
        /// Directory holding base/, ours/ and theirs/ revisions
        root: PathBuf,
        /// Document paths relative to each revision directory
        #[arg(required = true)]
        files: Vec<String>,
        /// Print the change trees as JSON
        #[arg(long)]
        json: bool,
    },
    /// Count changes and conflicts per file
    Status {
        root: PathBuf,
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Merge and write the resulting documents
    Apply {
        root: PathBuf,
        #[arg(required = true)]
        files: Vec<String>,
        /// default | ours | theirs (falls back to settings)
        #[arg(long)]
        strategy: Option<Strategy>,
        /// Take theirs for FILE:ID_PATH and everything below it
        #[arg(long = "take-theirs", value_name = "FILE:ID_PATH")]
        take_theirs: Vec<String>,
        /// Keep ours for FILE:ID_PATH and everything below it
        #[arg(long = "keep-ours", value_name = "FILE:ID_PATH")]
        keep_ours: Vec<String>,
        /// Output directory for merged documents
        #[arg(long)]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load_or_default(&cli.config)?;
    let _guard = init_logging(&cli.log_dir, &settings.logging)?;

    match &cli.command {
        Commands::Diff { root, files, json } => cmd_diff(&settings, root, files, *json).await,
        Commands::Status { root, files } => cmd_status(&settings, root, files).await,
        Commands::Apply {
            root,
            files,
            strategy,
            take_theirs,
            keep_ours,
            out,
        } => {
            let strategy = strategy.unwrap_or(settings.merge.default_strategy);
            cmd_apply(&settings, root, files, strategy, take_theirs, keep_ours, out).await
        }
    }
}

async fn load_session(settings: &Settings, root: &Path, files: &[String]) -> anyhow::Result<MergeSession> {
    let source = DirRevisionSource::new(root);
    tracing::info!(root = %root.display(), files = files.len(), "loading merge session");
    MergeSession::load(&source, &JsonCodec::default(), &settings.hints, files).await
}

async fn cmd_diff(settings: &Settings, root: &Path, files: &[String], json: bool) -> anyhow::Result<()> {
    let session = load_session(settings, root, files).await?;

    if json {
        let trees: serde_json::Map<String, serde_json::Value> = session
            .files()
            .iter()
            .map(|f| -> anyhow::Result<(String, serde_json::Value)> {
                Ok((f.path.clone(), serde_json::to_value(f.change())?))
            })
            .collect::<anyhow::Result<_>>()?;
        println!("{}", serde_json::to_string_pretty(&trees)?);
        return Ok(());
    }

    for f in session.files() {
        println!("{}", f.path);
        match f.change() {
            Some(change) => print!("{}", render_tree(session.selection(), &f.path, change)),
            None => println!("  (no changes)"),
        }
        println!();
    }
    Ok(())
}

async fn cmd_status(settings: &Settings, root: &Path, files: &[String]) -> anyhow::Result<()> {
    let session = load_session(settings, root, files).await?;

    println!("Merge Status");
    println!("============");
    println!();
    for s in session.summary() {
        let mark = s.state.map_or("   ", |st| st.mark());
        println!(
            "{} {}: {} change(s), {} conflict(s)",
            mark, s.path, s.changes, s.conflicts
        );
    }
    Ok(())
}

async fn cmd_apply(
    settings: &Settings,
    root: &Path,
    files: &[String],
    strategy: Strategy,
    take_theirs: &[String],
    keep_ours: &[String],
    out: &Path,
) -> anyhow::Result<()> {
    let mut session = load_session(settings, root, files).await?;

    match strategy {
        Strategy::Default => {}
        Strategy::Ours => session.accept_all_ours(),
        Strategy::Theirs => session.accept_all_theirs(),
    }
    for (target, checked) in take_theirs
        .iter()
        .map(|s| (s, true))
        .chain(keep_ours.iter().map(|s| (s, false)))
    {
        let (file, id_path) = target
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("expected FILE:ID_PATH, got '{target}'"))?;
        session.toggle_path(file, id_path, checked)?;
    }

    let merged = session.apply_selected();
    let written = MergeSession::write_merged(&merged, &JsonCodec::default(), out).await?;
    for path in &written {
        println!("wrote {}", path.display());
    }
    tracing::info!(strategy = ?strategy, files = written.len(), "merge applied");
    Ok(())
}

/// Indented change tree with checkbox marks, one change per line.
fn render_tree(selection: &SelectionStore, file: &str, change: &Change) -> String {
    let mut out = String::new();
    render_change(&mut out, selection, file, change, 1);
    out
}

fn render_change(out: &mut String, selection: &SelectionStore, file: &str, change: &Change, depth: usize) {
    let indent = "  ".repeat(depth);
    let mark = selection.state(file, change).mark();
    let conflict = if change.conflicts { " !" } else { "" };
    if change.group {
        let _ = writeln!(out, "{indent}{mark} {}{conflict}", change.label);
    } else {
        let _ = writeln!(
            out,
            "{indent}{mark} {} {} {}{conflict}",
            kind_symbol(change.kind),
            change.node_kind,
            change.label
        );
    }
    if let Some(details) = &change.details {
        for (prop, delta) in details {
            let flag = if delta.is_conflict() { " (conflict)" } else { "" };
            let _ = writeln!(out, "{indent}      {prop}: {}{flag}", describe(delta));
        }
    }
    for child in &change.children {
        render_change(out, selection, file, child, depth + 1);
    }
}

fn kind_symbol(kind: ChangeKind) -> &'static str {
    match kind {
        ChangeKind::Add => "+",
        ChangeKind::Remove => "-",
        ChangeKind::Update => "~",
        ChangeKind::Rename => ">",
    }
}

fn describe(delta: &PropDelta) -> String {
    let show = |v: &Option<serde_json::Value>| v.as_ref().map_or_else(|| "(absent)".to_string(), |v| v.to_string());
    format!(
        "base {} | ours {} | theirs {}",
        show(&delta.base),
        show(&delta.ours),
        show(&delta.theirs)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelmerge_engine::{diff3, Hints, Node};

    #[test]
    fn test_render_tree_marks() {
        let attr = |n: &str| Node::new("Attribute").with_scalar("name", n);
        let entity = |attrs: Vec<Node>| Node::new("Entity").with_scalar("name", "Customer").with_children("attributes", attrs);
        let base = entity(vec![attr("a1")]);
        let ours = entity(vec![attr("a1"), attr("a2")]);
        let theirs = entity(vec![attr("a1"), attr("a3")]);
        let diff = diff3(Some(&base), Some(&ours), Some(&theirs), &Hints::default());
        let change = diff.change().unwrap();
        let mut store = SelectionStore::load([("m.json", change)]);
        store.toggle("m.json", &change.children[0].children[1], false);

        let text = render_tree(&store, "m.json", change);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "  [~] ~ Entity Customer",
                "    [~] attributes",
                "      [x] + Attribute a2",
                "            name: base (absent) | ours \"a2\" | theirs (absent)",
                "      [ ] + Attribute a3",
                "            name: base (absent) | ours (absent) | theirs \"a3\"",
            ]
        );
    }

    #[test]
    fn test_describe_absent_values() {
        let delta = PropDelta {
            base: None,
            ours: Some(serde_json::json!("x")),
            theirs: None,
        };
        assert_eq!(describe(&delta), "base (absent) | ours \"x\" | theirs (absent)");
    }
}
