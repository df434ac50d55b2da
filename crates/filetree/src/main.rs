use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::cell::Cell;
use std::fs::{self, File};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Mutex;
use tokio::runtime::Handle;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use filetree::settings::{LogSettings, Settings};
use filetree::sink::NullSink;
use filetree::snapshot::EntrySnapshot;
use filetree::ui::App;
use filetree::{EntryId, FsLister, ScanQueue, Tree};

#[derive(Parser)]
#[command(name = "filetree")]
#[command(about = "A directory browser that loads lazily and stays in sync", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to settings file
    #[arg(short = 'c', long, global = true)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the interactive browser
    Browse {
        /// Directory to browse (defaults to the current directory)
        path: Option<String>,
    },
    /// Print a directory tree
    Tree {
        /// Directory to print
        path: String,
        /// How many levels below the directory to show
        #[arg(short, long, default_value_t = 1)]
        depth: usize,
        /// Print a JSON snapshot instead of an indented listing
        #[arg(long)]
        json: bool,
    },
    /// Look up a path below a root, loading only the directories on the way
    Resolve {
        /// Root directory
        root: String,
        /// Path to find, absolute or relative to the root
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings_path = if let Some(config) = &cli.config {
        PathBuf::from(shellexpand::tilde(config).to_string())
    } else {
        Settings::default_path()
    };
    let settings = Settings::load(&settings_path).context("Failed to load settings")?;

    match cli.command {
        None => browse(settings, None).await,
        Some(Commands::Browse { path }) => browse(settings, path).await,
        Some(Commands::Tree { path, depth, json }) => {
            init_tracing(&settings.log, false)?;
            print_tree(&path, depth, json, &settings.ui.unsaved_marker)
        }
        Some(Commands::Resolve { root, path }) => {
            init_tracing(&settings.log, false)?;
            resolve(&root, &path)
        }
    }
}

async fn browse(settings: Settings, path: Option<String>) -> Result<()> {
    init_tracing(&settings.log, true)?;

    let root = expand_dir(path.as_deref().unwrap_or("."))?;
    let mut app = App::new(settings, &root, Handle::current())?;
    app.run().await
}

/// One-shot commands log to stderr. The browser owns the terminal, so it
/// logs to the configured file or not at all.
fn init_tracing(log: &LogSettings, interactive: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&log.filter))
        .with_context(|| format!("Invalid log filter '{}'", log.filter))?;

    if !interactive {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .try_init()?;
        return Ok(());
    }

    let Some(log_path) = &log.file else {
        return Ok(());
    };
    let log_path = PathBuf::from(shellexpand::tilde(&log_path.to_string_lossy()).to_string());
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let file = File::options()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .with(filter)
        .try_init()?;
    Ok(())
}

fn expand_dir(path: &str) -> Result<PathBuf> {
    let expanded = shellexpand::tilde(path).to_string();
    fs::canonicalize(&expanded).with_context(|| format!("Failed to resolve {}", expanded))
}

/// Loads `path` down to `depth` levels with scans run in place, then prints
/// what was loaded.
fn print_tree(path: &str, depth: usize, json: bool, marker: &str) -> Result<()> {
    let root_path = expand_dir(path)?;

    let queue = ScanQueue::new();
    let mut tree = Tree::new(NullSink, queue.clone());
    let root = tree.load(&root_path, None)?;
    tree.init_to_depth(root, depth.saturating_sub(1), None);
    let scans = queue.run_until_idle(&mut tree, &FsLister);
    info!(path = %root_path.display(), scans, entries = tree.len(), "tree loaded");

    if let Some(error) = tree.dir(root).and_then(|d| d.error()) {
        bail!("{}", error);
    }

    let snapshot = tree
        .snapshot(root, depth)
        .context("Tree has no root entry")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print_snapshot(&snapshot, 0, marker);
    }
    Ok(())
}

fn print_snapshot(entry: &EntrySnapshot, depth: usize, marker: &str) {
    let mut line = format!("{}{} {}", "  ".repeat(depth), entry.class.icon(), entry.name);
    if entry.unsaved {
        line.push(' ');
        line.push_str(marker);
    }
    if let Some(error) = &entry.error {
        line.push_str(&format!("  ({})", error));
    }
    println!("{}", line);

    for child in &entry.children {
        print_snapshot(child, depth + 1, marker);
    }
}

fn resolve(root: &str, path: &str) -> Result<()> {
    let root_path = expand_dir(root)?;
    let target = shellexpand::tilde(path).to_string();

    let queue = ScanQueue::new();
    let mut tree = Tree::new(NullSink, queue.clone());
    tree.load(&root_path, None)?;

    let found: Rc<Cell<Option<EntryId>>> = Rc::default();
    let visited = found.clone();
    tree.resolve_path(
        &target,
        Box::new(move |_tree: &mut Tree, entry: Option<EntryId>| {
            visited.set(entry);
            true
        }),
    );
    let scans = queue.run_until_idle(&mut tree, &FsLister);
    info!(path = %target, scans, "resolution finished");

    let Some(entry) = found.get().and_then(|id| tree.entry(id)) else {
        bail!("{} not found under {}", target, root_path.display());
    };

    let kind = if entry.is_dir() { "directory" } else { "file" };
    println!("{}\t{}", kind, tree.relative_path(entry.path()));
    Ok(())
}
