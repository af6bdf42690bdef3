//! `notify` adapter: turns filesystem notifications into [`WatchEvent`]s on
//! an unbounded channel. The callback runs on notify's own thread and never
//! blocks; all processing happens on the dispatcher task.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use meetnotes::{WatchEvent, WatchEventKind};
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Start watching `root`. Dropping the returned watcher stops notifications
/// and, once the last sender is gone, closes the channel.
pub fn spawn_watcher(
    root: &Path,
    recursive: bool,
    tx: mpsc::UnboundedSender<WatchEvent>,
) -> Result<RecommendedWatcher> {
    let mut watcher: RecommendedWatcher = Watcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for watch_event in translate(&event) {
                    if tx.send(watch_event).is_err() {
                        // Dispatcher gone; nothing left to deliver to.
                        return;
                    }
                }
            }
            Err(err) => warn!(error = %err, "watch error"),
        },
        Config::default(),
    )
    .context("creating filesystem watcher")?;

    let mode = if recursive {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    };
    watcher
        .watch(root, mode)
        .with_context(|| format!("watching {}", root.display()))?;
    debug!(root = %root.display(), recursive, "watch registered");
    Ok(watcher)
}

/// Map one notify event to zero or more watch events.
pub fn translate(event: &Event) -> Vec<WatchEvent> {
    let folder_hint = matches!(
        event.kind,
        EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder)
    );

    let kinds: Vec<(PathBuf, WatchEventKind)> = match event.kind {
        EventKind::Create(_) => with_kind(&event.paths, WatchEventKind::Created),
        EventKind::Remove(_) => with_kind(&event.paths, WatchEventKind::Deleted),
        // Renames: the old name disappears, the new one appears.
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            with_kind(&event.paths, WatchEventKind::Deleted)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            with_kind(&event.paths, WatchEventKind::Created)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
            [from, to] => vec![
                (from.clone(), WatchEventKind::Deleted),
                (to.clone(), WatchEventKind::Created),
            ],
            paths => with_kind(paths, WatchEventKind::Modified),
        },
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) | EventKind::Any => with_kind(&event.paths, WatchEventKind::Modified),
        EventKind::Access(_) | EventKind::Other => Vec::new(),
    };

    kinds
        .into_iter()
        .map(|(path, kind)| {
            let is_directory = folder_hint || path.is_dir();
            WatchEvent {
                path,
                kind,
                is_directory,
            }
        })
        .collect()
}

fn with_kind(paths: &[PathBuf], kind: WatchEventKind) -> Vec<(PathBuf, WatchEventKind)> {
    paths.iter().map(|p| (p.clone(), kind)).collect()
}
