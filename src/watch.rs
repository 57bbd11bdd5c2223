//! File watch bridge: translates host filesystem events into
//! `workspace/didChangeWatchedFiles` notifications.
//!
//! The host owns the actual filesystem watcher; this module only decides
//! which raw events are relevant to the session (glob patterns with an
//! implicit `file` scheme) and shapes them into protocol notifications.
//! Each qualifying raw event yields exactly one notification — no batching,
//! no deduplication. The bridge holds no queue: the lifecycle controller
//! drops events that arrive while the session is not running.

use std::path::{Path, PathBuf};

use globset::GlobMatcher;
use lsp_types::{DidChangeWatchedFilesParams, FileChangeType, FileEvent, Url};

use crate::router::{compile_glob, match_path};

/// Kind of a host filesystem event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    /// A file matching a watch pattern was created.
    Created,
    /// A file matching a watch pattern was modified.
    Changed,
    /// A file matching a watch pattern was deleted.
    Deleted,
}

impl From<FileEventKind> for FileChangeType {
    fn from(kind: FileEventKind) -> Self {
        match kind {
            FileEventKind::Created => FileChangeType::CREATED,
            FileEventKind::Changed => FileChangeType::CHANGED,
            FileEventKind::Deleted => FileChangeType::DELETED,
        }
    }
}

/// Handle to one registered watch pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchHandle(usize);

/// A registered watch pattern with its compiled glob.
#[derive(Debug, Clone)]
struct Watch {
    pattern: String,
    glob: GlobMatcher,
}

/// The set of watch patterns registered for one session.
///
/// Immutable once the session is configured (patterns are registered at
/// construction, before the session starts).
#[derive(Debug, Clone)]
pub struct WatchSet {
    workspace_root: PathBuf,
    watches: Vec<Watch>,
}

impl WatchSet {
    /// Creates an empty watch set anchored to the workspace root.
    pub fn new(workspace_root: &Path) -> Self {
        Self {
            workspace_root: workspace_root.to_path_buf(),
            watches: Vec::new(),
        }
    }

    /// Compiles a watch set from configured glob patterns.
    ///
    /// ## Errors
    /// Returns a configuration error for an invalid glob.
    pub fn compile(patterns: &[String], workspace_root: &Path) -> crate::error::Result<Self> {
        let mut set = Self::new(workspace_root);
        for pattern in patterns {
            set.register(pattern)?;
        }
        Ok(set)
    }

    /// Registers one watch pattern.
    ///
    /// ## Errors
    /// Returns a configuration error if the glob does not compile.
    pub fn register(&mut self, pattern: &str) -> crate::error::Result<WatchHandle> {
        let glob = compile_glob(pattern)?;
        self.watches.push(Watch {
            pattern: pattern.to_string(),
            glob,
        });
        Ok(WatchHandle(self.watches.len() - 1))
    }

    /// Registered pattern strings, in registration order.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.watches.iter().map(|watch| watch.pattern.as_str())
    }

    /// True if no patterns are registered.
    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    /// Returns true if the URI is in scope for this watch set.
    ///
    /// Watch patterns carry an implicit `file` scheme; URIs under any other
    /// scheme never match.
    pub fn matches(&self, uri: &Url) -> bool {
        if uri.scheme() != "file" {
            return false;
        }
        let Some(path) = match_path(uri, &self.workspace_root) else {
            return false;
        };
        self.watches.iter().any(|watch| watch.glob.is_match(&path))
    }

    /// Shapes one raw host event into a protocol notification payload, or
    /// `None` if the event is out of scope.
    pub fn to_notification(
        &self,
        uri: &Url,
        kind: FileEventKind,
    ) -> Option<DidChangeWatchedFilesParams> {
        if !self.matches(uri) {
            return None;
        }
        Some(DidChangeWatchedFilesParams {
            changes: vec![FileEvent {
                uri: uri.clone(),
                typ: kind.into(),
            }],
        })
    }
}
