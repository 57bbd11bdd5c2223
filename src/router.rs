//! Document routing: decides which host documents belong to a session.
//!
//! A session is configured with a document selector — an ordered set of match
//! rules over language identifier, URI scheme, and workspace-relative glob
//! pattern. The lifecycle controller consults [`DocumentSelector::matches`]
//! synchronously for every document event the host reports, and only matching
//! documents are forwarded to the language server.
//!
//! Match policy: an absent rule field is a wildcard; a rule matches a document
//! if every field it specifies matches (AND across fields); the selector
//! matches if any rule matches (OR across rules).

use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use lsp_types::Url;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Identity of a host document, as delivered with document events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDocument {
    /// Document URI.
    pub uri: Url,
    /// Language identifier declared by the host (e.g. `starlark`).
    pub language_id: String,
    /// Host-side content version, monotonically increasing per document.
    pub version: i32,
}

impl TextDocument {
    /// Convenience constructor.
    pub fn new(uri: Url, language_id: impl Into<String>, version: i32) -> Self {
        Self {
            uri,
            language_id: language_id.into(),
            version,
        }
    }
}

/// One match rule of a document selector.
///
/// All fields are optional; an all-empty rule matches every document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectorRule {
    /// Language identifier to require, e.g. `starlark`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// URI scheme to require, e.g. `file`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    /// Glob pattern over the document path, anchored to the workspace root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl SelectorRule {
    /// Rule matching a language identifier under any scheme or path.
    pub fn language(language: impl Into<String>) -> Self {
        Self {
            language: Some(language.into()),
            ..Self::default()
        }
    }

    /// Rule matching a workspace-relative glob pattern under the given scheme.
    pub fn pattern(scheme: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            scheme: Some(scheme.into()),
            pattern: Some(pattern.into()),
            ..Self::default()
        }
    }
}

/// A rule with its glob compiled, ready for matching.
#[derive(Debug, Clone)]
struct CompiledRule {
    language: Option<String>,
    scheme: Option<String>,
    glob: Option<GlobMatcher>,
}

/// Compiled document selector for one session.
///
/// Immutable once the session is configured; glob patterns are compiled at
/// construction so malformed patterns fail early as configuration errors.
#[derive(Debug, Clone)]
pub struct DocumentSelector {
    workspace_root: PathBuf,
    rules: Vec<CompiledRule>,
}

/// Compiles a single glob with standard filesystem semantics: `*` and `?` do
/// not cross path separators, `**` does, bracket classes are supported.
pub(crate) fn compile_glob(pattern: &str) -> crate::error::Result<GlobMatcher> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|err| Error::Config(format!("invalid glob pattern '{pattern}': {err}")))
}

/// Reduces a document URI to the path the selector globs are matched against.
/// File URIs resolve relative to the workspace root; file paths outside the
/// root yield `None` and never match a glob. URIs under other schemes fall
/// back to their raw path.
pub(crate) fn match_path(uri: &Url, workspace_root: &Path) -> Option<PathBuf> {
    match uri.to_file_path() {
        Ok(path) => path
            .strip_prefix(workspace_root)
            .ok()
            .map(Path::to_path_buf),
        Err(()) => Some(PathBuf::from(uri.path().trim_start_matches('/'))),
    }
}

impl DocumentSelector {
    /// Compiles a selector from its configured rules.
    ///
    /// ## Errors
    /// Returns a configuration error if any rule carries an invalid glob.
    pub fn compile(rules: &[SelectorRule], workspace_root: &Path) -> crate::error::Result<Self> {
        let rules = rules
            .iter()
            .map(|rule| {
                let glob = rule.pattern.as_deref().map(compile_glob).transpose()?;
                Ok(CompiledRule {
                    language: rule.language.clone(),
                    scheme: rule.scheme.clone(),
                    glob,
                })
            })
            .collect::<crate::error::Result<Vec<_>>>()?;
        Ok(Self {
            workspace_root: workspace_root.to_path_buf(),
            rules,
        })
    }

    /// Returns true if any rule matches the document.
    ///
    /// Pure function over the document's language identifier, URI scheme, and
    /// path; no side effects.
    pub fn matches(&self, doc: &TextDocument) -> bool {
        let path = match_path(&doc.uri, &self.workspace_root);
        self.rules.iter().any(|rule| {
            if let Some(language) = &rule.language
                && *language != doc.language_id
            {
                return false;
            }
            if let Some(scheme) = &rule.scheme
                && scheme != doc.uri.scheme()
            {
                return false;
            }
            if let Some(glob) = &rule.glob {
                let Some(path) = &path else { return false };
                if !glob.is_match(path) {
                    return false;
                }
            }
            true
        })
    }

    /// Number of configured rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True if the selector has no rules (and therefore matches nothing).
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
