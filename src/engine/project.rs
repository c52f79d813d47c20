// Zenith Agent Engine — Project Store
// Owns the in-memory {html, css, javascript} triple the agent edits.
// Mutations are synchronous: the agent may run update_file → read_files
// back-to-back within one turn and must see its own write immediately.

use crate::atoms::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ── File targets ───────────────────────────────────────────────────────

/// The three recognized file keys. Everything else is rejected at the
/// tool boundary with `InvalidTarget`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileTarget {
    Html,
    Css,
    Javascript,
}

impl FileTarget {
    pub const ALL: [FileTarget; 3] = [FileTarget::Html, FileTarget::Css, FileTarget::Javascript];

    pub fn as_str(&self) -> &'static str {
        match self {
            FileTarget::Html => "html",
            FileTarget::Css => "css",
            FileTarget::Javascript => "javascript",
        }
    }

    /// Fixed on-disk name used by the export contract.
    pub fn export_file_name(&self) -> &'static str {
        match self {
            FileTarget::Html => "index.html",
            FileTarget::Css => "styles.css",
            FileTarget::Javascript => "script.js",
        }
    }
}

impl fmt::Display for FileTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileTarget {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "html" => Ok(FileTarget::Html),
            "css" => Ok(FileTarget::Css),
            "javascript" => Ok(FileTarget::Javascript),
            other => Err(EngineError::InvalidTarget(other.to_string())),
        }
    }
}

// ── Project ────────────────────────────────────────────────────────────

const DEFAULT_HTML: &str = "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n<title>New Page</title>\n</head>\n<body>\n<div class=\"min-h-screen flex items-center justify-center bg-gray-100\">\n  <h1 class=\"text-4xl font-bold text-gray-900\">Hello World</h1>\n</div>\n</body>\n</html>";

/// The three-file web project. All fields are always populated; a project
/// is either absent from the store or whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub html: String,
    pub css: String,
    pub javascript: String,
}

impl Default for Project {
    fn default() -> Self {
        Project {
            html: DEFAULT_HTML.to_string(),
            css: "/* Styles */".to_string(),
            javascript: "// Scripts".to_string(),
        }
    }
}

impl Project {
    pub fn file(&self, target: FileTarget) -> &str {
        match target {
            FileTarget::Html => &self.html,
            FileTarget::Css => &self.css,
            FileTarget::Javascript => &self.javascript,
        }
    }

    fn file_mut(&mut self, target: FileTarget) -> &mut String {
        match target {
            FileTarget::Html => &mut self.html,
            FileTarget::Css => &mut self.css,
            FileTarget::Javascript => &mut self.javascript,
        }
    }
}

// ── Store ──────────────────────────────────────────────────────────────

/// Outcome of a successful patch. `lenient` marks that the match only
/// succeeded after trimming whitespace from the search string —
/// informational, not an error.
#[derive(Debug, Clone)]
pub struct PatchOutcome {
    pub project: Project,
    pub lenient: bool,
}

/// Single-writer handle over the current project. The tool executor is the
/// only mutator, and only one turn runs at a time, so a plain mutex around
/// this struct gives strict read-after-write consistency.
#[derive(Debug, Default)]
pub struct ProjectStore {
    project: Option<Project>,
    revision: u64,
}

impl ProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any generation has happened yet.
    pub fn exists(&self) -> bool {
        self.project.is_some()
    }

    /// Monotonic counter bumped on every mutation. Callers compare
    /// revisions to decide whether the preview needs a refresh.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Snapshot of the current project, or the default starter page if
    /// nothing has been generated yet. Read-only.
    pub fn read_files(&self) -> Project {
        self.project.clone().unwrap_or_default()
    }

    /// Replace the named file wholesale. Returns the new full snapshot.
    pub fn update_file(&mut self, target: FileTarget, content: String) -> Project {
        let mut project = self.read_files();
        *project.file_mut(target) = content;
        self.revision += 1;
        self.project = Some(project.clone());
        project
    }

    /// Search-and-replace within the named file: exact substring match
    /// first, then a retry with the search string trimmed (flagged as a
    /// lenient match in the outcome).
    ///
    /// Only the FIRST occurrence is replaced. That is deliberate — the
    /// system prompt instructs the model to craft unique search strings,
    /// and replacing all occurrences would turn a sloppy search into a
    /// shotgun edit. Known sharp edge; see the doubled-occurrence test.
    pub fn patch_file(
        &mut self,
        target: FileTarget,
        search: &str,
        replacement: &str,
    ) -> Result<PatchOutcome, EngineError> {
        let mut project = self.read_files();
        let content = project.file(target);

        let (needle, lenient) = if content.contains(search) {
            (search, false)
        } else {
            let trimmed = search.trim();
            if content.contains(trimmed) {
                (trimmed, true)
            } else {
                return Err(EngineError::PatchNotFound(target.to_string()));
            }
        };

        let patched = content.replacen(needle, replacement, 1);
        *project.file_mut(target) = patched;
        self.revision += 1;
        self.project = Some(project.clone());
        Ok(PatchOutcome { project, lenient })
    }
}
