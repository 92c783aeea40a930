//! Walks a cloned tree and reads every eligible source file.
//!
//! Ignored directories are pruned with `filter_entry`, so the walker never
//! reads their contents. Files are accepted by extension, optionally
//! filtered further by relative-path globs, and read as UTF-8. A file that
//! cannot be read lands in [`LoadReport::skipped`]; the walk goes on.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

use crate::config::LoaderConfig;
use crate::error::{CompanionError, Result};
use crate::models::{Document, LoadReport, SkippedFile};

/// Compiled allow/deny rules.
#[derive(Debug, Clone)]
pub struct LoadRules {
    extensions: Vec<String>,
    ignored_dirs: HashSet<String>,
    exclude: GlobSet,
    max_file_bytes: u64,
}

impl LoadRules {
    pub fn from_config(config: &LoaderConfig) -> Result<Self> {
        Ok(Self {
            extensions: config.extensions.clone(),
            ignored_dirs: config.ignored_dirs.iter().cloned().collect(),
            exclude: build_globset(&config.exclude_globs)?,
            max_file_bytes: config.max_file_bytes,
        })
    }

    fn is_ignored_dir(&self, entry: &DirEntry) -> bool {
        entry.file_type().is_dir()
            && entry.depth() > 0
            && self
                .ignored_dirs
                .contains(entry.file_name().to_string_lossy().as_ref())
    }

    fn has_allowed_extension(&self, file_name: &str) -> bool {
        self.extensions.iter().any(|ext| file_name.ends_with(ext.as_str()))
    }
}

impl Default for LoadRules {
    fn default() -> Self {
        let config = LoaderConfig::default();
        Self {
            extensions: config.extensions,
            ignored_dirs: config.ignored_dirs.into_iter().collect(),
            exclude: GlobSet::empty(),
            max_file_bytes: config.max_file_bytes,
        }
    }
}

/// Load every eligible file under `root`.
///
/// Traversal is sorted by file name, so the document order is stable for a
/// fixed tree.
pub fn load_documents(root: &Path, rules: &LoadRules) -> Result<LoadReport> {
    if !root.is_dir() {
        return Err(CompanionError::NotFound(root.to_path_buf()));
    }

    let mut report = LoadReport::default();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !rules.is_ignored_dir(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable entry");
                report.skipped.push(SkippedFile {
                    path,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        report.entries_visited += 1;

        if !entry.file_type().is_file() {
            continue;
        }

        let file_name = entry.file_name().to_string_lossy();
        if !rules.has_allowed_extension(&file_name) {
            continue;
        }

        let path = entry.path();
        let relative = relative_path(root, path);
        if rules.exclude.is_match(&relative) {
            continue;
        }

        match read_document(path, relative, rules.max_file_bytes) {
            Ok(doc) => report.documents.push(doc),
            Err(CompanionError::FileRead { path, reason }) => {
                tracing::warn!(path = %path.display(), %reason, "skipping file");
                report.skipped.push(SkippedFile { path, reason });
            }
            Err(e) => return Err(e),
        }
    }

    tracing::info!(
        documents = report.documents.len(),
        skipped = report.skipped.len(),
        "loaded documents"
    );
    Ok(report)
}

fn read_document(path: &Path, source_path: String, max_bytes: u64) -> Result<Document> {
    let file_read = |reason: String| CompanionError::FileRead {
        path: path.to_path_buf(),
        reason,
    };

    let size = std::fs::metadata(path)
        .map_err(|e| file_read(e.to_string()))?
        .len();
    if size > max_bytes {
        return Err(file_read(format!(
            "file is {size} bytes, larger than the {max_bytes} byte limit"
        )));
    }

    let bytes = std::fs::read(path).map_err(|e| file_read(e.to_string()))?;
    let content = String::from_utf8(bytes).map_err(|e| file_read(format!("not valid UTF-8: {e}")))?;

    Ok(Document {
        source_path,
        content,
    })
}

fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| CompanionError::Config(format!("invalid glob '{pattern}': {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| CompanionError::Config(e.to_string()))
}
