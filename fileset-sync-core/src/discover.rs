//! Local file discovery: resolve a glob against a root directory, then load
//! and hash every match concurrently.
//!
//! Matching is done on root-relative, slash-separated paths so that no
//! absolute path ever reaches persisted state. Supported syntax is that of
//! `globset` with `*` confined to one path segment: `*`, `?`, `[abc]`,
//! recursive `**` and `{a,b}` alternation.

use std::io;
use std::path::{Component, Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use tokio::task::JoinSet;
use tracing::{debug, error, info};
use walkdir::WalkDir;

use crate::context::OperationContext;
use crate::error::SyncError;
use crate::fileset::{Fileset, MatchedFile};

const GLOB_META: &[char] = &['*', '?', '[', ']', '{', '}', '!'];

/// Resolves `pattern` under `root` and loads every matching file.
///
/// Fails with [`SyncError::NoMatch`] when nothing matches. Any read failure
/// aborts the remaining reads and is returned; partial results are dropped.
pub async fn discover_and_load(
    root: &Path,
    pattern: &str,
    ctx: &OperationContext,
) -> Result<Fileset, SyncError> {
    let matcher = compile_pattern(pattern)?;
    let walk_root = root.join(literal_base(pattern));

    let root_owned = root.to_path_buf();
    let paths = ctx
        .guard(tokio::task::spawn_blocking(move || {
            match_paths(&root_owned, &walk_root, &matcher)
        }))
        .await?
        .map_err(|e| SyncError::Worker(e.to_string()))??;

    if paths.is_empty() {
        error!(pattern, root = %root.display(), "[DISCOVER] No files match pattern");
        return Err(SyncError::NoMatch {
            pattern: pattern.to_string(),
        });
    }
    info!(pattern, files = paths.len(), "[DISCOVER] Loading matched files");

    let mut tasks = JoinSet::new();
    for relative in paths {
        let absolute = root.join(&relative);
        tasks.spawn(load_file(absolute, relative));
    }

    let fileset = ctx.guard(collect(tasks)).await??;
    info!(
        pattern,
        files = fileset.len(),
        bytes = fileset.total_bytes(),
        "[DISCOVER] Loaded fileset"
    );
    Ok(fileset)
}

async fn load_file(absolute: PathBuf, relative: String) -> Result<MatchedFile, SyncError> {
    let bytes = tokio::fs::read(&absolute)
        .await
        .map_err(|source| SyncError::FileRead {
            path: relative.clone(),
            source,
        })?;
    let file = MatchedFile::new(relative, bytes);
    debug!(path = %file.path, digest = %file.digest, "[DISCOVER] Hashed file");
    Ok(file)
}

/// Drains the per-file tasks into one map. The set is the only producer
/// handle; returning early drops it, which aborts outstanding reads.
async fn collect(mut tasks: JoinSet<Result<MatchedFile, SyncError>>) -> Result<Fileset, SyncError> {
    let mut fileset = Fileset::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(file)) => fileset.extend([file]),
            Ok(Err(e)) => {
                error!(error = %e, "[DISCOVER] File load failed, aborting remaining reads");
                tasks.abort_all();
                return Err(e);
            }
            Err(join_err) => {
                tasks.abort_all();
                return Err(SyncError::Worker(join_err.to_string()));
            }
        }
    }
    Ok(fileset)
}

fn compile_pattern(pattern: &str) -> Result<GlobMatcher, SyncError> {
    let invalid = |reason: &str| SyncError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };

    let as_path = Path::new(pattern);
    if as_path.is_absolute() || pattern.starts_with('/') {
        return Err(invalid("pattern must be relative to the working directory"));
    }
    if as_path.components().any(|c| c == Component::ParentDir) {
        return Err(invalid("pattern must not contain `..` segments"));
    }

    let glob = GlobBuilder::new(pattern.trim_start_matches("./"))
        .literal_separator(true)
        .build()
        .map_err(|e| invalid(&e.to_string()))?;
    Ok(glob.compile_matcher())
}

/// The leading directories of `pattern` that contain no glob syntax.
fn literal_base(pattern: &str) -> PathBuf {
    let segments: Vec<&str> = pattern
        .trim_start_matches("./")
        .split('/')
        .collect();
    // The last segment names files, never a directory to descend from.
    let dirs = &segments[..segments.len().saturating_sub(1)];
    dirs.iter()
        .take_while(|s| !s.contains(GLOB_META))
        .filter(|s| !s.is_empty() && **s != ".")
        .collect()
}

/// Walks `walk_root` and returns the root-relative paths of matching files,
/// sorted.
///
/// Symlinks to directories are never descended into. A symlink that does not
/// resolve to a directory is treated as a file, so a dangling link surfaces
/// as a read failure instead of vanishing from the fileset.
fn match_paths(
    root: &Path,
    walk_root: &Path,
    matcher: &GlobMatcher,
) -> Result<Vec<String>, SyncError> {
    if !walk_root.is_dir() {
        return Ok(Vec::new());
    }

    let mut matched = Vec::new();
    for entry in WalkDir::new(walk_root).follow_links(false) {
        let entry = entry.map_err(|e| SyncError::FileRead {
            path: e
                .path()
                .map(|p| display_path(root, p))
                .unwrap_or_default(),
            source: e.into(),
        })?;
        let file_type = entry.file_type();
        let is_candidate =
            file_type.is_file() || (file_type.is_symlink() && !entry.path().is_dir());
        if !is_candidate {
            continue;
        }
        let relative = relative_path(root, entry.path())?;
        if matcher.is_match(&relative) {
            matched.push(relative);
        }
    }
    matched.sort();
    Ok(matched)
}

/// Slash-separated path of `path` below `root`. Names that are not valid
/// UTF-8 are rejected: they could not round-trip into an object key.
fn relative_path(root: &Path, path: &Path) -> Result<String, SyncError> {
    let stripped = path.strip_prefix(root).unwrap_or(path);
    let mut parts = Vec::new();
    for component in stripped.components() {
        if let Component::Normal(part) = component {
            let part = part.to_str().ok_or_else(|| SyncError::FileRead {
                path: display_path(root, path),
                source: io::Error::new(
                    io::ErrorKind::InvalidData,
                    "file name is not valid UTF-8",
                ),
            })?;
            parts.push(part);
        }
    }
    Ok(parts.join("/"))
}

/// Lossy rendering of `path` below `root`, for error messages only.
fn display_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}
