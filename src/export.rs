//! Writing a finished project to disk
//!
//! Each usable platform tree lands under `DIR/<platform>/`, shared project
//! files under `DIR/`, and a JCS `manifest.json` records every written file
//! with its BLAKE3 hash.

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

use appforge_state::{PlatformOutcome, ProjectState, WorkflowStatus};
use appforge_utils::atomic_write::write_file_atomic;
use appforge_utils::canonicalization::{content_hash, emit_jcs};
use appforge_utils::error::AppForgeError;
use appforge_utils::types::Platform;

pub const MANIFEST_FILE: &str = "manifest.json";

/// One file written by [`export_project`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportedFile {
    /// Path relative to the export root, `/`-separated.
    pub path: String,
    pub platform: Option<Platform>,
    pub blake3: String,
    pub bytes: usize,
}

/// Contents of `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportManifest {
    pub run_id: String,
    pub status: WorkflowStatus,
    pub platforms: Vec<Platform>,
    pub outcomes: BTreeMap<Platform, PlatformOutcome>,
    pub files: Vec<ExportedFile>,
}

/// Join `relative` onto `root`, refusing anything that could leave `root`.
pub fn resolve_within(root: &Utf8Path, relative: &str) -> Result<Utf8PathBuf, AppForgeError> {
    let refuse = |reason: &str| AppForgeError::Export {
        path: relative.to_string(),
        reason: reason.to_string(),
    };
    if relative.is_empty() {
        return Err(refuse("empty path"));
    }
    if relative.contains('\\') {
        return Err(refuse("backslashes are not allowed"));
    }

    let mut resolved = root.to_path_buf();
    for component in Utf8Path::new(relative).components() {
        match component {
            Utf8Component::Normal(part) => resolved.push(part),
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => return Err(refuse("path escapes the output directory")),
            Utf8Component::RootDir | Utf8Component::Prefix(_) => {
                return Err(refuse("absolute paths are not allowed"));
            }
        }
    }
    if resolved == root {
        return Err(refuse("path names the output directory itself"));
    }
    Ok(resolved)
}

/// Write the files of a `Done` project under `out_dir`.
///
/// Platforms whose outcome is not usable are skipped. Every path is checked
/// before anything is written, so a refused path leaves `out_dir` untouched.
pub fn export_project(
    state: &ProjectState,
    out_dir: &Utf8Path,
) -> Result<ExportManifest, AppForgeError> {
    if state.status != WorkflowStatus::Done {
        return Err(AppForgeError::Export {
            path: out_dir.to_string(),
            reason: format!("run ended in status {}, nothing to export", state.status),
        });
    }

    let mut planned: Vec<(String, Option<Platform>, &str)> = Vec::new();
    for platform in state.usable_platforms() {
        let Some(tree) = state.files.get(&platform) else {
            continue;
        };
        for (path, content) in tree {
            planned.push((format!("{}/{path}", platform.as_str()), Some(platform), content));
        }
    }
    for (path, content) in &state.project_files {
        planned.push((path.clone(), None, content));
    }

    let mut targets = Vec::with_capacity(planned.len());
    for (relative, platform, content) in planned {
        if relative == MANIFEST_FILE {
            return Err(AppForgeError::Export {
                path: relative,
                reason: "reserved for the export manifest".to_string(),
            });
        }
        let target = resolve_within(out_dir, &relative)?;
        targets.push((relative, platform, content, target));
    }

    let mut files = Vec::with_capacity(targets.len());
    for (relative, platform, content, target) in targets {
        write_file_atomic(&target, content).map_err(|e| AppForgeError::Export {
            path: target.to_string(),
            reason: format!("{e:#}"),
        })?;
        debug!(path = %target, "Wrote file");
        files.push(ExportedFile {
            path: relative,
            platform,
            blake3: content_hash(content),
            bytes: content.len(),
        });
    }

    let manifest = ExportManifest {
        run_id: state.run_id.clone(),
        status: state.status,
        platforms: state.platforms.iter().copied().collect(),
        outcomes: state.outcomes.clone(),
        files,
    };
    let manifest_path = out_dir.join(MANIFEST_FILE);
    let rendered = emit_jcs(&manifest).map_err(|e| AppForgeError::Export {
        path: manifest_path.to_string(),
        reason: format!("{e:#}"),
    })?;
    write_file_atomic(&manifest_path, &rendered).map_err(|e| AppForgeError::Export {
        path: manifest_path.to_string(),
        reason: format!("{e:#}"),
    })?;

    info!(
        out_dir = %out_dir,
        files = manifest.files.len(),
        "Exported project"
    );
    Ok(manifest)
}
