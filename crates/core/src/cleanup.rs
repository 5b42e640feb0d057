//! Post-delivery cleanup of temporary files and directories.
//!
//! Cleanup never fails: every deletion error is logged and counted in the
//! [`CleanupReport`]. A path that is already gone counts as cleaned, so
//! concurrent jobs sweeping overlapping directories do not trip over each
//! other, and a second sweep over the same state removes nothing.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::{Duration, SystemTime};

use regex::Regex;
use walkdir::WalkDir;

use crate::error::CoreError;

/// Files this recent are treated as belonging to the current job under
/// conservative mode.
pub const RECENCY_WINDOW: Duration = Duration::from_secs(300);

/// Name prefixes of generated artifacts that are always removed.
pub const GENERATED_FILE_PREFIXES: &[&str] = &["pulid_", "video_"];

/// Content-hash directory names: 32+ lowercase hex digits or dashes.
static HASH_DIR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-f-]{32,}$").expect("valid regex"));

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// How much of the output directories a sweep may remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CleanupMode {
    /// Only files named after the request or created within
    /// [`RECENCY_WINDOW`].
    #[default]
    Conservative,
    /// Every non-protected file and every directory.
    Aggressive,
}

impl FromStr for CleanupMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conservative" => Ok(Self::Conservative),
            "aggressive" => Ok(Self::Aggressive),
            other => Err(CoreError::Validation(format!(
                "Unknown cleanup mode '{other}'. Must be 'conservative' or 'aggressive'"
            ))),
        }
    }
}

impl fmt::Display for CleanupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Conservative => "conservative",
            Self::Aggressive => "aggressive",
        })
    }
}

// ---------------------------------------------------------------------------
// Plan & report
// ---------------------------------------------------------------------------

/// Paths to clean after a successful delivery.
#[derive(Debug, Clone)]
pub struct CleanupPlan {
    pub request_id: String,
    /// Removed unconditionally: the workflow file and tracked outputs.
    pub always_delete: Vec<PathBuf>,
    /// Swept under `mode`.
    pub output_dirs: Vec<PathBuf>,
    pub mode: CleanupMode,
}

impl CleanupPlan {
    /// Plan for a job whose bound workflow lives at `workflow_file`.
    ///
    /// The workflow's basename under each output directory is added to the
    /// always-delete set.
    pub fn new(
        request_id: impl Into<String>,
        workflow_file: Option<&Path>,
        output_dirs: Vec<PathBuf>,
        mode: CleanupMode,
    ) -> Self {
        let mut always_delete = Vec::new();
        if let Some(workflow) = workflow_file {
            always_delete.push(workflow.to_path_buf());
            if let Some(name) = workflow.file_name() {
                for dir in &output_dirs {
                    let candidate = dir.join(name);
                    if candidate != workflow {
                        always_delete.push(candidate);
                    }
                }
            }
        }
        Self {
            request_id: request_id.into(),
            always_delete,
            output_dirs,
            mode,
        }
    }

    pub fn track_output(&mut self, path: impl Into<PathBuf>) {
        self.always_delete.push(path.into());
    }
}

/// Outcome of a sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub files_removed: usize,
    pub dirs_removed: usize,
    pub failures: usize,
}

impl CleanupReport {
    pub fn removed(&self) -> usize {
        self.files_removed + self.dirs_removed
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

fn is_generated_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    GENERATED_FILE_PREFIXES.iter().any(|p| lower.starts_with(p))
}

fn is_protected_name(name: &str) -> bool {
    name.ends_with(".db") || name.starts_with('.')
}

/// `.json` files are kept unless they look like per-job workflow copies.
fn is_kept_json(name: &str) -> bool {
    if !name.ends_with(".json") {
        return false;
    }
    let lower = name.to_ascii_lowercase();
    !(name.contains("temp_workflow") || lower.contains("pulid") || lower.contains("video_"))
}

fn is_hash_like(name: &str) -> bool {
    HASH_DIR_RE.is_match(name)
}

fn is_recent(path: &Path, now: SystemTime) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    let Ok(stamp) = meta.created().or_else(|_| meta.modified()) else {
        return false;
    };
    now.duration_since(stamp)
        .map(|age| age < RECENCY_WINDOW)
        .unwrap_or(true)
}

fn should_remove_file(name: &str, path: &Path, plan: &CleanupPlan, now: SystemTime) -> bool {
    if is_protected_name(name) {
        return false;
    }
    if is_generated_name(name) {
        return true;
    }
    if is_kept_json(name) {
        return false;
    }
    match plan.mode {
        CleanupMode::Aggressive => true,
        CleanupMode::Conservative => {
            (!plan.request_id.is_empty() && name.contains(&plan.request_id)) || is_recent(path, now)
        }
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

enum Removal {
    Removed,
    AlreadyGone,
    Failed,
}

fn remove_file(path: &Path) -> Removal {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Removed file");
            Removal::Removed
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Removal::AlreadyGone,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove file");
            Removal::Failed
        }
    }
}

fn remove_dir(path: &Path) -> Removal {
    match std::fs::remove_dir(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Removed directory");
            Removal::Removed
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Removal::AlreadyGone,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove directory");
            Removal::Failed
        }
    }
}

impl CleanupReport {
    fn file(&mut self, outcome: Removal) {
        match outcome {
            Removal::Removed => self.files_removed += 1,
            Removal::AlreadyGone => {}
            Removal::Failed => self.failures += 1,
        }
    }

    fn dir(&mut self, outcome: Removal) {
        match outcome {
            Removal::Removed => self.dirs_removed += 1,
            Removal::AlreadyGone => {}
            Removal::Failed => self.failures += 1,
        }
    }
}

/// Run a cleanup sweep. Blocking; call from `spawn_blocking` in async code.
pub fn run_cleanup(plan: &CleanupPlan) -> CleanupReport {
    let mut report = CleanupReport::default();
    let now = SystemTime::now();

    for path in &plan.always_delete {
        if path.is_dir() {
            continue;
        }
        report.file(remove_file(path));
    }

    // Pass 1: files, deepest first.
    for dir in &plan.output_dirs {
        for entry in WalkDir::new(dir).min_depth(1).contents_first(true) {
            let Ok(entry) = entry else { continue };
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if should_remove_file(&name, entry.path(), plan, now) {
                report.file(remove_file(entry.path()));
            }
        }
    }

    // Pass 2: directories, deepest first. The sweep roots themselves stay.
    for dir in &plan.output_dirs {
        for entry in WalkDir::new(dir).min_depth(1).contents_first(true) {
            let Ok(entry) = entry else { continue };
            if !entry.file_type().is_dir() {
                continue;
            }
            sweep_dir(entry.path(), plan.mode, &mut report);
        }
    }

    tracing::info!(
        request_id = %plan.request_id,
        mode = %plan.mode,
        files_removed = report.files_removed,
        dirs_removed = report.dirs_removed,
        failures = report.failures,
        "Cleanup finished",
    );
    report
}

fn sweep_dir(path: &Path, mode: CleanupMode, report: &mut CleanupReport) {
    let children: Vec<(PathBuf, bool, String)> = match std::fs::read_dir(path) {
        Ok(read) => read
            .filter_map(Result::ok)
            .map(|e| {
                let is_file = e.file_type().map(|t| t.is_file()).unwrap_or(false);
                (e.path(), is_file, e.file_name().to_string_lossy().into_owned())
            })
            .collect(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to list directory");
            report.failures += 1;
            return;
        }
    };

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let is_empty = children.is_empty();
    let hash_dir = is_hash_like(&name);
    let only_generated = !is_empty
        && children
            .iter()
            .all(|(_, is_file, child)| *is_file && is_generated_name(child));

    let purge_files = hash_dir || only_generated || mode == CleanupMode::Aggressive;
    if !(is_empty || purge_files) {
        return;
    }
    let mut remaining = 0;
    if purge_files {
        for (child, is_file, child_name) in &children {
            if *is_file && !is_protected_name(child_name) {
                let outcome = remove_file(child);
                if matches!(outcome, Removal::Failed) {
                    remaining += 1;
                }
                report.file(outcome);
            } else {
                remaining += 1;
            }
        }
    }
    if remaining > 0 {
        tracing::debug!(path = %path.display(), remaining, "Directory still holds kept entries");
        return;
    }
    report.dir(remove_dir(path));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("Aggressive".parse::<CleanupMode>().unwrap(), CleanupMode::Aggressive);
        assert!("wipe".parse::<CleanupMode>().is_err());
        assert_eq!(CleanupMode::default(), CleanupMode::Conservative);
    }

    #[test]
    fn hash_like_names() {
        assert!(is_hash_like("0123456789abcdef0123456789abcdef"));
        assert!(is_hash_like("3f2b9c1e-0000-4a4a-9b9b-123456789abc"));
        assert!(!is_hash_like("deadbeef"));
        assert!(!is_hash_like("0123456789ABCDEF0123456789ABCDEF"));
    }

    #[test]
    fn json_rule() {
        assert!(is_kept_json("lora.json"));
        assert!(!is_kept_json("temp_workflow_1.json"));
        assert!(!is_kept_json("PuLID_flow.json"));
        assert!(!is_kept_json("image.png"));
    }

    #[test]
    fn conservative_sweep_keeps_protected_files() {
        let root = tempfile::tempdir().unwrap();
        let out = root.path().join("output");
        touch(&out.join("history.db"));
        touch(&out.join(".keep"));
        touch(&out.join("settings.json"));
        touch(&out.join("pulid_00001_.png"));
        touch(&out.join("req-7_result.png"));

        let plan = CleanupPlan::new("req-7", None, vec![out.clone()], CleanupMode::Conservative);
        let report = run_cleanup(&plan);

        assert!(out.join("history.db").exists());
        assert!(out.join(".keep").exists());
        assert!(out.join("settings.json").exists());
        assert!(!out.join("pulid_00001_.png").exists());
        assert!(!out.join("req-7_result.png").exists());
        assert_eq!(report.files_removed, 2);
        assert_eq!(report.failures, 0);
    }

    #[test]
    fn removes_workflow_file_and_its_output_copy() {
        let root = tempfile::tempdir().unwrap();
        let out = root.path().join("output");
        let workflow = root.path().join("temp_workflow_abc.json");
        touch(&workflow);
        touch(&out.join("temp_workflow_abc.json"));

        let plan = CleanupPlan::new("abc", Some(&workflow), vec![out.clone()], CleanupMode::Conservative);
        run_cleanup(&plan);

        assert!(!workflow.exists());
        assert!(!out.join("temp_workflow_abc.json").exists());
        assert!(out.exists());
    }

    #[test]
    fn directory_pass_removes_empty_hash_and_generated_dirs() {
        let root = tempfile::tempdir().unwrap();
        let out = root.path().join("output");
        fs::create_dir_all(out.join("empty/nested")).unwrap();
        touch(&out.join("0123456789abcdef0123456789abcdef/blob.db"));
        touch(&out.join("clips/video_00001.mp4"));
        touch(&out.join("keep/notes.json"));

        let plan = CleanupPlan::new("r", None, vec![out.clone()], CleanupMode::Conservative);
        let report = run_cleanup(&plan);

        assert!(!out.join("empty").exists());
        assert!(!out.join("clips").exists());
        assert!(out.join("keep/notes.json").exists());
        // Protected file inside a hash dir survives, so the dir does too.
        assert!(out.join("0123456789abcdef0123456789abcdef/blob.db").exists());
        assert_eq!(report.dirs_removed, 3);
        assert_eq!(report.failures, 0);
    }

    #[test]
    fn second_sweep_is_a_no_op() {
        let root = tempfile::tempdir().unwrap();
        let out = root.path().join("output");
        touch(&out.join("a/b/video_1.mp4"));
        touch(&out.join("a/ComfyUI_00001_.png"));
        touch(&out.join("config.json"));
        touch(&out.join("ffffffffffffffffffffffffffffffff/x.png"));

        let plan = CleanupPlan::new("req", None, vec![out.clone()], CleanupMode::Conservative);
        let first = run_cleanup(&plan);
        assert!(first.removed() > 0);

        let second = run_cleanup(&plan);
        assert_eq!(second.removed(), 0);
        assert_eq!(second.failures, 0);
        assert!(out.join("config.json").exists());
    }

    #[test]
    fn missing_output_dir_is_not_an_error() {
        let root = tempfile::tempdir().unwrap();
        let plan = CleanupPlan::new(
            "req",
            Some(&root.path().join("gone.json")),
            vec![root.path().join("nope")],
            CleanupMode::Aggressive,
        );
        assert_eq!(run_cleanup(&plan), CleanupReport::default());
    }
}
