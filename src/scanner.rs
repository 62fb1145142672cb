use log::{debug, info, warn};
use once_cell::sync::Lazy;
use rayon::ThreadPoolBuilder;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use walkdir::{DirEntry, WalkDir};

use crate::declaration::SourceFile;
use crate::error::Warning;
use crate::golang;
use crate::pipeline::CancellationToken;

static MODULE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*module\s+(\S+)").unwrap());

/// Walks a Go project and parses every source file on a bounded worker pool.
///
/// Skipped while walking:
/// - the root-level `vendor` directory (and any configured exclusions)
/// - any path that contains a `tests` component
/// - hidden files and directories
pub struct ProjectScanner {
    root: PathBuf,
    excluded_dirs: Vec<String>,
    workers: usize,
    cancel: CancellationToken,
}

/// Result of a project scan.
pub struct ScanResult {
    /// Parsed files sorted by import path, then file path
    pub files: Vec<SourceFile>,
    /// Unreadable or unparsable files
    pub warnings: Vec<Warning>,
    /// Module path declared in `go.mod`, if any
    pub module_path: Option<String>,
}

impl ProjectScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            excluded_dirs: vec!["vendor".to_string()],
            workers: default_workers(),
            cancel: CancellationToken::default(),
        }
    }

    /// Extra root-level directories to skip, in addition to `vendor`
    pub fn with_excluded_dirs(mut self, dirs: &[String]) -> Self {
        for dir in dirs {
            let dir = dir.trim_matches('/').to_string();
            if !dir.is_empty() && !self.excluded_dirs.contains(&dir) {
                self.excluded_dirs.push(dir);
            }
        }
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Module path from `go.mod`, used to derive package import paths
    pub fn module_path(&self) -> Option<String> {
        let content = fs::read_to_string(self.root.join("go.mod")).ok()?;
        MODULE_REGEX
            .captures(&content)
            .map(|cap| cap[1].trim_matches('"').to_string())
    }

    fn is_skipped(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 {
            return false;
        }
        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') || name == "tests" {
            return true;
        }
        entry.depth() == 1
            && entry.file_type().is_dir()
            && self.excluded_dirs.iter().any(|dir| dir.as_str() == name)
    }

    /// Go files to parse, in walk order
    pub fn discover(&self) -> (Vec<PathBuf>, Vec<Warning>) {
        let mut files = Vec::new();
        let mut warnings = Vec::new();

        for entry in WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !self.is_skipped(e))
        {
            match entry {
                Ok(entry) => {
                    let path = entry.path();
                    if entry.file_type().is_file()
                        && path.extension().and_then(|s| s.to_str()) == Some("go")
                    {
                        files.push(path.to_path_buf());
                    }
                }
                Err(e) => {
                    let warning = Warning::scan(format!("Failed to access path: {}", e));
                    warn!("{}", warning);
                    warnings.push(warning);
                }
            }
        }

        (files, warnings)
    }

    /// Scans the project. Returns `None` if cancelled mid-way.
    pub fn scan(&self) -> Option<ScanResult> {
        let module_path = self.module_path();
        let (paths, mut warnings) = self.discover();
        info!(
            "Scanning {} Go files with {} workers",
            paths.len(),
            self.workers
        );

        let (tx, rx) = mpsc::channel();
        let jobs: Vec<ParseJob> = paths
            .into_iter()
            .map(|path| {
                let relative = relative_path(&self.root, &path);
                let import_path = import_path_for(module_path.as_deref(), &relative);
                ParseJob {
                    path,
                    relative,
                    import_path,
                }
            })
            .collect();

        match ThreadPoolBuilder::new().num_threads(self.workers).build() {
            Ok(pool) => {
                for job in jobs {
                    let tx = tx.clone();
                    let cancel = self.cancel.clone();
                    pool.spawn(move || {
                        if cancel.is_cancelled() {
                            return;
                        }
                        let _ = tx.send(job.run());
                    });
                }
            }
            Err(e) => {
                warn!("Failed to build worker pool, parsing sequentially: {}", e);
                for job in jobs {
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    let _ = tx.send(job.run());
                }
            }
        }
        drop(tx);

        // Single collector; the channel closes once every worker has finished
        let mut files = Vec::new();
        for outcome in rx {
            match outcome {
                Ok(file) => files.push(file),
                Err(warning) => {
                    warn!("{}", warning);
                    warnings.push(warning);
                }
            }
        }

        if self.cancel.is_cancelled() {
            debug!("Scan cancelled after {} files", files.len());
            return None;
        }

        files.sort_by(|a, b| {
            a.import_path
                .cmp(&b.import_path)
                .then_with(|| a.path.cmp(&b.path))
        });
        warnings.sort_by(|a, b| a.message.cmp(&b.message));

        Some(ScanResult {
            files,
            warnings,
            module_path,
        })
    }
}

struct ParseJob {
    path: PathBuf,
    relative: PathBuf,
    import_path: String,
}

impl ParseJob {
    fn run(self) -> Result<SourceFile, Warning> {
        let source = fs::read_to_string(&self.path).map_err(|e| {
            Warning::scan(format!("Failed to read {}: {}", self.relative.display(), e))
        })?;
        golang::parse_source(&self.relative, &source, &self.import_path).map_err(|e| {
            Warning::scan(format!("Failed to parse {}: {}", self.relative.display(), e))
        })
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// `path` relative to `root`, or unchanged when it lies elsewhere
pub fn relative_path(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root).unwrap_or(path).to_path_buf()
}

/// Import path of the package holding `relative_file`
pub fn import_path_for(module_path: Option<&str>, relative_file: &Path) -> String {
    let dir = relative_file
        .parent()
        .map(|p| {
            p.components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default();

    match (module_path, dir.is_empty()) {
        (Some(module), true) => module.to_string(),
        (Some(module), false) => format!("{}/{}", module, dir),
        (None, _) => dir,
    }
}
