use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a documentation run. Everything else is a [`Warning`].
#[derive(Error, Debug)]
pub enum DocsError {
    #[error("Project root is not a directory: {0}")]
    InvalidProjectRoot(PathBuf),

    #[error("Failed to read router file {path}: {source}")]
    RouterUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No namespace or include registration found in router file: {0}")]
    RouterMissing(PathBuf),

    #[error("Failed to create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write output file {path}: {source}")]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize document to JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to serialize document to YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Documentation run was cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, DocsError>;

/// Category of a non-fatal problem found during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WarningKind {
    /// Malformed annotation syntax
    Parse,
    /// Unknown type reference
    Resolution,
    /// Duplicate route or orphaned controller
    Topology,
    /// Unreadable or unparsable source file
    Scan,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WarningKind::Parse => "parse",
            WarningKind::Resolution => "resolution",
            WarningKind::Topology => "topology",
            WarningKind::Scan => "scan",
        };
        f.write_str(label)
    }
}

/// Where a declaration came from, used to point warnings at source.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SourceLocation {
    pub file: PathBuf,
    pub line: usize,
    /// Declaration name, e.g. `ObjectController.Get`
    pub symbol: String,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.symbol.is_empty() {
            write!(f, "{}:{}", self.file.display(), self.line)
        } else {
            write!(f, "{}:{} ({})", self.file.display(), self.line, self.symbol)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
    pub source: Option<SourceLocation>,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(WarningKind::Parse, message)
    }

    pub fn resolution(message: impl Into<String>) -> Self {
        Self::new(WarningKind::Resolution, message)
    }

    pub fn topology(message: impl Into<String>) -> Self {
        Self::new(WarningKind::Topology, message)
    }

    pub fn scan(message: impl Into<String>) -> Self {
        Self::new(WarningKind::Scan, message)
    }

    pub fn at(mut self, source: SourceLocation) -> Self {
        self.source = Some(source);
        self
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "[{}] {}: {}", self.kind, source, self.message),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_display_with_source() {
        let warning = Warning::topology("duplicate route GET /widgets").at(SourceLocation {
            file: PathBuf::from("controllers/widget.go"),
            line: 12,
            symbol: "WidgetController.List".to_string(),
        });

        assert_eq!(
            warning.to_string(),
            "[topology] controllers/widget.go:12 (WidgetController.List): duplicate route GET /widgets"
        );
    }

    #[test]
    fn test_warning_display_without_source() {
        let warning = Warning::resolution("Cannot find the object: models.Missing");
        assert_eq!(
            warning.to_string(),
            "[resolution] Cannot find the object: models.Missing"
        );
    }
}
