//! Error kinds (spec.md §7) and the `MultiError` aggregation used across
//! phases.

use std::fmt;

use thiserror::Error;

/// A parser/tokenizer position, used to render caret-pointing snippets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Position {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(offset: usize, line: usize, column: usize) -> Self {
        Position { offset, line, column }
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Root of document is not a mapping")]
    RootNotMapping,
    #[error("{0}")]
    Syntax(String),
    #[error("expression parse error at line {pos_line}, column {pos_column}: {message}\n{snippet}")]
    Expression {
        message: String,
        pos_line: usize,
        pos_column: usize,
        snippet: String,
    },
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("at {path}: {message}")]
    Structural { path: String, message: String },
    #[error("at {path}: index {index} out of bounds (length {len})")]
    IndexOutOfBounds { path: String, index: usize, len: usize },
    #[error("at {path}: merge key {key:?} is not a scalar")]
    NonScalarKey { path: String, key: String },
}

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("at {path}: {message}")]
    Reference { path: String, message: String },
    #[error("at {path}: {message}")]
    Operator { path: String, message: String },
}

#[derive(Debug, Error)]
pub enum OperatorError {
    #[error("unknown operator {0:?}")]
    Unknown(String),
    #[error("{operator}: {message}")]
    BadArgs { operator: String, message: String },
    #[error("{operator}: not yet implemented ({detail})")]
    Unimplemented { operator: String, detail: String },
    #[error("static_ips: {0}")]
    StaticIpAllocation(String),
}

#[derive(Debug, Error)]
pub enum PostProcessError {
    #[error("go-patch application is not supported by this engine")]
    GoPatchUnsupported,
    #[error("at {path}: {message}")]
    Sort { path: String, message: String },
    #[error("at {path}: {message}")]
    CherryPick { path: String, message: String },
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("invalid path {0:?}: {1}")]
    BadPath(String, String),
    #[error("type mismatch at {path}: expected {expected}, found {actual}")]
    TypeMismatch {
        path: String,
        expected: String,
        actual: String,
    },
}

#[derive(Debug, Error)]
pub enum ExternalError {
    #[error("external system error: {0}")]
    Message(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
#[error("cycle detected: {}", .path.join(" -> "))]
pub struct CycleError {
    pub path: Vec<String>,
}

#[derive(Debug, Error)]
#[error("{message}")]
pub struct ParamRequired {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum NotFound {
    #[error("`{path}` could not be found in the datastructure")]
    Path { path: String, deepest_resolved: String },
}

/// The top-level error type every public API returns.
#[derive(Debug, Error)]
pub enum WeaveError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Merge(#[from] MergeError),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error(transparent)]
    Operator(#[from] OperatorError),
    #[error(transparent)]
    PostProcess(#[from] PostProcessError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    External(#[from] ExternalError),
    #[error(transparent)]
    Cycle(#[from] CycleError),
    #[error(transparent)]
    Param(#[from] ParamRequired),
    #[error(transparent)]
    NotFound(#[from] NotFound),
    #[error("{0}")]
    Multi(MultiError),
}

/// An accumulated set of errors from a single phase (spec.md §4.9, §7).
///
/// Formatted as `N error(s) detected:` followed by sorted, ` - `-prefixed
/// lines, matching the user-visible convention spec.md mandates.
#[derive(Debug, Default, Clone)]
pub struct MultiError {
    pub errors: Vec<String>,
}

impl MultiError {
    pub fn new() -> Self {
        MultiError { errors: Vec::new() }
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(self) -> std::result::Result<(), MultiError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    pub fn extend(&mut self, other: MultiError) {
        self.errors.extend(other.errors);
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sorted = self.errors.clone();
        sorted.sort();
        writeln!(f, "{} error(s) detected:", sorted.len())?;
        for (i, e) in sorted.iter().enumerate() {
            if i + 1 == sorted.len() {
                write!(f, " - {}", e)?;
            } else {
                writeln!(f, " - {}", e)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for MultiError {}

pub type Result<T> = std::result::Result<T, WeaveError>;
