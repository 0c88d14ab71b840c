use std::path::PathBuf;

/// Broad classes of failure, used by callers that only need to know which
/// stage of a checkout went wrong (e.g. to turn a fetch failure into a
/// boolean while still reporting why).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Configuration,
    ToolResolution,
    Version,
    CommandExecution,
    Parse,
}

/// All possible errors from git operations.
///
/// Variants cover the full lifecycle: misconfiguration, executable
/// resolution, version gating, non-zero exits and output parsing.
/// Retried operations surface the final attempt's own error unchanged.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    /// Retry bounds where both are non-zero and `min > max`.
    #[error("min seconds should be less than or equal to max seconds (min {min}, max {max})")]
    InvalidRetryBounds { min: u64, max: u64 },

    /// The working directory is missing or is not a directory.
    #[error("directory '{}' does not exist", path.display())]
    WorkingDirectoryNotFound { path: PathBuf },

    /// The checkout target holds files but no git repository.
    #[error("refusing to clear '{}': directory is not empty and is not a git repository", path.display())]
    DirectoryNotEmpty { path: PathBuf },

    /// A configuration input could not be interpreted.
    #[error("invalid value for {name}: '{value}'")]
    InvalidSetting { name: String, value: String },

    /// An argument passed to a library function was not usable.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Local filesystem access failed (sparse-checkout file, directory setup).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The named executable was not found on `$PATH`.
    #[error("unable to locate executable file: {tool}")]
    ToolNotFound { tool: String },

    /// The version probe produced output without a recognisable version.
    #[error("unable to determine {tool} version")]
    VersionUndetermined { tool: String },

    /// The installed tool is older than what the requested feature needs.
    #[error("minimum {requirement} version is {minimum}. Your {tool} ('{}') is {found}", path.display())]
    UnsupportedVersion {
        requirement: String,
        tool: String,
        path: PathBuf,
        minimum: String,
        found: String,
    },

    /// A git command exited with a non-zero status code that the
    /// operation does not accept.
    #[error("git command failed (exit code {code}): {stderr}")]
    CommandFailed {
        code: i32,
        stderr: String,
        command: String,
    },

    /// A git command was terminated by a signal before completing.
    #[error("git command was killed by signal")]
    Killed { command: String },

    /// The git process could not be spawned (e.g., permission denied).
    #[error("failed to spawn git process: {source}")]
    SpawnError {
        source: std::io::Error,
        command: String,
    },

    /// A remote URL does not point at a repository on the hosting server.
    #[error("the format of '{url}' is not a valid repository URL for {hostname}")]
    InvalidRemoteUrl { url: String, hostname: String },

    /// Structured output from git could not be parsed as expected.
    #[error("unexpected output: {message}")]
    UnexpectedOutput { message: String },

    /// A bare name matched neither a remote branch nor a tag.
    #[error("a branch or tag with the name '{name}' could not be found")]
    RefNotFound { name: String },
}

impl GitError {
    /// Shorthand for an `UnexpectedOutput` error.
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::UnexpectedOutput {
            message: message.into(),
        }
    }

    /// Classifies the error into the taxonomy used by callers.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidRetryBounds { .. }
            | Self::WorkingDirectoryNotFound { .. }
            | Self::DirectoryNotEmpty { .. }
            | Self::InvalidSetting { .. }
            | Self::InvalidArgument(_)
            | Self::Io(_) => ErrorCategory::Configuration,
            Self::ToolNotFound { .. } => ErrorCategory::ToolResolution,
            Self::VersionUndetermined { .. } | Self::UnsupportedVersion { .. } => {
                ErrorCategory::Version
            }
            Self::CommandFailed { .. } | Self::Killed { .. } | Self::SpawnError { .. } => {
                ErrorCategory::CommandExecution
            }
            Self::InvalidRemoteUrl { .. }
            | Self::UnexpectedOutput { .. }
            | Self::RefNotFound { .. } => ErrorCategory::Parse,
        }
    }
}

/// A failed checkout is reported as the tool's own message string.
impl serde::Serialize for GitError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}
