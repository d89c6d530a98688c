//! Error types for container transcoding.

use std::path::PathBuf;

/// Result type alias for transcoding operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while identifying, unpacking or packing a container resource.
///
/// Every variant is fatal to the single operation that produced it. Nothing in this crate
/// retries; callers may re-run the whole operation (for example after installing a tool).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required external program could not be found or did not answer its install check.
    #[error("external tool '{tool}' is not installed{hint}")]
    ToolNotInstalled { tool: String, hint: String },

    /// An external program exited unsuccessfully. `code` is `None` when it was killed by a signal.
    #[error("command `{command}` failed with {}", exit_description(.code))]
    ProcessFailed { command: String, code: Option<i32> },

    /// A stage exited successfully but its expected output file does not exist.
    #[error("expected artifact was not produced: {}", .path.display())]
    ArtifactMissing { path: PathBuf },

    /// The final artifact of a pack pipeline is zero bytes long.
    #[error("artifact is empty: {}", .path.display())]
    ArtifactEmpty { path: PathBuf },

    /// An archive member would land outside the extraction root.
    #[error("archive member '{member}' would extract to a parent directory ({normalized})")]
    UnsafeMemberPath { member: String, normalized: String },

    /// The tree could not be represented on disk (or read back from it).
    #[error("cannot materialize {}: {reason}", .path.display())]
    Materialization { path: PathBuf, reason: String },

    /// No registered component applies to a resource with these tags.
    #[error("no {operation} component for resource tagged [{tags}]")]
    NoComponent { operation: &'static str, tags: String },

    /// A byte range falls outside the resource content.
    #[error("range {start}..{end} is outside resource of length {len}")]
    InvalidRange { start: usize, end: usize, len: usize },

    /// The resource has no unpacked tree to pack.
    #[error("resource has not been unpacked")]
    NotUnpacked,

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "termination by signal".to_string(),
    }
}

impl Error {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }
}

/// Attaches a message to `std::io::Result`s, in the spirit of `anyhow::Context`.
pub(crate) trait IoContext<T> {
    fn io_context<C: Into<String>>(self, context: C) -> Result<T>;

    fn with_io_context<C: Into<String>, F: FnOnce() -> C>(self, f: F) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn io_context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| Error::io(context, e))
    }

    fn with_io_context<C: Into<String>, F: FnOnce() -> C>(self, f: F) -> Result<T> {
        self.map_err(|e| Error::io(f(), e))
    }
}
