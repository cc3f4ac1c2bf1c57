//! Unified error types for the cephfs-mount-core library.
//!
//! Uses SNAFU for context-rich error handling, especially useful when the same
//! underlying error type (like `std::io::Error`) appears in different contexts.

use snafu::{ResultExt, Snafu};
use std::num::ParseIntError;
use std::path::PathBuf;

use crate::mounter::MounterKind;

/// Result type alias using the library's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all core library operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Failed to execute a system command.
    #[snafu(display("failed to execute command '{command}'"))]
    CommandExecution {
        command: String,
        source: std::io::Error,
    },

    /// Command executed but returned non-zero exit code.
    #[snafu(display("command '{command}' exited with code {code}: {stderr}"))]
    CommandExit {
        command: String,
        code: i32,
        stderr: String,
    },

    /// Command was killed because its execution context was cancelled.
    #[snafu(display("command '{command}' was cancelled"))]
    CommandCancelled { command: String },

    /// No client mechanism survived probing at startup.
    #[snafu(display("no ceph mounters found on system"))]
    NoMounters,

    /// Mounter name does not match any known driver.
    #[snafu(display("unknown mounter '{name}'"))]
    UnknownMounter { name: String },

    /// Mount point creation failed.
    #[snafu(display("failed to create mount point at {}", path.display()))]
    MountPointCreation {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Loading a kernel module failed.
    #[snafu(display("failed to load kernel module '{module}': {stderr}"))]
    ModuleLoad { module: String, stderr: String },

    /// The mount tool reported a failure.
    #[snafu(display("{mounter} mount of {} failed: {stderr}", path.display()))]
    Mount {
        mounter: MounterKind,
        path: PathBuf,
        stderr: String,
    },

    /// The FUSE daemon did not announce itself on stderr.
    #[snafu(display("ceph-fuse failed: {stderr}"))]
    DaemonOutput { stderr: String },

    /// The FUSE daemon announced a PID that is not an integer.
    #[snafu(display("failed to parse FUSE daemon PID '{value}'"))]
    DaemonPid {
        value: String,
        source: ParseIntError,
    },

    /// First phase of a bind mount failed.
    #[snafu(display("failed to bind-mount {} to {}: {source}", src.display(), dst.display()))]
    BindMount {
        src: PathBuf,
        dst: PathBuf,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    /// Second (read-only remount) phase of a bind mount failed.
    #[snafu(display("failed read-only remount of {}: {source}", path.display()))]
    ReadOnlyRemount {
        path: PathBuf,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    /// Unmount operation failed.
    #[snafu(display("failed to unmount {}: {message}", path.display()))]
    Unmount { path: PathBuf, message: String },

    /// Kernel release string could not be parsed.
    #[snafu(display("failed to parse kernel release '{release}'"))]
    KernelRelease { release: String },

    /// Config file not found or cannot be read.
    #[snafu(display("failed to read config at {}", path.display()))]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Config file is not valid JSON for the expected schema.
    #[snafu(display("failed to parse config at {}", path.display()))]
    ConfigParse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Extension trait for adding context to io::Error results.
pub trait IoResultExt<T> {
    /// Add context for command execution errors.
    fn command_context(self, command: impl Into<String>) -> Result<T>;

    /// Add context for mount point creation errors.
    fn mount_point_context(self, path: impl Into<PathBuf>) -> Result<T>;

    /// Add context for config read errors.
    fn config_read_context(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::result::Result<T, std::io::Error> {
    fn command_context(self, command: impl Into<String>) -> Result<T> {
        self.context(CommandExecutionSnafu {
            command: command.into(),
        })
    }

    fn mount_point_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(MountPointCreationSnafu { path: path.into() })
    }

    fn config_read_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(ConfigReadSnafu { path: path.into() })
    }
}

impl Error {
    /// Captured stderr of the failing external tool, if this error carries one.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Error::CommandExit { stderr, .. }
            | Error::ModuleLoad { stderr, .. }
            | Error::Mount { stderr, .. }
            | Error::DaemonOutput { stderr } => Some(stderr),
            Error::BindMount { source, .. } | Error::ReadOnlyRemount { source, .. } => {
                source.stderr()
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remount_error_names_target_and_cause() {
        let err = Error::ReadOnlyRemount {
            path: PathBuf::from("/mnt/target"),
            source: Box::new(Error::CommandExit {
                command: "mount".to_string(),
                code: 32,
                stderr: "mount: permission denied".to_string(),
            }),
        };

        assert_eq!(
            err.to_string(),
            "failed read-only remount of /mnt/target: \
             command 'mount' exited with code 32: mount: permission denied"
        );
        assert_eq!(err.stderr(), Some("mount: permission denied"));
    }

    #[test]
    fn test_mount_error_display() {
        let err = Error::Mount {
            mounter: MounterKind::Kernel,
            path: PathBuf::from("/mnt/vol"),
            stderr: "mount error 13".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "kernel mount of /mnt/vol failed: mount error 13"
        );
    }
}
