//! Error taxonomy for surface initialization and use.

use std::path::PathBuf;

use nix::errno::Errno;

use crate::screen::SurfaceState;

/// All errors produced by the surface core.
///
/// Every initialization error is fatal to the surface instance that raised it:
/// resources acquired so far are released and the facade moves to
/// [`SurfaceState::Failed`]. Redraw and capture clamp their inputs instead of
/// failing, so the only runtime error is calling them in the wrong state.
#[derive(thiserror::Error, Debug)]
pub enum SurfaceError {
    #[error("invalid value for `{key}`: {value:?}")]
    ConfigInvalid { key: String, value: String },

    #[error("framebuffer device not found: {hint}")]
    DeviceNotFound { hint: String },

    #[error("failed to open framebuffer {}: {errno}", path.display())]
    DeviceOpenFailed { path: PathBuf, errno: Errno },

    #[error("error reading framebuffer {request}: {errno}")]
    DeviceQueryFailed { request: &'static str, errno: Errno },

    #[error("failed to mmap framebuffer: {errno}")]
    MapFailed { errno: Errno },

    #[error("cannot {operation} while surface is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SurfaceState,
    },
}

impl SurfaceError {
    /// Errno carried by OS-level failures, if any.
    pub fn errno(&self) -> Option<Errno> {
        match self {
            Self::DeviceOpenFailed { errno, .. }
            | Self::DeviceQueryFailed { errno, .. }
            | Self::MapFailed { errno } => Some(*errno),
            _ => None,
        }
    }
}

/// Convert an `io::Error` from std file APIs into an errno.
pub(crate) fn errno_of(err: &std::io::Error) -> Errno {
    err.raw_os_error().map(Errno::from_raw).unwrap_or(Errno::UnknownErrno)
}

pub type Result<T> = std::result::Result<T, SurfaceError>;
