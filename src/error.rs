use std::io;

/// Errors produced while building or saving a sparse voxel octree.
///
/// Mirrors the error policy in the specification: input validation failures
/// and color table overflow are fatal and returned to the caller; I/O
/// failures are wrapped so the caller can clean up and surface a single
/// save-failed result. Duplicate-leaf collisions are a logged warning, not
/// a variant here — the first voxel wins and processing continues.
#[derive(Debug)]
pub enum BuildError {
    /// A voxel coordinate or the requested depth is out of the `[0, 2^depth)` range.
    InputRange(String),
    /// An I/O failure while reading/writing the output or a temporary file.
    Io(io::Error),
    /// A programmer-error invariant was violated (empty queue at fold time, missing root).
    InvariantViolation(String),
    /// The adaptive saver's color table exceeded `2^31` entries.
    ColorTableTooLarge(usize),
}

impl From<io::Error> for BuildError {
    fn from(err: io::Error) -> Self {
        BuildError::Io(err)
    }
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::InputRange(msg) => write!(f, "voxel input out of range: {msg}"),
            BuildError::Io(err) => write!(f, "i/o error: {err}"),
            BuildError::InvariantViolation(msg) => write!(f, "invariant violation: {msg}"),
            BuildError::ColorTableTooLarge(n) => write!(f, "color table too large: {n} entries"),
        }
    }
}

impl std::error::Error for BuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BuildError::Io(err) => Some(err),
            _ => None,
        }
    }
}
