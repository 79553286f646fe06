use std::path::PathBuf;

/// Tunables for a single SVO build, mirroring the runtime-settings-struct-with-`Default`
/// convention used throughout the teacher repo's own settings types.
#[derive(Clone, Debug)]
pub struct BuildConfig {
    /// Octree depth `D`; the logical cube is `2^D` voxels per axis. Must be `<=
    /// `[`crate::morton::COORD_BITS`].
    pub depth: u32,
    /// Directory the streaming builder's temporary backward-order file is created in. Defaults
    /// to the OS temp directory when `None`. The file is removed on both success and failure.
    pub temp_dir: Option<PathBuf>,
    /// Whether [`crate::nested::build`] runs the empty-subtree collapse pass
    /// ([`crate::nested::NestedTree::optimize_empty`]) after building the tree. Left `false` by
    /// default, matching the original's commented-out call.
    pub optimize_empty: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self { depth: 0, temp_dir: None, optimize_empty: false }
    }
}

impl BuildConfig {
    pub fn with_depth(depth: u32) -> Self {
        Self { depth, ..Self::default() }
    }
}
