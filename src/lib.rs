//! Converts point-sampled voxel data into a compact sparse-voxel-octree binary file.
//!
//! Two independent build strategies are provided, matching the two octree representations the
//! original tool carried side by side: [`streaming`] walks the voxel cube once in Morton order
//! and never holds more than `O(depth)` nodes in memory, while [`nested`] builds an explicit
//! arena-indexed tree that can be optimized and merged before being linearized ([`linearize`])
//! and saved ([`saver`]) in either a fixed or adaptively bit-packed layout.

pub mod bitio;
pub mod config;
pub mod error;
pub mod linearize;
pub mod morton;
pub mod nested;
pub mod node;
pub mod reverse;
pub mod saver;
pub mod streaming;
pub mod voxel;

pub use config::BuildConfig;
pub use error::BuildError;
pub use linearize::{linearize, Element};
pub use saver::{save, save_opt};
pub use streaming::build_streaming_svo;
pub use voxel::{Rgba8, Voxel};
