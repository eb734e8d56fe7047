//! Image ownership and layout tracking.

mod arena;
mod image;

pub use arena::{ImageId, ResourceArena};
pub use image::{Ownership, TrackedImage};
