//! Procedural resources
//!
//! Meshes for light volumes and demo geometry, and small generated textures.

mod mesh;
mod texture;

pub use mesh::*;
pub use texture::*;
