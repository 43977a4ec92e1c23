//! Uploaded models as consumed by the batching layer

use crate::backend::{BufferDescriptor, BufferHandle, BufferUsage, GraphicsBackend, BackendResult};
use crate::resources::Mesh;
use crate::scene::{BoundingSphere, TextureKey};

/// A contiguous index range drawn with one texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submesh {
    pub texture_key: TextureKey,
    pub start_index: u32,
    pub primitive_count: u32,
}

/// GPU geometry split into textured submeshes
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub vertex_buffer: BufferHandle,
    pub index_buffer: Option<BufferHandle>,
    pub submeshes: Vec<Submesh>,
    /// Object-space bounds
    pub bounds: BoundingSphere,
}

impl Model {
    /// Upload a mesh as a single-submesh indexed model
    pub fn from_mesh(
        backend: &mut dyn GraphicsBackend,
        mesh: &Mesh,
        texture_key: TextureKey,
    ) -> BackendResult<Self> {
        let vertex_buffer = backend.create_buffer_init(
            &BufferDescriptor {
                label: Some(format!("{} vertices", mesh.name)),
                size: mesh.vertex_bytes().len() as u64,
                usage: BufferUsage::VERTEX | BufferUsage::COPY_DST,
            },
            mesh.vertex_bytes(),
        )?;
        let index_buffer = backend.create_buffer_init(
            &BufferDescriptor {
                label: Some(format!("{} indices", mesh.name)),
                size: mesh.index_bytes().len() as u64,
                usage: BufferUsage::INDEX | BufferUsage::COPY_DST,
            },
            mesh.index_bytes(),
        )?;

        Ok(Self {
            vertex_buffer,
            index_buffer: Some(index_buffer),
            submeshes: vec![Submesh {
                texture_key,
                start_index: 0,
                primitive_count: mesh.triangle_count() as u32,
            }],
            bounds: mesh.bounds(),
        })
    }

    pub fn primitive_count(&self) -> u32 {
        self.submeshes.iter().map(|s| s.primitive_count).sum()
    }
}
