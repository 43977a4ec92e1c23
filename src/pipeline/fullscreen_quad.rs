//! Screen-aligned quad used by every compositing pass

use glam::{Vec2, Vec3};

use crate::backend::{
    BufferDescriptor, BufferHandle, BufferUsage, GraphicsBackend, VertexPositionTexture,
};
use crate::error::RenderResult;

/// Two clip-space triangles covering the viewport, UV origin top-left
pub const QUAD_VERTICES: [VertexPositionTexture; 6] = [
    VertexPositionTexture::new(Vec3::new(-1.0, 1.0, 0.0), Vec2::new(0.0, 0.0)),
    VertexPositionTexture::new(Vec3::new(-1.0, -1.0, 0.0), Vec2::new(0.0, 1.0)),
    VertexPositionTexture::new(Vec3::new(1.0, 1.0, 0.0), Vec2::new(1.0, 0.0)),
    VertexPositionTexture::new(Vec3::new(1.0, 1.0, 0.0), Vec2::new(1.0, 0.0)),
    VertexPositionTexture::new(Vec3::new(-1.0, -1.0, 0.0), Vec2::new(0.0, 1.0)),
    VertexPositionTexture::new(Vec3::new(1.0, -1.0, 0.0), Vec2::new(1.0, 1.0)),
];

pub struct FullscreenQuad {
    vertex_buffer: BufferHandle,
}

impl FullscreenQuad {
    pub fn new(backend: &mut dyn GraphicsBackend) -> RenderResult<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(&QUAD_VERTICES);
        let vertex_buffer = backend.create_buffer_init(
            &BufferDescriptor {
                label: Some("fullscreen quad".to_string()),
                size: bytes.len() as u64,
                usage: BufferUsage::VERTEX,
            },
            bytes,
        )?;
        Ok(Self { vertex_buffer })
    }

    pub fn vertex_buffer(&self) -> BufferHandle {
        self.vertex_buffer
    }

    /// Draw with whatever effect and state are currently bound
    pub fn draw(&self, backend: &mut dyn GraphicsBackend) {
        backend.set_vertex_buffer(self.vertex_buffer);
        backend.draw(0..QUAD_VERTICES.len() as u32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{RecordedCall, RecordingBackend};

    #[test]
    fn test_quad_covers_clip_space() {
        let min = QUAD_VERTICES
            .iter()
            .fold(Vec3::splat(f32::MAX), |acc, v| acc.min(v.position));
        let max = QUAD_VERTICES
            .iter()
            .fold(Vec3::splat(f32::MIN), |acc, v| acc.max(v.position));
        assert_eq!(min.truncate(), Vec2::NEG_ONE);
        assert_eq!(max.truncate(), Vec2::ONE);
    }

    #[test]
    fn test_draw_issues_six_vertices() {
        let mut backend = RecordingBackend::new(8, 8);
        let quad = FullscreenQuad::new(&mut backend).unwrap();
        quad.draw(&mut backend);
        assert_eq!(
            backend.calls().last(),
            Some(&RecordedCall::Draw { vertices: 0..6 })
        );
    }
}
