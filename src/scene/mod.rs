//! Scene-side contracts
//!
//! The camera, lights, models and the per-frame batching layer that groups visible
//! draw items by texture.

mod batch;
mod camera;
mod light;
mod model;
mod textures;

pub use batch::*;
pub use camera::*;
pub use light::*;
pub use model::*;
pub use textures::*;

use glam::{Mat4, Vec2, Vec3};

/// A camera-facing textured quad
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Billboard {
    pub texture: TextureKey,
    pub position: Vec3,
    pub size: Vec2,
}

/// What the renderer draws each frame
#[derive(Debug, Default)]
pub struct Scene {
    pub camera: Camera,
    pub batches: BatchRegistry,
    pub textures: TextureRegistry,
}

impl Scene {
    pub fn new(camera: Camera) -> Self {
        Self {
            camera,
            batches: BatchRegistry::new(),
            textures: TextureRegistry::new(),
        }
    }

    /// Reset the batches; models must be resubmitted every frame
    pub fn begin_frame(&mut self) {
        self.batches.clear_batches();
    }

    /// Add one batch item per submesh if the world-space `bounds` are in view.
    ///
    /// Returns the number of items kept.
    pub fn submit_model(&mut self, model: &Model, world: Mat4, bounds: &BoundingSphere) -> usize {
        if !self.camera.frustum().intersects_sphere(bounds) {
            return 0;
        }

        model
            .submeshes
            .iter()
            .filter(|submesh| {
                self.batches.add_item(
                    submesh.texture_key,
                    BatchItem {
                        world,
                        vertex_buffer: model.vertex_buffer,
                        index_buffer: model.index_buffer,
                        start_index: submesh.start_index,
                        primitive_count: submesh.primitive_count,
                    },
                )
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BufferHandle;

    fn model() -> Model {
        Model {
            vertex_buffer: BufferHandle(1),
            index_buffer: Some(BufferHandle(2)),
            submeshes: vec![
                Submesh {
                    texture_key: TextureKey(1),
                    start_index: 0,
                    primitive_count: 4,
                },
                Submesh {
                    texture_key: TextureKey(2),
                    start_index: 12,
                    primitive_count: 2,
                },
            ],
            bounds: BoundingSphere::new(Vec3::ZERO, 1.0),
        }
    }

    #[test]
    fn test_visible_model_adds_item_per_submesh() {
        let mut scene = Scene::new(Camera::new(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO));
        assert_eq!(scene.submit_model(&model(), Mat4::IDENTITY, &model().bounds), 2);
        assert_eq!(scene.batches.item_count(), 2);
    }

    #[test]
    fn test_culled_model_adds_nothing() {
        let mut scene = Scene::new(Camera::new(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO));
        let behind = Mat4::from_translation(Vec3::new(0.0, 0.0, 50.0));
        let bounds = model().bounds.transformed(behind);
        assert_eq!(scene.submit_model(&model(), behind, &bounds), 0);
        assert_eq!(scene.batches.item_count(), 0);
    }

    #[test]
    fn test_begin_frame_resets_batches() {
        let mut scene = Scene::new(Camera::new(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO));
        scene.submit_model(&model(), Mat4::IDENTITY, &model().bounds);
        scene.begin_frame();
        assert_eq!(scene.batches.item_count(), 0);
        assert_eq!(scene.batches.key_count(), 2);
    }
}
