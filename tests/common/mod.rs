//! Shared fixtures for the frame tests.
//!
//! Every test drives a [`Renderer`] through the headless recording backend and
//! inspects the recorded call stream.

use glam::{Mat4, Vec3};

use deferred_renderer::backend::RecordingBackend;
use deferred_renderer::resources::{Mesh, TextureData};
use deferred_renderer::scene::{Camera, Model, Scene, TextureKey};
use deferred_renderer::{Renderer, RendererConfig};

pub const WHITE: TextureKey = TextureKey(1);

/// Back buffer size used unless a test needs another
pub const SURFACE: (u32, u32) = (320, 180);

pub struct TestContext {
    pub backend: RecordingBackend,
    pub renderer: Renderer,
    pub scene: Scene,
}

impl TestContext {
    pub fn new(config: RendererConfig) -> Self {
        Self::with_backend(RecordingBackend::new(SURFACE.0, SURFACE.1), config)
    }

    pub fn with_backend(mut backend: RecordingBackend, config: RendererConfig) -> Self {
        let renderer = Renderer::new(&mut backend, config).expect("renderer creation");
        let mut scene = Scene::new(Camera::new(Vec3::new(0.0, 2.0, 6.0), Vec3::ZERO));
        let white = TextureData::white()
            .upload(&mut backend)
            .expect("texture upload");
        scene.textures.insert(WHITE, white);
        backend.clear_calls();
        Self {
            backend,
            renderer,
            scene,
        }
    }

    /// Upload a unit cube textured with [`WHITE`]
    pub fn cube(&mut self) -> Model {
        Model::from_mesh(&mut self.backend, &Mesh::cube(), WHITE).expect("cube upload")
    }

    /// Submit `model` at `world` for this frame
    pub fn submit(&mut self, model: &Model, world: Mat4) -> usize {
        let bounds = model.bounds.transformed(world);
        self.scene.submit_model(model, world, &bounds)
    }

    /// Draw and present the submitted frame
    pub fn render(&mut self) {
        self.renderer
            .draw(&mut self.backend, &self.scene)
            .expect("draw");
        self.renderer.present(&mut self.backend).expect("present");
    }
}
