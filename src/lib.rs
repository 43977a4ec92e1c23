//! Deferred Renderer - a deferred shading pipeline over a narrow graphics backend
//!
//! Geometry is rasterized once into a G-buffer (color, normal, depth), lights are
//! accumulated from it in a second pass, and the result is composed, optionally
//! through FXAA and bloom, before being letterboxed onto the back buffer.
//!
//! Two backends implement [`GraphicsBackend`](backend::GraphicsBackend):
//! - **wgpu**: the GPU implementation (`wgpu-backend` feature, on by default)
//! - **recording**: headless, records every call for inspection and tests
//!
//! # Frame
//! ```text
//! begin_frame -> submit_light / submit_billboard -> draw -> present
//! ```

pub mod backend;
pub mod bounded;
pub mod error;
pub mod pipeline;
pub mod renderer;
pub mod resources;
pub mod scene;
#[cfg(feature = "wgpu-backend")]
pub mod window;

use glam::Vec4;

pub use bounded::BoundedQueue;
pub use error::{RenderError, RenderResult};
pub use pipeline::{compose_plan, BackgroundMode, BloomDebugView, BloomSettings, ComposePlan};
pub use renderer::{FramePhase, FrameStats, Renderer};

#[cfg(feature = "wgpu-backend")]
pub use backend::wgpu_backend::WgpuBackend;
#[cfg(feature = "wgpu-backend")]
pub use window::Window;

/// Resolution of the G-buffer and post-processing targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderResolution {
    /// Follow the back buffer size
    #[default]
    Native,
    /// Fixed size, letterboxed into the back buffer
    Fixed(u32, u32),
}

/// Configuration for the renderer
#[derive(Debug, Clone, PartialEq)]
pub struct RendererConfig {
    pub fxaa_enabled: bool,
    pub bloom_enabled: bool,
    /// Draw the G-buffer targets as thumbnails over the final image
    pub show_debug_buffers: bool,
    /// Index into [`pipeline::PRESETS`]
    pub bloom_preset: usize,
    /// Base ambient color, added to the ambient lights submitted each frame
    pub ambient_color: Vec4,
    pub ambient_intensity: f32,
    pub render_resolution: RenderResolution,
    /// Add emissive surfaces to the light target
    pub emissive_pass: bool,
    /// Drawn behind pixels no geometry covered; black when `None`
    pub background: Option<BackgroundMode>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            fxaa_enabled: false,
            bloom_enabled: false,
            show_debug_buffers: false,
            bloom_preset: pipeline::bloom::DEFAULT_PRESET,
            ambient_color: Vec4::ONE,
            ambient_intensity: 0.0,
            render_resolution: RenderResolution::Native,
            emissive_pass: true,
            background: None,
        }
    }
}

impl RendererConfig {
    pub fn with_fxaa(mut self, enabled: bool) -> Self {
        self.fxaa_enabled = enabled;
        self
    }

    pub fn with_bloom(mut self, enabled: bool) -> Self {
        self.bloom_enabled = enabled;
        self
    }

    pub fn with_debug_buffers(mut self, show: bool) -> Self {
        self.show_debug_buffers = show;
        self
    }

    pub fn with_bloom_preset(mut self, index: usize) -> Self {
        self.bloom_preset = index;
        self
    }

    pub fn with_ambient(mut self, color: Vec4, intensity: f32) -> Self {
        self.ambient_color = color;
        self.ambient_intensity = intensity;
        self
    }

    pub fn with_render_resolution(mut self, resolution: RenderResolution) -> Self {
        self.render_resolution = resolution;
        self
    }

    pub fn with_emissive_pass(mut self, enabled: bool) -> Self {
        self.emissive_pass = enabled;
        self
    }

    pub fn with_background(mut self, background: BackgroundMode) -> Self {
        self.background = Some(background);
        self
    }
}
