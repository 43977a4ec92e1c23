//! Core backend abstraction traits
//!
//! The renderer drives the GPU exclusively through [`GraphicsBackend`]. Effects are
//! opaque programs addressed by named parameters; render state is a single
//! descriptor applied before each draw.

use crate::backend::effect::{EffectDescriptor, ParameterValue};
use crate::backend::types::*;
use std::ops::Range;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("Failed to create surface: {0}")]
    SurfaceCreationFailed(String),
    #[error("Failed to create device: {0}")]
    DeviceCreationFailed(String),
    #[error("Failed to acquire next image: {0}")]
    AcquireImageFailed(String),
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create effect '{label}': {reason}")]
    EffectCreationFailed { label: String, reason: String },
    #[error("Surface lost")]
    SurfaceLost,
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Device lost")]
    DeviceLost,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) u64);

/// Handle to a GPU texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to a compiled effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectHandle(pub(crate) u64);

/// Handle to one named parameter of an effect, resolved once at initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParameterHandle {
    pub(crate) effect: EffectHandle,
    pub(crate) index: usize,
}

impl ParameterHandle {
    pub fn effect(&self) -> EffectHandle {
        self.effect
    }
}

/// Main graphics backend trait
pub trait GraphicsBackend {
    /// Get the actual surface size (may be clamped by device limits)
    fn surface_size(&self) -> (u32, u32);

    /// Get the back buffer format
    fn surface_format(&self) -> TextureFormat;

    /// Resize the back buffer
    fn resize(&mut self, width: u32, height: u32);

    /// Begin a new frame
    fn begin_frame(&mut self) -> BackendResult<()>;

    /// Submit outstanding work and present the back buffer
    fn end_frame(&mut self) -> BackendResult<()>;

    // Resources

    /// Create a texture
    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle>;

    /// Write tightly packed pixel data to a texture
    fn write_texture(&mut self, texture: TextureHandle, data: &[u8], width: u32, height: u32);

    /// Size of a live texture
    fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)>;

    /// Destroy a texture
    fn destroy_texture(&mut self, texture: TextureHandle);

    /// Create a buffer with initial data
    fn create_buffer_init(&mut self, desc: &BufferDescriptor, data: &[u8])
        -> BackendResult<BufferHandle>;

    /// Destroy a buffer
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    // Effects

    /// Compile an effect and lay out its parameters
    fn create_effect(&mut self, desc: &EffectDescriptor) -> BackendResult<EffectHandle>;

    /// Look up a named parameter, `None` if the effect does not expose it
    fn effect_parameter(&self, effect: EffectHandle, name: &str) -> Option<ParameterHandle>;

    /// Set a parameter value; values persist on the effect until overwritten
    fn set_parameter(&mut self, parameter: ParameterHandle, value: ParameterValue<'_>);

    // Command recording

    /// Bind off-screen color targets (drawn simultaneously) and an optional depth attachment
    fn set_render_targets(&mut self, colors: &[TextureHandle], depth: Option<TextureHandle>);

    /// Restore the back buffer as the sole render target
    fn set_back_buffer(&mut self);

    /// Clear the bound targets
    fn clear(&mut self, color: Option<[f32; 4]>, depth: Option<f32>);

    /// Set viewport
    fn set_viewport(&mut self, viewport: Viewport);

    /// Set blend, depth, cull and sampler state for subsequent draws
    fn apply_render_state(&mut self, state: RenderState);

    /// Select the effect for subsequent draws
    fn set_effect(&mut self, effect: EffectHandle);

    /// Set vertex buffer
    fn set_vertex_buffer(&mut self, buffer: BufferHandle);

    /// Set index buffer
    fn set_index_buffer(&mut self, buffer: BufferHandle, format: IndexFormat);

    /// Draw primitives
    fn draw(&mut self, vertices: Range<u32>);

    /// Draw indexed primitives
    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32);

    /// Open a labelled group of commands
    fn push_debug_group(&mut self, label: &str);

    /// Close the innermost debug group
    fn pop_debug_group(&mut self);
}
