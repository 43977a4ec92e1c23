//! Headless backend that records every call.
//!
//! Nothing is rasterized. Resources are tracked so sizes and lifetimes can be
//! inspected, and the call stream can be queried by debug group, which is how
//! the test suite observes frame structure.

use std::collections::{HashMap, HashSet};
use std::ops::Range;

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::backend::effect::{EffectDescriptor, ParameterValue};
use crate::backend::traits::*;
use crate::backend::types::*;

/// Owned copy of a [`ParameterValue`]
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedValue {
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
    FloatArray(Vec<f32>),
    Vec2Array(Vec<Vec2>),
    Texture(TextureHandle),
}

impl From<ParameterValue<'_>> for RecordedValue {
    fn from(value: ParameterValue<'_>) -> Self {
        match value {
            ParameterValue::Float(v) => RecordedValue::Float(v),
            ParameterValue::Vec2(v) => RecordedValue::Vec2(v),
            ParameterValue::Vec3(v) => RecordedValue::Vec3(v),
            ParameterValue::Vec4(v) => RecordedValue::Vec4(v),
            ParameterValue::Mat4(v) => RecordedValue::Mat4(v),
            ParameterValue::FloatArray(v) => RecordedValue::FloatArray(v.to_vec()),
            ParameterValue::Vec2Array(v) => RecordedValue::Vec2Array(v.to_vec()),
            ParameterValue::Texture(t) => RecordedValue::Texture(t),
        }
    }
}

/// One recorded backend call
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    BeginFrame,
    Present,
    Resize { width: u32, height: u32 },
    CreateTexture { texture: TextureHandle, label: Option<String>, width: u32, height: u32 },
    DestroyTexture(TextureHandle),
    CreateBuffer { buffer: BufferHandle, size: u64 },
    DestroyBuffer(BufferHandle),
    CreateEffect { effect: EffectHandle, label: &'static str },
    SetParameter { effect: &'static str, name: &'static str, value: RecordedValue },
    SetRenderTargets { colors: Vec<TextureHandle>, depth: Option<TextureHandle> },
    SetBackBuffer,
    Clear { color: Option<[f32; 4]>, depth: Option<f32> },
    SetViewport(Viewport),
    ApplyRenderState(RenderState),
    SetEffect(&'static str),
    SetVertexBuffer(BufferHandle),
    SetIndexBuffer(BufferHandle),
    Draw { vertices: Range<u32> },
    DrawIndexed { indices: Range<u32>, base_vertex: i32 },
    PushDebugGroup(String),
    PopDebugGroup,
}

impl RecordedCall {
    pub fn is_draw(&self) -> bool {
        matches!(self, RecordedCall::Draw { .. } | RecordedCall::DrawIndexed { .. })
    }
}

struct RecordedEffect {
    descriptor: EffectDescriptor,
}

/// Backend that records calls instead of executing them
pub struct RecordingBackend {
    width: u32,
    height: u32,
    next_id: u64,
    calls: Vec<RecordedCall>,
    textures: HashMap<TextureHandle, TextureDescriptor>,
    buffers: HashMap<BufferHandle, u64>,
    effects: HashMap<EffectHandle, RecordedEffect>,
    hidden_parameters: HashSet<(String, String)>,
    frames_presented: u64,
}

impl RecordingBackend {
    /// Create a backend with a back buffer of the given size
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            next_id: 1,
            calls: Vec::new(),
            textures: HashMap::new(),
            buffers: HashMap::new(),
            effects: HashMap::new(),
            hidden_parameters: HashSet::new(),
            frames_presented: 0,
        }
    }

    /// Pretend the effect labelled `effect` does not expose parameter `name`
    pub fn without_parameter(mut self, effect: &str, name: &str) -> Self {
        self.hidden_parameters
            .insert((effect.to_string(), name.to_string()));
        self
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn effect_label(&self, effect: EffectHandle) -> &'static str {
        self.effects
            .get(&effect)
            .map(|e| e.descriptor.label)
            .unwrap_or("<destroyed>")
    }

    pub fn calls(&self) -> &[RecordedCall] {
        &self.calls
    }

    /// Forget every recorded call, keeping resources alive
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// Labels of the outermost debug groups, in order
    pub fn debug_groups(&self) -> Vec<String> {
        let mut depth = 0usize;
        let mut groups = Vec::new();
        for call in &self.calls {
            match call {
                RecordedCall::PushDebugGroup(label) => {
                    if depth == 0 {
                        groups.push(label.clone());
                    }
                    depth += 1;
                }
                RecordedCall::PopDebugGroup => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
        groups
    }

    /// Calls issued while a debug group named `label` was open, at any depth
    pub fn calls_within(&self, label: &str) -> Vec<&RecordedCall> {
        let mut stack: Vec<&str> = Vec::new();
        let mut out = Vec::new();
        for call in &self.calls {
            match call {
                RecordedCall::PushDebugGroup(l) => stack.push(l),
                RecordedCall::PopDebugGroup => {
                    stack.pop();
                }
                other if stack.contains(&label) => out.push(other),
                _ => {}
            }
        }
        out
    }

    /// Number of draws issued inside the debug group named `label`
    pub fn draws_within(&self, label: &str) -> usize {
        self.calls_within(label)
            .into_iter()
            .filter(|c| c.is_draw())
            .count()
    }

    pub fn draw_count(&self) -> usize {
        self.calls.iter().filter(|c| c.is_draw()).count()
    }

    /// Effects selected inside the debug group named `label`, in order
    pub fn effects_within(&self, label: &str) -> Vec<&'static str> {
        self.calls_within(label)
            .into_iter()
            .filter_map(|c| match c {
                RecordedCall::SetEffect(name) => Some(*name),
                _ => None,
            })
            .collect()
    }

    /// Last value set for `name` on the effect labelled `effect`
    pub fn last_parameter(&self, effect: &str, name: &str) -> Option<&RecordedValue> {
        self.calls.iter().rev().find_map(|c| match c {
            RecordedCall::SetParameter {
                effect: e,
                name: n,
                value,
            } if *e == effect && *n == name => Some(value),
            _ => None,
        })
    }
}

impl GraphicsBackend for RecordingBackend {
    fn surface_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn surface_format(&self) -> TextureFormat {
        TextureFormat::Bgra8UnormSrgb
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
        self.calls.push(RecordedCall::Resize {
            width: self.width,
            height: self.height,
        });
    }

    fn begin_frame(&mut self) -> BackendResult<()> {
        self.calls.push(RecordedCall::BeginFrame);
        Ok(())
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        self.frames_presented += 1;
        self.calls.push(RecordedCall::Present);
        Ok(())
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?} has zero size",
                desc.label
            )));
        }
        let handle = TextureHandle(self.next_id());
        log::trace!(
            "RecordingBackend: creating texture {:?} ({}x{})",
            desc.label,
            desc.width,
            desc.height
        );
        self.textures.insert(handle, desc.clone());
        self.calls.push(RecordedCall::CreateTexture {
            texture: handle,
            label: desc.label.clone(),
            width: desc.width,
            height: desc.height,
        });
        Ok(handle)
    }

    fn write_texture(&mut self, _texture: TextureHandle, _data: &[u8], _width: u32, _height: u32) {}

    fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)> {
        self.textures.get(&texture).map(|d| (d.width, d.height))
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture);
        self.calls.push(RecordedCall::DestroyTexture(texture));
    }

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        let handle = BufferHandle(self.next_id());
        let size = desc.size.max(data.len() as u64);
        self.buffers.insert(handle, size);
        self.calls.push(RecordedCall::CreateBuffer {
            buffer: handle,
            size,
        });
        Ok(handle)
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer);
        self.calls.push(RecordedCall::DestroyBuffer(buffer));
    }

    fn create_effect(&mut self, desc: &EffectDescriptor) -> BackendResult<EffectHandle> {
        if desc.source.is_empty() {
            return Err(BackendError::EffectCreationFailed {
                label: desc.label.to_string(),
                reason: "empty source".to_string(),
            });
        }
        let handle = EffectHandle(self.next_id());
        self.effects.insert(
            handle,
            RecordedEffect {
                descriptor: desc.clone(),
            },
        );
        self.calls.push(RecordedCall::CreateEffect {
            effect: handle,
            label: desc.label,
        });
        Ok(handle)
    }

    fn effect_parameter(&self, effect: EffectHandle, name: &str) -> Option<ParameterHandle> {
        let recorded = self.effects.get(&effect)?;
        let label = recorded.descriptor.label;
        if self
            .hidden_parameters
            .contains(&(label.to_string(), name.to_string()))
        {
            return None;
        }
        recorded
            .descriptor
            .find(name)
            .map(|index| ParameterHandle { effect, index })
    }

    fn set_parameter(&mut self, parameter: ParameterHandle, value: ParameterValue<'_>) {
        let Some(recorded) = self.effects.get(&parameter.effect) else {
            log::warn!("RecordingBackend: parameter set on unknown effect");
            return;
        };
        let Some(desc) = recorded.descriptor.parameters.get(parameter.index) else {
            return;
        };
        if !value.matches(desc.kind) {
            log::warn!(
                "RecordingBackend: {}.{} expects {:?}",
                recorded.descriptor.label,
                desc.name,
                desc.kind
            );
        }
        self.calls.push(RecordedCall::SetParameter {
            effect: recorded.descriptor.label,
            name: desc.name,
            value: value.into(),
        });
    }

    fn set_render_targets(&mut self, colors: &[TextureHandle], depth: Option<TextureHandle>) {
        self.calls.push(RecordedCall::SetRenderTargets {
            colors: colors.to_vec(),
            depth,
        });
    }

    fn set_back_buffer(&mut self) {
        self.calls.push(RecordedCall::SetBackBuffer);
    }

    fn clear(&mut self, color: Option<[f32; 4]>, depth: Option<f32>) {
        self.calls.push(RecordedCall::Clear { color, depth });
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.calls.push(RecordedCall::SetViewport(viewport));
    }

    fn apply_render_state(&mut self, state: RenderState) {
        self.calls.push(RecordedCall::ApplyRenderState(state));
    }

    fn set_effect(&mut self, effect: EffectHandle) {
        let label = self.effect_label(effect);
        self.calls.push(RecordedCall::SetEffect(label));
    }

    fn set_vertex_buffer(&mut self, buffer: BufferHandle) {
        self.calls.push(RecordedCall::SetVertexBuffer(buffer));
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, _format: IndexFormat) {
        self.calls.push(RecordedCall::SetIndexBuffer(buffer));
    }

    fn draw(&mut self, vertices: Range<u32>) {
        self.calls.push(RecordedCall::Draw { vertices });
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32) {
        self.calls.push(RecordedCall::DrawIndexed {
            indices,
            base_vertex,
        });
    }

    fn push_debug_group(&mut self, label: &str) {
        self.calls.push(RecordedCall::PushDebugGroup(label.to_string()));
    }

    fn pop_debug_group(&mut self) {
        self.calls.push(RecordedCall::PopDebugGroup);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_groups_report_outermost_labels() {
        let mut backend = RecordingBackend::new(64, 64);
        backend.push_debug_group("lights");
        backend.push_debug_group("lights.point");
        backend.draw(0..6);
        backend.pop_debug_group();
        backend.pop_debug_group();
        backend.push_debug_group("present");
        backend.pop_debug_group();

        assert_eq!(backend.debug_groups(), vec!["lights", "present"]);
        assert_eq!(backend.draws_within("lights"), 1);
        assert_eq!(backend.draws_within("lights.point"), 1);
        assert_eq!(backend.draws_within("present"), 0);
    }

    #[test]
    fn test_texture_lifetime_tracked() {
        let mut backend = RecordingBackend::new(64, 64);
        let desc = TextureDescriptor::render_target("t", 32, 16, TextureFormat::Rgba8Unorm);
        let texture = backend.create_texture(&desc).unwrap();
        assert_eq!(backend.texture_size(texture), Some((32, 16)));
        backend.destroy_texture(texture);
        assert_eq!(backend.texture_size(texture), None);
        assert_eq!(backend.live_textures(), 0);
    }
}
