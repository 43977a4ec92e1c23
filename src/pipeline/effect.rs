//! Compiled effects with parameters resolved by name

use crate::backend::{
    EffectDescriptor, EffectHandle, GraphicsBackend, ParameterDescriptor, ParameterHandle,
    ParameterKind, ParameterValue, TextureHandle, VertexBufferLayout, VertexPositionTexture,
};
use crate::error::{RenderError, RenderResult};
use glam::{Mat4, Vec2, Vec3, Vec4};

/// Vertex stage shared by every screen-space effect.
///
/// Quad vertices are already in clip space.
pub const SCREEN_VERTEX_WGSL: &str = r#"
struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) uv: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var output: VertexOutput;
    output.position = vec4<f32>(input.position, 1.0);
    output.uv = input.uv;
    return output;
}
"#;

/// Full source of a screen-space effect
pub fn screen_source(fragment: &str) -> String {
    format!("{SCREEN_VERTEX_WGSL}{fragment}")
}

/// Descriptor of a screen-space effect drawn with the fullscreen quad
pub fn screen_effect(
    label: &'static str,
    fragment: &str,
    parameters: Vec<ParameterDescriptor>,
) -> EffectDescriptor {
    EffectDescriptor {
        label,
        source: screen_source(fragment),
        vertex_layout: VertexPositionTexture::layout(),
        parameters,
    }
}

/// Descriptor of an effect with its own vertex stage
pub fn mesh_effect(
    label: &'static str,
    source: &str,
    vertex_layout: VertexBufferLayout,
    parameters: Vec<ParameterDescriptor>,
) -> EffectDescriptor {
    EffectDescriptor {
        label,
        source: source.to_string(),
        vertex_layout,
        parameters,
    }
}

pub const fn float(name: &'static str) -> ParameterDescriptor {
    ParameterDescriptor::new(name, ParameterKind::Float)
}

pub const fn vec2(name: &'static str) -> ParameterDescriptor {
    ParameterDescriptor::new(name, ParameterKind::Vec2)
}

pub const fn vec3(name: &'static str) -> ParameterDescriptor {
    ParameterDescriptor::new(name, ParameterKind::Vec3)
}

pub const fn vec4(name: &'static str) -> ParameterDescriptor {
    ParameterDescriptor::new(name, ParameterKind::Vec4)
}

pub const fn mat4(name: &'static str) -> ParameterDescriptor {
    ParameterDescriptor::new(name, ParameterKind::Mat4)
}

pub const fn float_array(name: &'static str, len: u32) -> ParameterDescriptor {
    ParameterDescriptor::new(name, ParameterKind::FloatArray(len))
}

pub const fn vec2_array(name: &'static str, len: u32) -> ParameterDescriptor {
    ParameterDescriptor::new(name, ParameterKind::Vec2Array(len))
}

pub const fn texture(name: &'static str) -> ParameterDescriptor {
    ParameterDescriptor::new(name, ParameterKind::Texture { filterable: true })
}

/// Texture read with `textureLoad`, such as 32-bit float targets
pub const fn unfilterable(name: &'static str) -> ParameterDescriptor {
    ParameterDescriptor::new(name, ParameterKind::Texture { filterable: false })
}

/// An effect created on a backend
#[derive(Debug, Clone, Copy)]
pub struct Effect {
    pub handle: EffectHandle,
    pub label: &'static str,
}

impl Effect {
    pub fn create(backend: &mut dyn GraphicsBackend, desc: &EffectDescriptor) -> RenderResult<Self> {
        let handle = backend.create_effect(desc)?;
        log::debug!("Created effect '{}'", desc.label);
        Ok(Self {
            handle,
            label: desc.label,
        })
    }

    /// Resolve a named parameter; a missing name is a configuration error
    pub fn parameter(
        &self,
        backend: &dyn GraphicsBackend,
        name: &'static str,
    ) -> RenderResult<Param> {
        backend
            .effect_parameter(self.handle, name)
            .map(Param)
            .ok_or(RenderError::MissingParameter {
                effect: self.label,
                name,
            })
    }

    pub fn bind(&self, backend: &mut dyn GraphicsBackend) {
        backend.set_effect(self.handle);
    }
}

/// A resolved parameter handle with typed setters
#[derive(Debug, Clone, Copy)]
pub struct Param(ParameterHandle);

impl Param {
    pub fn set_float(&self, backend: &mut dyn GraphicsBackend, value: f32) {
        backend.set_parameter(self.0, ParameterValue::Float(value));
    }

    pub fn set_vec2(&self, backend: &mut dyn GraphicsBackend, value: Vec2) {
        backend.set_parameter(self.0, ParameterValue::Vec2(value));
    }

    pub fn set_vec3(&self, backend: &mut dyn GraphicsBackend, value: Vec3) {
        backend.set_parameter(self.0, ParameterValue::Vec3(value));
    }

    pub fn set_vec4(&self, backend: &mut dyn GraphicsBackend, value: Vec4) {
        backend.set_parameter(self.0, ParameterValue::Vec4(value));
    }

    pub fn set_mat4(&self, backend: &mut dyn GraphicsBackend, value: Mat4) {
        backend.set_parameter(self.0, ParameterValue::Mat4(value));
    }

    pub fn set_floats(&self, backend: &mut dyn GraphicsBackend, values: &[f32]) {
        backend.set_parameter(self.0, ParameterValue::FloatArray(values));
    }

    pub fn set_vec2s(&self, backend: &mut dyn GraphicsBackend, values: &[Vec2]) {
        backend.set_parameter(self.0, ParameterValue::Vec2Array(values));
    }

    pub fn set_texture(&self, backend: &mut dyn GraphicsBackend, texture: TextureHandle) {
        backend.set_parameter(self.0, ParameterValue::Texture(texture));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;

    fn descriptor() -> EffectDescriptor {
        screen_effect(
            "Solid",
            "@fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }",
            vec![vec2("HalfPixel"), texture("SourceMap")],
        )
    }

    #[test]
    fn test_parameter_resolves_by_name() {
        let mut backend = RecordingBackend::new(8, 8);
        let effect = Effect::create(&mut backend, &descriptor()).unwrap();
        assert!(effect.parameter(&backend, "HalfPixel").is_ok());
        assert!(effect.parameter(&backend, "SourceMap").is_ok());
    }

    #[test]
    fn test_missing_parameter_is_an_error() {
        let mut backend = RecordingBackend::new(8, 8);
        let effect = Effect::create(&mut backend, &descriptor()).unwrap();
        let err = effect.parameter(&backend, "Threshold").unwrap_err();
        assert!(matches!(
            err,
            RenderError::MissingParameter {
                effect: "Solid",
                name: "Threshold"
            }
        ));
    }

    #[test]
    fn test_screen_source_contains_vertex_stage() {
        assert!(descriptor().source.contains("fn vs_main"));
        assert!(descriptor().source.contains("fn fs_main"));
    }
}
