//! Effect descriptors and named parameters
//!
//! An effect is a WGSL module with `vs_main`/`fs_main` entry points plus a table of
//! named parameters. Backends lay the parameters out with a fixed convention:
//!
//! - `@group(0) @binding(0)`: uniform block, one 16-byte slot per scalar or vector
//!   parameter, 64 bytes per matrix, `N * 16` bytes per array, in declaration order
//! - `@group(0) @binding(1)`: the sampler selected by the current render state
//! - `@group(0) @binding(2 + i)`: the i-th texture parameter

use crate::backend::traits::TextureHandle;
use crate::backend::types::VertexBufferLayout;
use glam::{Mat4, Vec2, Vec3, Vec4};

/// Uniform slot size for scalars and vectors
pub const UNIFORM_SLOT: u64 = 16;

/// First binding index used by texture parameters
pub const FIRST_TEXTURE_BINDING: u32 = 2;

/// Type of a named effect parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
    FloatArray(u32),
    Vec2Array(u32),
    /// Sampled texture; unfilterable textures are read with `textureLoad`
    Texture { filterable: bool },
}

impl ParameterKind {
    /// Bytes occupied in the uniform block, zero for textures
    pub fn uniform_size(&self) -> u64 {
        match self {
            ParameterKind::Float
            | ParameterKind::Vec2
            | ParameterKind::Vec3
            | ParameterKind::Vec4 => UNIFORM_SLOT,
            ParameterKind::Mat4 => 4 * UNIFORM_SLOT,
            ParameterKind::FloatArray(n) | ParameterKind::Vec2Array(n) => *n as u64 * UNIFORM_SLOT,
            ParameterKind::Texture { .. } => 0,
        }
    }

    pub fn is_texture(&self) -> bool {
        matches!(self, ParameterKind::Texture { .. })
    }
}

/// A named parameter declared by an effect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDescriptor {
    pub name: &'static str,
    pub kind: ParameterKind,
}

impl ParameterDescriptor {
    pub const fn new(name: &'static str, kind: ParameterKind) -> Self {
        Self { name, kind }
    }
}

/// Where a parameter lives once an effect is laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterSlot {
    Uniform { offset: u64, size: u64 },
    Texture { binding: u32 },
}

/// Effect creation descriptor
#[derive(Debug, Clone)]
pub struct EffectDescriptor {
    pub label: &'static str,
    pub source: String,
    pub vertex_layout: VertexBufferLayout,
    pub parameters: Vec<ParameterDescriptor>,
}

impl EffectDescriptor {
    /// Resolve each parameter to its uniform offset or texture binding
    pub fn slots(&self) -> Vec<ParameterSlot> {
        let mut offset = 0;
        let mut binding = FIRST_TEXTURE_BINDING;
        self.parameters
            .iter()
            .map(|param| match param.kind {
                ParameterKind::Texture { .. } => {
                    let slot = ParameterSlot::Texture { binding };
                    binding += 1;
                    slot
                }
                kind => {
                    let size = kind.uniform_size();
                    let slot = ParameterSlot::Uniform { offset, size };
                    offset += size;
                    slot
                }
            })
            .collect()
    }

    /// Size of the uniform block, never less than one slot
    pub fn uniform_size(&self) -> u64 {
        self.parameters
            .iter()
            .map(|p| p.kind.uniform_size())
            .sum::<u64>()
            .max(UNIFORM_SLOT)
    }

    pub fn texture_parameters(&self) -> impl Iterator<Item = &ParameterDescriptor> {
        self.parameters.iter().filter(|p| p.kind.is_texture())
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.parameters.iter().position(|p| p.name == name)
    }
}

/// A value assigned to an effect parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterValue<'a> {
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
    FloatArray(&'a [f32]),
    Vec2Array(&'a [Vec2]),
    Texture(TextureHandle),
}

impl<'a> ParameterValue<'a> {
    pub fn matches(&self, kind: ParameterKind) -> bool {
        matches!(
            (self, kind),
            (ParameterValue::Float(_), ParameterKind::Float)
                | (ParameterValue::Vec2(_), ParameterKind::Vec2)
                | (ParameterValue::Vec3(_), ParameterKind::Vec3)
                | (ParameterValue::Vec4(_), ParameterKind::Vec4)
                | (ParameterValue::Mat4(_), ParameterKind::Mat4)
                | (ParameterValue::FloatArray(_), ParameterKind::FloatArray(_))
                | (ParameterValue::Vec2Array(_), ParameterKind::Vec2Array(_))
                | (ParameterValue::Texture(_), ParameterKind::Texture { .. })
        )
    }

    /// Write the value into a uniform block slot using the 16-byte slot convention
    pub fn write_uniform(&self, slot: &mut [u8]) {
        fn put(dst: &mut [u8], offset: usize, floats: &[f32]) {
            let bytes: &[u8] = bytemuck::cast_slice(floats);
            let end = (offset + bytes.len()).min(dst.len());
            if offset < end {
                dst[offset..end].copy_from_slice(&bytes[..end - offset]);
            }
        }

        let stride = UNIFORM_SLOT as usize;
        match self {
            ParameterValue::Float(v) => put(slot, 0, &[*v]),
            ParameterValue::Vec2(v) => put(slot, 0, &v.to_array()),
            ParameterValue::Vec3(v) => put(slot, 0, &v.to_array()),
            ParameterValue::Vec4(v) => put(slot, 0, &v.to_array()),
            ParameterValue::Mat4(m) => put(slot, 0, &m.to_cols_array()),
            ParameterValue::FloatArray(values) => {
                for (i, v) in values.iter().enumerate() {
                    put(slot, i * stride, &[*v]);
                }
            }
            ParameterValue::Vec2Array(values) => {
                for (i, v) in values.iter().enumerate() {
                    put(slot, i * stride, &v.to_array());
                }
            }
            ParameterValue::Texture(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::types::VertexPositionTexture;

    fn descriptor() -> EffectDescriptor {
        EffectDescriptor {
            label: "test",
            source: String::new(),
            vertex_layout: VertexPositionTexture::layout(),
            parameters: vec![
                ParameterDescriptor::new("HalfPixel", ParameterKind::Vec2),
                ParameterDescriptor::new("ColorMap", ParameterKind::Texture { filterable: true }),
                ParameterDescriptor::new("World", ParameterKind::Mat4),
                ParameterDescriptor::new("Weights", ParameterKind::FloatArray(15)),
                ParameterDescriptor::new("DepthMap", ParameterKind::Texture { filterable: false }),
            ],
        }
    }

    #[test]
    fn test_slots_follow_declaration_order() {
        let slots = descriptor().slots();
        assert_eq!(slots[0], ParameterSlot::Uniform { offset: 0, size: 16 });
        assert_eq!(slots[1], ParameterSlot::Texture { binding: 2 });
        assert_eq!(slots[2], ParameterSlot::Uniform { offset: 16, size: 64 });
        assert_eq!(slots[3], ParameterSlot::Uniform { offset: 80, size: 240 });
        assert_eq!(slots[4], ParameterSlot::Texture { binding: 3 });
        assert_eq!(descriptor().uniform_size(), 320);
    }

    #[test]
    fn test_array_elements_use_full_slots() {
        let mut floats = [0f32; 12];
        ParameterValue::FloatArray(&[1.0, 2.0, 3.0])
            .write_uniform(bytemuck::cast_slice_mut(&mut floats));
        assert_eq!(floats[0], 1.0);
        assert_eq!(floats[4], 2.0);
        assert_eq!(floats[8], 3.0);
        assert_eq!(floats[1], 0.0);
    }

    #[test]
    fn test_value_kind_matching() {
        assert!(ParameterValue::Float(1.0).matches(ParameterKind::Float));
        assert!(!ParameterValue::Float(1.0).matches(ParameterKind::Vec2));
        assert!(ParameterValue::FloatArray(&[]).matches(ParameterKind::FloatArray(15)));
    }
}
