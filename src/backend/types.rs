//! Common types shared between backends

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};

/// Texture format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba16Float,
    Rgba32Float,
    Depth32Float,
    R32Float,
    Rg32Float,
}

impl TextureFormat {
    pub fn is_depth(&self) -> bool {
        matches!(self, TextureFormat::Depth32Float)
    }

    /// 32-bit float color formats cannot be sampled through a filtering sampler.
    pub fn is_filterable(&self) -> bool {
        !matches!(
            self,
            TextureFormat::Rgba32Float
                | TextureFormat::R32Float
                | TextureFormat::Rg32Float
                | TextureFormat::Depth32Float
        )
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba8UnormSrgb
            | TextureFormat::Bgra8Unorm
            | TextureFormat::Bgra8UnormSrgb
            | TextureFormat::Depth32Float
            | TextureFormat::R32Float => 4,
            TextureFormat::Rgba16Float | TextureFormat::Rg32Float => 8,
            TextureFormat::Rgba32Float => 16,
        }
    }
}

/// Texture usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureUsage(u32);

impl TextureUsage {
    pub const COPY_DST: Self = Self(1 << 0);
    pub const TEXTURE_BINDING: Self = Self(1 << 1);
    pub const RENDER_ATTACHMENT: Self = Self(1 << 2);

    /// Usage of every off-screen target the pipeline renders into and samples from.
    pub const RENDER_TARGET: Self = Self((1 << 1) | (1 << 2));

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for TextureUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Buffer usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferUsage(u32);

impl BufferUsage {
    pub const COPY_DST: Self = Self(1 << 0);
    pub const INDEX: Self = Self(1 << 1);
    pub const VERTEX: Self = Self(1 << 2);
    pub const UNIFORM: Self = Self(1 << 3);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for BufferUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Texture descriptor
#[derive(Debug, Clone)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

impl TextureDescriptor {
    /// Descriptor for an off-screen render target.
    pub fn render_target(label: &str, width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            label: Some(label.to_string()),
            width,
            height,
            format,
            usage: if format.is_depth() {
                TextureUsage::RENDER_ATTACHMENT
            } else {
                TextureUsage::RENDER_TARGET
            },
        }
    }
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        }
    }
}

/// Buffer descriptor
#[derive(Debug, Clone)]
pub struct BufferDescriptor {
    pub label: Option<String>,
    pub size: u64,
    pub usage: BufferUsage,
}

/// Vertex attribute format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32x2,
    Float32x3,
    Float32x4,
}

impl VertexFormat {
    pub fn size(&self) -> u64 {
        match self {
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 => 16,
        }
    }
}

/// Vertex attribute description
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: VertexFormat,
    pub offset: u64,
}

/// Vertex buffer layout
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexBufferLayout {
    pub array_stride: u64,
    pub attributes: Vec<VertexAttribute>,
}

/// Standard mesh vertex with position, normal, UV, and tangent
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    pub tangent: Vec4,
}

impl Vertex {
    pub fn layout() -> VertexBufferLayout {
        VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as u64,
            attributes: vec![
                VertexAttribute {
                    location: 0,
                    format: VertexFormat::Float32x3,
                    offset: 0,
                },
                VertexAttribute {
                    location: 1,
                    format: VertexFormat::Float32x3,
                    offset: 12,
                },
                VertexAttribute {
                    location: 2,
                    format: VertexFormat::Float32x2,
                    offset: 24,
                },
                VertexAttribute {
                    location: 3,
                    format: VertexFormat::Float32x4,
                    offset: 32,
                },
            ],
        }
    }
}

/// Screen-space vertex used by the fullscreen quad and billboards
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct VertexPositionTexture {
    pub position: Vec3,
    pub uv: Vec2,
}

impl VertexPositionTexture {
    pub const fn new(position: Vec3, uv: Vec2) -> Self {
        Self { position, uv }
    }

    pub fn layout() -> VertexBufferLayout {
        VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as u64,
            attributes: vec![
                VertexAttribute {
                    location: 0,
                    format: VertexFormat::Float32x3,
                    offset: 0,
                },
                VertexAttribute {
                    location: 1,
                    format: VertexFormat::Float32x2,
                    offset: 12,
                },
            ],
        }
    }
}

/// Index format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

/// Cull mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
}

/// Compare function for depth testing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareFunction {
    Never,
    Less,
    LessEqual,
    Always,
}

/// Blend factor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
}

/// Blend operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendOperation {
    Add,
    Subtract,
    Min,
    Max,
}

/// Blend component state
#[derive(Debug, Clone, Copy)]
pub struct BlendComponent {
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
    pub operation: BlendOperation,
}

impl Default for BlendComponent {
    fn default() -> Self {
        Self {
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::Zero,
            operation: BlendOperation::Add,
        }
    }
}

/// Blend state
#[derive(Debug, Clone, Copy)]
pub struct BlendState {
    pub color: BlendComponent,
    pub alpha: BlendComponent,
}

impl BlendState {
    pub fn alpha_blending() -> Self {
        Self {
            color: BlendComponent {
                src_factor: BlendFactor::SrcAlpha,
                dst_factor: BlendFactor::OneMinusSrcAlpha,
                operation: BlendOperation::Add,
            },
            alpha: BlendComponent {
                src_factor: BlendFactor::One,
                dst_factor: BlendFactor::OneMinusSrcAlpha,
                operation: BlendOperation::Add,
            },
        }
    }

    pub fn additive() -> Self {
        let add = BlendComponent {
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::One,
            operation: BlendOperation::Add,
        };
        Self {
            color: add,
            alpha: add,
        }
    }
}

/// Blend mode of a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Source replaces destination
    Opaque,
    /// Classic `src * a + dst * (1 - a)`
    AlphaBlend,
    /// `src + dst`, used for light accumulation
    Additive,
}

impl BlendMode {
    /// Fixed-function blend state, `None` for opaque writes
    pub fn blend_state(&self) -> Option<BlendState> {
        match self {
            BlendMode::Opaque => None,
            BlendMode::AlphaBlend => Some(BlendState::alpha_blending()),
            BlendMode::Additive => Some(BlendState::additive()),
        }
    }
}

/// Depth test/write mode of a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthMode {
    /// No depth test, no depth write
    None,
    /// Test against the bound depth attachment without writing
    Read,
    /// Test and write
    ReadWrite,
}

impl DepthMode {
    pub fn compare(&self) -> CompareFunction {
        match self {
            DepthMode::None => CompareFunction::Always,
            DepthMode::Read | DepthMode::ReadWrite => CompareFunction::LessEqual,
        }
    }

    pub fn writes(&self) -> bool {
        matches!(self, DepthMode::ReadWrite)
    }
}

/// Sampler used for every texture parameter of the drawn effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerMode {
    PointClamp,
    LinearClamp,
    LinearWrap,
}

/// Per-pass render state, applied atomically by the backend before each draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderState {
    pub blend: BlendMode,
    pub depth: DepthMode,
    pub cull: CullMode,
    pub sampler: SamplerMode,
}

impl RenderState {
    /// Fullscreen pass overwriting its target
    pub const SCREEN_OPAQUE: Self = Self {
        blend: BlendMode::Opaque,
        depth: DepthMode::None,
        cull: CullMode::None,
        sampler: SamplerMode::PointClamp,
    };

    /// Fullscreen pass with bilinear sampling, used by post-processing
    pub const SCREEN_FILTERED: Self = Self {
        blend: BlendMode::Opaque,
        depth: DepthMode::None,
        cull: CullMode::None,
        sampler: SamplerMode::LinearClamp,
    };

    /// Fullscreen pass alpha-blended over its target
    pub const SCREEN_ALPHA: Self = Self {
        blend: BlendMode::AlphaBlend,
        depth: DepthMode::None,
        cull: CullMode::None,
        sampler: SamplerMode::LinearClamp,
    };

    /// Fullscreen pass accumulated onto its target
    pub const SCREEN_ADDITIVE: Self = Self {
        blend: BlendMode::Additive,
        depth: DepthMode::None,
        cull: CullMode::None,
        sampler: SamplerMode::PointClamp,
    };

    /// Opaque scene geometry written into the G-buffer
    pub const GEOMETRY: Self = Self {
        blend: BlendMode::Opaque,
        depth: DepthMode::ReadWrite,
        cull: CullMode::Back,
        sampler: SamplerMode::LinearWrap,
    };

    /// Light volume accumulated into the light target
    pub fn light_volume(cull: CullMode) -> Self {
        Self {
            blend: BlendMode::Additive,
            depth: DepthMode::None,
            cull,
            sampler: SamplerMode::PointClamp,
        }
    }
}

/// Viewport rectangle in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Viewport covering a whole `width` x `height` surface
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width as f32, height as f32)
    }

    /// Largest rectangle with `aspect` centered inside `width` x `height`
    pub fn letterbox(width: u32, height: u32, aspect: f32) -> Self {
        let (w, h) = (width.max(1) as f32, height.max(1) as f32);
        if w / h > aspect {
            let fitted = (h * aspect).round();
            Self::new(((w - fitted) / 2.0).floor(), 0.0, fitted, h)
        } else {
            let fitted = (w / aspect).round();
            Self::new(0.0, ((h - fitted) / 2.0).floor(), w, fitted)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letterbox_pillarboxes_wide_surface() {
        let vp = Viewport::letterbox(1920, 1080, 4.0 / 3.0);
        assert_eq!(vp.height, 1080.0);
        assert_eq!(vp.width, 1440.0);
        assert_eq!(vp.x, 240.0);
        assert_eq!(vp.y, 0.0);
    }

    #[test]
    fn test_letterbox_matching_aspect_fills_surface() {
        let vp = Viewport::letterbox(1280, 720, 1280.0 / 720.0);
        assert_eq!(vp, Viewport::full(1280, 720));
    }

    #[test]
    fn test_float_formats_not_filterable() {
        assert!(!TextureFormat::Rg32Float.is_filterable());
        assert!(TextureFormat::Rgba16Float.is_filterable());
    }
}
