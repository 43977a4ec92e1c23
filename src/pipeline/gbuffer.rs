//! G-buffer targets, clear and final composition
//!
//! Target layout:
//! - color `Rgba8Unorm`: rgb albedo, a specular intensity
//! - normal `Rgba16Float`: xyz normal encoded to `[0, 1]`, w specular power
//! - depth `Rg32Float`: r linear view depth over the far plane, g emissive factor
//! - light `Rgba16Float`: rgb diffuse light, a specular light
//!
//! plus a `Depth32Float` attachment for depth testing while geometry is drawn.

use glam::{Vec2, Vec4};

use crate::backend::{GraphicsBackend, RenderState, TextureDescriptor, TextureFormat, TextureHandle, Viewport};
use crate::error::RenderResult;
use crate::pipeline::effect::{self, Effect, Param};
use crate::pipeline::FullscreenQuad;

pub const COLOR_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;
pub const NORMAL_FORMAT: TextureFormat = TextureFormat::Rgba16Float;
pub const DEPTH_FORMAT: TextureFormat = TextureFormat::Rg32Float;
pub const LIGHT_FORMAT: TextureFormat = TextureFormat::Rgba16Float;
pub const DEPTH_STENCIL_FORMAT: TextureFormat = TextureFormat::Depth32Float;

/// Declares the three geometry outputs, shared by every effect writing the G-buffer
pub const GBUFFER_OUTPUT_WGSL: &str = r#"
struct GBufferOutput {
    @location(0) color: vec4<f32>,
    @location(1) normal: vec4<f32>,
    @location(2) depth: vec4<f32>,
}
"#;

const CLEAR_GBUFFER_WGSL: &str = r#"
struct Params {
    half_pixel: vec4<f32>,
    clear_color: vec4<f32>,
}

@group(0) @binding(0) var<uniform> params: Params;

@fragment
fn fs_main(input: VertexOutput) -> GBufferOutput {
    var output: GBufferOutput;
    output.color = vec4<f32>(params.clear_color.rgb, 0.0);
    // 0.5 decodes to a zero normal
    output.normal = vec4<f32>(0.5, 0.5, 0.5, 0.0);
    output.depth = vec4<f32>(1.0, 0.0, 0.0, 0.0);
    return output;
}
"#;

const COMBINE_FINAL_WGSL: &str = r#"
struct Params {
    half_pixel: vec4<f32>,
    ambient: vec4<f32>,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var target_sampler: sampler;
@group(0) @binding(2) var color_map: texture_2d<f32>;
@group(0) @binding(3) var light_map: texture_2d<f32>;
@group(0) @binding(4) var depth_map: texture_2d<f32>;

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let color = textureSample(color_map, target_sampler, input.uv);
    let light = textureSample(light_map, target_sampler, input.uv);
    let size = vec2<i32>(textureDimensions(depth_map));
    let texel = min(vec2<i32>(input.uv * vec2<f32>(size)), size - vec2<i32>(1));
    let depth = textureLoad(depth_map, texel, 0);

    let lit = color.rgb * (params.ambient.rgb + light.rgb) + vec3<f32>(light.a);
    // Pixels no geometry touched stay transparent so the background shows through
    let coverage = select(1.0, 0.0, depth.r >= 0.9999);
    return vec4<f32>(lit, coverage);
}
"#;

/// Full-screen pass resetting the three geometry targets
pub struct ClearEffect {
    effect: Effect,
    half_pixel: Param,
    clear_color: Param,
}

impl ClearEffect {
    pub fn new(backend: &mut dyn GraphicsBackend) -> RenderResult<Self> {
        let desc = effect::screen_effect(
            "ClearGBuffer",
            &format!("{}{}", GBUFFER_OUTPUT_WGSL, CLEAR_GBUFFER_WGSL),
            vec![effect::vec2("HalfPixel"), effect::vec4("ClearColor")],
        );
        let effect = Effect::create(backend, &desc)?;
        Ok(Self {
            half_pixel: effect.parameter(backend, "HalfPixel")?,
            clear_color: effect.parameter(backend, "ClearColor")?,
            effect,
        })
    }
}

/// Blends color, light and ambient into the composed image
pub struct CombineEffect {
    effect: Effect,
    half_pixel: Param,
    ambient: Param,
    color_map: Param,
    light_map: Param,
    depth_map: Param,
}

impl CombineEffect {
    pub fn new(backend: &mut dyn GraphicsBackend) -> RenderResult<Self> {
        let desc = effect::screen_effect(
            "CombineFinal",
            COMBINE_FINAL_WGSL,
            vec![
                effect::vec2("HalfPixel"),
                effect::vec4("Ambient"),
                effect::texture("ColorMap"),
                effect::texture("LightMap"),
                effect::unfilterable("DepthMap"),
            ],
        );
        let effect = Effect::create(backend, &desc)?;
        Ok(Self {
            half_pixel: effect.parameter(backend, "HalfPixel")?,
            ambient: effect.parameter(backend, "Ambient")?,
            color_map: effect.parameter(backend, "ColorMap")?,
            light_map: effect.parameter(backend, "LightMap")?,
            depth_map: effect.parameter(backend, "DepthMap")?,
            effect,
        })
    }
}

/// Handles of one generation of G-buffer targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GBufferTargets {
    pub color: TextureHandle,
    pub normal: TextureHandle,
    pub depth: TextureHandle,
    pub light: TextureHandle,
    pub depth_stencil: TextureHandle,
}

impl GBufferTargets {
    fn create(backend: &mut dyn GraphicsBackend, width: u32, height: u32) -> RenderResult<Self> {
        let mut target = |label: &str, format| {
            backend.create_texture(&TextureDescriptor::render_target(label, width, height, format))
        };
        Ok(Self {
            color: target("gbuffer.color", COLOR_FORMAT)?,
            normal: target("gbuffer.normal", NORMAL_FORMAT)?,
            depth: target("gbuffer.depth", DEPTH_FORMAT)?,
            light: target("gbuffer.light", LIGHT_FORMAT)?,
            depth_stencil: target("gbuffer.depth_stencil", DEPTH_STENCIL_FORMAT)?,
        })
    }

    fn destroy(&self, backend: &mut dyn GraphicsBackend) {
        for texture in [self.color, self.normal, self.depth, self.light, self.depth_stencil] {
            backend.destroy_texture(texture);
        }
    }
}

/// The geometry buffer and its per-frame state
pub struct GBuffer {
    targets: GBufferTargets,
    width: u32,
    height: u32,
    half_pixel: Vec2,
    /// Ambient term used by composition, color times intensity with alpha in `[0, 1]`
    pub ambient: Vec4,
}

impl GBuffer {
    pub fn new(backend: &mut dyn GraphicsBackend, width: u32, height: u32) -> RenderResult<Self> {
        let (width, height) = (width.max(1), height.max(1));
        Ok(Self {
            targets: GBufferTargets::create(backend, width, height)?,
            width,
            height,
            half_pixel: half_pixel(width, height),
            ambient: Vec4::ZERO,
        })
    }

    /// Recreate every target at the new size. Returns whether anything changed.
    pub fn create_or_resize(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        width: u32,
        height: u32,
    ) -> RenderResult<bool> {
        let (width, height) = (width.max(1), height.max(1));
        if (width, height) == (self.width, self.height) {
            return Ok(false);
        }
        self.recreate(backend, width, height)?;
        Ok(true)
    }

    /// Recreate every target at the current size, after a device reset
    pub fn recreate(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        width: u32,
        height: u32,
    ) -> RenderResult<()> {
        let (width, height) = (width.max(1), height.max(1));
        log::debug!("Recreating G-buffer at {}x{}", width, height);
        let targets = GBufferTargets::create(backend, width, height)?;
        self.targets.destroy(backend);
        self.targets = targets;
        self.width = width;
        self.height = height;
        self.half_pixel = half_pixel(width, height);
        Ok(())
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Offset of half a texel in UV space for the current size
    pub fn half_pixel(&self) -> Vec2 {
        self.half_pixel
    }

    pub fn targets(&self) -> &GBufferTargets {
        &self.targets
    }

    pub fn viewport(&self) -> Viewport {
        Viewport::full(self.width, self.height)
    }

    /// Bind color, normal and depth as simultaneous outputs with the depth attachment
    pub fn bind(&self, backend: &mut dyn GraphicsBackend) {
        backend.set_render_targets(
            &[self.targets.color, self.targets.normal, self.targets.depth],
            Some(self.targets.depth_stencil),
        );
        backend.set_viewport(self.viewport());
    }

    /// Restore the back buffer and its full viewport
    pub fn unbind(&self, backend: &mut dyn GraphicsBackend) {
        backend.set_back_buffer();
        let (width, height) = backend.surface_size();
        backend.set_viewport(Viewport::full(width, height));
    }

    /// Bind the light accumulation target and reset it to black
    pub fn bind_light_target(&self, backend: &mut dyn GraphicsBackend) {
        backend.set_render_targets(&[self.targets.light], None);
        backend.set_viewport(self.viewport());
        backend.clear(Some([0.0; 4]), None);
    }

    /// Reset the geometry targets with a shader pass and the depth attachment to 1.0
    pub fn clear(
        &self,
        backend: &mut dyn GraphicsBackend,
        clear: &ClearEffect,
        quad: &FullscreenQuad,
        color: Vec4,
    ) {
        backend.clear(None, Some(1.0));
        backend.apply_render_state(RenderState::SCREEN_OPAQUE);
        clear.effect.bind(backend);
        clear.half_pixel.set_vec2(backend, self.half_pixel);
        clear.clear_color.set_vec4(backend, color);
        quad.draw(backend);
    }

    /// Blend the lit G-buffer into the currently bound target
    pub fn compose_final(
        &self,
        backend: &mut dyn GraphicsBackend,
        combine: &CombineEffect,
        quad: &FullscreenQuad,
    ) {
        backend.apply_render_state(RenderState::SCREEN_ALPHA);
        combine.effect.bind(backend);
        combine.half_pixel.set_vec2(backend, self.half_pixel);
        combine.ambient.set_vec4(backend, self.ambient);
        combine.color_map.set_texture(backend, self.targets.color);
        combine.light_map.set_texture(backend, self.targets.light);
        combine.depth_map.set_texture(backend, self.targets.depth);
        quad.draw(backend);
    }

    pub fn destroy(&self, backend: &mut dyn GraphicsBackend) {
        self.targets.destroy(backend);
    }
}

/// `(0.5 / width, 0.5 / height)`
pub fn half_pixel(width: u32, height: u32) -> Vec2 {
    Vec2::new(0.5 / width.max(1) as f32, 0.5 / height.max(1) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{RecordedCall, RecordingBackend};

    #[test]
    fn test_resize_recreates_all_targets() {
        let mut backend = RecordingBackend::new(640, 480);
        let mut gbuffer = GBuffer::new(&mut backend, 640, 480).unwrap();
        let before = *gbuffer.targets();

        assert!(gbuffer.create_or_resize(&mut backend, 320, 200).unwrap());
        let after = *gbuffer.targets();
        for texture in [after.color, after.normal, after.depth, after.light, after.depth_stencil] {
            assert_eq!(backend.texture_size(texture), Some((320, 200)));
        }
        assert_eq!(backend.texture_size(before.color), None);
        assert_eq!(gbuffer.half_pixel(), Vec2::new(0.5 / 320.0, 0.5 / 200.0));
        assert_eq!(backend.live_textures(), 5);
    }

    #[test]
    fn test_resize_to_same_size_is_noop() {
        let mut backend = RecordingBackend::new(64, 64);
        let mut gbuffer = GBuffer::new(&mut backend, 64, 64).unwrap();
        backend.clear_calls();
        assert!(!gbuffer.create_or_resize(&mut backend, 64, 64).unwrap());
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_zero_size_clamped() {
        let mut backend = RecordingBackend::new(64, 64);
        let gbuffer = GBuffer::new(&mut backend, 0, 0).unwrap();
        assert_eq!(gbuffer.size(), (1, 1));
        assert_eq!(gbuffer.half_pixel(), Vec2::splat(0.5));
    }

    #[test]
    fn test_clear_is_one_opaque_draw() {
        let mut backend = RecordingBackend::new(64, 64);
        let gbuffer = GBuffer::new(&mut backend, 64, 64).unwrap();
        let clear = ClearEffect::new(&mut backend).unwrap();
        let quad = FullscreenQuad::new(&mut backend).unwrap();
        backend.clear_calls();

        gbuffer.clear(&mut backend, &clear, &quad, Vec4::ZERO);

        assert_eq!(backend.draw_count(), 1);
        assert!(backend
            .calls()
            .contains(&RecordedCall::ApplyRenderState(RenderState::SCREEN_OPAQUE)));
        assert!(backend.calls().contains(&RecordedCall::Clear {
            color: None,
            depth: Some(1.0)
        }));
    }

    #[test]
    fn test_bind_sets_three_outputs_with_depth() {
        let mut backend = RecordingBackend::new(64, 64);
        let gbuffer = GBuffer::new(&mut backend, 64, 64).unwrap();
        backend.clear_calls();
        gbuffer.bind(&mut backend);

        let targets = gbuffer.targets();
        assert_eq!(
            backend.calls()[0],
            RecordedCall::SetRenderTargets {
                colors: vec![targets.color, targets.normal, targets.depth],
                depth: Some(targets.depth_stencil),
            }
        );
    }
}
