//! Back buffer presentation: background, letterboxed blit and debug thumbnails

use glam::{Vec2, Vec4};

use crate::backend::{GraphicsBackend, RenderState, TextureHandle, Viewport};
use crate::error::RenderResult;
use crate::pipeline::effect::{self, Effect, Param};
use crate::pipeline::gbuffer::{half_pixel, GBufferTargets};
use crate::pipeline::FullscreenQuad;

/// What fills the back buffer behind pixels no geometry covered
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackgroundMode {
    Solid(Vec4),
    /// Vertical gradient from `zenith` at the top to `horizon` at the bottom
    Gradient { zenith: Vec4, horizon: Vec4 },
}

impl BackgroundMode {
    /// Top and bottom colors
    pub fn colors(&self) -> (Vec4, Vec4) {
        match *self {
            BackgroundMode::Solid(color) => (color, color),
            BackgroundMode::Gradient { zenith, horizon } => (zenith, horizon),
        }
    }
}

const COPY_WGSL: &str = r#"
struct Params {
    half_pixel: vec4<f32>,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var source_sampler: sampler;
@group(0) @binding(2) var source_map: texture_2d<f32>;

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(source_map, source_sampler, input.uv);
}
"#;

const DEPTH_VIEW_WGSL: &str = r#"
struct Params {
    half_pixel: vec4<f32>,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var depth_sampler: sampler;
@group(0) @binding(2) var depth_map: texture_2d<f32>;

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let size = vec2<i32>(textureDimensions(depth_map));
    let texel = min(vec2<i32>(input.uv * vec2<f32>(size)), size - vec2<i32>(1));
    let depth = textureLoad(depth_map, texel, 0).r;
    return vec4<f32>(vec3<f32>(1.0 - depth), 1.0);
}
"#;

const BACKGROUND_WGSL: &str = r#"
struct Params {
    half_pixel: vec4<f32>,
    zenith: vec4<f32>,
    horizon: vec4<f32>,
}

@group(0) @binding(0) var<uniform> params: Params;

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    return mix(params.zenith, params.horizon, input.uv.y);
}
"#;

/// Pass-through copy of one texture
pub struct CopyEffect {
    effect: Effect,
    half_pixel: Param,
    source_map: Param,
}

impl CopyEffect {
    pub fn new(backend: &mut dyn GraphicsBackend) -> RenderResult<Self> {
        let desc = effect::screen_effect(
            "Copy",
            COPY_WGSL,
            vec![effect::vec2("HalfPixel"), effect::texture("SourceMap")],
        );
        let effect = Effect::create(backend, &desc)?;
        Ok(Self {
            half_pixel: effect.parameter(backend, "HalfPixel")?,
            source_map: effect.parameter(backend, "SourceMap")?,
            effect,
        })
    }

    /// Draw `source` over the bound target with the current render state
    pub fn draw(&self, backend: &mut dyn GraphicsBackend, quad: &FullscreenQuad, source: TextureHandle) {
        let half = backend
            .texture_size(source)
            .map(|(w, h)| half_pixel(w, h))
            .unwrap_or(Vec2::splat(0.5));
        self.effect.bind(backend);
        self.half_pixel.set_vec2(backend, half);
        self.source_map.set_texture(backend, source);
        quad.draw(backend);
    }
}

struct DepthViewEffect {
    effect: Effect,
    half_pixel: Param,
    depth_map: Param,
}

impl DepthViewEffect {
    fn new(backend: &mut dyn GraphicsBackend) -> RenderResult<Self> {
        let desc = effect::screen_effect(
            "DepthView",
            DEPTH_VIEW_WGSL,
            vec![effect::vec2("HalfPixel"), effect::unfilterable("DepthMap")],
        );
        let effect = Effect::create(backend, &desc)?;
        Ok(Self {
            half_pixel: effect.parameter(backend, "HalfPixel")?,
            depth_map: effect.parameter(backend, "DepthMap")?,
            effect,
        })
    }
}

struct BackgroundEffect {
    effect: Effect,
    half_pixel: Param,
    zenith: Param,
    horizon: Param,
}

impl BackgroundEffect {
    fn new(backend: &mut dyn GraphicsBackend) -> RenderResult<Self> {
        let desc = effect::screen_effect(
            "Background",
            BACKGROUND_WGSL,
            vec![
                effect::vec2("HalfPixel"),
                effect::vec4("ZenithColor"),
                effect::vec4("HorizonColor"),
            ],
        );
        let effect = Effect::create(backend, &desc)?;
        Ok(Self {
            half_pixel: effect.parameter(backend, "HalfPixel")?,
            zenith: effect.parameter(backend, "ZenithColor")?,
            horizon: effect.parameter(backend, "HorizonColor")?,
            effect,
        })
    }
}

/// Number of debug thumbnails along the bottom edge
pub const DEBUG_THUMBNAILS: u32 = 4;

/// Thumbnail rectangles for a `width` x `height` back buffer, left to right
pub fn debug_thumbnail_viewports(width: u32, height: u32) -> [Viewport; DEBUG_THUMBNAILS as usize] {
    let tile_w = (width / DEBUG_THUMBNAILS) as f32;
    let tile_h = (height / DEBUG_THUMBNAILS) as f32;
    let y = height as f32 - tile_h;
    std::array::from_fn(|i| Viewport::new(i as f32 * tile_w, y, tile_w, tile_h))
}

/// Effects drawing into the back buffer at present time
pub struct Presenter {
    copy: CopyEffect,
    depth_view: DepthViewEffect,
    background: BackgroundEffect,
}

impl Presenter {
    pub fn new(backend: &mut dyn GraphicsBackend) -> RenderResult<Self> {
        Ok(Self {
            copy: CopyEffect::new(backend)?,
            depth_view: DepthViewEffect::new(backend)?,
            background: BackgroundEffect::new(backend)?,
        })
    }

    pub fn copy(&self) -> &CopyEffect {
        &self.copy
    }

    /// Fill `viewport` of the bound target with the background
    pub fn draw_background(
        &self,
        backend: &mut dyn GraphicsBackend,
        quad: &FullscreenQuad,
        mode: &BackgroundMode,
        viewport: Viewport,
    ) {
        let (zenith, horizon) = mode.colors();
        backend.set_viewport(viewport);
        backend.apply_render_state(RenderState::SCREEN_OPAQUE);

        let bg = &self.background;
        bg.effect.bind(backend);
        bg.half_pixel.set_vec2(
            backend,
            Vec2::new(0.5 / viewport.width.max(1.0), 0.5 / viewport.height.max(1.0)),
        );
        bg.zenith.set_vec4(backend, zenith);
        bg.horizon.set_vec4(backend, horizon);
        quad.draw(backend);
    }

    /// Alpha-blend `source` into `viewport` of the bound target
    pub fn blit(
        &self,
        backend: &mut dyn GraphicsBackend,
        quad: &FullscreenQuad,
        source: TextureHandle,
        viewport: Viewport,
    ) {
        backend.set_viewport(viewport);
        backend.apply_render_state(RenderState::SCREEN_ALPHA);
        self.copy.draw(backend, quad, source);
    }

    /// Color, normal, depth and light targets as thumbnails along the bottom edge
    pub fn draw_debug_buffers(
        &self,
        backend: &mut dyn GraphicsBackend,
        quad: &FullscreenQuad,
        targets: &GBufferTargets,
    ) {
        let (width, height) = backend.surface_size();
        let [color, normal, depth, light] = debug_thumbnail_viewports(width, height);
        backend.apply_render_state(RenderState::SCREEN_OPAQUE);

        for (texture, viewport) in [(targets.color, color), (targets.normal, normal), (targets.light, light)] {
            backend.set_viewport(viewport);
            self.copy.draw(backend, quad, texture);
        }

        backend.set_viewport(depth);
        let dv = &self.depth_view;
        dv.effect.bind(backend);
        dv.half_pixel.set_vec2(
            backend,
            Vec2::new(0.5 / depth.width.max(1.0), 0.5 / depth.height.max(1.0)),
        );
        dv.depth_map.set_texture(backend, targets.depth);
        quad.draw(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{RecordedCall, RecordedValue, RecordingBackend};
    use crate::pipeline::GBuffer;

    #[test]
    fn test_thumbnails_sit_on_bottom_edge() {
        let tiles = debug_thumbnail_viewports(800, 600);
        assert_eq!(tiles[0], Viewport::new(0.0, 450.0, 200.0, 150.0));
        assert_eq!(tiles[3].x, 600.0);
        assert!(tiles.iter().all(|t| t.y + t.height == 600.0));
    }

    #[test]
    fn test_solid_background_uses_one_color() {
        let color = Vec4::new(0.1, 0.2, 0.3, 1.0);
        assert_eq!(BackgroundMode::Solid(color).colors(), (color, color));
    }

    #[test]
    fn test_blit_alpha_blends_into_viewport() {
        let mut backend = RecordingBackend::new(800, 600);
        let presenter = Presenter::new(&mut backend).unwrap();
        let quad = FullscreenQuad::new(&mut backend).unwrap();
        let gbuffer = GBuffer::new(&mut backend, 400, 300).unwrap();
        let source = gbuffer.targets().color;
        let viewport = Viewport::new(100.0, 0.0, 600.0, 600.0);
        backend.clear_calls();

        presenter.blit(&mut backend, &quad, source, viewport);

        assert_eq!(backend.calls()[0], RecordedCall::SetViewport(viewport));
        assert_eq!(
            backend.calls()[1],
            RecordedCall::ApplyRenderState(RenderState::SCREEN_ALPHA)
        );
        assert_eq!(
            backend.last_parameter("Copy", "HalfPixel"),
            Some(&RecordedValue::Vec2(half_pixel(400, 300)))
        );
        assert_eq!(backend.draw_count(), 1);
    }

    #[test]
    fn test_debug_buffers_draw_four_thumbnails() {
        let mut backend = RecordingBackend::new(800, 600);
        let presenter = Presenter::new(&mut backend).unwrap();
        let quad = FullscreenQuad::new(&mut backend).unwrap();
        let gbuffer = GBuffer::new(&mut backend, 800, 600).unwrap();
        backend.clear_calls();

        presenter.draw_debug_buffers(&mut backend, &quad, gbuffer.targets());

        assert_eq!(backend.draw_count(), 4);
        assert_eq!(
            backend.last_parameter("DepthView", "DepthMap"),
            Some(&RecordedValue::Texture(gbuffer.targets().depth))
        );
    }
}
