//! Single-pass FXAA

use crate::backend::{GraphicsBackend, RenderState, TextureHandle, Viewport};
use crate::error::RenderResult;
use crate::pipeline::effect::{self, Effect, Param};
use crate::pipeline::FullscreenQuad;

const FXAA_WGSL: &str = r#"
struct Params {
    half_pixel: vec4<f32>,
    subpixel: vec4<f32>,
    edge_threshold: vec4<f32>,
    edge_threshold_min: vec4<f32>,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var scene_sampler: sampler;
@group(0) @binding(2) var scene_map: texture_2d<f32>;

fn luma(color: vec3<f32>) -> f32 {
    return dot(color, vec3<f32>(0.299, 0.587, 0.114));
}

fn fetch(uv: vec2<f32>) -> vec4<f32> {
    return textureSampleLevel(scene_map, scene_sampler, uv, 0.0);
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let texel = params.half_pixel.xy * 2.0;
    let center = fetch(input.uv);

    let l_m = luma(center.rgb);
    let l_n = luma(fetch(input.uv + vec2<f32>(0.0, -texel.y)).rgb);
    let l_s = luma(fetch(input.uv + vec2<f32>(0.0, texel.y)).rgb);
    let l_e = luma(fetch(input.uv + vec2<f32>(texel.x, 0.0)).rgb);
    let l_w = luma(fetch(input.uv + vec2<f32>(-texel.x, 0.0)).rgb);

    let range_min = min(l_m, min(min(l_n, l_s), min(l_e, l_w)));
    let range_max = max(l_m, max(max(l_n, l_s), max(l_e, l_w)));
    let range = range_max - range_min;
    if (range < max(params.edge_threshold_min.x, range_max * params.edge_threshold.x)) {
        return center;
    }

    let l_nw = luma(fetch(input.uv + vec2<f32>(-texel.x, -texel.y)).rgb);
    let l_ne = luma(fetch(input.uv + vec2<f32>(texel.x, -texel.y)).rgb);
    let l_sw = luma(fetch(input.uv + vec2<f32>(-texel.x, texel.y)).rgb);
    let l_se = luma(fetch(input.uv + vec2<f32>(texel.x, texel.y)).rgb);

    let average = (2.0 * (l_n + l_s + l_e + l_w) + l_nw + l_ne + l_sw + l_se) / 12.0;
    let subpixel = smoothstep(0.0, 1.0, saturate(abs(average - l_m) / range));
    let blend = subpixel * subpixel * params.subpixel.x;

    let horizontal = abs(l_n + l_s - 2.0 * l_m) * 2.0 + abs(l_ne + l_se - 2.0 * l_e) + abs(l_nw + l_sw - 2.0 * l_w);
    let vertical = abs(l_e + l_w - 2.0 * l_m) * 2.0 + abs(l_ne + l_nw - 2.0 * l_n) + abs(l_se + l_sw - 2.0 * l_s);
    let is_horizontal = horizontal >= vertical;

    var step = select(texel.x, texel.y, is_horizontal);
    let positive = select(l_e, l_s, is_horizontal);
    let negative = select(l_w, l_n, is_horizontal);
    if (abs(negative - l_m) > abs(positive - l_m)) {
        step = -step;
    }

    let offset = select(vec2<f32>(step, 0.0), vec2<f32>(0.0, step), is_horizontal) * blend;
    let color = fetch(input.uv + offset);
    return vec4<f32>(color.rgb, center.a);
}
"#;

/// Tunables of the FXAA pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FxaaSettings {
    /// Amount of sub-pixel aliasing removal, 0 to 1
    pub subpixel: f32,
    /// Minimum local contrast relative to the brightest neighbour to count as an edge
    pub edge_threshold: f32,
    /// Absolute contrast floor below which dark areas are left alone
    pub edge_threshold_min: f32,
}

impl Default for FxaaSettings {
    fn default() -> Self {
        Self {
            subpixel: 0.75,
            edge_threshold: 0.166,
            edge_threshold_min: 0.0833,
        }
    }
}

pub struct FxaaProcessor {
    effect: Effect,
    half_pixel: Param,
    subpixel: Param,
    edge_threshold: Param,
    edge_threshold_min: Param,
    scene_map: Param,
    pub settings: FxaaSettings,
}

impl FxaaProcessor {
    pub fn new(backend: &mut dyn GraphicsBackend) -> RenderResult<Self> {
        let desc = effect::screen_effect(
            "Fxaa",
            FXAA_WGSL,
            vec![
                effect::vec2("HalfPixel"),
                effect::float("Subpixel"),
                effect::float("EdgeThreshold"),
                effect::float("EdgeThresholdMin"),
                effect::texture("SceneMap"),
            ],
        );
        let effect = Effect::create(backend, &desc)?;
        Ok(Self {
            half_pixel: effect.parameter(backend, "HalfPixel")?,
            subpixel: effect.parameter(backend, "Subpixel")?,
            edge_threshold: effect.parameter(backend, "EdgeThreshold")?,
            edge_threshold_min: effect.parameter(backend, "EdgeThresholdMin")?,
            scene_map: effect.parameter(backend, "SceneMap")?,
            effect,
            settings: FxaaSettings::default(),
        })
    }

    /// Antialias `source` into `destination`, both `viewport` sized
    pub fn apply(
        &self,
        backend: &mut dyn GraphicsBackend,
        quad: &FullscreenQuad,
        source: TextureHandle,
        destination: TextureHandle,
        viewport: Viewport,
    ) {
        backend.set_render_targets(&[destination], None);
        backend.set_viewport(viewport);
        backend.clear(Some([0.0; 4]), None);
        backend.apply_render_state(RenderState::SCREEN_FILTERED);

        self.effect.bind(backend);
        self.half_pixel.set_vec2(
            backend,
            glam::Vec2::new(0.5 / viewport.width.max(1.0), 0.5 / viewport.height.max(1.0)),
        );
        self.subpixel.set_float(backend, self.settings.subpixel);
        self.edge_threshold.set_float(backend, self.settings.edge_threshold);
        self.edge_threshold_min
            .set_float(backend, self.settings.edge_threshold_min);
        self.scene_map.set_texture(backend, source);
        quad.draw(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        RecordedCall, RecordedValue, RecordingBackend, TextureDescriptor, TextureFormat,
    };

    #[test]
    fn test_apply_is_one_draw_into_destination() {
        let mut backend = RecordingBackend::new(200, 100);
        let fxaa = FxaaProcessor::new(&mut backend).unwrap();
        let quad = FullscreenQuad::new(&mut backend).unwrap();
        let desc = TextureDescriptor::render_target("t", 200, 100, TextureFormat::Rgba8Unorm);
        let source = backend.create_texture(&desc).unwrap();
        let destination = backend.create_texture(&desc).unwrap();
        backend.clear_calls();

        fxaa.apply(&mut backend, &quad, source, destination, Viewport::full(200, 100));

        assert_eq!(backend.draw_count(), 1);
        assert_eq!(
            backend.calls()[0],
            RecordedCall::SetRenderTargets {
                colors: vec![destination],
                depth: None
            }
        );
        assert_eq!(
            backend.last_parameter("Fxaa", "SceneMap"),
            Some(&RecordedValue::Texture(source))
        );
        assert_eq!(
            backend.last_parameter("Fxaa", "HalfPixel"),
            Some(&RecordedValue::Vec2(glam::Vec2::new(0.0025, 0.005)))
        );
    }

    #[test]
    fn test_missing_parameter_fails_creation() {
        let mut backend = RecordingBackend::new(8, 8).without_parameter("Fxaa", "EdgeThreshold");
        assert!(FxaaProcessor::new(&mut backend).is_err());
    }
}
