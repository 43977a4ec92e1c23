//! Bloom post-processing
//!
//! Four full-screen passes over two half-resolution targets:
//! 1. extract pixels brighter than the threshold into target 0
//! 2. blur horizontally into target 1
//! 3. blur vertically back into target 0
//! 4. combine the blurred result with the base image into the destination

use glam::{Vec2, Vec4};

use crate::backend::{
    GraphicsBackend, RenderState, TextureDescriptor, TextureFormat, TextureHandle, Viewport,
};
use crate::error::{RenderError, RenderResult};
use crate::pipeline::effect::{self, Effect, Param};
use crate::pipeline::{CopyEffect, FullscreenQuad};

/// Taps of the separable gaussian
pub const SAMPLE_COUNT: usize = 15;

const BLOOM_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;

/// Tunables of the bloom chain
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BloomSettings {
    pub name: &'static str,
    /// Fraction of brightness below which pixels do not bloom
    pub threshold: f32,
    /// Gaussian standard deviation in texels
    pub blur_amount: f32,
    pub bloom_intensity: f32,
    pub base_intensity: f32,
    pub bloom_saturation: f32,
    pub base_saturation: f32,
}

impl BloomSettings {
    pub const fn new(
        name: &'static str,
        threshold: f32,
        blur_amount: f32,
        bloom_intensity: f32,
        base_intensity: f32,
        bloom_saturation: f32,
        base_saturation: f32,
    ) -> Self {
        Self {
            name,
            threshold,
            blur_amount,
            bloom_intensity,
            base_intensity,
            bloom_saturation,
            base_saturation,
        }
    }
}

impl Default for BloomSettings {
    fn default() -> Self {
        PRESETS[DEFAULT_PRESET]
    }
}

pub const PRESETS: [BloomSettings; 6] = [
    BloomSettings::new("Default", 0.25, 4.0, 1.25, 1.0, 1.0, 1.0),
    BloomSettings::new("Soft", 0.0, 3.0, 1.0, 1.0, 1.0, 1.0),
    BloomSettings::new("Desaturated", 0.5, 8.0, 2.0, 1.0, 0.0, 1.0),
    BloomSettings::new("Saturated", 0.25, 4.0, 2.0, 1.0, 2.0, 0.0),
    BloomSettings::new("Blurry", 0.0, 2.0, 1.0, 0.1, 1.0, 1.0),
    BloomSettings::new("Subtle", 0.5, 2.0, 1.0, 1.0, 1.0, 1.0),
];

pub const DEFAULT_PRESET: usize = 0;

/// Intermediate buffer shown instead of the full bloom result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BloomDebugView {
    #[default]
    Off,
    BrightPass,
    BlurHorizontal,
    BlurVertical,
}

/// The four passes in draw order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BloomStage {
    Extract,
    BlurHorizontal,
    BlurVertical,
    Combine,
}

impl BloomDebugView {
    /// Whether `stage` is replaced by a pass-through copy
    pub fn copies(&self, stage: BloomStage) -> bool {
        let last = match self {
            BloomDebugView::Off => return false,
            BloomDebugView::BrightPass => BloomStage::Extract,
            BloomDebugView::BlurHorizontal => BloomStage::BlurHorizontal,
            BloomDebugView::BlurVertical => BloomStage::BlurVertical,
        };
        stage > last
    }
}

/// `exp(-n^2 / 2 theta^2) / sqrt(2 pi theta)`
pub fn gaussian(n: f32, theta: f32) -> f32 {
    (1.0 / (2.0 * std::f32::consts::PI * theta).sqrt()) * (-(n * n) / (2.0 * theta * theta)).exp()
}

/// Normalized weights and texel offsets for one blur direction.
///
/// `texel` is one texel step along the blur axis. Paired taps sit between texels
/// at `2i + 1.5` so bilinear filtering fetches two texels per sample.
pub fn blur_kernel(texel: Vec2, blur_amount: f32) -> ([f32; SAMPLE_COUNT], [Vec2; SAMPLE_COUNT]) {
    let theta = blur_amount.max(f32::EPSILON);
    let mut weights = [0.0; SAMPLE_COUNT];
    let mut offsets = [Vec2::ZERO; SAMPLE_COUNT];

    weights[0] = gaussian(0.0, theta);
    let mut total = weights[0];

    for i in 0..SAMPLE_COUNT / 2 {
        let weight = gaussian((i + 1) as f32, theta);
        weights[i * 2 + 1] = weight;
        weights[i * 2 + 2] = weight;
        total += weight * 2.0;

        let delta = texel * (i as f32 * 2.0 + 1.5);
        offsets[i * 2 + 1] = delta;
        offsets[i * 2 + 2] = -delta;
    }

    for weight in &mut weights {
        *weight /= total;
    }

    (weights, offsets)
}

const BLOOM_EXTRACT_WGSL: &str = r#"
struct Params {
    half_pixel: vec4<f32>,
    threshold: vec4<f32>,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var scene_sampler: sampler;
@group(0) @binding(2) var scene_map: texture_2d<f32>;

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let color = textureSample(scene_map, scene_sampler, input.uv);
    let threshold = params.threshold.x;
    return saturate((color - vec4<f32>(threshold)) / (1.0 - threshold));
}
"#;

const GAUSSIAN_BLUR_WGSL: &str = r#"
struct Params {
    half_pixel: vec4<f32>,
    weights: array<vec4<f32>, 15>,
    offsets: array<vec4<f32>, 15>,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var source_sampler: sampler;
@group(0) @binding(2) var source_map: texture_2d<f32>;

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    var color = vec4<f32>(0.0);
    for (var i = 0; i < 15; i++) {
        color += textureSample(source_map, source_sampler, input.uv + params.offsets[i].xy) * params.weights[i].x;
    }
    return color;
}
"#;

const BLOOM_COMBINE_WGSL: &str = r#"
struct Params {
    half_pixel: vec4<f32>,
    bloom_intensity: vec4<f32>,
    base_intensity: vec4<f32>,
    bloom_saturation: vec4<f32>,
    base_saturation: vec4<f32>,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var combine_sampler: sampler;
@group(0) @binding(2) var bloom_map: texture_2d<f32>;
@group(0) @binding(3) var base_map: texture_2d<f32>;

fn adjust_saturation(color: vec4<f32>, saturation: f32) -> vec4<f32> {
    let grey = dot(color.rgb, vec3<f32>(0.3, 0.59, 0.11));
    return mix(vec4<f32>(grey), color, saturation);
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    var bloom = textureSample(bloom_map, combine_sampler, input.uv);
    var base = textureSample(base_map, combine_sampler, input.uv);
    bloom = adjust_saturation(bloom, params.bloom_saturation.x) * params.bloom_intensity.x;
    base = adjust_saturation(base, params.base_saturation.x) * params.base_intensity.x;
    // darken the base where bloom is bright to avoid burn-out
    base *= (1.0 - saturate(bloom));
    return vec4<f32>((base + bloom).rgb, max(base.a, bloom.a));
}
"#;

struct ExtractEffect {
    effect: Effect,
    half_pixel: Param,
    threshold: Param,
    scene_map: Param,
}

struct BlurEffect {
    effect: Effect,
    half_pixel: Param,
    weights: Param,
    offsets: Param,
    source_map: Param,
}

struct CombineEffect {
    effect: Effect,
    half_pixel: Param,
    bloom_intensity: Param,
    base_intensity: Param,
    bloom_saturation: Param,
    base_saturation: Param,
    bloom_map: Param,
    base_map: Param,
}

impl ExtractEffect {
    fn new(backend: &mut dyn GraphicsBackend) -> RenderResult<Self> {
        let desc = effect::screen_effect(
            "BloomExtract",
            BLOOM_EXTRACT_WGSL,
            vec![
                effect::vec2("HalfPixel"),
                effect::float("BloomThreshold"),
                effect::texture("SceneMap"),
            ],
        );
        let effect = Effect::create(backend, &desc)?;
        Ok(Self {
            half_pixel: effect.parameter(backend, "HalfPixel")?,
            threshold: effect.parameter(backend, "BloomThreshold")?,
            scene_map: effect.parameter(backend, "SceneMap")?,
            effect,
        })
    }
}

impl BlurEffect {
    fn new(backend: &mut dyn GraphicsBackend) -> RenderResult<Self> {
        let desc = effect::screen_effect(
            "GaussianBlur",
            GAUSSIAN_BLUR_WGSL,
            vec![
                effect::vec2("HalfPixel"),
                effect::float_array("SampleWeights", SAMPLE_COUNT as u32),
                effect::vec2_array("SampleOffsets", SAMPLE_COUNT as u32),
                effect::texture("SourceMap"),
            ],
        );
        let effect = Effect::create(backend, &desc)?;
        Ok(Self {
            half_pixel: effect.parameter(backend, "HalfPixel")?,
            weights: effect.parameter(backend, "SampleWeights")?,
            offsets: effect.parameter(backend, "SampleOffsets")?,
            source_map: effect.parameter(backend, "SourceMap")?,
            effect,
        })
    }
}

impl CombineEffect {
    fn new(backend: &mut dyn GraphicsBackend) -> RenderResult<Self> {
        let desc = effect::screen_effect(
            "BloomCombine",
            BLOOM_COMBINE_WGSL,
            vec![
                effect::vec2("HalfPixel"),
                effect::float("BloomIntensity"),
                effect::float("BaseIntensity"),
                effect::float("BloomSaturation"),
                effect::float("BaseSaturation"),
                effect::texture("BloomMap"),
                effect::texture("BaseMap"),
            ],
        );
        let effect = Effect::create(backend, &desc)?;
        Ok(Self {
            half_pixel: effect.parameter(backend, "HalfPixel")?,
            bloom_intensity: effect.parameter(backend, "BloomIntensity")?,
            base_intensity: effect.parameter(backend, "BaseIntensity")?,
            bloom_saturation: effect.parameter(backend, "BloomSaturation")?,
            base_saturation: effect.parameter(backend, "BaseSaturation")?,
            bloom_map: effect.parameter(backend, "BloomMap")?,
            base_map: effect.parameter(backend, "BaseMap")?,
            effect,
        })
    }
}

/// Bloom chain with its half-resolution ping-pong targets
pub struct BloomProcessor {
    extract: ExtractEffect,
    blur: BlurEffect,
    combine: CombineEffect,
    targets: [TextureHandle; 2],
    width: u32,
    height: u32,
    preset: usize,
    settings: BloomSettings,
    pub debug_view: BloomDebugView,
}

impl BloomProcessor {
    /// `width` and `height` are the full render resolution
    pub fn new(backend: &mut dyn GraphicsBackend, width: u32, height: u32) -> RenderResult<Self> {
        let (half_width, half_height) = half_size(width, height);
        Ok(Self {
            extract: ExtractEffect::new(backend)?,
            blur: BlurEffect::new(backend)?,
            combine: CombineEffect::new(backend)?,
            targets: create_targets(backend, half_width, half_height)?,
            width: half_width,
            height: half_height,
            preset: DEFAULT_PRESET,
            settings: PRESETS[DEFAULT_PRESET],
            debug_view: BloomDebugView::Off,
        })
    }

    /// Recreate the ping-pong targets for a new render resolution
    pub fn resize(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        width: u32,
        height: u32,
    ) -> RenderResult<()> {
        let (half_width, half_height) = half_size(width, height);
        let targets = create_targets(backend, half_width, half_height)?;
        for texture in self.targets {
            backend.destroy_texture(texture);
        }
        self.targets = targets;
        self.width = half_width;
        self.height = half_height;
        Ok(())
    }

    /// Size of the ping-pong targets
    pub fn target_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn targets(&self) -> [TextureHandle; 2] {
        self.targets
    }

    pub fn preset(&self) -> usize {
        self.preset
    }

    pub fn settings(&self) -> &BloomSettings {
        &self.settings
    }

    /// Custom settings, leaving the preset index untouched
    pub fn set_settings(&mut self, settings: BloomSettings) {
        self.settings = settings;
    }

    /// Select a preset from [`PRESETS`]; out-of-range indices leave the selection unchanged
    pub fn select_preset(&mut self, index: usize) -> RenderResult<()> {
        let settings = PRESETS.get(index).ok_or(RenderError::InvalidPreset {
            index,
            count: PRESETS.len(),
        })?;
        self.preset = index;
        self.settings = *settings;
        log::info!("Bloom preset: {}", settings.name);
        Ok(())
    }

    /// Run the chain from `source` into `destination`, which is `viewport` sized
    pub fn process(
        &self,
        backend: &mut dyn GraphicsBackend,
        quad: &FullscreenQuad,
        copy: &CopyEffect,
        source: TextureHandle,
        destination: TextureHandle,
        viewport: Viewport,
    ) {
        let half_viewport = Viewport::full(self.width, self.height);
        let half_pixel = crate::pipeline::gbuffer::half_pixel(self.width, self.height);
        let texel = Vec2::new(1.0 / self.width as f32, 1.0 / self.height as f32);
        let settings = &self.settings;
        let debug = self.debug_view;

        backend.apply_render_state(RenderState::SCREEN_FILTERED);

        // Extract
        begin_pass(backend, self.targets[0], half_viewport);
        if debug.copies(BloomStage::Extract) {
            copy.draw(backend, quad, source);
        } else {
            let e = &self.extract;
            e.effect.bind(backend);
            e.half_pixel.set_vec2(backend, half_pixel);
            e.threshold.set_float(backend, settings.threshold);
            e.scene_map.set_texture(backend, source);
            quad.draw(backend);
        }

        // Blur, horizontal then vertical
        let passes = [
            (BloomStage::BlurHorizontal, self.targets[0], self.targets[1], Vec2::new(texel.x, 0.0)),
            (BloomStage::BlurVertical, self.targets[1], self.targets[0], Vec2::new(0.0, texel.y)),
        ];
        for (stage, from, to, step) in passes {
            begin_pass(backend, to, half_viewport);
            if debug.copies(stage) {
                copy.draw(backend, quad, from);
            } else {
                let (weights, offsets) = blur_kernel(step, settings.blur_amount);
                let b = &self.blur;
                b.effect.bind(backend);
                b.half_pixel.set_vec2(backend, half_pixel);
                b.weights.set_floats(backend, &weights);
                b.offsets.set_vec2s(backend, &offsets);
                b.source_map.set_texture(backend, from);
                quad.draw(backend);
            }
        }

        // Combine
        begin_pass(backend, destination, viewport);
        if debug.copies(BloomStage::Combine) {
            copy.draw(backend, quad, self.targets[0]);
        } else {
            let c = &self.combine;
            c.effect.bind(backend);
            c.half_pixel
                .set_vec2(backend, Vec2::new(0.5 / viewport.width, 0.5 / viewport.height));
            c.bloom_intensity.set_float(backend, settings.bloom_intensity);
            c.base_intensity.set_float(backend, settings.base_intensity);
            c.bloom_saturation.set_float(backend, settings.bloom_saturation);
            c.base_saturation.set_float(backend, settings.base_saturation);
            c.bloom_map.set_texture(backend, self.targets[0]);
            c.base_map.set_texture(backend, source);
            quad.draw(backend);
        }
    }

    pub fn destroy(&self, backend: &mut dyn GraphicsBackend) {
        for texture in self.targets {
            backend.destroy_texture(texture);
        }
    }
}

fn begin_pass(backend: &mut dyn GraphicsBackend, target: TextureHandle, viewport: Viewport) {
    backend.set_render_targets(&[target], None);
    backend.set_viewport(viewport);
    backend.clear(Some(Vec4::ZERO.to_array()), None);
}

fn half_size(width: u32, height: u32) -> (u32, u32) {
    ((width / 2).max(1), (height / 2).max(1))
}

fn create_targets(
    backend: &mut dyn GraphicsBackend,
    width: u32,
    height: u32,
) -> RenderResult<[TextureHandle; 2]> {
    let mut target = |label: &str| {
        backend.create_texture(&TextureDescriptor::render_target(label, width, height, BLOOM_FORMAT))
    };
    Ok([target("bloom.ping")?, target("bloom.pong")?])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{RecordedCall, RecordingBackend};
    use rstest::rstest;

    #[rstest]
    #[case(0.5)]
    #[case(1.0)]
    #[case(2.0)]
    #[case(4.0)]
    #[case(8.0)]
    fn test_weights_sum_to_one(#[case] sigma: f32) {
        let (weights, _) = blur_kernel(Vec2::new(1.0 / 320.0, 0.0), sigma);
        let sum: f32 = weights.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5, "sum was {}", sum);
    }

    #[test]
    fn test_offsets_use_bilinear_pairs() {
        let texel = Vec2::new(0.01, 0.0);
        let (weights, offsets) = blur_kernel(texel, 4.0);

        assert_eq!(offsets[0], Vec2::ZERO);
        assert!((offsets[1].x - 0.015).abs() < 1e-6);
        assert_eq!(offsets[2], -offsets[1]);
        assert!((offsets[3].x - 0.035).abs() < 1e-6);
        assert!((offsets[13].x - 0.135).abs() < 1e-6);
        assert_eq!(weights[1], weights[2]);
        assert!(weights[0] > weights[1]);
    }

    #[test]
    fn test_preset_table() {
        assert_eq!(PRESETS.len(), 6);
        assert_eq!(PRESETS[0].name, "Default");
        assert_eq!(PRESETS[2].bloom_saturation, 0.0);
        assert_eq!(PRESETS[3].base_saturation, 0.0);
        assert_eq!(PRESETS[4].base_intensity, 0.1);
        assert_eq!(BloomSettings::default(), PRESETS[0]);
    }

    #[rstest]
    #[case::off(BloomDebugView::Off, [false, false, false, false])]
    #[case::bright_pass(BloomDebugView::BrightPass, [false, true, true, true])]
    #[case::blur_h(BloomDebugView::BlurHorizontal, [false, false, true, true])]
    #[case::blur_v(BloomDebugView::BlurVertical, [false, false, false, true])]
    fn test_debug_view_short_circuits_later_stages(
        #[case] view: BloomDebugView,
        #[case] expected: [bool; 4],
    ) {
        let stages = [
            BloomStage::Extract,
            BloomStage::BlurHorizontal,
            BloomStage::BlurVertical,
            BloomStage::Combine,
        ];
        assert_eq!(stages.map(|s| view.copies(s)), expected);
    }

    fn setup() -> (RecordingBackend, BloomProcessor, FullscreenQuad, CopyEffect) {
        let mut backend = RecordingBackend::new(640, 480);
        let bloom = BloomProcessor::new(&mut backend, 640, 480).unwrap();
        let quad = FullscreenQuad::new(&mut backend).unwrap();
        let copy = CopyEffect::new(&mut backend).unwrap();
        (backend, bloom, quad, copy)
    }

    #[test]
    fn test_targets_are_half_resolution() {
        let (backend, bloom, _, _) = setup();
        assert_eq!(bloom.target_size(), (320, 240));
        for target in bloom.targets() {
            assert_eq!(backend.texture_size(target), Some((320, 240)));
        }
    }

    #[test]
    fn test_invalid_preset_keeps_selection() {
        let (_, mut bloom, _, _) = setup();
        bloom.select_preset(3).unwrap();
        let err = bloom.select_preset(6).unwrap_err();

        assert!(matches!(err, RenderError::InvalidPreset { index: 6, count: 6 }));
        assert_eq!(bloom.preset(), 3);
        assert_eq!(bloom.settings().name, "Saturated");
    }

    #[rstest]
    #[case::off(BloomDebugView::Off, vec!["BloomExtract", "GaussianBlur", "GaussianBlur", "BloomCombine"])]
    #[case::bright_pass(BloomDebugView::BrightPass, vec!["BloomExtract", "Copy", "Copy", "Copy"])]
    #[case::blur_v(BloomDebugView::BlurVertical, vec!["BloomExtract", "GaussianBlur", "GaussianBlur", "Copy"])]
    fn test_process_always_draws_four_passes(
        #[case] view: BloomDebugView,
        #[case] effects: Vec<&'static str>,
    ) {
        let (mut backend, mut bloom, quad, copy) = setup();
        let source = backend
            .create_texture(&TextureDescriptor::render_target("src", 640, 480, BLOOM_FORMAT))
            .unwrap();
        let destination = backend
            .create_texture(&TextureDescriptor::render_target("dst", 640, 480, BLOOM_FORMAT))
            .unwrap();
        bloom.debug_view = view;
        backend.clear_calls();
        backend.push_debug_group("bloom");

        bloom.process(&mut backend, &quad, &copy, source, destination, Viewport::full(640, 480));
        backend.pop_debug_group();

        assert_eq!(backend.draws_within("bloom"), 4);
        assert_eq!(backend.effects_within("bloom"), effects);
        assert!(backend.calls().contains(&RecordedCall::SetRenderTargets {
            colors: vec![destination],
            depth: None
        }));
    }
}
