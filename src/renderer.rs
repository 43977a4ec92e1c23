//! Frame orchestration

use glam::{Vec2, Vec3, Vec4};

use crate::backend::{GraphicsBackend, TextureDescriptor, TextureFormat, TextureHandle, Viewport};
use crate::bounded::BoundedQueue;
use crate::error::{RenderError, RenderResult};
use crate::pipeline::{
    compose_plan, BackgroundMode, BloomDebugView, BloomProcessor, BloomSettings, ClearEffect,
    CombineEffect, ComposeStep, ComposeTarget, FullscreenQuad, FxaaProcessor, FxaaSettings,
    GBuffer, GeometryRenderer, LightQueues, LightRenderer, Presenter, MAX_BILLBOARDS,
};
use crate::scene::{fold_ambient, Billboard, Light, LightOwner, Scene, TextureKey};
use crate::{RenderResolution, RendererConfig};

const TARGET_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;

/// Where the renderer is within the current frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FramePhase {
    /// Presented, or nothing submitted yet
    #[default]
    Idle,
    /// Queues reset and accepting submissions
    Submitting,
    /// Drawn and waiting to be presented
    Drawn,
}

/// Counters for the last drawn frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    pub batch_draws: usize,
    pub billboard_draws: usize,
    pub directional_lights: usize,
    pub point_lights: usize,
    pub spot_lights: usize,
    pub dropped_lights: usize,
    pub dropped_billboards: usize,
}

/// Off-screen targets of the composition chain
struct ComposeTargets {
    a: TextureHandle,
    b: TextureHandle,
    final_image: TextureHandle,
}

impl ComposeTargets {
    fn create(backend: &mut dyn GraphicsBackend, width: u32, height: u32) -> RenderResult<Self> {
        let mut target = |label: &str| {
            backend.create_texture(&TextureDescriptor::render_target(label, width, height, TARGET_FORMAT))
        };
        Ok(Self {
            a: target("compose.a")?,
            b: target("compose.b")?,
            final_image: target("compose.final")?,
        })
    }

    fn get(&self, target: ComposeTarget) -> TextureHandle {
        match target {
            ComposeTarget::IntermediateA => self.a,
            ComposeTarget::IntermediateB => self.b,
            ComposeTarget::Final => self.final_image,
        }
    }

    fn destroy(&self, backend: &mut dyn GraphicsBackend) {
        for texture in [self.a, self.b, self.final_image] {
            backend.destroy_texture(texture);
        }
    }
}

/// Deferred renderer
///
/// Per frame: [`begin_frame`](Self::begin_frame), submissions, [`draw`](Self::draw),
/// then [`present`](Self::present).
pub struct Renderer {
    config: RendererConfig,
    quad: FullscreenQuad,
    gbuffer: GBuffer,
    clear: ClearEffect,
    combine: CombineEffect,
    geometry: GeometryRenderer,
    lighting: LightRenderer,
    fxaa: FxaaProcessor,
    bloom: BloomProcessor,
    presenter: Presenter,
    targets: ComposeTargets,
    lights: LightQueues,
    billboards: BoundedQueue<Billboard>,
    phase: FramePhase,
    surface_size: (u32, u32),
    letterbox: Viewport,
    invalidated: bool,
    stats: FrameStats,
}

impl Renderer {
    /// Create every target and effect; fails if any effect parameter cannot be resolved
    pub fn new(backend: &mut dyn GraphicsBackend, config: RendererConfig) -> RenderResult<Self> {
        let surface_size = backend.surface_size();
        let (width, height) = render_size(config.render_resolution, surface_size);
        log::info!(
            "Creating deferred renderer: surface {}x{}, render {}x{}",
            surface_size.0,
            surface_size.1,
            width,
            height
        );

        let mut bloom = BloomProcessor::new(backend, width, height)?;
        bloom.select_preset(config.bloom_preset)?;

        Ok(Self {
            quad: FullscreenQuad::new(backend)?,
            gbuffer: GBuffer::new(backend, width, height)?,
            clear: ClearEffect::new(backend)?,
            combine: CombineEffect::new(backend)?,
            geometry: GeometryRenderer::new(backend)?,
            lighting: LightRenderer::new(backend)?,
            fxaa: FxaaProcessor::new(backend)?,
            bloom,
            presenter: Presenter::new(backend)?,
            targets: ComposeTargets::create(backend, width, height)?,
            lights: LightQueues::new(),
            billboards: BoundedQueue::with_capacity(MAX_BILLBOARDS),
            phase: FramePhase::Idle,
            surface_size,
            letterbox: Viewport::letterbox(surface_size.0, surface_size.1, aspect(width, height)),
            invalidated: false,
            stats: FrameStats::default(),
            config,
        })
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Counters of the last [`draw`](Self::draw)
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn gbuffer(&self) -> &GBuffer {
        &self.gbuffer
    }

    /// Rectangle of the back buffer the final image is blitted into
    pub fn letterbox(&self) -> Viewport {
        self.letterbox
    }

    /// Size of the G-buffer and post-processing targets
    pub fn render_size(&self) -> (u32, u32) {
        self.gbuffer.size()
    }

    pub fn set_fxaa_enabled(&mut self, enabled: bool) {
        self.config.fxaa_enabled = enabled;
    }

    pub fn set_bloom_enabled(&mut self, enabled: bool) {
        self.config.bloom_enabled = enabled;
    }

    pub fn set_show_debug_buffers(&mut self, show: bool) {
        self.config.show_debug_buffers = show;
    }

    pub fn set_emissive_pass(&mut self, enabled: bool) {
        self.config.emissive_pass = enabled;
    }

    /// Base ambient term added to the ambient lights submitted each frame
    pub fn set_ambient(&mut self, color: Vec4, intensity: f32) {
        self.config.ambient_color = color;
        self.config.ambient_intensity = intensity;
    }

    pub fn set_background(&mut self, background: Option<BackgroundMode>) {
        self.config.background = background;
    }

    /// Takes effect at the next draw
    pub fn set_render_resolution(&mut self, resolution: RenderResolution) {
        self.config.render_resolution = resolution;
    }

    pub fn select_bloom_preset(&mut self, index: usize) -> RenderResult<()> {
        self.bloom.select_preset(index)?;
        self.config.bloom_preset = index;
        Ok(())
    }

    pub fn bloom_settings(&self) -> &BloomSettings {
        self.bloom.settings()
    }

    pub fn set_bloom_settings(&mut self, settings: BloomSettings) {
        self.bloom.set_settings(settings);
    }

    pub fn bloom_debug_view(&self) -> BloomDebugView {
        self.bloom.debug_view
    }

    pub fn set_bloom_debug_view(&mut self, view: BloomDebugView) {
        self.bloom.debug_view = view;
    }

    pub fn fxaa_settings_mut(&mut self) -> &mut FxaaSettings {
        &mut self.fxaa.settings
    }

    /// Lights queued for the current frame
    pub fn lights(&self) -> &LightQueues {
        &self.lights
    }

    /// Start a frame: reset the light and billboard queues
    pub fn begin_frame(&mut self) {
        if self.phase == FramePhase::Drawn {
            log::warn!("Previous frame was drawn but never presented");
        }

        let dropped = self.billboards.dropped();
        if dropped > 0 {
            log::trace!("Dropped {} billboards over capacity", dropped);
        }
        self.lights.clear();
        self.billboards.clear();
        self.phase = FramePhase::Submitting;
    }

    /// Queue a light for this frame. Returns `false` if it was dropped.
    pub fn submit_light(&mut self, light: Light, owner: LightOwner) -> bool {
        self.lights.submit(light, owner)
    }

    /// Queue a billboard for this frame. Returns `false` if it was dropped.
    pub fn submit_billboard(&mut self, texture: TextureKey, position: Vec3, size: Vec2) -> bool {
        self.billboards.push(Billboard {
            texture,
            position,
            size,
        })
    }

    /// Resize the back buffer and every owned target
    pub fn resize(&mut self, backend: &mut dyn GraphicsBackend, width: u32, height: u32) -> RenderResult<()> {
        backend.resize(width, height);
        self.invalidated = true;
        self.ensure_targets(backend)
    }

    /// Recreate every owned target at the next draw, after a device reset
    pub fn invalidate(&mut self) {
        self.invalidated = true;
    }

    /// Draw the scene and the queued lights into the final image
    pub fn draw(&mut self, backend: &mut dyn GraphicsBackend, scene: &Scene) -> RenderResult<FrameStats> {
        if self.phase == FramePhase::Drawn {
            return Err(RenderError::InvalidPhase {
                operation: "draw",
                phase: self.phase,
            });
        }

        self.ensure_targets(backend)?;
        backend.begin_frame()?;

        let mut stats = FrameStats {
            directional_lights: self.lights.directional.len(),
            point_lights: self.lights.point.len(),
            spot_lights: self.lights.spot.len(),
            dropped_lights: self.lights.dropped(),
            dropped_billboards: self.billboards.dropped(),
            ..FrameStats::default()
        };

        // BeginDraw
        backend.push_debug_group("gbuffer.bind");
        self.gbuffer.bind(backend);
        backend.pop_debug_group();

        backend.push_debug_group("gbuffer.clear");
        self.gbuffer.clear(backend, &self.clear, &self.quad, Vec4::ZERO);
        backend.pop_debug_group();

        self.gbuffer.ambient = fold_ambient(
            self.lights.ambient(),
            self.config.ambient_color,
            self.config.ambient_intensity,
        );

        // DrawScene
        backend.push_debug_group("scene");
        stats.batch_draws = self
            .geometry
            .draw_batches(backend, &scene.batches, &scene.textures, &scene.camera);
        stats.billboard_draws = self.geometry.draw_billboards(
            backend,
            &self.quad,
            &self.billboards,
            &scene.textures,
            &scene.camera,
        );
        backend.pop_debug_group();

        // DrawLights
        backend.push_debug_group("lights");
        self.gbuffer.bind_light_target(backend);
        self.lighting.draw(
            backend,
            &self.quad,
            &self.gbuffer,
            &scene.camera,
            &self.lights,
            self.config.emissive_pass,
        );
        backend.pop_debug_group();

        // ComposeFinal
        let plan = compose_plan(self.config.fxaa_enabled, self.config.bloom_enabled);
        backend.push_debug_group(plan.label);
        for step in plan.steps {
            self.compose_step(backend, *step);
        }
        backend.pop_debug_group();

        // ResolveGBuffer
        backend.push_debug_group("gbuffer.unbind");
        self.gbuffer.unbind(backend);
        backend.pop_debug_group();

        log::trace!("Frame drawn: {:?}", stats);
        self.stats = stats;
        self.phase = FramePhase::Drawn;
        Ok(stats)
    }

    /// Background, letterboxed final image and debug thumbnails, then present
    pub fn present(&mut self, backend: &mut dyn GraphicsBackend) -> RenderResult<()> {
        if self.phase != FramePhase::Drawn {
            return Err(RenderError::InvalidPhase {
                operation: "present",
                phase: self.phase,
            });
        }

        backend.push_debug_group("present");
        backend.set_back_buffer();
        let (width, height) = backend.surface_size();
        backend.set_viewport(Viewport::full(width, height));
        backend.clear(Some([0.0, 0.0, 0.0, 1.0]), None);

        if let Some(background) = &self.config.background {
            self.presenter
                .draw_background(backend, &self.quad, background, self.letterbox);
        }
        self.presenter
            .blit(backend, &self.quad, self.targets.final_image, self.letterbox);

        if self.config.show_debug_buffers {
            self.presenter
                .draw_debug_buffers(backend, &self.quad, self.gbuffer.targets());
        }
        backend.pop_debug_group();

        self.phase = FramePhase::Idle;
        backend.end_frame()?;
        Ok(())
    }

    fn compose_step(&self, backend: &mut dyn GraphicsBackend, step: ComposeStep) {
        let viewport = self.gbuffer.viewport();
        match step {
            ComposeStep::Combine { to } => {
                backend.set_render_targets(&[self.targets.get(to)], None);
                backend.set_viewport(viewport);
                backend.clear(Some([0.0; 4]), None);
                self.gbuffer.compose_final(backend, &self.combine, &self.quad);
            }
            ComposeStep::Fxaa { from, to } => {
                self.fxaa.apply(
                    backend,
                    &self.quad,
                    self.targets.get(from),
                    self.targets.get(to),
                    viewport,
                );
            }
            ComposeStep::Bloom { from, to } => {
                self.bloom.process(
                    backend,
                    &self.quad,
                    self.presenter.copy(),
                    self.targets.get(from),
                    self.targets.get(to),
                    viewport,
                );
            }
        }
    }

    /// Recreate targets if the surface or render resolution changed, or after an invalidate
    fn ensure_targets(&mut self, backend: &mut dyn GraphicsBackend) -> RenderResult<()> {
        let surface_size = backend.surface_size();
        let (width, height) = render_size(self.config.render_resolution, surface_size);

        let resized = self.gbuffer.size() != (width, height);
        if !resized && !self.invalidated && surface_size == self.surface_size {
            return Ok(());
        }

        if resized || self.invalidated {
            log::info!("Recreating render targets at {}x{}", width, height);
            self.gbuffer.recreate(backend, width, height)?;
            self.bloom.resize(backend, width, height)?;
            let targets = ComposeTargets::create(backend, width, height)?;
            self.targets.destroy(backend);
            self.targets = targets;
        }

        self.surface_size = surface_size;
        self.letterbox = Viewport::letterbox(surface_size.0, surface_size.1, aspect(width, height));
        self.invalidated = false;
        Ok(())
    }

    /// Release every target owned by the renderer
    pub fn destroy(&self, backend: &mut dyn GraphicsBackend) {
        self.gbuffer.destroy(backend);
        self.bloom.destroy(backend);
        self.targets.destroy(backend);
    }
}

fn render_size(resolution: RenderResolution, surface: (u32, u32)) -> (u32, u32) {
    let (width, height) = match resolution {
        RenderResolution::Native => surface,
        RenderResolution::Fixed(width, height) => (width, height),
    };
    (width.max(1), height.max(1))
}

fn aspect(width: u32, height: u32) -> f32 {
    width as f32 / height.max(1) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;

    fn renderer(backend: &mut RecordingBackend) -> Renderer {
        Renderer::new(backend, RendererConfig::default()).unwrap()
    }

    #[test]
    fn test_render_size_follows_resolution() {
        assert_eq!(render_size(RenderResolution::Native, (800, 600)), (800, 600));
        assert_eq!(render_size(RenderResolution::Fixed(320, 0), (800, 600)), (320, 1));
    }

    #[test]
    fn test_fixed_resolution_is_letterboxed() {
        let mut backend = RecordingBackend::new(800, 400);
        let config = RendererConfig::default().with_render_resolution(RenderResolution::Fixed(400, 400));
        let renderer = Renderer::new(&mut backend, config).unwrap();

        assert_eq!(renderer.render_size(), (400, 400));
        assert_eq!(renderer.letterbox(), Viewport::new(200.0, 0.0, 400.0, 400.0));
    }

    #[test]
    fn test_begin_frame_resets_queues() {
        let mut backend = RecordingBackend::new(64, 64);
        let mut renderer = renderer(&mut backend);
        renderer.begin_frame();
        renderer.submit_light(Light::point(Vec3::ZERO, Vec4::ONE, 1.0, 2.0), LightOwner(1));
        renderer.submit_billboard(TextureKey(0), Vec3::ZERO, Vec2::ONE);
        assert_eq!(renderer.lights().len(), 1);

        renderer.begin_frame();
        assert!(renderer.lights().is_empty());
        assert_eq!(renderer.phase(), FramePhase::Submitting);
    }

    #[test]
    fn test_invalid_preset_in_config_fails_creation() {
        let mut backend = RecordingBackend::new(64, 64);
        let config = RendererConfig::default().with_bloom_preset(9);
        assert!(matches!(
            Renderer::new(&mut backend, config),
            Err(RenderError::InvalidPreset { index: 9, .. })
        ));
    }

    #[test]
    fn test_invalidate_recreates_targets_at_same_size() {
        let mut backend = RecordingBackend::new(64, 64);
        let mut renderer = renderer(&mut backend);
        let before = *renderer.gbuffer().targets();
        renderer.invalidate();

        renderer.draw(&mut backend, &Scene::default()).unwrap();

        assert_ne!(renderer.gbuffer().targets().color, before.color);
        assert_eq!(renderer.render_size(), (64, 64));
    }
}
