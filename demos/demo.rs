//! # Deferred Demo
//!
//! A checkerboard ground, a ring of cubes and spheres, orbiting point lights with
//! glow billboards, a spot light and a sun.
//!
//! Keys:
//! - `F` toggle FXAA, `B` toggle bloom
//! - `1`-`6` select a bloom preset, `V` cycle the bloom debug view
//! - `G` toggle the G-buffer thumbnails, `E` toggle the emissive pass
//! - `Escape` quit

use std::time::Instant;

use clap::Parser;
use glam::{Mat4, Vec2, Vec3, Vec4};
use winit::keyboard::KeyCode;

use deferred_renderer::backend::{BackendError, GraphicsBackend};
use deferred_renderer::resources::{Mesh, TextureData};
use deferred_renderer::scene::{Camera, Light, LightOwner, Model, Scene, TextureKey};
use deferred_renderer::{
    BackgroundMode, BloomDebugView, RenderError, RenderResolution, Renderer, RendererConfig, WgpuBackend,
    Window,
};

const GROUND: TextureKey = TextureKey(0);
const WHITE: TextureKey = TextureKey(1);
const GLOW: TextureKey = TextureKey(2);

/// Deferred renderer demo
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Initial window width
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Initial window height
    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Render at a fixed resolution, letterboxed into the window (e.g. `640x480`)
    #[arg(long, value_parser = parse_resolution)]
    resolution: Option<(u32, u32)>,

    /// Start with FXAA enabled
    #[arg(long)]
    fxaa: bool,

    /// Start with bloom enabled
    #[arg(long)]
    bloom: bool,

    /// Initial bloom preset
    #[arg(long, default_value_t = 0)]
    preset: usize,

    /// Number of orbiting point lights
    #[arg(long, default_value_t = 24)]
    lights: u32,

    /// Disable vertical sync
    #[arg(long)]
    no_vsync: bool,

    /// Exit after this many frames
    #[arg(long)]
    max_frames: Option<u64>,
}

fn parse_resolution(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .split_once('x')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", value))?;
    let w = w.parse().map_err(|e| format!("width: {}", e))?;
    let h = h.parse().map_err(|e| format!("height: {}", e))?;
    Ok((w, h))
}

struct Demo {
    backend: WgpuBackend,
    renderer: Renderer,
    scene: Scene,
    models: Vec<(Model, Mat4)>,
    lights: u32,
    started: Instant,
    frames: u64,
}

impl Demo {
    fn new(window: &Window, args: &Args) -> Result<Self, RenderError> {
        let mut backend = WgpuBackend::new(window.window_arc(), !args.no_vsync)?;

        let mut config = RendererConfig::default()
            .with_fxaa(args.fxaa)
            .with_bloom(args.bloom)
            .with_bloom_preset(args.preset)
            .with_ambient(Vec4::new(0.6, 0.7, 1.0, 1.0), 0.08)
            .with_background(BackgroundMode::Gradient {
                zenith: Vec4::new(0.05, 0.07, 0.15, 1.0),
                horizon: Vec4::new(0.35, 0.3, 0.3, 1.0),
            });
        if let Some((w, h)) = args.resolution {
            config = config.with_render_resolution(RenderResolution::Fixed(w, h));
        }
        let renderer = Renderer::new(&mut backend, config)?;

        let (width, height) = backend.surface_size();
        let mut camera = Camera::new(Vec3::new(0.0, 6.0, 14.0), Vec3::ZERO);
        camera.set_aspect(width as f32, height as f32);
        let mut scene = Scene::new(camera);
        scene.batches.set_ground_key(GROUND);

        let ground = TextureData::checkerboard(256, [200, 200, 200, 255], [60, 60, 70, 255]);
        scene.textures.insert(GROUND, ground.upload(&mut backend)?);
        scene.textures.insert(WHITE, TextureData::white().upload(&mut backend)?);
        scene
            .textures
            .insert(GLOW, TextureData::radial(64, [255, 220, 160]).upload(&mut backend)?);

        let plane = Model::from_mesh(&mut backend, &Mesh::plane(40.0, 40.0, 8), GROUND)?;
        let cube = Model::from_mesh(&mut backend, &Mesh::cube(), WHITE)?;
        let sphere = Model::from_mesh(&mut backend, &Mesh::sphere(0.8, 32, 16), WHITE)?;

        let mut models = vec![(plane, Mat4::IDENTITY)];
        for i in 0..8 {
            let angle = i as f32 / 8.0 * std::f32::consts::TAU;
            let position = Vec3::new(angle.cos() * 6.0, 1.0, angle.sin() * 6.0);
            let model = if i % 2 == 0 { cube.clone() } else { sphere.clone() };
            models.push((model, Mat4::from_translation(position)));
        }
        log::info!("Scene ready: {} models", models.len());

        Ok(Self {
            backend,
            renderer,
            scene,
            models,
            lights: args.lights,
            started: Instant::now(),
            frames: 0,
        })
    }

    fn handle_key(&mut self, key: KeyCode) -> bool {
        let config = self.renderer.config().clone();
        match key {
            KeyCode::Escape => return false,
            KeyCode::KeyF => self.renderer.set_fxaa_enabled(!config.fxaa_enabled),
            KeyCode::KeyB => self.renderer.set_bloom_enabled(!config.bloom_enabled),
            KeyCode::KeyG => self.renderer.set_show_debug_buffers(!config.show_debug_buffers),
            KeyCode::KeyE => self.renderer.set_emissive_pass(!config.emissive_pass),
            KeyCode::KeyV => {
                let next = match self.renderer.bloom_debug_view() {
                    BloomDebugView::Off => BloomDebugView::BrightPass,
                    BloomDebugView::BrightPass => BloomDebugView::BlurHorizontal,
                    BloomDebugView::BlurHorizontal => BloomDebugView::BlurVertical,
                    BloomDebugView::BlurVertical => BloomDebugView::Off,
                };
                log::info!("Bloom debug view: {:?}", next);
                self.renderer.set_bloom_debug_view(next);
            }
            KeyCode::Digit1
            | KeyCode::Digit2
            | KeyCode::Digit3
            | KeyCode::Digit4
            | KeyCode::Digit5
            | KeyCode::Digit6 => {
                let index = match key {
                    KeyCode::Digit1 => 0,
                    KeyCode::Digit2 => 1,
                    KeyCode::Digit3 => 2,
                    KeyCode::Digit4 => 3,
                    KeyCode::Digit5 => 4,
                    _ => 5,
                };
                if let Err(e) = self.renderer.select_bloom_preset(index) {
                    log::warn!("{}", e);
                }
            }
            _ => {}
        }
        true
    }

    fn submit_lights(&mut self, time: f32) {
        let owner = LightOwner(0);
        self.renderer.submit_light(
            Light::directional(Vec3::new(-0.4, -1.0, -0.3), Vec4::new(1.0, 0.95, 0.85, 1.0), 0.6),
            owner,
        );
        self.renderer.submit_light(
            Light::spot(
                Vec3::new(0.0, 8.0, 0.0),
                Vec3::NEG_Y,
                Vec4::new(0.9, 0.9, 1.0, 1.0),
                2.0,
                14.0,
                20f32.to_radians(),
                30f32.to_radians(),
            ),
            owner,
        );

        for i in 0..self.lights {
            let phase = i as f32 / self.lights.max(1) as f32 * std::f32::consts::TAU;
            let angle = phase + time * 0.5;
            let radius = 3.0 + (i % 3) as f32 * 3.0;
            let position = Vec3::new(angle.cos() * radius, 0.8 + (time + phase).sin() * 0.5, angle.sin() * radius);
            let color = Vec4::new(
                0.5 + 0.5 * phase.cos(),
                0.5 + 0.5 * (phase + 2.1).cos(),
                0.5 + 0.5 * (phase + 4.2).cos(),
                1.0,
            );
            self.renderer
                .submit_light(Light::point(position, color, 1.5, 4.0), LightOwner(i as u64 + 1));
            self.renderer.submit_billboard(GLOW, position, Vec2::splat(0.4));
        }
    }

    /// Render one frame; `false` stops the loop
    fn frame(&mut self, window: &mut Window) -> bool {
        for key in window.take_pressed_keys() {
            if !self.handle_key(key) {
                return false;
            }
        }

        if window.was_resized() {
            let (width, height) = window.dimensions();
            window.clear_resize_flag();
            if width > 0 && height > 0 {
                if let Err(e) = self.renderer.resize(&mut self.backend, width, height) {
                    log::error!("Resize failed: {}", e);
                    return false;
                }
                self.scene.camera.set_aspect(width as f32, height as f32);
            }
        }

        let time = self.started.elapsed().as_secs_f32();
        let eye = Vec3::new((time * 0.1).cos() * 14.0, 6.0, (time * 0.1).sin() * 14.0);
        self.scene.camera.set_position(eye);

        self.scene.begin_frame();
        for (model, world) in &self.models {
            let bounds = model.bounds.transformed(*world);
            self.scene.submit_model(model, *world, &bounds);
        }

        self.renderer.begin_frame();
        self.submit_lights(time);

        let result = self
            .renderer
            .draw(&mut self.backend, &self.scene)
            .and_then(|stats| {
                log::trace!("{:?}", stats);
                self.renderer.present(&mut self.backend)
            });
        match result {
            Ok(()) => {}
            Err(RenderError::Backend(BackendError::SurfaceLost)) => {
                log::warn!("Surface lost, recreating targets");
                self.renderer.invalidate();
            }
            Err(e) => {
                log::error!("Frame failed: {}", e);
                return false;
            }
        }

        self.frames += 1;
        if self.frames % 600 == 0 {
            let fps = self.frames as f32 / self.started.elapsed().as_secs_f32();
            log::info!("{} frames, {:.1} fps", self.frames, fps);
        }
        true
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    log::info!("Starting deferred demo: {:?}", args);

    let (width, height) = (args.width, args.height);
    let mut demo: Option<Demo> = None;
    let result = deferred_renderer::window::run("Deferred Renderer", width, height, move |window| {
        if demo.is_none() {
            match Demo::new(window, &args) {
                Ok(created) => demo = Some(created),
                Err(e) => {
                    log::error!("Failed to initialize: {}", e);
                    return false;
                }
            }
        }
        let Some(demo) = demo.as_mut() else {
            return false;
        };
        if !demo.frame(window) {
            return false;
        }
        args.max_frames.map_or(true, |max| demo.frames < max)
    });

    if let Err(e) = result {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
