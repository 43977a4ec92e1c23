//! Frame-level tests over the recording backend.
//!
//! These observe frame structure through debug groups, the effects selected
//! inside them and the parameters they were given.

mod common;

use glam::{Mat4, Vec2, Vec3, Vec4};
use rstest::rstest;

use common::{TestContext, SURFACE, WHITE};
use deferred_renderer::backend::{RecordedCall, RecordedValue, RecordingBackend, Viewport};
use deferred_renderer::pipeline::{MAX_BILLBOARDS, MAX_DIRECTIONAL_LIGHTS, MAX_POINT_LIGHTS, MAX_SPOT_LIGHTS};
use deferred_renderer::scene::{Light, LightOwner};
use deferred_renderer::{FramePhase, RenderError, RenderResolution, Renderer, RendererConfig};

fn sun() -> Light {
    Light::directional(Vec3::new(0.0, -1.0, -0.5), Vec4::ONE, 1.0)
}

#[test]
fn test_frame_phases_in_order() {
    let mut ctx = TestContext::new(RendererConfig::default());
    ctx.renderer.begin_frame();
    assert!(ctx.renderer.submit_light(sun(), LightOwner(1)));
    ctx.render();

    assert_eq!(
        ctx.backend.debug_groups(),
        vec![
            "gbuffer.bind",
            "gbuffer.clear",
            "scene",
            "lights",
            "compose.direct",
            "gbuffer.unbind",
            "present",
        ]
    );
    assert_eq!(ctx.backend.draws_within("lights.directional"), 1);
    assert_eq!(ctx.backend.frames_presented(), 1);
    assert_eq!(ctx.renderer.phase(), FramePhase::Idle);
}

#[rstest]
#[case::direct(false, false, "compose.direct", vec!["CombineFinal"])]
#[case::fxaa(true, false, "compose.fxaa", vec!["CombineFinal", "Fxaa"])]
#[case::bloom(
    false,
    true,
    "compose.bloom",
    vec!["CombineFinal", "BloomExtract", "GaussianBlur", "GaussianBlur", "BloomCombine"]
)]
#[case::fxaa_bloom(
    true,
    true,
    "compose.fxaa_bloom",
    vec!["CombineFinal", "Fxaa", "BloomExtract", "GaussianBlur", "GaussianBlur", "BloomCombine"]
)]
fn test_compose_branches(
    #[case] fxaa: bool,
    #[case] bloom: bool,
    #[case] label: &str,
    #[case] effects: Vec<&'static str>,
) {
    let config = RendererConfig::default().with_fxaa(fxaa).with_bloom(bloom);
    let mut ctx = TestContext::new(config);
    ctx.renderer.begin_frame();
    ctx.render();

    assert!(ctx.backend.debug_groups().iter().any(|g| g == label));
    assert_eq!(ctx.backend.effects_within(label), effects);
    assert_eq!(ctx.backend.draws_within(label), effects.len());
}

#[test]
fn test_toggling_post_processing_between_frames() {
    let mut ctx = TestContext::new(RendererConfig::default());
    ctx.renderer.begin_frame();
    ctx.render();
    ctx.renderer.set_bloom_enabled(true);
    ctx.renderer.begin_frame();
    ctx.render();

    let groups = ctx.backend.debug_groups();
    assert!(groups.iter().any(|g| g == "compose.direct"));
    assert!(groups.iter().any(|g| g == "compose.bloom"));
}

#[test]
fn test_ambient_lights_are_summed() {
    let mut ctx = TestContext::new(RendererConfig::default());
    let color = Vec4::new(0.2, 0.4, 0.6, 1.0);

    ctx.renderer.begin_frame();
    ctx.renderer.submit_light(Light::ambient(color, 0.5), LightOwner(1));
    ctx.renderer.submit_light(Light::ambient(color, 0.7), LightOwner(2));
    ctx.render();

    let Some(RecordedValue::Vec4(ambient)) = ctx.backend.last_parameter("CombineFinal", "Ambient").cloned()
    else {
        panic!("ambient was never set");
    };
    assert!((ambient.truncate() - color.truncate() * 1.2).length() < 1e-5);
    assert_eq!(ambient.w, 1.0);
    // Ambient lights never reach a light queue
    assert!(ctx.renderer.lights().is_empty());
}

#[test]
fn test_default_config_adds_no_ambient() {
    let mut ctx = TestContext::new(RendererConfig::default());
    ctx.renderer.begin_frame();
    ctx.render();

    assert_eq!(
        ctx.backend.last_parameter("CombineFinal", "Ambient"),
        Some(&RecordedValue::Vec4(Vec4::ZERO))
    );
}

#[test]
fn test_config_ambient_added_to_submitted() {
    let config = RendererConfig::default().with_ambient(Vec4::new(1.0, 1.0, 1.0, 0.0), 0.25);
    let mut ctx = TestContext::new(config);

    ctx.renderer.begin_frame();
    ctx.renderer
        .submit_light(Light::ambient(Vec4::new(0.5, 0.0, 0.0, 0.0), 1.0), LightOwner(1));
    ctx.render();

    assert_eq!(
        ctx.backend.last_parameter("CombineFinal", "Ambient"),
        Some(&RecordedValue::Vec4(Vec4::new(0.75, 0.25, 0.25, 0.0)))
    );
}

fn numbered_directional(i: usize) -> Light {
    Light::directional(Vec3::NEG_Y, Vec4::ONE, i as f32)
}

fn numbered_point(i: usize) -> Light {
    Light::point(Vec3::new(i as f32 * 0.01, 0.5, 0.0), Vec4::ONE, 1.0, 2.0)
}

fn numbered_spot(i: usize) -> Light {
    Light::spot(Vec3::new(i as f32 * 0.01, 3.0, 0.0), Vec3::NEG_Y, Vec4::ONE, 1.0, 4.0, 0.3, 0.5)
}

#[rstest]
#[case::directional(numbered_directional, MAX_DIRECTIONAL_LIGHTS, "lights.directional")]
#[case::point(numbered_point, MAX_POINT_LIGHTS, "lights.point")]
#[case::spot(numbered_spot, MAX_SPOT_LIGHTS, "lights.spot")]
fn test_lights_over_capacity_are_dropped(
    #[case] light: fn(usize) -> Light,
    #[case] capacity: usize,
    #[case] group: &str,
) {
    let mut ctx = TestContext::new(RendererConfig::default());
    ctx.renderer.begin_frame();

    let accepted: Vec<bool> = (0..capacity + 9)
        .map(|i| ctx.renderer.submit_light(light(i), LightOwner(i as u64)))
        .collect();
    assert!(accepted[..capacity].iter().all(|kept| *kept));
    assert!(accepted[capacity..].iter().all(|kept| !kept));
    assert_eq!(ctx.renderer.lights().len(), capacity);

    let stats = ctx.renderer.draw(&mut ctx.backend, &ctx.scene).unwrap();
    assert_eq!(
        stats.directional_lights + stats.point_lights + stats.spot_lights,
        capacity
    );
    assert_eq!(stats.dropped_lights, 9);
    assert_eq!(ctx.backend.draws_within(group), capacity);
}

#[test]
fn test_billboards_over_capacity_are_dropped() {
    let mut ctx = TestContext::new(RendererConfig::default());
    ctx.renderer.begin_frame();

    let accepted: Vec<bool> = (0..MAX_BILLBOARDS + 5)
        .map(|i| {
            let position = Vec3::new(i as f32, 0.0, 0.0);
            ctx.renderer.submit_billboard(WHITE, position, Vec2::splat(0.5))
        })
        .collect();
    assert!(accepted[..MAX_BILLBOARDS].iter().all(|kept| *kept));
    assert!(accepted[MAX_BILLBOARDS..].iter().all(|kept| !kept));

    let stats = ctx.renderer.draw(&mut ctx.backend, &ctx.scene).unwrap();
    assert_eq!(stats.billboard_draws, MAX_BILLBOARDS);
    assert_eq!(stats.dropped_billboards, 5);
    // The last billboard drawn is the last one that fit
    let last_kept = Vec3::new((MAX_BILLBOARDS - 1) as f32, 0.0, 0.0);
    assert_eq!(
        ctx.backend.last_parameter("Billboard", "Position"),
        Some(&RecordedValue::Vec3(last_kept))
    );
}

#[test]
fn test_begin_frame_discards_previous_lights() {
    let mut ctx = TestContext::new(RendererConfig::default());
    ctx.renderer.begin_frame();
    ctx.renderer.submit_light(sun(), LightOwner(1));
    ctx.render();

    ctx.backend.clear_calls();
    ctx.renderer.begin_frame();
    ctx.render();
    assert_eq!(ctx.backend.draws_within("lights.directional"), 0);
}

#[test]
fn test_empty_scene_draws_no_geometry() {
    let mut ctx = TestContext::new(RendererConfig::default());
    ctx.renderer.begin_frame();
    let stats = ctx.renderer.draw(&mut ctx.backend, &ctx.scene).unwrap();

    assert_eq!(stats.batch_draws, 0);
    assert_eq!(stats.billboard_draws, 0);
    assert_eq!(ctx.backend.draws_within("scene"), 0);
}

#[test]
fn test_models_and_billboards_drawn_in_scene_group() {
    let mut ctx = TestContext::new(RendererConfig::default());
    let cube = ctx.cube();
    ctx.backend.clear_calls();

    ctx.scene.begin_frame();
    assert_eq!(ctx.submit(&cube, Mat4::IDENTITY), 1);
    ctx.renderer.begin_frame();
    assert!(ctx.renderer.submit_billboard(WHITE, Vec3::new(1.0, 1.0, 0.0), Vec2::splat(0.5)));
    let stats = ctx.renderer.draw(&mut ctx.backend, &ctx.scene).unwrap();

    assert_eq!(stats.batch_draws, 1);
    assert_eq!(stats.billboard_draws, 1);
    assert_eq!(ctx.backend.draws_within("scene"), 2);
    assert_eq!(ctx.backend.effects_within("scene"), vec!["RenderGBuffer", "Billboard"]);
}

#[test]
fn test_resize_recreates_targets() {
    let mut ctx = TestContext::new(RendererConfig::default());
    let live = ctx.backend.live_textures();

    ctx.renderer.resize(&mut ctx.backend, 640, 360).unwrap();

    let recreated = ctx.backend.calls().iter().find_map(|call| match call {
        RecordedCall::CreateTexture {
            label: Some(label),
            width,
            height,
            ..
        } if label == "gbuffer.color" => Some((*width, *height)),
        _ => None,
    });
    assert_eq!(recreated, Some((640, 360)));
    assert_eq!(ctx.renderer.render_size(), (640, 360));
    assert_eq!(ctx.backend.live_textures(), live);
}

#[test]
fn test_fixed_resolution_survives_resize() {
    let config = RendererConfig::default().with_render_resolution(RenderResolution::Fixed(160, 90));
    let mut ctx = TestContext::new(config);

    ctx.renderer.resize(&mut ctx.backend, 640, 360).unwrap();
    assert_eq!(ctx.renderer.render_size(), (160, 90));
    assert_eq!(ctx.renderer.letterbox(), Viewport::full(640, 360));
}

#[test]
fn test_missing_parameter_fails_creation() {
    let mut backend = RecordingBackend::new(SURFACE.0, SURFACE.1).without_parameter("CombineFinal", "Ambient");
    let result = Renderer::new(&mut backend, RendererConfig::default());

    assert!(matches!(
        result,
        Err(RenderError::MissingParameter {
            effect: "CombineFinal",
            name: "Ambient"
        })
    ));
}

#[test]
fn test_present_without_draw_is_rejected() {
    let mut ctx = TestContext::new(RendererConfig::default());
    ctx.renderer.begin_frame();

    let result = ctx.renderer.present(&mut ctx.backend);
    assert!(matches!(
        result,
        Err(RenderError::InvalidPhase {
            operation: "present",
            ..
        })
    ));
    assert_eq!(ctx.backend.frames_presented(), 0);
}

#[test]
fn test_draw_twice_is_rejected() {
    let mut ctx = TestContext::new(RendererConfig::default());
    ctx.renderer.begin_frame();
    ctx.renderer.draw(&mut ctx.backend, &ctx.scene).unwrap();

    let result = ctx.renderer.draw(&mut ctx.backend, &ctx.scene);
    assert!(matches!(
        result,
        Err(RenderError::InvalidPhase {
            operation: "draw",
            phase: FramePhase::Drawn
        })
    ));
}

#[test]
fn test_debug_buffers_drawn_after_final_image() {
    let config = RendererConfig::default().with_debug_buffers(true);
    let mut ctx = TestContext::new(config);
    ctx.renderer.begin_frame();
    ctx.render();

    assert_eq!(
        ctx.backend.effects_within("present"),
        vec!["Copy", "Copy", "Copy", "Copy", "DepthView"]
    );
}
