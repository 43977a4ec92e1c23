//! Light submission queues and light accumulation
//!
//! Directional and emissive light are full-screen passes. Point and spot lights
//! draw a sphere volume per light so only covered pixels are shaded.

use glam::{Mat4, Quat, Vec2, Vec3, Vec4};

use crate::backend::{CullMode, GraphicsBackend, IndexFormat, ParameterDescriptor, RenderState, Vertex};
use crate::bounded::BoundedQueue;
use crate::error::RenderResult;
use crate::pipeline::effect::{self, Effect, Param};
use crate::pipeline::{FullscreenQuad, GBuffer};
use crate::resources::Mesh;
use crate::scene::{
    fold_ambient, Camera, DirectionalLight, Light, LightOwner, Model, PointLight, SpotLight,
    TextureKey,
};

pub const MAX_DIRECTIONAL_LIGHTS: usize = 10;
pub const MAX_POINT_LIGHTS: usize = 512;
pub const MAX_SPOT_LIGHTS: usize = 50;

/// The sphere mesh is inscribed in its radius; scaling past it keeps edges lit.
const VOLUME_SCALE: f32 = 1.1;

/// Radius the volume mesh is drawn at for a light of `radius`
pub fn volume_radius(radius: f32) -> f32 {
    radius * VOLUME_SCALE
}

/// Per-frame light submissions
#[derive(Debug)]
pub struct LightQueues {
    pub directional: BoundedQueue<DirectionalLight>,
    pub point: BoundedQueue<PointLight>,
    pub spot: BoundedQueue<SpotLight>,
    ambient: Vec4,
}

impl Default for LightQueues {
    fn default() -> Self {
        Self::new()
    }
}

impl LightQueues {
    pub fn new() -> Self {
        Self {
            directional: BoundedQueue::with_capacity(MAX_DIRECTIONAL_LIGHTS),
            point: BoundedQueue::with_capacity(MAX_POINT_LIGHTS),
            spot: BoundedQueue::with_capacity(MAX_SPOT_LIGHTS),
            ambient: Vec4::ZERO,
        }
    }

    /// Queue a light for this frame; ambient light is folded immediately.
    ///
    /// Returns `false` when the light's queue is full and it was dropped.
    pub fn submit(&mut self, light: Light, owner: LightOwner) -> bool {
        match light {
            Light::Ambient { color, intensity } => {
                self.ambient = fold_ambient(self.ambient, color, intensity);
                true
            }
            Light::Directional {
                direction,
                color,
                intensity,
            } => self.directional.push(DirectionalLight {
                direction,
                color,
                intensity,
                owner,
            }),
            Light::Point {
                position,
                color,
                intensity,
                radius,
            } => self.point.push(PointLight {
                position,
                color,
                intensity,
                radius,
                owner,
            }),
            Light::Spot {
                position,
                direction,
                color,
                intensity,
                radius,
                inner_angle,
                outer_angle,
            } => self.spot.push(SpotLight {
                position,
                direction,
                color,
                intensity,
                radius,
                inner_angle,
                outer_angle,
                owner,
            }),
        }
    }

    /// Ambient light submitted this frame
    pub fn ambient(&self) -> Vec4 {
        self.ambient
    }

    pub fn clear(&mut self) {
        let dropped = self.dropped();
        if dropped > 0 {
            log::trace!("Dropped {} lights over capacity", dropped);
        }
        self.directional.clear();
        self.point.clear();
        self.spot.clear();
        self.ambient = Vec4::ZERO;
    }

    pub fn dropped(&self) -> usize {
        self.directional.dropped() + self.point.dropped() + self.spot.dropped()
    }

    pub fn len(&self) -> usize {
        self.directional.len() + self.point.len() + self.spot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cull front faces when the camera is inside the light volume, back faces otherwise
pub fn volume_cull(camera_position: Vec3, light_position: Vec3, radius: f32) -> CullMode {
    if camera_position.distance(light_position) < radius {
        CullMode::Front
    } else {
        CullMode::Back
    }
}

const LIGHT_COMMON_WGSL: &str = r#"
@group(0) @binding(1) var gbuffer_sampler: sampler;
@group(0) @binding(2) var color_map: texture_2d<f32>;
@group(0) @binding(3) var normal_map: texture_2d<f32>;
@group(0) @binding(4) var depth_map: texture_2d<f32>;

struct Surface {
    albedo: vec3<f32>,
    specular_intensity: f32,
    normal: vec3<f32>,
    specular_power: f32,
    depth: f32,
}

fn read_surface(uv: vec2<f32>) -> Surface {
    let color = textureSampleLevel(color_map, gbuffer_sampler, uv, 0.0);
    let normal = textureSampleLevel(normal_map, gbuffer_sampler, uv, 0.0);
    let size = vec2<i32>(textureDimensions(depth_map));
    let texel = clamp(vec2<i32>(uv * vec2<f32>(size)), vec2<i32>(0), size - vec2<i32>(1));
    let depth = textureLoad(depth_map, texel, 0);

    var surface: Surface;
    surface.albedo = color.rgb;
    surface.specular_intensity = color.a;
    surface.normal = normalize(normal.xyz * 2.0 - 1.0);
    surface.specular_power = max(normal.w, 1.0);
    surface.depth = depth.r;
    return surface;
}

// Linear depth scales the view ray through the far plane
fn reconstruct_position(
    uv: vec2<f32>,
    linear_depth: f32,
    inv_projection: mat4x4<f32>,
    inv_view: mat4x4<f32>,
) -> vec3<f32> {
    let ndc = vec2<f32>(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0);
    let far_point = inv_projection * vec4<f32>(ndc, 1.0, 1.0);
    let view_position = far_point.xyz / far_point.w * linear_depth;
    return (inv_view * vec4<f32>(view_position, 1.0)).xyz;
}

fn shade(surface: Surface, to_light: vec3<f32>, to_camera: vec3<f32>, color: vec3<f32>, intensity: f32) -> vec4<f32> {
    let n_dot_l = max(dot(surface.normal, to_light), 0.0);
    let reflection = reflect(-to_light, surface.normal);
    let specular = surface.specular_intensity
        * pow(clamp(dot(reflection, to_camera), 0.0, 1.0), surface.specular_power);
    return vec4<f32>(color * n_dot_l, specular * n_dot_l) * intensity;
}
"#;

const DIRECTIONAL_LIGHT_WGSL: &str = r#"
struct Params {
    half_pixel: vec4<f32>,
    direction: vec4<f32>,
    color: vec4<f32>,
    intensity: vec4<f32>,
    camera_position: vec4<f32>,
    inv_view: mat4x4<f32>,
    inv_projection: mat4x4<f32>,
}

@group(0) @binding(0) var<uniform> params: Params;

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let surface = read_surface(input.uv);
    if surface.depth >= 0.9999 {
        return vec4<f32>(0.0);
    }
    let position = reconstruct_position(input.uv, surface.depth, params.inv_projection, params.inv_view);
    let to_camera = normalize(params.camera_position.xyz - position);
    return shade(surface, -normalize(params.direction.xyz), to_camera, params.color.rgb, params.intensity.x);
}
"#;

const VOLUME_VERTEX_WGSL: &str = r#"
struct VolumeInput {
    @location(0) position: vec3<f32>,
}

struct VolumeOutput {
    @builtin(position) position: vec4<f32>,
}

@vertex
fn vs_main(input: VolumeInput) -> VolumeOutput {
    var output: VolumeOutput;
    output.position = params.projection * params.view * params.world * vec4<f32>(input.position, 1.0);
    return output;
}
"#;

const POINT_LIGHT_WGSL: &str = r#"
struct Params {
    world: mat4x4<f32>,
    view: mat4x4<f32>,
    projection: mat4x4<f32>,
    inv_view: mat4x4<f32>,
    inv_projection: mat4x4<f32>,
    half_pixel: vec4<f32>,
    light_position: vec4<f32>,
    color: vec4<f32>,
    intensity: vec4<f32>,
    radius: vec4<f32>,
    camera_position: vec4<f32>,
}

@group(0) @binding(0) var<uniform> params: Params;

@fragment
fn fs_main(input: VolumeOutput) -> @location(0) vec4<f32> {
    let uv = input.position.xy * params.half_pixel.xy * 2.0;
    let surface = read_surface(uv);
    if surface.depth >= 0.9999 {
        return vec4<f32>(0.0);
    }
    let position = reconstruct_position(uv, surface.depth, params.inv_projection, params.inv_view);
    let to_light = params.light_position.xyz - position;
    let attenuation = clamp(1.0 - length(to_light) / params.radius.x, 0.0, 1.0);
    let to_camera = normalize(params.camera_position.xyz - position);
    return shade(surface, normalize(to_light), to_camera, params.color.rgb, params.intensity.x) * attenuation;
}
"#;

const SPOT_LIGHT_WGSL: &str = r#"
struct Params {
    world: mat4x4<f32>,
    view: mat4x4<f32>,
    projection: mat4x4<f32>,
    inv_view: mat4x4<f32>,
    inv_projection: mat4x4<f32>,
    half_pixel: vec4<f32>,
    light_position: vec4<f32>,
    direction: vec4<f32>,
    color: vec4<f32>,
    intensity: vec4<f32>,
    radius: vec4<f32>,
    cone: vec4<f32>,
    camera_position: vec4<f32>,
}

@group(0) @binding(0) var<uniform> params: Params;

@fragment
fn fs_main(input: VolumeOutput) -> @location(0) vec4<f32> {
    let uv = input.position.xy * params.half_pixel.xy * 2.0;
    let surface = read_surface(uv);
    if surface.depth >= 0.9999 {
        return vec4<f32>(0.0);
    }
    let position = reconstruct_position(uv, surface.depth, params.inv_projection, params.inv_view);
    let to_light = params.light_position.xyz - position;
    let light_dir = normalize(to_light);
    // cone.x = cos(inner), cone.y = cos(outer)
    let spot = smoothstep(params.cone.y, params.cone.x, dot(-light_dir, normalize(params.direction.xyz)));
    let attenuation = clamp(1.0 - length(to_light) / params.radius.x, 0.0, 1.0) * spot;
    let to_camera = normalize(params.camera_position.xyz - position);
    return shade(surface, light_dir, to_camera, params.color.rgb, params.intensity.x) * attenuation;
}
"#;

const EMISSIVE_LIGHT_WGSL: &str = r#"
struct Params {
    half_pixel: vec4<f32>,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(2) var depth_map: texture_2d<f32>;

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let size = vec2<i32>(textureDimensions(depth_map));
    let texel = clamp(vec2<i32>(input.uv * vec2<f32>(size)), vec2<i32>(0), size - vec2<i32>(1));
    let emissive = textureLoad(depth_map, texel, 0).g;
    return vec4<f32>(vec3<f32>(emissive), 0.0);
}
"#;

/// G-buffer inputs every lighting effect declares first
struct SurfaceInputs {
    color_map: Param,
    normal_map: Param,
    depth_map: Param,
}

impl SurfaceInputs {
    fn resolve(backend: &dyn GraphicsBackend, effect: &Effect) -> RenderResult<Self> {
        Ok(Self {
            color_map: effect.parameter(backend, "ColorMap")?,
            normal_map: effect.parameter(backend, "NormalMap")?,
            depth_map: effect.parameter(backend, "DepthMap")?,
        })
    }

    fn bind(&self, backend: &mut dyn GraphicsBackend, gbuffer: &GBuffer) {
        let targets = gbuffer.targets();
        self.color_map.set_texture(backend, targets.color);
        self.normal_map.set_texture(backend, targets.normal);
        self.depth_map.set_texture(backend, targets.depth);
    }
}

/// Camera matrices shared by the lighting effects
struct ViewInputs {
    camera_position: Param,
    inv_view: Param,
    inv_projection: Param,
}

impl ViewInputs {
    fn resolve(backend: &dyn GraphicsBackend, effect: &Effect) -> RenderResult<Self> {
        Ok(Self {
            camera_position: effect.parameter(backend, "CameraPosition")?,
            inv_view: effect.parameter(backend, "InvView")?,
            inv_projection: effect.parameter(backend, "InvProjection")?,
        })
    }

    fn bind(&self, backend: &mut dyn GraphicsBackend, camera: &Camera) {
        self.camera_position.set_vec3(backend, camera.position);
        self.inv_view.set_mat4(backend, camera.view_matrix().inverse());
        self.inv_projection
            .set_mat4(backend, camera.projection_matrix().inverse());
    }
}

fn surface_parameters() -> [ParameterDescriptor; 3] {
    [
        effect::texture("ColorMap"),
        effect::texture("NormalMap"),
        effect::unfilterable("DepthMap"),
    ]
}

struct DirectionalEffect {
    effect: Effect,
    half_pixel: Param,
    direction: Param,
    color: Param,
    intensity: Param,
    view: ViewInputs,
    surface: SurfaceInputs,
}

impl DirectionalEffect {
    fn new(backend: &mut dyn GraphicsBackend) -> RenderResult<Self> {
        let mut parameters = vec![
            effect::vec2("HalfPixel"),
            effect::vec3("LightDirection"),
            effect::vec4("Color"),
            effect::float("Intensity"),
            effect::vec3("CameraPosition"),
            effect::mat4("InvView"),
            effect::mat4("InvProjection"),
        ];
        parameters.extend(surface_parameters());
        let desc = effect::screen_effect(
            "DirectionalLight",
            &format!("{}{}", LIGHT_COMMON_WGSL, DIRECTIONAL_LIGHT_WGSL),
            parameters,
        );
        let effect = Effect::create(backend, &desc)?;
        Ok(Self {
            half_pixel: effect.parameter(backend, "HalfPixel")?,
            direction: effect.parameter(backend, "LightDirection")?,
            color: effect.parameter(backend, "Color")?,
            intensity: effect.parameter(backend, "Intensity")?,
            view: ViewInputs::resolve(backend, &effect)?,
            surface: SurfaceInputs::resolve(backend, &effect)?,
            effect,
        })
    }
}

/// Parameters shared by the point and spot volume effects
struct VolumeInputs {
    world: Param,
    view_matrix: Param,
    projection: Param,
    half_pixel: Param,
    light_position: Param,
    color: Param,
    intensity: Param,
    radius: Param,
    view: ViewInputs,
    surface: SurfaceInputs,
}

impl VolumeInputs {
    fn resolve(backend: &dyn GraphicsBackend, effect: &Effect) -> RenderResult<Self> {
        Ok(Self {
            world: effect.parameter(backend, "World")?,
            view_matrix: effect.parameter(backend, "View")?,
            projection: effect.parameter(backend, "Projection")?,
            half_pixel: effect.parameter(backend, "HalfPixel")?,
            light_position: effect.parameter(backend, "LightPosition")?,
            color: effect.parameter(backend, "Color")?,
            intensity: effect.parameter(backend, "Intensity")?,
            radius: effect.parameter(backend, "Radius")?,
            view: ViewInputs::resolve(backend, effect)?,
            surface: SurfaceInputs::resolve(backend, effect)?,
        })
    }

    /// Parameters bound once per frame rather than per light
    fn bind_frame(&self, backend: &mut dyn GraphicsBackend, camera: &Camera, gbuffer: &GBuffer) {
        self.view_matrix.set_mat4(backend, camera.view_matrix());
        self.projection.set_mat4(backend, camera.projection_matrix());
        self.half_pixel.set_vec2(backend, gbuffer.half_pixel());
        self.view.bind(backend, camera);
        self.surface.bind(backend, gbuffer);
    }

    fn bind_light(
        &self,
        backend: &mut dyn GraphicsBackend,
        position: Vec3,
        color: Vec4,
        intensity: f32,
        radius: f32,
    ) {
        let world = Mat4::from_scale_rotation_translation(
            Vec3::splat(volume_radius(radius)),
            Quat::IDENTITY,
            position,
        );
        self.world.set_mat4(backend, world);
        self.light_position.set_vec3(backend, position);
        self.color.set_vec4(backend, color);
        self.intensity.set_float(backend, intensity);
        self.radius.set_float(backend, radius);
    }
}

fn volume_parameters(extra: &[ParameterDescriptor]) -> Vec<ParameterDescriptor> {
    let mut parameters = vec![
        effect::mat4("World"),
        effect::mat4("View"),
        effect::mat4("Projection"),
        effect::mat4("InvView"),
        effect::mat4("InvProjection"),
        effect::vec2("HalfPixel"),
        effect::vec3("LightPosition"),
    ];
    parameters.extend_from_slice(extra);
    parameters.extend([
        effect::vec4("Color"),
        effect::float("Intensity"),
        effect::float("Radius"),
    ]);
    parameters
}

struct PointEffect {
    effect: Effect,
    inputs: VolumeInputs,
}

impl PointEffect {
    fn new(backend: &mut dyn GraphicsBackend) -> RenderResult<Self> {
        let mut parameters = volume_parameters(&[]);
        parameters.push(effect::vec3("CameraPosition"));
        parameters.extend(surface_parameters());
        let desc = effect::mesh_effect(
            "PointLight",
            &format!("{}{}{}", LIGHT_COMMON_WGSL, POINT_LIGHT_WGSL, VOLUME_VERTEX_WGSL),
            Vertex::layout(),
            parameters,
        );
        let effect = Effect::create(backend, &desc)?;
        Ok(Self {
            inputs: VolumeInputs::resolve(backend, &effect)?,
            effect,
        })
    }
}

struct SpotEffect {
    effect: Effect,
    inputs: VolumeInputs,
    direction: Param,
    cone: Param,
}

impl SpotEffect {
    fn new(backend: &mut dyn GraphicsBackend) -> RenderResult<Self> {
        let mut parameters = volume_parameters(&[effect::vec3("LightDirection")]);
        parameters.extend([
            effect::vec2("Cone"),
            effect::vec3("CameraPosition"),
        ]);
        parameters.extend(surface_parameters());
        let desc = effect::mesh_effect(
            "SpotLight",
            &format!("{}{}{}", LIGHT_COMMON_WGSL, SPOT_LIGHT_WGSL, VOLUME_VERTEX_WGSL),
            Vertex::layout(),
            parameters,
        );
        let effect = Effect::create(backend, &desc)?;
        Ok(Self {
            inputs: VolumeInputs::resolve(backend, &effect)?,
            direction: effect.parameter(backend, "LightDirection")?,
            cone: effect.parameter(backend, "Cone")?,
            effect,
        })
    }
}

struct EmissiveEffect {
    effect: Effect,
    half_pixel: Param,
    depth_map: Param,
}

impl EmissiveEffect {
    fn new(backend: &mut dyn GraphicsBackend) -> RenderResult<Self> {
        let desc = effect::screen_effect(
            "EmissiveLight",
            EMISSIVE_LIGHT_WGSL,
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

/// Unit sphere drawn once per point or spot light
struct VolumeMesh {
    model: Model,
    index_count: u32,
}

impl VolumeMesh {
    fn new(backend: &mut dyn GraphicsBackend) -> RenderResult<Self> {
        let mesh = Mesh::sphere(1.0, 16, 12);
        Ok(Self {
            model: Model::from_mesh(backend, &mesh, TextureKey(0))?,
            index_count: mesh.index_count() as u32,
        })
    }

    fn draw(&self, backend: &mut dyn GraphicsBackend) {
        backend.set_vertex_buffer(self.model.vertex_buffer);
        match self.model.index_buffer {
            Some(indices) => {
                backend.set_index_buffer(indices, IndexFormat::Uint32);
                backend.draw_indexed(0..self.index_count, 0);
            }
            None => backend.draw(0..self.index_count),
        }
    }
}

/// Draws queued lights into the light accumulation target
pub struct LightRenderer {
    directional: DirectionalEffect,
    point: PointEffect,
    spot: SpotEffect,
    emissive: EmissiveEffect,
    volume: VolumeMesh,
}

impl LightRenderer {
    pub fn new(backend: &mut dyn GraphicsBackend) -> RenderResult<Self> {
        Ok(Self {
            directional: DirectionalEffect::new(backend)?,
            point: PointEffect::new(backend)?,
            spot: SpotEffect::new(backend)?,
            emissive: EmissiveEffect::new(backend)?,
            volume: VolumeMesh::new(backend)?,
        })
    }

    /// Directional, then point, then spot, then the emissive pass.
    ///
    /// The light target must already be bound and cleared.
    pub fn draw(
        &self,
        backend: &mut dyn GraphicsBackend,
        quad: &FullscreenQuad,
        gbuffer: &GBuffer,
        camera: &Camera,
        lights: &LightQueues,
        emissive: bool,
    ) {
        if !lights.directional.is_empty() {
            backend.push_debug_group("lights.directional");
            self.draw_directional(backend, quad, gbuffer, camera, lights.directional.as_slice());
            backend.pop_debug_group();
        }
        if !lights.point.is_empty() {
            backend.push_debug_group("lights.point");
            self.draw_point(backend, gbuffer, camera, lights.point.as_slice());
            backend.pop_debug_group();
        }
        if !lights.spot.is_empty() {
            backend.push_debug_group("lights.spot");
            self.draw_spot(backend, gbuffer, camera, lights.spot.as_slice());
            backend.pop_debug_group();
        }
        if emissive {
            backend.push_debug_group("lights.emissive");
            self.draw_emissive(backend, quad, gbuffer);
            backend.pop_debug_group();
        }
    }

    fn draw_directional(
        &self,
        backend: &mut dyn GraphicsBackend,
        quad: &FullscreenQuad,
        gbuffer: &GBuffer,
        camera: &Camera,
        lights: &[DirectionalLight],
    ) {
        let effect = &self.directional;
        backend.apply_render_state(RenderState::SCREEN_ADDITIVE);
        effect.effect.bind(backend);
        effect.half_pixel.set_vec2(backend, gbuffer.half_pixel());
        effect.view.bind(backend, camera);
        effect.surface.bind(backend, gbuffer);

        for light in lights {
            effect.direction.set_vec3(backend, light.direction);
            effect.color.set_vec4(backend, light.color);
            effect.intensity.set_float(backend, light.intensity);
            quad.draw(backend);
        }
    }

    fn draw_point(
        &self,
        backend: &mut dyn GraphicsBackend,
        gbuffer: &GBuffer,
        camera: &Camera,
        lights: &[PointLight],
    ) {
        let inputs = &self.point.inputs;
        self.point.effect.bind(backend);
        inputs.bind_frame(backend, camera, gbuffer);

        for light in lights {
            let cull = volume_cull(camera.position, light.position, volume_radius(light.radius));
            backend.apply_render_state(RenderState::light_volume(cull));
            inputs.bind_light(backend, light.position, light.color, light.intensity, light.radius);
            self.volume.draw(backend);
        }
    }

    fn draw_spot(
        &self,
        backend: &mut dyn GraphicsBackend,
        gbuffer: &GBuffer,
        camera: &Camera,
        lights: &[SpotLight],
    ) {
        let inputs = &self.spot.inputs;
        self.spot.effect.bind(backend);
        inputs.bind_frame(backend, camera, gbuffer);

        for light in lights {
            let cull = volume_cull(camera.position, light.position, volume_radius(light.radius));
            backend.apply_render_state(RenderState::light_volume(cull));
            inputs.bind_light(backend, light.position, light.color, light.intensity, light.radius);
            let (inner, outer) = light.cone_cosines();
            self.spot.direction.set_vec3(backend, light.direction);
            self.spot.cone.set_vec2(backend, Vec2::new(inner, outer));
            self.volume.draw(backend);
        }
    }

    fn draw_emissive(&self, backend: &mut dyn GraphicsBackend, quad: &FullscreenQuad, gbuffer: &GBuffer) {
        backend.apply_render_state(RenderState::SCREEN_ADDITIVE);
        self.emissive.effect.bind(backend);
        self.emissive.half_pixel.set_vec2(backend, gbuffer.half_pixel());
        self.emissive.depth_map.set_texture(backend, gbuffer.targets().depth);
        quad.draw(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{RecordedCall, RecordingBackend};
    use crate::scene::LightKind;
    use rstest::rstest;

    fn light_of_kind(kind: LightKind, i: usize) -> Light {
        let position = Vec3::new(i as f32, 0.0, 0.0);
        match kind {
            LightKind::Ambient => Light::ambient(Vec4::ONE, 0.1),
            LightKind::Directional => Light::directional(Vec3::NEG_Y, Vec4::ONE, i as f32),
            LightKind::Point => Light::point(position, Vec4::ONE, 1.0, 5.0),
            LightKind::Spot => Light::spot(position, Vec3::NEG_Y, Vec4::ONE, 1.0, 5.0, 0.3, 0.5),
        }
    }

    fn queued_owners(queues: &LightQueues, kind: LightKind) -> Vec<LightOwner> {
        match kind {
            LightKind::Ambient => Vec::new(),
            LightKind::Directional => queues.directional.iter().map(|l| l.owner).collect(),
            LightKind::Point => queues.point.iter().map(|l| l.owner).collect(),
            LightKind::Spot => queues.spot.iter().map(|l| l.owner).collect(),
        }
    }

    #[rstest]
    #[case::directional(LightKind::Directional, MAX_DIRECTIONAL_LIGHTS)]
    #[case::point(LightKind::Point, MAX_POINT_LIGHTS)]
    #[case::spot(LightKind::Spot, MAX_SPOT_LIGHTS)]
    fn test_queue_capacities(#[case] kind: LightKind, #[case] capacity: usize) {
        let mut queues = LightQueues::new();
        let accepted: Vec<bool> = (0..capacity + 7)
            .map(|i| queues.submit(light_of_kind(kind, i), LightOwner(i as u64)))
            .collect();

        assert!(accepted[..capacity].iter().all(|kept| *kept));
        assert!(accepted[capacity..].iter().all(|kept| !kept));
        assert_eq!(queues.len(), capacity);
        assert_eq!(queues.dropped(), 7);
        // first come, first kept
        let expected: Vec<_> = (0..capacity as u64).map(LightOwner).collect();
        assert_eq!(queued_owners(&queues, kind), expected);

        queues.clear();
        assert_eq!(queues.dropped(), 0);
    }

    #[test]
    fn test_ambient_never_queued() {
        let mut queues = LightQueues::new();
        assert!(queues.submit(Light::ambient(Vec4::ONE, 0.5), LightOwner(1)));
        assert!(queues.is_empty());
        assert_eq!(queues.ambient(), Vec4::new(0.5, 0.5, 0.5, 0.5));

        queues.clear();
        assert_eq!(queues.ambient(), Vec4::ZERO);
    }

    #[rstest]
    #[case::inside(Vec3::new(1.0, 0.0, 0.0), CullMode::Front)]
    #[case::outside(Vec3::new(20.0, 0.0, 0.0), CullMode::Back)]
    #[case::on_surface(Vec3::new(5.0, 0.0, 0.0), CullMode::Back)]
    fn test_volume_cull(#[case] camera: Vec3, #[case] expected: CullMode) {
        assert_eq!(volume_cull(camera, Vec3::ZERO, 5.0), expected);
    }

    #[test]
    fn test_volume_radius_covers_light() {
        assert!(volume_radius(5.0) > 5.0);
        assert_eq!(volume_radius(0.0), 0.0);
    }

    fn setup() -> (RecordingBackend, LightRenderer, FullscreenQuad, GBuffer) {
        let mut backend = RecordingBackend::new(64, 64);
        let renderer = LightRenderer::new(&mut backend).unwrap();
        let quad = FullscreenQuad::new(&mut backend).unwrap();
        let gbuffer = GBuffer::new(&mut backend, 64, 64).unwrap();
        backend.clear_calls();
        (backend, renderer, quad, gbuffer)
    }

    #[test]
    fn test_lights_drawn_in_kind_order() {
        let (mut backend, renderer, quad, gbuffer) = setup();
        let camera = Camera::new(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO);
        let mut queues = LightQueues::new();
        queues.submit(Light::spot(Vec3::ZERO, Vec3::NEG_Y, Vec4::ONE, 1.0, 5.0, 0.3, 0.5), LightOwner(0));
        queues.submit(Light::point(Vec3::ZERO, Vec4::ONE, 1.0, 5.0), LightOwner(0));
        queues.submit(Light::directional(Vec3::NEG_Y, Vec4::ONE, 1.0), LightOwner(0));

        renderer.draw(&mut backend, &quad, &gbuffer, &camera, &queues, true);

        assert_eq!(
            backend.debug_groups(),
            vec!["lights.directional", "lights.point", "lights.spot", "lights.emissive"]
        );
        assert_eq!(backend.draw_count(), 4);
    }

    #[rstest]
    #[case::point_inside_radius(Light::point(Vec3::ZERO, Vec4::ONE, 1.0, 5.0), 1.0, "lights.point")]
    #[case::point_inside_scaled_volume(Light::point(Vec3::ZERO, Vec4::ONE, 1.0, 5.0), 5.3, "lights.point")]
    #[case::spot_inside_scaled_volume(
        Light::spot(Vec3::ZERO, Vec3::NEG_Z, Vec4::ONE, 1.0, 5.0, 0.3, 0.5),
        5.3,
        "lights.spot"
    )]
    fn test_camera_inside_volume_culls_front(
        #[case] light: Light,
        #[case] distance: f32,
        #[case] group: &str,
    ) {
        let (mut backend, renderer, quad, gbuffer) = setup();
        let camera = Camera::new(Vec3::new(0.0, 0.0, distance), Vec3::ZERO);
        let mut queues = LightQueues::new();
        queues.submit(light, LightOwner(0));

        renderer.draw(&mut backend, &quad, &gbuffer, &camera, &queues, false);

        let states: Vec<_> = backend
            .calls()
            .iter()
            .filter_map(|call| match call {
                RecordedCall::ApplyRenderState(state) => Some(*state),
                _ => None,
            })
            .collect();
        assert_eq!(states, vec![RenderState::light_volume(CullMode::Front)]);
        assert_eq!(backend.draws_within(group), 1);
    }

    #[test]
    fn test_camera_outside_scaled_volume_culls_back() {
        let (mut backend, renderer, quad, gbuffer) = setup();
        let camera = Camera::new(Vec3::new(0.0, 0.0, 5.6), Vec3::ZERO);
        let mut queues = LightQueues::new();
        queues.submit(Light::point(Vec3::ZERO, Vec4::ONE, 1.0, 5.0), LightOwner(0));

        renderer.draw(&mut backend, &quad, &gbuffer, &camera, &queues, false);

        assert!(backend
            .calls()
            .contains(&RecordedCall::ApplyRenderState(RenderState::light_volume(CullMode::Back))));
    }

    #[test]
    fn test_no_lights_no_draws() {
        let (mut backend, renderer, quad, gbuffer) = setup();
        let camera = Camera::default();
        renderer.draw(&mut backend, &quad, &gbuffer, &camera, &LightQueues::new(), false);
        assert_eq!(backend.draw_count(), 0);
    }
}
