//! Scene geometry and billboards written into the G-buffer

use crate::backend::{
    CullMode, GraphicsBackend, IndexFormat, RenderState, SamplerMode, Vertex, VertexPositionTexture,
};
use crate::bounded::BoundedQueue;
use crate::error::RenderResult;
use crate::pipeline::effect::{self, Effect, Param};
use crate::pipeline::gbuffer::GBUFFER_OUTPUT_WGSL;
use crate::pipeline::FullscreenQuad;
use crate::scene::{BatchRegistry, Billboard, Camera, TextureResolver};

pub const MAX_BILLBOARDS: usize = 2048;

const SPECULAR_INTENSITY: f32 = 0.5;
const SPECULAR_POWER: f32 = 16.0;

const RENDER_GBUFFER_WGSL: &str = r#"
struct Params {
    world: mat4x4<f32>,
    view: mat4x4<f32>,
    projection: mat4x4<f32>,
    far_plane: vec4<f32>,
    specular_intensity: vec4<f32>,
    specular_power: vec4<f32>,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var diffuse_sampler: sampler;
@group(0) @binding(2) var diffuse_map: texture_2d<f32>;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) view_depth: f32,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var output: VertexOutput;
    let world_position = params.world * vec4<f32>(input.position, 1.0);
    let view_position = params.view * world_position;
    output.position = params.projection * view_position;
    output.uv = input.uv;
    output.normal = (params.world * vec4<f32>(input.normal, 0.0)).xyz;
    output.view_depth = -view_position.z;
    return output;
}

@fragment
fn fs_main(input: VertexOutput) -> GBufferOutput {
    let albedo = textureSample(diffuse_map, diffuse_sampler, input.uv);
    var output: GBufferOutput;
    output.color = vec4<f32>(albedo.rgb, params.specular_intensity.x);
    output.normal = vec4<f32>(normalize(input.normal) * 0.5 + 0.5, params.specular_power.x);
    output.depth = vec4<f32>(input.view_depth / params.far_plane.x, 0.0, 0.0, 0.0);
    return output;
}
"#;

const BILLBOARD_WGSL: &str = r#"
struct Params {
    view: mat4x4<f32>,
    projection: mat4x4<f32>,
    position: vec4<f32>,
    size: vec4<f32>,
    camera_right: vec4<f32>,
    camera_up: vec4<f32>,
    far_plane: vec4<f32>,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var sprite_sampler: sampler;
@group(0) @binding(2) var sprite_map: texture_2d<f32>;

struct VertexInput {
    @location(0) corner: vec3<f32>,
    @location(1) uv: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
    @location(1) view_depth: f32,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var output: VertexOutput;
    let offset = params.camera_right.xyz * input.corner.x * params.size.x * 0.5
        + params.camera_up.xyz * input.corner.y * params.size.y * 0.5;
    let view_position = params.view * vec4<f32>(params.position.xyz + offset, 1.0);
    output.position = params.projection * view_position;
    output.uv = input.uv;
    output.view_depth = -view_position.z;
    return output;
}

@fragment
fn fs_main(input: VertexOutput) -> GBufferOutput {
    let sprite = textureSample(sprite_map, sprite_sampler, input.uv);
    if sprite.a < 0.5 {
        discard;
    }
    var output: GBufferOutput;
    output.color = vec4<f32>(sprite.rgb, 0.0);
    output.normal = vec4<f32>(0.5, 0.5, 1.0, 0.0);
    // billboards are self-lit through the emissive pass
    output.depth = vec4<f32>(input.view_depth / params.far_plane.x, 1.0, 0.0, 0.0);
    return output;
}
"#;

struct GeometryEffect {
    effect: Effect,
    world: Param,
    view: Param,
    projection: Param,
    far_plane: Param,
    specular_intensity: Param,
    specular_power: Param,
    texture: Param,
}

impl GeometryEffect {
    fn new(backend: &mut dyn GraphicsBackend) -> RenderResult<Self> {
        let desc = effect::mesh_effect(
            "RenderGBuffer",
            &format!("{}{}", GBUFFER_OUTPUT_WGSL, RENDER_GBUFFER_WGSL),
            Vertex::layout(),
            vec![
                effect::mat4("World"),
                effect::mat4("View"),
                effect::mat4("Projection"),
                effect::float("FarPlane"),
                effect::float("SpecularIntensity"),
                effect::float("SpecularPower"),
                effect::texture("Texture"),
            ],
        );
        let effect = Effect::create(backend, &desc)?;
        Ok(Self {
            world: effect.parameter(backend, "World")?,
            view: effect.parameter(backend, "View")?,
            projection: effect.parameter(backend, "Projection")?,
            far_plane: effect.parameter(backend, "FarPlane")?,
            specular_intensity: effect.parameter(backend, "SpecularIntensity")?,
            specular_power: effect.parameter(backend, "SpecularPower")?,
            texture: effect.parameter(backend, "Texture")?,
            effect,
        })
    }
}

struct BillboardEffect {
    effect: Effect,
    view: Param,
    projection: Param,
    position: Param,
    size: Param,
    camera_right: Param,
    camera_up: Param,
    far_plane: Param,
    texture: Param,
}

impl BillboardEffect {
    fn new(backend: &mut dyn GraphicsBackend) -> RenderResult<Self> {
        let desc = effect::mesh_effect(
            "Billboard",
            &format!("{}{}", GBUFFER_OUTPUT_WGSL, BILLBOARD_WGSL),
            VertexPositionTexture::layout(),
            vec![
                effect::mat4("View"),
                effect::mat4("Projection"),
                effect::vec3("Position"),
                effect::vec2("Size"),
                effect::vec3("CameraRight"),
                effect::vec3("CameraUp"),
                effect::float("FarPlane"),
                effect::texture("Texture"),
            ],
        );
        let effect = Effect::create(backend, &desc)?;
        Ok(Self {
            view: effect.parameter(backend, "View")?,
            projection: effect.parameter(backend, "Projection")?,
            position: effect.parameter(backend, "Position")?,
            size: effect.parameter(backend, "Size")?,
            camera_right: effect.parameter(backend, "CameraRight")?,
            camera_up: effect.parameter(backend, "CameraUp")?,
            far_plane: effect.parameter(backend, "FarPlane")?,
            texture: effect.parameter(backend, "Texture")?,
            effect,
        })
    }
}

/// Draws batched scene geometry and billboards into the bound G-buffer
pub struct GeometryRenderer {
    geometry: GeometryEffect,
    billboard: BillboardEffect,
}

impl GeometryRenderer {
    pub fn new(backend: &mut dyn GraphicsBackend) -> RenderResult<Self> {
        Ok(Self {
            geometry: GeometryEffect::new(backend)?,
            billboard: BillboardEffect::new(backend)?,
        })
    }

    /// One texture bind per non-empty batch, one draw per item. Returns the draw count.
    pub fn draw_batches(
        &self,
        backend: &mut dyn GraphicsBackend,
        batches: &BatchRegistry,
        textures: &dyn TextureResolver,
        camera: &Camera,
    ) -> usize {
        let effect = &self.geometry;
        let mut draws = 0;
        let mut bound = false;

        for (key, batch) in batches.iter() {
            let Some(texture) = textures.resolve(key) else {
                log::warn!("Texture {:?} not resolved, skipping {} items", key, batch.len());
                continue;
            };

            if !bound {
                backend.apply_render_state(RenderState::GEOMETRY);
                effect.effect.bind(backend);
                effect.view.set_mat4(backend, camera.view_matrix());
                effect.projection.set_mat4(backend, camera.projection_matrix());
                effect.far_plane.set_float(backend, camera.far());
                effect.specular_intensity.set_float(backend, SPECULAR_INTENSITY);
                effect.specular_power.set_float(backend, SPECULAR_POWER);
                bound = true;
            }

            effect.texture.set_texture(backend, texture);
            for item in batch {
                effect.world.set_mat4(backend, item.world);
                backend.set_vertex_buffer(item.vertex_buffer);
                match item.index_buffer {
                    Some(indices) => {
                        backend.set_index_buffer(indices, IndexFormat::Uint32);
                        backend.draw_indexed(item.range(), 0);
                    }
                    None => backend.draw(item.range()),
                }
                draws += 1;
            }
        }

        draws
    }

    /// Camera-facing quads, expanded in the vertex stage from the shared quad
    pub fn draw_billboards(
        &self,
        backend: &mut dyn GraphicsBackend,
        quad: &FullscreenQuad,
        billboards: &BoundedQueue<Billboard>,
        textures: &dyn TextureResolver,
        camera: &Camera,
    ) -> usize {
        if billboards.is_empty() {
            return 0;
        }

        let effect = &self.billboard;
        backend.apply_render_state(RenderState {
            cull: CullMode::None,
            sampler: SamplerMode::LinearClamp,
            ..RenderState::GEOMETRY
        });
        effect.effect.bind(backend);
        effect.view.set_mat4(backend, camera.view_matrix());
        effect.projection.set_mat4(backend, camera.projection_matrix());
        effect.camera_right.set_vec3(backend, camera.right());
        effect.camera_up.set_vec3(backend, camera.up_vector());
        effect.far_plane.set_float(backend, camera.far());

        let mut draws = 0;
        for billboard in billboards {
            let Some(texture) = textures.resolve(billboard.texture) else {
                log::warn!("Billboard texture {:?} not resolved", billboard.texture);
                continue;
            };
            effect.texture.set_texture(backend, texture);
            effect.position.set_vec3(backend, billboard.position);
            effect.size.set_vec2(backend, billboard.size);
            quad.draw(backend);
            draws += 1;
        }
        draws
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BufferHandle, RecordedCall, RecordingBackend, TextureHandle};
    use crate::scene::{BatchItem, TextureKey, TextureRegistry};
    use glam::{Mat4, Vec2, Vec3};

    fn item(indexed: bool) -> BatchItem {
        BatchItem {
            world: Mat4::IDENTITY,
            vertex_buffer: BufferHandle(100),
            index_buffer: indexed.then_some(BufferHandle(101)),
            start_index: 0,
            primitive_count: 2,
        }
    }

    fn setup() -> (RecordingBackend, GeometryRenderer) {
        let mut backend = RecordingBackend::new(64, 64);
        let renderer = GeometryRenderer::new(&mut backend).unwrap();
        backend.clear_calls();
        (backend, renderer)
    }

    #[test]
    fn test_texture_bound_once_per_batch() {
        let (mut backend, renderer) = setup();
        let mut batches = BatchRegistry::new();
        let mut textures = TextureRegistry::new();
        textures.insert(TextureKey(1), TextureHandle(50));
        textures.insert(TextureKey(2), TextureHandle(51));
        batches.add_item(TextureKey(1), item(true));
        batches.add_item(TextureKey(1), item(false));
        batches.add_item(TextureKey(2), item(true));

        let draws = renderer.draw_batches(&mut backend, &batches, &textures, &Camera::default());

        assert_eq!(draws, 3);
        let texture_sets = backend
            .calls()
            .iter()
            .filter(|c| matches!(c, RecordedCall::SetParameter { name: "Texture", .. }))
            .count();
        assert_eq!(texture_sets, 2);
        assert!(backend.calls().contains(&RecordedCall::Draw { vertices: 0..6 }));
        assert!(backend.calls().contains(&RecordedCall::DrawIndexed {
            indices: 0..6,
            base_vertex: 0
        }));
    }

    #[test]
    fn test_unresolved_texture_skipped() {
        let (mut backend, renderer) = setup();
        let mut batches = BatchRegistry::new();
        batches.add_item(TextureKey(9), item(true));

        let draws = renderer.draw_batches(&mut backend, &batches, &TextureRegistry::new(), &Camera::default());
        assert_eq!(draws, 0);
        assert_eq!(backend.draw_count(), 0);
    }

    #[test]
    fn test_cleared_batches_draw_nothing() {
        let (mut backend, renderer) = setup();
        let mut batches = BatchRegistry::new();
        let mut textures = TextureRegistry::new();
        textures.insert(TextureKey(1), TextureHandle(50));
        batches.add_item(TextureKey(1), item(true));
        batches.clear_batches();

        renderer.draw_batches(&mut backend, &batches, &textures, &Camera::default());
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_billboards_drawn_with_quad() {
        let (mut backend, renderer) = setup();
        let quad = FullscreenQuad::new(&mut backend).unwrap();
        let mut textures = TextureRegistry::new();
        textures.insert(TextureKey(3), TextureHandle(60));
        let mut billboards = BoundedQueue::with_capacity(4);
        billboards.push(Billboard {
            texture: TextureKey(3),
            position: Vec3::ZERO,
            size: Vec2::ONE,
        });
        billboards.push(Billboard {
            texture: TextureKey(4),
            position: Vec3::ONE,
            size: Vec2::ONE,
        });

        let draws = renderer.draw_billboards(&mut backend, &quad, &billboards, &textures, &Camera::default());
        assert_eq!(draws, 1);
        assert_eq!(backend.draw_count(), 1);
    }
}
