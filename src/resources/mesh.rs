//! Procedural mesh generation

use crate::backend::types::Vertex;
use crate::scene::BoundingSphere;
use glam::{Vec2, Vec3, Vec4};

/// A mesh with vertex and index data
#[derive(Debug, Clone)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub name: String,
}

impl Mesh {
    pub fn new(name: &str) -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
            name: name.to_string(),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Get vertex data as bytes
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Get index data as bytes
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Sphere around the origin enclosing every vertex
    pub fn bounds(&self) -> BoundingSphere {
        let radius = self
            .vertices
            .iter()
            .map(|v| v.position.length())
            .fold(0.0, f32::max);
        BoundingSphere::new(Vec3::ZERO, radius)
    }

    fn push(&mut self, position: Vec3, normal: Vec3, uv: Vec2, tangent: Vec4) {
        self.vertices.push(Vertex {
            position,
            normal,
            uv,
            tangent,
        });
    }

    /// Two triangles for every cell of a `columns` x `rows` vertex grid.
    ///
    /// `flip` reverses the winding so the front face stays counter-clockwise when
    /// rows advance clockwise around the surface.
    fn grid_indices(&mut self, columns: u32, rows: u32, flip: bool) {
        for row in 0..rows {
            for column in 0..columns {
                let current = row * (columns + 1) + column;
                let next = current + columns + 1;
                let cell = if flip {
                    [current, current + 1, next, current + 1, next + 1, next]
                } else {
                    [current, next, current + 1, current + 1, next, next + 1]
                };
                self.indices.extend_from_slice(&cell);
            }
        }
    }

    /// Unit cube centered at the origin
    pub fn cube() -> Self {
        let mut mesh = Mesh::new("cube");

        let faces = [
            (Vec3::Z, Vec3::X),
            (Vec3::NEG_Z, Vec3::NEG_X),
            (Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_X, Vec3::Z),
            (Vec3::Y, Vec3::X),
            (Vec3::NEG_Y, Vec3::X),
        ];

        for (normal, right) in faces {
            let up = normal.cross(right);
            let base = mesh.vertices.len() as u32;
            let corners = [
                (-0.5, -0.5, Vec2::new(0.0, 1.0)),
                (0.5, -0.5, Vec2::new(1.0, 1.0)),
                (0.5, 0.5, Vec2::new(1.0, 0.0)),
                (-0.5, 0.5, Vec2::new(0.0, 0.0)),
            ];
            for (x, y, uv) in corners {
                let position = normal * 0.5 + right * x + up * y;
                mesh.push(position, normal, uv, right.extend(1.0));
            }
            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        mesh
    }

    /// UV sphere of the given radius, used as the point and spot light volume
    pub fn sphere(radius: f32, segments: u32, rings: u32) -> Self {
        let mut mesh = Mesh::new("sphere");
        let segments = segments.max(3);
        let rings = rings.max(2);

        let segment_angle = std::f32::consts::TAU / segments as f32;
        let ring_angle = std::f32::consts::PI / rings as f32;

        for ring in 0..=rings {
            let phi = ring as f32 * ring_angle;
            for segment in 0..=segments {
                let theta = segment as f32 * segment_angle;
                let normal = Vec3::new(phi.sin() * theta.cos(), phi.cos(), phi.sin() * theta.sin());
                let uv = Vec2::new(
                    segment as f32 / segments as f32,
                    ring as f32 / rings as f32,
                );
                let tangent = Vec4::new(-theta.sin(), 0.0, theta.cos(), 1.0);
                mesh.push(normal * radius, normal, uv, tangent);
            }
        }

        mesh.grid_indices(segments, rings, true);
        mesh
    }

    /// Plane on the XZ axis
    pub fn plane(width: f32, depth: f32, subdivisions: u32) -> Self {
        let mut mesh = Mesh::new("plane");
        let subdivisions = subdivisions.max(1);

        for z in 0..=subdivisions {
            for x in 0..=subdivisions {
                let u = x as f32 / subdivisions as f32;
                let v = z as f32 / subdivisions as f32;
                mesh.push(
                    Vec3::new((u - 0.5) * width, 0.0, (v - 0.5) * depth),
                    Vec3::Y,
                    Vec2::new(u, v),
                    Vec4::new(1.0, 0.0, 0.0, 1.0),
                );
            }
        }

        mesh.grid_indices(subdivisions, subdivisions, false);
        mesh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_counts() {
        let cube = Mesh::cube();
        assert_eq!(cube.vertex_count(), 24);
        assert_eq!(cube.triangle_count(), 12);
        assert!(cube.indices.iter().all(|&i| (i as usize) < cube.vertex_count()));
    }

    #[test]
    fn test_sphere_radius_and_bounds() {
        let sphere = Mesh::sphere(1.0, 16, 8);
        assert_eq!(sphere.vertex_count(), 17 * 9);
        assert_eq!(sphere.triangle_count(), 16 * 8 * 2);
        assert!((sphere.bounds().radius - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_sphere_faces_outward() {
        let sphere = Mesh::sphere(1.0, 8, 4);
        // first triangle of the second ring band
        let base = 8 * 6;
        let [a, b, c] = [0, 1, 2].map(|i| sphere.vertices[sphere.indices[base + i] as usize].position);
        let normal = (b - a).cross(c - a);
        assert!(normal.dot(a + b + c) > 0.0);
    }

    #[test]
    fn test_plane_is_flat() {
        let plane = Mesh::plane(10.0, 4.0, 2);
        assert_eq!(plane.vertex_count(), 9);
        assert!(plane.vertices.iter().all(|v| v.position.y == 0.0));
        assert_eq!(plane.vertices[0].position, Vec3::new(-5.0, 0.0, -2.0));
    }
}
