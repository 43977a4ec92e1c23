//! Light descriptors submitted to the renderer each frame

use glam::{Vec3, Vec4};

/// Opaque reference to whoever submitted a light
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LightOwner(pub u64);

/// A light submitted for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Light {
    /// Folded into the ambient term, never queued
    Ambient { color: Vec4, intensity: f32 },
    Directional {
        direction: Vec3,
        color: Vec4,
        intensity: f32,
    },
    Point {
        position: Vec3,
        color: Vec4,
        intensity: f32,
        radius: f32,
    },
    Spot {
        position: Vec3,
        direction: Vec3,
        color: Vec4,
        intensity: f32,
        radius: f32,
        /// Inner cone half-angle in radians
        inner_angle: f32,
        /// Outer cone half-angle in radians
        outer_angle: f32,
    },
}

impl Light {
    pub fn ambient(color: Vec4, intensity: f32) -> Self {
        Light::Ambient { color, intensity }
    }

    pub fn directional(direction: Vec3, color: Vec4, intensity: f32) -> Self {
        Light::Directional {
            direction: direction.normalize_or_zero(),
            color,
            intensity,
        }
    }

    pub fn point(position: Vec3, color: Vec4, intensity: f32, radius: f32) -> Self {
        Light::Point {
            position,
            color,
            intensity,
            radius,
        }
    }

    pub fn spot(
        position: Vec3,
        direction: Vec3,
        color: Vec4,
        intensity: f32,
        radius: f32,
        inner_angle: f32,
        outer_angle: f32,
    ) -> Self {
        Light::Spot {
            position,
            direction: direction.normalize_or_zero(),
            color,
            intensity,
            radius,
            inner_angle,
            outer_angle,
        }
    }

    pub fn kind(&self) -> LightKind {
        match self {
            Light::Ambient { .. } => LightKind::Ambient,
            Light::Directional { .. } => LightKind::Directional,
            Light::Point { .. } => LightKind::Point,
            Light::Spot { .. } => LightKind::Spot,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightKind {
    Ambient,
    Directional,
    Point,
    Spot,
}

/// Directional light as stored in its queue
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub color: Vec4,
    pub intensity: f32,
    pub owner: LightOwner,
}

/// Point light as stored in its queue
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Vec4,
    pub intensity: f32,
    pub radius: f32,
    pub owner: LightOwner,
}

/// Spot light as stored in its queue
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotLight {
    pub position: Vec3,
    pub direction: Vec3,
    pub color: Vec4,
    pub intensity: f32,
    pub radius: f32,
    pub inner_angle: f32,
    pub outer_angle: f32,
    pub owner: LightOwner,
}

impl SpotLight {
    /// Cosines of the inner and outer cone angles, as consumed by the spot effect
    pub fn cone_cosines(&self) -> (f32, f32) {
        (self.inner_angle.cos(), self.outer_angle.cos())
    }
}

/// Add `color * intensity` to an ambient accumulator, keeping alpha in `[0, 1]`
pub fn fold_ambient(sum: Vec4, color: Vec4, intensity: f32) -> Vec4 {
    let mut out = sum + color * intensity;
    out.w = out.w.clamp(0.0, 1.0);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_ambient_clamps_alpha() {
        let color = Vec4::new(0.2, 0.4, 0.6, 1.0);
        let sum = fold_ambient(Vec4::ZERO, color, 0.5);
        let sum = fold_ambient(sum, color, 0.7);

        assert!((sum.truncate() - color.truncate() * 1.2).length() < 1e-6);
        assert_eq!(sum.w, 1.0);
    }

    #[test]
    fn test_constructors_normalize_direction() {
        let light = Light::directional(Vec3::new(0.0, -2.0, 0.0), Vec4::ONE, 1.0);
        match light {
            Light::Directional { direction, .. } => assert_eq!(direction, Vec3::NEG_Y),
            _ => unreachable!(),
        }
        assert_eq!(light.kind(), LightKind::Directional);
    }
}
