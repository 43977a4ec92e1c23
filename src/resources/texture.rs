//! Procedural texture data and upload

use crate::backend::traits::*;
use crate::backend::types::*;

/// CPU-side RGBA8 texture data
#[derive(Debug, Clone)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub data: Vec<u8>,
    pub name: String,
}

impl TextureData {
    /// Create a solid color texture
    pub fn solid_color(color: [u8; 4], name: &str) -> Self {
        Self {
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8UnormSrgb,
            data: color.to_vec(),
            name: name.to_string(),
        }
    }

    pub fn white() -> Self {
        Self::solid_color([255, 255, 255, 255], "white")
    }

    /// Create a checkerboard texture with 8x8 pixel cells
    pub fn checkerboard(size: u32, color1: [u8; 4], color2: [u8; 4]) -> Self {
        let data = (0..size * size)
            .flat_map(|i| {
                let (x, y) = (i % size, i / size);
                if ((x / 8) + (y / 8)) % 2 == 0 {
                    color1
                } else {
                    color2
                }
            })
            .collect();

        Self {
            width: size,
            height: size,
            format: TextureFormat::Rgba8UnormSrgb,
            data,
            name: "checkerboard".to_string(),
        }
    }

    /// Radial falloff sprite, opaque in the center, used for billboards
    pub fn radial(size: u32, color: [u8; 3]) -> Self {
        let half = size as f32 / 2.0;
        let data = (0..size * size)
            .flat_map(|i| {
                let dx = (i % size) as f32 + 0.5 - half;
                let dy = (i / size) as f32 + 0.5 - half;
                let falloff = (1.0 - (dx * dx + dy * dy).sqrt() / half).clamp(0.0, 1.0);
                [color[0], color[1], color[2], (falloff * 255.0) as u8]
            })
            .collect();

        Self {
            width: size,
            height: size,
            format: TextureFormat::Rgba8UnormSrgb,
            data,
            name: "radial".to_string(),
        }
    }

    /// Create the GPU texture and upload the pixels
    pub fn upload(&self, backend: &mut dyn GraphicsBackend) -> BackendResult<TextureHandle> {
        let handle = backend.create_texture(&TextureDescriptor {
            label: Some(self.name.clone()),
            width: self.width,
            height: self.height,
            format: self.format,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        })?;
        backend.write_texture(handle, &self.data, self.width, self.height);
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;

    #[test]
    fn test_checkerboard_alternates_cells() {
        let tex = TextureData::checkerboard(16, [255; 4], [0, 0, 0, 255]);
        assert_eq!(tex.data.len(), 16 * 16 * 4);
        assert_eq!(&tex.data[0..4], &[255; 4]);
        let second_cell = (8 * 4) as usize;
        assert_eq!(&tex.data[second_cell..second_cell + 4], &[0, 0, 0, 255]);
    }

    #[test]
    fn test_radial_fades_to_edges() {
        let tex = TextureData::radial(8, [255, 255, 255]);
        let center = ((4 * 8 + 4) * 4 + 3) as usize;
        assert!(tex.data[center] > 200);
        assert_eq!(tex.data[3], 0);
    }

    #[test]
    fn test_upload_creates_sized_texture() {
        let mut backend = RecordingBackend::new(64, 64);
        let handle = TextureData::white().upload(&mut backend).unwrap();
        assert_eq!(backend.texture_size(handle), Some((1, 1)));
    }
}
