//! Texture decoding, mip chain generation and GPU texture wrappers.

use image::imageops::FilterType;
use image::RgbaImage;

/// How texel values are interpreted when sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorSpace {
    /// Colour data authored in sRGB (albedo, emission).
    Srgb,
    /// Data maps (bump, specular, masks).
    #[default]
    Linear,
}

/// Edge addressing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Wrap {
    #[default]
    ClampToEdge,
    Repeat,
}

/// Sampling options applied when a texture is uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureOptions {
    pub generate_mipmaps: bool,
    /// Requested anisotropy; the backend clamps it to its own capability.
    pub anisotropy: u16,
    pub wrap: Wrap,
}

impl Default for TextureOptions {
    fn default() -> Self {
        Self {
            generate_mipmaps: true,
            anisotropy: 1,
            wrap: Wrap::ClampToEdge,
        }
    }
}

/// Decoded RGBA8 image tagged with its colour space.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    pub color_space: ColorSpace,
}

impl TextureImage {
    /// Decode PNG/JPEG bytes.
    pub fn decode(bytes: &[u8], color_space: ColorSpace) -> Result<Self, image::ImageError> {
        let rgba = image::load_from_memory(bytes)?.to_rgba8();
        Ok(Self::from_rgba(rgba, color_space))
    }

    pub fn from_rgba(rgba: RgbaImage, color_space: ColorSpace) -> Self {
        let (width, height) = rgba.dimensions();
        Self {
            width,
            height,
            pixels: rgba.into_raw(),
            color_space,
        }
    }

    /// Single-colour texture.
    pub fn solid(rgba: [u8; 4], color_space: ColorSpace) -> Self {
        Self {
            width: 1,
            height: 1,
            pixels: rgba.to_vec(),
            color_space,
        }
    }

    /// Number of levels in a full mip chain down to 1×1.
    pub fn mip_level_count(&self) -> u32 {
        32 - self.width.max(self.height).max(1).leading_zeros()
    }

    /// Full mip chain, level 0 first. Each level halves the previous one (min 1 texel).
    pub fn mip_chain(&self) -> Vec<(u32, u32, Vec<u8>)> {
        let mut levels = vec![(self.width, self.height, self.pixels.clone())];
        let Some(base) = RgbaImage::from_raw(self.width, self.height, self.pixels.clone()) else {
            return levels;
        };
        let mut previous = base;
        for _ in 1..self.mip_level_count() {
            let w = (previous.width() / 2).max(1);
            let h = (previous.height() / 2).max(1);
            let next = image::imageops::resize(&previous, w, h, FilterType::Triangle);
            levels.push((w, h, next.as_raw().clone()));
            previous = next;
        }
        levels
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        match self.color_space {
            ColorSpace::Srgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            ColorSpace::Linear => wgpu::TextureFormat::Rgba8Unorm,
        }
    }
}

/// GPU texture with its view and sampler.
pub struct Texture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
}

impl Texture {
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    /// Upload an image, generating mips on the CPU if requested.
    /// `max_anisotropy` is the device limit the requested level is clamped to.
    pub fn from_image(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        image: &TextureImage,
        options: TextureOptions,
        max_anisotropy: u16,
        label: &str,
    ) -> Self {
        let levels = if options.generate_mipmaps {
            image.mip_chain()
        } else {
            vec![(image.width, image.height, image.pixels.clone())]
        };

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: image.width.max(1),
                height: image.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: levels.len() as u32,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: image.format(),
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        for (level, (width, height, pixels)) in levels.iter().enumerate() {
            queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &texture,
                    mip_level: level as u32,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                pixels,
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * width),
                    rows_per_image: Some(*height),
                },
                wgpu::Extent3d {
                    width: *width,
                    height: *height,
                    depth_or_array_layers: 1,
                },
            );
        }

        let address_mode = match options.wrap {
            Wrap::ClampToEdge => wgpu::AddressMode::ClampToEdge,
            Wrap::Repeat => wgpu::AddressMode::Repeat,
        };
        let mipmapped = levels.len() > 1;
        // Anisotropic filtering requires all filters to be linear.
        let anisotropy_clamp = if mipmapped {
            options.anisotropy.clamp(1, max_anisotropy.max(1))
        } else {
            1
        };
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(label),
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            address_mode_w: address_mode,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: if mipmapped { wgpu::FilterMode::Linear } else { wgpu::FilterMode::Nearest },
            anisotropy_clamp,
            ..Default::default()
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view, sampler }
    }

    /// 1×1 placeholder bound where a material channel is absent.
    pub fn solid(device: &wgpu::Device, queue: &wgpu::Queue, rgba: [u8; 4], label: &str) -> Self {
        let image = TextureImage::solid(rgba, ColorSpace::Linear);
        let options = TextureOptions {
            generate_mipmaps: false,
            ..Default::default()
        };
        Self::from_image(device, queue, &image, options, 1, label)
    }

    pub fn create_depth_texture(device: &wgpu::Device, width: u32, height: u32, label: &str) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(label),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        Self { texture, view, sampler }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_level_count_for_non_square() {
        let image = TextureImage {
            width: 256,
            height: 64,
            pixels: vec![0; 256 * 64 * 4],
            color_space: ColorSpace::Linear,
        };
        assert_eq!(image.mip_level_count(), 9);
        let chain = image.mip_chain();
        assert_eq!(chain.len(), 9);
        assert_eq!((chain[1].0, chain[1].1), (128, 32));
        assert_eq!((chain[8].0, chain[8].1), (1, 1));
        for (w, h, pixels) in &chain {
            assert_eq!(pixels.len(), (w * h * 4) as usize);
        }
    }

    #[test]
    fn decode_png_keeps_color_space() {
        let mut bytes = Vec::new();
        let rgba = RgbaImage::from_pixel(4, 2, image::Rgba([10, 20, 30, 255]));
        rgba.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        let decoded = TextureImage::decode(&bytes, ColorSpace::Srgb).unwrap();
        assert_eq!((decoded.width, decoded.height), (4, 2));
        assert_eq!(&decoded.pixels[..4], &[10, 20, 30, 255]);
        assert_eq!(decoded.format(), wgpu::TextureFormat::Rgba8UnormSrgb);
    }

    #[test]
    fn decode_garbage_fails() {
        assert!(TextureImage::decode(b"not an image", ColorSpace::Linear).is_err());
    }
}
