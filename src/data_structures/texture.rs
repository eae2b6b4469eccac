//! Decoded textures and their GPU counterparts.
//!
//! This module provides [`Texture`] (a decoded 2D image) and [`CubeTexture`]
//! (six square faces), the two texture kinds the resource cache hands out.
//! Both keep their pixels on the CPU and create GPU resources lazily through
//! `upload`; [`Dispose::dispose`] releases whatever was uploaded.

use std::cell::RefCell;

use anyhow::*;
use image::RgbaImage;

/// Release hook for resources that own GPU memory.
pub trait Dispose {
    fn dispose(&self);
}

/// A GPU texture with its default view and sampler.
#[derive(Clone, Debug)]
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
}

/// How a texture is mapped onto geometry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CoordinatesMode {
    /// Regular uv lookup.
    #[default]
    Explicit,
    /// Direction lookup from an infinitely distant box.
    Skybox,
}

/// A decoded 2D texture in RGBA8.
#[derive(Debug)]
pub struct Texture {
    pub name: String,
    pub image: RgbaImage,
    gpu: RefCell<Option<GpuTexture>>,
}

/// The order of cube faces everywhere in this crate: +X, +Y, +Z, -X, -Y, -Z.
pub const CUBE_FACE_SUFFIXES: [&str; 6] = ["_px", "_py", "_pz", "_nx", "_ny", "_nz"];

/// Six square RGBA8 faces in [`CUBE_FACE_SUFFIXES`] order.
#[derive(Debug)]
pub struct CubeTexture {
    pub name: String,
    pub faces: [RgbaImage; 6],
    pub coordinates_mode: CoordinatesMode,
    gpu: RefCell<Option<GpuTexture>>,
}

// Clones carry the pixels only; each clone uploads its own GPU texture.
impl Clone for Texture {
    fn clone(&self) -> Self {
        Self::new(self.name.clone(), self.image.clone())
    }
}

impl Clone for CubeTexture {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            faces: self.faces.clone(),
            coordinates_mode: self.coordinates_mode,
            gpu: RefCell::new(None),
        }
    }
}

impl Texture {
    pub fn new(name: impl Into<String>, image: RgbaImage) -> Self {
        Self {
            name: name.into(),
            image,
            gpu: RefCell::new(None),
        }
    }

    /// Decode raw image file contents (PNG, JPEG, ...).
    ///
    /// The format is detected from the data. `format` is an extension hint
    /// (e.g. "tga") for formats without a signature.
    pub fn from_bytes(name: &str, bytes: &[u8], format: Option<&str>) -> Result<Self> {
        let fmt = image::guess_format(bytes)
            .ok()
            .or_else(|| format.and_then(image::ImageFormat::from_extension))
            .with_context(|| format!("{name}: unknown image format"))?;
        let img = image::load_from_memory_with_format(bytes, fmt)
            .with_context(|| format!("{name}: could not decode {fmt:?} image"))?;
        Ok(Self::from_image(name, &img))
    }

    pub fn from_image(name: &str, img: &image::DynamicImage) -> Self {
        Self::new(name, img.to_rgba8())
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Decoded size in bytes.
    pub fn byte_size(&self) -> usize {
        self.image.as_raw().len()
    }

    pub fn is_uploaded(&self) -> bool {
        self.gpu.borrow().is_some()
    }

    /// Create (once) and return the GPU texture for this image.
    ///
    /// `is_linear` toggles between sRGB (false) and linear (true) color space,
    /// the latter being what normal maps need.
    pub fn upload(&self, device: &wgpu::Device, queue: &wgpu::Queue, is_linear: bool) -> GpuTexture {
        if let Some(gpu) = self.gpu.borrow().as_ref() {
            return gpu.clone();
        }
        let dimensions = self.image.dimensions();
        let size = wgpu::Extent3d {
            width: dimensions.0,
            height: dimensions.1,
            depth_or_array_layers: 1,
        };
        let format = if is_linear {
            wgpu::TextureFormat::Rgba8Unorm
        } else {
            wgpu::TextureFormat::Rgba8UnormSrgb
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(self.name.as_str()),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            self.image.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * dimensions.0),
                rows_per_image: Some(dimensions.1),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let gpu = GpuTexture {
            texture,
            view,
            sampler: create_default_sampler(device),
        };
        *self.gpu.borrow_mut() = Some(gpu.clone());
        gpu
    }
}

impl Dispose for Texture {
    fn dispose(&self) {
        if let Some(gpu) = self.gpu.borrow_mut().take() {
            log::debug!("destroying GPU texture {}", self.name);
            gpu.texture.destroy();
        }
    }
}

impl CubeTexture {
    /// Build from six faces in [`CUBE_FACE_SUFFIXES`] order.
    ///
    /// Every face must be square and all faces must share one size.
    pub fn new(name: impl Into<String>, faces: [RgbaImage; 6]) -> Result<Self> {
        let name = name.into();
        let (width, height) = faces[0].dimensions();
        ensure!(
            width == height && width > 0,
            "cube texture {name}: face {} is {width}x{height}, faces must be square",
            CUBE_FACE_SUFFIXES[0]
        );
        for (face, suffix) in faces.iter().zip(CUBE_FACE_SUFFIXES) {
            if face.dimensions() != (width, height) {
                return Err(crate::resources::ResourceError::CubeFaceMismatch {
                    name,
                    face: suffix,
                    expected: width,
                    actual: face.dimensions(),
                }
                .into());
            }
        }
        Ok(Self {
            name,
            faces,
            coordinates_mode: CoordinatesMode::default(),
            gpu: RefCell::new(None),
        })
    }

    /// Edge length of every face.
    pub fn size(&self) -> u32 {
        self.faces[0].width()
    }

    pub fn byte_size(&self) -> usize {
        self.faces.iter().map(|face| face.as_raw().len()).sum()
    }

    pub fn is_uploaded(&self) -> bool {
        self.gpu.borrow().is_some()
    }

    /// Create (once) and return a six-layer GPU texture with a cube view.
    pub fn upload(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> GpuTexture {
        if let Some(gpu) = self.gpu.borrow().as_ref() {
            return gpu.clone();
        }
        let edge = self.size();
        let size = wgpu::Extent3d {
            width: edge,
            height: edge,
            depth_or_array_layers: 6,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(self.name.as_str()),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        for (layer, face) in self.faces.iter().enumerate() {
            queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    aspect: wgpu::TextureAspect::All,
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d {
                        x: 0,
                        y: 0,
                        z: layer as u32,
                    },
                },
                face.as_raw(),
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * edge),
                    rows_per_image: Some(edge),
                },
                wgpu::Extent3d {
                    width: edge,
                    height: edge,
                    depth_or_array_layers: 1,
                },
            );
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(self.name.as_str()),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        });
        let gpu = GpuTexture {
            texture,
            view,
            sampler: create_default_sampler(device),
        };
        *self.gpu.borrow_mut() = Some(gpu.clone());
        gpu
    }
}

impl Dispose for CubeTexture {
    fn dispose(&self) {
        if let Some(gpu) = self.gpu.borrow_mut().take() {
            log::debug!("destroying GPU cube texture {}", self.name);
            gpu.texture.destroy();
        }
    }
}

/// Sample `img` at normalized coordinates with bilinear filtering and
/// horizontal wrap-around.
pub fn sample_bilinear(img: &RgbaImage, u: f32, v: f32) -> image::Rgba<u8> {
    let (width, height) = img.dimensions();
    let x = u.rem_euclid(1.0) * width as f32 - 0.5;
    let y = (v.clamp(0.0, 1.0) * height as f32 - 0.5).clamp(0.0, (height - 1) as f32);
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let wrap_x = |x: f32| (x as i64).rem_euclid(width as i64) as u32;
    let x0i = wrap_x(x0);
    let x1i = wrap_x(x0 + 1.0);
    let y0i = y0 as u32;
    let y1i = (y0i + 1).min(height - 1);

    let p00 = img.get_pixel(x0i, y0i).0;
    let p10 = img.get_pixel(x1i, y0i).0;
    let p01 = img.get_pixel(x0i, y1i).0;
    let p11 = img.get_pixel(x1i, y1i).0;
    let mut out = [0u8; 4];
    for channel in 0..4 {
        let top = p00[channel] as f32 * (1.0 - fx) + p10[channel] as f32 * fx;
        let bottom = p01[channel] as f32 * (1.0 - fx) + p11[channel] as f32 * fx;
        out[channel] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    image::Rgba(out)
}

pub fn create_default_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::Repeat,
        address_mode_w: wgpu::AddressMode::Repeat,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::MipmapFilterMode::Linear,
        ..Default::default()
    })
}
