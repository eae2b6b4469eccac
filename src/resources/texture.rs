use std::f32::consts::PI;

use image::RgbaImage;

use crate::{
    data_structures::texture::{CUBE_FACE_SUFFIXES, CubeTexture, Texture, sample_bilinear},
    resources::{FileLoader, ProgressFn, TransferProgress, extension},
};

pub async fn load_texture(
    loader: &FileLoader,
    url: &str,
    progress: ProgressFn<'_>,
) -> anyhow::Result<Texture> {
    let data = loader.load_binary(url, progress).await?;
    Texture::from_bytes(url, &data, extension(url).as_deref())
}

/// Load the six faces `{url}_px.{ext}` .. `{url}_nz.{ext}`.
///
/// `url` is usually a directory prefix such as `skybox/`. Face transfers are
/// not individually measurable, so progress only carries the byte count.
pub async fn load_cube_texture(
    loader: &FileLoader,
    url: &str,
    face_extension: &str,
    progress: ProgressFn<'_>,
) -> anyhow::Result<CubeTexture> {
    let face_extension = face_extension.trim_start_matches('.');
    let mut received = 0u64;
    let mut faces = Vec::with_capacity(CUBE_FACE_SUFFIXES.len());
    for suffix in CUBE_FACE_SUFFIXES {
        let face_url = format!("{url}{suffix}.{face_extension}");
        let mut face_bytes = 0u64;
        let data = loader
            .load_binary(&face_url, &mut |p: TransferProgress| {
                face_bytes = p.loaded;
                progress(TransferProgress {
                    loaded: received + p.loaded,
                    total: None,
                });
            })
            .await?;
        received += face_bytes;
        let face = image::load_from_memory(&data)
            .map_err(|err| anyhow::anyhow!("cube face {face_url}: {err}"))?;
        faces.push(face.to_rgba8());
    }
    let faces: [RgbaImage; 6] = faces
        .try_into()
        .map_err(|_| anyhow::anyhow!("cube texture {url}: expected six faces"))?;
    CubeTexture::new(url, faces)
}

/// Load one equirectangular panorama and project it onto six cube faces of
/// `face_size` pixels.
pub async fn load_equirectangular_cube_texture(
    loader: &FileLoader,
    url: &str,
    face_size: u32,
    progress: ProgressFn<'_>,
) -> anyhow::Result<CubeTexture> {
    let data = loader.load_binary(url, progress).await?;
    let panorama = Texture::from_bytes(url, &data, extension(url).as_deref())?;
    equirect_to_cube(url, &panorama.image, face_size)
}

/// Project a 2:1 longitude/latitude panorama onto the six faces of a cube.
pub fn equirect_to_cube(name: &str, panorama: &RgbaImage, face_size: u32) -> anyhow::Result<CubeTexture> {
    anyhow::ensure!(face_size > 0, "cube face size must be positive");
    anyhow::ensure!(
        panorama.width() > 0 && panorama.height() > 0,
        "panorama {name} is empty"
    );
    let faces: [RgbaImage; 6] = std::array::from_fn(|face| {
        RgbaImage::from_fn(face_size, face_size, |x, y| {
            let a = 2.0 * (x as f32 + 0.5) / face_size as f32 - 1.0;
            let b = 2.0 * (y as f32 + 0.5) / face_size as f32 - 1.0;
            let dir = face_direction(face, a, b);
            let (u, v) = direction_to_equirect(dir);
            sample_bilinear(panorama, u, v)
        })
    });
    CubeTexture::new(name, faces)
}

/// Direction through texel `(a, b)` in `[-1, 1]` of `face`, in
/// [`CUBE_FACE_SUFFIXES`] order, with the usual cube map orientation.
fn face_direction(face: usize, a: f32, b: f32) -> [f32; 3] {
    match face {
        0 => [1.0, -b, -a],
        1 => [a, 1.0, b],
        2 => [a, -b, 1.0],
        3 => [-1.0, -b, a],
        4 => [a, -1.0, -b],
        _ => [-a, -b, -1.0],
    }
}

fn direction_to_equirect(dir: [f32; 3]) -> (f32, f32) {
    let [x, y, z] = dir;
    let len = (x * x + y * y + z * z).sqrt();
    let u = 0.5 + x.atan2(-z) / (2.0 * PI);
    let v = (y / len).clamp(-1.0, 1.0).acos() / PI;
    (u, v)
}
