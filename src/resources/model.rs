use std::{
    collections::HashSet,
    io::{BufReader, Cursor},
    rc::Rc,
};

use base64::Engine;
use gltf::accessor::{DataType, Dimensions};

use crate::{
    data_structures::{
        scene_graph::{Material, MeshData, ModelContainer, NodeTemplate, PrimitiveTemplate},
        transform::Transform,
    },
    resources::{FileLoader, ProgressFn, ResourceError, TransferProgress, extension, split_url},
};

/// Load a model container, picking the parser from the file extension.
///
/// Progress is reported for the model file itself; companion files (glTF
/// buffers, OBJ material libraries) are fetched silently afterwards.
pub async fn load_model(
    loader: &FileLoader,
    url: &str,
    progress: ProgressFn<'_>,
) -> anyhow::Result<ModelContainer> {
    let (dir, file_name) = split_url(url);
    let ext = extension(url).unwrap_or_default();
    let container = match ext.as_str() {
        "gltf" | "glb" => {
            let data = loader.load_binary(url, progress).await?;
            load_model_gltf(loader, url, &data).await?
        }
        "obj" => {
            let data = loader.load_binary(url, progress).await?;
            load_model_obj(loader, dir, file_name, &data).await?
        }
        _ => {
            return Err(ResourceError::UnsupportedModelFormat {
                url: url.to_string(),
                extension: ext,
            }
            .into());
        }
    };
    log::debug!(
        "{url}: {} nodes, {} materials, {} animations",
        container.nodes.len(),
        container.materials.len(),
        container.animations.len()
    );
    Ok(container)
}

async fn load_model_gltf(loader: &FileLoader, url: &str, data: &[u8]) -> anyhow::Result<ModelContainer> {
    let (dir, file_name) = split_url(url);
    let gltf = gltf::Gltf::from_slice(data)?;

    let mut buffer_data = Vec::new();
    for buffer in gltf.buffers() {
        let bytes = match buffer.source() {
            gltf::buffer::Source::Bin => gltf
                .blob
                .clone()
                .ok_or_else(|| anyhow::anyhow!("{file_name}: missing binary chunk"))?,
            gltf::buffer::Source::Uri(uri) => match decode_data_uri(uri) {
                Some(decoded) => decoded?,
                None => {
                    let mut ignore = |_: TransferProgress| {};
                    loader.load_binary(&format!("{dir}{uri}"), &mut ignore).await?
                }
            },
        };
        if (bytes.len() as u64) < buffer.length() as u64 {
            return Err(malformed(
                url,
                format!(
                    "buffer {} holds {} bytes, {} declared",
                    buffer.index(),
                    bytes.len(),
                    buffer.length()
                ),
            ));
        }
        buffer_data.push(bytes);
    }

    let materials = gltf
        .materials()
        .enumerate()
        .map(|(index, material)| {
            let pbr = material.pbr_metallic_roughness();
            Material {
                name: material
                    .name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("material{index}")),
                base_color: pbr.base_color_factor(),
                emissive: material.emissive_factor(),
                base_color_texture: pbr
                    .base_color_texture()
                    .map(|info| image_uri(file_name, info.texture())),
                normal_texture: material
                    .normal_texture()
                    .map(|normal| image_uri(file_name, normal.texture())),
            }
        })
        .collect();

    let nodes = gltf
        .nodes()
        .map(|node| -> anyhow::Result<NodeTemplate> {
            let node_name = node
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("node{}", node.index()));
            let primitives = node
                .mesh()
                .map(|mesh| {
                    mesh.primitives()
                        .map(|primitive| {
                            let name = mesh
                                .name()
                                .map(|name| format!("{name}_{}", primitive.index()))
                                .unwrap_or_else(|| format!("{node_name}_{}", primitive.index()));
                            read_primitive(url, name, &primitive, &buffer_data)
                        })
                        .collect::<anyhow::Result<Vec<_>>>()
                })
                .transpose()?
                .unwrap_or_default();
            Ok(NodeTemplate {
                name: node_name,
                transform: Transform::from_decomposed(node.transform().decomposed()),
                primitives,
                children: node.children().map(|child| child.index()).collect(),
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let roots = match gltf.default_scene().or_else(|| gltf.scenes().next()) {
        Some(scene) => scene.nodes().map(|node| node.index()).collect(),
        None => top_level_nodes(&nodes),
    };

    let animations = gltf
        .animations()
        .map(|animation| {
            animation
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("animation{}", animation.index()))
        })
        .collect();

    Ok(ModelContainer {
        name: file_name.to_string(),
        nodes,
        roots,
        materials,
        animations,
    })
}

fn read_primitive(
    url: &str,
    name: String,
    primitive: &gltf::Primitive<'_>,
    buffer_data: &[Vec<u8>],
) -> anyhow::Result<PrimitiveTemplate> {
    let check = |attribute: &str, accessor: Option<gltf::Accessor<'_>>, dimensions, data_types: &[DataType]| {
        match accessor {
            Some(accessor) => check_accessor(&accessor, attribute, dimensions, data_types, buffer_data)
                .map_err(|reason| malformed(url, format!("{name}: {reason}"))),
            None => Ok(()),
        }
    };
    check(
        "POSITION",
        primitive.get(&gltf::Semantic::Positions),
        Dimensions::Vec3,
        &[DataType::F32],
    )?;
    check(
        "NORMAL",
        primitive.get(&gltf::Semantic::Normals),
        Dimensions::Vec3,
        &[DataType::F32],
    )?;
    check(
        "TEXCOORD_0",
        primitive.get(&gltf::Semantic::TexCoords(0)),
        Dimensions::Vec2,
        &[DataType::F32, DataType::U8, DataType::U16],
    )?;
    check(
        "indices",
        primitive.indices(),
        Dimensions::Scalar,
        &[DataType::U8, DataType::U16, DataType::U32],
    )?;

    let reader = primitive.reader(|buffer| buffer_data.get(buffer.index()).map(Vec::as_slice));
    let positions = reader
        .read_positions()
        .ok_or_else(|| malformed(url, format!("{name}: POSITION could not be read")))?
        .collect();
    let mesh_data = MeshData {
        name,
        positions,
        normals: reader
            .read_normals()
            .map(|normals| normals.collect())
            .unwrap_or_default(),
        tex_coords: reader
            .read_tex_coords(0)
            .map(|coords| coords.into_f32().collect())
            .unwrap_or_default(),
        indices: reader
            .read_indices()
            .map(|indices| indices.into_u32().collect())
            .unwrap_or_default(),
    };
    Ok(PrimitiveTemplate {
        mesh: Rc::new(mesh_data),
        material: primitive.material().index(),
    })
}

/// Rejects accessors whose layout does not match what the typed readers
/// expect, or whose elements lie outside their buffer.
fn check_accessor(
    accessor: &gltf::Accessor<'_>,
    attribute: &str,
    dimensions: Dimensions,
    data_types: &[DataType],
    buffer_data: &[Vec<u8>],
) -> Result<(), String> {
    if accessor.dimensions() != dimensions || !data_types.contains(&accessor.data_type()) {
        return Err(format!(
            "{attribute} accessor {} is {:?} of {:?}, expected {dimensions:?}",
            accessor.index(),
            accessor.dimensions(),
            accessor.data_type()
        ));
    }
    let Some(view) = accessor.view() else {
        return Ok(());
    };
    let buffer_len = buffer_data.get(view.buffer().index()).map_or(0, Vec::len);
    let stride = view.stride().unwrap_or(accessor.size());
    let needed = match accessor.count() {
        0 => 0,
        count => accessor.offset() + stride * (count - 1) + accessor.size(),
    };
    if view.offset() + view.length() > buffer_len || needed > view.length() {
        return Err(format!(
            "{attribute} accessor {} reads past the end of its buffer",
            accessor.index()
        ));
    }
    Ok(())
}

fn malformed(url: &str, reason: String) -> anyhow::Error {
    ResourceError::MalformedModel {
        url: url.to_string(),
        reason,
    }
    .into()
}

async fn load_model_obj(
    loader: &FileLoader,
    dir: &str,
    file_name: &str,
    data: &[u8],
) -> anyhow::Result<ModelContainer> {
    let mut obj_reader = BufReader::new(Cursor::new(data));

    let (models, obj_materials) = tobj::load_obj_buf_async(
        &mut obj_reader,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
        |p| async move {
            let path = format!("{dir}{p}");
            let mut ignore = |_: TransferProgress| {};
            match loader.load_binary(&path, &mut ignore).await {
                Ok(mtl) => tobj::load_mtl_buf(&mut BufReader::new(Cursor::new(mtl))),
                Err(err) => {
                    log::warn!("material library {path} could not be loaded: {err:#}");
                    Err(tobj::LoadError::OpenFileFailed)
                }
            }
        },
    )
    .await?;

    let obj_materials = obj_materials.unwrap_or_else(|err| {
        log::warn!("{file_name}: materials ignored: {err}");
        Vec::new()
    });
    let materials = obj_materials
        .into_iter()
        .map(|m| {
            let alpha = m.dissolve.unwrap_or(1.0);
            let [r, g, b] = m.diffuse.unwrap_or([1.0, 1.0, 1.0]);
            Material {
                name: m.name,
                base_color: [r, g, b, alpha],
                emissive: [0.0, 0.0, 0.0],
                base_color_texture: m.diffuse_texture,
                normal_texture: m.normal_texture,
            }
        })
        .collect::<Vec<_>>();
    let material_count = materials.len();

    let nodes = models
        .into_iter()
        .map(|model| {
            let mesh = model.mesh;
            NodeTemplate {
                name: model.name.clone(),
                transform: Transform::new(),
                primitives: vec![PrimitiveTemplate {
                    mesh: Rc::new(MeshData {
                        name: model.name,
                        positions: mesh.positions.chunks_exact(3).map(|p| [p[0], p[1], p[2]]).collect(),
                        normals: mesh.normals.chunks_exact(3).map(|n| [n[0], n[1], n[2]]).collect(),
                        // OBJ has v pointing up, textures are sampled top-down.
                        tex_coords: mesh.texcoords.chunks_exact(2).map(|t| [t[0], 1.0 - t[1]]).collect(),
                        indices: mesh.indices,
                    }),
                    material: mesh.material_id.filter(|&id| id < material_count),
                }],
                children: Vec::new(),
            }
        })
        .collect::<Vec<_>>();

    Ok(ModelContainer {
        name: file_name.to_string(),
        roots: (0..nodes.len()).collect(),
        nodes,
        materials,
        animations: Vec::new(),
    })
}

/// Payload of a base64 `data:` URI, `None` for any other URI.
fn decode_data_uri(uri: &str) -> Option<anyhow::Result<Vec<u8>>> {
    let rest = uri.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    if !header.ends_with(";base64") {
        return Some(Err(anyhow::anyhow!("only base64 data URIs are supported")));
    }
    Some(
        base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(Into::into),
    )
}

/// The file an image is read from, or `model#imageN` for embedded images.
fn image_uri(file_name: &str, texture: gltf::Texture<'_>) -> String {
    let image = texture.source();
    match image.source() {
        gltf::image::Source::Uri { uri, .. } if !uri.starts_with("data:") => uri.to_string(),
        _ => format!("{file_name}#image{}", image.index()),
    }
}

fn top_level_nodes(nodes: &[NodeTemplate]) -> Vec<usize> {
    let children: HashSet<usize> = nodes.iter().flat_map(|node| node.children.iter().copied()).collect();
    (0..nodes.len()).filter(|index| !children.contains(index)).collect()
}

