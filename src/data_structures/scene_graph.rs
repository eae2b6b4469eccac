//! Model containers and the scene hierarchies instantiated from them.
//!
//! A [`ModelContainer`] is what a model loader produces: an immutable bundle of
//! node templates, shared mesh data and material templates. It is never placed
//! in a scene directly. [`ModelContainer::instantiate`] copies it into a fresh
//! [`Entity`] that callers own and may mutate freely.
//!
//! Mesh geometry is shared between all instantiations through `Rc`; transforms
//! and materials are per entity.

use std::{cell::RefCell, collections::HashSet, rc::Rc};

use cgmath::EuclideanSpace;

use crate::data_structures::transform::Transform;

/// CPU-side geometry of one mesh primitive.
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub tex_coords: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of index entries, or vertices for non-indexed geometry.
    pub fn index_count(&self) -> usize {
        if self.indices.is_empty() {
            self.positions.len()
        } else {
            self.indices.len()
        }
    }

    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(self.positions.iter().map(|&p| cgmath::Point3::from(p)))
    }
}

/// Surface description shared by the meshes of a node.
#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub name: String,
    pub base_color: [f32; 4],
    pub emissive: [f32; 3],
    /// Texture URIs as referenced by the model file.
    pub base_color_texture: Option<String>,
    pub normal_texture: Option<String>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::from("default"),
            base_color: [1.0, 1.0, 1.0, 1.0],
            emissive: [0.0, 0.0, 0.0],
            base_color_texture: None,
            normal_texture: None,
        }
    }
}

impl Material {
    /// Textures this material samples from.
    pub fn texture_count(&self) -> usize {
        self.base_color_texture.iter().count() + self.normal_texture.iter().count()
    }
}

/// A material instance owned by an [`Entity`].
pub type MaterialRef = Rc<RefCell<Material>>;

/// How [`ModelContainer::instantiate`] hands out materials.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MaterialSharing {
    /// One fresh instance per source material; nodes that referenced the same
    /// source material keep sharing it inside the entity.
    #[default]
    Shared,
    /// The first node referencing a source material gets the fresh instance,
    /// every further reference gets its own clone.
    PerMesh,
}

/// Geometry plus the index of its material template in the container.
#[derive(Clone, Debug)]
pub struct PrimitiveTemplate {
    pub mesh: Rc<MeshData>,
    pub material: Option<usize>,
}

#[derive(Clone, Debug)]
pub struct NodeTemplate {
    pub name: String,
    pub transform: Transform,
    pub primitives: Vec<PrimitiveTemplate>,
    pub children: Vec<usize>,
}

/// A loaded but not yet placed model.
#[derive(Debug, Default)]
pub struct ModelContainer {
    pub name: String,
    pub nodes: Vec<NodeTemplate>,
    /// Indices into `nodes` of the top-level nodes.
    pub roots: Vec<usize>,
    pub materials: Vec<Material>,
    pub animations: Vec<String>,
}

/// Geometry bound to a material instance inside an entity.
#[derive(Clone, Debug)]
pub struct MeshInstance {
    pub mesh: Rc<MeshData>,
    pub material: Option<MaterialRef>,
}

#[derive(Clone, Debug)]
pub struct SceneNode {
    pub name: String,
    pub transform: Transform,
    pub meshes: Vec<MeshInstance>,
    pub children: Vec<SceneNode>,
}

/// A placed copy of a [`ModelContainer`].
///
/// `root` is a synthetic node named after the container whose children are the
/// container's top-level nodes.
#[derive(Debug)]
pub struct Entity {
    pub root: SceneNode,
    pub animation_groups: Vec<String>,
}

impl ModelContainer {
    /// Copy the container into a new, independent node hierarchy.
    pub fn instantiate(&self, sharing: MaterialSharing) -> Entity {
        let mut fresh: Vec<Option<MaterialRef>> = vec![None; self.materials.len()];
        let children = self
            .roots
            .iter()
            .filter_map(|&index| self.instantiate_node(index, sharing, &mut fresh, 0))
            .collect();
        Entity {
            root: SceneNode {
                name: self.name.clone(),
                transform: Transform::new(),
                meshes: Vec::new(),
                children,
            },
            animation_groups: self.animations.clone(),
        }
    }

    fn instantiate_node(
        &self,
        index: usize,
        sharing: MaterialSharing,
        fresh: &mut Vec<Option<MaterialRef>>,
        depth: usize,
    ) -> Option<SceneNode> {
        // glTF forbids cycles but nothing stops a broken file from having one.
        if depth > self.nodes.len() {
            log::warn!("{}: node hierarchy deeper than node count, cycle cut", self.name);
            return None;
        }
        let template = self.nodes.get(index)?;
        let meshes = template
            .primitives
            .iter()
            .map(|primitive| MeshInstance {
                mesh: Rc::clone(&primitive.mesh),
                material: primitive
                    .material
                    .and_then(|material| self.material_for(material, sharing, fresh)),
            })
            .collect();
        let children = template
            .children
            .iter()
            .filter_map(|&child| self.instantiate_node(child, sharing, fresh, depth + 1))
            .collect();
        Some(SceneNode {
            name: template.name.clone(),
            transform: template.transform,
            meshes,
            children,
        })
    }

    fn material_for(
        &self,
        index: usize,
        sharing: MaterialSharing,
        fresh: &mut [Option<MaterialRef>],
    ) -> Option<MaterialRef> {
        let template = self.materials.get(index)?;
        let slot = fresh.get_mut(index)?;
        match slot {
            Some(existing) => Some(match sharing {
                MaterialSharing::Shared => Rc::clone(existing),
                MaterialSharing::PerMesh => Rc::new(RefCell::new(existing.borrow().clone())),
            }),
            None => {
                let instance = Rc::new(RefCell::new(template.clone()));
                *slot = Some(Rc::clone(&instance));
                Some(instance)
            }
        }
    }
}

impl SceneNode {
    /// This node and all of its descendants, depth first.
    pub fn descendants(&self) -> Vec<&SceneNode> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.descendants());
        }
        out
    }

    /// Bounds of this node's hierarchy in its parent's space.
    pub fn hierarchy_bounds(&self) -> Option<Aabb> {
        let own = self
            .meshes
            .iter()
            .filter_map(|instance| instance.mesh.bounds())
            .reduce(Aabb::union);
        let children = self
            .children
            .iter()
            .filter_map(SceneNode::hierarchy_bounds)
            .reduce(Aabb::union);
        let local = match (own, children) {
            (Some(a), Some(b)) => a.union(b),
            (a, b) => a.or(b)?,
        };
        Aabb::from_points(local.corners().map(|corner| self.transform.transform_point(corner)))
    }
}

impl Entity {
    /// Nodes below the root that carry geometry.
    pub fn child_meshes(&self) -> Vec<&SceneNode> {
        self.root
            .descendants()
            .into_iter()
            .skip(1)
            .filter(|node| !node.meshes.is_empty())
            .collect()
    }

    /// Distinct material instances used by this entity.
    pub fn materials(&self) -> Vec<MaterialRef> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for node in self.root.descendants() {
            for material in node.meshes.iter().filter_map(|m| m.material.as_ref()) {
                if seen.insert(Rc::as_ptr(material)) {
                    out.push(Rc::clone(material));
                }
            }
        }
        out
    }

    pub fn bounding_box(&self) -> Option<Aabb> {
        self.root.hierarchy_bounds()
    }
}

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: cgmath::Point3<f32>,
    pub max: cgmath::Point3<f32>,
}

impl Aabb {
    pub fn from_points(points: impl IntoIterator<Item = cgmath::Point3<f32>>) -> Option<Self> {
        points.into_iter().fold(None, |acc: Option<Aabb>, p| {
            Some(match acc {
                None => Aabb { min: p, max: p },
                Some(b) => Aabb {
                    min: cgmath::Point3::new(b.min.x.min(p.x), b.min.y.min(p.y), b.min.z.min(p.z)),
                    max: cgmath::Point3::new(b.max.x.max(p.x), b.max.y.max(p.y), b.max.z.max(p.z)),
                },
            })
        })
    }

    pub fn union(self, other: Aabb) -> Aabb {
        Aabb {
            min: cgmath::Point3::new(
                self.min.x.min(other.min.x),
                self.min.y.min(other.min.y),
                self.min.z.min(other.min.z),
            ),
            max: cgmath::Point3::new(
                self.max.x.max(other.max.x),
                self.max.y.max(other.max.y),
                self.max.z.max(other.max.z),
            ),
        }
    }

    pub fn size(&self) -> cgmath::Vector3<f32> {
        self.max - self.min
    }

    pub fn center(&self) -> cgmath::Point3<f32> {
        self.min.midpoint(self.max)
    }

    pub fn corners(&self) -> [cgmath::Point3<f32>; 8] {
        let (a, b) = (self.min, self.max);
        [
            cgmath::Point3::new(a.x, a.y, a.z),
            cgmath::Point3::new(b.x, a.y, a.z),
            cgmath::Point3::new(a.x, b.y, a.z),
            cgmath::Point3::new(b.x, b.y, a.z),
            cgmath::Point3::new(a.x, a.y, b.z),
            cgmath::Point3::new(b.x, a.y, b.z),
            cgmath::Point3::new(a.x, b.y, b.z),
            cgmath::Point3::new(b.x, b.y, b.z),
        ]
    }
}
