//! In-memory scene graph produced by the importer and consumed by renderers.

use std::collections::BTreeMap;

use gallery_common::{Aabb, BoundingSphere, Transform};
use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MaterialId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextureId(pub usize);

/// Every texture slot a material can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureSlot {
    BaseColor,
    Normal,
    MetallicRoughness,
    Occlusion,
    Emissive,
}

impl TextureSlot {
    pub const ALL: [TextureSlot; 5] = [
        TextureSlot::BaseColor,
        TextureSlot::Normal,
        TextureSlot::MetallicRoughness,
        TextureSlot::Occlusion,
        TextureSlot::Emissive,
    ];

    /// Detail maps are everything except the base color.
    pub fn is_detail(self) -> bool {
        self != TextureSlot::BaseColor
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// Sampler state for one texture binding. The mip filter follows `min_filter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureSampling {
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
    pub mipmaps: bool,
    pub anisotropy: u16,
}

impl Default for TextureSampling {
    fn default() -> Self {
        Self {
            min_filter: FilterMode::Linear,
            mag_filter: FilterMode::Linear,
            mipmaps: true,
            anisotropy: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureBinding {
    pub texture: TextureId,
    pub tex_coord: u32,
    pub sampling: TextureSampling,
}

/// Decoded RGBA8 image data.
#[derive(Debug, Clone)]
pub struct TextureImage {
    pub name: Option<String>,
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub base_color: [f32; 4],
    pub transparent: bool,
    /// Fragments with alpha below this are discarded.
    pub alpha_test: Option<f32>,
    pub double_sided: bool,
    pub textures: BTreeMap<TextureSlot, TextureBinding>,
}

impl Material {
    pub fn solid(name: impl Into<String>, base_color: [f32; 4]) -> Self {
        Self {
            name: name.into(),
            base_color,
            transparent: false,
            alpha_test: None,
            double_sided: false,
            textures: BTreeMap::new(),
        }
    }

    pub fn texture(&self, slot: TextureSlot) -> Option<&TextureBinding> {
        self.textures.get(&slot)
    }
}

/// How a mesh node refers to its materials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaterialBinding {
    Single(MaterialId),
    /// One material per primitive, in primitive order.
    List(Vec<MaterialId>),
}

impl MaterialBinding {
    /// Collapse per-primitive materials into `Single` when they all agree.
    pub fn from_primitives(ids: Vec<MaterialId>) -> Self {
        match ids.first() {
            Some(&first) if ids.iter().all(|&id| id == first) => MaterialBinding::Single(first),
            _ => MaterialBinding::List(ids),
        }
    }

    pub fn ids(&self) -> &[MaterialId] {
        match self {
            MaterialBinding::Single(id) => std::slice::from_ref(id),
            MaterialBinding::List(ids) => ids,
        }
    }

    pub fn for_primitive(&self, index: usize) -> Option<MaterialId> {
        match self {
            MaterialBinding::Single(id) => Some(*id),
            MaterialBinding::List(ids) => ids.get(index).copied(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshFlags {
    pub cast_shadow: bool,
    pub receive_shadow: bool,
    pub frustum_culled: bool,
}

impl Default for MeshFlags {
    fn default() -> Self {
        Self {
            cast_shadow: false,
            receive_shadow: false,
            frustum_culled: true,
        }
    }
}

/// Local-space bounds of a mesh node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshBounds {
    pub aabb: Aabb,
    pub sphere: BoundingSphere,
}

#[derive(Debug, Clone, Default)]
pub struct Primitive {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

impl Primitive {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

#[derive(Debug, Clone)]
pub struct MeshNode {
    pub primitives: Vec<Primitive>,
    pub material: MaterialBinding,
    pub flags: MeshFlags,
    /// Filled in by normalization; `None` until then.
    pub bounds: Option<MeshBounds>,
}

impl MeshNode {
    pub fn compute_bounds(&self) -> Option<MeshBounds> {
        let points: Vec<Vec3> = self
            .primitives
            .iter()
            .flat_map(|p| p.positions.iter().copied().map(Vec3::from_array))
            .collect();
        let aabb = Aabb::from_points(points.iter().copied())?;
        let sphere = BoundingSphere::from_points(&points)?;
        Some(MeshBounds { aabb, sphere })
    }
}

#[derive(Debug, Clone)]
pub struct SceneNode {
    pub name: Option<String>,
    pub parent: Option<usize>,
    pub local: Mat4,
    pub mesh: Option<MeshNode>,
}

/// Flattened node hierarchy plus the materials and images it references.
#[derive(Debug, Clone, Default)]
pub struct SceneGraph {
    /// Applied above every top-level node.
    pub root: Transform,
    pub nodes: Vec<SceneNode>,
    pub materials: Vec<Material>,
    pub textures: Vec<TextureImage>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// World matrix of `index`, including the root transform.
    pub fn world_matrix(&self, index: usize) -> Mat4 {
        let mut matrix = Mat4::IDENTITY;
        let mut cursor = Some(index);
        // Bounded walk so a malformed parent cycle cannot spin forever.
        for _ in 0..=self.nodes.len() {
            let Some(i) = cursor else { break };
            let Some(node) = self.nodes.get(i) else { break };
            matrix = node.local * matrix;
            cursor = node.parent;
        }
        self.root.to_matrix() * matrix
    }

    pub fn mesh_nodes(&self) -> impl Iterator<Item = (usize, &MeshNode)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, node)| node.mesh.as_ref().map(|mesh| (i, mesh)))
    }

    pub fn mesh_nodes_mut(&mut self) -> impl Iterator<Item = &mut MeshNode> {
        self.nodes.iter_mut().filter_map(|node| node.mesh.as_mut())
    }

    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.0)
    }

    pub fn texture(&self, id: TextureId) -> Option<&TextureImage> {
        self.textures.get(id.0)
    }

    pub fn mesh_count(&self) -> usize {
        self.mesh_nodes().count()
    }

    pub fn primitive_count(&self) -> usize {
        self.mesh_nodes().map(|(_, m)| m.primitives.len()).sum()
    }

    pub fn vertex_count(&self) -> usize {
        self.mesh_nodes()
            .flat_map(|(_, m)| m.primitives.iter())
            .map(Primitive::vertex_count)
            .sum()
    }

    pub fn triangle_count(&self) -> usize {
        self.mesh_nodes()
            .flat_map(|(_, m)| m.primitives.iter())
            .map(Primitive::triangle_count)
            .sum()
    }

    /// True once every mesh node carries precomputed bounds.
    pub fn is_normalized(&self) -> bool {
        self.mesh_nodes().all(|(_, m)| m.bounds.is_some())
    }

    /// Union of every mesh's bounds in world space. Meshes without bounds are skipped.
    pub fn world_bounds(&self) -> Option<Aabb> {
        self.mesh_nodes()
            .filter_map(|(i, mesh)| mesh.bounds.map(|b| b.aabb.transformed(&self.world_matrix(i))))
            .reduce(|a, b| a.union(&b))
    }

    pub fn summary(&self) -> SceneSummary {
        SceneSummary {
            nodes: self.nodes.len(),
            meshes: self.mesh_count(),
            primitives: self.primitive_count(),
            vertices: self.vertex_count(),
            triangles: self.triangle_count(),
            materials: self.materials.len(),
            textures: self.textures.len(),
            bounds: self.world_bounds().map(|b| (b.min.to_array(), b.max.to_array())),
        }
    }

    /// Stand-in scene shown when the real asset cannot be loaded:
    /// a 2x2x2 green cube resting at (0, 1, 0).
    pub fn fallback_cube() -> Self {
        let material = Material::solid("fallback", [0.0, 1.0, 0.0, 1.0]);
        let mesh = MeshNode {
            primitives: vec![cube_primitive(2.0)],
            material: MaterialBinding::Single(MaterialId(0)),
            flags: MeshFlags::default(),
            bounds: None,
        };
        Self {
            root: Transform::default(),
            nodes: vec![SceneNode {
                name: Some("fallback_cube".into()),
                parent: None,
                local: Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0)),
                mesh: Some(mesh),
            }],
            materials: vec![material],
            textures: Vec::new(),
        }
    }
}

/// Counts reported by the CLI and logs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneSummary {
    pub nodes: usize,
    pub meshes: usize,
    pub primitives: usize,
    pub vertices: usize,
    pub triangles: usize,
    pub materials: usize,
    pub textures: usize,
    pub bounds: Option<([f32; 3], [f32; 3])>,
}

fn cube_primitive(size: f32) -> Primitive {
    let hs = size * 0.5;
    let corners = [
        [-hs, -hs, -hs],
        [hs, -hs, -hs],
        [hs, hs, -hs],
        [-hs, hs, -hs],
        [-hs, -hs, hs],
        [hs, -hs, hs],
        [hs, hs, hs],
        [-hs, hs, hs],
    ];
    let faces: [([usize; 4], [f32; 3]); 6] = [
        ([0, 3, 2, 1], [0.0, 0.0, -1.0]),
        ([4, 5, 6, 7], [0.0, 0.0, 1.0]),
        ([0, 4, 7, 3], [-1.0, 0.0, 0.0]),
        ([1, 2, 6, 5], [1.0, 0.0, 0.0]),
        ([3, 7, 6, 2], [0.0, 1.0, 0.0]),
        ([0, 1, 5, 4], [0.0, -1.0, 0.0]),
    ];
    let uv_quad = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];

    let mut prim = Primitive::default();
    for (face, (quad, normal)) in faces.iter().enumerate() {
        for (corner, &index) in quad.iter().enumerate() {
            prim.positions.push(corners[index]);
            prim.normals.push(*normal);
            prim.uvs.push(uv_quad[corner]);
        }
        let base = (face * 4) as u32;
        prim.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    prim
}
