//! Binary glTF import into a [`SceneGraph`].

use std::collections::HashSet;

use glam::{Mat4, Vec3};
use gltf::mesh::Mode;
use gltf::material::AlphaMode;

use crate::LoadError;
use crate::scene::{
    Material, MaterialBinding, MaterialId, MeshFlags, MeshNode, Primitive, SceneGraph, SceneNode,
    TextureBinding, TextureId, TextureImage, TextureSampling, TextureSlot,
};

/// Parse a GLB (or embedded glTF) byte buffer. Fails with `NoGeometry` when
/// no node carries a triangle mesh.
pub fn parse_glb(bytes: &[u8]) -> Result<SceneGraph, LoadError> {
    let (document, buffers, images) =
        gltf::import_slice(bytes).map_err(|e| LoadError::Parse(e.to_string()))?;

    let mut scene = SceneGraph::new();

    for (index, (data, image)) in images.iter().zip(document.images()).enumerate() {
        let rgba = convert_image_to_rgba(data)?;
        scene.textures.push(TextureImage {
            name: image.name().map(str::to_string).or_else(|| Some(format!("image_{index}"))),
            width: data.width,
            height: data.height,
            rgba,
        });
    }

    for (index, material) in document.materials().enumerate() {
        scene.materials.push(import_material(index, &material));
    }
    let mut default_material: Option<MaterialId> = None;

    let roots: Vec<gltf::Node> = match document.default_scene().or_else(|| document.scenes().next()) {
        Some(s) => s.nodes().collect(),
        None => {
            let children: HashSet<usize> = document
                .nodes()
                .flat_map(|n| n.children().map(|c| c.index()))
                .collect();
            document.nodes().filter(|n| !children.contains(&n.index())).collect()
        }
    };

    let mut visited = HashSet::new();
    let mut stack: Vec<(gltf::Node, Option<usize>)> =
        roots.into_iter().rev().map(|n| (n, None)).collect();

    while let Some((node, parent)) = stack.pop() {
        if !visited.insert(node.index()) {
            continue;
        }
        let mesh = match node.mesh() {
            Some(mesh) => import_mesh(&mesh, &buffers, &mut scene.materials, &mut default_material),
            None => None,
        };
        let slot = scene.nodes.len();
        scene.nodes.push(SceneNode {
            name: node.name().map(str::to_string),
            parent,
            local: Mat4::from_cols_array_2d(&node.transform().matrix()),
            mesh,
        });
        for child in node.children().collect::<Vec<_>>().into_iter().rev() {
            stack.push((child, Some(slot)));
        }
    }

    if scene.mesh_count() == 0 {
        return Err(LoadError::NoGeometry);
    }
    Ok(scene)
}

fn import_material(index: usize, material: &gltf::Material) -> Material {
    let pbr = material.pbr_metallic_roughness();
    let name = material
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("material_{index}"));
    let mut out = Material::solid(name, pbr.base_color_factor());
    out.double_sided = material.double_sided();
    match material.alpha_mode() {
        AlphaMode::Blend => out.transparent = true,
        AlphaMode::Mask => out.alpha_test = Some(material.alpha_cutoff().unwrap_or(0.5)),
        AlphaMode::Opaque => {}
    }

    let mut bind = |slot: TextureSlot, texture: gltf::Texture, tex_coord: u32| {
        out.textures.insert(
            slot,
            TextureBinding {
                texture: TextureId(texture.source().index()),
                tex_coord,
                sampling: TextureSampling::default(),
            },
        );
    };
    if let Some(info) = pbr.base_color_texture() {
        bind(TextureSlot::BaseColor, info.texture(), info.tex_coord());
    }
    if let Some(info) = pbr.metallic_roughness_texture() {
        bind(TextureSlot::MetallicRoughness, info.texture(), info.tex_coord());
    }
    if let Some(info) = material.normal_texture() {
        bind(TextureSlot::Normal, info.texture(), info.tex_coord());
    }
    if let Some(info) = material.occlusion_texture() {
        bind(TextureSlot::Occlusion, info.texture(), info.tex_coord());
    }
    if let Some(info) = material.emissive_texture() {
        bind(TextureSlot::Emissive, info.texture(), info.tex_coord());
    }
    out
}

fn import_mesh(
    mesh: &gltf::Mesh,
    buffers: &[gltf::buffer::Data],
    materials: &mut Vec<Material>,
    default_material: &mut Option<MaterialId>,
) -> Option<MeshNode> {
    let mut primitives = Vec::new();
    let mut material_ids = Vec::new();

    for primitive in mesh.primitives() {
        if primitive.mode() != Mode::Triangles {
            continue;
        }
        let reader = primitive.reader(|b| buffers.get(b.index()).map(|d| d.0.as_slice()));
        let Some(positions) = reader.read_positions() else {
            continue;
        };
        let positions: Vec<[f32; 3]> = positions.collect();
        if positions.is_empty() {
            continue;
        }
        let indices: Vec<u32> = reader
            .read_indices()
            .map(|read| read.into_u32().collect())
            .unwrap_or_else(|| (0..positions.len() as u32).collect());
        let normals = match reader.read_normals() {
            Some(it) => {
                let normals: Vec<[f32; 3]> = it.collect();
                if normals.len() == positions.len() {
                    normals
                } else {
                    compute_normals(&positions, &indices)
                }
            }
            None => compute_normals(&positions, &indices),
        };
        let mut uvs: Vec<[f32; 2]> = reader
            .read_tex_coords(0)
            .map(|coords| coords.into_f32().collect())
            .unwrap_or_default();
        uvs.resize(positions.len(), [0.0, 0.0]);

        let material = match primitive.material().index() {
            Some(i) if i < materials.len() => MaterialId(i),
            _ => *default_material.get_or_insert_with(|| {
                materials.push(Material::solid("default", [1.0, 1.0, 1.0, 1.0]));
                MaterialId(materials.len() - 1)
            }),
        };

        primitives.push(Primitive {
            positions,
            normals,
            uvs,
            indices,
        });
        material_ids.push(material);
    }

    if primitives.is_empty() {
        return None;
    }
    Some(MeshNode {
        primitives,
        material: MaterialBinding::from_primitives(material_ids),
        flags: MeshFlags::default(),
        bounds: None,
    })
}

/// Expand any glTF pixel layout to 8-bit RGBA. Wide channels are narrowed;
/// float channels are clamped to `[0, 1]`.
fn convert_image_to_rgba(image: &gltf::image::Data) -> Result<Vec<u8>, LoadError> {
    use gltf::image::Format;
    let (channels, samples): (usize, Vec<u8>) = match image.format {
        Format::R8 => (1, image.pixels.clone()),
        Format::R8G8 => (2, image.pixels.clone()),
        Format::R8G8B8 => (3, image.pixels.clone()),
        Format::R8G8B8A8 => (4, image.pixels.clone()),
        Format::R16 => (1, narrow_u16(&image.pixels)),
        Format::R16G16 => (2, narrow_u16(&image.pixels)),
        Format::R16G16B16 => (3, narrow_u16(&image.pixels)),
        Format::R16G16B16A16 => (4, narrow_u16(&image.pixels)),
        Format::R32G32B32FLOAT => (3, narrow_f32(&image.pixels)),
        Format::R32G32B32A32FLOAT => (4, narrow_f32(&image.pixels)),
    };
    let texels = image.width as usize * image.height as usize;
    if samples.len() != texels * channels {
        return Err(LoadError::UnsupportedImage(format!(
            "{:?} data holds {} samples, expected {} for {}x{}",
            image.format,
            samples.len(),
            texels * channels,
            image.width,
            image.height
        )));
    }
    let rgba = match channels {
        1 => samples.iter().flat_map(|&v| [v, v, v, 255]).collect(),
        2 => samples.chunks_exact(2).flat_map(|c| [c[0], c[1], 0, 255]).collect(),
        3 => samples.chunks_exact(3).flat_map(|c| [c[0], c[1], c[2], 255]).collect(),
        _ => samples,
    };
    Ok(rgba)
}

fn narrow_u16(pixels: &[u8]) -> Vec<u8> {
    pixels
        .chunks_exact(2)
        .map(|b| (u16::from_ne_bytes([b[0], b[1]]) >> 8) as u8)
        .collect()
}

fn narrow_f32(pixels: &[u8]) -> Vec<u8> {
    pixels
        .chunks_exact(4)
        .map(|b| {
            let v = f32::from_ne_bytes([b[0], b[1], b[2], b[3]]);
            // NaN clamps to 0 through the saturating cast.
            (v.clamp(0.0, 1.0) * 255.0).round() as u8
        })
        .collect()
}

fn compute_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let mut normals = vec![Vec3::ZERO; positions.len()];
    for tri in indices.chunks_exact(3) {
        let [i0, i1, i2] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        if i0 >= positions.len() || i1 >= positions.len() || i2 >= positions.len() {
            continue;
        }
        let a = Vec3::from_array(positions[i0]);
        let b = Vec3::from_array(positions[i1]);
        let c = Vec3::from_array(positions[i2]);
        let n = (b - a).cross(c - a);
        normals[i0] += n;
        normals[i1] += n;
        normals[i2] += n;
    }
    normals
        .into_iter()
        .map(|n| {
            let n = n.normalize_or_zero();
            let n = if n == Vec3::ZERO { Vec3::Y } else { n };
            n.to_array()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{glb_from_json, triangle_glb};

    #[test]
    fn imports_single_triangle() {
        let scene = parse_glb(&triangle_glb([0.0, 0.0, 0.0])).expect("parse");
        assert_eq!(scene.mesh_count(), 1);
        assert_eq!(scene.vertex_count(), 3);
        assert_eq!(scene.triangle_count(), 1);
        assert_eq!(scene.materials.len(), 1);
        assert_eq!(scene.materials[0].base_color, [0.8, 0.2, 0.2, 1.0]);

        let (_, mesh) = scene.mesh_nodes().next().expect("mesh");
        assert_eq!(mesh.material, MaterialBinding::Single(MaterialId(0)));
        // No NORMAL attribute in the fixture: normals are derived from the face.
        assert_eq!(mesh.primitives[0].normals[0], [0.0, 0.0, 1.0]);
        assert_eq!(mesh.primitives[0].uvs.len(), 3);
        assert!(mesh.bounds.is_none());
    }

    #[test]
    fn node_translation_is_kept() {
        let scene = parse_glb(&triangle_glb([3.0, 0.0, -2.0])).expect("parse");
        let p = scene.world_matrix(0).transform_point3(Vec3::ZERO);
        assert_eq!(p, Vec3::new(3.0, 0.0, -2.0));
    }

    #[test]
    fn scene_without_meshes_is_no_geometry() {
        let json = serde_json::json!({
            "asset": { "version": "2.0" },
            "scene": 0,
            "scenes": [{ "nodes": [0] }],
            "nodes": [{ "name": "empty" }]
        });
        let err = parse_glb(&glb_from_json(&json, &[])).expect_err("no geometry");
        assert!(matches!(err, LoadError::NoGeometry));
    }

    #[test]
    fn garbage_is_parse_error() {
        let err = parse_glb(b"definitely not a model").expect_err("garbage");
        assert!(matches!(err, LoadError::Parse(_)));
    }

    #[test]
    fn grayscale_expands_to_rgba() {
        let image = gltf::image::Data {
            pixels: vec![10, 20],
            format: gltf::image::Format::R8,
            width: 2,
            height: 1,
        };
        assert_eq!(
            convert_image_to_rgba(&image).expect("convert"),
            vec![10, 10, 10, 255, 20, 20, 20, 255]
        );
    }

    #[test]
    fn sixteen_bit_channels_are_narrowed() {
        let pixels: Vec<u8> = [0xffffu16, 0x8000, 0x0000, 0x1234]
            .iter()
            .flat_map(|v| v.to_ne_bytes())
            .collect();
        let image = gltf::image::Data {
            pixels,
            format: gltf::image::Format::R16G16B16A16,
            width: 1,
            height: 1,
        };
        assert_eq!(convert_image_to_rgba(&image).expect("convert"), vec![255, 128, 0, 18]);
    }

    #[test]
    fn float_channels_are_clamped() {
        let pixels: Vec<u8> = [2.0f32, 0.5, -1.0]
            .iter()
            .flat_map(|v| v.to_ne_bytes())
            .collect();
        let image = gltf::image::Data {
            pixels,
            format: gltf::image::Format::R32G32B32FLOAT,
            width: 1,
            height: 1,
        };
        assert_eq!(convert_image_to_rgba(&image).expect("convert"), vec![255, 128, 0, 255]);
    }

    #[test]
    fn short_pixel_data_is_rejected() {
        let image = gltf::image::Data {
            pixels: vec![1, 2, 3],
            format: gltf::image::Format::R8G8B8A8,
            width: 1,
            height: 1,
        };
        let err = convert_image_to_rgba(&image).expect_err("truncated");
        assert!(matches!(err, LoadError::UnsupportedImage(_)));
    }
}
