//! Quality profiles and the post-load normalization pass.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::scene::{FilterMode, MeshFlags, SceneGraph, TextureSampling, TextureSlot};

/// Shadow, culling and filtering knobs applied uniformly to a loaded scene.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityProfile {
    pub flags: MeshFlags,
    pub sampling: TextureSampling,
    pub force_opaque: bool,
    pub alpha_test: Option<f32>,
    /// Drop normal, metallic-roughness, occlusion and emissive maps.
    pub strip_detail_maps: bool,
}

impl QualityProfile {
    /// Shadows on, trilinear filtering with 16x anisotropy.
    pub fn high() -> Self {
        Self {
            flags: MeshFlags {
                cast_shadow: true,
                receive_shadow: true,
                frustum_culled: true,
            },
            sampling: TextureSampling {
                min_filter: FilterMode::Linear,
                mag_filter: FilterMode::Linear,
                mipmaps: true,
                anisotropy: 16,
            },
            force_opaque: true,
            alpha_test: Some(0.1),
            strip_detail_maps: false,
        }
    }

    /// No shadows, nearest filtering without mips, base color only.
    pub fn performance() -> Self {
        Self {
            flags: MeshFlags {
                cast_shadow: false,
                receive_shadow: false,
                frustum_culled: true,
            },
            sampling: TextureSampling {
                min_filter: FilterMode::Nearest,
                mag_filter: FilterMode::Nearest,
                mipmaps: false,
                anisotropy: 1,
            },
            force_opaque: true,
            alpha_test: None,
            strip_detail_maps: true,
        }
    }
}

impl Default for QualityProfile {
    fn default() -> Self {
        Self::high()
    }
}

/// What a normalization pass touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    pub meshes: usize,
    pub materials: usize,
    pub textures_configured: usize,
    pub textures_stripped: usize,
}

/// Precompute bounds, set mesh flags and rewrite material sampling per `profile`.
///
/// Idempotent: running it twice with the same profile changes nothing the
/// second time.
pub fn normalize(scene: &mut SceneGraph, profile: &QualityProfile) -> NormalizeReport {
    let _span = tracing::info_span!("normalize_scene").entered();
    let mut report = NormalizeReport::default();

    for mesh in scene.mesh_nodes_mut() {
        mesh.bounds = mesh.compute_bounds();
        mesh.flags = profile.flags;
        report.meshes += 1;
    }

    for material in &mut scene.materials {
        if profile.force_opaque {
            material.transparent = false;
        }
        material.alpha_test = profile.alpha_test;

        for slot in TextureSlot::ALL {
            if profile.strip_detail_maps && slot.is_detail() {
                if material.textures.remove(&slot).is_some() {
                    report.textures_stripped += 1;
                }
                continue;
            }
            if let Some(binding) = material.textures.get_mut(&slot) {
                binding.sampling = profile.sampling;
                report.textures_configured += 1;
            }
        }
        debug!(material = %material.name, textures = material.textures.len(), "material normalized");
        report.materials += 1;
    }

    debug!(
        meshes = report.meshes,
        materials = report.materials,
        configured = report.textures_configured,
        stripped = report.textures_stripped,
        "scene normalized"
    );
    report
}
