use std::fmt;
use std::str::FromStr;

use gallery_assets::QualityProfile;
use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Linear RGB from a `0xRRGGBB` literal.
pub fn hex_rgb(hex: u32) -> [f32; 3] {
    [
        ((hex >> 16) & 0xff) as f32 / 255.0,
        ((hex >> 8) & 0xff) as f32 / 255.0,
        (hex & 0xff) as f32 / 255.0,
    ]
}

pub const BACKGROUND: u32 = 0x222222;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmbientLight {
    pub color: [f32; 3],
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShadowSettings {
    pub map_size: u32,
    /// Half-width of the orthographic shadow volume.
    pub extent: f32,
    pub near: f32,
    pub far: f32,
    pub bias: f32,
    pub normal_bias: f32,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            map_size: 2048,
            extent: 10.0,
            near: 0.5,
            far: 50.0,
            bias: -0.0001,
            normal_bias: 0.02,
        }
    }
}

/// A directional light shining from `position` toward the origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectionalLight {
    pub color: [f32; 3],
    pub intensity: f32,
    pub position: Vec3,
    pub shadow: Option<ShadowSettings>,
}

impl DirectionalLight {
    pub fn direction(&self) -> Vec3 {
        (-self.position).normalize_or_zero()
    }

    /// Orthographic view-projection of the shadow map, if this light casts shadows.
    pub fn shadow_view_projection(&self) -> Option<Mat4> {
        let s = self.shadow?;
        let up = if self.direction().cross(Vec3::Y).length_squared() < 1e-6 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let view = Mat4::look_at_rh(self.position, Vec3::ZERO, up);
        let proj = Mat4::orthographic_rh(-s.extent, s.extent, -s.extent, s.extent, s.near, s.far);
        Some(proj * view)
    }
}

/// One ambient light plus one or two directionals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightingRig {
    pub ambient: AmbientLight,
    pub directionals: Vec<DirectionalLight>,
    pub background: [f32; 3],
}

impl LightingRig {
    /// Shadowed key light plus a fill light.
    pub fn high() -> Self {
        Self {
            ambient: AmbientLight {
                color: hex_rgb(0x404040),
                intensity: 0.5,
            },
            directionals: vec![
                DirectionalLight {
                    color: hex_rgb(0xffffff),
                    intensity: 0.8,
                    position: Vec3::new(5.0, 10.0, 5.0),
                    shadow: Some(ShadowSettings::default()),
                },
                DirectionalLight {
                    color: hex_rgb(0xffffff),
                    intensity: 0.3,
                    position: Vec3::new(-5.0, 5.0, -5.0),
                    shadow: None,
                },
            ],
            background: hex_rgb(BACKGROUND),
        }
    }

    /// Brighter ambient and a single unshadowed directional.
    pub fn performance() -> Self {
        Self {
            ambient: AmbientLight {
                color: hex_rgb(0x404040),
                intensity: 1.0,
            },
            directionals: vec![DirectionalLight {
                color: hex_rgb(0xffffff),
                intensity: 0.4,
                position: Vec3::new(5.0, 5.0, 5.0),
                shadow: None,
            }],
            background: hex_rgb(BACKGROUND),
        }
    }

    /// The first light with shadows enabled.
    pub fn shadow_caster(&self) -> Option<&DirectionalLight> {
        self.directionals.iter().find(|l| l.shadow.is_some())
    }

    pub fn shadows_enabled(&self) -> bool {
        self.shadow_caster().is_some()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityPreset {
    #[default]
    High,
    Performance,
}

impl QualityPreset {
    pub fn profile(self) -> QualityProfile {
        match self {
            QualityPreset::High => QualityProfile::high(),
            QualityPreset::Performance => QualityProfile::performance(),
        }
    }

    pub fn rig(self) -> LightingRig {
        match self {
            QualityPreset::High => LightingRig::high(),
            QualityPreset::Performance => LightingRig::performance(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QualityPreset::High => "high",
            QualityPreset::Performance => "performance",
        }
    }
}

impl fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "high" => Ok(QualityPreset::High),
            "performance" | "perf" => Ok(QualityPreset::Performance),
            other => Err(format!("unknown quality preset '{other}' (expected high or performance)")),
        }
    }
}
