//! wgpu backend for the gallery renderer.
//!
//! Draws textured, lit meshes with one shadowed directional light and paints
//! an egui overlay on top. Scene culling and draw lists come from
//! `gallery_render::SceneRenderer`; this crate only turns them into GPU work.

mod gpu;
mod overlay;
mod shaders;
mod textures;

pub use gpu::WgpuBackend;
pub use overlay::OverlayFrame;
pub use textures::{MipLevel, fit_within, mip_chain, mip_level_count, sampler_descriptor};
