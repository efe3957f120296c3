//! CPU-side texture preparation: mip chains and sampler state.

use gallery_assets::{FilterMode, TextureSampling};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MipLevel {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Number of levels in a full chain down to 1x1.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Full mip chain with a 2x2 box filter. Odd edges reuse the last texel.
pub fn mip_chain(width: u32, height: u32, rgba: &[u8]) -> Vec<MipLevel> {
    let mut levels = vec![MipLevel {
        width,
        height,
        rgba: rgba.to_vec(),
    }];
    while let Some(prev) = levels.last() {
        if prev.width <= 1 && prev.height <= 1 {
            break;
        }
        let next = downsample(prev);
        levels.push(next);
    }
    levels
}

/// Halve both dimensions (never below 1) with a 2x2 box filter.
fn downsample(prev: &MipLevel) -> MipLevel {
    let w = (prev.width / 2).max(1);
    let h = (prev.height / 2).max(1);
    let stride = prev.width as usize;
    let mut out = Vec::with_capacity(w as usize * h as usize * 4);
    for y in 0..h {
        for x in 0..w {
            let sx = [(2 * x).min(prev.width - 1), (2 * x + 1).min(prev.width - 1)];
            let sy = [(2 * y).min(prev.height - 1), (2 * y + 1).min(prev.height - 1)];
            for c in 0..4 {
                let mut sum = 0u32;
                for yy in sy {
                    for xx in sx {
                        sum += prev.rgba[(yy as usize * stride + xx as usize) * 4 + c] as u32;
                    }
                }
                out.push(((sum + 2) / 4) as u8);
            }
        }
    }
    MipLevel {
        width: w,
        height: h,
        rgba: out,
    }
}

/// Shrink an image until neither side exceeds `max_dimension`.
///
/// `None` for an empty image or one whose pixel data does not match its size.
pub fn fit_within(width: u32, height: u32, rgba: &[u8], max_dimension: u32) -> Option<MipLevel> {
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(4))?;
    if width == 0 || height == 0 || max_dimension == 0 || rgba.len() != expected {
        return None;
    }
    let mut level = MipLevel {
        width,
        height,
        rgba: rgba.to_vec(),
    };
    while level.width > max_dimension || level.height > max_dimension {
        level = downsample(&level);
    }
    Some(level)
}

fn filter(mode: FilterMode) -> wgpu::FilterMode {
    match mode {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

/// Sampler for a normalized texture binding. Anisotropy needs every filter
/// linear, so it drops to 1 otherwise.
pub fn sampler_descriptor(sampling: &TextureSampling) -> wgpu::SamplerDescriptor<'static> {
    let min_filter = filter(sampling.min_filter);
    let mag_filter = filter(sampling.mag_filter);
    let mipmap_filter = if sampling.mipmaps {
        min_filter
    } else {
        wgpu::FilterMode::Nearest
    };
    let all_linear = [min_filter, mag_filter, mipmap_filter]
        .iter()
        .all(|f| *f == wgpu::FilterMode::Linear);
    let anisotropy_clamp = if all_linear {
        sampling.anisotropy.clamp(1, 16)
    } else {
        1
    };
    wgpu::SamplerDescriptor {
        label: Some("material_sampler"),
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::Repeat,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter,
        min_filter,
        mipmap_filter,
        lod_min_clamp: 0.0,
        lod_max_clamp: if sampling.mipmaps { 32.0 } else { 0.0 },
        compare: None,
        anisotropy_clamp,
        border_color: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_counts() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(4, 4), 3);
        assert_eq!(mip_level_count(1024, 16), 11);
        assert_eq!(mip_level_count(0, 0), 1);
    }

    #[test]
    fn chain_averages_down_to_one_texel() {
        let rgba = [
            0, 0, 0, 255, 100, 100, 100, 255, //
            200, 200, 200, 255, 100, 100, 100, 255,
        ];
        let chain = mip_chain(2, 2, &rgba);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[1].width, 1);
        assert_eq!(chain[1].rgba, vec![100, 100, 100, 255]);
    }

    #[test]
    fn non_square_chain_matches_level_count() {
        let rgba = vec![255u8; 8 * 2 * 4];
        let chain = mip_chain(8, 2, &rgba);
        assert_eq!(chain.len() as u32, mip_level_count(8, 2));
        let sizes: Vec<(u32, u32)> = chain.iter().map(|l| (l.width, l.height)).collect();
        assert_eq!(sizes, vec![(8, 2), (4, 1), (2, 1), (1, 1)]);
        assert!(chain.iter().all(|l| l.rgba.len() == (l.width * l.height * 4) as usize));
    }

    #[test]
    fn oversized_image_is_halved_until_it_fits() {
        let rgba = vec![200u8; 40 * 10 * 4];
        let level = fit_within(40, 10, &rgba, 16).expect("fits after downscale");
        assert_eq!((level.width, level.height), (10, 2));
        assert_eq!(level.rgba.len(), 10 * 2 * 4);
        assert!(level.rgba.iter().all(|&c| c == 200));
    }

    #[test]
    fn image_within_limit_is_unchanged() {
        let rgba: Vec<u8> = (0..16).collect();
        let level = fit_within(2, 2, &rgba, 8192).expect("valid image");
        assert_eq!((level.width, level.height), (2, 2));
        assert_eq!(level.rgba, rgba);
    }

    #[test]
    fn malformed_images_are_rejected() {
        assert!(fit_within(0, 4, &[], 16).is_none());
        assert!(fit_within(2, 2, &[0; 12], 16).is_none());
        assert!(fit_within(u32::MAX, u32::MAX, &[0; 4], 16).is_none());
    }

    #[test]
    fn high_quality_sampler_is_anisotropic() {
        let sampling = TextureSampling {
            min_filter: FilterMode::Linear,
            mag_filter: FilterMode::Linear,
            mipmaps: true,
            anisotropy: 16,
        };
        let desc = sampler_descriptor(&sampling);
        assert_eq!(desc.anisotropy_clamp, 16);
        assert_eq!(desc.mipmap_filter, wgpu::FilterMode::Linear);
    }

    #[test]
    fn nearest_sampler_drops_anisotropy() {
        let sampling = TextureSampling {
            min_filter: FilterMode::Nearest,
            mag_filter: FilterMode::Nearest,
            mipmaps: false,
            anisotropy: 16,
        };
        let desc = sampler_descriptor(&sampling);
        assert_eq!(desc.anisotropy_clamp, 1);
        assert_eq!(desc.lod_max_clamp, 0.0);
        assert_eq!(desc.min_filter, wgpu::FilterMode::Nearest);
    }
}
