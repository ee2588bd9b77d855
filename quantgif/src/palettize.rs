use crate::{
    utils::{distance_within, pack_rgba, texels},
    ColorFormat, Palette, MAX_PALETTE_LEN,
};
use log::trace;
use snafu::{ensure, Snafu};

#[derive(Debug, Snafu)]
pub enum PaletteError {
    #[snafu(display("The RGBA buffer length must be a multiple of 4, got {len} bytes"))]
    InvalidPixelBuffer { len: usize },
    #[snafu(display("Cannot map colors onto an empty palette"))]
    EmptyPalette,
    #[snafu(display("Palette has {len} colors, at most 256 are supported"))]
    PaletteTooLarge { len: usize },
}

/// Lookup cache slot. The slot is picked by the truncated key of a color, the full color is kept
/// so that only identical colors share a result.
#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    color: u32,
    index: u8,
}

/// Maps every texel of `rgba` to the index of its nearest color in `palette`.
///
/// Alpha takes part in the distance only for [`ColorFormat::Rgba4444`].
pub fn apply_palette(
    rgba: &[u8],
    palette: &Palette,
    format: ColorFormat,
) -> Result<Vec<u8>, PaletteError> {
    ensure!(rgba.len() % 4 == 0, InvalidPixelBufferSnafu { len: rgba.len() });
    ensure!(!palette.is_empty(), EmptyPaletteSnafu);
    ensure!(
        palette.len() <= MAX_PALETTE_LEN,
        PaletteTooLargeSnafu { len: palette.len() }
    );

    let with_alpha = format.has_alpha();
    let colors = palette.as_slice();
    let mut cache: Vec<Option<CacheEntry>> = vec![None; format.bin_count()];
    let mut misses = 0usize;

    let indices = texels(rgba)
        .map(|mut texel| {
            if !with_alpha {
                texel[3] = 0xFF;
            }
            let color = pack_rgba(texel);
            let slot = &mut cache[format.key(texel)];

            match *slot {
                Some(entry) if entry.color == color => entry.index,
                _ => {
                    misses += 1;
                    let (index, _) = nearest(colors, texel, with_alpha);
                    let index = index as u8;
                    *slot = Some(CacheEntry { color, index });
                    index
                }
            }
        })
        .collect::<Vec<_>>();

    trace!(
        "mapped {} texels onto {} colors, {misses} cache misses",
        indices.len(),
        colors.len()
    );

    Ok(indices)
}

fn nearest(colors: &[[u8; 4]], color: [u8; 4], with_alpha: bool) -> (usize, u32) {
    let mut best = (0, u32::MAX);
    for (i, &entry) in colors.iter().enumerate() {
        if let Some(dist) = distance_within(color, entry, with_alpha, best.1) {
            if dist < best.1 {
                best = (i, dist);
            }
        }
    }
    best
}

/// Index of the palette entry nearest to `color`, `None` for an empty palette.
///
/// Alpha is compared when the palette carries alpha.
pub fn nearest_color_index(palette: &Palette, color: [u8; 4]) -> Option<usize> {
    nearest_color_index_with_distance(palette, color).map(|(index, _)| index)
}

/// Like [`nearest_color_index`], also returning the squared distance.
pub fn nearest_color_index_with_distance(palette: &Palette, color: [u8; 4]) -> Option<(usize, u32)> {
    if palette.is_empty() {
        return None;
    }
    Some(nearest(palette.as_slice(), color, palette.has_alpha()))
}

/// Replaces palette entries that are close, but not identical, to a known color with that color.
///
/// Distance is measured on RGB only. Entries within `threshold` (euclidean) are replaced, which
/// keeps e.g. a UI's exact brand colors from drifting through quantization.
pub fn snap_colors_to_palette(palette: &mut Palette, known_colors: &[[u8; 4]], threshold: u32) {
    if palette.is_empty() {
        return;
    }

    let threshold_sq = threshold.saturating_mul(threshold);
    for &known in known_colors {
        let (index, dist) = nearest(palette.as_slice(), known, false);
        if dist > 0 && dist <= threshold_sq {
            let [r, g, b, a] = known;
            let a = if palette.has_alpha() { a } else { 0xFF };
            palette.set(index, [r, g, b, a]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapping_only_touches_near_misses() {
        let mut palette = Palette::from_rgb([[250, 0, 0], [0, 0, 0], [0, 0, 200]]);
        snap_colors_to_palette(&mut palette, &[[255, 0, 0, 255], [0, 0, 255, 255]], 5);
        assert_eq!(
            palette.as_slice(),
            &[[255, 0, 0, 255], [0, 0, 0, 255], [0, 0, 200, 255]]
        );
    }

    #[test]
    fn ties_pick_the_first_entry() {
        let palette = Palette::from_rgb([[10, 10, 10], [30, 30, 30]]);
        assert_eq!(
            nearest_color_index_with_distance(&palette, [20, 20, 20, 255]),
            Some((0, 300))
        );
        assert_eq!(nearest_color_index(&Palette::default(), [0; 4]), None);
    }

    #[test]
    fn cache_does_not_merge_distinct_colors() {
        // both colors share the rgb444 key 0x000 but have different nearest entries
        let palette = Palette::from_rgb([[0, 0, 0], [15, 15, 15]]);
        let rgba = [1, 1, 1, 255, 14, 14, 14, 255, 1, 1, 1, 255];
        let indices = apply_palette(&rgba, &palette, ColorFormat::Rgb444).unwrap();
        assert_eq!(indices, vec![0, 1, 0]);
    }
}
