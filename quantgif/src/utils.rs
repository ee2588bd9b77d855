/// Truncates an RGB888 color into a 16-bit RGB565 histogram key.
#[inline]
pub const fn rgb888_to_rgb565([r, g, b]: [u8; 3]) -> u16 {
    ((r as u16 >> 3) << 11) | ((g as u16 >> 2) << 5) | (b as u16 >> 3)
}

/// Truncates an RGB888 color into a 12-bit RGB444 histogram key.
#[inline]
pub const fn rgb888_to_rgb444([r, g, b]: [u8; 3]) -> u16 {
    ((r as u16 >> 4) << 8) | ((g as u16 >> 4) << 4) | (b as u16 >> 4)
}

/// Truncates an RGBA8888 color into a 16-bit RGBA4444 histogram key.
#[inline]
pub const fn rgba8888_to_rgba4444([r, g, b, a]: [u8; 4]) -> u16 {
    ((r as u16 >> 4) << 12) | ((g as u16 >> 4) << 8) | ((b as u16 >> 4) << 4) | (a as u16 >> 4)
}

/// Packs an RGBA texel into a single word, R in the lowest byte.
#[inline]
pub const fn pack_rgba([r, g, b, a]: [u8; 4]) -> u32 {
    u32::from_le_bytes([r, g, b, a])
}

#[inline]
pub(crate) const fn sqr_diff(a: u8, b: u8) -> u32 {
    let d = a.abs_diff(b) as u32;
    d * d
}

/// Squared distance between two colors, giving up as soon as the running sum exceeds `limit`.
///
/// Alpha is compared first when `with_alpha` is set, then red, green and blue.
#[inline]
pub(crate) fn distance_within(
    [r1, g1, b1, a1]: [u8; 4],
    [r2, g2, b2, a2]: [u8; 4],
    with_alpha: bool,
    limit: u32,
) -> Option<u32> {
    let mut dist = 0;
    if with_alpha {
        dist += sqr_diff(a1, a2);
        if dist > limit {
            return None;
        }
    }
    for (c1, c2) in [(r1, r2), (g1, g2), (b1, b2)] {
        dist += sqr_diff(c1, c2);
        if dist > limit {
            return None;
        }
    }
    Some(dist)
}

/// Splits an RGBA8888 byte buffer into texels. Trailing bytes that do not form a whole texel are
/// ignored; callers validate the length first.
#[inline]
pub(crate) fn texels(rgba: &[u8]) -> impl Iterator<Item = [u8; 4]> + '_ {
    rgba.chunks_exact(4).map(|p| [p[0], p[1], p[2], p[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_keep_the_high_bits() {
        assert_eq!(rgb888_to_rgb565([0xFF, 0xFF, 0xFF]), 0xFFFF);
        assert_eq!(rgb888_to_rgb565([0xF8, 0x00, 0x00]), 0xF800);
        assert_eq!(rgb888_to_rgb565([0x00, 0xFC, 0x00]), 0x07E0);
        assert_eq!(rgb888_to_rgb444([0x12, 0x34, 0x56]), 0x135);
        assert_eq!(rgba8888_to_rgba4444([0x12, 0x34, 0x56, 0x78]), 0x1357);
    }

    #[test]
    fn distance_short_circuits() {
        let black = [0, 0, 0, 255];
        let white = [255, 255, 255, 255];
        assert_eq!(distance_within(black, white, false, u32::MAX), Some(3 * 255 * 255));
        assert_eq!(distance_within(black, white, false, 100), None);
        assert_eq!(distance_within(black, [0, 0, 0, 0], true, u32::MAX), Some(255 * 255));
        assert_eq!(distance_within(black, [0, 0, 0, 0], false, 0), Some(0));
    }
}
