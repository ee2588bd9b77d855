//! Animated GIF89a encoder built around pairwise-nearest-neighbor color quantization.
//!
//! The crate turns RGBA8888 frames into a finished GIF byte buffer in three steps:
//!
//! 1. [`quantize`] reduces a frame (or a whole animation) to at most 256 colors. Colors are first
//!    bucketed into a histogram keyed by a truncated [`ColorFormat`], then the two bins whose merge
//!    adds the least squared error are merged until the requested number of bins survive.
//! 2. [`apply_palette`] maps every texel to the index of its nearest palette entry.
//! 3. [`GifEncoder`] writes the header, color tables and per-frame blocks, compressing each index
//!    buffer with GIF flavoured LZW (see [`lzw`]).
//!
//! [`encode_rgba_frames`] drives all three for a sequence of equally sized frames.
//!
//! # Output format
//!
//! Only the subset of GIF89a needed for full-canvas animations is produced:
//!
//! - `GIF89a` signature
//! - logical screen descriptor followed by a global color table
//! - optional `NETSCAPE2.0` application extension carrying the loop count
//! - per frame: graphic control extension, image descriptor at (0, 0), optional local color table,
//!   LZW image data
//! - trailer
//!
//! Interlacing, plain text extensions, comments and frame offsets are never written.
//!
//! # Example
//!
//! ```
//! use quantgif::{apply_palette, quantize, FrameOptions, GifEncoder, QuantizeOptions};
//!
//! let red = [255, 0, 0, 255].repeat(4);
//! let options = QuantizeOptions::default();
//! let palette = quantize(&red, 2, &options).unwrap();
//! let indices = apply_palette(&red, &palette, options.format).unwrap();
//!
//! let mut gif = GifEncoder::new();
//! gif.write_frame(&indices, 2, 2, &FrameOptions {
//!     palette: Some(&palette),
//!     ..FrameOptions::default()
//! }).unwrap();
//! gif.finish();
//!
//! let bytes = gif.bytes_view();
//! assert!(bytes.starts_with(b"GIF89a"));
//! assert_eq!(bytes.last(), Some(&0x3B));
//! ```

pub mod animation;
pub mod encode;
pub mod lzw;
pub mod palettize;
pub mod quantize;
pub mod stream;
pub mod utils;

pub use animation::{encode_rgba_frames, AnimationOptions, PaletteMode};
pub use encode::{DisposalMethod, EncodeError, EncoderOptions, FrameOptions, GifEncoder, Repeat};
pub use palettize::{
    apply_palette, nearest_color_index, nearest_color_index_with_distance,
    snap_colors_to_palette, PaletteError,
};
pub use quantize::{
    prequantize, quantize, quantize_frames, PrequantizeOptions, QuantizeError, QuantizeOptions,
};
pub use stream::ByteStream;

use utils::{rgb888_to_rgb444, rgb888_to_rgb565, rgba8888_to_rgba4444};

/// Largest palette a GIF color table can hold.
pub const MAX_PALETTE_LEN: usize = 256;

/// Histogram granularity used while quantizing and while caching palette lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorFormat {
    /// 5 bits red, 6 bits green, 5 bits blue. Alpha is ignored.
    #[default]
    Rgb565,
    /// 4 bits per color channel, alpha ignored. Coarser but faster.
    Rgb444,
    /// 4 bits per channel including alpha. Palettes carry alpha.
    Rgba4444,
}

impl ColorFormat {
    /// Number of distinct keys.
    pub const fn bin_count(self) -> usize {
        match self {
            ColorFormat::Rgb444 => 1 << 12,
            ColorFormat::Rgb565 | ColorFormat::Rgba4444 => 1 << 16,
        }
    }

    pub const fn has_alpha(self) -> bool {
        matches!(self, ColorFormat::Rgba4444)
    }

    #[inline]
    pub const fn key(self, [r, g, b, a]: [u8; 4]) -> usize {
        let key = match self {
            ColorFormat::Rgb565 => rgb888_to_rgb565([r, g, b]),
            ColorFormat::Rgb444 => rgb888_to_rgb444([r, g, b]),
            ColorFormat::Rgba4444 => rgba8888_to_rgba4444([r, g, b, a]),
        };
        key as usize
    }
}

/// Ordered list of colors; the position of a color is its index.
///
/// Colors are always stored as RGBA. Palettes without alpha keep every entry opaque and only
/// their RGB channels are written to a color table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Palette {
    colors: Vec<[u8; 4]>,
    has_alpha: bool,
}

impl Palette {
    pub fn from_rgb(colors: impl IntoIterator<Item = [u8; 3]>) -> Self {
        Self {
            colors: colors.into_iter().map(|[r, g, b]| [r, g, b, 0xFF]).collect(),
            has_alpha: false,
        }
    }

    pub fn from_rgba(colors: impl IntoIterator<Item = [u8; 4]>) -> Self {
        Self {
            colors: colors.into_iter().collect(),
            has_alpha: true,
        }
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn has_alpha(&self) -> bool {
        self.has_alpha
    }

    pub fn get(&self, index: usize) -> Option<[u8; 4]> {
        self.colors.get(index).copied()
    }

    pub fn as_slice(&self) -> &[[u8; 4]] {
        &self.colors
    }

    pub fn iter(&self) -> impl Iterator<Item = [u8; 4]> + '_ {
        self.colors.iter().copied()
    }

    /// Index of the first fully transparent entry, if the palette carries alpha.
    pub fn transparent_index(&self) -> Option<usize> {
        if !self.has_alpha {
            return None;
        }
        self.colors.iter().position(|c| c[3] == 0)
    }

    /// Bits needed to address a power-of-two color table holding this palette, at least 1.
    pub fn table_bits(&self) -> u8 {
        color_table_bits(self.colors.len())
    }

    pub(crate) fn set(&mut self, index: usize, color: [u8; 4]) {
        self.colors[index] = color;
    }
}

/// `max(ceil(log2(len)), 1)`
pub(crate) fn color_table_bits(len: usize) -> u8 {
    let bits = usize::BITS - len.saturating_sub(1).leading_zeros();
    bits.max(1) as u8
}

pub mod consts {
    /// File signature and version.
    pub const GIF_SIGNATURE: &[u8; 6] = b"GIF89a";

    /// Introduces every extension block.
    ///
    /// ```plain
    /// .- Extension -------------------------------------------------.
    /// | Byte[0] | Byte[1] | Byte[2]    | Byte[3..]  | ... | Byte[n] |
    /// |---------+---------+------------+------------+-----+---------|
    /// |   0x21  |  label  | block size | block data | ... |  0x00   |
    /// `-------------------------------------------------------------`
    /// ```
    pub const EXTENSION_INTRODUCER: u8 = 0x21;

    /// Graphic control extension, precedes every frame.
    ///
    /// ```plain
    /// .- Graphic Control Extension, Byte[3] ----.
    /// |  7  6  5 |  4  3  2 |   1  |     0      |
    /// |----------+----------+------+------------|
    /// | reserved | disposal | user | transp.    |
    /// `-----------------------------------------`
    /// ```
    ///
    /// - 3-bit disposal method
    /// - 1-bit user input flag, always 0
    /// - 1-bit transparency flag
    /// - followed by the u16le delay in centiseconds and the transparent index
    pub const GRAPHIC_CONTROL_LABEL: u8 = 0xF9;

    /// Application extension, used for the `NETSCAPE2.0` loop count.
    pub const APPLICATION_LABEL: u8 = 0xFF;

    /// Identifier and authentication code of the looping extension.
    pub const NETSCAPE_ID: &[u8; 11] = b"NETSCAPE2.0";

    /// Starts an image descriptor.
    ///
    /// ```plain
    /// .- Image Descriptor -----------------------------------------------.
    /// | Byte[0] | Byte[1..5] | Byte[5..9]      | Byte[9]                 |
    /// |---------+------------+-----------------+-------------------------|
    /// |   0x2C  | left, top  | width, height   | L  I  S  0  0  size     |
    /// `------------------------------------------------------------------`
    /// ```
    ///
    /// - `L`: local color table present
    /// - `I`: interlaced, always 0
    /// - `S`: sorted color table, always 0
    /// - 3-bit table size, the table holds `2^(size + 1)` entries
    pub const IMAGE_SEPARATOR: u8 = 0x2C;

    /// Marks the end of the file.
    pub const TRAILER: u8 = 0x3B;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_bits() {
        assert_eq!(color_table_bits(0), 1);
        assert_eq!(color_table_bits(1), 1);
        assert_eq!(color_table_bits(2), 1);
        assert_eq!(color_table_bits(3), 2);
        assert_eq!(color_table_bits(4), 2);
        assert_eq!(color_table_bits(5), 3);
        assert_eq!(color_table_bits(129), 8);
        assert_eq!(color_table_bits(256), 8);
    }

    #[test]
    fn transparent_index_needs_alpha() {
        let rgba = Palette::from_rgba([[1, 2, 3, 255], [0, 0, 0, 0]]);
        assert_eq!(rgba.transparent_index(), Some(1));
        assert_eq!(Palette::from_rgb([[0, 0, 0]]).transparent_index(), None);
    }
}
