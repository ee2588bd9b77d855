//! One-call encoding of RGBA frame sequences.

use crate::{
    encode::{
        ApplyPaletteSnafu, EmptyFrameSnafu, EncodeError, FrameSizeSnafu, GlobalPaletteSnafu,
        NoFramesSnafu, QuantizeSnafu,
    },
    palettize::apply_palette,
    quantize::{quantize, quantize_frames, QuantizeOptions},
    DisposalMethod, EncoderOptions, FrameOptions, GifEncoder, Palette, Repeat,
};
use snafu::{ensure, ResultExt};

/// Where frame palettes come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PaletteMode {
    /// Quantize all frames together into one global color table.
    #[default]
    Global,
    /// Quantize every frame on its own. Frames after the first carry a local color table.
    PerFrame,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimationOptions {
    /// Palette size, 1..=256.
    pub max_colors: usize,
    pub quantize: QuantizeOptions,
    pub palette_mode: PaletteMode,
    /// Delay after every frame, in centiseconds.
    pub delay: u16,
    pub repeat: Option<Repeat>,
    pub dispose: Option<DisposalMethod>,
}

impl Default for AnimationOptions {
    fn default() -> Self {
        Self {
            max_colors: 256,
            quantize: QuantizeOptions::default(),
            palette_mode: PaletteMode::Global,
            delay: 0,
            repeat: Some(Repeat::Infinite),
            dispose: None,
        }
    }
}

/// Quantizes, maps and encodes a sequence of `width` x `height` RGBA frames into a finished GIF.
///
/// With [`ColorFormat::Rgba4444`](crate::ColorFormat::Rgba4444) the first fully transparent
/// palette entry of each frame becomes its transparent index.
pub fn encode_rgba_frames(
    frames: &[&[u8]],
    width: u16,
    height: u16,
    options: &AnimationOptions,
) -> Result<Vec<u8>, EncodeError> {
    ensure!(!frames.is_empty(), NoFramesSnafu);
    ensure!(width > 0 && height > 0, EmptyFrameSnafu { width, height });

    let expected = usize::from(width) * usize::from(height) * 4;
    for (frame, rgba) in frames.iter().enumerate() {
        ensure!(
            rgba.len() == expected,
            FrameSizeSnafu {
                frame,
                len: rgba.len(),
                expected
            }
        );
    }

    let global = match options.palette_mode {
        PaletteMode::Global => Some(
            quantize_frames(frames, options.max_colors, &options.quantize)
                .context(GlobalPaletteSnafu)?,
        ),
        PaletteMode::PerFrame => None,
    };

    let mut encoder = GifEncoder::with_options(EncoderOptions {
        initial_capacity: (expected / 4).max(4096),
        auto: true,
    });

    for (frame, rgba) in frames.iter().enumerate() {
        let local: Palette;
        let palette = match &global {
            Some(palette) => palette,
            None => {
                local = quantize(rgba, options.max_colors, &options.quantize)
                    .context(QuantizeSnafu { frame })?;
                &local
            }
        };

        let indices = apply_palette(rgba, palette, options.quantize.format)
            .context(ApplyPaletteSnafu { frame })?;
        let transparent_index = palette.transparent_index();

        encoder.write_frame(
            &indices,
            width,
            height,
            &FrameOptions {
                palette: (frame == 0 || global.is_none()).then_some(palette),
                delay: options.delay,
                transparent: transparent_index.is_some(),
                transparent_index: transparent_index.unwrap_or(0) as u8,
                dispose: options.dispose,
                repeat: options.repeat,
                ..FrameOptions::default()
            },
        )?;
    }

    encoder.finish();
    Ok(encoder.into_bytes())
}
