use crate::{
    consts::{GIF_SIGNATURE, TRAILER},
    lzw::LzwScratch,
    palettize::PaletteError,
    quantize::QuantizeError,
    stream::ByteStream,
    Palette, MAX_PALETTE_LEN,
};
use log::{debug, trace};
use snafu::{ensure, OptionExt, Snafu};

mod blocks;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum EncodeError {
    #[snafu(display(
        "Specified frame dimensions don't match the number of indices: {width} * {height} == {} pixels, but {pixel_count} indices were given",
        width * height
    ))]
    InvalidDimensions {
        width: usize,
        height: usize,
        pixel_count: usize,
    },
    #[snafu(display("The first frame must include a palette"))]
    MissingPalette,
    #[snafu(display("Palette has {len} colors, at most 256 are supported"))]
    PaletteTooLarge { len: usize },
    #[snafu(display("Cannot write a frame after the GIF was finished"))]
    Finished,
    #[snafu(display("At least one frame is required"))]
    NoFrames,
    #[snafu(display("Frames must not be empty, got {width}x{height}"))]
    EmptyFrame { width: u16, height: u16 },
    #[snafu(display("Frame {frame} has {len} bytes, expected {expected} bytes of RGBA data"))]
    FrameSize {
        frame: usize,
        len: usize,
        expected: usize,
    },
    #[snafu(display("Failed to build the palette shared by all frames"))]
    GlobalPalette { source: QuantizeError },
    #[snafu(display("Failed to quantize frame {frame}"))]
    Quantize { frame: usize, source: QuantizeError },
    #[snafu(display("Failed to map frame {frame} onto its palette"))]
    ApplyPalette { frame: usize, source: PaletteError },
}

/// How the decoder treats a frame's pixels before drawing the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum DisposalMethod {
    /// No disposal specified.
    #[default]
    Any = 0,
    /// Leave the frame in place.
    Keep = 1,
    /// Restore the frame's area to the background.
    Background = 2,
    /// Restore whatever was there before the frame.
    Previous = 3,
}

/// Loop count stored in the `NETSCAPE2.0` extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Repeat {
    Infinite,
    Finite(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderOptions {
    /// Initial size of the output buffer.
    pub initial_capacity: usize,
    /// Write the header on the first [`GifEncoder::write_frame`] call. When disabled, the caller
    /// writes the header and flags the first frame with [`FrameOptions::first`], which allows
    /// encoding frame chunks separately and concatenating them afterwards.
    pub auto: bool,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            initial_capacity: 4096,
            auto: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameOptions<'a> {
    /// Required on the first frame, where it becomes the global color table. On later frames it
    /// is written as a local color table.
    pub palette: Option<&'a Palette>,
    /// Delay after this frame, in centiseconds.
    pub delay: u16,
    pub transparent: bool,
    pub transparent_index: u8,
    /// Defaults to [`DisposalMethod::Background`] for transparent frames, [`DisposalMethod::Any`]
    /// otherwise.
    pub dispose: Option<DisposalMethod>,
    /// Only used on the first frame. `None` omits the looping extension, so the animation plays
    /// once.
    pub repeat: Option<Repeat>,
    /// Bits per index. Defaults to the size of the color table the frame indexes.
    pub color_depth: Option<u8>,
    /// Marks the first frame when the encoder is not in auto mode.
    pub first: bool,
}

impl Default for FrameOptions<'_> {
    fn default() -> Self {
        Self {
            palette: None,
            delay: 0,
            transparent: false,
            transparent_index: 0,
            dispose: None,
            repeat: Some(Repeat::Infinite),
            color_depth: None,
            first: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Uninitialized,
    SignatureWritten,
    FramesWritten,
    Finished,
}

/// GIF89a writer.
///
/// Frames are appended to an in-memory [`ByteStream`]. The LZW tables are allocated once and
/// reused for every frame.
#[derive(Debug, Clone)]
pub struct GifEncoder {
    stream: ByteStream,
    scratch: LzwScratch,
    auto: bool,
    state: State,
    global_table_bits: Option<u8>,
    frame_count: usize,
}

impl Default for GifEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl GifEncoder {
    pub fn new() -> Self {
        Self::with_options(EncoderOptions::default())
    }

    pub fn with_options(options: EncoderOptions) -> Self {
        Self {
            stream: ByteStream::with_capacity(options.initial_capacity),
            scratch: LzwScratch::new(),
            auto: options.auto,
            state: State::Uninitialized,
            global_table_bits: None,
            frame_count: 0,
        }
    }

    /// Writes the `GIF89a` signature. Done automatically in auto mode. Only the first call
    /// writes anything.
    pub fn write_header(&mut self) {
        if self.state == State::Uninitialized {
            self.stream.write_bytes(GIF_SIGNATURE);
            self.state = State::SignatureWritten;
        }
    }

    /// Appends one frame of palette indices.
    ///
    /// The first frame also writes the logical screen descriptor (sized to this frame), the
    /// global color table and, unless `options.repeat` is `None`, the looping extension.
    pub fn write_frame(
        &mut self,
        indices: &[u8],
        width: u16,
        height: u16,
        options: &FrameOptions,
    ) -> Result<(), EncodeError> {
        ensure!(self.state != State::Finished, FinishedSnafu);

        let (w, h) = (usize::from(width), usize::from(height));
        ensure!(
            w * h == indices.len(),
            InvalidDimensionsSnafu {
                width: w,
                height: h,
                pixel_count: indices.len()
            }
        );
        if let Some(palette) = options.palette {
            ensure!(
                palette.len() <= MAX_PALETTE_LEN,
                PaletteTooLargeSnafu { len: palette.len() }
            );
        }

        // the screen descriptor goes with the first frame, even if the signature was written early
        let first = if self.auto {
            self.global_table_bits.is_none()
        } else {
            options.first
        };
        let global_palette = if first {
            Some(options.palette.context(MissingPaletteSnafu)?)
        } else {
            None
        };

        if self.auto {
            self.write_header();
        }

        let table_bits = options
            .palette
            .map(Palette::table_bits)
            .or(self.global_table_bits)
            .unwrap_or(8);
        let color_depth = options.color_depth.unwrap_or(table_bits).clamp(1, 8);

        if let Some(palette) = global_palette {
            trace!(
                "{width}x{height} canvas, {} global colors, repeat {:?}",
                palette.len(),
                options.repeat
            );
            blocks::write_logical_screen_descriptor(
                &mut self.stream,
                width,
                height,
                palette,
                color_depth,
            );
            blocks::write_color_table(&mut self.stream, palette);
            if let Some(repeat) = options.repeat {
                blocks::write_netscape_ext(&mut self.stream, repeat);
            }
            self.global_table_bits = Some(palette.table_bits());
        }

        let transparent_index = options.transparent.then_some(options.transparent_index);
        let disposal = options.dispose.unwrap_or(if options.transparent {
            DisposalMethod::Background
        } else {
            DisposalMethod::Any
        });
        blocks::write_graphic_control_ext(
            &mut self.stream,
            disposal,
            options.delay,
            transparent_index,
        );

        let local_palette = options.palette.filter(|_| !first);
        blocks::write_image_descriptor(&mut self.stream, width, height, local_palette);
        if let Some(palette) = local_palette {
            blocks::write_color_table(&mut self.stream, palette);
        }

        let start = self.stream.len();
        self.scratch.encode(indices, color_depth, &mut self.stream);

        self.state = State::FramesWritten;
        self.frame_count += 1;
        debug!(
            "frame {}: {width}x{height}, {} bytes of image data, delay {}cs",
            self.frame_count,
            self.stream.len() - start,
            options.delay
        );

        Ok(())
    }

    /// Appends the trailer. Further frames are rejected.
    pub fn finish(&mut self) {
        if self.state != State::Finished {
            self.stream.write_byte(TRAILER);
            self.state = State::Finished;
        }
    }

    /// Discards everything written so far, keeping the allocations.
    pub fn reset(&mut self) {
        self.stream.reset();
        self.state = State::Uninitialized;
        self.global_table_bits = None;
        self.frame_count = 0;
    }

    pub fn is_finished(&self) -> bool {
        self.state == State::Finished
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn stream(&self) -> &ByteStream {
        &self.stream
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.stream.bytes()
    }

    pub fn bytes_view(&self) -> &[u8] {
        self.stream.bytes_view()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.stream.into_bytes()
    }
}
