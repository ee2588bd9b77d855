use argh::FromArgs;
use image::{ImageFormat, RgbaImage};
use log::{debug, info};
use quantgif::{
    encode_rgba_frames, prequantize, quantize, AnimationOptions, ColorFormat, PaletteMode,
    PrequantizeOptions, QuantizeOptions, Repeat,
};
use std::{fs::File, io::BufReader, str::FromStr};

/// Quantizing GIF encoder.
#[derive(FromArgs)]
struct Cli {
    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Encode(Encode),
    Palette(PaletteCmd),
}

#[derive(Debug, Clone, Copy)]
struct Format(ColorFormat);

impl FromStr for Format {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        #[rustfmt::skip]
        let Some(format) = s.eq_ignore_ascii_case("rgb565").then_some(ColorFormat::Rgb565)
               .or_else(|| s.eq_ignore_ascii_case("rgb444").then_some(ColorFormat::Rgb444))
               .or_else(|| s.eq_ignore_ascii_case("rgba4444").then_some(ColorFormat::Rgba4444))
        else { return Err("expected rgb565, rgb444 or rgba4444"); };

        Ok(Format(format))
    }
}

/// Encodes one or more images as an animated GIF.
#[derive(FromArgs)]
#[argh(subcommand, name = "encode")]
struct Encode {
    /// the output file
    #[argh(option, short = 'o')]
    output: String,

    /// palette size, 1 to 256 (default 256)
    #[argh(option, default = "256")]
    max_colors: usize,

    /// histogram format: rgb565, rgb444 or rgba4444 (default rgb565)
    #[argh(option)]
    format: Option<Format>,

    /// delay between frames in centiseconds (default 10)
    #[argh(option, default = "10")]
    delay: u16,

    /// loop count, 0 loops forever and -1 plays once (default 0)
    #[argh(option, default = "0")]
    repeat: i32,

    /// quantize every frame on its own instead of sharing one palette
    #[argh(switch)]
    local_palettes: bool,

    /// round channels before quantizing so near-identical colors share a bin
    #[argh(switch)]
    prequantize: bool,

    /// the input frames. May be PNG, JPG, or BMP, all with the same dimensions.
    #[argh(positional)]
    inputs: Vec<String>,
}

/// Prints the quantized palette of an image.
#[derive(FromArgs)]
#[argh(subcommand, name = "palette")]
struct PaletteCmd {
    /// palette size, 1 to 256 (default 16)
    #[argh(option, default = "16")]
    max_colors: usize,

    /// histogram format: rgb565, rgb444 or rgba4444 (default rgb565)
    #[argh(option)]
    format: Option<Format>,

    /// the input file. May be a PNG, JPG, or BMP.
    #[argh(positional)]
    input: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { command } = argh::from_env();

    match command {
        Command::Encode(options) => encode(options),
        Command::Palette(options) => palette(options),
    }
}

fn load_rgba(path: &str) -> Result<RgbaImage, Box<dyn std::error::Error>> {
    let reader = BufReader::new(File::open(path)?);
    let image = match ImageFormat::from_path(path) {
        Ok(format) => image::io::Reader::with_format(reader, format).decode()?,
        Err(_) => image::io::Reader::new(reader)
            .with_guessed_format()?
            .decode()?,
    };
    debug!("loaded `{path}`: {}x{}", image.width(), image.height());
    Ok(image.into_rgba8())
}

fn encode(options: Encode) -> Result<(), Box<dyn std::error::Error>> {
    let Encode {
        output,
        max_colors,
        format,
        delay,
        repeat,
        local_palettes,
        prequantize: round,
        inputs,
    } = options;

    if inputs.is_empty() {
        return Err("at least one input image is required".into());
    }

    let mut frames = Vec::with_capacity(inputs.len());
    for input in &inputs {
        let mut frame = load_rgba(input)?;
        if round {
            prequantize(&mut frame, &PrequantizeOptions::default())?;
        }
        frames.push(frame);
    }

    let (width, height) = frames[0].dimensions();
    if width > u16::MAX as u32 || height > u16::MAX as u32 {
        return Err("image dimensions are too large".into());
    }
    if let Some((input, frame)) = inputs
        .iter()
        .zip(&frames)
        .find(|(_, frame)| frame.dimensions() != (width, height))
    {
        let (w, h) = frame.dimensions();
        return Err(format!("`{input}` is {w}x{h}, expected {width}x{height}").into());
    }

    println!("Encoding {} frame(s) of {width}x{height}", frames.len());

    let repeat = match repeat {
        r if r < 0 => None,
        0 => Some(Repeat::Infinite),
        r => Some(Repeat::Finite(u16::try_from(r)?)),
    };
    let options = AnimationOptions {
        max_colors,
        quantize: QuantizeOptions {
            format: format.map_or(ColorFormat::default(), |Format(f)| f),
            ..QuantizeOptions::default()
        },
        palette_mode: if local_palettes {
            PaletteMode::PerFrame
        } else {
            PaletteMode::Global
        },
        delay,
        repeat,
        ..AnimationOptions::default()
    };
    info!("{options:?}");

    let frames: Vec<&[u8]> = frames.iter().map(|frame| frame.as_raw().as_slice()).collect();
    let gif = encode_rgba_frames(&frames, width as u16, height as u16, &options)?;

    std::fs::write(&output, &gif)?;
    println!("Written {} bytes to `{output}`", gif.len());

    Ok(())
}

fn palette(options: PaletteCmd) -> Result<(), Box<dyn std::error::Error>> {
    let PaletteCmd {
        max_colors,
        format,
        input,
    } = options;

    let image = load_rgba(&input)?;
    let options = QuantizeOptions {
        format: format.map_or(ColorFormat::default(), |Format(f)| f),
        ..QuantizeOptions::default()
    };
    let palette = quantize(image.as_raw(), max_colors, &options)?;

    println!("{} colors for `{input}`", palette.len());
    for [r, g, b, a] in palette.iter() {
        if palette.has_alpha() {
            println!("#{r:02x}{g:02x}{b:02x}{a:02x}");
        } else {
            println!("#{r:02x}{g:02x}{b:02x}");
        }
    }

    Ok(())
}
