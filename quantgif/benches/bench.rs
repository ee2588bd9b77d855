use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use quantgif::{
    apply_palette, encode_rgba_frames, lzw, quantize, AnimationOptions, ColorFormat, FrameOptions,
    GifEncoder, QuantizeOptions,
};

const SIZES: [(usize, usize); 3] = [(64, 64), (320, 240), (1024, 768)];

/// Diagonal gradient with per-frame hue shift and cheap noise, roughly what a screen capture of
/// a UI with photos looks like to the quantizer.
fn synthetic_frame(width: usize, height: usize, frame: usize) -> Vec<u8> {
    let mut seed = 0x2545_F491u32 ^ frame as u32;
    let mut rgba = Vec::with_capacity(width * height * 4);
    for y in 0..height {
        for x in 0..width {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let noise = (seed & 0x0F) as usize;
            rgba.extend_from_slice(&[
                ((x + frame * 8) * 255 / width) as u8,
                (y * 255 / height) as u8,
                (((x + y) / 2 + noise) & 0xFF) as u8,
                255,
            ]);
        }
    }
    rgba
}

fn quantize_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("quantize");

    for (width, height) in SIZES {
        let rgba = synthetic_frame(width, height, 0);
        let name = format!("{width}x{height}");
        group.throughput(Throughput::Elements((width * height) as u64));

        for format in [ColorFormat::Rgb565, ColorFormat::Rgb444] {
            let options = QuantizeOptions {
                format,
                ..QuantizeOptions::default()
            };
            group.bench_with_input(
                BenchmarkId::new(format!("{format:?} 256"), &name),
                &rgba,
                |b, rgba| b.iter(|| quantize(rgba, 256, &options).unwrap()),
            );
        }
    }
}

fn map_and_compress(c: &mut Criterion) {
    let mut group = c.benchmark_group("palettize");

    for (width, height) in SIZES {
        let rgba = synthetic_frame(width, height, 0);
        let options = QuantizeOptions::default();
        let palette = quantize(&rgba, 256, &options).unwrap();
        let indices = apply_palette(&rgba, &palette, options.format).unwrap();
        let name = format!("{width}x{height}");

        group.throughput(Throughput::Elements((width * height) as u64));
        group.bench_with_input(BenchmarkId::new("apply_palette", &name), &rgba, |b, rgba| {
            b.iter(|| apply_palette(rgba, &palette, options.format).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("lzw", &name), &indices, |b, indices| {
            b.iter(|| lzw::encode_to_vec(indices, palette.table_bits()))
        });
        group.bench_with_input(
            BenchmarkId::new("write_frame", &name),
            &indices,
            |b, indices| {
                let mut encoder = GifEncoder::new();
                b.iter(|| {
                    encoder.reset();
                    encoder
                        .write_frame(
                            indices,
                            width as u16,
                            height as u16,
                            &FrameOptions {
                                palette: Some(&palette),
                                ..FrameOptions::default()
                            },
                        )
                        .unwrap();
                    encoder.finish();
                })
            },
        );
    }
}

fn animation(c: &mut Criterion) {
    let mut group = c.benchmark_group("animation");
    group.sample_size(10);

    let (width, height) = (320, 240);
    let frames: Vec<Vec<u8>> = (0..8).map(|i| synthetic_frame(width, height, i)).collect();
    let frames: Vec<&[u8]> = frames.iter().map(Vec::as_slice).collect();
    group.throughput(Throughput::Elements((width * height * frames.len()) as u64));

    for (label, palette_mode) in [
        ("global", quantgif::PaletteMode::Global),
        ("per frame", quantgif::PaletteMode::PerFrame),
    ] {
        let options = AnimationOptions {
            palette_mode,
            delay: 4,
            ..AnimationOptions::default()
        };
        group.bench_function(label, |b| {
            b.iter(|| encode_rgba_frames(&frames, width as u16, height as u16, &options).unwrap())
        });
    }
}

criterion_group!(benches, quantize_frames, map_and_compress, animation);
criterion_main!(benches);
