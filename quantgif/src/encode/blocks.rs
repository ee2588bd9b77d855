//! Writers for the fixed-layout GIF blocks. See [`crate::consts`] for the layouts.

use super::{DisposalMethod, Repeat};
use crate::{consts::*, stream::ByteStream, Palette};

pub(crate) fn write_logical_screen_descriptor(
    stream: &mut ByteStream,
    width: u16,
    height: u16,
    palette: &Palette,
    color_depth: u8,
) {
    let global_table = 0x80;
    let color_resolution = ((color_depth - 1) & 0b111) << 4;
    let sorted = 0;
    let table_size = palette.table_bits() - 1;

    stream.write_u16_le(width);
    stream.write_u16_le(height);
    stream.write_byte(global_table | color_resolution | sorted | table_size);
    // background color index, pixel aspect ratio
    stream.write_bytes(&[0x00, 0x00]);
}

/// Writes `palette` padded with black to `2^table_bits` entries.
pub(crate) fn write_color_table(stream: &mut ByteStream, palette: &Palette) {
    let table_len = 1usize << palette.table_bits();
    for i in 0..table_len {
        let [r, g, b, _] = palette.get(i).unwrap_or([0, 0, 0, 0]);
        stream.write_bytes(&[r, g, b]);
    }
}

pub(crate) fn write_netscape_ext(stream: &mut ByteStream, repeat: Repeat) {
    stream.write_bytes(&[EXTENSION_INTRODUCER, APPLICATION_LABEL, NETSCAPE_ID.len() as u8]);
    stream.write_bytes(NETSCAPE_ID);
    // sub-block of 3 bytes, sub-block id 1
    stream.write_bytes(&[0x03, 0x01]);
    stream.write_u16_le(match repeat {
        Repeat::Infinite => 0,
        Repeat::Finite(count) => count,
    });
    stream.write_byte(0x00);
}

pub(crate) fn write_graphic_control_ext(
    stream: &mut ByteStream,
    disposal: DisposalMethod,
    delay: u16,
    transparent_index: Option<u8>,
) {
    let user_input = 0;
    let transparent = u8::from(transparent_index.is_some());
    let fields = ((disposal as u8) & 0b111) << 2 | user_input << 1 | transparent;

    stream.write_bytes(&[EXTENSION_INTRODUCER, GRAPHIC_CONTROL_LABEL, 0x04, fields]);
    stream.write_u16_le(delay);
    stream.write_byte(transparent_index.unwrap_or(0));
    stream.write_byte(0x00);
}

pub(crate) fn write_image_descriptor(
    stream: &mut ByteStream,
    width: u16,
    height: u16,
    local_palette: Option<&Palette>,
) {
    stream.write_byte(IMAGE_SEPARATOR);
    stream.write_u16_le(0);
    stream.write_u16_le(0);
    stream.write_u16_le(width);
    stream.write_u16_le(height);

    let fields = match local_palette {
        // not interlaced, not sorted
        Some(palette) => 0x80 | (palette.table_bits() - 1),
        None => 0x00,
    };
    stream.write_byte(fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn netscape_loop_forever() {
        let mut stream = ByteStream::new();
        write_netscape_ext(&mut stream, Repeat::Infinite);
        assert_eq!(
            stream.bytes_view(),
            b"\x21\xFF\x0BNETSCAPE2.0\x03\x01\x00\x00\x00"
        );
    }

    #[test]
    fn graphic_control_fields() {
        let mut stream = ByteStream::new();
        write_graphic_control_ext(&mut stream, DisposalMethod::Background, 100, Some(3));
        assert_eq!(
            stream.bytes_view(),
            &[0x21, 0xF9, 0x04, 0b0000_1001, 100, 0, 3, 0]
        );
    }

    #[test]
    fn color_table_is_padded() {
        let mut stream = ByteStream::new();
        write_color_table(&mut stream, &Palette::from_rgb([[1, 2, 3], [4, 5, 6], [7, 8, 9]]));
        assert_eq!(
            stream.bytes_view(),
            &[1, 2, 3, 4, 5, 6, 7, 8, 9, 0, 0, 0]
        );
    }
}
