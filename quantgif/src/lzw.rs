//! GIF flavoured LZW compression.
//!
//! Codes are variable width (min code size + 1 up to 12 bits), packed LSB first and emitted as
//! length prefixed sub-blocks of at most 254 bytes, followed by a zero length terminator.

use crate::stream::ByteStream;

/// Widest code the GIF format allows.
pub const MAX_CODE_BITS: u32 = 12;
/// Number of codes in the 12-bit code space.
pub const MAX_CODES: u32 = 1 << MAX_CODE_BITS;
/// Slots of the open-addressed string table, roughly 80% occupied once the code space is full.
pub const HASH_SIZE: usize = 5003;
/// Smallest minimum code size a GIF decoder accepts.
pub const MIN_CODE_SIZE: u8 = 2;

const BLOCK_CAPACITY: usize = 254;
const HASH_SHIFT: u32 = hash_shift(HASH_SIZE);

const fn hash_shift(hash_size: usize) -> u32 {
    let mut shift = 0;
    let mut fcode = hash_size;
    while fcode < 65536 {
        fcode *= 2;
        shift += 1;
    }
    8 - shift
}

/// Tables reused between encodes. Every encode reinitialises them before use.
#[derive(Debug, Clone)]
pub struct LzwScratch {
    accum: [u8; 256],
    htab: Box<[i32]>,
    codetab: Box<[u16]>,
}

impl Default for LzwScratch {
    fn default() -> Self {
        Self::new()
    }
}

impl LzwScratch {
    pub fn new() -> Self {
        Self {
            accum: [0; 256],
            htab: vec![-1; HASH_SIZE].into_boxed_slice(),
            codetab: vec![0; HASH_SIZE].into_boxed_slice(),
        }
    }

    /// Compresses `indices` into `stream`: minimum code size byte, sub-blocks, terminator.
    ///
    /// Every index must be below `2^max(color_depth, 2)`.
    pub fn encode(&mut self, indices: &[u8], color_depth: u8, stream: &mut ByteStream) {
        let init_code_size = color_depth.clamp(MIN_CODE_SIZE, 8);

        let Self {
            accum,
            htab,
            codetab,
        } = self;
        accum.fill(0);
        htab.fill(-1);
        codetab.fill(0);

        stream.write_byte(init_code_size);

        let mut w = CodeWriter::new(init_code_size, accum, stream);
        let clear_code = w.clear_code;
        w.output(clear_code);

        let Some((&first, rest)) = indices.split_first() else {
            w.finish();
            return;
        };

        let mut ent = u32::from(first);
        'pixels: for &c in rest {
            let c = u32::from(c);
            let fcode = ((c << MAX_CODE_BITS) + ent) as i32;
            let mut i = ((c << HASH_SHIFT) ^ ent) as usize;

            if htab[i] == fcode {
                ent = u32::from(codetab[i]);
                continue;
            }

            // secondary probe
            let disp = if i == 0 { 1 } else { HASH_SIZE - i };
            while htab[i] >= 0 {
                i = if i >= disp { i - disp } else { i + HASH_SIZE - disp };
                if htab[i] == fcode {
                    ent = u32::from(codetab[i]);
                    continue 'pixels;
                }
            }

            w.output(ent);
            ent = c;

            if w.free_ent < MAX_CODES {
                codetab[i] = w.free_ent as u16;
                htab[i] = fcode;
                w.free_ent += 1;
            } else {
                htab.fill(-1);
                w.free_ent = clear_code + 2;
                w.clear_flag = true;
                w.output(clear_code);
            }
        }

        w.output(ent);
        w.finish();
    }
}

/// Compresses `indices` into a fresh buffer.
pub fn encode_to_vec(indices: &[u8], color_depth: u8) -> Vec<u8> {
    let mut stream = ByteStream::with_capacity(512);
    LzwScratch::new().encode(indices, color_depth, &mut stream);
    stream.into_bytes()
}

/// Bit packer and code width bookkeeping.
struct CodeWriter<'a> {
    stream: &'a mut ByteStream,
    accum: &'a mut [u8; 256],
    a_count: usize,

    cur_accum: u32,
    cur_bits: u32,

    init_bits: u32,
    n_bits: u32,
    maxcode: u32,
    clear_code: u32,
    eoi_code: u32,
    free_ent: u32,
    clear_flag: bool,
}

impl<'a> CodeWriter<'a> {
    fn new(init_code_size: u8, accum: &'a mut [u8; 256], stream: &'a mut ByteStream) -> Self {
        let init_bits = u32::from(init_code_size) + 1;
        let clear_code = 1 << init_code_size;
        Self {
            stream,
            accum,
            a_count: 0,
            cur_accum: 0,
            cur_bits: 0,
            init_bits,
            n_bits: init_bits,
            maxcode: (1 << init_bits) - 1,
            clear_code,
            eoi_code: clear_code + 1,
            free_ent: clear_code + 2,
            clear_flag: false,
        }
    }

    fn output(&mut self, code: u32) {
        self.cur_accum &= (1 << self.cur_bits) - 1;
        self.cur_accum |= code << self.cur_bits;
        self.cur_bits += self.n_bits;

        while self.cur_bits >= 8 {
            self.packetize(self.cur_accum as u8);
            self.cur_accum >>= 8;
            self.cur_bits -= 8;
        }

        if self.clear_flag {
            self.n_bits = self.init_bits;
            self.maxcode = (1 << self.n_bits) - 1;
            self.clear_flag = false;
        } else if self.free_ent > self.maxcode {
            self.n_bits += 1;
            self.maxcode = if self.n_bits == MAX_CODE_BITS {
                MAX_CODES
            } else {
                (1 << self.n_bits) - 1
            };
        }
    }

    /// Writes the end-of-information code, drains the bit accumulator and terminates the blocks.
    fn finish(mut self) {
        let eoi_code = self.eoi_code;
        self.output(eoi_code);

        while self.cur_bits > 0 {
            self.packetize(self.cur_accum as u8);
            self.cur_accum >>= 8;
            self.cur_bits = self.cur_bits.saturating_sub(8);
        }
        self.flush_block();
        self.stream.write_byte(0);
    }

    #[inline]
    fn packetize(&mut self, byte: u8) {
        self.accum[self.a_count] = byte;
        self.a_count += 1;
        if self.a_count >= BLOCK_CAPACITY {
            self.flush_block();
        }
    }

    fn flush_block(&mut self) {
        if self.a_count > 0 {
            self.stream.write_byte(self.a_count as u8);
            self.stream.write_bytes_view(&self.accum[..], 0, self.a_count);
            self.a_count = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Concatenates the sub-blocks that follow the minimum code size byte.
    fn unblock(encoded: &[u8]) -> Vec<u8> {
        let mut data = Vec::new();
        let mut pos = 1;
        loop {
            let len = usize::from(encoded[pos]);
            pos += 1;
            if len == 0 {
                break;
            }
            assert!(len <= 255);
            data.extend_from_slice(&encoded[pos..pos + len]);
            pos += len;
        }
        assert_eq!(pos, encoded.len(), "data after the block terminator");
        data
    }

    #[test]
    fn shift_matches_table_size() {
        assert_eq!(HASH_SHIFT, 4);
    }

    #[test]
    fn single_pixel() {
        // clear (4), index 0, eoi (5), all 3 bits wide
        let encoded = encode_to_vec(&[0], 2);
        assert_eq!(encoded[0], 2);
        assert_eq!(unblock(&encoded), vec![0b01_000_100, 0b0000_1]);
    }

    #[test]
    fn empty_input_is_clear_then_eoi() {
        let encoded = encode_to_vec(&[], 2);
        assert_eq!(unblock(&encoded), vec![0b00_101_100]);
    }

    #[test]
    fn color_depth_is_clamped() {
        assert_eq!(encode_to_vec(&[1, 1], 1)[0], 2);
        assert_eq!(encode_to_vec(&[1, 1], 8)[0], 8);
    }

    #[test]
    fn sub_blocks_hold_at_most_254_bytes() {
        let mut seed = 0x2545_F491u32;
        let indices: Vec<u8> = (0..20_000)
            .map(|_| {
                seed ^= seed << 13;
                seed ^= seed >> 17;
                seed ^= seed << 5;
                seed as u8
            })
            .collect();
        let encoded = encode_to_vec(&indices, 8);

        let mut pos = 1;
        while encoded[pos] != 0 {
            assert!(encoded[pos] as usize <= BLOCK_CAPACITY);
            pos += encoded[pos] as usize + 1;
        }
        assert_eq!(pos + 1, encoded.len());
    }

    #[test]
    fn scratch_reuse_is_deterministic() {
        let a: Vec<u8> = (0..4096u32).map(|i| (i * 7 % 13) as u8).collect();
        let b: Vec<u8> = (0..999u32).map(|i| (i % 3) as u8).collect();

        let mut scratch = LzwScratch::new();
        let mut stream = ByteStream::new();
        scratch.encode(&a, 4, &mut stream);
        stream.reset();
        scratch.encode(&b, 2, &mut stream);

        assert_eq!(stream.bytes(), encode_to_vec(&b, 2));
    }
}
