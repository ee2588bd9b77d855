//! Pairwise-nearest-neighbor (PNN) color quantization.
//!
//! Every distinct truncated color becomes a bin holding the average of the texels that fell into
//! it. Bins sit in a doubly linked list (ordered by key) inside a flat arena. Each bin remembers
//! its cheapest merge partner further down the list and the squared error that merge would add;
//! a binary min-heap over bin indices hands out the cheapest merge. Cached errors are only
//! revalidated when they reach the top of the heap, using per-bin timestamps.

use crate::{utils::texels, ColorFormat, Palette, MAX_PALETTE_LEN};
use itertools::Itertools;
use log::{debug, trace};
use snafu::{ensure, Snafu};

/// Bin counts are replaced by their square roots when `max_colors² / bins` is below this value.
///
/// Dampening keeps a handful of very frequent colors from claiming the whole palette when the
/// image has far more colors than requested. The value is empirical and not optimal for every
/// input.
pub const SQRT_DAMPENING_THRESHOLD: f64 = 0.022;

/// `mtm` of a bin that was merged into another one.
const DELETED: u32 = u32::MAX;

#[derive(Debug, Snafu)]
pub enum QuantizeError {
    #[snafu(display("The RGBA buffer length must be a multiple of 4, got {len} bytes"))]
    InvalidPixelBuffer { len: usize },
    #[snafu(display("Max colors must be between 1 and 256, got {max_colors}"))]
    InvalidMaxColors { max_colors: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantizeOptions {
    pub format: ColorFormat,
    /// Allow square-root count dampening, see [`SQRT_DAMPENING_THRESHOLD`].
    pub use_sqrt: bool,
    /// Entries with alpha at or below `clear_alpha_threshold` become fully transparent
    /// `clear_alpha_color` gray. Only applies to [`ColorFormat::Rgba4444`].
    pub clear_alpha: bool,
    pub clear_alpha_threshold: u8,
    pub clear_alpha_color: u8,
    /// Snap entry alpha to 0 (at or below the threshold) or 255.
    pub one_bit_alpha: Option<u8>,
}

impl Default for QuantizeOptions {
    fn default() -> Self {
        Self {
            format: ColorFormat::Rgb565,
            use_sqrt: true,
            clear_alpha: true,
            clear_alpha_threshold: 0,
            clear_alpha_color: 0,
            one_bit_alpha: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Bin {
    ac: f64,
    rc: f64,
    gc: f64,
    bc: f64,
    cnt: f64,
    /// Cheapest merge partner, further down the list.
    nn: usize,
    /// Error added by merging with `nn`. Infinite for the tail of the list.
    err: f64,
    fw: usize,
    bk: usize,
    /// When `err` was computed.
    tm: u32,
    /// When this bin last absorbed another bin, or [`DELETED`].
    mtm: u32,
}

/// Reduces `rgba` to at most `max_colors` colors.
///
/// The palette is shorter than `max_colors` when the image has fewer distinct colors at the
/// granularity of `options.format`.
///
/// Nearest-partner searches scan the remaining bins, so the cost grows with the square of the
/// number of distinct keys. Noisy or photographic input can fill all 65536 [`ColorFormat::Rgb565`]
/// bins and take seconds; use [`ColorFormat::Rgb444`] (at most 4096 bins) or run [`prequantize`]
/// first for such frames.
pub fn quantize(
    rgba: &[u8],
    max_colors: usize,
    options: &QuantizeOptions,
) -> Result<Palette, QuantizeError> {
    quantize_frames(&[rgba], max_colors, options)
}

/// Builds one palette for several RGBA buffers, as if they were concatenated.
pub fn quantize_frames(
    frames: &[&[u8]],
    max_colors: usize,
    options: &QuantizeOptions,
) -> Result<Palette, QuantizeError> {
    for rgba in frames {
        ensure!(rgba.len() % 4 == 0, InvalidPixelBufferSnafu { len: rgba.len() });
    }
    ensure!(
        (1..=MAX_PALETTE_LEN).contains(&max_colors),
        InvalidMaxColorsSnafu { max_colors }
    );

    let has_alpha = options.format.has_alpha();
    let mut bins = build_histogram(frames, options.format);
    if bins.is_empty() {
        return Ok(Palette {
            colors: Vec::new(),
            has_alpha,
        });
    }

    let use_sqrt = options.use_sqrt && dampened(max_colors, bins.len());
    trace!(
        "{} texels, {} bins, sqrt dampening: {use_sqrt}",
        frames.iter().map(|rgba| rgba.len() / 4).sum::<usize>(),
        bins.len()
    );

    link(&mut bins, use_sqrt);
    let merges = reduce(&mut bins, max_colors, has_alpha);
    let palette = extract(&bins, options);

    debug!(
        "quantized {} bins to {} colors in {merges} merges",
        bins.len(),
        palette.len()
    );

    Ok(palette)
}

fn dampened(max_colors: usize, bin_count: usize) -> bool {
    let ratio = (max_colors * max_colors) as f64 / bin_count as f64;
    ratio < SQRT_DAMPENING_THRESHOLD
}

/// Builds one bin per distinct key and returns the non-empty ones, in key order, holding channel
/// averages.
fn build_histogram(frames: &[&[u8]], format: ColorFormat) -> Vec<Bin> {
    let has_alpha = format.has_alpha();
    let mut bins = vec![Bin::default(); format.bin_count()];

    for texel in frames.iter().flat_map(|rgba| texels(rgba)) {
        let [r, g, b, a] = texel;
        let bin = &mut bins[format.key(texel)];
        bin.rc += f64::from(r);
        bin.gc += f64::from(g);
        bin.bc += f64::from(b);
        if has_alpha {
            bin.ac += f64::from(a);
        }
        bin.cnt += 1.0;
    }

    bins.retain(|bin| bin.cnt > 0.0);
    for bin in &mut bins {
        let d = 1.0 / bin.cnt;
        bin.rc *= d;
        bin.gc *= d;
        bin.bc *= d;
        bin.ac *= d;
    }

    bins
}

fn link(bins: &mut [Bin], use_sqrt: bool) {
    let len = bins.len();
    for i in 0..len {
        bins[i].fw = if i + 1 < len { i + 1 } else { 0 };
        bins[i].bk = i.saturating_sub(1);
        if use_sqrt {
            bins[i].cnt = bins[i].cnt.sqrt();
        }
    }
}

#[inline]
fn sqr(v: f64) -> f64 {
    v * v
}

/// Error added by merging `a` and `b`, or `None` once it reaches `limit`.
#[inline]
fn merge_cost(a: &Bin, b: &Bin, weight: f64, limit: f64, has_alpha: bool) -> Option<f64> {
    let mut cost = 0.0;
    if has_alpha {
        cost += weight * sqr(b.ac - a.ac);
        if cost >= limit {
            return None;
        }
    }
    for (x, y) in [(a.rc, b.rc), (a.gc, b.gc), (a.bc, b.bc)] {
        cost += weight * sqr(y - x);
        if cost >= limit {
            return None;
        }
    }
    Some(cost)
}

fn find_nearest(bins: &mut [Bin], idx: usize, has_alpha: bool) {
    let bin1 = bins[idx];
    let mut err = f64::INFINITY;
    let mut nn = 0;

    let mut i = bin1.fw;
    while i != 0 {
        let bin = &bins[i];
        let weight = bin1.cnt * bin.cnt / (bin1.cnt + bin.cnt);
        if weight < err {
            if let Some(cost) = merge_cost(&bin1, bin, weight, err, has_alpha) {
                err = cost;
                nn = i;
            }
        }
        i = bin.fw;
    }

    bins[idx].err = err;
    bins[idx].nn = nn;
}

/// Binary min-heap of bin indices ordered by the bins' cached `err`. Slot 0 is unused.
struct MergeHeap {
    slots: Vec<usize>,
    len: usize,
}

impl MergeHeap {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![0; capacity + 1],
            len: 0,
        }
    }

    fn top(&self) -> Option<usize> {
        (self.len > 0).then(|| self.slots[1])
    }

    fn push(&mut self, bin: usize, bins: &[Bin]) {
        let err = bins[bin].err;
        self.len += 1;

        let mut l = self.len;
        while l > 1 {
            let parent = self.slots[l >> 1];
            if bins[parent].err <= err {
                break;
            }
            self.slots[l] = parent;
            l >>= 1;
        }
        self.slots[l] = bin;
    }

    /// Replaces the top with the last slot. Call [`sift_down_top`](Self::sift_down_top) after.
    fn remove_top(&mut self) {
        self.slots[1] = self.slots[self.len];
        self.len -= 1;
    }

    /// Restores heap order after the top's error changed.
    fn sift_down_top(&mut self, bins: &[Bin]) {
        if self.len == 0 {
            return;
        }

        let top = self.slots[1];
        let err = bins[top].err;

        let mut l = 1;
        loop {
            let mut child = l * 2;
            if child > self.len {
                break;
            }
            if child < self.len && bins[self.slots[child]].err > bins[self.slots[child + 1]].err {
                child += 1;
            }
            if err <= bins[self.slots[child]].err {
                break;
            }
            self.slots[l] = self.slots[child];
            l = child;
        }
        self.slots[l] = top;
    }

    /// Finds the bin whose cached merge is cheapest and still up to date.
    ///
    /// Merged-away bins are dropped from the heap, outdated ones get their partner recomputed
    /// and stamped with `now`.
    fn next_merge(&mut self, bins: &mut [Bin], now: u32, has_alpha: bool) -> Option<usize> {
        loop {
            let b1 = self.top()?;
            let tb = bins[b1];

            if tb.tm >= tb.mtm && bins[tb.nn].mtm <= tb.tm {
                // only the tail has no partner, and it is never the last bin worth merging
                return tb.err.is_finite().then_some(b1);
            }

            if tb.mtm == DELETED {
                self.remove_top();
            } else {
                find_nearest(bins, b1, has_alpha);
                bins[b1].tm = now;
            }
            self.sift_down_top(bins);
        }
    }
}

/// Merges bins until `max_colors` survive. Returns the number of merges.
fn reduce(bins: &mut [Bin], max_colors: usize, has_alpha: bool) -> u32 {
    let mut heap = MergeHeap::with_capacity(bins.len());
    for i in 0..bins.len() {
        find_nearest(bins, i, has_alpha);
        heap.push(i, bins);
    }

    let extra = bins.len().saturating_sub(max_colors);
    let mut merged = 0u32;
    while (merged as usize) < extra {
        let Some(tb_idx) = heap.next_merge(bins, merged, has_alpha) else {
            break;
        };

        merged += 1;
        merge(bins, tb_idx, merged);
    }

    merged
}

/// Folds `bins[tb_idx].nn` into `bins[tb_idx]` and unlinks it.
fn merge(bins: &mut [Bin], tb_idx: usize, stamp: u32) {
    let nb_idx = bins[tb_idx].nn;
    let nb = bins[nb_idx];

    let tb = &mut bins[tb_idx];
    let (n1, n2) = (tb.cnt, nb.cnt);
    let d = 1.0 / (n1 + n2);
    tb.ac = d * (n1 * tb.ac + n2 * nb.ac);
    tb.rc = d * (n1 * tb.rc + n2 * nb.rc);
    tb.gc = d * (n1 * tb.gc + n2 * nb.gc);
    tb.bc = d * (n1 * tb.bc + n2 * nb.bc);
    tb.cnt += n2;
    tb.mtm = stamp;

    bins[nb.bk].fw = nb.fw;
    bins[nb.fw].bk = nb.bk;
    bins[nb_idx].mtm = DELETED;
}

fn extract(bins: &[Bin], options: &QuantizeOptions) -> Palette {
    let has_alpha = options.format.has_alpha();
    let channel = |v: f64| v.round().clamp(0.0, 255.0) as u8;

    let colors = std::iter::successors(Some(0), |&i| Some(bins[i].fw).filter(|&fw| fw != 0))
        .map(|i| {
            let bin = &bins[i];
            let (mut r, mut g, mut b) = (channel(bin.rc), channel(bin.gc), channel(bin.bc));
            let mut a = 0xFF;

            if has_alpha {
                a = channel(bin.ac);
                if let Some(threshold) = options.one_bit_alpha {
                    a = if a <= threshold { 0x00 } else { 0xFF };
                }
                if options.clear_alpha && a <= options.clear_alpha_threshold {
                    let clear = options.clear_alpha_color;
                    (r, g, b, a) = (clear, clear, clear, 0x00);
                }
            }

            [r, g, b, a]
        })
        .unique()
        .collect_vec();

    Palette { colors, has_alpha }
}

/// Rounding applied by [`prequantize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrequantizeOptions {
    /// Step RGB channels are rounded to, `0` and `1` disable rounding.
    pub round_rgb: u8,
    pub round_alpha: u8,
    /// Snap alpha to 0 (at or below the threshold) or 255 before rounding.
    pub one_bit_alpha: Option<u8>,
}

impl Default for PrequantizeOptions {
    fn default() -> Self {
        Self {
            round_rgb: 5,
            round_alpha: 10,
            one_bit_alpha: None,
        }
    }
}

/// Rounds the channels of `rgba` in place so that near-identical colors share a histogram bin.
pub fn prequantize(rgba: &mut [u8], options: &PrequantizeOptions) -> Result<(), QuantizeError> {
    ensure!(rgba.len() % 4 == 0, InvalidPixelBufferSnafu { len: rgba.len() });

    for texel in rgba.chunks_exact_mut(4) {
        let mut a = texel[3];
        if let Some(threshold) = options.one_bit_alpha {
            a = if a <= threshold { 0x00 } else { 0xFF };
        }
        texel[3] = round_step(a, options.round_alpha);
        for c in &mut texel[..3] {
            *c = round_step(*c, options.round_rgb);
        }
    }

    Ok(())
}

fn round_step(byte: u8, step: u8) -> u8 {
    if step <= 1 {
        return byte;
    }
    let step = f64::from(step);
    ((f64::from(byte) / step).round() * step).min(255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_orders_by_error() {
        let mut bins: Vec<Bin> = [5.0, 1.0, 4.0, 2.0, 3.0]
            .into_iter()
            .map(|err| Bin {
                err,
                ..Bin::default()
            })
            .collect();

        let mut heap = MergeHeap::with_capacity(bins.len());
        for i in 0..bins.len() {
            heap.push(i, &bins);
        }

        let mut order = Vec::new();
        while let Some(top) = heap.top() {
            order.push(top);
            heap.remove_top();
            heap.sift_down_top(&bins);
        }
        assert_eq!(order, vec![1, 3, 4, 2, 0]);

        bins[0].err = 0.5;
        heap.push(2, &bins);
        heap.push(0, &bins);
        assert_eq!(heap.top(), Some(0));
    }

    #[test]
    fn dampening_threshold() {
        assert!(dampened(16, 65536));
        assert!(!dampened(256, 65536));
        assert!(!dampened(2, 4));
    }

    #[test]
    fn round_step_saturates() {
        assert_eq!(round_step(255, 10), 255);
        assert_eq!(round_step(254, 10), 250);
        assert_eq!(round_step(12, 5), 10);
        assert_eq!(round_step(13, 5), 15);
        assert_eq!(round_step(13, 1), 13);
    }
}
