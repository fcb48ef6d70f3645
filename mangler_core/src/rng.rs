use rand::Rng;

/// Hard ceiling on the size of any working buffer. Length draws above this
/// indicate a bookkeeping bug somewhere upstream, not a large input.
pub const INPUT_SIZE_LIMIT: usize = 128 * 1024 * 1024;

/// Inclusive bounds of the printable ASCII range used by printable mode.
pub const PRINTABLE_MIN: u8 = 32;
pub const PRINTABLE_MAX: u8 = 126;

/// Canonicalizes a span so every byte lands in 32..=126.
///
/// The mapping is `(b % 95) + 32`. It is not the identity on bytes that are
/// already printable; it is the same rule everywhere, which is what the
/// printable-mode invariant needs.
pub fn to_printable(buf: &mut [u8]) {
    for b in buf.iter_mut() {
        *b = (*b % 95) + PRINTABLE_MIN;
    }
}

/// The randomness a mutation run consumes, expressed as draws rather than as
/// a concrete generator.
///
/// Every `rand::Rng` is a `RandSource` through the blanket impl below, so
/// production code hands in a `ChaCha8Rng` (or any other generator) directly.
/// Tests that need exact control implement the trait themselves and script
/// the individual draws.
///
/// `uniform` with `min > max`, and `skewed` with `max == 0` or
/// `max > INPUT_SIZE_LIMIT`, are programmer errors and panic.
pub trait RandSource {
    /// Raw 64-bit draw.
    fn next_u64(&mut self) -> u64;

    /// Uniform integer in `[min, max]`, both inclusive.
    fn uniform(&mut self, min: u64, max: u64) -> u64;

    /// Integer in `[1, max]` with a quadratic bias toward 1.
    ///
    /// Draws `r` uniformly from `[1, max^2 - 1]` and maps it through
    /// `r^2 / max^3 + 1`. Roughly 75% of results land in the lower half and
    /// ~90% in the lower quarter, which keeps block operators local.
    fn skewed(&mut self, max: usize) -> usize {
        assert!(max != 0, "skewed draw with max == 0");
        assert!(
            max <= INPUT_SIZE_LIMIT,
            "skewed draw with max {max} above the input size limit"
        );
        if max == 1 {
            return 1;
        }

        let m = max as u128;
        let r = self.uniform(1, (m * m - 1) as u64) as u128;
        let ret = (r * r / (m * m * m)) as usize + 1;
        ret.clamp(1, max)
    }

    /// Offset into a buffer of `size` bytes, biased toward the beginning.
    fn offset_below(&mut self, size: usize) -> usize {
        self.skewed(size) - 1
    }

    fn byte(&mut self) -> u8 {
        self.next_u64() as u8
    }

    fn printable_byte(&mut self) -> u8 {
        self.uniform(PRINTABLE_MIN as u64, PRINTABLE_MAX as u64) as u8
    }

    fn coin(&mut self) -> bool {
        self.next_u64() & 1 == 1
    }

    fn fill(&mut self, buf: &mut [u8]) {
        for chunk in buf.chunks_mut(8) {
            let bytes = self.next_u64().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn fill_printable(&mut self, buf: &mut [u8]) {
        self.fill(buf);
        to_printable(buf);
    }
}

impl<R: Rng + ?Sized> RandSource for R {
    fn next_u64(&mut self) -> u64 {
        self.random()
    }

    fn uniform(&mut self, min: u64, max: u64) -> u64 {
        assert!(min <= max, "uniform draw with min {min} > max {max}");
        self.random_range(min..=max)
    }

    fn fill(&mut self, buf: &mut [u8]) {
        Rng::fill(self, buf)
    }
}
