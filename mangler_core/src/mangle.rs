use crate::buffer::FuzzInput;
use crate::config::MutateConfig;
use crate::corpus::Corpus;
use crate::dict::Dictionary;
use crate::feedback::{CmpFeedback, CMP_ENTRY_BYTES};
use crate::magic::MAGIC_VALUES;
use crate::rng::{to_printable, RandSource};
use crate::timing::{Clock, CoverageTiming, SystemClock};
use std::sync::atomic::{fence, Ordering};

/// Upper bound for most block operators, to keep mutations local.
pub const MAX_BLOCK_LEN: usize = 512;

/// Milliseconds without a coverage update before the driver injects an extra
/// splice.
const STALL_MILLIS: u64 = 1000;

/// One mutation operator.
///
/// `Resize` is applied by the driver when the buffer is empty and never
/// selected from `OPERATOR_TABLE`; everything else is fair game each round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MangleOp {
    Shrink,
    Expand,
    Bit,
    IncByte,
    DecByte,
    NegByte,
    AddSub,
    MemSet,
    MemCopyOverwrite,
    MemCopyInsert,
    BytesOverwrite,
    BytesInsert,
    AsciiNumOverwrite,
    AsciiNumInsert,
    ByteRepeatOverwrite,
    ByteRepeatInsert,
    MagicOverwrite,
    MagicInsert,
    DictOverwrite,
    DictInsert,
    CmpFeedbackOverwrite,
    CmpFeedbackInsert,
    RandomOverwrite,
    RandomInsert,
    SpliceOverwrite,
    SpliceInsert,
    Resize,
}

/// Selection table for the driver. `Shrink` is listed four times: every
/// insert-style operator and `Expand` grow the buffer, so the extra shrink
/// slots keep size drift bounded.
pub const OPERATOR_TABLE: [MangleOp; 29] = [
    MangleOp::Shrink,
    MangleOp::Shrink,
    MangleOp::Shrink,
    MangleOp::Shrink,
    MangleOp::Expand,
    MangleOp::Bit,
    MangleOp::IncByte,
    MangleOp::DecByte,
    MangleOp::NegByte,
    MangleOp::AddSub,
    MangleOp::MemSet,
    MangleOp::MemCopyOverwrite,
    MangleOp::MemCopyInsert,
    MangleOp::BytesOverwrite,
    MangleOp::BytesInsert,
    MangleOp::AsciiNumOverwrite,
    MangleOp::AsciiNumInsert,
    MangleOp::ByteRepeatOverwrite,
    MangleOp::ByteRepeatInsert,
    MangleOp::MagicOverwrite,
    MangleOp::MagicInsert,
    MangleOp::DictOverwrite,
    MangleOp::DictInsert,
    MangleOp::CmpFeedbackOverwrite,
    MangleOp::CmpFeedbackInsert,
    MangleOp::RandomOverwrite,
    MangleOp::RandomInsert,
    MangleOp::SpliceOverwrite,
    MangleOp::SpliceInsert,
];

static SYSTEM_CLOCK: SystemClock = SystemClock;

/// The mutation engine: a stateless dispatcher over the operator catalog.
///
/// The engine holds the exclusive mutable borrow of the working buffer only
/// for the duration of a call; every collaborator it is built from is
/// read-only. It performs no heap allocation and cannot fail: out-of-bounds
/// writes clamp, missing dictionaries and an empty corpus fall back to plain
/// byte writes, growth at the cap is a no-op.
///
/// Given the same random stream, configuration and external dictionaries,
/// `mangle` is reproducible; the wall-clock stall check is the only draw
/// outside the random stream.
pub struct Mangler<'a> {
    cfg: &'a MutateConfig,
    dictionary: &'a Dictionary,
    corpus: &'a dyn Corpus,
    cmp_feedback: Option<&'a CmpFeedback>,
    timing: &'a CoverageTiming,
    clock: &'a dyn Clock,
}

impl<'a> Mangler<'a> {
    pub fn new(
        cfg: &'a MutateConfig,
        dictionary: &'a Dictionary,
        corpus: &'a dyn Corpus,
        timing: &'a CoverageTiming,
    ) -> Self {
        Self {
            cfg,
            dictionary,
            corpus,
            cmp_feedback: None,
            timing,
            clock: &SYSTEM_CLOCK,
        }
    }

    pub fn with_cmp_feedback(mut self, feedback: &'a CmpFeedback) -> Self {
        self.cmp_feedback = Some(feedback);
        self
    }

    pub fn with_clock(mut self, clock: &'a dyn Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Mutates `input` in place. `slow_factor` summarizes how slow the target
    /// was on this input; higher values force more operator applications.
    pub fn mangle(&self, input: &mut FuzzInput, rng: &mut dyn RandSource, slow_factor: u8) {
        if self.cfg.mutations_per_run == 0 {
            return;
        }
        let printable = self.cfg.only_printable;
        if input.is_empty() {
            self.resize(input, rng, printable);
        }

        // Slow inputs get a harder shake-up.
        let changes = match slow_factor {
            0..=2 => rng.uniform(1, self.cfg.mutations_per_run),
            3..=4 => self.cfg.mutations_per_run.max(5),
            5..=9 => self.cfg.mutations_per_run.max(7),
            _ => self.cfg.mutations_per_run.max(10),
        };

        // Coverage has stalled; try cross-pollinating from another input.
        let stalled = self
            .clock
            .now_millis()
            .saturating_sub(self.timing.last_update_millis())
            > STALL_MILLIS;
        if stalled {
            match rng.next_u64() % 3 {
                0 => self.splice_overwrite(input, rng, printable),
                1 => self.splice_insert(input, rng, printable),
                _ => {}
            }
        }

        for _ in 0..changes {
            let choice = rng.uniform(0, OPERATOR_TABLE.len() as u64 - 1) as usize;
            self.apply(OPERATOR_TABLE[choice], input, rng, printable);
        }

        // Publish the finished buffer to any thread that reads it next.
        fence(Ordering::Release);
    }

    /// Applies a single operator. The buffer must be non-empty for every
    /// operator except `Resize`.
    pub fn apply(
        &self,
        op: MangleOp,
        input: &mut FuzzInput,
        rng: &mut dyn RandSource,
        printable: bool,
    ) {
        match op {
            MangleOp::Shrink => self.shrink(input, rng),
            MangleOp::Expand => self.expand(input, rng, printable),
            MangleOp::Bit => self.bit(input, rng, printable),
            MangleOp::IncByte => self.inc_byte(input, rng, printable),
            MangleOp::DecByte => self.dec_byte(input, rng, printable),
            MangleOp::NegByte => self.neg_byte(input, rng, printable),
            MangleOp::AddSub => self.add_sub(input, rng, printable),
            MangleOp::MemSet => self.mem_set(input, rng, printable),
            MangleOp::MemCopyOverwrite => self.mem_copy_overwrite(input, rng, printable),
            MangleOp::MemCopyInsert => self.mem_copy_insert(input, rng, printable),
            MangleOp::BytesOverwrite => self.bytes_overwrite(input, rng, printable),
            MangleOp::BytesInsert => self.bytes_insert(input, rng, printable),
            MangleOp::AsciiNumOverwrite => self.ascii_num_overwrite(input, rng, printable),
            MangleOp::AsciiNumInsert => self.ascii_num_insert(input, rng, printable),
            MangleOp::ByteRepeatOverwrite => self.byte_repeat_overwrite(input, rng, printable),
            MangleOp::ByteRepeatInsert => self.byte_repeat_insert(input, rng, printable),
            MangleOp::MagicOverwrite => self.magic_overwrite(input, rng, printable),
            MangleOp::MagicInsert => self.magic_insert(input, rng, printable),
            MangleOp::DictOverwrite => self.dict_overwrite(input, rng, printable),
            MangleOp::DictInsert => self.dict_insert(input, rng, printable),
            MangleOp::CmpFeedbackOverwrite => self.cmp_feedback_overwrite(input, rng, printable),
            MangleOp::CmpFeedbackInsert => self.cmp_feedback_insert(input, rng, printable),
            MangleOp::RandomOverwrite => self.random_overwrite(input, rng, printable),
            MangleOp::RandomInsert => self.random_insert(input, rng, printable),
            MangleOp::SpliceOverwrite => self.splice_overwrite(input, rng, printable),
            MangleOp::SpliceInsert => self.splice_insert(input, rng, printable),
            MangleOp::Resize => self.resize(input, rng, printable),
        }
    }

    fn bit(&self, input: &mut FuzzInput, rng: &mut dyn RandSource, printable: bool) {
        let off = rng.offset_below(input.size());
        input.bytes_mut()[off] ^= 1u8 << rng.uniform(0, 7);
        if printable {
            to_printable(&mut input.bytes_mut()[off..off + 1]);
        }
    }

    fn inc_byte(&self, input: &mut FuzzInput, rng: &mut dyn RandSource, printable: bool) {
        let off = rng.offset_below(input.size());
        let b = input.bytes()[off];
        input.bytes_mut()[off] = if printable {
            b.wrapping_sub(32).wrapping_add(1) % 95 + 32
        } else {
            b.wrapping_add(1)
        };
    }

    fn dec_byte(&self, input: &mut FuzzInput, rng: &mut dyn RandSource, printable: bool) {
        let off = rng.offset_below(input.size());
        let b = input.bytes()[off];
        input.bytes_mut()[off] = if printable {
            b.wrapping_sub(32).wrapping_add(94) % 95 + 32
        } else {
            b.wrapping_sub(1)
        };
    }

    fn neg_byte(&self, input: &mut FuzzInput, rng: &mut dyn RandSource, printable: bool) {
        let off = rng.offset_below(input.size());
        let b = input.bytes()[off];
        input.bytes_mut()[off] = if printable {
            // Reflect around the middle of 32..=126; its own inverse.
            94u8.wrapping_sub(b.wrapping_sub(32)).wrapping_add(32)
        } else {
            !b
        };
    }

    fn add_sub(&self, input: &mut FuzzInput, rng: &mut dyn RandSource, printable: bool) {
        let off = rng.offset_below(input.size());

        let mut width = 1usize << rng.uniform(0, 3);
        if input.size() - off < width {
            width = 1;
        }

        let range: u64 = match width {
            1 => 16,
            2 => 4096,
            4 => 1_048_576,
            8 => 268_435_456,
            _ => unreachable!("add/sub width {width}"),
        };
        let delta = rng.uniform(0, range * 2) as i64 - range as i64;

        match width {
            1 => {
                let b = input.bytes()[off].wrapping_add(delta as u8);
                input.bytes_mut()[off] = b;
                if printable {
                    to_printable(&mut input.bytes_mut()[off..off + 1]);
                }
            }
            2 => {
                let mut raw = [0u8; 2];
                raw.copy_from_slice(&input.bytes()[off..off + 2]);
                let mut val = i16::from_ne_bytes(raw);
                val = if rng.coin() {
                    val.wrapping_add(delta as i16)
                } else {
                    // Pretend the target stores this field byte-swapped.
                    val.swap_bytes().wrapping_add(delta as i16).swap_bytes()
                };
                input.overwrite(off, &val.to_ne_bytes(), printable);
            }
            4 => {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(&input.bytes()[off..off + 4]);
                let mut val = i32::from_ne_bytes(raw);
                val = if rng.coin() {
                    val.wrapping_add(delta as i32)
                } else {
                    val.swap_bytes().wrapping_add(delta as i32).swap_bytes()
                };
                input.overwrite(off, &val.to_ne_bytes(), printable);
            }
            8 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&input.bytes()[off..off + 8]);
                let mut val = i64::from_ne_bytes(raw);
                val = if rng.coin() {
                    val.wrapping_add(delta)
                } else {
                    val.swap_bytes().wrapping_add(delta).swap_bytes()
                };
                input.overwrite(off, &val.to_ne_bytes(), printable);
            }
            _ => unreachable!("add/sub width {width}"),
        }
    }

    fn mem_set(&self, input: &mut FuzzInput, rng: &mut dyn RandSource, printable: bool) {
        let off = rng.offset_below(input.size());
        let len = rng.skewed(MAX_BLOCK_LEN.min(input.size() - off));
        let val = if printable {
            rng.printable_byte()
        } else {
            rng.uniform(0, u8::MAX as u64) as u8
        };
        input.bytes_mut()[off..off + len].fill(val);
    }

    fn mem_copy_overwrite(&self, input: &mut FuzzInput, rng: &mut dyn RandSource, printable: bool) {
        let off_from = rng.offset_below(input.size());
        let off_to = rng.offset_below(input.size());
        let len = rng.skewed(MAX_BLOCK_LEN.min(input.size() - off_from));
        input.overwrite_within(off_from, off_to, len, printable);
    }

    fn mem_copy_insert(&self, input: &mut FuzzInput, rng: &mut dyn RandSource, printable: bool) {
        let off_to = rng.offset_below(input.size());
        let off_from = rng.offset_below(input.size());
        let len = rng.skewed(MAX_BLOCK_LEN.min(input.size() - off_from));
        // The source region is re-read after the gap opens, so bytes that the
        // shift moved across off_from are what actually get copied.
        let len = input.inflate(off_to, len, printable);
        input.overwrite_within(off_from, off_to, len, printable);
    }

    fn bytes_overwrite(&self, input: &mut FuzzInput, rng: &mut dyn RandSource, printable: bool) {
        let off = rng.offset_below(input.size());
        let mut buf = [0u8; 2];
        if printable {
            rng.fill_printable(&mut buf);
        } else {
            buf = (rng.next_u64() as u16).to_ne_bytes();
        }
        let to_copy = rng.uniform(1, 2) as usize;
        input.overwrite(off, &buf[..to_copy], printable);
    }

    fn bytes_insert(&self, input: &mut FuzzInput, rng: &mut dyn RandSource, printable: bool) {
        let mut buf = [0u8; 2];
        if printable {
            rng.fill_printable(&mut buf);
        } else {
            buf = (rng.next_u64() as u16).to_ne_bytes();
        }
        let off = rng.offset_below(input.size());
        let to_copy = rng.uniform(1, 2) as usize;
        input.insert(off, &buf[..to_copy], printable);
    }

    fn ascii_num_overwrite(&self, input: &mut FuzzInput, rng: &mut dyn RandSource, printable: bool) {
        let off = rng.offset_below(input.size());
        let len = rng.uniform(2, 8) as usize;
        let mut buf = [0u8; 20];
        format_decimal(&mut buf, rng.next_u64() as i64);
        input.overwrite(off, &buf[..len], printable);
    }

    fn ascii_num_insert(&self, input: &mut FuzzInput, rng: &mut dyn RandSource, printable: bool) {
        let off = rng.offset_below(input.size());
        let len = rng.uniform(2, 8) as usize;
        let mut buf = [0u8; 20];
        format_decimal(&mut buf, rng.next_u64() as i64);
        input.insert(off, &buf[..len], printable);
    }

    fn byte_repeat_overwrite(
        &self,
        input: &mut FuzzInput,
        rng: &mut dyn RandSource,
        printable: bool,
    ) {
        let off = rng.offset_below(input.size());
        let dest = off + 1;
        if dest >= input.size() {
            // No room to repeat into.
            return self.bytes_overwrite(input, rng, printable);
        }

        let len = rng.skewed(MAX_BLOCK_LEN.min(input.size() - dest));
        let b = input.bytes()[off];
        input.bytes_mut()[dest..dest + len].fill(b);
    }

    fn byte_repeat_insert(&self, input: &mut FuzzInput, rng: &mut dyn RandSource, printable: bool) {
        let off = rng.offset_below(input.size());
        let dest = off + 1;
        if dest >= input.size() {
            return self.bytes_insert(input, rng, printable);
        }

        let len = rng.skewed(MAX_BLOCK_LEN.min(input.size() - dest));
        let len = input.inflate(dest, len, printable);
        let b = input.bytes()[off];
        input.bytes_mut()[dest..dest + len].fill(b);
    }

    fn magic_overwrite(&self, input: &mut FuzzInput, rng: &mut dyn RandSource, printable: bool) {
        let off = rng.offset_below(input.size());
        let choice = rng.uniform(0, MAGIC_VALUES.len() as u64 - 1) as usize;
        input.overwrite(off, MAGIC_VALUES[choice].value(), printable);
    }

    fn magic_insert(&self, input: &mut FuzzInput, rng: &mut dyn RandSource, printable: bool) {
        let choice = rng.uniform(0, MAGIC_VALUES.len() as u64 - 1) as usize;
        let off = rng.offset_below(input.size());
        input.insert(off, MAGIC_VALUES[choice].value(), printable);
    }

    fn dict_overwrite(&self, input: &mut FuzzInput, rng: &mut dyn RandSource, printable: bool) {
        if self.dictionary.is_empty() {
            return self.bytes_overwrite(input, rng, printable);
        }
        let off = rng.offset_below(input.size());
        if let Some(entry) = self.dictionary.pick(rng) {
            input.overwrite(off, entry, printable);
        }
    }

    fn dict_insert(&self, input: &mut FuzzInput, rng: &mut dyn RandSource, printable: bool) {
        let Some(entry) = self.dictionary.pick(rng) else {
            return self.bytes_insert(input, rng, printable);
        };
        let off = rng.offset_below(input.size());
        input.insert(off, entry, printable);
    }

    /// Copies one comparison operand into `out`; 0 means nothing usable and
    /// the caller falls back.
    fn cmp_feedback_pick(&self, rng: &mut dyn RandSource, out: &mut [u8; CMP_ENTRY_BYTES]) -> usize {
        if !self.cfg.cmp_feedback_enabled {
            return 0;
        }
        match self.cmp_feedback {
            Some(feedback) => feedback.pick_into(rng, out),
            None => 0,
        }
    }

    fn cmp_feedback_overwrite(
        &self,
        input: &mut FuzzInput,
        rng: &mut dyn RandSource,
        printable: bool,
    ) {
        let mut buf = [0u8; CMP_ENTRY_BYTES];
        let len = self.cmp_feedback_pick(rng, &mut buf);
        if len == 0 {
            return self.bytes_overwrite(input, rng, printable);
        }
        let off = rng.offset_below(input.size());
        input.overwrite(off, &buf[..len], printable);
    }

    fn cmp_feedback_insert(&self, input: &mut FuzzInput, rng: &mut dyn RandSource, printable: bool) {
        let mut buf = [0u8; CMP_ENTRY_BYTES];
        let len = self.cmp_feedback_pick(rng, &mut buf);
        if len == 0 {
            return self.bytes_insert(input, rng, printable);
        }
        let off = rng.offset_below(input.size());
        input.insert(off, &buf[..len], printable);
    }

    fn random_overwrite(&self, input: &mut FuzzInput, rng: &mut dyn RandSource, printable: bool) {
        let off = rng.offset_below(input.size());
        let len = rng.skewed(MAX_BLOCK_LEN.min(input.size() - off));
        if printable {
            rng.fill_printable(&mut input.bytes_mut()[off..off + len]);
        } else {
            rng.fill(&mut input.bytes_mut()[off..off + len]);
        }
    }

    fn random_insert(&self, input: &mut FuzzInput, rng: &mut dyn RandSource, printable: bool) {
        let off = rng.offset_below(input.size());
        let len = rng.skewed(MAX_BLOCK_LEN.min(input.size() - off));
        let len = input.inflate(off, len, printable);
        if printable {
            rng.fill_printable(&mut input.bytes_mut()[off..off + len]);
        } else {
            rng.fill(&mut input.bytes_mut()[off..off + len]);
        }
    }

    fn splice_overwrite(&self, input: &mut FuzzInput, rng: &mut dyn RandSource, printable: bool) {
        let Some(other) = self.corpus.random_input(rng) else {
            return self.bytes_overwrite(input, rng, printable);
        };
        if other.is_empty() {
            return self.bytes_overwrite(input, rng, printable);
        }

        let remote_off = rng.skewed(other.len()) - 1;
        let local_off = rng.offset_below(input.size());
        let len = rng.skewed((other.len() - remote_off).min(input.size() - local_off));
        input.overwrite(local_off, &other[remote_off..remote_off + len], printable);
    }

    fn splice_insert(&self, input: &mut FuzzInput, rng: &mut dyn RandSource, printable: bool) {
        let Some(other) = self.corpus.random_input(rng) else {
            return self.bytes_insert(input, rng, printable);
        };
        if other.is_empty() {
            return self.bytes_insert(input, rng, printable);
        }

        let remote_off = rng.skewed(other.len()) - 1;
        let local_off = rng.offset_below(input.size());
        let len = rng.skewed((other.len() - remote_off).min(input.size() - local_off));
        input.insert(local_off, &other[remote_off..remote_off + len], printable);
    }

    fn expand(&self, input: &mut FuzzInput, rng: &mut dyn RandSource, printable: bool) {
        let off = rng.offset_below(input.size());
        let room = input.max_size() - off;
        let len = if rng.next_u64() % 16 != 0 {
            rng.skewed(room.min(16))
        } else {
            rng.skewed(room)
        };
        input.inflate(off, len, printable);
    }

    fn shrink(&self, input: &mut FuzzInput, rng: &mut dyn RandSource) {
        if input.size() <= 2 {
            return;
        }

        let off_start = rng.offset_below(input.size());
        let len_left = input.size() - off_start - 1;
        if len_left == 0 {
            return;
        }
        let len = if rng.next_u64() % 16 != 0 {
            rng.skewed(len_left.min(16))
        } else {
            rng.skewed(len_left)
        };

        let off_end = off_start + len;
        let tail = input.size() - off_end;
        input.move_within(off_end, off_start, tail);
        input.set_size(input.size() - len);
    }

    /// Picks a new size from a 33-outcome distribution: 1 arbitrary, 4 small
    /// grows, 1 large grow, 4 small shrinks, 1 large shrink, 22 no-ops. The
    /// weighting is tuned; changing it shifts the whole engine's size drift.
    fn resize(&self, input: &mut FuzzInput, rng: &mut dyn RandSource, printable: bool) {
        let old_size = input.size();
        let max = input.max_size();

        let choice = rng.uniform(0, 32);
        let new_size = match choice {
            0 => rng.uniform(1, max as u64) as usize,
            1..=4 => old_size + rng.uniform(0, 8) as usize,
            5 => old_size + rng.uniform(9, 128) as usize,
            6..=9 => old_size.saturating_sub(rng.uniform(0, 8) as usize),
            10 => old_size.saturating_sub(rng.uniform(9, 128) as usize),
            _ => old_size,
        };
        let new_size = new_size.clamp(1, max);

        input.set_size(new_size);
        if new_size > old_size && printable {
            input.bytes_mut()[old_size..].fill(b' ');
        }
    }
}

/// Left-justified decimal in a fixed 19-column field. Operators copy random
/// prefixes of it, trailing spaces included.
fn format_decimal(buf: &mut [u8; 20], num: i64) {
    use std::io::Write;
    let mut cursor = &mut buf[..];
    let _ = write!(cursor, "{num:<19}");
}
