use crate::rng::RandSource;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

/// Maximum number of significant bytes in one comparison operand.
pub const CMP_ENTRY_BYTES: usize = 32;

/// Capacity of the comparison-feedback dictionary.
pub const CMP_FEEDBACK_CAPACITY: usize = 16 * 1024;

struct CmpEntry {
    len: AtomicU32,
    val: [AtomicU8; CMP_ENTRY_BYTES],
}

impl CmpEntry {
    fn empty() -> Self {
        Self {
            len: AtomicU32::new(0),
            val: std::array::from_fn(|_| AtomicU8::new(0)),
        }
    }
}

/// Comparison operands harvested by instrumentation threads and consumed by
/// the mutation engine, single-producer-per-slot / multi-consumer, no locks.
///
/// Writers claim a slot by bumping `count`, store the value bytes, then
/// publish the entry length with release ordering. Readers acquire-load
/// `count` and the entry length; an entry whose length reads 0 is simply not
/// there yet and callers treat it as missing. The engine never writes.
pub struct CmpFeedback {
    count: AtomicU32,
    entries: Box<[CmpEntry]>,
}

impl CmpFeedback {
    pub fn new() -> Self {
        Self {
            count: AtomicU32::new(0),
            entries: (0..CMP_FEEDBACK_CAPACITY).map(|_| CmpEntry::empty()).collect(),
        }
    }

    /// Number of published entries, clamped to capacity.
    pub fn len(&self) -> usize {
        (self.count.load(Ordering::Acquire) as usize).min(self.entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Producer side: appends one operand value. Returns `false` when the
    /// value is empty or the dictionary is full.
    pub fn record(&self, bytes: &[u8]) -> bool {
        if bytes.is_empty() {
            return false;
        }
        let idx = self.count.fetch_add(1, Ordering::AcqRel) as usize;
        if idx >= self.entries.len() {
            self.count.fetch_sub(1, Ordering::AcqRel);
            return false;
        }

        let entry = &self.entries[idx];
        let len = bytes.len().min(CMP_ENTRY_BYTES);
        for (slot, &b) in entry.val.iter().zip(&bytes[..len]) {
            slot.store(b, Ordering::Relaxed);
        }
        entry.len.store(len as u32, Ordering::Release);
        true
    }

    /// Consumer side: copies one uniformly-picked operand into `out` and
    /// returns its length. 0 means no usable entry (empty dictionary, or a
    /// slot claimed by a writer that has not published yet) and the caller
    /// falls back.
    pub fn pick_into(&self, rng: &mut dyn RandSource, out: &mut [u8; CMP_ENTRY_BYTES]) -> usize {
        let cnt = self.len();
        if cnt == 0 {
            return 0;
        }
        let choice = rng.uniform(0, cnt as u64 - 1) as usize;
        let entry = &self.entries[choice];
        let len = entry.len.load(Ordering::Acquire) as usize;
        if len == 0 || len > CMP_ENTRY_BYTES {
            return 0;
        }
        for (dst, src) in out.iter_mut().zip(entry.val.iter()) {
            *dst = src.load(Ordering::Relaxed);
        }
        len
    }
}

impl Default for CmpFeedback {
    fn default() -> Self {
        Self::new()
    }
}
