use crate::rng::RandSource;

/// A collection of fuzzing inputs the engine can splice material from.
///
/// The engine only ever borrows: `random_input` hands out a view that stays
/// valid for the duration of a single operator call. An empty corpus is not
/// an error; splice operators fall back to plain byte writes.
pub trait Corpus: Send + Sync {
    /// Adds an input. Empty inputs are kept: picking one later behaves the
    /// same as an empty corpus from the engine's point of view.
    fn add(&mut self, input: Vec<u8>);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, id: usize) -> Option<&[u8]>;

    /// Uniformly picks one stored input, `None` when the corpus is empty.
    fn random_input(&self, rng: &mut dyn RandSource) -> Option<&[u8]>;
}

/// Straightforward `Vec`-backed corpus, suitable for a single worker.
#[derive(Debug, Default)]
pub struct InMemoryCorpus {
    entries: Vec<Vec<u8>>,
}

impl InMemoryCorpus {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Corpus for InMemoryCorpus {
    fn add(&mut self, input: Vec<u8>) {
        self.entries.push(input);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn get(&self, id: usize) -> Option<&[u8]> {
        self.entries.get(id).map(Vec::as_slice)
    }

    fn random_input(&self, rng: &mut dyn RandSource) -> Option<&[u8]> {
        if self.entries.is_empty() {
            return None;
        }
        let choice = rng.uniform(0, self.entries.len() as u64 - 1) as usize;
        Some(&self.entries[choice])
    }
}
