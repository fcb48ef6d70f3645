pub mod buffer;
pub mod config;
pub mod corpus;
pub mod dict;
pub mod feedback;
pub mod magic;
pub mod mangle;
pub mod rng;
pub mod timing;

pub use buffer::FuzzInput;
pub use config::MutateConfig;
pub use corpus::{Corpus, InMemoryCorpus};
pub use dict::{DictError, Dictionary};
pub use feedback::{CmpFeedback, CMP_ENTRY_BYTES, CMP_FEEDBACK_CAPACITY};
pub use magic::{Magic, MAGIC_VALUES};
pub use mangle::{MangleOp, Mangler, MAX_BLOCK_LEN, OPERATOR_TABLE};
pub use rng::{to_printable, RandSource, INPUT_SIZE_LIMIT};
pub use timing::{Clock, CoverageTiming, SystemClock};
