use crate::rng::RandSource;
use thiserror::Error;

/// Errors produced while parsing a dictionary file's text.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DictError {
    /// A non-comment line had no double-quoted value.
    #[error("line {0}: dictionary entry has no quoted value")]
    MissingQuote(usize),
    /// A `\` escape inside a value was not one of `\\`, `\"`, `\xNN`.
    #[error("line {0}: bad escape sequence in dictionary value")]
    BadEscape(usize),
}

/// User-supplied byte strings, owned by the caller and read-only to the
/// mutation engine. Entries keep their own lengths; an empty dictionary makes
/// the dictionary operators fall back to plain byte writes.
#[derive(Debug, Default, Clone)]
pub struct Dictionary {
    entries: Vec<Vec<u8>>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the AFL-style dictionary text format: one entry per line,
    /// `#` comments and blank lines ignored, value double-quoted with an
    /// optional `name=` prefix. Values support `\\`, `\"` and `\xNN` escapes.
    pub fn parse(text: &str) -> Result<Self, DictError> {
        let mut dict = Self::new();
        for (idx, raw_line) in text.lines().enumerate() {
            let lineno = idx + 1;
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let open = line.find('"').ok_or(DictError::MissingQuote(lineno))?;
            let close = line.rfind('"').filter(|&c| c > open);
            let close = close.ok_or(DictError::MissingQuote(lineno))?;

            let value = unescape(&line[open + 1..close], lineno)?;
            if !value.is_empty() {
                dict.entries.push(value);
            }
        }
        Ok(dict)
    }

    pub fn push(&mut self, entry: Vec<u8>) {
        if !entry.is_empty() {
            self.entries.push(entry);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&[u8]> {
        self.entries.get(idx).map(Vec::as_slice)
    }

    /// Uniformly picks one entry, `None` when empty.
    pub fn pick(&self, rng: &mut dyn RandSource) -> Option<&[u8]> {
        if self.entries.is_empty() {
            return None;
        }
        let choice = rng.uniform(0, self.entries.len() as u64 - 1) as usize;
        Some(&self.entries[choice])
    }
}

fn unescape(value: &str, lineno: usize) -> Result<Vec<u8>, DictError> {
    let mut out = Vec::with_capacity(value.len());
    let mut bytes = value.bytes();
    while let Some(b) = bytes.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        match bytes.next() {
            Some(b'\\') => out.push(b'\\'),
            Some(b'"') => out.push(b'"'),
            Some(b'x') => {
                let hi = bytes.next().ok_or(DictError::BadEscape(lineno))?;
                let lo = bytes.next().ok_or(DictError::BadEscape(lineno))?;
                let hex = [hi, lo];
                let hex = std::str::from_utf8(&hex).map_err(|_| DictError::BadEscape(lineno))?;
                let byte =
                    u8::from_str_radix(hex, 16).map_err(|_| DictError::BadEscape(lineno))?;
                out.push(byte);
            }
            _ => return Err(DictError::BadEscape(lineno)),
        }
    }
    Ok(out)
}
