//! Decoding of newline-delimited completion fragments.
//!
//! Each line is a JSON object `{"response": "<chunk>", "done": <bool>}`.
//! Chunks are concatenated until a fragment reports `done`.

use crate::domain::error::{AppError, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Fragment {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default)]
pub struct FragmentAccumulator {
    pending: Vec<u8>,
    text: String,
    done: bool,
}

impl FragmentAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed raw bytes. Lines may be split across calls.
    pub fn push(&mut self, bytes: &[u8]) -> Result<()> {
        if self.done {
            return Ok(());
        }
        self.pending.extend_from_slice(bytes);

        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.push_line(&line)?;
            if self.done {
                self.pending.clear();
                break;
            }
        }
        Ok(())
    }

    fn push_line(&mut self, line: &[u8]) -> Result<()> {
        let line = std::str::from_utf8(line)
            .map_err(|e| AppError::ParseError(format!("Invalid UTF-8 in stream: {}", e)))?
            .trim();
        if line.is_empty() {
            return Ok(());
        }

        let fragment: Fragment = serde_json::from_str(line)
            .map_err(|e| AppError::ParseError(format!("Invalid stream fragment: {}", e)))?;
        if let Some(error) = fragment.error {
            return Err(AppError::LLMError(error));
        }
        self.text.push_str(&fragment.response);
        self.done = fragment.done;
        Ok(())
    }

    /// Flush a trailing unterminated line and return the concatenated text.
    pub fn finish(mut self) -> Result<String> {
        if !self.done && !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.push_line(&rest)?;
        }
        Ok(self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_fragments(body: &str) -> Result<String> {
        let mut acc = FragmentAccumulator::new();
        acc.push(body.as_bytes())?;
        acc.finish()
    }

    #[test]
    fn test_concatenates_until_done() {
        let body = "{\"response\":\"{\\\"intent\\\":\",\"done\":false}\n\
                    {\"response\":\"\\\"unknown\\\"}\",\"done\":false}\n\
                    {\"response\":\"\",\"done\":true}\n\
                    {\"response\":\"ignored\",\"done\":false}\n";
        assert_eq!(collect_fragments(body).unwrap(), "{\"intent\":\"unknown\"}");
    }

    #[test]
    fn test_lines_split_across_chunks() {
        let mut acc = FragmentAccumulator::new();
        acc.push(b"{\"response\":\"Hel").unwrap();
        acc.push(b"lo\",\"done\":false}\n{\"respo").unwrap();
        assert!(!acc.is_done());
        acc.push("nse\":\" 世界\",\"done\":true}".as_bytes()).unwrap();
        assert_eq!(acc.finish().unwrap(), "Hello 世界");
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let body = "\n{\"response\":\"a\",\"done\":false}\n\n{\"response\":\"b\",\"done\":true}";
        assert_eq!(collect_fragments(body).unwrap(), "ab");
    }

    #[test]
    fn test_malformed_fragment_is_an_error() {
        assert!(matches!(
            collect_fragments("not json\n"),
            Err(AppError::ParseError(_))
        ));
        assert!(matches!(
            collect_fragments("{\"error\":\"model not found\"}\n"),
            Err(AppError::LLMError(_))
        ));
    }
}
