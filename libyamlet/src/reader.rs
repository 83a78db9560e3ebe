//! Buffered, position-tracking codepoint source.
//!
//! The `CodepointStream` sits between the raw input and the tokenizer. It
//! decodes input into codepoints, offers bounded lookahead, tracks line and
//! column, and enforces the YAML 1.2 printable-character class: any consumed
//! codepoint outside that class (other than TAB, LF and CR) aborts the parse
//! with a positioned error.

use std::collections::VecDeque;
use std::io::{self, Read};

use crate::error::{Mark, Result, YamlError};

/// How many codepoints a refill asks the source for at once.
const CHUNK: usize = 1024;

/// A pull-based character source.
///
/// Implementations fill `buf` with decoded codepoints and return how many
/// were written; zero means end of input. Byte-stream adapters that decode
/// UTF-8 or UTF-16 live behind this trait.
pub trait CharSource {
    fn read_chars(&mut self, buf: &mut [char]) -> io::Result<usize>;
}

/// Character source over an in-memory string.
pub struct StrSource<'a> {
    chars: std::str::Chars<'a>,
}

impl<'a> StrSource<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars(),
        }
    }
}

impl CharSource for StrSource<'_> {
    fn read_chars(&mut self, buf: &mut [char]) -> io::Result<usize> {
        let mut n = 0;
        while n < buf.len() {
            match self.chars.next() {
                Some(c) => {
                    buf[n] = c;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

/// Character source decoding UTF-8 from any [`Read`] impl.
///
/// Reads fixed-size byte chunks and carries partial multi-byte sequences
/// across chunk boundaries. Invalid UTF-8 surfaces as an
/// [`io::ErrorKind::InvalidData`] error, which the stream reports as
/// [`YamlError::InvalidUtf8`].
pub struct Utf8Source<R: Read> {
    inner: R,
    bytes: Vec<u8>,
    /// Decoded characters not yet handed out.
    decoded: VecDeque<char>,
    done: bool,
}

impl<R: Read> Utf8Source<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            bytes: Vec::new(),
            decoded: VecDeque::new(),
            done: false,
        }
    }

    fn refill(&mut self) -> io::Result<()> {
        let mut chunk = [0u8; CHUNK];
        let n = self.inner.read(&mut chunk)?;
        if n == 0 {
            self.done = true;
            if !self.bytes.is_empty() {
                // Trailing partial sequence at end of input.
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "truncated UTF-8 sequence at end of input",
                ));
            }
            return Ok(());
        }
        self.bytes.extend_from_slice(&chunk[..n]);
        match std::str::from_utf8(&self.bytes) {
            Ok(s) => {
                self.decoded.extend(s.chars());
                self.bytes.clear();
            }
            Err(e) => {
                let valid = e.valid_up_to();
                if e.error_len().is_some() {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "invalid UTF-8 sequence",
                    ));
                }
                // Incomplete tail sequence; decode the valid prefix and
                // carry the rest into the next refill.
                let (head, tail) = self.bytes.split_at(valid);
                let s = std::str::from_utf8(head).expect("prefix is valid");
                self.decoded.extend(s.chars());
                self.bytes = tail.to_vec();
            }
        }
        Ok(())
    }
}

impl<R: Read> CharSource for Utf8Source<R> {
    fn read_chars(&mut self, buf: &mut [char]) -> io::Result<usize> {
        while self.decoded.is_empty() && !self.done {
            self.refill()?;
        }
        let mut n = 0;
        while n < buf.len() {
            match self.decoded.pop_front() {
                Some(c) => {
                    buf[n] = c;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

/// Is `c` in YAML 1.2's printable class (`c-printable`)?
///
/// TAB, LF and CR are the only permitted control characters.
pub fn is_printable(c: char) -> bool {
    matches!(c,
        '\t' | '\n' | '\r'
        | '\u{20}'..='\u{7E}'
        | '\u{85}'
        | '\u{A0}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

/// Buffered lookahead stream of codepoints with line/column tracking.
pub struct CodepointStream<S: CharSource> {
    source: S,
    buffer: VecDeque<char>,
    chunk: Vec<char>,
    line: usize,
    column: usize,
    source_done: bool,
    started: bool,
}

impl<S: CharSource> CodepointStream<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            buffer: VecDeque::new(),
            chunk: vec!['\0'; CHUNK],
            line: 0,
            column: 0,
            source_done: false,
            started: false,
        }
    }

    /// Current zero-based line.
    pub fn line(&self) -> usize {
        self.line
    }

    /// Current zero-based column. Newlines reset it; BOMs do not advance it.
    pub fn column(&self) -> usize {
        self.column
    }

    /// Current position as a [`Mark`].
    pub fn mark(&self) -> Mark {
        Mark::new(self.line, self.column)
    }

    fn fill(&mut self, want: usize) -> Result<()> {
        while self.buffer.len() < want && !self.source_done {
            let n = self.source.read_chars(&mut self.chunk).map_err(|e| {
                if e.kind() == io::ErrorKind::InvalidData {
                    YamlError::InvalidUtf8
                } else {
                    YamlError::Reader(e)
                }
            })?;
            if n == 0 {
                self.source_done = true;
            } else {
                self.buffer.extend(self.chunk[..n].iter().copied());
            }
        }
        // A BOM at the very start of the stream is accepted and dropped.
        if !self.started {
            self.started = true;
            if self.buffer.front() == Some(&'\u{FEFF}') {
                self.buffer.pop_front();
                self.fill(want)?;
            }
        }
        Ok(())
    }

    /// Look `k` codepoints ahead without consuming anything.
    pub fn peek(&mut self, k: usize) -> Result<Option<char>> {
        self.fill(k + 1)?;
        Ok(self.buffer.get(k).copied())
    }

    /// The codepoint under the cursor.
    pub fn look(&mut self) -> Result<Option<char>> {
        self.peek(0)
    }

    /// True when no more input remains.
    pub fn at_end(&mut self) -> Result<bool> {
        Ok(self.look()?.is_none())
    }

    /// Consume `k` codepoints, validating printability and updating the
    /// position. Returns `true` if the end of input was reached mid-advance.
    pub fn advance(&mut self, k: usize) -> Result<bool> {
        for _ in 0..k {
            if self.bump()?.is_none() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Consume and return one codepoint.
    pub fn bump(&mut self) -> Result<Option<char>> {
        self.fill(1)?;
        let c = match self.buffer.pop_front() {
            Some(c) => c,
            None => return Ok(None),
        };
        if !is_printable(c) {
            return Err(YamlError::NonPrintable {
                codepoint: c as u32,
                mark: self.mark(),
            });
        }
        match c {
            '\n' => {
                self.line += 1;
                self.column = 0;
            }
            '\r' => {
                // CRLF counts as one break, credited to the LF.
                if self.peek(0)? != Some('\n') {
                    self.line += 1;
                    self.column = 0;
                }
            }
            '\u{FEFF}' => {}
            _ => self.column += 1,
        }
        Ok(Some(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(s: &str) -> CodepointStream<StrSource<'_>> {
        CodepointStream::new(StrSource::new(s))
    }

    #[test]
    fn test_peek_and_advance() {
        let mut s = stream("abc");
        assert_eq!(s.peek(0).unwrap(), Some('a'));
        assert_eq!(s.peek(2).unwrap(), Some('c'));
        assert_eq!(s.peek(3).unwrap(), None);
        assert!(!s.advance(2).unwrap());
        assert_eq!(s.look().unwrap(), Some('c'));
        assert!(s.advance(2).unwrap());
    }

    #[test]
    fn test_position_tracking() {
        let mut s = stream("ab\ncd");
        s.advance(3).unwrap();
        assert_eq!(s.line(), 1);
        assert_eq!(s.column(), 0);
        s.advance(2).unwrap();
        assert_eq!(s.column(), 2);
    }

    #[test]
    fn test_bom_skipped() {
        let mut s = stream("\u{FEFF}x");
        assert_eq!(s.look().unwrap(), Some('x'));
        assert_eq!(s.column(), 0);
    }

    #[test]
    fn test_non_printable_rejected() {
        let mut s = stream("a\u{0007}b");
        s.bump().unwrap();
        let err = s.bump().unwrap_err();
        match err {
            YamlError::NonPrintable { codepoint, mark } => {
                assert_eq!(codepoint, 7);
                assert_eq!(mark.column, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_tab_is_printable() {
        let mut s = stream("a\tb");
        assert!(s.advance(3).is_ok());
    }

    #[test]
    fn test_utf8_source_chunk_boundary() {
        // Multi-byte characters split across read chunks must decode.
        let text = "é".repeat(2000);
        let mut src = Utf8Source::new(text.as_bytes());
        let mut out = String::new();
        let mut buf = ['\0'; 100];
        loop {
            let n = src.read_chars(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend(buf[..n].iter());
        }
        assert_eq!(out, text);
    }
}
