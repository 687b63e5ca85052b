//! Streaming, chunked character input for the reader entry points.
//!
//! Turns any `std::io::Read` into a streaming iterator of `char`s without loading
//! the whole input into memory. `encoding_rs_io` sniffs the BOM and decodes UTF-16
//! and friends to UTF-8 on the fly; the result feeds `saphyr_parser` through
//! `BufferedInput`.
//!
//! The parser only sees an iterator of chars, so an I/O failure cannot travel
//! through it. Instead the failure is parked in a shared [`IoErrorCell`] and the
//! iterator reports end of input; the event source checks the cell whenever the
//! parser stops or complains.

use encoding_rs_io::DecodeReaderBytesBuilder;
use saphyr_parser::BufferedInput;
use std::cell::RefCell;
use std::io::{self, BufReader, Read};
use std::rc::Rc;

/// Shared slot for an I/O error raised inside the char iterator.
pub(crate) type IoErrorCell = Rc<RefCell<Option<io::Error>>>;

/// Parser input built over an arbitrary reader.
pub(crate) type ReaderInput<'a> = BufferedInput<ChunkedChars<BufReader<Box<dyn Read + 'a>>>>;

const CHUNK: usize = 8 * 1024;

pub(crate) struct ChunkedChars<R: Read> {
    /// Optional hard cap on total decoded UTF-8 bytes.
    max_bytes: Option<usize>,
    total_bytes: usize,
    /// Reader that already yields UTF-8 (the decoder behind a `BufReader`).
    reader: R,
    /// Decoded text not yet handed out.
    buf: String,
    /// Byte index of the next char in `buf`.
    idx: usize,
    tmp: Vec<u8>,
    /// Bytes of an incomplete UTF-8 sequence left over from the previous read.
    carry: usize,
    err: IoErrorCell,
}

impl<R: Read> ChunkedChars<R> {
    pub(crate) fn new(reader: R, max_bytes: Option<usize>, err: IoErrorCell) -> Self {
        Self {
            max_bytes,
            total_bytes: 0,
            reader,
            buf: String::new(),
            idx: 0,
            tmp: vec![0u8; CHUNK],
            carry: 0,
            err,
        }
    }

    /// Refill `buf` with the next chunk of decoded UTF-8.
    ///
    /// Returns `Ok(true)` when new data is available, `Ok(false)` on EOF.
    fn refill(&mut self) -> io::Result<bool> {
        let mut empty_reads = 0;
        loop {
            let n = self.reader.read(&mut self.tmp[self.carry..])?;
            if n == 0 {
                if self.carry != 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "input ends inside a UTF-8 sequence",
                    ));
                }
                return Ok(false);
            }
            let filled = self.carry + n;
            let valid = match std::str::from_utf8(&self.tmp[..filled]) {
                Ok(s) => s.len(),
                // A char split across reads: keep its head for the next round.
                Err(e) if e.error_len().is_none() => e.valid_up_to(),
                Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e)),
            };
            if valid == 0 {
                self.carry = filled;
                empty_reads += 1;
                if empty_reads > 128 {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "reader makes no progress",
                    ));
                }
                continue;
            }
            if let Some(limit) = self.max_bytes {
                self.total_bytes = self.total_bytes.saturating_add(valid);
                if self.total_bytes > limit {
                    return Err(io::Error::new(
                        io::ErrorKind::FileTooLarge,
                        format!("input size limit of {limit} bytes exceeded"),
                    ));
                }
            }
            self.buf.clear();
            // Checked just above.
            self.buf
                .push_str(std::str::from_utf8(&self.tmp[..valid]).unwrap_or_default());
            self.tmp.copy_within(valid..filled, 0);
            self.carry = filled - valid;
            self.idx = 0;
            return Ok(true);
        }
    }
}

impl<R: Read> Iterator for ChunkedChars<R> {
    type Item = char;

    fn next(&mut self) -> Option<char> {
        loop {
            if let Some(ch) = self.buf[self.idx..].chars().next() {
                self.idx += ch.len_utf8();
                return Some(ch);
            }
            match self.refill() {
                Ok(true) => continue,
                Ok(false) => return None,
                Err(error) => {
                    self.err.replace(Some(error));
                    return None;
                }
            }
        }
    }
}

/// Build parser input over `reader`, together with the cell that receives any
/// I/O error hit while reading.
pub(crate) fn reader_input<'a, R: Read + 'a>(
    reader: R,
    max_bytes: Option<usize>,
) -> (ReaderInput<'a>, IoErrorCell) {
    let decoder = DecodeReaderBytesBuilder::new()
        .encoding(None) // sniff the BOM
        .build(reader);

    let error: IoErrorCell = Rc::new(RefCell::new(None));
    let br = BufReader::new(Box::new(decoder) as Box<dyn Read + 'a>);
    let chars = ChunkedChars::new(br, max_bytes, error.clone());

    (BufferedInput::new(chars), error)
}
