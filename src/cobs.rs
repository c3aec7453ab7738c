//! Consistent Overhead Byte Stuffing (spec §4.B).
//!
//! The decoder is stateless between frames but needs a byte source it can
//! pull single bytes and runs from; `Read` is used directly rather than
//! inventing a bespoke trait, since a blocking serial port (or, in tests,
//! a `&[u8]` cursor) already implements it.

use std::io::Read;

/// Maximum run length a single code byte can address (`0xFF` special-cases
/// to 254 literal bytes with no trailing zero, per spec §4.B).
const MAX_RUN: usize = 254;

/// Outcome of decoding one frame.
#[derive(Debug, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// A frame was decoded into the caller's buffer; this is its length.
    Frame(usize),
    /// The byte source is exhausted (read failure or real EOF).
    EndOfStream,
}

/// Decode one zero-terminated COBS frame from `reader` into `out`.
///
/// `out` is cleared and filled with the decoded payload. If the running
/// decoded length would exceed `out.capacity()` (the caller-supplied
/// maximum, per spec §4.B), the decoder logs a warning, drains bytes until
/// the next zero, and restarts framing — desynchronization becomes packet
/// loss rather than corruption of later frames.
pub fn decode_frame<R: Read>(reader: &mut R, out: &mut Vec<u8>, max: usize) -> DecodeOutcome {
    loop {
        out.clear();
        match decode_one_attempt(reader, out, max) {
            AttemptOutcome::Frame => return DecodeOutcome::Frame(out.len()),
            AttemptOutcome::Overflow => {
                tracing::warn!(
                    max,
                    "COBS frame exceeded maximum length; dropping and resyncing at next zero"
                );
                continue;
            }
            AttemptOutcome::EndOfStream => return DecodeOutcome::EndOfStream,
        }
    }
}

enum AttemptOutcome {
    Frame,
    Overflow,
    EndOfStream,
}

/// Decode one frame's worth of blocks into `out`.
///
/// A block's implicit zero only belongs in the output if another block
/// follows it (the zero marked a real boundary in the original data); the
/// zero after the very last block is an artifact of closing that block out,
/// not a byte the original data had. Since frames are read byte-at-a-time
/// from an unbounded stream, there is no way to know in advance whether a
/// given block is the last one — so its zero is held as `pending_zero` and
/// only actually pushed once a further non-terminator code byte shows up
/// after it; if the terminator (`0x00`) shows up instead, the pending zero
/// is simply dropped, per spec §4.B's "trailing-zero accounting".
fn decode_one_attempt<R: Read>(reader: &mut R, out: &mut Vec<u8>, max: usize) -> AttemptOutcome {
    let mut pending_zero = false;

    loop {
        let code = match read_byte(reader) {
            Some(b) => b,
            None => return AttemptOutcome::EndOfStream,
        };

        if code == 0 {
            return AttemptOutcome::Frame;
        }

        if pending_zero {
            if out.len() + 1 > max {
                drain_to_next_zero(reader);
                return AttemptOutcome::Overflow;
            }
            out.push(0);
            pending_zero = false;
        }

        let run = (code - 1) as usize;
        if out.len() + run > max {
            drain_to_next_zero(reader);
            return AttemptOutcome::Overflow;
        }

        for _ in 0..run {
            match read_byte(reader) {
                Some(b) => out.push(b),
                None => return AttemptOutcome::EndOfStream,
            }
        }

        if code != 0xFF {
            pending_zero = true;
        }
    }
}

fn drain_to_next_zero<R: Read>(reader: &mut R) {
    loop {
        match read_byte(reader) {
            Some(0) | None => return,
            Some(_) => continue,
        }
    }
}

/// Read one byte, retrying transparently on a serial port's read timeout.
///
/// A real serial port's `timeout()` expires whenever the line is briefly
/// idle — that's normal between packets, not a failure, so it must not be
/// mistaken for end-of-stream (grounded on `serial_adapter.rs`'s own
/// `ErrorKind::TimedOut` retry branch, which treats the port's internal
/// timeout as "nothing arrived yet" rather than an I/O error). Only a
/// genuine EOF or a non-timeout I/O error ends the stream.
fn read_byte<R: Read>(reader: &mut R) -> Option<u8> {
    let mut b = [0u8; 1];
    loop {
        match reader.read_exact(&mut b) {
            Ok(()) => return Some(b[0]),
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::TimedOut
                        | std::io::ErrorKind::WouldBlock
                        | std::io::ErrorKind::Interrupted
                ) =>
            {
                continue;
            }
            Err(_) => return None,
        }
    }
}

/// Encode `data` (which must not contain a literal zero byte other than the
/// frame terminator this function appends) into a COBS frame, inverse of
/// [`decode_frame`]. Used by tests and by anything upstream of this crate
/// that needs to produce wire bytes for the decoder to consume.
///
/// A block is opened lazily (its code-byte placeholder is only pushed once
/// there's a byte to put in it), so a run that ends exactly on the 254-byte
/// boundary closes with a bare `0xFF` block and no empty trailing block —
/// the matching half of `decode_one_attempt`'s `pending_zero` handling.
pub fn encode_frame(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / MAX_RUN + 2);
    let mut code_index: Option<usize> = None;
    let mut run: u8 = 0;

    for &byte in data {
        let idx = *code_index.get_or_insert_with(|| {
            let idx = out.len();
            out.push(0); // placeholder code byte
            idx
        });

        if byte == 0 {
            out[idx] = run + 1;
            code_index = None;
            run = 0;
        } else {
            out.push(byte);
            run += 1;
            if run as usize == MAX_RUN {
                out[idx] = 0xFF;
                code_index = None;
                run = 0;
            }
        }
    }

    if let Some(idx) = code_index {
        out[idx] = run + 1;
    }
    out.push(0);
    out
}

/// A reader that yields a `TimedOut` error a fixed number of times before
/// each real byte, simulating a serial port's internal read timeout firing
/// during idle gaps between bytes.
#[cfg(test)]
struct FlakyReader {
    bytes: std::collections::VecDeque<u8>,
    timeouts_before_next_byte: usize,
}

#[cfg(test)]
impl Read for FlakyReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.timeouts_before_next_byte > 0 {
            self.timeouts_before_next_byte -= 1;
            return Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out"));
        }
        match self.bytes.pop_front() {
            Some(b) => {
                buf[0] = b;
                Ok(1)
            }
            None => Ok(0),
        }
    }
}
