//! Byte-stuffing codec
//!
//! START and ESCAPE never appear raw inside a frame. Each occurrence is
//! replaced by ESCAPE followed by a substitute code:
//! - START  (0x73) -> ESCAPE, ESCAPE_START  (0x78 0x31)
//! - ESCAPE (0x78) -> ESCAPE, ESCAPE_ESCAPE (0x78 0x55)
//!
//! A raw START in the inbound stream therefore always begins a new frame.

use super::{
    Deadline, FrameError, Port, ProtocolError, WaitResult, ESCAPE, ESCAPE_ESCAPE, ESCAPE_START,
    START_FRAME,
};

/// Position of the next byte that needs escaping
fn find_special(data: &[u8]) -> Option<usize> {
    data.iter().position(|&b| b == START_FRAME || b == ESCAPE)
}

fn escape_pair(byte: u8) -> [u8; 2] {
    if byte == START_FRAME {
        [ESCAPE, ESCAPE_START]
    } else {
        [ESCAPE, ESCAPE_ESCAPE]
    }
}

/// Map a substitute code back to its literal byte
fn unescape_code(code: u8) -> Result<u8, FrameError> {
    match code {
        ESCAPE_START => Ok(START_FRAME),
        ESCAPE_ESCAPE => Ok(ESCAPE),
        START_FRAME => Err(FrameError::UnexpectedStart),
        other => Err(FrameError::UnknownEscape(other)),
    }
}

/// Append the escaped form of `raw` to `out`
pub fn escape_into(raw: &[u8], out: &mut Vec<u8>) {
    let mut rest = raw;
    while let Some(pos) = find_special(rest) {
        out.extend_from_slice(&rest[..pos]);
        out.extend_from_slice(&escape_pair(rest[pos]));
        rest = &rest[pos + 1..];
    }
    out.extend_from_slice(rest);
}

/// Escape `raw` into a new buffer
pub fn escape(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len() + raw.len() / 8);
    escape_into(raw, &mut out);
    out
}

/// Undo [`escape`] on a complete in-memory buffer
pub fn unescape(escaped: &[u8]) -> Result<Vec<u8>, FrameError> {
    let mut out = Vec::with_capacity(escaped.len());
    let mut bytes = escaped.iter().copied();
    while let Some(byte) = bytes.next() {
        match byte {
            START_FRAME => return Err(FrameError::UnexpectedStart),
            ESCAPE => {
                let code = bytes.next().ok_or(FrameError::TruncatedEscape)?;
                out.push(unescape_code(code)?);
            }
            b => out.push(b),
        }
    }
    Ok(out)
}

/// Write `raw` to the port with escaping applied.
///
/// Runs of harmless bytes go out in a single bulk write; only the reserved
/// bytes are written as two-byte escape sequences.
pub fn send_escaped<P: Port + ?Sized>(
    port: &mut P,
    raw: &[u8],
    deadline: Deadline,
) -> Result<(), ProtocolError> {
    let mut rest = raw;
    loop {
        let special = find_special(rest).unwrap_or(rest.len());
        if special > 0 {
            port.full_write(&rest[..special], deadline)?;
        }

        let Some(&byte) = rest.get(special) else {
            break;
        };
        port.full_write(&escape_pair(byte), deadline)?;
        rest = &rest[special + 1..];
    }
    Ok(())
}

/// Inbound cursor over the raw byte stream.
///
/// Bytes are read optimistically in chunks into a scratch buffer that is
/// reused across calls and unescaped into the caller's destination. Bytes
/// read but not consumed by a rejected frame are kept in a look-ahead
/// buffer so the next START scan sees them.
#[derive(Debug, Default)]
pub struct FrameReader {
    scratch: Vec<u8>,
    lookahead: Vec<u8>,
    cursor: usize,
}

impl FrameReader {
    /// Create a reader with empty buffers
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes already pulled from the port but not yet consumed
    pub fn pending(&self) -> &[u8] {
        &self.lookahead[self.cursor..]
    }

    /// Drop all buffered input
    pub fn clear(&mut self) {
        self.lookahead.clear();
        self.cursor = 0;
    }

    /// Skip input up to and including the next START byte
    pub fn wait_for_start<P: Port + ?Sized>(
        &mut self,
        port: &mut P,
        deadline: Deadline,
    ) -> Result<WaitResult, ProtocolError> {
        if let Some(pos) = self.pending().iter().position(|&b| b == START_FRAME) {
            self.cursor += pos + 1;
            self.compact();
            return Ok(WaitResult::Ready);
        }

        self.clear();
        Ok(port.wait_for_byte(START_FRAME, deadline)?)
    }

    /// Fill `dest` with unescaped bytes.
    ///
    /// An escape sequence split across two reads is completed by waiting
    /// for one more byte. On an unknown escape code or a raw START the
    /// frame is abandoned with [`ProtocolError::CorruptFrame`] and the
    /// unconsumed input (including that START) stays buffered.
    pub fn read_unescaped<P: Port + ?Sized>(
        &mut self,
        port: &mut P,
        dest: &mut [u8],
        deadline: Deadline,
    ) -> Result<(), ProtocolError> {
        let mut filled = 0;
        while filled < dest.len() {
            // Each raw byte yields at most one output byte, so reading no
            // more than what is missing can never overrun `dest`
            let mut n = self.fill_scratch(port, dest.len() - filled, deadline)?;

            let mut src = 0;
            while src < n {
                let byte = self.scratch[src];
                let value = match byte {
                    START_FRAME => {
                        self.unread_scratch(src, n);
                        return Err(FrameError::UnexpectedStart.into());
                    }
                    ESCAPE => {
                        src += 1;
                        if src == n {
                            let code = self.next_byte(port, deadline)?;
                            self.scratch.push(code);
                            n += 1;
                        }
                        match unescape_code(self.scratch[src]) {
                            Ok(value) => value,
                            Err(FrameError::UnexpectedStart) => {
                                self.unread_scratch(src, n);
                                return Err(FrameError::UnexpectedStart.into());
                            }
                            Err(e) => {
                                self.unread_scratch(src + 1, n);
                                return Err(e.into());
                            }
                        }
                    }
                    b => b,
                };
                dest[filled] = value;
                filled += 1;
                src += 1;
            }
        }
        Ok(())
    }

    /// Load up to `want` raw bytes into the scratch buffer, preferring
    /// buffered look-ahead over the port
    fn fill_scratch<P: Port + ?Sized>(
        &mut self,
        port: &mut P,
        want: usize,
        deadline: Deadline,
    ) -> Result<usize, ProtocolError> {
        self.scratch.clear();

        let pending = self.lookahead.len() - self.cursor;
        if pending > 0 {
            let n = pending.min(want);
            self.scratch
                .extend_from_slice(&self.lookahead[self.cursor..self.cursor + n]);
            self.cursor += n;
            self.compact();
            return Ok(n);
        }

        self.scratch.resize(want, 0);
        let n = port.wait_and_read(&mut self.scratch, deadline)?;
        self.scratch.truncate(n);
        Ok(n)
    }

    fn next_byte<P: Port + ?Sized>(
        &mut self,
        port: &mut P,
        deadline: Deadline,
    ) -> Result<u8, ProtocolError> {
        if let Some(&byte) = self.lookahead.get(self.cursor) {
            self.cursor += 1;
            self.compact();
            return Ok(byte);
        }
        port.wait_read_byte(deadline)
    }

    /// Put `scratch[from..to]` back in front of the look-ahead buffer
    fn unread_scratch(&mut self, from: usize, to: usize) {
        if from >= to {
            return;
        }
        let mut pending = Vec::with_capacity(to - from + self.pending().len());
        pending.extend_from_slice(&self.scratch[from..to]);
        pending.extend_from_slice(&self.lookahead[self.cursor..]);
        self.lookahead = pending;
        self.cursor = 0;
    }

    fn compact(&mut self) {
        if self.cursor >= self.lookahead.len() {
            self.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::io;

    /// Port delivering inbound data in fixed chunks, one chunk per read
    #[derive(Default)]
    struct ChunkedPort {
        chunks: VecDeque<Vec<u8>>,
        written: Vec<u8>,
        writes: usize,
    }

    impl ChunkedPort {
        fn new(chunks: Vec<Vec<u8>>) -> Self {
            Self {
                chunks: chunks.into_iter().filter(|c| !c.is_empty()).collect(),
                ..Default::default()
            }
        }
    }

    impl Port for ChunkedPort {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.writes += 1;
            self.written.extend_from_slice(data);
            Ok(data.len())
        }

        fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let Some(chunk) = self.chunks.front_mut() else {
                return Ok(0);
            };
            let n = buf.len().min(chunk.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            chunk.drain(..n);
            if chunk.is_empty() {
                self.chunks.pop_front();
            }
            Ok(n)
        }

        fn wait_for_byte(&mut self, byte: u8, _deadline: Deadline) -> io::Result<WaitResult> {
            while let Some(chunk) = self.chunks.front_mut() {
                if let Some(pos) = chunk.iter().position(|&b| b == byte) {
                    chunk.drain(..=pos);
                    if chunk.is_empty() {
                        self.chunks.pop_front();
                    }
                    return Ok(WaitResult::Ready);
                }
                self.chunks.pop_front();
            }
            Ok(WaitResult::Timeout)
        }

        fn wait_readable(&mut self, _deadline: Deadline) -> io::Result<WaitResult> {
            if self.chunks.is_empty() {
                Ok(WaitResult::Timeout)
            } else {
                Ok(WaitResult::Ready)
            }
        }
    }

    #[test]
    fn test_escape_reserved_bytes() {
        let escaped = escape(&[0x01, START_FRAME, 0x02, ESCAPE, 0x03]);
        assert_eq!(
            escaped,
            vec![0x01, ESCAPE, ESCAPE_START, 0x02, ESCAPE, ESCAPE_ESCAPE, 0x03]
        );
    }

    #[test]
    fn test_escape_leaves_harmless_bytes() {
        assert_eq!(escape(b"hello"), b"hello".to_vec());
        assert_eq!(escape(&[]), Vec::<u8>::new());
    }

    #[test]
    fn test_unescape_roundtrip() {
        let raw = vec![START_FRAME, START_FRAME, ESCAPE, 0x00, ESCAPE, 0xFF];
        assert_eq!(unescape(&escape(&raw)).unwrap(), raw);
    }

    #[test]
    fn test_unescape_rejects_unknown_code() {
        assert_eq!(
            unescape(&[0x01, ESCAPE, 0x42]),
            Err(FrameError::UnknownEscape(0x42))
        );
    }

    #[test]
    fn test_unescape_rejects_raw_start() {
        assert_eq!(
            unescape(&[0x01, START_FRAME]),
            Err(FrameError::UnexpectedStart)
        );
    }

    #[test]
    fn test_unescape_rejects_trailing_escape() {
        assert_eq!(unescape(&[0x01, ESCAPE]), Err(FrameError::TruncatedEscape));
    }

    #[test]
    fn test_send_escaped_bulk_writes_harmless_runs() {
        let mut port = ChunkedPort::default();
        send_escaped(&mut port, b"abc\x73def", Deadline::never()).unwrap();
        assert_eq!(port.written, b"abc\x78\x31def".to_vec());
        // "abc", escape pair, "def"
        assert_eq!(port.writes, 3);
    }

    #[test]
    fn test_send_escaped_only_specials() {
        let mut port = ChunkedPort::default();
        send_escaped(&mut port, &[ESCAPE, START_FRAME], Deadline::never()).unwrap();
        assert_eq!(
            port.written,
            vec![ESCAPE, ESCAPE_ESCAPE, ESCAPE, ESCAPE_START]
        );
    }

    #[test]
    fn test_read_unescaped_single_chunk() {
        let raw = [0x10, START_FRAME, 0x20, ESCAPE];
        let mut port = ChunkedPort::new(vec![escape(&raw)]);
        let mut reader = FrameReader::new();
        let mut dest = [0u8; 4];
        reader
            .read_unescaped(&mut port, &mut dest, Deadline::never())
            .unwrap();
        assert_eq!(dest, raw);
    }

    #[test]
    fn test_escape_pair_straddling_reads() {
        // ESCAPE is the last byte of the first read
        let mut port = ChunkedPort::new(vec![vec![0x10, ESCAPE], vec![ESCAPE_START, 0x20]]);
        let mut reader = FrameReader::new();
        let mut dest = [0u8; 3];
        reader
            .read_unescaped(&mut port, &mut dest, Deadline::never())
            .unwrap();
        assert_eq!(dest, [0x10, START_FRAME, 0x20]);
    }

    #[test]
    fn test_unknown_escape_keeps_remaining_input() {
        let mut port = ChunkedPort::new(vec![vec![0x10, ESCAPE, 0x42, 0x99, START_FRAME, 0x01]]);
        let mut reader = FrameReader::new();
        let mut dest = [0u8; 6];
        let err = reader
            .read_unescaped(&mut port, &mut dest, Deadline::never())
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::CorruptFrame(FrameError::UnknownEscape(0x42))
        ));
        assert_eq!(reader.pending(), &[0x99, START_FRAME, 0x01]);

        assert_eq!(
            reader.wait_for_start(&mut port, Deadline::never()).unwrap(),
            WaitResult::Ready
        );
        assert_eq!(reader.pending(), &[0x01]);
    }

    #[test]
    fn test_raw_start_is_kept_as_anchor() {
        let mut port = ChunkedPort::new(vec![vec![0x01, 0x02, START_FRAME, 0x03]]);
        let mut reader = FrameReader::new();
        let mut dest = [0u8; 4];
        let err = reader
            .read_unescaped(&mut port, &mut dest, Deadline::never())
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::CorruptFrame(FrameError::UnexpectedStart)
        ));
        assert_eq!(reader.pending(), &[START_FRAME, 0x03]);
    }

    #[test]
    fn test_start_after_escape_is_kept_as_anchor() {
        let mut port = ChunkedPort::new(vec![vec![0x01, ESCAPE], vec![START_FRAME, 0x05]]);
        let mut reader = FrameReader::new();
        let mut dest = [0u8; 3];
        let err = reader
            .read_unescaped(&mut port, &mut dest, Deadline::never())
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::CorruptFrame(FrameError::UnexpectedStart)
        ));
        assert_eq!(reader.pending(), &[START_FRAME]);
    }

    #[test]
    fn test_lookahead_feeds_next_read() {
        let mut port = ChunkedPort::new(vec![vec![0x99, START_FRAME, 0x01, 0x02]]);
        let mut reader = FrameReader::new();
        let mut dest = [0u8; 4];
        assert!(reader
            .read_unescaped(&mut port, &mut dest, Deadline::never())
            .is_err());

        reader.wait_for_start(&mut port, Deadline::never()).unwrap();
        let mut dest = [0u8; 2];
        reader
            .read_unescaped(&mut port, &mut dest, Deadline::never())
            .unwrap();
        assert_eq!(dest, [0x01, 0x02]);
        assert!(reader.pending().is_empty());
    }

    #[test]
    fn test_read_times_out_on_short_input() {
        let mut port = ChunkedPort::new(vec![vec![0x01]]);
        let mut reader = FrameReader::new();
        let mut dest = [0u8; 2];
        let err = reader
            .read_unescaped(&mut port, &mut dest, Deadline::never())
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Timeout));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        // Bias the byte distribution towards the reserved values
        fn wire_byte() -> impl Strategy<Value = u8> {
            prop_oneof![
                2 => Just(START_FRAME),
                2 => Just(ESCAPE),
                1 => Just(ESCAPE_START),
                1 => Just(ESCAPE_ESCAPE),
                6 => any::<u8>(),
            ]
        }

        proptest! {
            #[test]
            fn prop_unescape_inverts_escape(raw in prop::collection::vec(wire_byte(), 0..256)) {
                let escaped = escape(&raw);
                prop_assert!(!escaped.contains(&START_FRAME));
                prop_assert_eq!(unescape(&escaped).unwrap(), raw);
            }

            #[test]
            fn prop_split_read_matches_whole(
                raw in prop::collection::vec(wire_byte(), 1..128),
                split in any::<prop::sample::Index>(),
            ) {
                let escaped = escape(&raw);
                let at = split.index(escaped.len() + 1);
                let mut port = ChunkedPort::new(vec![
                    escaped[..at].to_vec(),
                    escaped[at..].to_vec(),
                ]);
                let mut reader = FrameReader::new();
                let mut dest = vec![0u8; raw.len()];
                reader.read_unescaped(&mut port, &mut dest, Deadline::never()).unwrap();
                prop_assert_eq!(dest, raw);
                prop_assert!(port.chunks.is_empty());
            }
        }
    }
}
