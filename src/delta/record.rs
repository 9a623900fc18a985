//! Fixed-width window record encoding.
//!
//! Every field is big-endian:
//!
//! ```text
//! i64 sview_offset | i64 sview_len | i64 tview_len | i32 op_count
//! op_count x (i8 opcode | i64 offset | i64 length)
//! i64 new_data_len | new_data
//! ```
//!
//! A stream is a sequence of records whose final record is the terminator:
//! `op_count = 0` with empty new data. Only its position distinguishes the
//! terminator from an ordinary empty window, so [`RecordDecoder`] holds each
//! record back until the next one (or the end of input) arrives.

use crate::SvnError;

use super::{CursorBuf, DeltaAction, DeltaOp, TextDeltaWindow};

const HEADER_LEN: usize = 8 + 8 + 8 + 4;
const OP_LEN: usize = 1 + 8 + 8;
const DATA_LEN_LEN: usize = 8;

fn to_i64(value: u64, field: &str) -> Result<i64, SvnError> {
    i64::try_from(value)
        .map_err(|_| SvnError::Protocol(format!("window {field} does not fit in int64")))
}

/// Appends one record for `window`.
pub fn encode_window(window: &TextDeltaWindow, out: &mut Vec<u8>) -> Result<(), SvnError> {
    let op_count = i32::try_from(window.ops.len())
        .map_err(|_| SvnError::Protocol("window has more than i32::MAX ops".into()))?;

    out.reserve(HEADER_LEN + window.ops.len() * OP_LEN + DATA_LEN_LEN + window.new_data.len());
    out.extend_from_slice(&to_i64(window.sview_offset, "source offset")?.to_be_bytes());
    out.extend_from_slice(&to_i64(window.sview_len, "source length")?.to_be_bytes());
    out.extend_from_slice(&to_i64(window.tview_len, "target length")?.to_be_bytes());
    out.extend_from_slice(&op_count.to_be_bytes());
    for op in &window.ops {
        out.push(op.action.opcode());
        out.extend_from_slice(&to_i64(op.offset, "op offset")?.to_be_bytes());
        out.extend_from_slice(&to_i64(op.len, "op length")?.to_be_bytes());
    }
    let data_len = to_i64(window.new_data.len() as u64, "new data length")?;
    out.extend_from_slice(&data_len.to_be_bytes());
    out.extend_from_slice(&window.new_data);
    Ok(())
}

/// Appends the stream terminator.
pub fn encode_terminator(out: &mut Vec<u8>) {
    out.extend_from_slice(&[0u8; HEADER_LEN]);
    out.extend_from_slice(&[0u8; DATA_LEN_LEN]);
}

/// Encodes a whole stream: every window, then the terminator.
pub fn encode_stream<'a, I>(windows: I) -> Result<Vec<u8>, SvnError>
where
    I: IntoIterator<Item = &'a TextDeltaWindow>,
{
    let mut out = Vec::new();
    for window in windows {
        encode_window(window, &mut out)?;
    }
    encode_terminator(&mut out);
    Ok(out)
}

/// Decodes a complete stream, returning the windows before the terminator.
pub fn decode_stream(bytes: &[u8]) -> Result<Vec<TextDeltaWindow>, SvnError> {
    let mut decoder = RecordDecoder::new();
    let windows = decoder.push(bytes)?;
    decoder.finish()?;
    Ok(windows)
}

fn read_i64(input: &[u8], at: usize) -> i64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&input[at..at + 8]);
    i64::from_be_bytes(raw)
}

fn read_u64(input: &[u8], at: usize, field: &str) -> Result<u64, SvnError> {
    u64::try_from(read_i64(input, at))
        .map_err(|_| SvnError::Protocol(format!("window record has negative {field}")))
}

fn try_parse_record(input: &[u8]) -> Result<Option<(TextDeltaWindow, usize)>, SvnError> {
    if input.len() < HEADER_LEN {
        return Ok(None);
    }
    let sview_offset = read_u64(input, 0, "source offset")?;
    let sview_len = read_u64(input, 8, "source length")?;
    let tview_len = read_u64(input, 16, "target length")?;
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&input[24..28]);
    let op_count = usize::try_from(i32::from_be_bytes(raw))
        .map_err(|_| SvnError::Protocol("window record has negative op count".into()))?;

    let ops_end = op_count
        .checked_mul(OP_LEN)
        .and_then(|n| n.checked_add(HEADER_LEN))
        .ok_or_else(|| SvnError::Protocol("window record op count overflows".into()))?;
    if input.len() < ops_end + DATA_LEN_LEN {
        return Ok(None);
    }

    let mut ops = Vec::with_capacity(op_count);
    for idx in 0..op_count {
        let at = HEADER_LEN + idx * OP_LEN;
        let opcode = input[at];
        let action = DeltaAction::from_opcode(opcode).ok_or_else(|| {
            SvnError::Protocol(format!("window record has invalid opcode {opcode}"))
        })?;
        ops.push(DeltaOp {
            action,
            offset: read_u64(input, at + 1, "op offset")?,
            len: read_u64(input, at + 9, "op length")?,
        });
    }

    let data_len = usize::try_from(read_u64(input, ops_end, "new data length")?)
        .map_err(|_| SvnError::Protocol("window new data length overflows usize".into()))?;
    let data_start = ops_end + DATA_LEN_LEN;
    let Some(total) = data_start.checked_add(data_len) else {
        return Err(SvnError::Protocol("window record length overflows".into()));
    };
    if input.len() < total {
        return Ok(None);
    }

    let window = TextDeltaWindow {
        sview_offset,
        sview_len,
        tview_len,
        ops,
        new_data: input[data_start..total].to_vec(),
    };
    Ok(Some((window, total)))
}

/// Incremental decoder for a record stream.
#[derive(Debug, Default)]
pub struct RecordDecoder {
    buf: CursorBuf,
    held: Option<TextDeltaWindow>,
}

impl RecordDecoder {
    /// Creates a decoder expecting the start of a stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds bytes and returns every window known not to be the final record.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<TextDeltaWindow>, SvnError> {
        self.buf.push(bytes);
        let mut ready = Vec::new();
        while let Some((window, used)) = try_parse_record(self.buf.available())? {
            self.buf.consume(used);
            window.validate()?;
            if let Some(previous) = self.held.replace(window) {
                ready.push(previous);
            }
        }
        Ok(ready)
    }

    /// Ends the input. The last record must be the terminator.
    pub fn finish(self) -> Result<(), SvnError> {
        if !self.buf.available().is_empty() {
            return Err(SvnError::Protocol(
                "unexpected end of window stream (truncated record)".into(),
            ));
        }
        match self.held {
            Some(last) if last.is_empty() => Ok(()),
            Some(_) => Err(SvnError::Protocol(
                "window stream ended without a terminator".into(),
            )),
            None => Err(SvnError::Protocol("window stream is empty".into())),
        }
    }
}
