//! svndiff v0/v1/v2 encoding of window streams.
//!
//! svndiff is the delta format Subversion servers put on the wire. v1
//! compresses the instruction and new-data sections with zlib, v2 with lz4.
//! Sections shorter than [`ZLIB_MIN_COMPRESS_SIZE`] (or that do not shrink)
//! are stored raw behind their length prefix.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::write::ZlibEncoder;

use crate::SvnError;

use super::{CursorBuf, DELTA_WINDOW_SIZE, DeltaAction, DeltaOp, TextDeltaWindow};

const SVNDIFF_HEADER_LEN: usize = 4;
const ZLIB_MIN_COMPRESS_SIZE: usize = 512;
const MAX_ENCODED_UINT_LEN: usize = 10;
const MAX_INSTRUCTION_LEN: usize = 2 * MAX_ENCODED_UINT_LEN + 1;
const MAX_INSTRUCTION_SECTION_LEN: usize = DELTA_WINDOW_SIZE * MAX_INSTRUCTION_LEN;

/// svndiff format version.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SvndiffVersion {
    /// Uncompressed.
    V0,
    /// zlib-compressed sections.
    V1,
    /// lz4-compressed sections.
    V2,
}

impl SvndiffVersion {
    /// The four-byte stream header.
    pub fn header(self) -> [u8; 4] {
        match self {
            Self::V0 => *b"SVN\0",
            Self::V1 => *b"SVN\x01",
            Self::V2 => *b"SVN\x02",
        }
    }

    fn from_header(header: &[u8; 4]) -> Option<Self> {
        [Self::V0, Self::V1, Self::V2]
            .into_iter()
            .find(|version| &version.header() == header)
    }
}

/// Encodes `windows` as one svndiff stream.
pub fn encode<'a, I>(
    version: SvndiffVersion,
    windows: I,
    zlib_level: u32,
) -> Result<Vec<u8>, SvnError>
where
    I: IntoIterator<Item = &'a TextDeltaWindow>,
{
    let mut out = Vec::new();
    out.extend_from_slice(&version.header());
    for window in windows {
        encode_window(version, window, zlib_level, &mut out)?;
    }
    Ok(out)
}

/// Appends one window (without the stream header).
pub fn encode_window(
    version: SvndiffVersion,
    window: &TextDeltaWindow,
    zlib_level: u32,
    out: &mut Vec<u8>,
) -> Result<(), SvnError> {
    window.validate()?;
    let instructions = encode_instructions(&window.ops);

    let (instructions_wire, newdata_wire) = match version {
        SvndiffVersion::V0 => (instructions, window.new_data.clone()),
        SvndiffVersion::V1 => (
            compress_zlib(&instructions, zlib_level)?,
            compress_zlib(&window.new_data, zlib_level)?,
        ),
        SvndiffVersion::V2 => (
            compress_lz4(&instructions),
            compress_lz4(&window.new_data),
        ),
    };

    encode_uint(window.sview_offset, out);
    encode_uint(window.sview_len, out);
    encode_uint(window.tview_len, out);
    encode_uint(instructions_wire.len() as u64, out);
    encode_uint(newdata_wire.len() as u64, out);
    out.extend_from_slice(&instructions_wire);
    out.extend_from_slice(&newdata_wire);
    Ok(())
}

fn encode_instructions(ops: &[DeltaOp]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ops.len() * 3);
    for op in ops {
        let action = op.action.opcode() << 6;
        if op.len < 0x40 {
            out.push(action | op.len as u8);
        } else {
            out.push(action);
            encode_uint(op.len, &mut out);
        }
        if op.action != DeltaAction::New {
            encode_uint(op.offset, &mut out);
        }
    }
    out
}

fn encode_uint(val: u64, out: &mut Vec<u8>) {
    let mut v = val >> 7;
    let mut n = 1u32;
    while v > 0 {
        v >>= 7;
        n += 1;
    }

    while n > 1 {
        n -= 1;
        out.push((((val >> (n * 7)) | 0x80) & 0xff) as u8);
    }
    out.push((val & 0x7f) as u8);
}

fn compress_zlib(data: &[u8], zlib_level: u32) -> Result<Vec<u8>, SvnError> {
    let mut out = Vec::new();
    encode_uint(data.len() as u64, &mut out);

    if data.len() < ZLIB_MIN_COMPRESS_SIZE || zlib_level == 0 {
        out.extend_from_slice(data);
        return Ok(out);
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(zlib_level));
    encoder
        .write_all(data)
        .map_err(|err| SvnError::Protocol(format!("zlib encode failed: {err}")))?;
    let compressed = encoder
        .finish()
        .map_err(|err| SvnError::Protocol(format!("zlib finish failed: {err}")))?;

    if compressed.len() >= data.len() {
        out.extend_from_slice(data);
    } else {
        out.extend_from_slice(&compressed);
    }
    Ok(out)
}

fn compress_lz4(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    encode_uint(data.len() as u64, &mut out);

    let compressed = lz4_flex::compress(data);
    if compressed.len() >= data.len() {
        out.extend_from_slice(data);
    } else {
        out.extend_from_slice(&compressed);
    }
    out
}

/// Decodes a complete svndiff stream.
pub fn decode(bytes: &[u8]) -> Result<Vec<TextDeltaWindow>, SvnError> {
    let mut decoder = SvndiffDecoder::new();
    let windows = decoder.push(bytes)?;
    decoder.finish()?;
    Ok(windows)
}

#[derive(Debug)]
struct WindowHeader {
    sview_offset: u64,
    sview_len: u64,
    tview_len: u64,
    ins_len: usize,
    new_len: usize,
    header_len: usize,
}

/// Incremental svndiff decoder.
///
/// Input may arrive in arbitrary chunks; each call to
/// [`SvndiffDecoder::push`] returns the windows completed by that chunk.
/// A decoder that never saw any input finishes with no windows.
#[derive(Debug, Default)]
pub struct SvndiffDecoder {
    any_input: bool,
    header: [u8; SVNDIFF_HEADER_LEN],
    header_bytes: usize,
    version: Option<SvndiffVersion>,
    buf: CursorBuf,
    pending_window: Option<WindowHeader>,
}

impl SvndiffDecoder {
    /// Creates a decoder expecting the stream header.
    pub fn new() -> Self {
        Self::default()
    }

    /// The version announced by the header, once it has been read.
    pub fn version(&self) -> Option<SvndiffVersion> {
        self.version
    }

    /// Feeds one chunk and returns the windows it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<TextDeltaWindow>, SvnError> {
        if chunk.is_empty() {
            return Ok(Vec::new());
        }
        self.any_input = true;

        let mut input = chunk;
        if self.header_bytes < SVNDIFF_HEADER_LEN {
            let needed = SVNDIFF_HEADER_LEN - self.header_bytes;
            let take = needed.min(input.len());
            self.header[self.header_bytes..self.header_bytes + take]
                .copy_from_slice(&input[..take]);
            self.header_bytes += take;
            input = &input[take..];

            if self.header_bytes == SVNDIFF_HEADER_LEN {
                self.version = SvndiffVersion::from_header(&self.header);
                if self.version.is_none() {
                    return Err(SvnError::Protocol("svndiff has invalid header".into()));
                }
            }
        }
        self.buf.push(input);

        let mut windows = Vec::new();
        while let Some(window) = self.next_window()? {
            windows.push(window);
        }
        Ok(windows)
    }

    fn next_window(&mut self) -> Result<Option<TextDeltaWindow>, SvnError> {
        let Some(version) = self.version else {
            return Ok(None);
        };

        if self.pending_window.is_none() {
            let avail = self.buf.available();
            let Some(window) = try_parse_window_header(avail)? else {
                if avail.len() > 5 * MAX_ENCODED_UINT_LEN {
                    return Err(SvnError::Protocol(
                        "svndiff contains a too-large window header".into(),
                    ));
                }
                return Ok(None);
            };
            self.pending_window = Some(window);
        }

        let Some(header) = self.pending_window.as_ref() else {
            return Ok(None);
        };
        let avail = self.buf.available();
        let needed = header
            .header_len
            .checked_add(header.ins_len)
            .and_then(|n| n.checked_add(header.new_len))
            .ok_or_else(|| SvnError::Protocol("svndiff window size overflow".into()))?;
        if avail.len() < needed {
            return Ok(None);
        }

        let base = header.header_len;
        let ins_wire = &avail[base..base + header.ins_len];
        let new_wire = &avail[base + header.ins_len..needed];
        let instructions = decode_section(version, ins_wire, MAX_INSTRUCTION_SECTION_LEN)?;
        let new_data = decode_section(version, new_wire, DELTA_WINDOW_SIZE)?;
        let window = TextDeltaWindow {
            sview_offset: header.sview_offset,
            sview_len: header.sview_len,
            tview_len: header.tview_len,
            ops: parse_instructions(&instructions)?,
            new_data,
        };

        self.buf.consume(needed);
        self.pending_window = None;
        window.validate()?;
        Ok(Some(window))
    }

    /// Ends the input, rejecting a truncated stream.
    pub fn finish(self) -> Result<(), SvnError> {
        if !self.any_input {
            return Ok(());
        }
        if self.header_bytes < SVNDIFF_HEADER_LEN {
            return Err(SvnError::Protocol(
                "unexpected end of svndiff input (missing header)".into(),
            ));
        }
        if self.pending_window.is_some() || !self.buf.available().is_empty() {
            return Err(SvnError::Protocol(
                "unexpected end of svndiff input (truncated window)".into(),
            ));
        }
        Ok(())
    }
}

fn try_parse_window_header(input: &[u8]) -> Result<Option<WindowHeader>, SvnError> {
    let mut fields = [0u64; 5];
    let mut header_len = 0usize;
    for field in &mut fields {
        let Some((value, used)) = try_decode_uint(&input[header_len..])? else {
            return Ok(None);
        };
        *field = value;
        header_len += used;
    }
    let [sview_offset, sview_len, tview_len, ins_len, new_len] = fields;

    let ins_len = usize::try_from(ins_len)
        .map_err(|_| SvnError::Protocol("svndiff ins_len overflows usize".into()))?;
    let new_len = usize::try_from(new_len)
        .map_err(|_| SvnError::Protocol("svndiff new_len overflows usize".into()))?;

    let window_max = DELTA_WINDOW_SIZE as u64;
    if tview_len > window_max
        || sview_len > window_max
        || new_len > DELTA_WINDOW_SIZE + MAX_ENCODED_UINT_LEN
        || ins_len > MAX_INSTRUCTION_SECTION_LEN
    {
        return Err(SvnError::Protocol(
            "svndiff contains a too-large window".into(),
        ));
    }
    if sview_offset.checked_add(sview_len).is_none() {
        return Err(SvnError::Protocol(
            "svndiff contains corrupt window header".into(),
        ));
    }

    Ok(Some(WindowHeader {
        sview_offset,
        sview_len,
        tview_len,
        ins_len,
        new_len,
        header_len,
    }))
}

fn try_decode_uint(input: &[u8]) -> Result<Option<(u64, usize)>, SvnError> {
    let mut val: u64 = 0;
    for (idx, &b) in input.iter().enumerate() {
        if val >> 57 != 0 {
            return Err(SvnError::Protocol("svndiff integer overflow".into()));
        }
        val = (val << 7) | u64::from(b & 0x7f);
        if (b & 0x80) == 0 {
            return Ok(Some((val, idx + 1)));
        }
    }
    Ok(None)
}

fn parse_instructions(instructions: &[u8]) -> Result<Vec<DeltaOp>, SvnError> {
    let mut ops = Vec::new();
    let mut ipos = 0usize;
    let mut npos = 0u64;

    while ipos < instructions.len() {
        let selector = instructions[ipos];
        ipos += 1;

        let action = DeltaAction::from_opcode(selector >> 6)
            .ok_or_else(|| SvnError::Protocol("svndiff invalid action".into()))?;

        let mut len = u64::from(selector & 0x3f);
        if len == 0 {
            let Some((v, used)) = try_decode_uint(&instructions[ipos..])? else {
                return Err(SvnError::Protocol(
                    "svndiff instruction truncated length".into(),
                ));
            };
            ipos += used;
            len = v;
        }
        if len == 0 {
            return Err(SvnError::Protocol(
                "svndiff instruction has length zero".into(),
            ));
        }

        let offset = match action {
            DeltaAction::Source | DeltaAction::Target => {
                let Some((off, used)) = try_decode_uint(&instructions[ipos..])? else {
                    return Err(SvnError::Protocol(
                        "svndiff instruction missing offset".into(),
                    ));
                };
                ipos += used;
                off
            }
            DeltaAction::New => {
                let off = npos;
                npos += len;
                off
            }
        };
        ops.push(DeltaOp {
            action,
            offset,
            len,
        });
    }
    Ok(ops)
}

fn decode_section(version: SvndiffVersion, wire: &[u8], limit: usize) -> Result<Vec<u8>, SvnError> {
    match version {
        SvndiffVersion::V0 => Ok(wire.to_vec()),
        SvndiffVersion::V1 => decode_compressed_section(wire, limit, "zlib", |data, _| {
            let mut decoder = flate2::read::ZlibDecoder::new(data);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|err| SvnError::Protocol(format!("svndiff zlib decode failed: {err}")))?;
            Ok(out)
        }),
        SvndiffVersion::V2 => decode_compressed_section(wire, limit, "lz4", |data, orig_len| {
            lz4_flex::decompress(data, orig_len)
                .map_err(|err| SvnError::Protocol(format!("svndiff lz4 decode failed: {err}")))
        }),
    }
}

fn decode_compressed_section(
    wire: &[u8],
    limit: usize,
    codec: &str,
    inflate: impl FnOnce(&[u8], usize) -> Result<Vec<u8>, SvnError>,
) -> Result<Vec<u8>, SvnError> {
    let Some((orig_len, used)) = try_decode_uint(wire)? else {
        return Err(SvnError::Protocol(format!(
            "svndiff {codec} section missing size"
        )));
    };
    let orig_len = usize::try_from(orig_len)
        .map_err(|_| SvnError::Protocol(format!("svndiff {codec} size overflows usize")))?;
    if orig_len > limit {
        return Err(SvnError::Protocol(format!(
            "svndiff {codec} section size too large"
        )));
    }

    let data = &wire[used..];
    if data.len() == orig_len {
        return Ok(data.to_vec());
    }

    let out = inflate(data, orig_len)?;
    if out.len() != orig_len {
        return Err(SvnError::Protocol(format!(
            "svndiff {codec} decoded length mismatch"
        )));
    }
    Ok(out)
}
