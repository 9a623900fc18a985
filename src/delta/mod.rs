//! Text-delta windows and the streaming apply protocol.
//!
//! A file's content change travels as a finite sequence of
//! [`TextDeltaWindow`]s followed by a terminator. Each window reconstructs a
//! contiguous slice of the target from a view of the source (the base text),
//! from target bytes already produced, and from literal new data.
//!
//! Two byte encodings are provided: the fixed-width record format in
//! [`record`] and Subversion's svndiff format in [`svndiff`].

use std::io::{self, Read};

use md5::{Digest, Md5};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::SvnError;

pub mod record;
pub mod svndiff;

/// Largest window produced by [`send_stream`] and accepted by the svndiff
/// decoder.
pub const DELTA_WINDOW_SIZE: usize = 64 * 1024;

/// Where a [`DeltaOp`] takes its bytes from.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeltaAction {
    /// Copy from the source view.
    Source,
    /// Copy from the part of the target already produced (may overlap).
    Target,
    /// Copy from the window's new data.
    New,
}

impl DeltaAction {
    /// Opcode used by both byte encodings.
    pub fn opcode(self) -> u8 {
        match self {
            Self::Source => 0,
            Self::Target => 1,
            Self::New => 2,
        }
    }

    /// Parses an opcode.
    pub fn from_opcode(opcode: u8) -> Option<Self> {
        match opcode {
            0 => Some(Self::Source),
            1 => Some(Self::Target),
            2 => Some(Self::New),
            _ => None,
        }
    }
}

/// One copy or insert instruction.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeltaOp {
    /// Instruction kind.
    pub action: DeltaAction,
    /// Offset into the source view, the target view or the new data.
    pub offset: u64,
    /// Number of bytes produced.
    pub len: u64,
}

impl DeltaOp {
    /// Copies `len` bytes from the source view at `offset`.
    pub fn source(offset: u64, len: u64) -> Self {
        Self {
            action: DeltaAction::Source,
            offset,
            len,
        }
    }

    /// Copies `len` bytes from the target view at `offset`.
    pub fn target(offset: u64, len: u64) -> Self {
        Self {
            action: DeltaAction::Target,
            offset,
            len,
        }
    }

    /// Inserts `len` bytes of new data starting at `offset`.
    pub fn new_data(offset: u64, len: u64) -> Self {
        Self {
            action: DeltaAction::New,
            offset,
            len,
        }
    }
}

/// One unit of a streamed file diff.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TextDeltaWindow {
    /// Offset of the source view within the base text.
    pub sview_offset: u64,
    /// Length of the source view.
    pub sview_len: u64,
    /// Number of bytes this window produces.
    pub tview_len: u64,
    /// Instructions, applied in order.
    pub ops: Vec<DeltaOp>,
    /// Literal bytes consumed by [`DeltaAction::New`] instructions.
    pub new_data: Vec<u8>,
}

impl TextDeltaWindow {
    /// A window that inserts `data` without reading the source.
    pub fn insertion(data: &[u8]) -> Self {
        let mut ops = Vec::new();
        if !data.is_empty() {
            ops.push(DeltaOp::new_data(0, data.len() as u64));
        }
        Self {
            sview_offset: 0,
            sview_len: 0,
            tview_len: data.len() as u64,
            ops,
            new_data: data.to_vec(),
        }
    }

    /// Returns `true` for a window with no instructions and no new data.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty() && self.new_data.is_empty()
    }

    /// Number of instructions that read the source view.
    pub fn src_ops(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| op.action == DeltaAction::Source)
            .count()
    }

    /// Checks that the instructions are consistent with the view lengths
    /// and the new data.
    pub fn validate(&self) -> Result<(), SvnError> {
        if self.sview_offset.checked_add(self.sview_len).is_none() {
            return Err(SvnError::Protocol(
                "delta window source view overflows".into(),
            ));
        }

        let mut tpos = 0u64;
        let mut npos = 0u64;
        for op in &self.ops {
            if op.len == 0 {
                return Err(SvnError::Protocol(
                    "delta instruction has length zero".into(),
                ));
            }
            match op.action {
                DeltaAction::Source => {
                    let end = op.offset.checked_add(op.len);
                    if end.is_none_or(|end| end > self.sview_len) {
                        return Err(SvnError::Protocol(
                            "delta [src] instruction overflows source view".into(),
                        ));
                    }
                }
                DeltaAction::Target => {
                    if op.offset >= tpos {
                        return Err(SvnError::Protocol(
                            "delta [tgt] instruction starts beyond target view position".into(),
                        ));
                    }
                }
                DeltaAction::New => {
                    if op.offset != npos {
                        return Err(SvnError::Protocol(
                            "delta [new] instruction does not follow the previous one".into(),
                        ));
                    }
                    npos = npos
                        .checked_add(op.len)
                        .filter(|end| *end <= self.new_data.len() as u64)
                        .ok_or_else(|| {
                            SvnError::Protocol(
                                "delta [new] instruction overflows new data section".into(),
                            )
                        })?;
                }
            }
            tpos = tpos
                .checked_add(op.len)
                .filter(|end| *end <= self.tview_len)
                .ok_or_else(|| {
                    SvnError::Protocol("delta instruction overflows target view".into())
                })?;
        }

        if tpos != self.tview_len {
            return Err(SvnError::Protocol(
                "delta does not fill the target window".into(),
            ));
        }
        if npos != self.new_data.len() as u64 {
            return Err(SvnError::Protocol(
                "delta does not consume all of its new data".into(),
            ));
        }
        Ok(())
    }

    /// Applies the window to its source view (exactly `sview_len` bytes).
    pub fn apply(&self, source_view: &[u8]) -> Result<Vec<u8>, SvnError> {
        self.validate()?;
        if source_view.len() as u64 != self.sview_len {
            return Err(SvnError::Protocol(format!(
                "delta source view is {} bytes, window expects {}",
                source_view.len(),
                self.sview_len
            )));
        }

        let tview_len = usize::try_from(self.tview_len)
            .map_err(|_| SvnError::Protocol("delta target view overflows usize".into()))?;
        let mut target = Vec::with_capacity(tview_len);
        for op in &self.ops {
            let offset = to_usize(op.offset)?;
            let len = to_usize(op.len)?;
            match op.action {
                DeltaAction::Source => {
                    target.extend_from_slice(&source_view[offset..offset + len]);
                }
                DeltaAction::Target => {
                    // Byte-wise so that overlapping copies repeat a pattern.
                    for i in 0..len {
                        let b = target[offset + i];
                        target.push(b);
                    }
                }
                DeltaAction::New => {
                    target.extend_from_slice(&self.new_data[offset..offset + len]);
                }
            }
        }
        Ok(target)
    }

    /// Applies the window to the whole base text, slicing the source view
    /// out of it.
    pub fn apply_to_base(&self, base: &[u8]) -> Result<Vec<u8>, SvnError> {
        let start = to_usize(self.sview_offset)?;
        let end = start
            .checked_add(to_usize(self.sview_len)?)
            .filter(|end| *end <= base.len())
            .ok_or_else(|| {
                SvnError::Protocol("delta source view out of bounds for base".into())
            })?;
        self.apply(&base[start..end])
    }
}

fn to_usize(value: u64) -> Result<usize, SvnError> {
    usize::try_from(value).map_err(|_| SvnError::Protocol("delta offset overflows usize".into()))
}

/// Receives a window stream: `Some(window)` for each window, then `None`
/// exactly once.
pub trait WindowSink {
    /// Delivers the next window, or terminates the stream with `None`.
    fn send(&mut self, window: Option<TextDeltaWindow>) -> Result<(), SvnError>;
}

impl<F> WindowSink for F
where
    F: FnMut(Option<TextDeltaWindow>) -> Result<(), SvnError>,
{
    fn send(&mut self, window: Option<TextDeltaWindow>) -> Result<(), SvnError> {
        self(window)
    }
}

/// Lowercase hex MD5 of `data`.
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

pub(crate) fn verify_checksum(path: &str, expected: &str, actual: &str) -> Result<(), SvnError> {
    if expected.eq_ignore_ascii_case(actual) {
        Ok(())
    } else {
        Err(SvnError::ChecksumMismatch {
            path: path.to_string(),
            expected: expected.to_ascii_lowercase(),
            actual: actual.to_string(),
        })
    }
}

/// Backward-sliding source view check (matches Subversion's applier).
#[derive(Debug, Default)]
struct ViewTracker {
    last_offset: u64,
    last_len: u64,
}

impl ViewTracker {
    fn check(&mut self, window: &TextDeltaWindow) -> Result<(), SvnError> {
        if window.sview_len > 0 {
            let end = window
                .sview_offset
                .checked_add(window.sview_len)
                .ok_or_else(|| SvnError::Protocol("delta source view overflow".into()))?;
            let last_end = self.last_offset + self.last_len;
            if window.sview_offset < self.last_offset || end < last_end {
                return Err(SvnError::Protocol(
                    "delta has backwards-sliding source views".into(),
                ));
            }
            self.last_offset = window.sview_offset;
            self.last_len = window.sview_len;
        }
        Ok(())
    }
}

/// Applies a window stream to a base text in memory, tracking the MD5 of
/// the produced target.
///
/// A stream with no windows produces the empty text.
#[derive(Debug)]
pub struct DeltaApplier {
    base: Vec<u8>,
    target: Vec<u8>,
    hasher: Md5,
    views: ViewTracker,
    windows: usize,
    finished: bool,
}

impl DeltaApplier {
    /// Creates an applier over `base`.
    pub fn new(base: impl Into<Vec<u8>>) -> Self {
        Self {
            base: base.into(),
            target: Vec::new(),
            hasher: Md5::new(),
            views: ViewTracker::default(),
            windows: 0,
            finished: false,
        }
    }

    /// Applies the next window.
    pub fn apply_window(&mut self, window: &TextDeltaWindow) -> Result<(), SvnError> {
        if self.finished {
            return Err(SvnError::state("delta window after the end of the stream"));
        }
        self.views.check(window)?;
        let data = window.apply_to_base(&self.base)?;
        self.hasher.update(&data);
        self.target.extend_from_slice(&data);
        self.windows += 1;
        Ok(())
    }

    /// Marks the stream as terminated.
    pub fn finish(&mut self) -> Result<(), SvnError> {
        if self.finished {
            return Err(SvnError::state("delta stream terminated twice"));
        }
        self.finished = true;
        Ok(())
    }

    /// Whether the terminator has been received.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of windows applied so far.
    pub fn window_count(&self) -> usize {
        self.windows
    }

    /// Target bytes produced so far.
    pub fn target(&self) -> &[u8] {
        &self.target
    }

    /// Lowercase hex MD5 of the target produced so far.
    pub fn md5_hex(&self) -> String {
        hex::encode(self.hasher.clone().finalize())
    }

    /// Compares the target checksum with `expected`.
    pub fn verify(&self, path: &str, expected: &str) -> Result<(), SvnError> {
        verify_checksum(path, expected, &self.md5_hex())
    }

    /// Consumes the applier and returns the target text.
    pub fn into_target(self) -> Vec<u8> {
        self.target
    }
}

impl WindowSink for DeltaApplier {
    fn send(&mut self, window: Option<TextDeltaWindow>) -> Result<(), SvnError> {
        match window {
            Some(window) => self.apply_window(&window),
            None => self.finish(),
        }
    }
}

/// Applies `windows` to `base`, writing each window's output to `out` as
/// soon as it is produced. Returns the MD5 of everything written.
pub async fn apply_windows<'a, W, I>(
    base: &[u8],
    windows: I,
    out: &mut W,
) -> Result<String, SvnError>
where
    W: AsyncWrite + Unpin,
    I: IntoIterator<Item = &'a TextDeltaWindow>,
{
    let mut views = ViewTracker::default();
    let mut hasher = Md5::new();
    for window in windows {
        views.check(window)?;
        let data = window.apply_to_base(base)?;
        hasher.update(&data);
        out.write_all(&data).await?;
    }
    out.flush().await?;
    Ok(hex::encode(hasher.finalize()))
}

/// Streams `reader` to `sink` as insertion windows of at most
/// [`DELTA_WINDOW_SIZE`] bytes, then terminates the stream. Returns the MD5
/// of the bytes sent.
pub fn send_stream<R, S>(reader: &mut R, sink: &mut S) -> Result<String, SvnError>
where
    R: Read + ?Sized,
    S: WindowSink + ?Sized,
{
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; DELTA_WINDOW_SIZE];
    loop {
        let mut filled = 0;
        while filled < buf.len() {
            match reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
        if filled == 0 {
            break;
        }
        hasher.update(&buf[..filled]);
        sink.send(Some(TextDeltaWindow::insertion(&buf[..filled])))?;
        if filled < buf.len() {
            break;
        }
    }
    sink.send(None)?;
    Ok(hex::encode(hasher.finalize()))
}

/// [`send_stream`] over an in-memory buffer.
pub fn send_contents<S>(contents: &[u8], sink: &mut S) -> Result<String, SvnError>
where
    S: WindowSink + ?Sized,
{
    let mut reader = contents;
    send_stream(&mut reader, sink)
}

/// A growable input buffer with a read cursor, shared by the stream decoders.
#[derive(Debug, Default)]
pub(crate) struct CursorBuf {
    buf: Vec<u8>,
    start: usize,
}

impl CursorBuf {
    pub(crate) fn available(&self) -> &[u8] {
        &self.buf[self.start..]
    }

    pub(crate) fn push(&mut self, bytes: &[u8]) {
        if !bytes.is_empty() {
            self.buf.extend_from_slice(bytes);
        }
    }

    pub(crate) fn consume(&mut self, n: usize) {
        self.start = self.start.saturating_add(n);
        if self.start >= self.buf.len() {
            self.buf.clear();
            self.start = 0;
            return;
        }

        if self.start > 4096 && self.start * 2 > self.buf.len() {
            self.buf.drain(..self.start);
            self.start = 0;
        }
    }
}
