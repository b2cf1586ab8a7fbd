//! Reassembly of complete lines from arbitrarily chunked output.

/// Longest line kept whole; longer runs without a terminator are cut here.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// How a line was terminated in the original stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    Lf,
    CrLf,
    /// Bare carriage return, as written by progress spinners.
    Cr,
    /// No terminator: the final fragment flushed after the stream ended, or
    /// a piece of a line longer than [`MAX_LINE_BYTES`].
    None,
}

impl LineEnding {
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
            LineEnding::Cr => "\r",
            LineEnding::None => "",
        }
    }
}

/// One line of helper output, without its terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub text: String,
    pub ending: LineEnding,
}

impl Line {
    fn new(raw: &[u8], ending: LineEnding) -> Self {
        Self {
            text: String::from_utf8_lossy(raw).into_owned(),
            ending,
        }
    }
}

/// Buffers bytes until `\n`, `\r\n` or `\r` completes a line.
///
/// Splitting happens on bytes, so a multi-byte UTF-8 sequence cut across two
/// reads is decoded only once it is whole. A trailing `\r` is held back until
/// the next byte shows whether it starts a `\r\n`.
#[derive(Debug, Default)]
pub struct LineAssembler {
    pending: Vec<u8>,
    /// Leading bytes of `pending` already known to hold no terminator.
    scanned: usize,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` and iterate over the lines they complete.
    ///
    /// The iterator is lazy. Lines it did not yield before being dropped stay
    /// buffered and come out of the next `feed`.
    pub fn feed(&mut self, bytes: &[u8]) -> CompleteLines<'_> {
        self.pending.extend_from_slice(bytes);
        CompleteLines {
            pending: &mut self.pending,
            scanned: &mut self.scanned,
            consumed: 0,
        }
    }

    /// Emit whatever is still buffered as one last line.
    pub fn flush(&mut self) -> Option<Line> {
        if self.pending.is_empty() {
            return None;
        }
        let line = match self.pending.strip_suffix(b"\r") {
            Some(body) => Line::new(body, LineEnding::Cr),
            None => Line::new(&self.pending, LineEnding::None),
        };
        self.pending.clear();
        self.scanned = 0;
        Some(line)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Lazy iterator returned by [`LineAssembler::feed`].
pub struct CompleteLines<'a> {
    pending: &'a mut Vec<u8>,
    scanned: &'a mut usize,
    consumed: usize,
}

impl Iterator for CompleteLines<'_> {
    type Item = Line;

    fn next(&mut self) -> Option<Line> {
        let start = self.consumed.max(*self.scanned);
        let window_end = self.pending.len().min(self.consumed + MAX_LINE_BYTES);
        let found = self.pending[start.min(window_end)..window_end]
            .iter()
            .position(|&b| b == b'\n' || b == b'\r')
            .map(|i| start + i);

        let (end, ending, next) = match found {
            Some(at) if self.pending[at] == b'\n' => (at, LineEnding::Lf, at + 1),
            Some(at) => match self.pending.get(at + 1) {
                Some(b'\n') => (at, LineEnding::CrLf, at + 2),
                Some(_) => (at, LineEnding::Cr, at + 1),
                None => {
                    *self.scanned = at;
                    return None;
                }
            },
            None if window_end - self.consumed == MAX_LINE_BYTES => {
                (window_end, LineEnding::None, window_end)
            }
            None => {
                *self.scanned = window_end;
                return None;
            }
        };

        let line = Line::new(&self.pending[self.consumed..end], ending);
        self.consumed = next;
        Some(line)
    }
}

impl Drop for CompleteLines<'_> {
    fn drop(&mut self) {
        self.pending.drain(..self.consumed);
        *self.scanned = self.scanned.saturating_sub(self.consumed);
    }
}
