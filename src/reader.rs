//! The row-level state machine.
//!
//! [`RowReader`] never backtracks and never copies: it walks the cursor
//! window with two compiled spanners, records `(ptr, len, escaped)` cell
//! descriptors as it goes, and advances the cursor exactly once per
//! emitted row. Overflow (cell vector too small) and underrun (window too
//! short) are internal control signals: the cursor is left untouched, the
//! caller-side loop grows or refills, and the same row is parsed again
//! from scratch.

use std::io::Read;

use crate::cursor::{BufferedStreamCursor, StreamCursor};
use crate::row::{CellSpan, Row};
use crate::spanner::CharClassSpanner;

#[cfg(unix)]
use crate::cursor::MappedFileCursor;
#[cfg(unix)]
use crate::error::Result;
#[cfg(unix)]
use std::path::Path;

const INITIAL_CELL_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy)]
enum Parse {
    // Payload is the number of bytes the row consumed, terminator included.
    Row(usize),
    Overflow,
    Underrun,
}

#[derive(Debug, Clone, Copy)]
enum State {
    NewlineSkip,
    CellStart,
    InQuoted,
    AfterQuote,
    InUnquoted,
    AfterUnquotedBreak,
}

/// Builds a [`RowReader`] with given dialect configuration.
#[derive(Debug, Clone)]
pub struct RowReaderBuilder {
    delimiter: u8,
    quotechar: u8,
    escapechar: u8,
    yield_incomplete_row: bool,
    buffer_capacity: Option<usize>,
}

impl Default for RowReaderBuilder {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quotechar: b'"',
            escapechar: 0,
            yield_incomplete_row: false,
            buffer_capacity: None,
        }
    }
}

impl RowReaderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the delimiter to be used by the created [`RowReader`].
    ///
    /// Will default to a comma.
    pub fn delimiter(&mut self, delimiter: u8) -> &mut Self {
        self.delimiter = delimiter;
        self
    }

    /// Set the quote char to be used by the created [`RowReader`].
    ///
    /// Will default to a double quote.
    pub fn quotechar(&mut self, quotechar: u8) -> &mut Self {
        self.quotechar = quotechar;
        self
    }

    /// Set an explicit escape char to be used by the created
    /// [`RowReader`].
    ///
    /// Will default to none (quote doubling remains understood either
    /// way).
    pub fn escapechar(&mut self, escapechar: u8) -> &mut Self {
        self.escapechar = escapechar;
        self
    }

    /// Indicate whether a final row lacking a line terminator should
    /// still be emitted.
    ///
    /// Will default to `false`.
    pub fn yield_incomplete_row(&mut self, yes: bool) -> &mut Self {
        self.yield_incomplete_row = yes;
        self
    }

    /// Set the buffer capacity used by [`Self::from_reader`].
    pub fn buffer_capacity(&mut self, capacity: usize) -> &mut Self {
        self.buffer_capacity = Some(capacity);
        self
    }

    /// Create a new [`RowReader`] over the provided cursor.
    pub fn from_cursor<C: StreamCursor>(&self, cursor: C) -> RowReader<C> {
        RowReader {
            cursor,
            delimiter: self.delimiter,
            quotechar: self.quotechar,
            escapechar: self.escapechar,
            yield_incomplete_row: self.yield_incomplete_row,
            quoted_spanner: CharClassSpanner::new([self.quotechar, self.escapechar, 0, 0]),
            unquoted_spanner: CharClassSpanner::new([
                self.delimiter,
                b'\r',
                b'\n',
                self.escapechar,
            ]),
            cells: vec![CellSpan::placeholder(); INITIAL_CELL_CAPACITY],
            count: 0,
        }
    }

    /// Create a new [`RowReader`] buffering the provided reader
    /// implementing [`std::io::Read`].
    pub fn from_reader<R: Read>(&self, reader: R) -> RowReader<BufferedStreamCursor<R>> {
        let cursor = match self.buffer_capacity {
            None => BufferedStreamCursor::new(reader),
            Some(capacity) => BufferedStreamCursor::with_capacity(capacity, reader),
        };

        self.from_cursor(cursor)
    }

    /// Create a new [`RowReader`] memory-mapping the file at `path`.
    #[cfg(unix)]
    pub fn from_path<P: AsRef<Path>>(&self, path: P) -> Result<RowReader<MappedFileCursor>> {
        Ok(self.from_cursor(MappedFileCursor::open(path)?))
    }
}

/// An already configured zero-copy row reader.
///
/// # Configuration
///
/// To configure a [`RowReader`], if you need a custom delimiter or an
/// explicit escape char for instance, check out the [`RowReaderBuilder`].
pub struct RowReader<C> {
    cursor: C,
    delimiter: u8,
    quotechar: u8,
    escapechar: u8,
    yield_incomplete_row: bool,
    quoted_spanner: CharClassSpanner,
    unquoted_spanner: CharClassSpanner,
    cells: Vec<CellSpan>,
    count: usize,
}

impl<R: Read> RowReader<BufferedStreamCursor<R>> {
    pub fn from_reader(reader: R) -> Self {
        RowReaderBuilder::new().from_reader(reader)
    }
}

#[cfg(unix)]
impl RowReader<MappedFileCursor> {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        RowReaderBuilder::new().from_path(path)
    }
}

impl<C: StreamCursor> RowReader<C> {
    pub fn from_cursor(cursor: C) -> Self {
        RowReaderBuilder::new().from_cursor(cursor)
    }

    /// Parse the next row. Returns false once input is exhausted.
    ///
    /// On true, [`Self::row`] exposes the parsed cells until the next
    /// call.
    pub fn read_row(&mut self) -> bool {
        loop {
            match unsafe { self.try_parse(false) } {
                Parse::Row(consumed) => {
                    self.cursor.consume(consumed);
                    return true;
                }
                Parse::Overflow => {
                    self.grow_cells();
                }
                Parse::Underrun => {
                    if !self.cursor.fill() {
                        break;
                    }
                }
            }
        }

        if !self.yield_incomplete_row {
            self.count = 0;
            return false;
        }

        // End of input with a possible partial row pending: one more pass,
        // treating exhaustion as the row terminator.
        loop {
            match unsafe { self.try_parse(true) } {
                Parse::Row(consumed) => {
                    self.cursor.consume(consumed);
                    return true;
                }
                Parse::Overflow => {
                    self.grow_cells();
                }
                Parse::Underrun => {
                    self.count = 0;
                    return false;
                }
            }
        }
    }

    /// The most recently parsed row.
    #[inline]
    pub fn row(&self) -> Row<'_> {
        Row::new(&self.cells[..self.count], self.quotechar, self.escapechar)
    }

    pub fn into_cursor(self) -> C {
        self.cursor
    }

    fn grow_cells(&mut self) {
        let capacity = self.cells.len();
        self.cells.resize(capacity * 2, CellSpan::placeholder());
    }

    // One attempt at parsing a row inside the current cursor window. Never
    // advances the cursor; the caller commits the returned consumed length
    // on success. With `at_eof` set, running out of window is a row
    // terminator instead of an underrun.
    //
    // Safety: relies on the cursor contract that buf()[0..size() + 15] is
    // readable, so a 16-byte spanner load issued below endp cannot fault.
    unsafe fn try_parse(&mut self, at_eof: bool) -> Parse {
        let start = self.cursor.buf();
        let endp = start.add(self.cursor.size());

        let delimiter = self.delimiter;
        let quotechar = self.quotechar;
        let quoted_spanner = &self.quoted_spanner;
        let unquoted_spanner = &self.unquoted_spanner;
        let cells = &mut self.cells;
        let count = &mut self.count;

        let mut p = start;
        let mut cell_start = p;
        let mut escaped = false;
        let mut state = State::NewlineSkip;

        *count = 0;

        macro_rules! push_cell {
            ($ptr:expr, $len:expr) => {{
                if *count == cells.len() {
                    return Parse::Overflow;
                }
                cells[*count] = CellSpan::new($ptr, $len, escaped);
                *count += 1;
            }};
        }

        loop {
            match state {
                // Swallow \r and \n at row start: CRLF tails, blank lines,
                // double-spaced files.
                State::NewlineSkip => {
                    if p >= endp {
                        return Parse::Underrun;
                    }
                    if *p == b'\r' || *p == b'\n' {
                        p = p.add(1);
                    } else {
                        state = State::CellStart;
                    }
                }
                State::CellStart => {
                    escaped = false;

                    if p >= endp {
                        if !at_eof || *count == 0 {
                            return Parse::Underrun;
                        }
                        // Trailing delimiter flush against end of input:
                        // the delimiter promised one more (empty) cell.
                        push_cell!(endp, 0);
                        return Parse::Row(distance(endp, start));
                    }

                    let c = *p;

                    if c == b'\r' || c == b'\n' {
                        // A terminator right after a delimiter: empty
                        // final cell.
                        push_cell!(p, 0);
                        return Parse::Row(distance(p.add(1), start));
                    } else if c == quotechar {
                        p = p.add(1);
                        cell_start = p;
                        state = State::InQuoted;
                    } else {
                        cell_start = p;
                        state = State::InUnquoted;
                    }
                }
                State::InQuoted => {
                    if p >= endp {
                        if !at_eof {
                            return Parse::Underrun;
                        }
                        // Unterminated quoted cell.
                        push_cell!(cell_start, distance(endp, cell_start));
                        return Parse::Row(distance(endp, start));
                    }

                    let rc = quoted_spanner.span(p);

                    if rc == 16 {
                        p = p.add(16);
                        continue;
                    }

                    if p.add(rc) >= endp {
                        // Matched in the padding, not in valid input.
                        if !at_eof {
                            return Parse::Underrun;
                        }
                        push_cell!(cell_start, distance(endp, cell_start));
                        return Parse::Row(distance(endp, start));
                    }

                    p = p.add(rc + 1);
                    state = State::AfterQuote;
                }
                State::AfterQuote => {
                    // p sits one past a quote or escape byte.
                    if p >= endp {
                        if !at_eof {
                            return Parse::Underrun;
                        }
                        // Closing quote flush against end of input: the
                        // quote is excluded from the cell.
                        push_cell!(cell_start, distance(p, cell_start) - 1);
                        return Parse::Row(distance(endp, start));
                    }

                    let c = *p;

                    if c == delimiter {
                        push_cell!(cell_start, distance(p, cell_start) - 1);
                        p = p.add(1);
                        state = State::CellStart;
                    } else if c == b'\r' || c == b'\n' {
                        push_cell!(cell_start, distance(p, cell_start) - 1);
                        return Parse::Row(distance(p.add(1), start));
                    } else {
                        // Doubled quote or escape pair: stay in the cell.
                        escaped = true;
                        p = p.add(1);
                        state = State::InQuoted;
                    }
                }
                State::InUnquoted => {
                    if p >= endp {
                        if !at_eof {
                            return Parse::Underrun;
                        }
                        push_cell!(cell_start, distance(endp, cell_start));
                        return Parse::Row(distance(endp, start));
                    }

                    let rc = unquoted_spanner.span(p);

                    if rc == 16 {
                        p = p.add(16);
                        continue;
                    }

                    if p.add(rc) >= endp {
                        if !at_eof {
                            return Parse::Underrun;
                        }
                        push_cell!(cell_start, distance(endp, cell_start));
                        return Parse::Row(distance(endp, start));
                    }

                    p = p.add(rc);
                    state = State::AfterUnquotedBreak;
                }
                State::AfterUnquotedBreak => {
                    // The break byte at p is within valid input by
                    // construction.
                    let c = *p;

                    if c == delimiter {
                        push_cell!(cell_start, distance(p, cell_start));
                        p = p.add(1);
                        state = State::CellStart;
                    } else if c == b'\r' || c == b'\n' {
                        push_cell!(cell_start, distance(p, cell_start));
                        return Parse::Row(distance(p.add(1), start));
                    } else {
                        // Explicit escape byte: drop out of the scan for
                        // one byte and keep going inside the same cell.
                        escaped = true;
                        p = p.add(1);
                        state = State::InUnquoted;
                    }
                }
            }
        }
    }
}

#[inline(always)]
unsafe fn distance(p: *const u8, origin: *const u8) -> usize {
    p.offset_from(origin) as usize
}
