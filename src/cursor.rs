//! Input cursors: growable views over the bytes being parsed.
//!
//! Every cursor upholds one contract the parser depends on: the 15 bytes
//! directly past the logically valid tail are readable, so a 16-byte
//! spanner load issued at the very last valid byte cannot fault. What
//! those trailing bytes contain is unspecified and they are never
//! interpreted.

use std::io::{self, Read};

pub(crate) const SPAN_MARGIN: usize = 16;

const DEFAULT_BUFFER_CAPACITY: usize = 128 * 1024;

/// A positioned window over the input bytes.
///
/// Invariant: `buf()[0..size() + 15]` is always readable.
pub trait StreamCursor {
    /// Read-only pointer to the current logical start.
    fn buf(&self) -> *const u8;

    /// Number of valid bytes starting at [`Self::buf`].
    fn size(&self) -> usize;

    /// Advance the logical start by `min(n, size())`.
    fn consume(&mut self, n: usize);

    /// Try to make more bytes available. Returns false at end of input or
    /// on a read error.
    fn fill(&mut self) -> bool;
}

/// A buffered cursor over any [`Read`] implementation.
///
/// Owns a growable buffer and issues a single read per [`fill`]
/// invocation. At least 16 bytes of zero-initialized slack are kept past
/// the write position at all times.
///
/// [`fill`]: StreamCursor::fill
pub struct BufferedStreamCursor<R> {
    inner: R,
    buffer: Vec<u8>,
    read_pos: usize,
    write_pos: usize,
}

impl<R: Read> BufferedStreamCursor<R> {
    pub fn new(inner: R) -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY, inner)
    }

    pub fn with_capacity(capacity: usize, inner: R) -> Self {
        Self {
            inner,
            buffer: vec![0; capacity + SPAN_MARGIN],
            read_pos: 0,
            write_pos: 0,
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    #[inline]
    fn headroom(&self) -> usize {
        self.buffer.len() - SPAN_MARGIN - self.write_pos
    }
}

impl<R: Read> StreamCursor for BufferedStreamCursor<R> {
    #[inline(always)]
    fn buf(&self) -> *const u8 {
        unsafe { self.buffer.as_ptr().add(self.read_pos) }
    }

    #[inline(always)]
    fn size(&self) -> usize {
        self.write_pos - self.read_pos
    }

    #[inline(always)]
    fn consume(&mut self, n: usize) {
        self.read_pos += n.min(self.size());
    }

    fn fill(&mut self) -> bool {
        // Shift unread bytes back to offset 0 before reading more.
        if self.read_pos > 0 {
            self.buffer.copy_within(self.read_pos..self.write_pos, 0);
            self.write_pos -= self.read_pos;
            self.read_pos = 0;
        }

        if self.headroom() == 0 {
            let grow = (self.buffer.len() / 2).max(SPAN_MARGIN);
            let new_len = self.buffer.len() + grow;
            self.buffer.resize(new_len, 0);
        }

        let writable_end = self.buffer.len() - SPAN_MARGIN;

        loop {
            match self.inner.read(&mut self.buffer[self.write_pos..writable_end]) {
                Ok(0) => return false,
                Ok(n) => {
                    self.write_pos += n;
                    return true;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                // Read errors collapse into end-of-input.
                Err(_) => return false,
            }
        }
    }
}

#[cfg(unix)]
pub use mapped::MappedFileCursor;

#[cfg(unix)]
mod mapped {
    use std::fs::File;
    use std::os::unix::io::AsRawFd;
    use std::path::Path;
    use std::ptr;

    use crate::error::{Error, Result};

    use super::StreamCursor;

    /// A cursor over a whole memory-mapped file.
    ///
    /// The mapping is followed by one anonymous guard page so the
    /// 16-byte-readable-tail contract holds at end of file. A naive "map
    /// the file, then map a page after it" would race with concurrent
    /// mapping requests in the process; instead the whole range (file
    /// size rounded up to a page, plus one page) is reserved anonymously
    /// first and the file is overlaid onto the low portion with a
    /// fixed-address mapping. The anonymous page left at the tail can
    /// never be claimed by anyone else.
    pub struct MappedFileCursor {
        base: *mut libc::c_void,
        total: usize,
        pos: *const u8,
        end: *const u8,
    }

    impl MappedFileCursor {
        pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
            let path = path.as_ref();

            let file = File::open(path).map_err(|err| Error::open(path, err))?;
            let len = file
                .metadata()
                .map_err(|err| Error::open(path, err))?
                .len() as usize;

            let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
            let rounded = len.div_ceil(page) * page;
            let total = rounded + page;

            unsafe {
                let base = libc::mmap(
                    ptr::null_mut(),
                    total,
                    libc::PROT_READ,
                    libc::MAP_ANON | libc::MAP_PRIVATE,
                    -1,
                    0,
                );

                if base == libc::MAP_FAILED {
                    return Err(Error::map("could not reserve guard region"));
                }

                // An empty file needs no overlay (and a zero-length mmap is
                // invalid); the reservation alone is the guard region.
                if len > 0 {
                    let data = libc::mmap(
                        base,
                        len,
                        libc::PROT_READ,
                        libc::MAP_SHARED | libc::MAP_FIXED,
                        file.as_raw_fd(),
                        0,
                    );

                    if data != base {
                        libc::munmap(base, total);
                        return Err(Error::map("could not place file data below guard page"));
                    }

                    libc::madvise(base, len, libc::MADV_SEQUENTIAL);
                }

                // The descriptor can go; the mapping keeps the inode alive.
                drop(file);

                let start = base as *const u8;

                Ok(Self {
                    base,
                    total,
                    pos: start,
                    end: start.add(len),
                })
            }
        }
    }

    impl StreamCursor for MappedFileCursor {
        #[inline(always)]
        fn buf(&self) -> *const u8 {
            self.pos
        }

        #[inline(always)]
        fn size(&self) -> usize {
            unsafe { self.end.offset_from(self.pos) as usize }
        }

        #[inline(always)]
        fn consume(&mut self, n: usize) {
            self.pos = unsafe { self.pos.add(n.min(self.size())) };
        }

        /// The whole file is visible from the start; there is never more.
        #[inline(always)]
        fn fill(&mut self) -> bool {
            false
        }
    }

    impl Drop for MappedFileCursor {
        fn drop(&mut self) {
            // One munmap covers both the file overlay and the guard page.
            unsafe {
                libc::munmap(self.base, self.total);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents<C: StreamCursor>(cursor: &C) -> &[u8] {
        unsafe { std::slice::from_raw_parts(cursor.buf(), cursor.size()) }
    }

    #[test]
    fn test_buffered_fill_and_consume() {
        let data = b"name,surname,age\n".as_slice();
        let mut cursor = BufferedStreamCursor::with_capacity(64, data);

        assert_eq!(cursor.size(), 0);
        assert!(cursor.fill());
        assert_eq!(contents(&cursor), data);

        cursor.consume(5);
        assert_eq!(contents(&cursor), b"surname,age\n");

        // Consuming past the end clamps.
        cursor.consume(1000);
        assert_eq!(cursor.size(), 0);

        // End of input.
        assert!(!cursor.fill());
    }

    #[test]
    fn test_buffered_grows_under_tiny_capacity() {
        let data = b"abcdefghijklmnopqrstuvwxyz".as_slice();
        let mut cursor = BufferedStreamCursor::with_capacity(1, data);

        while cursor.fill() {}

        assert_eq!(contents(&cursor), data);
    }

    #[test]
    fn test_buffered_zero_capacity() {
        let data = b"ab".as_slice();
        let mut cursor = BufferedStreamCursor::with_capacity(0, data);

        while cursor.fill() {}

        assert_eq!(contents(&cursor), data);
    }

    #[test]
    fn test_buffered_left_shift() {
        let data = b"0123456789abcdef0123456789abcdef".as_slice();
        let mut cursor = BufferedStreamCursor::with_capacity(16, data);

        assert!(cursor.fill());
        let first = contents(&cursor).to_vec();
        cursor.consume(first.len());

        assert!(cursor.fill());

        let mut seen = first;
        seen.extend_from_slice(contents(&cursor));
        cursor.consume(cursor.size());

        while cursor.fill() {
            seen.extend_from_slice(contents(&cursor));
            cursor.consume(cursor.size());
        }

        assert_eq!(seen, data);
    }

    #[test]
    fn test_margin_is_always_readable() {
        let data = b"a,b\nc,d\n".as_slice();
        let mut cursor = BufferedStreamCursor::with_capacity(2, data);

        loop {
            // The contract: 16 bytes past the last valid byte are readable.
            let window =
                unsafe { std::slice::from_raw_parts(cursor.buf(), cursor.size() + SPAN_MARGIN) };
            let _checksum: usize = window.iter().map(|&byte| byte as usize).sum();

            if !cursor.fill() {
                break;
            }
        }
    }
}
