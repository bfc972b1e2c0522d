//! Zero-copy, SIMD-accelerated CSV row parsing for bulk ingestion.

mod cursor;
mod debug;
mod error;
mod reader;
mod row;
mod spanner;

pub use cursor::{BufferedStreamCursor, StreamCursor};
pub use error::{Error, Result};
pub use reader::{RowReader, RowReaderBuilder};
pub use row::{CellView, Cells, Row};
pub use spanner::{simd_instructions, CharClassSpanner};

#[cfg(unix)]
pub use cursor::MappedFileCursor;
