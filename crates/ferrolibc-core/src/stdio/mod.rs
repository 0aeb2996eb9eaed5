//! Standard I/O operations.
//!
//! Implements `<stdio.h>` and the stream half of `<wchar.h>`: buffered
//! streams, formatted output, formatted input and the process-wide stream
//! table.

pub mod backend;
pub mod buffer;
pub mod error;
pub mod file;
pub mod float_fmt;
pub mod printf;
pub mod registry;
pub mod scanf;
pub mod wide;

pub use backend::{RawIo, Region, Whence};
pub use buffer::{BUFSIZ, BufMode};
pub use error::StdioError;
pub use file::{OpenFlags, Orientation, StdioStream, StreamPos, UNGET_SLOTS, parse_mode};
pub use printf::{FormatArg, PrintfError, fprintf, fwprintf, snprintf, sprintf, swprintf};
pub use registry::{STDERR_ID, STDIN_ID, STDOUT_ID, StreamHandle, StreamId, StreamRegistry, registry};
pub use scanf::{ScanArg, ScanError, fscanf, fwscanf, sscanf, swscanf};
