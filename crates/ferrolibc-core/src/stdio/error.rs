//! Stream error taxonomy.

use thiserror::Error;

use crate::errno;

/// Failure of a stream operation.
///
/// Every variant maps to the errno value the C surface reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StdioError {
    #[error("stream not open for reading")]
    NotReadable,
    #[error("stream not open for writing")]
    NotWritable,
    #[error("stream is closed")]
    Closed,
    #[error("stream orientation is fixed to the other kind")]
    Orientation,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("stream is not seekable")]
    NotSeekable,
    #[error("cannot allocate memory")]
    NoMemory,
    #[error("invalid or incomplete multibyte or wide character")]
    IllegalSequence,
    #[error("pushback capacity exhausted")]
    PushbackFull,
    #[error("value too large for defined data type")]
    Overflow,
    #[error("I/O error (errno {0})")]
    Io(i32),
}

impl StdioError {
    /// Classify a raw errno from the backend.
    pub fn from_errno(err: i32) -> Self {
        match err {
            errno::ESPIPE => Self::NotSeekable,
            errno::EINVAL => Self::InvalidArgument,
            errno::ENOMEM => Self::NoMemory,
            errno::EILSEQ => Self::IllegalSequence,
            errno::EOVERFLOW => Self::Overflow,
            other => Self::Io(other),
        }
    }

    /// errno value reported to C callers.
    pub fn errno(&self) -> i32 {
        match self {
            Self::NotReadable | Self::NotWritable | Self::Closed => errno::EBADF,
            Self::Orientation | Self::InvalidArgument | Self::PushbackFull => errno::EINVAL,
            Self::NotSeekable => errno::ESPIPE,
            Self::NoMemory => errno::ENOMEM,
            Self::IllegalSequence => errno::EILSEQ,
            Self::Overflow => errno::EOVERFLOW,
            Self::Io(e) => *e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping_round_trips_for_classified_values() {
        for e in [errno::ESPIPE, errno::EINVAL, errno::ENOMEM, errno::EILSEQ, errno::EIO] {
            assert_eq!(StdioError::from_errno(e).errno(), e);
        }
        assert_eq!(StdioError::NotWritable.errno(), errno::EBADF);
        assert_eq!(StdioError::Io(errno::EPIPE).to_string(), "I/O error (errno 32)");
    }
}
