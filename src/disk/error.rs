use std::io;

use thiserror::Error;

/// Errors that can be returned from disk image operations.  These are
/// generally converted into `io::Error`.
///
/// Most format-level misses (an unknown file size, an out-of-range block, a
/// corrupt chain) are expected when browsing old disk images and are reported
/// as `None` by the block and directory accessors instead.  `DiskError` is
/// reserved for the I/O seams: opening and saving images.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DiskError {
    /// Bad track or sector
    #[error("bad track or sector")]
    InvalidLocation,
    /// The image size does not match any known geometry
    #[error("invalid layout")]
    InvalidLayout,
    /// Neither a GCR signature nor a known sector image size
    #[error("unknown format")]
    UnknownFormat,
    /// Chain loop detected
    #[error("chain loop detected")]
    ChainLoop,
    /// Block writes must be exactly one block long
    #[error("block data must be exactly 256 bytes")]
    WriteSize,
}

impl From<DiskError> for io::Error {
    fn from(error: DiskError) -> io::Error {
        use self::DiskError::*;
        use std::io::ErrorKind::*;
        let kind = match error {
            InvalidLocation => InvalidInput,
            InvalidLayout => InvalidData,
            UnknownFormat => InvalidData,
            ChainLoop => InvalidData,
            WriteSize => InvalidInput,
        };
        io::Error::new(kind, error)
    }
}

impl DiskError {
    /// If the provided `io::Error` contains a `DiskError`, return the
    /// underlying `DiskError`.  If not, return None.
    pub fn from_io_error(error: &io::Error) -> Option<DiskError> {
        error
            .get_ref()
            .and_then(|e| e.downcast_ref::<DiskError>())
            .cloned()
    }

    /// This is sometimes useful instead of .into() when the compiler doesn't
    /// have enough information to perform type inference.
    pub fn to_io_error(&self) -> io::Error {
        self.clone().into()
    }
}

impl PartialEq<io::Error> for DiskError {
    fn eq(&self, other: &io::Error) -> bool {
        DiskError::from_io_error(other).as_ref() == Some(self)
    }
}

impl PartialEq<DiskError> for io::Error {
    fn eq(&self, other: &DiskError) -> bool {
        DiskError::from_io_error(self).as_ref() == Some(other)
    }
}
