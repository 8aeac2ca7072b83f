/// Error type shared by the settings store, the size cache, and the codec.
///
/// None of the public store operations return these directly; they are
/// handed to a [`crate::diagnostics::FailureObserver`] instead. The
/// `try_*` variants and the constructors that spawn threads do return them.
use std::io;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("i/o: {0}")]
    Io(#[from] io::Error),

    #[error("unknown value type tag {0:?}")]
    UnknownTypeTag(String),

    #[error("negative length {0}")]
    NegativeLength(i32),

    #[error("negative entry count {0}")]
    NegativeCount(i32),

    #[error("string is not valid utf-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// A 7-bit length prefix ran past five groups.
    #[error("string length prefix is malformed")]
    VarintTooLong,

    #[error("tick count {0} is outside the representable range")]
    TicksOutOfRange(i64),

    #[error("value {value} does not fit a {kind} on this platform")]
    ValueOutOfRange { kind: &'static str, value: i128 },

    #[error("failed to build sizing worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

impl StoreError {
    /// `true` for errors caused by malformed file contents rather than
    /// the filesystem refusing an operation.
    pub fn is_format_error(&self) -> bool {
        match self {
            Self::Io(err) => err.kind() == io::ErrorKind::UnexpectedEof,
            Self::UnknownTypeTag(_)
            | Self::NegativeLength(_)
            | Self::NegativeCount(_)
            | Self::InvalidUtf8(_)
            | Self::VarintTooLong
            | Self::TicksOutOfRange(_)
            | Self::ValueOutOfRange { .. } => true,
            Self::WorkerPool(_) => false,
        }
    }
}
