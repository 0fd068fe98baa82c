use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("jitter: default frame duration must be non-zero")]
    ErrInvalidFrameDuration,
    #[error("jitter: target buffer depth must be non-zero")]
    ErrZeroTargetBuffer,
    #[error("jitter: max buffer depth {max_ms}ms is below target depth {target_ms}ms")]
    ErrMaxBufferBelowTarget { target_ms: u128, max_ms: u128 },
    #[error("jitter: max buffer depth {max_ms}ms exceeds limit {limit_ms}ms")]
    ErrBufferTooLarge { max_ms: u128, limit_ms: u128 },
    #[error("jitter: stream id must not be empty")]
    ErrStreamIdEmpty,
    #[error("codec: failed to decode frame: {0}")]
    ErrDecode(String),
}
