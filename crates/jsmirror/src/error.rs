use jsmirror_wire::{ChannelError, WireError};
use thiserror::Error;

pub type MirrorResult<T> = Result<T, MirrorError>;

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("remote values are read-only")]
    ReadOnly,
    #[error("wire: {0}")]
    Wire(#[from] WireError),
    #[error("channel: {0}")]
    Channel(#[from] ChannelError),
    #[error("the VM has resumed since this frame was captured")]
    StaleSuspension,
    #[error("unknown call frame {0}")]
    UnknownFrame(u32),
}
