/// Errors that can occur in channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ConnError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] edgelink_transport::TransportError),

    /// Wire-level encode/decode error.
    #[error("wire error: {0}")]
    Wire(#[from] edgelink_wire::WireError),

    /// Send attempted while the channel has no live socket.
    #[error("channel is not connected")]
    NotConnected,

    /// The channel is already running; a second open would race the first.
    #[error("channel is already open")]
    AlreadyOpen,
}

pub type Result<T> = std::result::Result<T, ConnError>;
