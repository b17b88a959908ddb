/// Errors surfaced by the client facade.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Channel-layer error.
    #[error("channel error: {0}")]
    Conn(#[from] edgelink_conn::ConnError),

    /// Transport-layer error.
    #[error("transport error: {0}")]
    Transport(#[from] edgelink_transport::TransportError),

    /// HTTP transport failure on the REST surface.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The gateway rejected a REST request.
    #[error("gateway rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// JSON (de)serialization error on the REST surface.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A client cannot be created without a caller identity.
    #[error("missing caller identity: {0}")]
    MissingIdentity(&'static str),
}

pub type Result<T> = std::result::Result<T, ClientError>;
