use elrpc_core::EncodeError;
use thiserror::Error;

/// Everything a `call` (or `query_methods`) can come back with. The
/// Display strings of the connection-state variants are part of the
/// observable surface and match the protocol's traditional wording.
#[derive(Debug, Clone, Error)]
pub enum EpcError {
    /// The peer is past `Opened`; nothing touched the transport.
    #[error("epc not connected")]
    NotConnected,

    /// The caller's cancellation token fired first.
    #[error("Canceled")]
    Canceled,

    /// The connection died while the call was in flight.
    #[error("unexpected peer's shutdown")]
    PeerShutdown,

    /// The remote side answered with `return-error` or `epc-error`.
    #[error("{0}")]
    Remote(String),

    /// The local transport write for this call failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The reply arrived but did not have the promised shape.
    #[error("invalid reply: {0}")]
    Protocol(String),

    /// An argument could not be serialized; no frame was sent.
    #[error(transparent)]
    Encode(#[from] EncodeError),
}
