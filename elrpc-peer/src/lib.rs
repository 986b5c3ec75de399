// EPC peer runtime: the session multiplexer and method dispatcher over
// a framed byte stream, plus the TCP acceptor/connector pair.
//
// The protocol is symmetric; the same `Peer` type serves inbound calls
// and issues outbound ones, whichever side of the connection it sits on.

mod dispatch;
pub mod error;
pub mod listener;
pub mod logging;
pub mod method;
pub mod peer;

pub use error::EpcError;
pub use listener::{connect, Listener};
pub use method::{HandlerError, Method, MethodDesc, MethodHandler};
pub use peer::{Peer, PeerState};

// Re-exported so callers do not need direct dependencies for the
// common surface.
pub use elrpc_core::{encode, CallArgs, ParamType, ToSexp, Value};
pub use tokio_util::sync::CancellationToken;
