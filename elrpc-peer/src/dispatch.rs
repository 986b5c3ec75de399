// Inbound frame dispatch. The receiver worker feeds every decoded
// payload through here; anything that comes back as an error is fatal
// and closes the peer. Per-call trouble (unknown method, bad arguments,
// handler failure) is answered with an error frame instead.

use std::sync::Arc;

use bytes::Bytes;
use elrpc_core::{
    coerce, decode1, CoerceError, IncomingMessage, MessageError, OutboundMessage, ParseError, Uid,
    Value,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::EpcError;
use crate::method::Method;
use crate::peer::{OutboundFrame, PeerShared};

/// Conditions that kill the peer: a payload that is not valid text, not
/// parseable, or whose header is malformed.
#[derive(Debug, Error)]
pub(crate) enum ReceiveError {
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Message(#[from] MessageError),
}

/// Per-call failures answered with an `epc-error` frame.
#[derive(Debug, Error)]
enum DispatchError {
    #[error("method not found: name={0}")]
    MethodNotFound(String),
    #[error("different argument length: expected {expected}, but received {received}")]
    ArityMismatch { expected: usize, received: usize },
    #[error(transparent)]
    Convert(#[from] CoerceError),
}

pub(crate) async fn handle_frame(
    shared: &Arc<PeerShared>,
    payload: Bytes,
) -> Result<(), ReceiveError> {
    let text = std::str::from_utf8(&payload)?;
    debug!(peer = %shared.name, frame = text, "received");
    let value = decode1(text)?;
    let message = IncomingMessage::parse(value)?;

    match message {
        IncomingMessage::Call { uid, name, args } => {
            handle_call(shared, uid, name, args).await;
        }
        IncomingMessage::Invalid { uid, detail } => {
            send_epc_error(shared, uid, detail).await;
        }
        IncomingMessage::Return { uid, value } => {
            shared.resolve_session(uid, Ok(value)).await;
        }
        IncomingMessage::ReturnError { uid, value } => {
            shared
                .resolve_session(uid, Err(EpcError::Remote(value.into_message())))
                .await;
        }
        IncomingMessage::EpcError { uid, value } => {
            shared
                .resolve_session(uid, Err(EpcError::Remote(value.into_message())))
                .await;
        }
        IncomingMessage::Methods { uid } => {
            handle_methods(shared, uid).await;
        }
        IncomingMessage::Cancel { uid } => {
            // advisory only: the running handler is left alone and its
            // eventual reply resolves no session
            debug!(peer = %shared.name, %uid, "cancel received for uid={}", uid);
        }
        IncomingMessage::Unknown { kind, uid } => {
            warn!(peer = %shared.name, kind, %uid, "unknown message kind, skipped");
        }
    }
    Ok(())
}

async fn handle_call(shared: &Arc<PeerShared>, uid: Uid, name: String, args: Vec<Value>) {
    let method = match shared.methods.get(&name) {
        Some(entry) => entry.value().clone(),
        None => {
            send_dispatch_error(shared, uid, DispatchError::MethodNotFound(name)).await;
            return;
        }
    };

    if args.len() != method.arity() {
        send_dispatch_error(
            shared,
            uid,
            DispatchError::ArityMismatch {
                expected: method.arity(),
                received: args.len(),
            },
        )
        .await;
        return;
    }

    let mut coerced = Vec::with_capacity(args.len());
    for (arg, ty) in args.into_iter().zip(method.params()) {
        match coerce(arg, ty) {
            Ok(v) => coerced.push(v),
            Err(e) => {
                send_dispatch_error(shared, uid, DispatchError::Convert(e)).await;
                return;
            }
        }
    }

    debug!(peer = %shared.name, %uid, method = name, "invoking");
    let shared = Arc::clone(shared);
    tokio::spawn(run_handler(shared, uid, name, method, coerced));
}

// Each call gets its own task so a slow handler never stalls the
// dispatch loop. The body runs on a further task so that a panic is
// contained by the join handle and becomes a return-error frame.
async fn run_handler(
    shared: Arc<PeerShared>,
    uid: Uid,
    name: String,
    method: Method,
    args: Vec<Value>,
) {
    let handler = method.handler();
    let joined = tokio::spawn(async move { handler.invoke(args).await }).await;

    let message = match joined {
        Ok(Ok(value)) => OutboundMessage::Return { uid, value },
        Ok(Err(e)) => {
            debug!(peer = %shared.name, %uid, method = name, error = %e, "handler failed");
            OutboundMessage::ReturnError {
                uid,
                message: format!("Rust error: {}", e),
            }
        }
        Err(join_err) => {
            let reason = if join_err.is_panic() {
                panic_message(join_err.into_panic())
            } else {
                "handler task canceled".to_string()
            };
            debug!(peer = %shared.name, %uid, method = name, reason, "handler panicked");
            OutboundMessage::ReturnError {
                uid,
                message: format!("Rust error: {}", reason),
            }
        }
    };
    enqueue_message(&shared, message).await;
}

async fn handle_methods(shared: &Arc<PeerShared>, uid: Uid) {
    let entries: Vec<Value> = shared
        .methods
        .iter()
        .map(|m| {
            Value::List(vec![
                Value::String(m.name().to_string()),
                Value::String(m.argdoc().to_string()),
                Value::String(m.docstring().to_string()),
            ])
        })
        .collect();
    debug!(peer = %shared.name, %uid, count = entries.len(), "methods query");
    enqueue_message(
        shared,
        OutboundMessage::Return {
            uid,
            value: Value::List(entries),
        },
    )
    .await;
}

async fn send_dispatch_error(shared: &Arc<PeerShared>, uid: Uid, err: DispatchError) {
    debug!(peer = %shared.name, %uid, error = %err, "dispatch failed");
    send_epc_error(shared, uid, err.to_string()).await;
}

async fn send_epc_error(shared: &Arc<PeerShared>, uid: Uid, detail: String) {
    enqueue_message(
        shared,
        OutboundMessage::EpcError {
            uid,
            message: format!("epc error: {}", detail),
        },
    )
    .await;
}

/// Render and queue an outbound frame. A reply value that fails to
/// encode is downgraded to an `epc-error` frame for the same uid.
pub(crate) async fn enqueue_message(shared: &PeerShared, message: OutboundMessage) {
    let uid = message.uid();
    let waiter = message.has_local_waiter();
    let payload = match message.to_payload() {
        Ok(p) => p,
        Err(e) => {
            warn!(peer = %shared.name, %uid, error = %e, "reply failed to encode");
            let fallback = OutboundMessage::EpcError {
                uid,
                message: format!("epc error: {}", e),
            };
            match fallback.to_payload() {
                Ok(p) => p,
                Err(_) => return,
            }
        }
    };
    if shared
        .outbound_tx
        .send(OutboundFrame {
            uid,
            waiter,
            payload: Bytes::from(payload.into_bytes()),
        })
        .await
        .is_err()
    {
        debug!(peer = %shared.name, %uid, "outbound queue closed, frame dropped");
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
