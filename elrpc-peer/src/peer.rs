// The peer: one transport, four workers. A strictly sequential receiver
// parses and dispatches inbound frames, a strictly sequential sender
// drains the bounded outbound queue, handler tasks run method bodies,
// and a supervisor owns the Opened -> Closing -> NotConnected lifecycle.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use elrpc_core::{next_uid, CallArgs, OutboundMessage, Uid, Value};
use elrpc_transport::EpcCodec;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot, watch, RwLock};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::dispatch;
use crate::error::EpcError;
use crate::method::{Method, MethodDesc};

/// Lifecycle of a peer. The transitions are one-way; once
/// `NotConnected` is reached every outstanding session has already been
/// resolved with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Opened,
    Closing,
    NotConnected,
}

pub(crate) type SessionResult = Result<Value, EpcError>;

/// One frame queued for the sender. `waiter` marks frames whose reply a
/// local session is blocked on, so a failed write can resolve it.
pub(crate) struct OutboundFrame {
    pub uid: Uid,
    pub waiter: bool,
    pub payload: Bytes,
}

type ExitHook = Box<dyn FnOnce() + Send + 'static>;

enum UserEvent {
    Stop { ack: oneshot::Sender<()> },
    AddExitHook(ExitHook),
}

const OUTBOUND_QUEUE_DEPTH: usize = 20;

pub(crate) struct PeerShared {
    pub(crate) name: String,
    pub(crate) methods: DashMap<String, Method>,
    sessions: RwLock<HashMap<Uid, oneshot::Sender<SessionResult>>>,
    pub(crate) outbound_tx: mpsc::Sender<OutboundFrame>,
    state_tx: watch::Sender<PeerState>,
}

impl PeerShared {
    pub(crate) fn state(&self) -> PeerState {
        *self.state_tx.borrow()
    }

    pub(crate) async fn register_session(&self, uid: Uid, tx: oneshot::Sender<SessionResult>) {
        self.sessions.write().await.insert(uid, tx);
    }

    pub(crate) async fn take_session(&self, uid: Uid) -> Option<oneshot::Sender<SessionResult>> {
        self.sessions.write().await.remove(&uid)
    }

    pub(crate) async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Deliver a result to the session waiting on `uid`. A missing
    /// session is normal after a cancel; the result is discarded.
    pub(crate) async fn resolve_session(&self, uid: Uid, result: SessionResult) {
        match self.take_session(uid).await {
            Some(tx) => {
                let _ = tx.send(result);
            }
            None => {
                debug!(peer = %self.name, %uid, "not found a session for uid={}, reply discarded", uid);
            }
        }
    }

    async fn cleanup_sessions(&self) {
        let drained: Vec<_> = self.sessions.write().await.drain().collect();
        if !drained.is_empty() {
            debug!(peer = %self.name, count = drained.len(), "resolving abandoned sessions");
        }
        for (_, tx) in drained {
            let _ = tx.send(Err(EpcError::PeerShutdown));
        }
    }
}

/// A symmetric EPC endpoint. The same peer serves inbound calls from its
/// method registry and issues outbound calls; cloning is cheap and every
/// clone drives the same connection.
#[derive(Clone)]
pub struct Peer {
    shared: Arc<PeerShared>,
    user_tx: mpsc::Sender<UserEvent>,
    state_rx: watch::Receiver<PeerState>,
}

impl Peer {
    /// Attach a peer to a byte stream and start its workers. Must be
    /// called from within a tokio runtime.
    pub fn start<S>(name: impl Into<String>, stream: S, methods: Vec<Method>) -> Peer
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let name = name.into();
        let (read_half, write_half) = tokio::io::split(stream);

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        let (user_tx, user_rx) = mpsc::channel(8);
        let (state_tx, state_rx) = watch::channel(PeerState::Opened);

        let shared = Arc::new(PeerShared {
            name: name.clone(),
            methods: DashMap::new(),
            sessions: RwLock::new(HashMap::new()),
            outbound_tx,
            state_tx,
        });
        for m in methods {
            shared.methods.insert(m.name().to_string(), m);
        }

        let shutdown = CancellationToken::new();
        let (recv_done_tx, recv_done_rx) = oneshot::channel();
        let (send_done_tx, send_done_rx) = oneshot::channel();

        tokio::spawn(receiver_worker(
            Arc::clone(&shared),
            FramedRead::new(read_half, EpcCodec::new()),
            shutdown.clone(),
            recv_done_tx,
        ));
        tokio::spawn(sender_worker(
            Arc::clone(&shared),
            FramedWrite::new(write_half, EpcCodec::new()),
            outbound_rx,
            shutdown.clone(),
            send_done_tx,
        ));
        tokio::spawn(supervisor_worker(
            Arc::clone(&shared),
            user_rx,
            recv_done_rx,
            send_done_rx,
            shutdown,
        ));

        debug!(peer = %name, "peer started");
        Peer {
            shared,
            user_tx,
            state_rx,
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn state(&self) -> PeerState {
        self.shared.state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == PeerState::Opened
    }

    /// Register a method. Registration by an already-used name replaces
    /// the previous entry; register before traffic starts flowing.
    pub fn register_method(&self, method: Method) {
        self.shared
            .methods
            .insert(method.name().to_string(), method);
    }

    /// Number of outbound calls still waiting for a reply.
    pub async fn waiting_session_count(&self) -> usize {
        self.shared.session_count().await
    }

    /// Invoke `name` on the remote peer and wait for its reply.
    ///
    /// Arguments are serialized before anything is queued, so a value
    /// with no S-expression form fails here without a frame being sent.
    pub async fn call<A: CallArgs>(&self, name: &str, args: A) -> Result<Value, EpcError> {
        if !self.is_running() {
            return Err(EpcError::NotConnected);
        }
        let args_text = args.encode_args()?;
        let uid = next_uid();
        let msg = OutboundMessage::Call {
            uid,
            method: name.to_string(),
            args: args_text,
        };
        self.roundtrip(uid, msg).await
    }

    /// As [`Peer::call`], racing the reply against a cancellation token.
    /// On cancellation the session is dropped immediately, a best-effort
    /// `cancel` frame goes to the peer, and the call returns `Canceled`;
    /// a reply that arrives late is discarded.
    pub async fn call_with_cancel<A: CallArgs>(
        &self,
        cancel: &CancellationToken,
        name: &str,
        args: A,
    ) -> Result<Value, EpcError> {
        if !self.is_running() {
            return Err(EpcError::NotConnected);
        }
        let args_text = args.encode_args()?;
        let uid = next_uid();
        let msg = OutboundMessage::Call {
            uid,
            method: name.to_string(),
            args: args_text,
        };

        let (tx, rx) = oneshot::channel();
        self.shared.register_session(uid, tx).await;
        if let Err(e) = self.enqueue(msg).await {
            self.shared.take_session(uid).await;
            return Err(e);
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                self.shared.take_session(uid).await;
                let _ = self.enqueue(OutboundMessage::Cancel { uid }).await;
                debug!(peer = %self.shared.name, %uid, "call canceled by caller");
                Err(EpcError::Canceled)
            }
            reply = rx => match reply {
                Ok(result) => result,
                Err(_) => Err(EpcError::PeerShutdown),
            }
        }
    }

    /// Ask the remote peer for its method table.
    pub async fn query_methods(&self) -> Result<Vec<MethodDesc>, EpcError> {
        if !self.is_running() {
            return Err(EpcError::NotConnected);
        }
        let uid = next_uid();
        let value = self.roundtrip(uid, OutboundMessage::Methods { uid }).await?;
        parse_method_descs(value)
    }

    /// Graceful shutdown: close the transport and let the workers wind
    /// down. Stopping a peer that is already closing is a no-op.
    pub async fn stop(&self) {
        if !self.is_running() {
            return;
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .user_tx
            .send(UserEvent::Stop { ack: ack_tx })
            .await
            .is_ok()
        {
            let _ = ack_rx.await;
        }
    }

    /// Block until the peer reaches `NotConnected`.
    pub async fn wait(&self) {
        let mut rx = self.state_rx.clone();
        let _ = rx.wait_for(|s| *s == PeerState::NotConnected).await;
    }

    /// Append a hook run exactly once when the peer reaches
    /// `NotConnected`. Hooks run in registration order; one panicking
    /// does not stop the rest.
    pub fn add_exit_hook(&self, f: impl FnOnce() + Send + 'static) {
        let hook: ExitHook = Box::new(f);
        match self.user_tx.try_send(UserEvent::AddExitHook(hook)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(ev)) => {
                let tx = self.user_tx.clone();
                tokio::spawn(async move {
                    if let Err(mpsc::error::TrySendError::Closed(ev)) =
                        tx.try_send(ev)
                    {
                        run_orphan_hook(ev);
                    }
                });
            }
            Err(mpsc::error::TrySendError::Closed(ev)) => run_orphan_hook(ev),
        }
    }

    async fn roundtrip(&self, uid: Uid, msg: OutboundMessage) -> Result<Value, EpcError> {
        let (tx, rx) = oneshot::channel();
        self.shared.register_session(uid, tx).await;
        if let Err(e) = self.enqueue(msg).await {
            self.shared.take_session(uid).await;
            return Err(e);
        }
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(EpcError::PeerShutdown),
        }
    }

    async fn enqueue(&self, msg: OutboundMessage) -> Result<(), EpcError> {
        let uid = msg.uid();
        let waiter = msg.has_local_waiter();
        let payload = msg.to_payload()?;
        self.shared
            .outbound_tx
            .send(OutboundFrame {
                uid,
                waiter,
                payload: Bytes::from(payload.into_bytes()),
            })
            .await
            .map_err(|_| EpcError::NotConnected)
    }
}

// The peer is already gone; the exit hooks have run, so a hook arriving
// now runs immediately to keep the exactly-once promise.
fn run_orphan_hook(ev: UserEvent) {
    match ev {
        UserEvent::AddExitHook(f) => f(),
        UserEvent::Stop { ack } => {
            let _ = ack.send(());
        }
    }
}

fn parse_method_descs(value: Value) -> Result<Vec<MethodDesc>, EpcError> {
    let entries = match value {
        Value::Nil => return Ok(Vec::new()),
        Value::List(entries) => entries,
        other => {
            return Err(EpcError::Protocol(format!(
                "invalid method query result: {}",
                other
            )))
        }
    };
    let mut descs = Vec::with_capacity(entries.len());
    for entry in entries {
        let fields = entry
            .into_list()
            .ok_or_else(|| EpcError::Protocol("method entry is not a list".to_string()))?;
        let mut strings = fields.into_iter().map(|f| match f {
            Value::String(s) => s,
            Value::Nil => String::new(),
            other => other.to_string(),
        });
        let name = strings
            .next()
            .ok_or_else(|| EpcError::Protocol("method entry is empty".to_string()))?;
        descs.push(MethodDesc {
            name,
            argdoc: strings.next().unwrap_or_default(),
            docstring: strings.next().unwrap_or_default(),
        });
    }
    Ok(descs)
}

async fn receiver_worker<S>(
    shared: Arc<PeerShared>,
    mut framed: FramedRead<ReadHalf<S>, EpcCodec>,
    shutdown: CancellationToken,
    done: oneshot::Sender<()>,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!(peer = %shared.name, "receiver: shutdown requested");
                break;
            }
            frame = framed.next() => match frame {
                Some(Ok(payload)) => {
                    if let Err(e) = dispatch::handle_frame(&shared, payload).await {
                        warn!(peer = %shared.name, error = %e, "receiver: fatal frame error");
                        break;
                    }
                }
                Some(Err(e)) => {
                    debug!(peer = %shared.name, error = %e, "receiver: read error");
                    break;
                }
                None => {
                    debug!(peer = %shared.name, "receiver: peer closed the connection");
                    break;
                }
            }
        }
    }
    let _ = done.send(());
}

async fn sender_worker<S>(
    shared: Arc<PeerShared>,
    mut framed: FramedWrite<WriteHalf<S>, EpcCodec>,
    mut outbound_rx: mpsc::Receiver<OutboundFrame>,
    shutdown: CancellationToken,
    done: oneshot::Sender<()>,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!(peer = %shared.name, "sender: shutdown requested");
                break;
            }
            frame = outbound_rx.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = framed.send(frame.payload).await {
                        warn!(peer = %shared.name, uid = %frame.uid, error = %e, "sender: write failed");
                        if frame.waiter {
                            shared
                                .resolve_session(frame.uid, Err(EpcError::Transport(e.to_string())))
                                .await;
                        }
                        // the peer stays up; later writes may succeed
                    }
                }
                None => break,
            }
        }
    }
    let _ = framed.flush().await;
    let mut transport = framed.into_inner();
    let _ = transport.shutdown().await;
    let _ = done.send(());
}

async fn supervisor_worker(
    shared: Arc<PeerShared>,
    mut user_rx: mpsc::Receiver<UserEvent>,
    recv_done: oneshot::Receiver<()>,
    send_done: oneshot::Receiver<()>,
    shutdown: CancellationToken,
) {
    let mut hooks: Vec<ExitHook> = Vec::new();
    let mut receiver_alive = true;
    let mut sender_alive = true;
    let mut user_open = true;
    tokio::pin!(recv_done);
    tokio::pin!(send_done);

    let begin_closing = |why: &str| {
        if shared.state() == PeerState::Opened {
            debug!(peer = %shared.name, "closing: {}", why);
            shared.state_tx.send_replace(PeerState::Closing);
            shutdown.cancel();
        }
    };

    loop {
        tokio::select! {
            ev = user_rx.recv(), if user_open => match ev {
                Some(UserEvent::Stop { ack }) => {
                    begin_closing("stop requested");
                    let _ = ack.send(());
                }
                Some(UserEvent::AddExitHook(f)) => hooks.push(f),
                None => user_open = false,
            },
            _ = &mut recv_done, if receiver_alive => {
                receiver_alive = false;
                begin_closing("receiver exited");
            }
            _ = &mut send_done, if sender_alive => {
                sender_alive = false;
            }
        }
        if !receiver_alive && !sender_alive {
            break;
        }
    }

    // late events: keep the Stop acknowledgement and hook promises
    user_rx.close();
    while let Some(ev) = user_rx.recv().await {
        match ev {
            UserEvent::Stop { ack } => {
                let _ = ack.send(());
            }
            UserEvent::AddExitHook(f) => hooks.push(f),
        }
    }

    shared.finish_shutdown(hooks).await;
}

impl PeerShared {
    async fn finish_shutdown(&self, hooks: Vec<ExitHook>) {
        self.cleanup_sessions().await;
        for hook in hooks {
            if std::panic::catch_unwind(std::panic::AssertUnwindSafe(hook)).is_err() {
                error!(peer = %self.name, "exit hook panicked");
            }
        }
        self.state_tx.send_replace(PeerState::NotConnected);
        debug!(peer = %self.name, "peer not connected");
    }
}
