//! Multicast broadcasting: one upstream source, many sinks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{mpsc, Mutex};

use crate::deferred::Deferred;
use crate::protocol::{self, Emit, SessionHandle, Token};
use crate::runtime::Runtime;
use crate::traits::{Sink, Source};

enum HubMsg<T> {
    /// Token from the upstream source session
    Up(Token<T>),
    /// Flow-control token from subscriber `id`
    Sub(u64, Token<T>),
    /// Tear everything down
    Stop,
}

type SubscriberMap<T> = Arc<Mutex<HashMap<u64, mpsc::UnboundedSender<Token<T>>>>>;

type PendingUpstream<T> = StdMutex<Option<(Box<dyn Source<Item = T>>, UpstreamMailbox<T>)>>;

type UpstreamMailbox<T> = mpsc::UnboundedReceiver<Token<T>>;

struct HubShared<T> {
    relay_tx: mpsc::UnboundedSender<HubMsg<T>>,
    up_tx: mpsc::UnboundedSender<Token<T>>,
    pending: PendingUpstream<T>,
    subscribers: SubscriberMap<T>,
    next_id: AtomicU64,
    runtime: Runtime,
}

/// Broadcasts one upstream source to many dynamically attached sinks.
///
/// Each attached sink runs its own session; a sink leaving (by finishing or
/// failing) does not affect the upstream or the other sinks, except that a
/// departure arriving when no subscribers remain releases the upstream and
/// shuts the hub down.
///
/// Pacing is at-least-once-pace: the upstream advances on the first
/// readiness signal to arrive from any subscriber, so a slow subscriber
/// does not slow the others and gets no per-subscriber backpressure —
/// tokens queue in its mailbox instead.
pub struct Hub<T: Clone + Send + 'static> {
    shared: Arc<HubShared<T>>,
}

impl<T: Clone + Send + 'static> Clone for Hub<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Hub<T> {
    /// Create a hub over `source` without starting it; call
    /// [`broadcast`](Hub::broadcast) to begin pulling.
    pub fn new<S>(source: S, runtime: &Runtime) -> Self
    where
        S: Source<Item = T> + 'static,
    {
        let (relay_tx, relay_rx) = mpsc::unbounded_channel();
        let (up_tx, up_rx) = mpsc::unbounded_channel();
        let subscribers: SubscriberMap<T> = Arc::new(Mutex::new(HashMap::new()));

        runtime.spawn(relay_loop(relay_rx, subscribers.clone(), up_tx.clone()));

        Self {
            shared: Arc::new(HubShared {
                relay_tx,
                up_tx,
                pending: StdMutex::new(Some((Box::new(source), up_rx))),
                subscribers,
                next_id: AtomicU64::new(0),
                runtime: runtime.clone(),
            }),
        }
    }

    /// Create a hub and start broadcasting immediately
    pub fn started<S>(source: S, runtime: &Runtime) -> Self
    where
        S: Source<Item = T> + 'static,
    {
        let hub = Self::new(source, runtime);
        hub.broadcast();
        hub
    }

    /// Start pulling from the upstream source. Idempotent: calling it while
    /// already started is a no-op.
    pub fn broadcast(&self) {
        let taken = self.shared.pending.lock().unwrap().take();
        if let Some((mut source, up_rx)) = taken {
            source.on_attach(SessionHandle::for_mailbox(
                self.shared.runtime.clone(),
                self.shared.up_tx.clone(),
            ));
            let relay = self.shared.relay_tx.clone();
            let emit: Emit<T> = Arc::new(move |token| {
                let _ = relay.send(HubMsg::Up(token));
            });
            self.shared
                .runtime
                .spawn(protocol::run_source(source, up_rx, emit));
            let _ = self.shared.up_tx.send(Token::Run);
        }
    }

    /// Attach a sink. Returns its deferred result; the sink starts
    /// receiving whatever the upstream emits from now on.
    pub async fn add<K>(&self, sink: K) -> Deferred<K::Output>
    where
        K: Sink<Item = T> + 'static,
    {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let deferred = Deferred::new();

        let relay = self.shared.relay_tx.clone();
        let reply: Emit<T> = Arc::new(move |token| {
            let _ = relay.send(HubMsg::Sub(id, token));
        });
        self.shared
            .runtime
            .spawn(protocol::run_sink(sink, rx, reply, deferred.clone()));

        self.shared.subscribers.lock().await.insert(id, tx);
        deferred
    }

    /// Tear down every subscriber session and the upstream session.
    /// Idempotent.
    pub fn stop(&self) {
        let _ = self.shared.relay_tx.send(HubMsg::Stop);
    }
}

async fn relay_loop<T: Clone + Send + 'static>(
    mut mailbox: mpsc::UnboundedReceiver<HubMsg<T>>,
    subscribers: SubscriberMap<T>,
    up_tx: mpsc::UnboundedSender<Token<T>>,
) {
    while let Some(msg) = mailbox.recv().await {
        match msg {
            HubMsg::Up(token) => match token {
                Token::Elem(item) => {
                    let subs = subscribers.lock().await;
                    for tx in subs.values() {
                        let _ = tx.send(Token::Elem(item.clone()));
                    }
                }
                Token::Eof => {
                    let subs = subscribers.lock().await;
                    for tx in subs.values() {
                        let _ = tx.send(Token::Eof);
                    }
                }
                Token::Empty => {
                    let subs = subscribers.lock().await;
                    for tx in subs.values() {
                        let _ = tx.send(Token::Empty);
                    }
                }
                Token::Error(error) => {
                    tracing::error!(%error, "hub upstream failed, shutting down");
                    let mut subs = subscribers.lock().await;
                    for tx in subs.values() {
                        let _ = tx.send(Token::Error(error.clone()));
                    }
                    subs.clear();
                    break;
                }
                other => {
                    tracing::debug!(token = other.kind(), "illegal upstream token at hub relay");
                }
            },
            HubMsg::Sub(id, token) => match token {
                // the first subscriber ready for more advances the upstream
                Token::Cont => {
                    let _ = up_tx.send(Token::Cont);
                }
                departure @ (Token::Done | Token::Error(_)) => {
                    let mut subs = subscribers.lock().await;
                    if subs.is_empty() {
                        // no subscribers left to serve: release the upstream
                        let _ = up_tx.send(departure);
                        break;
                    }
                    subs.remove(&id);
                }
                other => {
                    tracing::debug!(token = other.kind(), "illegal subscriber token at hub relay");
                }
            },
            HubMsg::Stop => {
                // dropping the senders closes every subscriber mailbox
                subscribers.lock().await.clear();
                let _ = up_tx.send(Token::Done);
                break;
            }
        }
    }
    tracing::trace!("hub relay terminated");
}
