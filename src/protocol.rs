//! The backpressure token protocol.
//!
//! Every drive of a source wires up a session: one task per side (source,
//! optional transform hop, sink), each owning a private mailbox processed
//! one token at a time. Tokens are the only cross-task communication, which
//! is what gives the protocol its ordering guarantee: per session, at most
//! one `Elem`/`Empty`/`Eof` is in flight awaiting the next `Cont`, so a
//! session buffers O(1) elements no matter how fast the source is.
//!
//! Who may send what:
//!
//! - driver → source: `Run` (once, session start)
//! - sink/hop → source: `Cont` (request next), `Done` (release), `Error`
//! - source → sink/hop: `Elem`, `Empty`, `Eof`, `Error`
//!
//! A side that receives a token not legal for its role logs it at debug
//! level and drops it.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::deferred::Deferred;
use crate::error::Error;
use crate::runtime::Runtime;
use crate::traits::{Sink, Source};
use crate::transform::Pipe;

/// A protocol token exchanged between the two sides of a session.
#[derive(Debug, Clone)]
pub enum Token<T> {
    /// One element of the stream
    Elem(T),
    /// The source is exhausted; no more elements will follow
    Eof,
    /// Nothing available this turn; not end-of-stream
    Empty,
    /// A failure; tears down every hop it passes through
    Error(Error),
    /// Session start, sent once to the source side
    Run,
    /// The sink is ready for the next element
    Cont,
    /// The sink is finished; the source must release its resources
    Done,
}

impl<T> Token<T> {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Token::Elem(_) => "elem",
            Token::Eof => "eof",
            Token::Empty => "empty",
            Token::Error(_) => "error",
            Token::Run => "run",
            Token::Cont => "cont",
            Token::Done => "done",
        }
    }
}

/// What a sink wants after handling an element.
pub enum Step<O> {
    /// Request the next element
    Cont,
    /// Finish early with a result; the source is released
    Done(O),
    /// Signal a processing failure upstream and terminate
    Fail(Error),
}

/// A sending edge of a session. Closures rather than raw senders so the
/// same task loops serve plain sessions, interleave relays and hub relays.
pub(crate) type Emit<T> = Arc<dyn Fn(Token<T>) + Send + Sync>;

pub(crate) fn emit_to<T: Send + 'static>(tx: mpsc::UnboundedSender<Token<T>>) -> Emit<T> {
    Arc::new(move |token| {
        // the receiving task may already have terminated; that is normal
        // during teardown
        let _ = tx.send(token);
    })
}

/// Handle onto a live session, passed to the source's `on_attach` hook.
///
/// Push-style sources keep it to nudge the session when new data arrives;
/// timer sources use the runtime to start their schedule. The handle only
/// carries flow-control signals, so composite sources can forward it to a
/// differently-typed upstream unchanged.
#[derive(Clone)]
pub struct SessionHandle {
    resume: Arc<dyn Fn() + Send + Sync>,
    cancel: Arc<dyn Fn() + Send + Sync>,
    runtime: Runtime,
}

impl SessionHandle {
    pub(crate) fn for_mailbox<T: Send + 'static>(
        runtime: Runtime,
        to_source: mpsc::UnboundedSender<Token<T>>,
    ) -> Self {
        let resume_tx = to_source.clone();
        Self {
            resume: Arc::new(move || {
                let _ = resume_tx.send(Token::Cont);
            }),
            cancel: Arc::new(move || {
                let _ = to_source.send(Token::Done);
            }),
            runtime,
        }
    }

    /// Ask the source side for another turn, as if the sink had sent
    /// `Cont`. This is how externally-fed sources wake an idle session.
    pub fn resume(&self) {
        (self.resume)()
    }

    /// Release the source side early, as if the sink had sent `Done`.
    pub fn cancel(&self) {
        (self.cancel)()
    }

    /// The runtime this session runs on
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }
}

/// Source-side session loop: answer `Run`/`Cont` with one element per turn,
/// terminate on `Done`/`Error`, release the source when the loop ends.
pub(crate) async fn run_source<S>(
    mut source: S,
    mut mailbox: mpsc::UnboundedReceiver<Token<S::Item>>,
    downstream: Emit<S::Item>,
) where
    S: Source + 'static,
{
    while let Some(token) = mailbox.recv().await {
        match token {
            Token::Run | Token::Cont => {
                if !source.has_next() {
                    downstream(Token::Eof);
                } else {
                    match source.next().await {
                        Ok(Some(item)) => downstream(Token::Elem(item)),
                        // a source that became exhausted during the turn
                        // gets its end-of-stream out now; an `Empty` here
                        // would stall a session nobody is going to wake
                        Ok(None) if !source.has_next() => downstream(Token::Eof),
                        Ok(None) => downstream(Token::Empty),
                        Err(error) => {
                            tracing::error!(%error, "source failed, terminating session");
                            downstream(Token::Error(error));
                            break;
                        }
                    }
                }
            }
            Token::Done => break,
            Token::Error(error) => {
                tracing::error!(%error, "source side received error, terminating session");
                break;
            }
            other => {
                tracing::debug!(token = other.kind(), "illegal token at source side, dropped");
            }
        }
    }
    tracing::trace!("source side terminated");
}

/// Sink-side session loop: process elements one at a time, reply `Cont`
/// after each, resolve the deferred on `Eof` (or early `Done`), then send
/// `Done` upstream and terminate.
pub(crate) async fn run_sink<K>(
    mut sink: K,
    mut mailbox: mpsc::UnboundedReceiver<Token<K::Item>>,
    upstream: Emit<K::Item>,
    deferred: Deferred<K::Output>,
) where
    K: Sink + 'static,
{
    while let Some(token) = mailbox.recv().await {
        match token {
            Token::Elem(item) => match sink.on_elem(item).await {
                Step::Cont => upstream(Token::Cont),
                Step::Done(output) => {
                    deferred.resolve(output);
                    upstream(Token::Done);
                    break;
                }
                Step::Fail(error) => {
                    tracing::error!(%error, "sink failed, terminating session");
                    upstream(Token::Error(error));
                    break;
                }
            },
            Token::Eof => {
                let output = sink.on_eof().await;
                deferred.resolve(output);
                upstream(Token::Done);
                break;
            }
            // nothing this turn; an external push or timer resumes the
            // session by sending Cont on the source mailbox
            Token::Empty => {}
            Token::Error(error) => {
                tracing::error!(%error, "session failed upstream");
                break;
            }
            other => {
                tracing::debug!(token = other.kind(), "illegal token at sink side, dropped");
            }
        }
    }
    tracing::trace!("sink side terminated");
}

/// Transform-hop session loop. A single mailbox carries both directions:
/// data tokens arrive from upstream, flow-control tokens from downstream.
///
/// A filtered-out element (`None` from the chain) contributes no output and
/// is answered with `Cont` upstream so the session still advances.
pub(crate) async fn run_pipe<I, O>(
    mut pipe: Pipe<I, O>,
    mut mailbox: mpsc::UnboundedReceiver<Token<I>>,
    upstream: Emit<I>,
    downstream: Emit<O>,
) where
    I: Send + 'static,
    O: Send + 'static,
{
    while let Some(token) = mailbox.recv().await {
        match token {
            Token::Elem(item) => match pipe.apply(item) {
                Some(out) => downstream(Token::Elem(out)),
                None => upstream(Token::Cont),
            },
            Token::Eof => downstream(Token::Eof),
            Token::Empty => downstream(Token::Empty),
            Token::Cont => upstream(Token::Cont),
            Token::Done => {
                upstream(Token::Done);
                break;
            }
            Token::Error(error) => {
                // relayed both ways: the originating side's mailbox is
                // already closed, so one of the two sends is a no-op
                upstream(Token::Error(error.clone()));
                downstream(Token::Error(error));
                break;
            }
            Token::Run => {
                tracing::debug!(token = "run", "illegal token at transform hop, dropped");
            }
        }
    }
    tracing::trace!("transform hop terminated");
}

/// Wire a plain source → sink session and start it.
pub(crate) fn drive<S, K>(runtime: &Runtime, mut source: S, sink: K) -> Deferred<K::Output>
where
    S: Source + 'static,
    K: Sink<Item = S::Item> + 'static,
{
    let deferred = Deferred::new();
    let (source_tx, source_rx) = mpsc::unbounded_channel();
    let (sink_tx, sink_rx) = mpsc::unbounded_channel();

    source.on_attach(SessionHandle::for_mailbox(
        runtime.clone(),
        source_tx.clone(),
    ));

    runtime.spawn(run_source(source, source_rx, emit_to(sink_tx)));
    runtime.spawn(run_sink(
        sink,
        sink_rx,
        emit_to(source_tx.clone()),
        deferred.clone(),
    ));

    let _ = source_tx.send(Token::Run);
    deferred
}

/// Wire a source → transform hop → sink session and start it. All hops
/// belong to the one session and terminate together.
pub(crate) fn drive_through<S, I, O, K>(
    runtime: &Runtime,
    mut source: S,
    pipe: Pipe<I, O>,
    sink: K,
) -> Deferred<K::Output>
where
    S: Source<Item = I> + 'static,
    K: Sink<Item = O> + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    let deferred = Deferred::new();
    let (source_tx, source_rx) = mpsc::unbounded_channel::<Token<I>>();
    let (pipe_tx, pipe_rx) = mpsc::unbounded_channel::<Token<I>>();
    let (sink_tx, sink_rx) = mpsc::unbounded_channel::<Token<O>>();

    source.on_attach(SessionHandle::for_mailbox(
        runtime.clone(),
        source_tx.clone(),
    ));

    // the sink replies flow-control tokens back into the hop's mailbox
    let reply_tx = pipe_tx.clone();
    let sink_reply: Emit<O> = Arc::new(move |token| {
        let retagged = match token {
            Token::Cont => Token::Cont,
            Token::Done => Token::Done,
            Token::Error(error) => Token::Error(error),
            other => {
                tracing::debug!(token = other.kind(), "unexpected reply from sink, dropped");
                return;
            }
        };
        let _ = reply_tx.send(retagged);
    });

    runtime.spawn(run_source(source, source_rx, emit_to(pipe_tx)));
    runtime.spawn(run_pipe(
        pipe,
        pipe_rx,
        emit_to(source_tx.clone()),
        emit_to(sink_tx),
    ));
    runtime.spawn(run_sink(sink, sink_rx, sink_reply, deferred.clone()));

    let _ = source_tx.send(Token::Run);
    deferred
}
