//! Interop with the async `Stream` ecosystem.
//!
//! The other direction — wrapping a `Stream` as a source — is
//! [`crate::sources::StreamSource`].

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::runtime::Runtime;
use crate::sinks::ChannelSink;
use crate::traits::Source;

/// Drain a source into a [`ReceiverStream`].
///
/// Starts a session driving the source into a bounded channel; the
/// channel's `capacity` is the pacing between the session and the stream
/// consumer. Dropping the stream releases the source at the next token
/// boundary.
pub fn into_stream<S>(source: S, capacity: usize, runtime: &Runtime) -> ReceiverStream<S::Item>
where
    S: Source + 'static,
{
    let (tx, rx) = mpsc::channel(capacity);
    let _done = source.run_into(ChannelSink::new(tx), runtime);
    ReceiverStream::new(rx)
}
