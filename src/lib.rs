//! # Push/pull streaming pipelines with token-level backpressure
//!
//! This crate provides composable data-flow primitives — sources, sinks and
//! in-flight transforms — connected by an explicit backpressure token
//! protocol, for driving long-lived, chunked or event-style outputs.
//!
//! ## Core concepts
//!
//! - **Source**: yields elements one turn at a time, paced by the sink
//! - **Sink**: reacts to tokens and resolves a [`Deferred`] on completion
//! - **Pipe**: maps or filters elements between a source and a sink
//! - **Hub**: broadcasts one source to many dynamically attached sinks
//! - **Runtime**: explicit handle owning every session task
//!
//! ## Example
//!
//! ```rust
//! use streamfeed::prelude::*;
//!
//! #[tokio::main]
//! async fn main() {
//!     let runtime = Runtime::new();
//!
//!     let evens = IterSource::new(1..=8)
//!         .through(Pipe::filter(|n: &i32| n % 2 == 0));
//!     let result = evens.run_into(Collect::new(), &runtime);
//!
//!     assert_eq!(result.wait().await, vec![2, 4, 6, 8]);
//!     runtime.shutdown().await;
//! }
//! ```

pub mod adapters;
pub mod deferred;
pub mod error;
pub mod hub;
pub mod protocol;
pub mod runtime;
pub mod sinks;
pub mod sources;
pub mod stream;
pub mod traits;
pub mod transform;

// Re-export commonly used items
pub mod prelude {
    pub use crate::deferred::Deferred;
    pub use crate::error::{Error, Result};
    pub use crate::hub::Hub;
    pub use crate::protocol::{SessionHandle, Step, Token};
    pub use crate::runtime::Runtime;
    pub use crate::sinks::{ChannelSink, Collect, ForEach, Head, Ignore, WriterSink};
    pub use crate::sources::{
        interleave, ChainSource, ChunkedReadSource, CounterSource, Interleaved, IterSource,
        LineSource, PushSource, StreamSource, TimedSource,
    };
    pub use crate::traits::{Sink, Source};
    pub use crate::transform::Pipe;
}

pub use deferred::Deferred;
pub use error::{Error, Result};
pub use hub::Hub;
pub use protocol::{SessionHandle, Step, Token};
pub use runtime::Runtime;
pub use traits::{Sink, Source};
pub use transform::Pipe;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
