//! In-flight element transforms and transform chaining.

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::SessionHandle;
use crate::traits::Source;

/// A mapping or filtering stage between a source and a sink.
///
/// A pipe owns a function from input elements to optional output elements;
/// `None` means the element is filtered out and contributes nothing
/// downstream. Pipes compose with [`then`](Pipe::then), and composition
/// short-circuits: once a stage filters an element, later stages never see
/// it.
///
/// # Examples
///
/// ```rust
/// let evens_doubled = streamfeed::Pipe::filter(|n: &i32| n % 2 == 0)
///     .then(streamfeed::Pipe::map(|n| n * 2));
/// # let _ = evens_doubled;
/// ```
pub struct Pipe<I, O> {
    chain: Box<dyn FnMut(I) -> Option<O> + Send>,
}

impl<I: Send + 'static, O: Send + 'static> Pipe<I, O> {
    /// A pipe that maps every element through `f`
    pub fn map<F>(mut f: F) -> Self
    where
        F: FnMut(I) -> O + Send + 'static,
    {
        Self {
            chain: Box::new(move |item| Some(f(item))),
        }
    }

    /// A pipe that keeps only elements for which `f` returns a value,
    /// mapping them in the same step
    pub fn collect<F>(mut f: F) -> Self
    where
        F: FnMut(I) -> Option<O> + Send + 'static,
    {
        Self {
            chain: Box::new(move |item| f(item)),
        }
    }

    /// Compose with a later stage. A `None` from this pipe short-circuits
    /// `next`.
    pub fn then<O2>(self, next: Pipe<O, O2>) -> Pipe<I, O2>
    where
        O2: Send + 'static,
    {
        let mut first = self.chain;
        let mut second = next.chain;
        Pipe {
            chain: Box::new(move |item| first(item).and_then(|mid| second(mid))),
        }
    }

    pub(crate) fn apply(&mut self, item: I) -> Option<O> {
        (self.chain)(item)
    }
}

impl<I: Send + 'static> Pipe<I, I> {
    /// A pipe that keeps only elements satisfying `predicate`
    pub fn filter<F>(mut predicate: F) -> Self
    where
        F: FnMut(&I) -> bool + Send + 'static,
    {
        Self {
            chain: Box::new(move |item| if predicate(&item) { Some(item) } else { None }),
        }
    }
}

/// A source with a transform chain attached; the result of
/// [`Source::through`].
///
/// Behaves as a source of the chain's output type. When pulled directly,
/// filtered elements are skipped (never surfaced as a marker value); when
/// driven, the chain runs as a transform hop inside the same session.
pub struct DecoratedSource<S: Source, O> {
    upstream: S,
    chain: Pipe<S::Item, O>,
}

impl<S, O> DecoratedSource<S, O>
where
    S: Source,
    O: Send + 'static,
{
    pub(crate) fn new(upstream: S, chain: Pipe<S::Item, O>) -> Self {
        Self { upstream, chain }
    }

    /// Attach a further transform, folding it into the existing chain
    /// rather than adding another hop
    pub fn through<O2>(self, next: Pipe<O, O2>) -> DecoratedSource<S, O2>
    where
        O2: Send + 'static,
    {
        DecoratedSource {
            upstream: self.upstream,
            chain: self.chain.then(next),
        }
    }
}

#[async_trait]
impl<S, O> Source for DecoratedSource<S, O>
where
    S: Source + 'static,
    O: Send + 'static,
{
    type Item = O;

    fn has_next(&self) -> bool {
        self.upstream.has_next()
    }

    async fn next(&mut self) -> Result<Option<O>> {
        while self.upstream.has_next() {
            match self.upstream.next().await? {
                Some(item) => match self.chain.apply(item) {
                    Some(out) => return Ok(Some(out)),
                    // filtered: take another turn rather than surfacing a
                    // no-data marker for an element that existed
                    None => continue,
                },
                None => return Ok(None),
            }
        }
        Ok(None)
    }

    fn on_attach(&mut self, session: SessionHandle) {
        self.upstream.on_attach(session);
    }

    fn run_into<K>(self, sink: K, runtime: &crate::runtime::Runtime) -> crate::Deferred<K::Output>
    where
        Self: Sized + 'static,
        K: crate::traits::Sink<Item = O> + 'static,
    {
        crate::protocol::drive_through(runtime, self.upstream, self.chain, sink)
    }
}
