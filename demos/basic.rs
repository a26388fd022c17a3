//! Basic usage examples.
//!
//! Run with: cargo run --example basic

use streamfeed::prelude::*;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let runtime = Runtime::new();

    // a finite source through a transform chain
    let squares = IterSource::new(1..=12)
        .through(Pipe::filter(|n: &i32| n % 3 == 0))
        .through(Pipe::map(|n| n * n));
    let collected = squares.run_into(Collect::new(), &runtime).wait().await;
    println!("squares of multiples of three: {:?}", collected);

    // two sources presented as one
    let chained = IterSource::new(vec!["a", "b"]).and_then(IterSource::new(vec!["c", "d"]));
    let letters = chained.run_into(Collect::new(), &runtime).wait().await;
    println!("chained: {:?}", letters);

    // take only the first element; the rest is never produced
    let first = IterSource::new(100..)
        .run_into(Head::new(), &runtime)
        .wait()
        .await;
    println!("head of an endless source: {:?}", first);

    // an externally-fed source
    let feed: PushSource<&str> = PushSource::new();
    let pushed = feed.clone().run_into(Collect::new(), &runtime);
    feed.push("hello");
    feed.push("world");
    feed.stop();
    println!("pushed: {:?}", pushed.wait().await);

    runtime.shutdown().await;
}
