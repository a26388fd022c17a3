//! Broadcast demo: a random event feed fanned out to several subscribers.
//!
//! Run with: cargo run --example broadcast

use std::time::Duration;

use rand::Rng;
use streamfeed::adapters;
use streamfeed::prelude::*;

#[derive(Clone, Debug)]
enum Event {
    Operation { amount: u32, public: bool },
    Status(String),
}

fn to_json(event: &Event) -> serde_json::Value {
    match event {
        Event::Operation { amount, public } => serde_json::json!({
            "type": "operation",
            "amount": amount,
            "visibility": if *public { "public" } else { "private" },
        }),
        Event::Status(message) => serde_json::json!({
            "type": "status",
            "message": message,
        }),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let runtime = Runtime::new();

    let operations = TimedSource::new(Duration::from_millis(300), || {
        let mut rng = rand::thread_rng();
        Some(Event::Operation {
            amount: rng.gen_range(0..1000),
            public: rng.gen_bool(0.5),
        })
    });
    let heartbeats = TimedSource::new(Duration::from_secs(1), || {
        Some(Event::Status("system running".to_string()))
    });

    let events = interleave(vec![
        Box::new(operations.clone()) as Box<dyn Source<Item = Event>>,
        Box::new(heartbeats.clone()),
    ]);
    let hub = Hub::started(events, &runtime);

    // the public feed only sees public operations
    let _public = hub
        .add(ForEach::new(|event: Event| {
            if let Event::Operation {
                amount,
                public: true,
            } = event
            {
                println!("[public]  operation amount={}", amount);
            }
        }))
        .await;

    // the manager feed sees everything, framed as event text
    let _manager = hub
        .add(ForEach::new(|event: Event| {
            println!("[manager] {}", adapters::event_text(&to_json(&event)));
        }))
        .await;

    tokio::time::sleep(Duration::from_secs(4)).await;

    operations.stop();
    heartbeats.stop();
    hub.stop();
    runtime.shutdown().await;
}
