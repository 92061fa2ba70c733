//! Staunch demo - a counter store wired to an async effect and a mailbox
//!
//! Run with `RUST_LOG=staunch=debug` to watch the dispatch trace and
//! `STAUNCH_MAX_DISPATCH_DEPTH` to bound cascades.

use futures::StreamExt;
use serde_json::{json, Value};
use staunch::{
    Action, Actor, Effect, HandlerError, IncomingMessage, Mailbox, Reducer, Reply, ResponseRule,
    Store, StoreConfig, Tree,
};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn counter() -> Reducer {
    Reducer::new("count", ["counter.inc", "counter.add"], |current, action| {
        let n = current.as_leaf().and_then(Value::as_i64).unwrap_or(0);
        let by = match action.kind.as_str() {
            "counter.add" => action
                .payload_or_null()
                .as_i64()
                .ok_or_else(|| HandlerError::new("counter.add needs an integer"))?,
            _ => 1,
        };
        Ok(Tree::leaf(n + by))
    })
}

fn ticker() -> Effect {
    Effect::new("counter", "ticker", |payload, _| {
        let ticks = payload.as_u64().unwrap_or(3);
        Ok(Reply::stream(futures::stream::iter(0..ticks).then(|_| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(Action::new("counter.inc"))
        })))
    })
    .on(["counter.start"])
}

fn math() -> Mailbox {
    Mailbox::new(
        Actor::new("math")
            .method("double", |payload, _| {
                let n = payload
                    .as_i64()
                    .ok_or_else(|| HandlerError::new("double needs an integer"))?;
                Ok(json!(n * 2))
            })
            .missing(|_, message| {
                Ok(Reply::single(
                    json!({ "error": format!("no handler for {}", message.action.kind) }),
                ))
            }),
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "staunch=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = StoreConfig::from_env();
    tracing::info!(max_dispatch_depth = ?config.max_dispatch_depth, "Starting store");

    let store = Store::builder()
        .config(config)
        .state(json!({ "count": 0, "report": {} }))
        .reducers([counter()])
        .effects([ticker()])
        .responses([ResponseRule::new("counter.add", "count", "counter.reported")])
        .build()?;

    let mut reports = store.subscribe().filter(|pair| {
        futures::future::ready(pair.action.kind == "counter.reported")
    });

    store.dispatch(Action::new("counter.add").with_payload(10))?;
    if let Some(report) = reports.next().await {
        tracing::info!(payload = ?report.action.payload, via = ?report.action.via, "Report received");
    }

    let ticks = 3;
    let counts = store.changes("count");
    store.dispatch(Action::new("counter.start").with_payload(ticks))?;
    let target = Tree::leaf(10 + ticks);
    tokio::time::timeout(Duration::from_secs(5), async move {
        let mut counts = std::pin::pin!(counts);
        while let Some(count) = counts.next().await {
            tracing::info!(count = %count.to_value(), "Count changed");
            if count == target {
                break;
            }
        }
    })
    .await?;

    let mailbox = math();
    for (id, kind, payload) in [("m1", "math.double", json!(21)), ("m2", "math.sqrt", json!(4))] {
        let message = IncomingMessage::new(id, Action::new(kind).with_payload(payload));
        if let Some(reply) = mailbox.request(message).await {
            tracing::info!(resp_id = %reply.resp_id, response = %reply.response, "Mailbox reply");
        }
    }

    println!("{}", store.to_json(())?);
    Ok(())
}
