//! Test helpers and end-to-end store scenarios
//!
//! These exercise the bus, projector, effects and responses together
//! through the public `Store` API.

use super::*;
use crate::error::HandlerError;
use crate::reply::Reply;
use futures::FutureExt;
use serde_json::json;
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// Helpers
// ============================================================================

/// Catch-all effect that records the type of every action it observes
#[derive(Clone, Default)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn effect(&self, name: &str) -> Effect {
        let seen = Arc::clone(&self.seen);
        Effect::new("recorder", name, move |_, ctx| {
            seen.lock().unwrap().push(ctx.action.kind.clone());
            Ok(Reply::none())
        })
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

/// `count` reducer: `inc` adds one, `add` adds the payload
pub fn counter_reducer() -> Reducer {
    Reducer::new("count", ["inc", "add"], |current, action| {
        let n = current.as_leaf().and_then(Value::as_i64).unwrap_or(0);
        let by = match action.kind.as_str() {
            "add" => action
                .payload_or_null()
                .as_i64()
                .ok_or_else(|| HandlerError::new("add needs an integer payload"))?,
            _ => 1,
        };
        Ok(Tree::leaf(n + by))
    })
}

pub fn counter_store() -> Store {
    Store::builder()
        .state(json!({ "count": 0 }))
        .reducers([counter_reducer()])
        .build()
        .unwrap()
}

pub fn add(n: i64) -> Action {
    Action::new("add").with_payload(n)
}

/// Everything a stream has ready right now, without waiting
pub fn drain_ready<S: Stream + Unpin>(stream: &mut S) -> Vec<S::Item> {
    let mut out = Vec::new();
    while let Some(Some(item)) = stream.next().now_or_never() {
        out.push(item);
    }
    out
}

fn kinds(pairs: &[ActionWithState]) -> Vec<String> {
    pairs.iter().map(|p| p.action.kind.clone()).collect()
}

// ============================================================================
// Bus and projection
// ============================================================================

#[test]
fn test_one_snapshot_per_action() {
    let store = counter_store();
    let mut states = store.states().boxed();

    store
        .dispatch_all(vec![Action::new("inc"), Action::new("noop"), add(5)])
        .unwrap();

    let counts: Vec<Value> = drain_ready(&mut states)
        .iter()
        .map(|s| s.get_in_or_empty(&["count".to_string()]).to_value())
        .collect();
    // the current snapshot, then one per action
    assert_eq!(counts, vec![json!(0), json!(1), json!(1), json!(6)]);
}

#[test]
fn test_dispatch_all_preserves_order() {
    let store = counter_store();
    let mut pairs = store.subscribe();
    store
        .dispatch_all(["a", "b", "c"].map(Action::new))
        .unwrap();
    assert_eq!(kinds(&drain_ready(&mut pairs)), vec!["a", "b", "c"]);
}

#[test]
fn test_same_actions_same_state() {
    let actions = || vec![Action::new("inc"), add(3), Action::new("inc"), add(-2)];
    let first = counter_store();
    let second = counter_store();
    first.dispatch_all(actions()).unwrap();
    second.dispatch_all(actions()).unwrap();

    assert_eq!(first.state(), second.state());
    assert_eq!(first.to_js("count"), json!(3));
}

#[test]
fn test_reducer_failure_halts_store() {
    let store = Store::builder()
        .reducers([Reducer::new("count", ["explode"], |_, _| {
            Err(HandlerError::new("kaboom"))
        })])
        .build()
        .unwrap();
    let recorder = Recorder::new();
    store.add_effects([recorder.effect("watch")]);
    let mut pairs = store.subscribe();
    let never = store.once(["never"]);

    store.dispatch(Action::new("before")).unwrap();
    let err = store.dispatch(Action::new("explode")).unwrap_err();
    assert!(matches!(err, StoreError::Reducer { ref action, .. } if action == "explode"));
    assert_eq!(store.dispatch(Action::new("after")), Err(StoreError::Halted));

    // nothing downstream saw the failing action or anything after it
    assert_eq!(recorder.seen(), vec!["before"]);
    assert_eq!(kinds(&drain_ready(&mut pairs)), vec!["before"]);
    assert!(matches!(never.now_or_never(), Some(None)));
    assert!(store.failure().is_some_and(|e| e.is_fatal()));

    // late subscribers get an already-finished stream
    let mut late = store.subscribe();
    assert!(matches!(late.next().now_or_never(), Some(None)));
}

#[test]
fn test_reducer_failure_during_cascade_stops_delivery() {
    let store = Store::builder()
        .reducers([Reducer::new("x", ["boom"], |_, _| Err(HandlerError::new("bad")))])
        .responses([ResponseRule::new("start", (), "boom")])
        .build()
        .unwrap();
    let recorder = Recorder::new();
    store.add_effects([recorder.effect("after_router")]);

    // the outer action was accepted; its response was not
    assert!(store.dispatch(Action::new("start")).is_ok());
    assert!(store.is_halted());
    assert!(recorder.seen().is_empty());
}

#[test]
fn test_subscription_racing_a_halt_still_ends() {
    let store = Store::builder()
        .reducers([Reducer::new("x", ["explode"], |_, _| Err(HandlerError::new("bad")))])
        .build()
        .unwrap();
    let subscriber = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&subscriber);
    store.add_effects([Effect::new("racer", "subscribe_then_halt", move |_, ctx| {
        let other = ctx.store().clone();
        *slot.lock().unwrap() = Some(std::thread::spawn(move || other.subscribe()));
        std::thread::sleep(Duration::from_millis(20));
        Ok(Reply::single(Action::new("explode")))
    })
    .on(["go"])]);

    store.dispatch(Action::new("go")).unwrap();
    assert!(store.is_halted());

    // the other thread subscribed mid-cascade; its stream must still end
    let handle = subscriber.lock().unwrap().take().expect("subscriber started");
    let mut pairs = handle.join().unwrap();
    assert!(matches!(pairs.next().now_or_never(), Some(None)));
}

// ============================================================================
// Responses
// ============================================================================

#[test]
fn test_response_forwards_state_slice() {
    let store = Store::builder()
        .state(json!({ "x": { "v": 42 } }))
        .responses([ResponseRule::new("A", "x", "B")])
        .build()
        .unwrap();
    let mut pairs = store.subscribe();

    store.dispatch(Action::new("A")).unwrap();

    let seen: Vec<Action> = drain_ready(&mut pairs)
        .into_iter()
        .map(|p| Action::clone(&p.action))
        .collect();
    // the router is the first observer, so the response cascades before the
    // subscriber sees the trigger
    assert_eq!(
        seen,
        vec![
            Action::new("B")
                .with_payload(json!({ "v": 42 }))
                .with_via("[response to (A)]"),
            Action::new("A"),
        ]
    );
}

#[test]
fn test_response_reads_state_after_reduction() {
    let store = counter_store();
    store.add_responses([ResponseRule::new("add", "count", "count.changed")]);
    let changed = store.once(["count.changed"]);

    store.dispatch(add(4)).unwrap();

    let pair = changed.now_or_never().flatten().expect("response dispatched");
    assert_eq!(pair.action.payload, Some(json!(4)));
}

#[test]
fn test_unmatched_action_emits_nothing() {
    let store = counter_store();
    store.add_responses([ResponseRule::new("A", "count", "B")]);
    let mut pairs = store.subscribe();

    store.dispatch(Action::new("C")).unwrap();
    assert_eq!(kinds(&drain_ready(&mut pairs)), vec!["C"]);
}

#[test]
fn test_duplicate_rules_fire_once_each() {
    let store = counter_store();
    let rule = ResponseRule::new("A", "count", "B");
    store.add_responses([rule.clone(), rule]);
    let recorder = Recorder::new();
    store.add_effects([recorder.effect("all")]);

    store.dispatch(Action::new("A")).unwrap();
    assert_eq!(recorder.seen(), vec!["B", "B", "A"]);
}

#[test]
fn test_response_mapping() {
    let store = Store::new(json!({ "user": { "token": "abc" } }));
    store
        .add_response_mapping(&json!({
            "user.login": { "path": ["user", "token"], "action": "api.auth" }
        }))
        .unwrap();
    let auth = store.once(["api.auth"]);

    store.dispatch(Action::new("user.login")).unwrap();
    let pair = auth.now_or_never().flatten().expect("auth dispatched");
    assert_eq!(pair.action.payload, Some(json!("abc")));
    assert_eq!(pair.action.via.as_deref(), Some("[response to (user.login)]"));
}

#[test]
fn test_depth_limit_breaks_response_cycle() {
    let store = Store::builder()
        .config(StoreConfig::default().with_max_dispatch_depth(8))
        .responses([
            ResponseRule::new("ping", (), "pong"),
            ResponseRule::new("pong", (), "ping"),
        ])
        .build()
        .unwrap();
    let mut pairs = store.subscribe();

    assert!(store.dispatch(Action::new("ping")).is_ok());
    assert_eq!(drain_ready(&mut pairs).len(), 8);
    assert!(!store.is_halted());

    // the store keeps working afterwards
    assert!(store.dispatch(Action::new("other")).is_ok());
}

// ============================================================================
// Effects
// ============================================================================

#[test]
fn test_effect_receives_payload_and_resulting_state() {
    let store = counter_store();
    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    store.add_effects([Effect::new("counter", "observe", move |payload, ctx| {
        *sink.lock().unwrap() = Some((payload.clone(), ctx.state.to_value()["count"].clone()));
        Ok(Reply::none())
    })
    .on(["add"])]);

    store.dispatch(add(5)).unwrap();
    assert_eq!(*seen.lock().unwrap(), Some((json!(5), json!(5))));
}

#[test]
fn test_failing_effect_does_not_stop_siblings() {
    let store = counter_store();
    store.add_effects([
        Effect::new("flaky", "sync_failure", |_, _| Err(HandlerError::new("sync failure")))
            .on(["go"]),
        Effect::new("flaky", "stream_failure", |_, _| {
            Ok(Reply::stream(stream::iter(vec![
                Ok(Action::new("partial")),
                Err(HandlerError::new("mid-stream")),
                Ok(Action::new("unreachable")),
            ])))
        })
        .on(["go"]),
        Effect::new("steady", "follow_up", |_, _| Ok(Reply::single(Action::new("followed"))))
            .on(["go"]),
    ]);
    let recorder = Recorder::new();
    store.add_effects([recorder.effect("all")]);

    assert!(store.dispatch(Action::new("go")).is_ok());
    assert_eq!(recorder.seen(), vec!["partial", "followed", "go"]);
}

#[test]
fn test_cascade_completes_before_dispatch_returns() {
    let store = counter_store();
    let early = Recorder::new();
    store.add_effects([early.effect("early")]);
    store.add_effects([
        Effect::new("chain", "a_to_b", |_, _| Ok(Reply::single(Action::new("b")))).on(["a"]),
    ]);
    let late = Recorder::new();
    store.add_effects([late.effect("late")]);

    store.dispatch(Action::new("a")).unwrap();

    // observers before the chaining effect see `a` first; those after it
    // see the nested `b` first
    assert_eq!(early.seen(), vec!["a", "b"]);
    assert_eq!(late.seen(), vec!["b", "a"]);
}

#[test]
fn test_effect_sees_extras_and_store() {
    let store = counter_store();
    let mut extras = Map::new();
    extras.insert("greeting".into(), json!("hello"));
    store.add_extras(extras);

    store.add_effects([Effect::new("greeter", "greet", |_, ctx| {
        let greeting = ctx.extras.get("greeting").cloned().unwrap_or(Value::Null);
        let count = ctx.store().to_js("count");
        Ok(Reply::single(
            Action::new("greeted").with_payload(json!({ "greeting": greeting, "count": count })),
        ))
    })
    .on(["inc"])]);
    let greeted = store.once(["greeted"]);

    store.dispatch(Action::new("inc")).unwrap();
    let pair = greeted.now_or_never().flatten().expect("greeted");
    assert_eq!(
        pair.action.payload,
        Some(json!({ "greeting": "hello", "count": 1 }))
    );
}

#[tokio::test]
async fn test_async_effect_dispatches_later() {
    let store = counter_store();
    store.add_effects([Effect::new("timer", "delayed_inc", |_, _| {
        Ok(Reply::future(async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(Action::new("inc"))
        }))
    })
    .on(["start"])]);
    let done = store.once(["inc"]);

    store.dispatch(Action::new("start")).unwrap();
    assert_eq!(store.to_js("count"), json!(0));

    let pair = tokio::time::timeout(Duration::from_secs(1), done)
        .await
        .expect("inc within timeout")
        .expect("store still running");
    assert_eq!(pair.state.to_value()["count"], json!(1));
    assert_eq!(store.to_js("count"), json!(1));
}

#[tokio::test]
async fn test_async_sequence_keeps_emission_order() {
    let store = counter_store();
    store.add_effects([Effect::new("ticker", "ticks", |_, _| {
        Ok(Reply::stream(stream::iter(1..=3).then(|n| async move {
            tokio::time::sleep(Duration::from_millis(2)).await;
            Ok(add(n))
        })))
    })
    .on(["start"])]);
    let mut pairs = store.subscribe();
    let mut counts = store.changes("count").boxed();

    store.dispatch(Action::new("start")).unwrap();

    let reached = tokio::time::timeout(Duration::from_secs(1), async {
        while let Some(count) = counts.next().await {
            if count == Tree::leaf(6) {
                return true;
            }
        }
        false
    })
    .await
    .expect("count reaches 6");
    assert!(reached);

    let payloads: Vec<Option<Value>> = drain_ready(&mut pairs)
        .iter()
        .map(|p| p.action.payload.clone())
        .collect();
    assert_eq!(
        payloads,
        vec![None, Some(json!(1)), Some(json!(2)), Some(json!(3))]
    );
}

// ============================================================================
// Observation and registration
// ============================================================================

#[test]
fn test_changes_skips_consecutive_duplicates() {
    let store = counter_store();
    let mut changes = store.changes("count").boxed();

    store.dispatch(Action::new("inc")).unwrap();
    store.dispatch(Action::new("unrelated")).unwrap();
    store.dispatch(Action::new("inc")).unwrap();

    let values: Vec<Value> = drain_ready(&mut changes).iter().map(Tree::to_value).collect();
    assert_eq!(values, vec![json!(0), json!(1), json!(2)]);

    // each call starts over from the current value
    let mut again = store.changes("count").boxed();
    let values: Vec<Value> = drain_ready(&mut again).iter().map(Tree::to_value).collect();
    assert_eq!(values, vec![json!(2)]);
}

#[test]
fn test_once_takes_first_of_any_type() {
    let store = counter_store();
    let first = store.once(["x", "y"]);
    store
        .dispatch_all(["z", "y", "x"].map(Action::new))
        .unwrap();
    let pair = first.now_or_never().flatten().expect("resolved");
    assert_eq!(pair.action.kind, "y");
}

#[test]
fn test_register_module() {
    let store = Store::new(Value::Null);
    store
        .register(Registration {
            state: Some(json!({ "user": { "name": null } })),
            reducers: vec![Reducer::new(["user", "name"], ["user.rename"], |_, action| {
                Ok(Tree::from_value(action.payload_or_null().clone()))
            })
            .into()],
            effects: vec![Effect::new("user", "greet", |_, _| {
                Ok(Reply::single(Action::new("user.greeted")))
            })
            .on(["user.rename"])],
            responses: vec![ResponseRule::new("user.greeted", "user", "audit.user")],
        })
        .unwrap();
    let audit = store.once(["audit.user"]);

    store
        .dispatch(Action::new("user.rename").with_payload("kittie"))
        .unwrap();

    assert_eq!(store.to_js(["user", "name"]), json!("kittie"));
    let pair = audit.now_or_never().flatten().expect("audit dispatched");
    assert_eq!(pair.action.payload, Some(json!({ "name": "kittie" })));
    assert_eq!(pair.action.via.as_deref(), Some("[response to (user.greeted)]"));
}

#[test]
fn test_builder_runs_middleware_after_effects() {
    let recorder = Recorder::new();
    let store = Store::builder()
        .state(json!({ "count": 0 }))
        .reducers([counter_reducer()])
        .effects([recorder.effect("all")])
        .middleware(|store| {
            store.dispatch(Action::new("inc")).unwrap();
        })
        .build()
        .unwrap();

    assert_eq!(recorder.seen(), vec!["inc"]);
    assert_eq!(store.to_js("count"), json!(1));
}

#[test]
fn test_mapped_reducer_sees_whole_tree() {
    let store = counter_store();
    store
        .add_reducers([MappedReducer::new(|tree, action| {
            Ok(tree.set_in(&["history".to_string(), "last".to_string()], Tree::leaf(action.kind.clone())))
        })])
        .unwrap();

    store.dispatch(Action::new("inc")).unwrap();
    assert_eq!(store.to_js(()), json!({ "count": 1, "history": { "last": "inc" } }));
}
