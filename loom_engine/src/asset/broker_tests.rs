//! Unit tests for AssetBroker
//!
//! Exactly-once fulfilment, deferred cache hits, persistence of unmatched
//! requests and re-entrant requests from callbacks.

use crate::asset::{AssetBroker, AssetSource};
use crate::error::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Source that knows a fixed set of ids and counts its loads
struct CountingSource {
    known: Vec<&'static str>,
    loads: usize,
}

impl CountingSource {
    fn new(known: &[&'static str]) -> Self {
        Self { known: known.to_vec(), loads: 0 }
    }
}

impl AssetSource<u32> for CountingSource {
    fn load(&mut self, id: &str) -> Result<Option<u32>> {
        self.loads += 1;
        if id == "broken" {
            return Err(Error::InvalidResource(id.to_string()));
        }
        Ok(self.known.iter().position(|k| *k == id).map(|p| p as u32 + 100))
    }
}

fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Box<dyn FnOnce(&str, u32) + Send>) {
    let count = Arc::new(AtomicUsize::new(0));
    let handle = count.clone();
    (count, move || {
        let handle = handle.clone();
        Box::new(move |_: &str, _: u32| {
            handle.fetch_add(1, Ordering::SeqCst);
        })
    })
}

#[test]
fn test_request_never_invokes_inline() {
    let mut broker: AssetBroker<u32> = AssetBroker::new("models");
    broker.insert("cube", 1);
    let (count, make) = counter();
    broker.request("cube", make());
    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert_eq!(broker.pending_count(), 1);
}

#[test]
fn test_each_request_fulfilled_exactly_once() {
    let mut broker: AssetBroker<u32> = AssetBroker::new("models");
    let mut source = CountingSource::new(&["cube"]);
    let (count, make) = counter();
    let key = broker.request("cube", make());

    let fulfilled = broker.resolve(&mut source);
    assert!(!broker.is_pending(key));
    assert_eq!(fulfilled.dispatch(), 1);
    assert_eq!(broker.resolve(&mut source).dispatch(), 0);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_cache_hit_fires_on_next_pass_without_refetch() {
    let mut broker: AssetBroker<u32> = AssetBroker::new("models");
    let mut source = CountingSource::new(&["cube"]);
    let (count, make) = counter();
    broker.request("cube", make());
    broker.resolve(&mut source).dispatch();
    assert_eq!(source.loads, 1);

    broker.request("cube", make());
    broker.request("cube", make());
    assert_eq!(broker.resolve(&mut source).dispatch(), 2);
    assert_eq!(source.loads, 1);
    assert_eq!(count.load(Ordering::SeqCst), 3);
}

#[test]
fn test_unmatched_request_persists_until_resolvable() {
    let mut broker: AssetBroker<u32> = AssetBroker::new("models");
    let mut source = CountingSource::new(&[]);
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    broker.request("tree", move |id: &str, value: u32| sink.lock().unwrap().push((id.to_string(), value)));

    for _ in 0..3 {
        assert_eq!(broker.resolve(&mut source).dispatch(), 0);
    }
    assert_eq!(broker.pending_count(), 1);

    source.known.push("tree");
    assert_eq!(broker.resolve(&mut source).dispatch(), 1);
    assert_eq!(*received.lock().unwrap(), vec![("tree".to_string(), 100)]);
}

#[test]
fn test_source_asked_once_per_id_per_pass() {
    let mut broker: AssetBroker<u32> = AssetBroker::new("models");
    let mut source = CountingSource::new(&[]);
    let (_count, make) = counter();
    for _ in 0..4 {
        broker.request("missing", make());
    }
    broker.resolve(&mut source);
    assert_eq!(source.loads, 1);
}

#[test]
fn test_load_error_keeps_request_pending() {
    let mut broker: AssetBroker<u32> = AssetBroker::new("models");
    let mut source = CountingSource::new(&[]);
    let (count, make) = counter();
    broker.request("broken", make());
    assert_eq!(broker.resolve(&mut source).dispatch(), 0);
    assert_eq!(broker.pending_count(), 1);
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn test_fulfilment_preserves_request_order() {
    let mut broker: AssetBroker<u32> = AssetBroker::new("models");
    let mut source = CountingSource::new(&["a", "b"]);
    let order = Arc::new(Mutex::new(Vec::new()));
    for id in ["b", "a", "b"] {
        let order = order.clone();
        broker.request(id, move |id: &str, _| order.lock().unwrap().push(id.to_string()));
    }
    broker.resolve(&mut source).dispatch();
    assert_eq!(*order.lock().unwrap(), vec!["b", "a", "b"]);
}

#[test]
fn test_cancel_drops_callback_without_invoking() {
    let mut broker: AssetBroker<u32> = AssetBroker::new("models");
    let mut source = CountingSource::new(&["a"]);
    let (count, make) = counter();
    let key = broker.request("a", make());
    assert!(broker.cancel(key));
    assert!(!broker.cancel(key));
    assert_eq!(broker.resolve(&mut source).dispatch(), 0);
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn test_callback_may_request_again_through_shared_broker() {
    let broker = AssetBroker::<u32>::shared("models");
    let mut source = CountingSource::new(&["a"]);
    let again = broker.clone();
    let hits = Arc::new(AtomicUsize::new(0));
    let inner_hits = hits.clone();
    broker.lock().unwrap().request("a", move |_: &str, _: u32| {
        let inner_hits = inner_hits.clone();
        again.lock().unwrap().request("a", move |_: &str, _: u32| {
            inner_hits.fetch_add(1, Ordering::SeqCst);
        });
    });

    assert_eq!(AssetBroker::<u32>::resolve_shared(&broker, &mut source), 1);
    assert_eq!(broker.lock().unwrap().pending_count(), 1);
    assert_eq!(AssetBroker::<u32>::resolve_shared(&broker, &mut source), 1);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_evicted_asset_is_loaded_again() {
    let mut broker: AssetBroker<u32> = AssetBroker::new("models");
    let mut source = CountingSource::new(&["a"]);
    let (_count, make) = counter();
    broker.request("a", make());
    broker.resolve(&mut source).dispatch();
    assert_eq!(broker.cached("a"), Some(100));
    assert_eq!(broker.evict("a"), Some(100));
    broker.request("a", make());
    broker.resolve(&mut source).dispatch();
    assert_eq!(source.loads, 2);
}
