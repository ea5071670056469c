//! Integration tests for the keyed bounded map.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use anyhow::anyhow;
use fanmap::{Error, Options, map_keyed};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
struct Record {
    name: &'static str,
}

fn records() -> HashMap<String, Record> {
    HashMap::from([
        ("1".to_string(), Record { name: "a" }),
        ("2".to_string(), Record { name: "b" }),
        ("3".to_string(), Record { name: "c" }),
    ])
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn maps_every_entry() {
    let token = CancellationToken::new();

    let (mut out, errs) = map_keyed(
        &token,
        records(),
        |_, key: String, rec: Record| async move {
            Ok::<_, anyhow::Error>(format!("{key}={}", rec.name))
        },
        Options::default(),
    )
    .await;

    assert!(errs.is_empty());
    out.sort();
    assert_eq!(out, vec!["1=a", "2=b", "3=c"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn limit_caps_recorded_results() {
    let token = CancellationToken::new();

    let (out, errs) = map_keyed(
        &token,
        records(),
        |_, key: String, _| async move { Ok::<_, anyhow::Error>(key) },
        Options::default().limit(2),
    )
    .await;

    assert!(errs.is_empty());
    assert_eq!(out.len(), 2);
}

#[tokio::test]
async fn failures_are_named_by_key() {
    let token = CancellationToken::new();
    let items = BTreeMap::from([("alpha", 1), ("beta", 2), ("gamma", 3)]);

    let (mut out, errs) = map_keyed(
        &token,
        items,
        |_, key: &'static str, n: i32| async move {
            if key == "beta" {
                return Err(anyhow!("no beta"));
            }
            Ok(n * 10)
        },
        Options::default().concurrency(2),
    )
    .await;

    out.sort();
    assert_eq!(out, vec![10, 30]);
    assert_eq!(errs.len(), 1);
    assert_eq!(errs.to_string(), "failed to map \"beta\": no beta");
}

#[tokio::test]
async fn panic_before_returning_future_is_named_by_key() {
    let token = CancellationToken::new();
    let items = BTreeMap::from([("alpha", 1), ("beta", 2), ("gamma", 3)]);

    let (mut out, errs) = map_keyed(
        &token,
        items,
        |_, key: &'static str, n: i32| {
            if key == "beta" {
                panic!("eager boom on {key}");
            }
            async move { Ok::<_, anyhow::Error>(n * 10) }
        },
        Options::default().concurrency(1),
    )
    .await;

    out.sort();
    assert_eq!(out, vec![10, 30]);
    assert_eq!(errs.len(), 1);
    match &errs[0] {
        Error::Panicked { item, reason } => {
            assert_eq!(item, "beta");
            assert!(reason.contains("eager boom on beta"));
        }
        other => panic!("expected Panicked, got {other:?}"),
    }
}

#[tokio::test]
async fn zero_results_are_stripped_unless_disabled() {
    let token = CancellationToken::new();
    let items = vec![("zero", 0), ("one", 1)];

    let (out, _) = map_keyed(
        &token,
        items.clone(),
        |_, _: &'static str, n: i32| async move { Ok::<_, anyhow::Error>(n) },
        Options::default(),
    )
    .await;
    assert_eq!(out, vec![1]);

    let (mut kept, _) = map_keyed(
        &token,
        items,
        |_, _: &'static str, n: i32| async move { Ok::<_, anyhow::Error>(n) },
        Options::default().remove_zero_values(false),
    )
    .await;
    kept.sort();
    assert_eq!(kept, vec![0, 1]);
}

#[tokio::test]
async fn empty_collection() {
    let token = CancellationToken::new();

    let (out, errs) = map_keyed(
        &token,
        HashMap::<String, i32>::new(),
        |_, _: String, n: i32| async move { Ok::<_, anyhow::Error>(n) },
        Options::default().concurrency(1),
    )
    .await;

    assert!(out.is_empty());
    assert!(errs.is_empty());
}

#[tokio::test]
async fn cancelled_token_refuses_first_key() {
    let token = CancellationToken::new();
    token.cancel();

    let (out, errs) = map_keyed(
        &token,
        vec![("only", 1)],
        |_, _: &'static str, n: i32| async move { Ok::<_, anyhow::Error>(n) },
        Options::default(),
    )
    .await;

    assert!(out.is_empty());
    assert_eq!(errs.len(), 1);
    assert!(matches!(&errs[0], Error::CancelledBeforeDispatch { item } if item == "only"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn admission_timeout_names_waiting_key() {
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        canceller.cancel();
    });

    let (out, errs) = map_keyed(
        &token,
        vec![("slow", 1), ("next", 2)],
        |_, _: &'static str, n: i32| async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            Ok::<_, anyhow::Error>(n)
        },
        Options::default().concurrency(1),
    )
    .await;

    assert_eq!(out, vec![1]);
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].to_string(), "context timeout before mapping \"next\"");
}
