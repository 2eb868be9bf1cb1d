//! Several independent stores (connections) on one database file, standing
//! in for several consumer processes.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use leaseq_core::{MessageId, Queue, QueueConfig, SqliteStore, Store, StoreConfig};

async fn consumer(path: &Path, name: &str) -> Queue {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(path, &StoreConfig::default()).unwrap());
    Queue::open(name, store, QueueConfig::default()).await.unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_leasers_never_win_the_same_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.db");

    let producer = consumer(&path, "q").await;
    let id = producer.send("only").await.unwrap();
    let a = consumer(&path, "q").await;
    let b = consumer(&path, "q").await;

    let (ra, rb) = tokio::join!(a.receive(), b.receive());

    let winners: Vec<MessageId> = [&ra, &rb]
        .into_iter()
        .filter_map(|r| r.as_ref().ok().map(|m| m.id))
        .collect();
    assert_eq!(winners, vec![id]);
    let loser = if ra.is_ok() { rb } else { ra };
    assert!(loser.unwrap_err().is_empty_queue());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn competing_consumers_see_every_message_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.db");

    let producer = consumer(&path, "jobs").await;
    let mut sent = BTreeSet::new();
    for n in 0..40 {
        sent.insert(producer.send(format!("job-{n}")).await.unwrap());
    }

    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut tasks = Vec::new();
    for _ in 0..4 {
        let queue = consumer(&path, "jobs").await;
        let seen = Arc::clone(&seen);
        tasks.push(tokio::spawn(async move {
            queue
                .drain_each(|message| {
                    let seen = Arc::clone(&seen);
                    async move {
                        seen.lock().unwrap().push(message.id);
                        Ok::<(), String>(())
                    }
                })
                .await
                .unwrap()
        }));
    }

    let mut processed = 0;
    for task in tasks {
        processed += task.await.unwrap();
    }

    let seen = seen.lock().unwrap().clone();
    assert_eq!(processed, 40);
    assert_eq!(seen.len(), 40, "a long lease must not deliver twice");
    assert_eq!(seen.into_iter().collect::<BTreeSet<_>>(), sent);
    assert_eq!(producer.counts().await.unwrap().total(), 0);
}

#[tokio::test]
async fn crashed_consumer_message_is_redelivered_after_lease_expiry() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.db");

    let producer = consumer(&path, "q").await;
    let id = producer
        .send_with_lease("fragile", Duration::from_secs(1))
        .await
        .unwrap();

    // Leases, then disappears without ack or nack.
    let crashed = consumer(&path, "q").await;
    assert_eq!(crashed.receive().await.unwrap().id, id);
    drop(crashed);

    let survivor = consumer(&path, "q").await;
    assert!(survivor.receive().await.unwrap_err().is_empty_queue());
    assert_eq!(survivor.counts().await.unwrap().leased, 1);

    tokio::time::sleep(Duration::from_millis(1_200)).await;

    let redelivered = survivor.receive().await.unwrap();
    assert_eq!(redelivered.id, id);
    assert_eq!(redelivered.as_str(), Some("fragile"));
    survivor.ack(id).await.unwrap();
    // The crashed consumer's late ack is harmless.
    producer.ack(id).await.unwrap();
}

#[tokio::test]
async fn scoped_failure_in_one_process_is_visible_to_another() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.db");

    let first = consumer(&path, "q").await;
    let second = consumer(&path, "q").await;
    first.send("retry me").await.unwrap();

    let err = first
        .with_message(|_| async { Err::<(), _>("downstream unavailable") })
        .await
        .unwrap_err();
    assert_eq!(err.into_processing(), Some("downstream unavailable"));

    let payload = second
        .with_message(|message| async move { Ok::<_, String>(message.payload) })
        .await
        .unwrap();
    assert_eq!(payload, b"retry me".to_vec());
    assert_eq!(first.counts().await.unwrap().total(), 0);
}
