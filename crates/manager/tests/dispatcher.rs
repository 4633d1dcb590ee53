//! Dispatch loop behaviour against an in-process store and intake queue.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use common::{fast_retry, wait_until, worker_urls, FakeWorkers, AB_MD5};
use crackhash_core::protocol::{IntakeMessage, ResultReport, TaskAssignment, INTAKE_QUEUE, TASK_QUEUE};
use crackhash_core::queue::{JsonQueue, MessageQueue};
use crackhash_core::request::NewCrackRequest;
use crackhash_core::status::RequestStatus;
use crackhash_core::store::{MemoryRequestStore, RequestStore};
use crackhash_manager::delivery::TaskDelivery;
use crackhash_manager::engine::dispatcher::{Dispatcher, IntakeOutcome};
use crackhash_manager::pool::WorkerPool;
use crackhash_queue::MemoryQueue;

struct Harness {
    store: Arc<MemoryRequestStore>,
    intake: JsonQueue<IntakeMessage>,
    intake_raw: Arc<MemoryQueue>,
    dispatcher: Arc<Dispatcher>,
}

fn harness(delivery: TaskDelivery) -> Harness {
    let store = Arc::new(MemoryRequestStore::new(100));
    let intake_raw = Arc::new(MemoryQueue::new(INTAKE_QUEUE));
    let intake = JsonQueue::new(intake_raw.clone());
    let dispatcher = Dispatcher::new(store.clone(), intake.clone(), Arc::new(delivery))
        .with_poll_interval(Duration::from_millis(10));
    Harness {
        store,
        intake,
        intake_raw,
        dispatcher: Arc::new(dispatcher),
    }
}

fn direct(workers: Arc<FakeWorkers>, pool_size: usize) -> TaskDelivery {
    TaskDelivery::Direct {
        pool: Arc::new(WorkerPool::new(worker_urls(pool_size))),
        workers,
        retry: fast_retry(),
    }
}

async fn submit(h: &Harness, id: &str, part_count: u32) -> IntakeMessage {
    h.store
        .create(NewCrackRequest {
            request_id: id.to_string(),
            hash: AB_MD5.to_string(),
            max_length: 2,
            part_count,
            timeout_secs: 30_000,
        })
        .await
        .unwrap();
    let message = IntakeMessage {
        request_id: id.to_string(),
        hash: AB_MD5.to_string(),
        max_length: 2,
    };
    h.intake.push(&message).await.unwrap();
    message
}

async fn finish_all(store: &MemoryRequestStore, tasks: &[TaskAssignment]) {
    for task in tasks {
        store
            .update(&ResultReport::final_report(task, vec![]))
            .await
            .unwrap();
    }
}

async fn sent_count_reaches(workers: &Arc<FakeWorkers>, n: usize) -> bool {
    wait_until(Duration::from_secs(2), || {
        let workers = workers.clone();
        async move { workers.sent().len() == n }
    })
    .await
}

#[tokio::test]
async fn empty_intake_yields_nothing() {
    let h = harness(direct(FakeWorkers::new(), 2));
    let outcome = h
        .dispatcher
        .process_next(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome, None);
}

#[tokio::test]
async fn dispatches_one_part_per_worker_and_acks_when_ready() {
    let workers = FakeWorkers::new();
    let h = harness(direct(workers.clone(), 3));
    submit(&h, "req-1", 3).await;

    let dispatcher = h.dispatcher.clone();
    let running =
        tokio::spawn(async move { dispatcher.process_next(&CancellationToken::new()).await });

    assert!(sent_count_reaches(&workers, 3).await);
    let sent = workers.sent();
    let urls = worker_urls(3);
    for (url, task) in &sent {
        assert_eq!(url, &urls[task.part_number as usize]);
        assert_eq!(task.part_count, 3);
    }
    assert_eq!(
        h.store.get("req-1").await.unwrap().unwrap().status,
        RequestStatus::InProgress
    );

    let tasks: Vec<_> = sent.into_iter().map(|(_, t)| t).collect();
    finish_all(&h.store, &tasks).await;

    let outcome = running.await.unwrap().unwrap();
    assert_eq!(outcome, Some(IntakeOutcome::Dispatched(RequestStatus::Ready)));
    assert!(h.intake_raw.pull(true).await.unwrap().is_none());
}

#[tokio::test]
async fn redelivered_intake_is_not_dispatched_twice() {
    let workers = FakeWorkers::new();
    let h = harness(direct(workers.clone(), 2));
    let message = submit(&h, "req-dup", 2).await;

    let dispatcher = h.dispatcher.clone();
    let first =
        tokio::spawn(async move { dispatcher.process_next(&CancellationToken::new()).await });
    assert!(sent_count_reaches(&workers, 2).await);
    let tasks: Vec<_> = workers.sent().into_iter().map(|(_, t)| t).collect();
    finish_all(&h.store, &tasks).await;
    assert_eq!(
        first.await.unwrap().unwrap(),
        Some(IntakeOutcome::Dispatched(RequestStatus::Ready))
    );

    h.intake.push(&message).await.unwrap();
    let outcome = h
        .dispatcher
        .process_next(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome, Some(IntakeOutcome::Duplicate(RequestStatus::Ready)));
    assert_eq!(workers.sent().len(), 2);
}

#[tokio::test]
async fn intake_for_unknown_request_is_dropped() {
    let h = harness(direct(FakeWorkers::new(), 1));
    h.intake
        .push(&IntakeMessage {
            request_id: "ghost".into(),
            hash: AB_MD5.into(),
            max_length: 2,
        })
        .await
        .unwrap();

    let outcome = h
        .dispatcher
        .process_next(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome, Some(IntakeOutcome::Unknown));
    assert!(h.intake_raw.pull(true).await.unwrap().is_none());
}

#[tokio::test]
async fn failed_direct_delivery_moves_request_to_error() {
    let workers = FakeWorkers::new();
    workers.reject_tasks(true);
    let h = harness(direct(workers.clone(), 2));
    submit(&h, "req-fail", 2).await;

    let outcome = h
        .dispatcher
        .process_next(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome, Some(IntakeOutcome::Dispatched(RequestStatus::Error)));
    assert_eq!(
        h.store.get("req-fail").await.unwrap().unwrap().status,
        RequestStatus::Error
    );
}

#[tokio::test]
async fn queue_delivery_pushes_every_part() {
    let tasks_raw = Arc::new(MemoryQueue::new(TASK_QUEUE));
    let h = harness(TaskDelivery::Queue {
        tasks: JsonQueue::new(tasks_raw.clone()),
    });
    submit(&h, "req-q", 3).await;

    let dispatcher = h.dispatcher.clone();
    let running =
        tokio::spawn(async move { dispatcher.process_next(&CancellationToken::new()).await });

    let tasks: JsonQueue<TaskAssignment> = JsonQueue::new(tasks_raw.clone());
    let mut pulled = Vec::new();
    for _ in 0..200 {
        while let Some((task, _)) = tasks.pull(true).await.unwrap() {
            pulled.push(task);
        }
        if pulled.len() == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let mut parts: Vec<_> = pulled.iter().map(|t| t.part_number).collect();
    parts.sort_unstable();
    assert_eq!(parts, vec![0, 1, 2]);

    finish_all(&h.store, &pulled).await;
    assert_eq!(
        running.await.unwrap().unwrap(),
        Some(IntakeOutcome::Dispatched(RequestStatus::Ready))
    );
}

#[tokio::test]
async fn cancelled_wait_leaves_intake_unacknowledged() {
    let workers = FakeWorkers::new();
    let store = Arc::new(MemoryRequestStore::new(100));
    let intake_raw = Arc::new(MemoryQueue::with_visibility_timeout(
        INTAKE_QUEUE,
        Duration::from_millis(50),
    ));
    let intake: JsonQueue<IntakeMessage> = JsonQueue::new(intake_raw.clone());
    let dispatcher = Dispatcher::new(
        store.clone(),
        intake.clone(),
        Arc::new(direct(workers.clone(), 1)),
    )
    .with_poll_interval(Duration::from_millis(10));

    let h = Harness {
        store,
        intake,
        intake_raw: intake_raw.clone(),
        dispatcher: Arc::new(dispatcher),
    };
    submit(&h, "req-c", 1).await;

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let dispatcher = h.dispatcher.clone();
    let running = tokio::spawn(async move { dispatcher.process_next(&token).await });
    assert!(sent_count_reaches(&workers, 1).await);
    cancel.cancel();
    assert_eq!(running.await.unwrap().unwrap(), None);

    // The lease runs out and the message comes back.
    tokio::time::sleep(Duration::from_millis(80)).await;
    let redelivered = intake_raw.pull(true).await.unwrap().unwrap();
    assert!(redelivered.redelivered);
}

#[tokio::test]
async fn long_request_does_not_stall_other_replicas() {
    let workers = FakeWorkers::new();
    let store = Arc::new(MemoryRequestStore::new(100));
    let intake_raw = Arc::new(MemoryQueue::with_visibility_timeout(
        INTAKE_QUEUE,
        Duration::from_millis(50),
    ));
    let intake: JsonQueue<IntakeMessage> = JsonQueue::new(intake_raw.clone());
    let replica = || {
        Arc::new(
            Dispatcher::new(
                store.clone(),
                intake.clone(),
                Arc::new(direct(workers.clone(), 1)),
            )
            .with_poll_interval(Duration::from_millis(10)),
        )
    };
    let h = Harness {
        store: store.clone(),
        intake: intake.clone(),
        intake_raw,
        dispatcher: replica(),
    };
    let second = replica();

    let cancel = CancellationToken::new();
    for dispatcher in [h.dispatcher.clone(), second] {
        let token = cancel.clone();
        tokio::spawn(async move { dispatcher.run(token).await });
    }

    // "long" never finishes; its lease would have run out many times over.
    submit(&h, "long", 1).await;
    assert!(sent_count_reaches(&workers, 1).await);
    tokio::time::sleep(Duration::from_millis(300)).await;

    submit(&h, "next", 1).await;
    let dispatched = wait_until(Duration::from_secs(2), || {
        let store = store.clone();
        async move {
            store.get("next").await.unwrap().unwrap().status == RequestStatus::InProgress
        }
    })
    .await;
    cancel.cancel();

    assert!(dispatched, "second replica never picked up the next request");
    let sent = workers.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(
        sent.iter().filter(|(_, t)| t.request_id == "long").count(),
        1
    );
}
