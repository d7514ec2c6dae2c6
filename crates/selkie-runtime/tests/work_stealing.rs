//! End-to-end work-stealing dispatcher scenarios

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use selkie_core::error::Result;
use selkie_runtime::{
    Actor, ActorContext, ActorRef, DispatcherConfig, WorkStealingDispatcher,
};

/// Actor that sleeps for a configured time per message and counts hits
struct SlowWorker {
    delay_ms: u64,
    hits: Arc<AtomicU32>,
}

#[async_trait]
impl Actor for SlowWorker {
    type Msg = u32;
    type Reply = u32;

    async fn receive(
        &mut self,
        _ctx: &mut ActorContext<u32, u32>,
        msg: u32,
    ) -> Result<Option<u32>> {
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        self.hits.fetch_add(1, Ordering::SeqCst);
        Ok(Some(msg * 2))
    }
}

fn slow_worker(name: &str, delay_ms: u64) -> (ActorRef<u32, u32>, Arc<AtomicU32>) {
    let hits = Arc::new(AtomicU32::new(0));
    let actor = ActorRef::spawn(
        name,
        SlowWorker {
            delay_ms,
            hits: hits.clone(),
        },
    );
    (actor, hits)
}

async fn wait_until(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_donation_under_contention() {
    let mut dispatcher = WorkStealingDispatcher::new(
        DispatcherConfig::new("donation").with_workers(4),
    )
    .unwrap();

    let (busy, busy_hits) = slow_worker("busy", 200);
    let (idle, idle_hits) = slow_worker("idle", 0);
    dispatcher.register(&busy).unwrap();
    dispatcher.register(&idle).unwrap();
    dispatcher.start().unwrap();

    let started = Instant::now();
    for n in 0..10 {
        busy.send(n).unwrap();
    }

    let all_processed = wait_until(
        || busy_hits.load(Ordering::SeqCst) + idle_hits.load(Ordering::SeqCst) == 10,
        Duration::from_millis(600),
    )
    .await;
    let elapsed = started.elapsed();

    assert!(all_processed, "all 10 messages must be consumed");
    assert!(
        idle_hits.load(Ordering::SeqCst) >= 8,
        "idle peer should take most of the donated work, got {}",
        idle_hits.load(Ordering::SeqCst)
    );
    assert!(elapsed <= Duration::from_millis(600), "took {:?}", elapsed);

    dispatcher.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_thief_fallback() {
    let mut dispatcher = WorkStealingDispatcher::new(
        DispatcherConfig::new("no-thief").with_workers(4),
    )
    .unwrap();

    let (only, hits) = slow_worker("only", 100);
    dispatcher.register(&only).unwrap();
    dispatcher.start().unwrap();

    let started = Instant::now();
    for n in 0..3 {
        only.send(n).unwrap();
    }

    let all_processed = wait_until(
        || hits.load(Ordering::SeqCst) == 3,
        Duration::from_millis(600),
    )
    .await;
    let elapsed = started.elapsed();

    assert!(all_processed, "all 3 messages must be consumed");
    // Serial processing: three sleeps back to back, no donation possible
    assert!(elapsed >= Duration::from_millis(280), "took {:?}", elapsed);
    assert_eq!(only.mailbox_len(), 0);

    dispatcher.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_donated_asks_still_complete() {
    let mut dispatcher = WorkStealingDispatcher::new(
        DispatcherConfig::new("donated-asks").with_workers(4),
    )
    .unwrap();

    let (busy, busy_hits) = slow_worker("busy", 100);
    let (idle, idle_hits) = slow_worker("idle", 0);
    dispatcher.register(&busy).unwrap();
    dispatcher.register(&idle).unwrap();
    dispatcher.start().unwrap();

    let futures: Vec<_> = (0..6).map(|n| busy.ask(n).unwrap()).collect();

    let mut replies = Vec::new();
    for future in futures {
        replies.push(future.recv().await.unwrap());
    }

    // Every reply slot completed with a doubled value, including the donated
    // envelopes processed by the idle peer
    let mut doubled: Vec<u32> = replies.into_iter().map(|r| r.unwrap()).collect();
    doubled.sort_unstable();
    assert_eq!(doubled, vec![0, 2, 4, 6, 8, 10]);
    assert_eq!(
        busy_hits.load(Ordering::SeqCst) + idle_hits.load(Ordering::SeqCst),
        6
    );

    dispatcher.shutdown();
}

/// Actor that tracks how many workers are inside its receive at once
struct ExclusionProbe {
    active: Arc<AtomicU32>,
    max_active: Arc<AtomicU32>,
    hits: Arc<AtomicU32>,
}

#[async_trait]
impl Actor for ExclusionProbe {
    type Msg = u32;
    type Reply = u32;

    async fn receive(
        &mut self,
        _ctx: &mut ActorContext<u32, u32>,
        _msg: u32,
    ) -> Result<Option<u32>> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(1)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.hits.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mutual_exclusion_per_actor() {
    let mut dispatcher = WorkStealingDispatcher::new(
        DispatcherConfig::new("exclusion").with_workers(4),
    )
    .unwrap();

    let mut actors = Vec::new();
    let mut probes = Vec::new();
    let hits = Arc::new(AtomicU32::new(0));
    for i in 0..2 {
        let max_active = Arc::new(AtomicU32::new(0));
        let actor = ActorRef::spawn(
            format!("probe-{}", i),
            ExclusionProbe {
                active: Arc::new(AtomicU32::new(0)),
                max_active: max_active.clone(),
                hits: hits.clone(),
            },
        );
        dispatcher.register(&actor).unwrap();
        actors.push(actor);
        probes.push(max_active);
    }
    dispatcher.start().unwrap();

    for n in 0..50 {
        actors[(n % 2) as usize].send(n).unwrap();
    }

    let all_processed = wait_until(
        || hits.load(Ordering::SeqCst) == 50,
        Duration::from_secs(5),
    )
    .await;
    assert!(all_processed, "all 50 messages must be consumed");

    for max_active in probes {
        assert_eq!(
            max_active.load(Ordering::SeqCst),
            1,
            "at most one worker may drain an actor at any instant"
        );
    }

    dispatcher.shutdown();
}
