use super::*;
use crate::cancel::TokioCancelSignal;
use emx_core::{FakeClock, Machine, MachineBuilder, NullSink, Tag};
use emx_storage::InMemoryAdapter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct LedgerState {
    tag: String,
    total: i64,
}

impl LedgerState {
    fn new(tag: &str, total: i64) -> Self {
        Self { tag: tag.to_string(), total }
    }
}

impl Taggable for LedgerState {
    fn tag(&self) -> Tag {
        Tag::from(self.tag.clone())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
enum LedgerEvent {
    Init,
    Enter,
    Deposit(i64),
}

impl Taggable for LedgerEvent {
    fn tag(&self) -> Tag {
        match self {
            LedgerEvent::Init => Tag::from(emx_core::INIT_EVENT),
            LedgerEvent::Enter => Tag::from(emx_core::ENTER_EVENT),
            LedgerEvent::Deposit(_) => Tag::from("Deposit"),
        }
    }
}

impl SyntheticEvent for LedgerEvent {
    fn init_event() -> Self {
        LedgerEvent::Init
    }
    fn enter_event() -> Self {
        LedgerEvent::Enter
    }
}

fn ledger_machine() -> Machine<LedgerState, LedgerEvent, PersistentActorRef<LedgerState, LedgerEvent>, TokioCancelSignal> {
    MachineBuilder::new(LedgerState::new("Open", 0))
        .on("Open", "Deposit", Arc::new(|ctx: emx_core::HandlerContext<LedgerState, LedgerEvent, PersistentActorRef<LedgerState, LedgerEvent>>| {
            Box::pin(async move {
                let amount = match ctx.event {
                    LedgerEvent::Deposit(amount) => amount,
                    _ => 0,
                };
                LedgerState::new("Open", ctx.state.total + amount)
            })
        }))
        .build()
}

async fn await_total(actor: &PersistentActorRef<LedgerState, LedgerEvent>, target: i64) {
    let mut rx = actor.changes();
    loop {
        if rx.borrow().total == target {
            return;
        }
        if tokio::time::timeout(Duration::from_secs(1), rx.changed()).await.is_err() {
            panic!("timed out waiting for total {target}, last seen {:?}", rx.borrow().clone());
        }
    }
}

#[tokio::test]
async fn restore_replays_journaled_events_and_preserves_version() {
    let adapter: Arc<InMemoryAdapter<LedgerState, LedgerEvent>> = Arc::new(InMemoryAdapter::new());
    let config = PersistenceConfig::new("unused-for-in-memory").with_snapshot_schedule(SnapshotSchedule::Manual);

    let actor = PersistentActorRef::spawn(
        "ledger-1",
        ledger_machine(),
        adapter.clone(),
        config.clone(),
        Arc::new(NullSink),
        Arc::new(FakeClock::new(0)),
    )
    .expect("provisioned machine spawns");

    actor.send_checked(LedgerEvent::Deposit(10)).unwrap();
    actor.send_checked(LedgerEvent::Deposit(5)).unwrap();
    await_total(&actor, 15).await;
    assert_eq!(actor.version(), 2);

    actor.stop().await;

    let restored = PersistentActorRef::restore(
        "ledger-1",
        ledger_machine(),
        adapter.clone(),
        config,
        Arc::new(NullSink),
        Arc::new(FakeClock::new(0)),
    )
    .await
    .expect("restore succeeds")
    .expect("a persisted actor exists");

    assert_eq!(restored.snapshot_sync().total, 15);
    assert_eq!(restored.version(), 2);

    restored.stop().await;
}

#[tokio::test]
async fn restore_of_an_unknown_id_yields_no_persisted_actor() {
    let adapter: Arc<InMemoryAdapter<LedgerState, LedgerEvent>> = Arc::new(InMemoryAdapter::new());
    let config = PersistenceConfig::new("unused-for-in-memory");

    let restored = PersistentActorRef::restore(
        "never-existed",
        ledger_machine(),
        adapter,
        config,
        Arc::new(NullSink),
        Arc::new(FakeClock::new(0)),
    )
    .await
    .expect("restore does not error on a missing stream");

    assert!(restored.is_none());
}

#[tokio::test]
async fn persist_now_writes_a_snapshot_independent_of_the_schedule() {
    let adapter: Arc<InMemoryAdapter<LedgerState, LedgerEvent>> = Arc::new(InMemoryAdapter::new());
    let config = PersistenceConfig::new("unused-for-in-memory").with_snapshot_schedule(SnapshotSchedule::Manual);

    let actor = PersistentActorRef::spawn(
        "ledger-2",
        ledger_machine(),
        adapter.clone(),
        config,
        Arc::new(NullSink),
        Arc::new(FakeClock::new(0)),
    )
    .expect("provisioned machine spawns");

    actor.send_checked(LedgerEvent::Deposit(7)).unwrap();
    await_total(&actor, 7).await;

    actor.persist_now().await.expect("synchronous snapshot write succeeds");

    let snapshot = adapter.load_snapshot("ledger-2").await.unwrap().expect("snapshot was written");
    assert_eq!(snapshot.state.total, 7);
    assert_eq!(snapshot.version, 1);

    actor.stop().await;
}

#[tokio::test]
async fn scheduled_snapshot_fires_after_the_configured_event_count() {
    let adapter: Arc<InMemoryAdapter<LedgerState, LedgerEvent>> = Arc::new(InMemoryAdapter::new());
    let config = PersistenceConfig::new("unused-for-in-memory").with_snapshot_schedule(SnapshotSchedule::EveryEvents(2));

    let actor = PersistentActorRef::spawn(
        "ledger-3",
        ledger_machine(),
        adapter.clone(),
        config,
        Arc::new(NullSink),
        Arc::new(FakeClock::new(0)),
    )
    .expect("provisioned machine spawns");

    actor.send_checked(LedgerEvent::Deposit(1)).unwrap();
    actor.send_checked(LedgerEvent::Deposit(1)).unwrap();
    await_total(&actor, 2).await;

    // Give the loop a beat to have run the due-check after the second event.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let snapshot = adapter.load_snapshot("ledger-3").await.unwrap().expect("scheduled snapshot was written");
    assert_eq!(snapshot.version, 2);

    actor.stop().await;
}
