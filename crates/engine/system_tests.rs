use super::*;
use crate::cancel::TokioCancelSignal;
use emx_core::{FakeClock, Machine, MachineBuilder, NullSink, Tag};
use emx_storage::InMemoryAdapter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct WidgetState {
    tag: String,
}

impl WidgetState {
    fn new(tag: &str) -> Self {
        Self { tag: tag.to_string() }
    }
}

impl Taggable for WidgetState {
    fn tag(&self) -> Tag {
        Tag::from(self.tag.clone())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
enum WidgetEvent {
    Init,
    Enter,
    Advance,
}

impl Taggable for WidgetEvent {
    fn tag(&self) -> Tag {
        match self {
            WidgetEvent::Init => Tag::from(emx_core::INIT_EVENT),
            WidgetEvent::Enter => Tag::from(emx_core::ENTER_EVENT),
            WidgetEvent::Advance => Tag::from("Advance"),
        }
    }
}

impl SyntheticEvent for WidgetEvent {
    fn init_event() -> Self {
        WidgetEvent::Init
    }
    fn enter_event() -> Self {
        WidgetEvent::Enter
    }
}

fn widget_machine() -> Machine<WidgetState, WidgetEvent, PersistentActorRef<WidgetState, WidgetEvent>, TokioCancelSignal> {
    MachineBuilder::new(WidgetState::new("Idle"))
        .machine_type("widget")
        .on("Idle", "Advance", Arc::new(|_ctx: emx_core::HandlerContext<WidgetState, WidgetEvent, PersistentActorRef<WidgetState, WidgetEvent>>| {
            Box::pin(async move { WidgetState::new("Advanced") })
        }))
        .build()
}

fn new_system() -> (ActorSystem<WidgetState, WidgetEvent>, Arc<InMemoryAdapter<WidgetState, WidgetEvent>>) {
    let adapter = Arc::new(InMemoryAdapter::new());
    let system = ActorSystem::new(
        adapter.clone(),
        PersistenceConfig::new("unused-for-in-memory"),
        Arc::new(NullSink),
        Arc::new(FakeClock::new(0)),
    );
    (system, adapter)
}

#[tokio::test]
async fn spawn_refuses_a_duplicate_id() {
    let (system, _adapter) = new_system();

    system.spawn("widget-1", widget_machine()).expect("first spawn succeeds");
    let err = system.spawn("widget-1", widget_machine()).unwrap_err();
    assert!(matches!(err, ActorError::DuplicateActor(id) if id == "widget-1"));

    system.shutdown().await;
}

#[tokio::test]
async fn get_returns_a_registered_actor_and_none_after_stop() {
    let (system, _adapter) = new_system();

    system.spawn("widget-2", widget_machine()).expect("spawn succeeds");
    assert!(system.get("widget-2").is_some());

    system.stop("widget-2").await;
    assert!(system.get("widget-2").is_none());
}

#[tokio::test]
async fn restore_all_requires_a_machine_type() {
    let (system, _adapter) = new_system();

    let untyped: Machine<WidgetState, WidgetEvent, PersistentActorRef<WidgetState, WidgetEvent>, TokioCancelSignal> =
        MachineBuilder::new(WidgetState::new("Idle"))
            .on("Idle", "Advance", Arc::new(|_ctx: emx_core::HandlerContext<WidgetState, WidgetEvent, PersistentActorRef<WidgetState, WidgetEvent>>| {
                Box::pin(async move { WidgetState::new("Advanced") })
            }))
            .build();

    let err = system.restore_all(untyped).await.unwrap_err();
    assert!(matches!(err, ActorError::InvalidConfiguration(_)));
}

#[tokio::test]
async fn restore_all_restores_every_persisted_actor_of_the_matching_type() {
    let (system, adapter) = new_system();

    let a = system.spawn("widget-3", widget_machine()).expect("spawn succeeds");
    let b = system.spawn("widget-4", widget_machine()).expect("spawn succeeds");
    a.send_checked(WidgetEvent::Advance).unwrap();
    b.send_checked(WidgetEvent::Advance).unwrap();
    // Give both loops a beat to commit the transition and write metadata.
    tokio::time::sleep(Duration::from_millis(20)).await;

    system.shutdown().await;
    assert!(system.get("widget-3").is_none());

    let report = system.restore_all(widget_machine()).await.expect("restore_all succeeds");
    assert_eq!(report.failed.len(), 0);
    let mut restored = report.restored.clone();
    restored.sort();
    assert_eq!(restored, vec!["widget-3".to_string(), "widget-4".to_string()]);

    assert!(system.get("widget-3").is_some());
    assert!(system.get("widget-4").is_some());

    system.shutdown().await;
    drop(adapter);
}

#[tokio::test]
async fn restore_many_reports_ids_with_no_persisted_state_as_neither_restored_nor_failed() {
    let (system, _adapter) = new_system();

    let ids = vec!["ghost-1".to_string(), "ghost-2".to_string()];
    let report = system.restore_many(&ids, widget_machine()).await;

    assert!(report.restored.is_empty());
    assert!(report.failed.is_empty());
}
