// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The seed-scenario machines (spec §8), wired to a real `tokio` runtime.
//! Each scenario is a small, self-contained demonstration of one facet of
//! the runtime: a linear pipeline, spawn-effect cancellation, a guard
//! cascade, reentering lifecycle hooks, journal replay, and wildcard
//! fallthrough.

use anyhow::Context;
use clap::ValueEnum;
use emx_core::{
    FakeClock, GuardExpr, HandlerContext, InspectEvent, InspectSink, Machine, MachineBuilder, Tag,
    Taggable, SyntheticEvent, SystemClock,
};
use emx_engine::cancel::TokioCancelSignal;
use emx_engine::{ActorRef, PersistenceConfig, PersistentActorRef, SnapshotSchedule};
use emx_storage::FileAdapter;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Scenario {
    Fetcher,
    Timer,
    Counter,
    Reenter,
    Restore,
    Wildcard,
}

/// Counts inspection events by type, so the demo can print the "exactly one
/// stop" property seed scenario 1 asserts.
#[derive(Default)]
struct CountingSink {
    stops: AtomicUsize,
}

impl InspectSink for CountingSink {
    fn on_inspect(&self, event: InspectEvent) {
        if matches!(event, InspectEvent::Stop { .. }) {
            self.stops.fetch_add(1, Ordering::Relaxed);
        }
    }
}

async fn settle(rx: &mut tokio::sync::watch::Receiver<impl Clone>, timeout: Duration) {
    let _ = tokio::time::timeout(timeout, rx.changed()).await;
}

pub async fn run(scenario: Scenario, state_dir: &Path) -> anyhow::Result<()> {
    match scenario {
        Scenario::Fetcher => fetcher().await,
        Scenario::Timer => timer().await,
        Scenario::Counter => counter().await,
        Scenario::Reenter => reenter().await,
        Scenario::Restore => restore(state_dir).await,
        Scenario::Wildcard => wildcard().await,
    }
}

fn handler<S, E, R>(f: impl Fn(HandlerContext<S, E, R>) -> S + Send + Sync + 'static) -> emx_core::TransitionHandler<S, E, R>
where
    S: Send + 'static,
{
    Arc::new(move |ctx| {
        let next = f(ctx);
        Box::pin(async move { next })
    })
}

// ---------------------------------------------------------------------
// Scenario 1: Fetcher
// ---------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
enum FetcherState {
    Idle,
    Loading { url: String },
    Success { data: String },
    Error { msg: String },
}

impl Taggable for FetcherState {
    fn tag(&self) -> Tag {
        Tag::from(match self {
            FetcherState::Idle => "Idle",
            FetcherState::Loading { .. } => "Loading",
            FetcherState::Success { .. } => "Success",
            FetcherState::Error { .. } => "Error",
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
enum FetcherEvent {
    Init,
    Enter,
    Fetch { url: String },
    Resolve { data: String },
    Reject { msg: String },
    Reset,
}

impl Taggable for FetcherEvent {
    fn tag(&self) -> Tag {
        Tag::from(match self {
            FetcherEvent::Init => emx_core::INIT_EVENT,
            FetcherEvent::Enter => emx_core::ENTER_EVENT,
            FetcherEvent::Fetch { .. } => "Fetch",
            FetcherEvent::Resolve { .. } => "Resolve",
            FetcherEvent::Reject { .. } => "Reject",
            FetcherEvent::Reset => "Reset",
        })
    }
}

impl SyntheticEvent for FetcherEvent {
    fn init_event() -> Self {
        FetcherEvent::Init
    }
    fn enter_event() -> Self {
        FetcherEvent::Enter
    }
}

fn fetcher_machine() -> Machine<FetcherState, FetcherEvent, ActorRef<FetcherState, FetcherEvent>, TokioCancelSignal> {
    MachineBuilder::new(FetcherState::Idle)
        .on(
            "Idle",
            "Fetch",
            handler(|ctx: HandlerContext<FetcherState, FetcherEvent, ActorRef<FetcherState, FetcherEvent>>| match ctx.event {
                FetcherEvent::Fetch { url } => FetcherState::Loading { url },
                _ => ctx.state,
            }),
        )
        .on(
            "Loading",
            "Resolve",
            handler(|ctx: HandlerContext<FetcherState, FetcherEvent, ActorRef<FetcherState, FetcherEvent>>| match ctx.event {
                FetcherEvent::Resolve { data } => FetcherState::Success { data },
                _ => ctx.state,
            }),
        )
        .on(
            "Loading",
            "Reject",
            handler(|ctx: HandlerContext<FetcherState, FetcherEvent, ActorRef<FetcherState, FetcherEvent>>| match ctx.event {
                FetcherEvent::Reject { msg } => FetcherState::Error { msg },
                _ => ctx.state,
            }),
        )
        .final_state("Success")
        .final_state("Error")
        .build()
}

async fn fetcher() -> anyhow::Result<()> {
    let sink = Arc::new(CountingSink::default());
    let actor = ActorRef::spawn("fetcher-demo", fetcher_machine(), sink.clone(), Arc::new(SystemClock))
        .context("fetcher machine is fully provisioned")?;

    let mut rx = actor.changes();
    actor.send_checked(FetcherEvent::Fetch { url: "/a".to_string() })?;
    settle(&mut rx, Duration::from_secs(1)).await;
    actor.send_checked(FetcherEvent::Resolve { data: "ok".to_string() })?;
    settle(&mut rx, Duration::from_secs(1)).await;

    tokio::time::sleep(Duration::from_millis(20)).await;
    let final_state = actor.snapshot_sync();
    println!("fetcher final state: {}", serde_json::to_string(&final_state)?);
    println!("stop events observed: {}", sink.stops.load(Ordering::Relaxed));
    actor.stop().await;
    Ok(())
}

// ---------------------------------------------------------------------
// Scenario 2: Timer spawn cancellation
// ---------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
enum TimerState {
    Running,
    Stopped,
}

impl Taggable for TimerState {
    fn tag(&self) -> Tag {
        Tag::from(match self {
            TimerState::Running => "Running",
            TimerState::Stopped => "Stopped",
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
enum TimerEvent {
    Init,
    Enter,
    Stop,
    Tick,
}

impl Taggable for TimerEvent {
    fn tag(&self) -> Tag {
        Tag::from(match self {
            TimerEvent::Init => emx_core::INIT_EVENT,
            TimerEvent::Enter => emx_core::ENTER_EVENT,
            TimerEvent::Stop => "Stop",
            TimerEvent::Tick => "Tick",
        })
    }
}

impl SyntheticEvent for TimerEvent {
    fn init_event() -> Self {
        TimerEvent::Init
    }
    fn enter_event() -> Self {
        TimerEvent::Enter
    }
}

fn timer_machine() -> Machine<TimerState, TimerEvent, ActorRef<TimerState, TimerEvent>, TokioCancelSignal> {
    MachineBuilder::new(TimerState::Running)
        .on("Running", "Stop", handler(|_ctx| TimerState::Stopped))
        .final_state("Stopped")
        .spawn(
            "Running",
            Arc::new(|_ctx, signal: TokioCancelSignal| {
                Box::pin(async move {
                    info!("start");
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_secs(10)) => {
                            info!("done");
                        }
                        _ = signal.cancelled() => {
                            info!("interrupted");
                        }
                    }
                })
            }),
        )
        .build()
}

async fn timer() -> anyhow::Result<()> {
    let actor = ActorRef::spawn("timer-demo", timer_machine(), Arc::new(emx_core::NullSink), Arc::new(SystemClock))
        .context("timer machine is fully provisioned")?;

    tokio::time::sleep(Duration::from_millis(50)).await;
    actor.send_checked(TimerEvent::Stop)?;
    actor.stop().await;

    println!("timer final state: {}", serde_json::to_string(&actor.snapshot_sync())?);
    println!("(check RUST_LOG=info output above for start/interrupted, no done)");
    Ok(())
}

// ---------------------------------------------------------------------
// Scenario 3: Counter with guard
// ---------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
struct CounterState {
    tag: String,
    count: i64,
}

impl Taggable for CounterState {
    fn tag(&self) -> Tag {
        Tag::from(self.tag.clone())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
enum CounterEvent {
    Init,
    Enter,
    Inc,
    Finish,
}

impl Taggable for CounterEvent {
    fn tag(&self) -> Tag {
        Tag::from(match self {
            CounterEvent::Init => emx_core::INIT_EVENT,
            CounterEvent::Enter => emx_core::ENTER_EVENT,
            CounterEvent::Inc => "Inc",
            CounterEvent::Finish => "Finish",
        })
    }
}

impl SyntheticEvent for CounterEvent {
    fn init_event() -> Self {
        CounterEvent::Init
    }
    fn enter_event() -> Self {
        CounterEvent::Enter
    }
}

fn counter_machine() -> anyhow::Result<Machine<CounterState, CounterEvent, ActorRef<CounterState, CounterEvent>, TokioCancelSignal>> {
    let machine = MachineBuilder::new(CounterState { tag: "Counting".to_string(), count: 0 })
        .guard_slot("underLimit")
        .on_guarded(
            "Counting",
            "Inc",
            GuardExpr::named("underLimit"),
            handler(|ctx: HandlerContext<CounterState, CounterEvent, ActorRef<CounterState, CounterEvent>>| CounterState {
                tag: "Counting".to_string(),
                count: ctx.state.count + 1,
            }),
        )
        .on(
            "Counting",
            "Finish",
            handler(|ctx: HandlerContext<CounterState, CounterEvent, ActorRef<CounterState, CounterEvent>>| CounterState {
                tag: "Done".to_string(),
                count: ctx.state.count,
            }),
        )
        .final_state("Done")
        .build();

    let mut guards: HashMap<String, emx_core::GuardHandler<CounterState, CounterEvent, ActorRef<CounterState, CounterEvent>>> =
        HashMap::new();
    guards.insert(
        "underLimit".to_string(),
        Arc::new(|_params, ctx: HandlerContext<CounterState, CounterEvent, ActorRef<CounterState, CounterEvent>>| {
            Box::pin(async move { ctx.state.count < 3 })
        }),
    );
    machine
        .provide(guards, HashMap::new())
        .map_err(|err| anyhow::anyhow!("counter machine's guard slots are not fully provided: {err}"))
}

async fn counter() -> anyhow::Result<()> {
    let actor = ActorRef::spawn("counter-demo", counter_machine()?, Arc::new(emx_core::NullSink), Arc::new(SystemClock))
        .context("counter machine is fully provisioned")?;

    for event in [CounterEvent::Inc, CounterEvent::Inc, CounterEvent::Inc, CounterEvent::Inc, CounterEvent::Finish] {
        actor.send_checked(event)?;
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    actor.stop().await;

    println!("counter final state: {}", serde_json::to_string(&actor.snapshot_sync())?);
    Ok(())
}

// ---------------------------------------------------------------------
// Scenario 4: Reenter
// ---------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
struct FormState {
    tag: String,
    name: String,
    count: i64,
}

impl Taggable for FormState {
    fn tag(&self) -> Tag {
        Tag::from(self.tag.clone())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
enum FormEvent {
    Init,
    Enter,
    SetName { name: String },
}

impl Taggable for FormEvent {
    fn tag(&self) -> Tag {
        Tag::from(match self {
            FormEvent::Init => emx_core::INIT_EVENT,
            FormEvent::Enter => emx_core::ENTER_EVENT,
            FormEvent::SetName { .. } => "SetName",
        })
    }
}

impl SyntheticEvent for FormEvent {
    fn init_event() -> Self {
        FormEvent::Init
    }
    fn enter_event() -> Self {
        FormEvent::Enter
    }
}

fn reenter_machine(log: Arc<parking_lot::Mutex<Vec<String>>>) -> Machine<FormState, FormEvent, ActorRef<FormState, FormEvent>, TokioCancelSignal> {
    let entry_log = log.clone();
    MachineBuilder::new(FormState { tag: "Form".to_string(), name: String::new(), count: 0 })
        .reenter(
            "Form",
            "SetName",
            handler(move |ctx: HandlerContext<FormState, FormEvent, ActorRef<FormState, FormEvent>>| match ctx.event {
                FormEvent::SetName { name } => FormState { tag: "Form".to_string(), name, count: ctx.state.count + 1 },
                _ => ctx.state,
            }),
        )
        .spawn(
            "Form",
            Arc::new(move |ctx: HandlerContext<FormState, FormEvent, ActorRef<FormState, FormEvent>>, signal: TokioCancelSignal| {
                let log = entry_log.clone();
                Box::pin(async move {
                    log.lock().push(format!("enter:{}", ctx.state.tag()));
                    signal.cancelled().await;
                    log.lock().push(format!("exit:{}", "Form"));
                })
            }),
        )
        .build()
}

async fn reenter() -> anyhow::Result<()> {
    let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let actor = ActorRef::spawn("reenter-demo", reenter_machine(log.clone()), Arc::new(emx_core::NullSink), Arc::new(SystemClock))
        .context("reenter machine is fully provisioned")?;

    actor.send_checked(FormEvent::SetName { name: "ada".to_string() })?;
    tokio::time::sleep(Duration::from_millis(20)).await;
    actor.stop().await;

    println!("reenter effect log: {:?}", log.lock().clone());
    Ok(())
}

// ---------------------------------------------------------------------
// Scenario 5: Persistence restore
// ---------------------------------------------------------------------

fn restore_machine() -> Machine<FetcherState, FetcherEvent, PersistentActorRef<FetcherState, FetcherEvent>, TokioCancelSignal> {
    MachineBuilder::new(FetcherState::Idle)
        .on(
            "Idle",
            "Fetch",
            handler(|ctx: HandlerContext<FetcherState, FetcherEvent, PersistentActorRef<FetcherState, FetcherEvent>>| match ctx.event {
                FetcherEvent::Fetch { url } => FetcherState::Loading { url },
                _ => ctx.state,
            }),
        )
        .on(
            "Loading",
            "Resolve",
            handler(|ctx: HandlerContext<FetcherState, FetcherEvent, PersistentActorRef<FetcherState, FetcherEvent>>| match ctx.event {
                FetcherEvent::Resolve { data } => FetcherState::Success { data },
                _ => ctx.state,
            }),
        )
        .final_state("Success")
        .build()
}

async fn restore(state_dir: &Path) -> anyhow::Result<()> {
    let adapter = Arc::new(FileAdapter::new(state_dir.join("restore-demo")));
    let config = PersistenceConfig::new(state_dir.join("restore-demo")).with_snapshot_schedule(SnapshotSchedule::Manual);

    let actor = PersistentActorRef::spawn(
        "restore-demo",
        restore_machine(),
        adapter.clone(),
        config.clone(),
        Arc::new(emx_core::NullSink),
        Arc::new(FakeClock::new(0)),
    )
    .context("restore machine is fully provisioned")?;

    let mut rx = actor.changes();
    actor.send_checked(FetcherEvent::Fetch { url: "/a".to_string() })?;
    settle(&mut rx, Duration::from_secs(1)).await;
    actor.send_checked(FetcherEvent::Resolve { data: "ok".to_string() })?;
    settle(&mut rx, Duration::from_secs(1)).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    actor.stop().await;

    let restored = PersistentActorRef::restore(
        "restore-demo",
        restore_machine(),
        adapter,
        config,
        Arc::new(emx_core::NullSink),
        Arc::new(FakeClock::new(0)),
    )
    .await?
    .context("a persisted actor exists after the journal was written")?;

    println!("restored state: {}", serde_json::to_string(&restored.snapshot_sync())?);
    println!("restored version: {}", restored.version());
    restored.stop().await;
    Ok(())
}

// ---------------------------------------------------------------------
// Scenario 6: Wildcard transition
// ---------------------------------------------------------------------

fn wildcard_machine() -> Machine<FetcherState, FetcherEvent, ActorRef<FetcherState, FetcherEvent>, TokioCancelSignal> {
    MachineBuilder::new(FetcherState::Idle)
        .on(
            "Idle",
            "Fetch",
            handler(|ctx: HandlerContext<FetcherState, FetcherEvent, ActorRef<FetcherState, FetcherEvent>>| match ctx.event {
                FetcherEvent::Fetch { url } => FetcherState::Loading { url },
                _ => ctx.state,
            }),
        )
        .on(
            "Loading",
            "Resolve",
            handler(|ctx: HandlerContext<FetcherState, FetcherEvent, ActorRef<FetcherState, FetcherEvent>>| match ctx.event {
                FetcherEvent::Resolve { data } => FetcherState::Success { data },
                _ => ctx.state,
            }),
        )
        // A concrete handler for "Success + Reset" that reports via the
        // error field of its own state, so the demo can show it wins over
        // the wildcard below even though the wildcard is the one registered
        // last in source order (spec §8 scenario 6: concrete beats wildcard).
        .on(
            "Success",
            "Reset",
            handler(|_ctx| FetcherState::Error { msg: "reset from Success (concrete match)".to_string() }),
        )
        // Registered after every concrete `Reset` handler, so it only wins
        // when no concrete transition matches — e.g. from `Idle`.
        .on_any("Reset", handler(|_ctx| FetcherState::Idle))
        .build()
}

async fn wildcard() -> anyhow::Result<()> {
    let actor = ActorRef::spawn("wildcard-demo", wildcard_machine(), Arc::new(emx_core::NullSink), Arc::new(SystemClock))
        .context("wildcard machine is fully provisioned")?;

    actor.send_checked(FetcherEvent::Reset)?;
    tokio::time::sleep(Duration::from_millis(20)).await;
    println!("Reset from Idle (wildcard wins, no concrete match): {}", serde_json::to_string(&actor.snapshot_sync())?);

    actor.send_checked(FetcherEvent::Fetch { url: "/a".to_string() })?;
    tokio::time::sleep(Duration::from_millis(20)).await;
    actor.send_checked(FetcherEvent::Resolve { data: "ok".to_string() })?;
    tokio::time::sleep(Duration::from_millis(20)).await;
    println!("before reset: {}", serde_json::to_string(&actor.snapshot_sync())?);

    actor.send_checked(FetcherEvent::Reset)?;
    tokio::time::sleep(Duration::from_millis(20)).await;
    println!("Reset from Success (concrete handler wins over wildcard): {}", serde_json::to_string(&actor.snapshot_sync())?);

    actor.stop().await;
    Ok(())
}
