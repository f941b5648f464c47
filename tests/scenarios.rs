use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use stationkit::{
    Bus, ConnectionState, EnableGate, Entity, EventKind, MemoryBroker, MemoryStore, Registry,
    RegistryConfig, Store, SupervisionConfig, Supervisor, WorkerError, WorkerFn, WorkerRef,
    WorkerState,
};

struct Station {
    store: Arc<MemoryStore>,
    broker: MemoryBroker,
    registry: Arc<Registry>,
}

async fn connected_station() -> Station {
    let store = Arc::new(MemoryStore::new());
    let broker = MemoryBroker::new();
    let registry = Registry::new(
        RegistryConfig::default(),
        store.clone(),
        Some(Arc::new(broker.client("station"))),
        Bus::new(64),
    );
    registry.start();
    registry
        .watch_connection()
        .wait_for(|s| *s == ConnectionState::Connected)
        .await
        .unwrap();
    Station {
        store,
        broker,
        registry,
    }
}

struct Counts {
    starts: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
}

fn counted(name: &'static str, fail_first: usize) -> (WorkerRef, Counts) {
    let starts = Arc::new(AtomicUsize::new(0));
    let stops = Arc::new(AtomicUsize::new(0));
    let (s, t) = (starts.clone(), stops.clone());
    let worker: WorkerRef = WorkerFn::arc(
        name,
        move |_ctx: CancellationToken| {
            let n = s.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < fail_first {
                    Err(WorkerError::fail("serial port busy"))
                } else {
                    Ok(())
                }
            }
        },
        move || {
            t.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, WorkerError>(()) }
        },
    );
    (worker, Counts { starts, stops })
}

#[tokio::test(start_paused = true)]
async fn confirmed_change_is_stored_and_published_retained() -> anyhow::Result<()> {
    let st = connected_station().await;
    let wifi = Entity::new("gpio/wifi", false)
        .persist()
        .publish()
        .require_ack()
        .into_ref();

    st.registry.register(&wifi).await?;
    assert_eq!(
        st.store.get_by_name("gpio/wifi").await?.as_deref(),
        Some("false")
    );

    wifi.request_change(true);
    assert!(!wifi.get());
    assert_eq!(wifi.pending(), Some(true));

    time::sleep(Duration::from_secs(2)).await;
    wifi.confirm_or_force(true);
    time::sleep(Duration::from_millis(10)).await;

    assert!(wifi.get());
    assert_eq!(wifi.pending(), None);
    assert_eq!(
        st.store.get_by_name("gpio/wifi").await?.as_deref(),
        Some("true")
    );
    let published = st
        .broker
        .retained("station/gpio/wifi")
        .ok_or_else(|| anyhow::anyhow!("nothing retained on station/gpio/wifi"))?;
    assert_eq!(published.payload, "true");
    assert!(published.retain);

    st.registry.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unconfirmed_change_expires_without_writes() -> anyhow::Result<()> {
    let st = connected_station().await;
    let wifi = Entity::new("gpio/wifi", false)
        .persist()
        .publish()
        .require_ack()
        .into_ref();
    st.registry.register(&wifi).await?;
    let published_before = st.broker.history().len();

    wifi.request_change(true);
    time::sleep(Duration::from_secs(6)).await;

    assert_eq!(wifi.pending(), None);
    assert!(!wifi.get());
    assert_eq!(
        st.store.get_by_name("gpio/wifi").await?.as_deref(),
        Some("false")
    );
    assert_eq!(st.broker.history().len(), published_before);
    assert!(st.broker.retained("station/gpio/wifi").is_none());

    st.registry.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn crashed_start_is_stopped_and_retried_on_next_tick() {
    let bus = Bus::new(64);
    let mut events = bus.subscribe();
    let (worker, counts) = counted("aprs", 1);
    let sup = Supervisor::new(worker, &SupervisionConfig::default(), bus);
    let token = CancellationToken::new();
    let driver = tokio::spawn({
        let (sup, token) = (sup.clone(), token.clone());
        async move { sup.run(token).await }
    });

    time::sleep(Duration::from_millis(10)).await;
    assert_eq!(counts.starts.load(Ordering::SeqCst), 1);
    assert_eq!(counts.stops.load(Ordering::SeqCst), 1);
    assert_ne!(sup.state(), WorkerState::Running);

    let mut failed = false;
    while let Ok(ev) = events.try_recv() {
        failed |= ev.kind == EventKind::WorkerFailed;
    }
    assert!(failed);

    time::sleep(Duration::from_secs(5)).await;
    assert_eq!(counts.starts.load(Ordering::SeqCst), 2);
    assert_eq!(sup.state(), WorkerState::Running);

    token.cancel();
    driver.await.unwrap();
    sup.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn gate_starts_once_when_enabled_and_stops_once_when_disabled() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let registry = Registry::new(RegistryConfig::default(), store, None, Bus::new(64));
    let (worker, counts) = counted("MeshtasticApp", 0);
    let gate = EnableGate::new(
        worker,
        false,
        &registry,
        &SupervisionConfig::default(),
        Bus::new(64),
    )
    .await?;
    let token = CancellationToken::new();
    let driver = tokio::spawn({
        let (gate, token) = (gate.clone(), token.clone());
        async move { gate.run(token).await }
    });

    time::sleep(Duration::from_secs(12)).await;
    assert_eq!(counts.starts.load(Ordering::SeqCst), 0);

    gate.enabled().request_change(true);
    time::sleep(Duration::from_secs(12)).await;
    assert_eq!(counts.starts.load(Ordering::SeqCst), 1);
    assert_eq!(gate.state(), WorkerState::Running);

    gate.enabled().request_change(false);
    time::sleep(Duration::from_secs(12)).await;
    assert_eq!(counts.stops.load(Ordering::SeqCst), 1);
    assert_eq!(counts.starts.load(Ordering::SeqCst), 1);
    assert_eq!(gate.state(), WorkerState::Stopped);

    token.cancel();
    driver.await?;
    registry.shutdown().await;
    Ok(())
}
