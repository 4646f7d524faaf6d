use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use pacekeeper_admission::{AdmissionController, AlertSink, OutcomeSink};
use pacekeeper_core_types::{PaceError, UserId};
use pacekeeper_counter_store::{keys, CounterStore, CounterStoreExt, MemoryStore};
use pacekeeper_emergency_stop::{spawn_resume_sweep, QueueDrain, StopCoordinator};
use pacekeeper_event_bus::{ControlEvent, InMemoryBus};
use pacekeeper_limits_center::InMemoryLimitsCenter;
use pacekeeper_safety_monitor::{spawn_eval_ticker, AlertCenter, SafetyMonitor};
use pacekeeper_scheduler::{
    spawn_workers, ActionExecutor, ContentProvider, PaceGate, Scheduler, SchedulerQueues,
    TokenProvider, WorkerContext,
};

use crate::admin::AdminOps;
use crate::config::{ConfigError, PaceKeeperConfig};

/// The assembled control plane. Construction wires every seam and
/// spawns the background tasks; nothing else in the system reaches
/// across crate boundaries except through the traits bound here.
pub struct PaceKeeper {
    store: Arc<dyn CounterStore>,
    bus: Arc<InMemoryBus<ControlEvent>>,
    limits: Arc<InMemoryLimitsCenter>,
    admission: Arc<AdmissionController>,
    monitor: Arc<SafetyMonitor>,
    coordinator: Arc<StopCoordinator>,
    queues: Arc<SchedulerQueues>,
    scheduler: Arc<Scheduler>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PaceKeeper {
    /// Builds and starts the service against an in-memory store.
    ///
    /// Wiring order matters: admission exists before the monitor that
    /// consumes its outcomes, the monitor before the coordinator it
    /// escalates to, and the coordinator before the scheduler whose
    /// queues it drains. The three late seams close those loops.
    pub fn start(
        config: PaceKeeperConfig,
        executor: Arc<dyn ActionExecutor>,
        tokens: Arc<dyn TokenProvider>,
        content: Arc<dyn ContentProvider>,
    ) -> Result<Arc<Self>, ConfigError> {
        let snapshot = config.resolve_limits()?;
        let store: Arc<dyn CounterStore> = Arc::new(MemoryStore::new());
        let bus = InMemoryBus::<ControlEvent>::new(config.event_bus_capacity);

        let limits = Arc::new(InMemoryLimitsCenter::new(snapshot, Arc::clone(&store)));
        let admission = Arc::new(AdmissionController::new(
            Arc::clone(&store),
            Arc::clone(&limits) as _,
        ));
        let alerts = Arc::new(AlertCenter::new(Arc::clone(&store), Arc::clone(&bus) as _));
        let monitor = Arc::new(SafetyMonitor::new(
            Arc::clone(&store),
            Arc::clone(&limits) as _,
            Arc::clone(&alerts),
        ));
        let coordinator = Arc::new(StopCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&bus) as _,
            Arc::clone(&admission),
            Arc::clone(&monitor),
        ));
        let queues = Arc::new(SchedulerQueues::new(
            Arc::clone(&store),
            Arc::clone(&bus) as _,
        ));
        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&store),
            Arc::clone(&limits) as _,
            Arc::clone(&admission),
            Arc::clone(&queues),
        ));

        // Late-bound seams closing the object cycles.
        admission.set_alert_sink(Arc::clone(&alerts) as Arc<dyn AlertSink>);
        admission.set_outcome_sink(Arc::clone(&monitor) as Arc<dyn OutcomeSink>);
        monitor.set_emergency(Arc::clone(&coordinator) as _);
        coordinator.set_drain(Arc::clone(&queues) as Arc<dyn QueueDrain>);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();
        tasks.push(spawn_eval_ticker(
            Arc::clone(&monitor),
            config.safety_eval_interval,
            shutdown_rx.clone(),
        ));
        tasks.push(spawn_resume_sweep(
            Arc::clone(&coordinator),
            config.resume_sweep_interval,
            shutdown_rx.clone(),
        ));
        tasks.push(spawn_purge_ticker(
            Arc::clone(&store),
            config.store_purge_interval,
            shutdown_rx.clone(),
        ));
        let worker_ctx = Arc::new(WorkerContext {
            limits: Arc::clone(&limits) as _,
            admission: Arc::clone(&admission),
            queues: Arc::clone(&queues),
            gate: Arc::new(PaceGate::new()),
            executor,
            tokens,
            content,
            poll_interval: config.queue_poll_interval,
        });
        tasks.extend(spawn_workers(worker_ctx, shutdown_rx));

        info!(target: "pacekeeper", "control plane started");
        Ok(Arc::new(Self {
            store,
            bus,
            limits,
            admission,
            monitor,
            coordinator,
            queues,
            scheduler,
            shutdown_tx,
            tasks: Mutex::new(tasks),
        }))
    }

    /// Registers a user on the automating roster; the safety ticker
    /// and system-wide stops enumerate this set.
    pub async fn enable_automation(&self, user: &UserId) -> Result<(), PaceError> {
        let joining = user.clone();
        self.store
            .update_typed::<Vec<UserId>, _>(keys::AUTOMATING, None, move |current| {
                let mut roster = current.unwrap_or_default();
                if !roster.contains(&joining) {
                    roster.push(joining);
                }
                Some(roster)
            })
            .await?;
        debug!(target: "pacekeeper", user = %user, "automation enabled");
        Ok(())
    }

    pub async fn disable_automation(&self, user: &UserId) -> Result<(), PaceError> {
        let leaving = user.clone();
        self.store
            .update_typed::<Vec<UserId>, _>(keys::AUTOMATING, None, move |current| {
                let mut roster = current.unwrap_or_default();
                roster.retain(|member| member != &leaving);
                Some(roster)
            })
            .await?;
        debug!(target: "pacekeeper", user = %user, "automation disabled");
        Ok(())
    }

    /// Privileged operations surface.
    pub fn admin(&self) -> AdminOps {
        AdminOps::new(
            Arc::clone(&self.limits),
            Arc::clone(&self.admission),
            Arc::clone(&self.coordinator),
        )
    }

    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }

    pub fn bus(&self) -> &Arc<InMemoryBus<ControlEvent>> {
        &self.bus
    }

    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    pub fn monitor(&self) -> &Arc<SafetyMonitor> {
        &self.monitor
    }

    pub fn coordinator(&self) -> &Arc<StopCoordinator> {
        &self.coordinator
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn queues(&self) -> &Arc<SchedulerQueues> {
        &self.queues
    }

    pub fn limits(&self) -> &Arc<InMemoryLimitsCenter> {
        &self.limits
    }

    /// Stops the background tasks and waits for them to exit.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let tasks: Vec<JoinHandle<()>> = {
            let mut guard = match self.tasks.lock() {
                Ok(guard) => guard,
                Err(_) => return,
            };
            guard.drain(..).collect()
        };
        for task in tasks {
            if let Err(err) = task.await {
                if !err.is_cancelled() {
                    warn!(target: "pacekeeper", error = %err, "background task panicked");
                }
            }
        }
        info!(target: "pacekeeper", "control plane stopped");
    }
}

fn spawn_purge_ticker(
    store: Arc<dyn CounterStore>,
    interval: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = tick.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => debug!(target: "pacekeeper", purged, "expired records purged"),
                Err(err) => warn!(target: "pacekeeper", error = %err, "purge failed"),
            }
        }
    })
}
