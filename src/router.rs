use log::{error, info};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::TableId;
use crate::config::RoutingConfig;
use crate::error::RoutingError;
use crate::network::{Topology, TopologyStore};
use crate::protocol::{EventDispatcher, TopologyEvent};
use crate::switch_commands::{LinkFeed, RuleSink, SwitchRegistry, run_pusher};

/// What other controller components (the load balancer) need from routing:
/// the table to chain a goto-table instruction into.
pub trait L3Routing {
    fn routing_table_id(&self) -> TableId;
}

#[derive(Debug, Clone)]
pub struct RoutingHandle {
    table: TableId,
    events: mpsc::Sender<TopologyEvent>,
    store: TopologyStore,
}

impl RoutingHandle {
    pub async fn submit(&self, event: TopologyEvent) -> Result<(), RoutingError> {
        self.events
            .send(event)
            .await
            .map_err(|_| RoutingError::QueueClosed)
    }

    /// Non-blocking submit for callers outside the runtime.
    pub fn try_submit(&self, event: TopologyEvent) -> Result<(), RoutingError> {
        self.events.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => RoutingError::QueueFull,
            TrySendError::Closed(_) => RoutingError::QueueClosed,
        })
    }

    pub async fn topology(&self) -> Topology {
        self.store.snapshot().await
    }
}

impl L3Routing for RoutingHandle {
    fn routing_table_id(&self) -> TableId {
        self.table
    }
}

/// Running routing engine: one dispatcher task and one rule pusher task.
pub struct RoutingEngine {
    handle: RoutingHandle,
    shutdown_tx: broadcast::Sender<()>,
    dispatcher_task: JoinHandle<()>,
    pusher_task: JoinHandle<()>,
}

impl RoutingEngine {
    pub async fn start(config: RoutingConfig, sink: Arc<dyn RuleSink>) -> Result<Self, RoutingError> {
        Self::launch(config, sink, None).await
    }

    /// Starts after loading switches and links from the collaborators.
    pub async fn start_with_resync(
        config: RoutingConfig,
        sink: Arc<dyn RuleSink>,
        registry: &dyn SwitchRegistry,
        feed: &dyn LinkFeed,
    ) -> Result<Self, RoutingError> {
        Self::launch(config, sink, Some((registry, feed))).await
    }

    async fn launch(
        config: RoutingConfig,
        sink: Arc<dyn RuleSink>,
        bootstrap: Option<(&dyn SwitchRegistry, &dyn LinkFeed)>,
    ) -> Result<Self, RoutingError> {
        config.validate()?;
        info!(
            "Starting routing engine on table {} (priority {})",
            config.table, config.priority
        );

        let store = TopologyStore::new();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(config.event_queue_depth);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let pusher_task = tokio::spawn(run_pusher(sink, command_rx));

        let mut dispatcher = EventDispatcher::new(&config, store.clone(), command_tx);
        if let Some((registry, feed)) = bootstrap {
            dispatcher.resync(registry, feed).await;
        }
        let dispatcher_task = tokio::spawn(dispatcher.run(event_rx, shutdown_rx));

        Ok(Self {
            handle: RoutingHandle {
                table: config.table,
                events: event_tx,
                store,
            },
            shutdown_tx,
            dispatcher_task,
            pusher_task,
        })
    }

    pub fn handle(&self) -> RoutingHandle {
        self.handle.clone()
    }

    /// Processes every queued event, flushes the resulting commands, then stops.
    pub async fn shutdown(self) {
        info!("Stopping routing engine");
        let _ = self.shutdown_tx.send(());

        if let Err(e) = self.dispatcher_task.await {
            error!("Dispatcher task failed: {}", e);
        }
        // the dispatcher owned the only command sender, so the pusher drains and exits
        if let Err(e) = self.pusher_task.await {
            error!("Rule pusher task failed: {}", e);
        }
    }
}

impl L3Routing for RoutingEngine {
    fn routing_table_id(&self) -> TableId {
        self.handle.table
    }
}
