//! Service orchestrator
//!
//! Owns the shared state and wires the pipeline: upstream streams feed
//! a single in-order tick queue, the consumer updates the processor,
//! runs the evaluator, and routes any alerts to the router and the
//! hub's alerts channel. Also spawns the periodic publisher and
//! persister. Everything observes one watch-based stop signal.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::alerts::AlertRouter;
use crate::config::MonitorConfig;
use crate::evaluator::AlertEvaluator;
use crate::hub::{BroadcastHub, Channel};
use crate::messages::ServerMessage;
use crate::metrics::MetricsTracker;
use crate::notify::{LogNotifier, WebhookNotifier};
use crate::persist::run_persister;
use crate::processor::DataProcessor;
use crate::publisher::run_publisher;
use crate::stream::{StreamConnection, TradeTick};

/// Depth of the shared tick queue between streams and the consumer.
const TICK_QUEUE_DEPTH: usize = 1024;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One tick through the full pipeline: record the trade, evaluate the
/// rules, record and publish any alerts.
pub async fn process_tick(
    processor: &Mutex<DataProcessor>,
    evaluator: &AlertEvaluator,
    router: &AlertRouter,
    hub: &BroadcastHub,
    tick: TradeTick,
) {
    let received_at = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();

    let alerts = {
        let mut processor = lock(processor);
        processor.process_trade(
            tick.symbol.clone(),
            tick.price,
            tick.quantity,
            received_at,
        );
        match processor.trade_window(&tick.symbol) {
            Some(window) => evaluator.evaluate(&tick.symbol, window),
            None => Vec::new(),
        }
    };

    for alert in alerts {
        if router.record(alert.clone()).await {
            hub.publish(Channel::Alerts, ServerMessage::alert(alert));
        }
    }
}

/// Top-level service: shared state plus the task set driving it.
pub struct MarketMonitor {
    config: MonitorConfig,
    processor: Arc<Mutex<DataProcessor>>,
    evaluator: AlertEvaluator,
    tracker: Arc<Mutex<MetricsTracker>>,
    router: Arc<AlertRouter>,
    hub: Arc<BroadcastHub>,
    stop_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl MarketMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        let mut router = AlertRouter::new(config.router.clone());
        router.add_handler(Box::new(LogNotifier));
        if let Some(url) = &config.webhook_url {
            router.add_handler(Box::new(WebhookNotifier::new(url.clone())));
        }

        let (stop_tx, _) = watch::channel(false);
        Self {
            processor: Arc::new(Mutex::new(DataProcessor::new(config.trade_window))),
            evaluator: AlertEvaluator::new(config.evaluator.clone()),
            tracker: Arc::new(Mutex::new(MetricsTracker::new(config.metrics.clone()))),
            router: Arc::new(router),
            hub: Arc::new(BroadcastHub::new()),
            stop_tx,
            tasks: Vec::new(),
            config,
        }
    }

    pub fn processor(&self) -> Arc<Mutex<DataProcessor>> {
        self.processor.clone()
    }

    pub fn tracker(&self) -> Arc<Mutex<MetricsTracker>> {
        self.tracker.clone()
    }

    pub fn router(&self) -> Arc<AlertRouter> {
        self.router.clone()
    }

    pub fn hub(&self) -> Arc<BroadcastHub> {
        self.hub.clone()
    }

    /// Spawn one stream per symbol, the tick consumer, the publisher
    /// and the persister.
    pub fn start(&mut self) {
        let (tick_tx, mut tick_rx) = mpsc::channel::<TradeTick>(TICK_QUEUE_DEPTH);

        for symbol in &self.config.symbols {
            let connection = StreamConnection::new(self.config.endpoint.clone(), symbol.clone());
            info!(symbol = %symbol, "Starting stream");
            self.tasks.push(tokio::spawn(
                connection.run(tick_tx.clone(), self.stop_tx.subscribe()),
            ));
        }
        drop(tick_tx);

        let processor = self.processor.clone();
        let evaluator = self.evaluator.clone();
        let router = self.router.clone();
        let hub = self.hub.clone();
        self.tasks.push(tokio::spawn(async move {
            while let Some(tick) = tick_rx.recv().await {
                process_tick(&processor, &evaluator, &router, &hub, tick).await;
            }
            info!("Tick consumer finished");
        }));

        self.tasks.push(tokio::spawn(run_publisher(
            self.processor.clone(),
            self.tracker.clone(),
            self.hub.clone(),
            self.config.publish_interval,
            self.stop_tx.subscribe(),
        )));

        self.tasks.push(tokio::spawn(run_persister(
            self.config.alerts_dir.clone(),
            self.config.metrics_dir.clone(),
            self.router.clone(),
            self.tracker.clone(),
            self.config.persist_interval,
            self.stop_tx.subscribe(),
        )));

        info!(symbols = self.config.symbols.len(), "Monitor started");
    }

    /// Signal shutdown and wait for every task to exit.
    pub async fn stop(mut self) {
        info!("Monitor stopping");
        let _ = self.stop_tx.send(true);
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "Task ended abnormally");
            }
        }
        info!("Monitor stopped");
    }
}
