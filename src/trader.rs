use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::Instrument;

use crate::cache::{IncrementalCache, WindowSpec};
use crate::config::Config;
use crate::ensemble::{self, Ensemble, EstimatorSpec, TrainOptions};
use crate::error::{classify, AppError};
use crate::features::{get_target, FeaturePipeline};
use crate::lifecycle::{LifecycleEvent, PositionLifecycleEngine};
use crate::model::bar::{column, timestamps, PriceField};
use crate::model::{Bar, Signal};
use crate::notify::{Identity, Notifier};
use crate::signals::{SignalModel, SignalSettings};
use crate::source::BarSource;
use crate::status_store::{StatusDocument, StatusStore};

/// Time source for the poll loop.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Time left until the next point on the grid `anchor + k * interval`.
/// Ticks missed by a slow poll are skipped rather than run back to back.
fn until_next_tick(anchor: DateTime<Utc>, interval: Duration, now: DateTime<Utc>) -> Duration {
    let period = interval.as_millis().max(1) as i64;
    let elapsed = (now - anchor).num_milliseconds().max(0);
    Duration::from_millis((period - elapsed % period) as u64)
}

/// Resolves once `true` is published. A dropped sender never resolves.
async fn shutdown_requested(mut rx: watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

/// [`BarSource`] that retries retryable failures with a fixed delay.
///
/// Exhausting the attempts, or a shutdown during the delay, yields a
/// `Network` error for the caller's current cycle.
pub struct RetryingSource<'a, S, C> {
    inner: &'a S,
    clock: &'a C,
    policy: RetryPolicy,
    shutdown: watch::Receiver<bool>,
}

impl<'a, S: BarSource, C: Clock> RetryingSource<'a, S, C> {
    pub fn new(inner: &'a S, clock: &'a C, policy: RetryPolicy, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            inner,
            clock,
            policy,
            shutdown,
        }
    }
}

impl<S: BarSource, C: Clock> BarSource for RetryingSource<'_, S, C> {
    async fn get_bars(&self, symbol: &str, lookback: Duration, interval: &str) -> Result<Vec<Bar>> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let err = match self.inner.get_bars(symbol, lookback, interval).await {
                Ok(bars) => return Ok(bars),
                Err(e) => e,
            };
            let retryable = classify(&err).is_some_and(AppError::is_retryable);
            if !retryable {
                return Err(err);
            }
            if attempt >= self.policy.max_attempts {
                return Err(AppError::Network(format!(
                    "giving up on {} after {} attempts: {:#}",
                    symbol, attempt, err
                ))
                .into());
            }
            tracing::warn!(
                symbol,
                attempt,
                max_attempts = self.policy.max_attempts,
                delay_ms = self.policy.delay.as_millis() as u64,
                error = %err,
                "fetch failed, retrying"
            );
            tokio::select! {
                _ = self.clock.sleep(self.policy.delay) => {}
                _ = shutdown_requested(self.shutdown.clone()) => {
                    return Err(AppError::Network(format!(
                        "shutdown while retrying fetch for {}",
                        symbol
                    ))
                    .into());
                }
            }
        }
    }
}

/// Everything produced by one training run.
#[derive(Debug)]
pub struct TrainedModel {
    pub ensemble: Ensemble,
    pub signals: SignalModel,
    pub trained_at: DateTime<Utc>,
}

/// Outcome of one poll.
#[derive(Debug, Clone, PartialEq)]
pub struct PollOutcome {
    pub timestamp_ms: u64,
    pub price: f64,
    pub signal: Signal,
    pub event: Option<LifecycleEvent>,
}

/// One symbol's signal pipeline: training, polling and position tracking.
pub struct Trader<S, N, C> {
    symbol: String,
    interval: String,
    source: S,
    notifier: N,
    clock: C,
    pipeline: FeaturePipeline,
    cache: IncrementalCache,
    estimator: EstimatorSpec,
    train_options: TrainOptions,
    signal_settings: SignalSettings,
    training_window: WindowSpec,
    live_window: WindowSpec,
    retry: RetryPolicy,
    poll_interval: Duration,
    retrain_every: Option<Duration>,
    thresholds_path: PathBuf,
    channel: String,
    identity: Identity,
    status: Option<Box<dyn StatusStore>>,
    engine: PositionLifecycleEngine,
    model: Option<TrainedModel>,
    last_signal: Option<Signal>,
    shutdown: watch::Receiver<bool>,
    span: tracing::Span,
}

impl<S: BarSource, N: Notifier, C: Clock> Trader<S, N, C> {
    pub fn new(config: &Config, source: S, notifier: N, clock: C) -> Result<Self> {
        let symbol = config.exchange.symbol.trim().to_ascii_uppercase();
        let pipeline = FeaturePipeline::new(config.indicators.clone())?;
        let (_, shutdown) = watch::channel(false);
        let span = tracing::info_span!("trader", symbol = %symbol);
        Ok(Self {
            interval: config.exchange.interval.clone(),
            source,
            notifier,
            clock,
            pipeline,
            cache: IncrementalCache::new(crate::cache::BarCache::new(config.cache.dir.clone())),
            estimator: config.trader.estimator.clone(),
            train_options: config.train_options(),
            signal_settings: config.signal,
            training_window: config.training_window(),
            live_window: config.live_window(),
            retry: RetryPolicy::new(config.exchange.fetch_max_attempts, config.exchange.retry_delay()),
            poll_interval: config.poll_interval(),
            retrain_every: config.retrain_every(),
            thresholds_path: config.thresholds_path(&symbol),
            channel: config.notify.channel.clone(),
            identity: config.notify.identity(),
            status: None,
            engine: PositionLifecycleEngine::default(),
            model: None,
            last_signal: None,
            shutdown,
            span,
            symbol,
        })
    }

    pub fn with_status_store(mut self, store: Box<dyn StatusStore>) -> Self {
        self.status = Some(store);
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn engine(&self) -> &PositionLifecycleEngine {
        &self.engine
    }

    pub fn model(&self) -> Option<&TrainedModel> {
        self.model.as_ref()
    }

    /// Last successfully computed signal; unchanged by failed polls.
    pub fn last_signal(&self) -> Option<Signal> {
        self.last_signal
    }

    fn fetcher(&self) -> RetryingSource<'_, S, C> {
        RetryingSource::new(&self.source, &self.clock, self.retry, self.shutdown.clone())
    }

    /// Refresh the training window, fit the ensemble and the signal thresholds.
    pub async fn train(&mut self) -> Result<()> {
        let span = self.span.clone();
        self.train_inner().instrument(span).await
    }

    async fn train_inner(&mut self) -> Result<()> {
        let now = self.clock.now();
        let (bars, mode) = self
            .cache
            .refresh(&self.fetcher(), &self.symbol, &self.interval, &self.training_window, now)
            .await
            .context("refreshing training window")?;

        let features = self.pipeline.feature_matrix(&bars)?;
        if features.is_empty() {
            return Err(AppError::Data(format!(
                "{} training bars produced no complete feature rows",
                bars.len()
            ))
            .into());
        }
        let targets = get_target(
            &timestamps(&bars),
            &column(&bars, PriceField::Close),
            &self.train_options.horizons,
        )?;
        let estimator = self.estimator.build(self.train_options.seed);
        let ensemble = ensemble::train(&features, &targets, estimator.as_ref(), &self.train_options)
            .context("training ensemble")?;
        let (signals, tagged) = SignalModel::fit(&ensemble.stacked_oof()?, self.signal_settings)?;

        match SignalModel::load(&self.thresholds_path) {
            Ok(Some(previous)) if previous != signals => tracing::info!(
                previous = ?previous.thresholds(),
                current = ?signals.thresholds(),
                "signal thresholds moved since the last training"
            ),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "ignoring unreadable saved signal thresholds"),
        }
        if let Err(e) = signals.save(&self.thresholds_path) {
            tracing::warn!(error = %e, path = %self.thresholds_path.display(), "failed to persist signal thresholds");
        }
        tracing::info!(
            bars = bars.len(),
            refresh = ?mode,
            feature_rows = features.len(),
            horizons = ?ensemble.horizons(),
            training_signal = ?tagged.last_signal().map(|(_, s)| s),
            "training complete"
        );
        self.model = Some(TrainedModel {
            ensemble,
            signals,
            trained_at: now,
        });
        Ok(())
    }

    /// Refresh the live window and push the newest signal through the engine.
    pub async fn poll_once(&mut self) -> Result<PollOutcome> {
        let span = self.span.clone();
        self.poll_inner().instrument(span).await
    }

    async fn poll_inner(&mut self) -> Result<PollOutcome> {
        let now = self.clock.now();
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| AppError::Model("poll before training".to_string()))?;
        let (bars, _) = self
            .cache
            .refresh(&self.fetcher(), &self.symbol, &self.interval, &self.live_window, now)
            .await
            .context("refreshing live window")?;

        let features = self.pipeline.feature_matrix(&bars)?;
        let predictions = model.ensemble.predict(&features)?;
        let tagged = model.signals.predict(&predictions)?;
        let (timestamp_ms, signal) = tagged.last_signal().ok_or_else(|| {
            AppError::Data(format!("{} live bars produced no predictions", bars.len()))
        })?;
        let price = bars
            .binary_search_by_key(&timestamp_ms, |b| b.timestamp_ms)
            .map(|i| bars[i].close)
            .map_err(|_| AppError::Data(format!("no bar at {}", timestamp_ms)))?;

        self.last_signal = Some(signal);
        let event = self.engine.on_signal(signal, price, timestamp_ms);
        tracing::debug!(timestamp_ms, price, %signal, state = %self.engine.state(), "polled");
        if let Some(event) = &event {
            self.publish(event).await;
        }
        Ok(PollOutcome {
            timestamp_ms,
            price,
            signal,
            event,
        })
    }

    async fn publish(&self, event: &LifecycleEvent) {
        let text = event.message(&self.symbol);
        tracing::info!(position_id = event.position_id(), state = %self.engine.state(), "{}", text);
        if let Err(e) = self.notifier.send(&self.channel, &text, &self.identity).await {
            tracing::warn!(error = %e, "notification failed");
        }
        let Some(store) = &self.status else {
            return;
        };
        let doc = StatusDocument::for_event(
            &self.symbol,
            self.engine.state(),
            event,
            self.engine.transactions(),
        );
        if let Some(doc) = doc {
            if let Err(e) = store.append(&doc) {
                tracing::warn!(error = %e, "status document append failed");
            }
        }
    }

    fn retrain_due(&self, now: DateTime<Utc>) -> bool {
        let (Some(every), Some(model)) = (self.retrain_every, &self.model) else {
            return false;
        };
        (now - model.trained_at).to_std().is_ok_and(|elapsed| elapsed >= every)
    }

    /// Train if needed, then poll until `shutdown` publishes `true`.
    ///
    /// Only configuration errors end the loop early; other failures keep the
    /// previous model and signal in force.
    pub async fn run(&mut self, shutdown: watch::Receiver<bool>) -> Result<()> {
        self.shutdown = shutdown;
        if self.model.is_none() {
            self.train().await.context("initial training")?;
        }
        tracing::info!(symbol = %self.symbol, poll_secs = self.poll_interval.as_secs(), "trader started");

        let anchor = self.clock.now();
        loop {
            if *self.shutdown.borrow() {
                break;
            }
            if self.retrain_due(self.clock.now()) {
                if let Err(e) = self.train().await {
                    if classify(&e).is_some_and(AppError::is_fatal) {
                        return Err(e);
                    }
                    tracing::warn!(symbol = %self.symbol, error = %e, "retraining failed, keeping previous model");
                }
            }
            if let Err(e) = self.poll_once().await {
                if classify(&e).is_some_and(AppError::is_fatal) {
                    return Err(e);
                }
                tracing::warn!(
                    symbol = %self.symbol,
                    error = %e,
                    last_signal = ?self.last_signal,
                    "poll failed, keeping last signal"
                );
            }
            let wait = until_next_tick(anchor, self.poll_interval, self.clock.now());
            tokio::select! {
                _ = self.clock.sleep(wait) => {}
                _ = shutdown_requested(self.shutdown.clone()) => break,
            }
        }
        tracing::info!(symbol = %self.symbol, state = %self.engine.state(), "trader stopped");
        Ok(())
    }
}
