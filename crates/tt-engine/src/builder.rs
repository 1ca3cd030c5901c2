//! Fluent builder for constructing a [`TrackingEngine`].

use std::sync::Arc;

use tt_core::{Clock, EngineConfig, SystemClock, TrackResult};
use tt_route::{NoSchedule, RouteCatalog, ScheduleCatalog};

use crate::{NoopObserver, TrackingEngine, TrackingObserver};

/// Fluent builder for [`TrackingEngine<O>`].
///
/// # Required inputs
///
/// - a [`RouteCatalog`] — geometry for every route a trip may start on
///
/// # Optional inputs (have defaults)
///
/// | Method           | Default                   |
/// |------------------|---------------------------|
/// | `.config(c)`     | `EngineConfig::default()` |
/// | `.schedule(s)`   | `NoSchedule` (no delays)  |
/// | `.clock(c)`      | `SystemClock`             |
/// | `.observer(o)`   | `NoopObserver`            |
///
/// # Example
///
/// ```rust,ignore
/// let engine = TrackingEngineBuilder::new(Arc::new(routes))
///     .schedule(Arc::new(schedule))
///     .observer(history)
///     .build()?;
/// ```
pub struct TrackingEngineBuilder<O: TrackingObserver = NoopObserver> {
    config:   EngineConfig,
    routes:   Arc<dyn RouteCatalog>,
    schedule: Arc<dyn ScheduleCatalog>,
    clock:    Arc<dyn Clock>,
    observer: O,
}

impl TrackingEngineBuilder<NoopObserver> {
    pub fn new(routes: Arc<dyn RouteCatalog>) -> Self {
        Self {
            config:   EngineConfig::default(),
            routes,
            schedule: Arc::new(NoSchedule),
            clock:    Arc::new(SystemClock),
            observer: NoopObserver,
        }
    }
}

impl<O: TrackingObserver> TrackingEngineBuilder<O> {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn schedule(mut self, schedule: Arc<dyn ScheduleCatalog>) -> Self {
        self.schedule = schedule;
        self
    }

    /// Inject the time source.  Tests pass a shared `ManualClock`.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the observer, changing the engine's observer type.
    pub fn observer<P: TrackingObserver>(self, observer: P) -> TrackingEngineBuilder<P> {
        TrackingEngineBuilder {
            config:   self.config,
            routes:   self.routes,
            schedule: self.schedule,
            clock:    self.clock,
            observer,
        }
    }

    /// Validate the configuration and return a ready engine.
    pub fn build(self) -> TrackResult<TrackingEngine<O>> {
        self.config.validate()?;
        Ok(TrackingEngine::from_parts(
            self.config,
            self.routes,
            self.schedule,
            self.clock,
            self.observer,
        ))
    }
}
