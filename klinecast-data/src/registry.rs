//! Subscription registry: the aggregation root mapping subscription keys to connection
//! sessions.
//!
//! De-duplicates identical subscriptions, collapses sub-minute siblings onto one shared `1m`
//! wire stream, reference-counts logical consumers, and tears a physical session down only
//! when its last consumer is gone. `subscribe`/`unsubscribe` never block on network I/O;
//! connection establishment happens asynchronously on the session task and the event stream
//! is the only completion signal.

use crate::{
    error::DataError,
    session::{Session, SessionCommand, SessionSpec, SessionState},
    subscription::{PhysicalKey, Subscription, SubscriptionKey},
    symbol,
    transport::{Transport, WsTransport},
};
use fnv::FnvHashMap;
use parking_lot::Mutex;
use smol_str::SmolStr;
use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tracing::{Instrument, debug, info_span};

/// Tunables shared by every session a [`KlineStreams`] spawns.
#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// How long to wait for a subscription acknowledgement before treating the attempt as
    /// failed.
    pub confirmation_timeout: Duration,
    /// Base reconnect backoff; the delay grows linearly with the attempt number.
    pub backoff_base: Duration,
    /// Consecutive failed attempts after which a session is abandoned.
    pub reconnect_ceiling: u32,
    /// Idle period without any inbound frame before the connection is considered dead.
    pub read_idle_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout: Duration::from_secs(10),
            backoff_base: Duration::from_secs(5),
            reconnect_ceiling: 10,
            read_idle_timeout: Duration::from_secs(120),
        }
    }
}

impl StreamConfig {
    /// Set the subscription confirmation timeout.
    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    /// Set the base reconnect backoff delay.
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Set the reconnect ceiling.
    pub fn with_reconnect_ceiling(mut self, ceiling: u32) -> Self {
        self.reconnect_ceiling = ceiling;
        self
    }

    /// Set the read-idle watchdog timeout.
    pub fn with_read_idle_timeout(mut self, timeout: Duration) -> Self {
        self.read_idle_timeout = timeout;
        self
    }
}

struct SessionEntry {
    commands: tokio::sync::mpsc::UnboundedSender<SessionCommand>,
    state_rx: tokio::sync::watch::Receiver<SessionState>,
    consumers: usize,
    generation: u64,
}

struct Inner<T> {
    transport: T,
    config: StreamConfig,
    sessions: Mutex<FnvHashMap<PhysicalKey, SessionEntry>>,
    ids: AtomicU64,
}

/// Entry point: normalised multi-exchange kline streams behind one subscribe/unsubscribe
/// surface.
///
/// Cheap to clone; all clones share the same session map. Must be used within a tokio
/// runtime, since every physical subscription runs as its own task.
#[derive(Clone)]
pub struct KlineStreams<T: Transport = WsTransport> {
    inner: Arc<Inner<T>>,
}

impl KlineStreams<WsTransport> {
    /// Construct with the default [`StreamConfig`] and production WebSocket transport.
    pub fn new() -> Self {
        Self::with_config(StreamConfig::default())
    }

    pub fn with_config(config: StreamConfig) -> Self {
        Self::with_transport(WsTransport, config)
    }
}

impl Default for KlineStreams<WsTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> KlineStreams<T> {
    /// Construct over a custom [`Transport`], used to exercise the full lifecycle against an
    /// in-memory connection double.
    pub fn with_transport(transport: T, config: StreamConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                config,
                sessions: Mutex::new(FnvHashMap::default()),
                ids: AtomicU64::new(1),
            }),
        }
    }

    /// Subscribe to one kline stream.
    ///
    /// A second subscribe for an identical key, or for a sub-minute sibling of an existing
    /// `1m` stream, reuses the existing physical session and only adds a logical consumer.
    /// Fails fast on symbols the normaliser cannot express; connection errors surface later
    /// on the event stream.
    pub fn subscribe(&self, key: SubscriptionKey) -> Result<Subscription, DataError> {
        let wire_symbol = symbol::to_wire(key.exchange, key.market, &key.symbol)?;
        let physical = key.physical();

        let (event_tx, event_rx) = tokio::sync::mpsc::unbounded_channel();
        let consumer_id = self.inner.ids.fetch_add(1, Ordering::Relaxed);

        let mut sessions = self.inner.sessions.lock();
        let entry = sessions
            .entry(physical.clone())
            .or_insert_with(|| self.spawn_session(&physical, wire_symbol.clone()));

        let add = SessionCommand::AddConsumer {
            id: consumer_id,
            key: key.clone(),
            events: event_tx,
        };
        if let Err(tokio::sync::mpsc::error::SendError(add)) = entry.commands.send(add) {
            // The backing task terminated between its teardown and our lock; replace it
            debug!(%key, "replacing terminated session");
            *entry = self.spawn_session(&physical, wire_symbol);
            entry
                .commands
                .send(add)
                .map_err(|_| DataError::Transport("session task unavailable".to_string()))?;
        }
        entry.consumers += 1;
        let state_rx = entry.state_rx.clone();
        drop(sessions);

        let releaser: Box<dyn FnOnce() + Send> = {
            let inner = Arc::downgrade(&self.inner);
            Box::new(move || {
                if let Some(inner) = inner.upgrade() {
                    release(&inner, &physical, consumer_id);
                }
            })
        };

        Ok(Subscription::new(key, event_rx, state_rx, releaser))
    }

    /// Subscribe to a batch of keys, failing on the first unsupported one.
    pub fn subscribe_all(
        &self,
        keys: impl IntoIterator<Item = SubscriptionKey>,
    ) -> Result<Vec<Subscription>, DataError> {
        keys.into_iter().map(|key| self.subscribe(key)).collect()
    }

    /// Number of live physical sessions.
    pub fn session_count(&self) -> usize {
        self.inner.sessions.lock().len()
    }

    /// Forcibly close every session, cancelling all timers and clearing all caches.
    ///
    /// Idempotent, and safe to call while sessions are mid-reconnect-backoff; a session told
    /// to shut down during backoff makes no further connection attempt.
    pub fn shutdown(&self) {
        let mut sessions = self.inner.sessions.lock();
        for (_, entry) in sessions.drain() {
            let _ = entry.commands.send(SessionCommand::Shutdown);
        }
    }

    fn spawn_session(&self, physical: &PhysicalKey, wire_symbol: SmolStr) -> SessionEntry {
        let generation = self.inner.ids.fetch_add(1, Ordering::Relaxed);
        let (command_tx, command_rx) = tokio::sync::mpsc::unbounded_channel();
        let (state_tx, state_rx) = tokio::sync::watch::channel(SessionState::Idle);

        let spec = SessionSpec {
            exchange: physical.exchange,
            market: physical.market,
            wire_symbol,
            wire_interval: physical.wire_interval,
        };

        // Self-removal on termination (abandonment, or shutdown racing a new subscriber);
        // generation-checked so a replacement entry under the same key is left alone
        let on_terminate: Box<dyn FnOnce() + Send> = {
            let inner = Arc::downgrade(&self.inner);
            let physical = physical.clone();
            Box::new(move || {
                if let Some(inner) = inner.upgrade() {
                    let mut sessions = inner.sessions.lock();
                    if sessions
                        .get(&physical)
                        .is_some_and(|entry| entry.generation == generation)
                    {
                        sessions.remove(&physical);
                    }
                }
            })
        };

        let session = Session::new(
            spec,
            self.inner.config.clone(),
            self.inner.transport.clone(),
            command_rx,
            state_tx,
            on_terminate,
        );

        let span = info_span!(
            "session",
            exchange = %physical.exchange,
            symbol = %physical.symbol,
            market = %physical.market,
            interval = %physical.wire_interval,
        );
        tokio::spawn(session.run().instrument(span));

        SessionEntry {
            commands: command_tx,
            state_rx,
            consumers: 0,
            generation,
        }
    }
}

/// Drop one logical consumer; tear the physical session down once none remain.
fn release<T>(inner: &Inner<T>, physical: &PhysicalKey, consumer_id: u64) {
    let mut sessions = inner.sessions.lock();
    if let Some(entry) = sessions.get_mut(physical) {
        let _ = entry.commands.send(SessionCommand::RemoveConsumer { id: consumer_id });
        entry.consumers = entry.consumers.saturating_sub(1);
        if entry.consumers == 0 {
            let _ = entry.commands.send(SessionCommand::Shutdown);
            sessions.remove(physical);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_match_lifecycle_contract() {
        let config = StreamConfig::default();
        assert_eq!(config.confirmation_timeout, Duration::from_secs(10));
        assert_eq!(config.backoff_base, Duration::from_secs(5));
        assert_eq!(config.reconnect_ceiling, 10);
        assert_eq!(config.read_idle_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_config_builder() {
        let config = StreamConfig::default()
            .with_confirmation_timeout(Duration::from_secs(3))
            .with_backoff_base(Duration::from_millis(250))
            .with_reconnect_ceiling(4)
            .with_read_idle_timeout(Duration::from_secs(30));

        assert_eq!(config.confirmation_timeout, Duration::from_secs(3));
        assert_eq!(config.backoff_base, Duration::from_millis(250));
        assert_eq!(config.reconnect_ceiling, 4);
        assert_eq!(config.read_idle_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_unsupported_symbol_fails_fast() {
        use crate::{
            exchange::ExchangeId,
            subscription::{Interval, MarketType},
        };

        // No session is spawned, so no runtime is required
        let streams = KlineStreams::new();
        let key = SubscriptionKey::new(ExchangeId::Okx, "NOTASYMBOL", Interval::M1, MarketType::Spot);
        assert!(matches!(
            streams.subscribe(key),
            Err(DataError::UnsupportedSymbol { .. })
        ));
        assert_eq!(streams.session_count(), 0);
    }
}
