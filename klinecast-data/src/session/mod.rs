//! Connection session: one physical WebSocket stream and its lifecycle state machine.
//!
//! A session owns exactly one connection (`connect -> await confirmation -> active`), the
//! timers attached to it (confirmation timeout, optional keepalive, read-idle watchdog,
//! reconnect backoff), and the fan-out to the logical consumers sharing its wire stream.
//! All exchange-specific behaviour is delegated to the
//! [`ProtocolTranslator`](crate::exchange::ProtocolTranslator); all lifecycle state lives
//! here, written once for every exchange.

use crate::{
    error::DataError,
    event::{Candle, StreamEvent},
    exchange::{self, Decoded, ExchangeId, ProtocolTranslator},
    registry::StreamConfig,
    resample::{SubMinuteSpan, resample},
    subscription::{Interval, MarketType, SubscriptionKey},
    transport::{Transport, WsMessage},
};
use fnv::FnvHashMap;
use futures_util::{SinkExt, StreamExt};
use itertools::Itertools;
use smol_str::SmolStr;
use std::{fmt, time::Duration};
use tokio::{
    sync::{mpsc, watch},
    time::{Instant, sleep},
};
use tracing::{debug, error, warn};

mod reconnect;
use reconnect::{Reconnect, ReconnectState};

/// Lifecycle state of a [`Session`], published on every transition.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SessionState {
    /// No connection. Initial state, and terminal after a graceful teardown.
    Idle,
    /// Opening the transport.
    Connecting,
    /// Transport open, subscribe request sent, waiting for the exchange to acknowledge.
    AwaitingConfirmation,
    /// Subscription confirmed; candle updates flow.
    Active,
    /// Tearing down after the last consumer unsubscribed or an explicit shutdown.
    Closing,
    /// Backing off before reconnect attempt `n`.
    Reconnecting(u32),
    /// Terminal: the reconnect ceiling was exceeded. Never retried.
    Abandoned,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::AwaitingConfirmation => write!(f, "awaiting_confirmation"),
            SessionState::Active => write!(f, "active"),
            SessionState::Closing => write!(f, "closing"),
            SessionState::Reconnecting(attempt) => write!(f, "reconnecting({attempt})"),
            SessionState::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// Commands accepted by a running [`Session`] in every state, including mid-backoff.
pub(crate) enum SessionCommand {
    AddConsumer {
        id: u64,
        key: SubscriptionKey,
        events: mpsc::UnboundedSender<StreamEvent>,
    },
    RemoveConsumer {
        id: u64,
    },
    Shutdown,
}

/// Static identity of the wire stream a [`Session`] maintains.
pub(crate) struct SessionSpec {
    pub exchange: ExchangeId,
    pub market: MarketType,
    pub wire_symbol: SmolStr,
    pub wire_interval: Interval,
}

struct Consumer {
    key: SubscriptionKey,
    tx: mpsc::UnboundedSender<StreamEvent>,
}

struct KeepAliveTimer {
    ticker: tokio::time::Interval,
    message: fn() -> WsMessage,
}

/// One physical connection plus its lifecycle state machine. Runs as a dedicated task; the
/// registry communicates exclusively through the command channel.
pub(crate) struct Session<T: Transport> {
    spec: SessionSpec,
    config: StreamConfig,
    transport: T,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    consumers: FnvHashMap<u64, Consumer>,
    state_tx: watch::Sender<SessionState>,
    reconnect: ReconnectState,
    /// Pending-1-minute cache feeding the resampler; replaced only on detected change.
    pending: Option<Candle>,
    on_terminate: Option<Box<dyn FnOnce() + Send>>,
}

impl<T: Transport> Session<T> {
    pub fn new(
        spec: SessionSpec,
        config: StreamConfig,
        transport: T,
        commands: mpsc::UnboundedReceiver<SessionCommand>,
        state_tx: watch::Sender<SessionState>,
        on_terminate: Box<dyn FnOnce() + Send>,
    ) -> Self {
        let reconnect = ReconnectState::new(config.backoff_base, config.reconnect_ceiling);
        Self {
            spec,
            config,
            transport,
            commands,
            consumers: FnvHashMap::default(),
            state_tx,
            reconnect,
            pending: None,
            on_terminate: Some(on_terminate),
        }
    }

    /// Drive the session until graceful teardown or abandonment.
    pub async fn run(mut self) {
        let translator = exchange::translator(self.spec.exchange);

        loop {
            self.set_state(SessionState::Connecting);
            match self.connect_and_stream(translator).await {
                Ok(()) => break,
                Err(error) => match self.reconnect.record_failure() {
                    Reconnect::RetryAfter(delay) => {
                        warn!(
                            %error,
                            attempts = self.reconnect.attempts(),
                            delay_secs = delay.as_secs(),
                            "connection failure, scheduling reconnect",
                        );
                        self.set_state(SessionState::Reconnecting(self.reconnect.attempts()));
                        if !self.wait_backoff(delay).await {
                            break;
                        }
                    }
                    Reconnect::Abandon => {
                        error!(
                            %error,
                            attempts = self.reconnect.attempts(),
                            "reconnect ceiling exceeded, abandoning session",
                        );
                        self.notify_abandoned();
                        self.finish(SessionState::Abandoned);
                        return;
                    }
                },
            }
        }

        self.finish(SessionState::Idle);
    }

    /// One full connection attempt: open, subscribe, then stream until shutdown (`Ok`) or a
    /// recoverable failure (`Err`).
    async fn connect_and_stream(
        &mut self,
        translator: &'static dyn ProtocolTranslator,
    ) -> Result<(), DataError> {
        let url = translator.url(self.spec.market)?;
        let io = self.transport.connect(&url).await?;
        let (mut sink, mut stream) = io.split();

        let subscribe = translator.subscribe_message(
            &self.spec.wire_symbol,
            self.spec.wire_interval,
            self.spec.market,
        )?;
        sink.send(subscribe)
            .await
            .map_err(|error| DataError::Transport(error.to_string()))?;
        self.set_state(SessionState::AwaitingConfirmation);

        let mut awaiting = true;
        let mut confirm_deadline = Box::pin(sleep(self.config.confirmation_timeout));
        let mut idle_deadline = Box::pin(sleep(self.config.read_idle_timeout));
        let mut keepalive = translator
            .keep_alive(self.spec.market)
            .map(|keep_alive| KeepAliveTimer {
                ticker: tokio::time::interval_at(
                    Instant::now() + keep_alive.period,
                    keep_alive.period,
                ),
                message: keep_alive.message,
            });

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(SessionCommand::AddConsumer { id, key, events }) => {
                        self.consumers.insert(id, Consumer { key, tx: events });
                    }
                    Some(SessionCommand::RemoveConsumer { id }) => self.remove_consumer(id),
                    Some(SessionCommand::Shutdown) | None => {
                        self.set_state(SessionState::Closing);
                        // Best-effort: the connection is going away either way
                        if let Ok(unsubscribe) = translator.unsubscribe_message(
                            &self.spec.wire_symbol,
                            self.spec.wire_interval,
                            self.spec.market,
                        ) {
                            let _ = sink.send(unsubscribe).await;
                        }
                        let _ = sink.close().await;
                        return Ok(());
                    }
                },

                _ = &mut confirm_deadline, if awaiting => {
                    return Err(DataError::ConfirmationTimeout(self.config.confirmation_timeout));
                }

                ping = async {
                    match keepalive.as_mut() {
                        Some(timer) => {
                            timer.ticker.tick().await;
                            timer.message
                        }
                        None => std::future::pending().await,
                    }
                } => {
                    sink.send(ping())
                        .await
                        .map_err(|error| DataError::Transport(error.to_string()))?;
                }

                frame = stream.next() => {
                    let frame = match frame {
                        Some(Ok(frame)) => frame,
                        Some(Err(error)) => return Err(DataError::Transport(error.to_string())),
                        None => return Err(DataError::Transport("stream ended".to_string())),
                    };

                    idle_deadline
                        .as_mut()
                        .reset(Instant::now() + self.config.read_idle_timeout);

                    match frame {
                        WsMessage::Ping(payload) => {
                            let _ = sink.send(WsMessage::Pong(payload)).await;
                        }
                        WsMessage::Pong(_) | WsMessage::Frame(_) => {}
                        WsMessage::Close(frame) => {
                            return Err(DataError::Transport(format!(
                                "connection closed by server: {frame:?}"
                            )));
                        }
                        message => match translator.decode(&message, self.spec.market) {
                            Decoded::SubscriptionConfirmed => {
                                if awaiting {
                                    awaiting = false;
                                    self.reconnect.confirm();
                                    self.set_state(SessionState::Active);
                                }
                            }
                            Decoded::SubscriptionFailed(reason) => {
                                return Err(DataError::SubscriptionRejected(reason));
                            }
                            Decoded::KeepAliveResponse => {}
                            Decoded::Candles(candles) => {
                                if awaiting {
                                    debug!(count = candles.len(), "candles before confirmation, ignoring");
                                } else {
                                    self.dispatch(candles);
                                }
                            }
                            Decoded::Unrecognized => {
                                debug!("unrecognized frame, dropping");
                            }
                        },
                    }
                }

                _ = &mut idle_deadline => {
                    return Err(DataError::Transport(format!(
                        "no data received for {:?}",
                        self.config.read_idle_timeout
                    )));
                }
            }
        }
    }

    /// Sleep out the backoff while staying responsive to commands. Returns `false` when the
    /// session was shut down mid-backoff, in which case no further attempt is made.
    async fn wait_backoff(&mut self, delay: Duration) -> bool {
        let mut retry = Box::pin(sleep(delay));

        loop {
            tokio::select! {
                _ = &mut retry => return true,
                command = self.commands.recv() => match command {
                    Some(SessionCommand::AddConsumer { id, key, events }) => {
                        self.consumers.insert(id, Consumer { key, tx: events });
                    }
                    Some(SessionCommand::RemoveConsumer { id }) => self.remove_consumer(id),
                    Some(SessionCommand::Shutdown) | None => return false,
                },
            }
        }
    }

    /// Route decoded candles to consumers: directly for the wire interval, via the
    /// change-detected pending cache and resampler for sub-minute intervals.
    fn dispatch(&mut self, candles: Vec<Candle>) {
        for candle in candles {
            if let Err(error) = candle.validate() {
                debug!(%error, "dropping invalid candle");
                continue;
            }
            self.emit(candle);
        }
    }

    fn emit(&mut self, candle: Candle) {
        for consumer in self.consumers.values() {
            if consumer.key.interval == self.spec.wire_interval {
                let _ = consumer.tx.send(StreamEvent::Candle {
                    key: consumer.key.clone(),
                    candle: candle.clone(),
                });
            }
        }

        let spans: Vec<SubMinuteSpan> = self
            .consumers
            .values()
            .filter_map(|consumer| consumer.key.interval.sub_minute_span())
            .unique()
            .collect();
        if spans.is_empty() {
            self.pending = None;
            return;
        }

        if !self.pending_changed(&candle) {
            return;
        }

        for span in spans {
            match resample(&candle, span) {
                Ok(synthetic) => {
                    for consumer in self.consumers.values() {
                        if consumer.key.interval.sub_minute_span() != Some(span) {
                            continue;
                        }
                        for sub_candle in &synthetic {
                            let _ = consumer.tx.send(StreamEvent::Candle {
                                key: consumer.key.clone(),
                                candle: sub_candle.clone(),
                            });
                        }
                    }
                }
                Err(error) => debug!(%error, %span, "resample rejected parent candle"),
            }
        }

        self.pending = Some(candle);
    }

    /// Change detection for the pending-1-minute cache: a candle is new when its bucket
    /// start, close price, or closed flag differs from the cached one.
    fn pending_changed(&self, candle: &Candle) -> bool {
        match &self.pending {
            None => true,
            Some(cached) => {
                cached.time != candle.time
                    || cached.close != candle.close
                    || cached.closed != candle.closed
            }
        }
    }

    fn remove_consumer(&mut self, id: u64) {
        self.consumers.remove(&id);
        let sub_minute_remaining = self
            .consumers
            .values()
            .any(|consumer| consumer.key.interval.sub_minute_span().is_some());
        if !sub_minute_remaining {
            self.pending = None;
        }
    }

    fn notify_abandoned(&mut self) {
        let reason = DataError::ReconnectCeilingExceeded {
            ceiling: self.reconnect.ceiling(),
        };
        for consumer in self.consumers.values() {
            let _ = consumer.tx.send(StreamEvent::Abandoned {
                key: consumer.key.clone(),
                reason: reason.clone(),
            });
        }
        self.consumers.clear();
    }

    fn finish(&mut self, state: SessionState) {
        self.pending = None;
        self.set_state(state);
        if let Some(on_terminate) = self.on_terminate.take() {
            on_terminate();
        }
    }

    fn set_state(&self, state: SessionState) {
        debug!(%state, "session state transition");
        self.state_tx.send_replace(state);
    }
}
