//! End-to-end subscription, de-duplication and resample fan-out behaviour over the
//! in-memory transport double.

mod common;

use common::{MockTransport, binance_confirm, binance_kline, wait_for};
use klinecast_data::{
    Candle, ExchangeId, Interval, KlineStreams, MarketType, SessionState, StreamConfig,
    StreamEvent, SubscriptionKey,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn futures_key(interval: Interval) -> SubscriptionKey {
    SubscriptionKey::new(ExchangeId::Binance, "BTCUSDT", interval, MarketType::Futures)
}

async fn drain_candles(
    subscription: &mut klinecast_data::Subscription,
    count: usize,
) -> Vec<Candle> {
    let mut candles = Vec::with_capacity(count);
    for _ in 0..count {
        match subscription.next().await {
            Some(StreamEvent::Candle { candle, .. }) => candles.push(candle),
            other => panic!("expected candle event, got {other:?}"),
        }
    }
    candles
}

#[tokio::test(start_paused = true)]
async fn test_sub_minute_resample_fanout() {
    let mock = MockTransport::new();
    let streams = KlineStreams::with_transport(mock.clone(), StreamConfig::default());

    let mut subscription = streams.subscribe(futures_key(Interval::S15)).expect("subscribe");
    wait_for(|| mock.connects() == 1, "first connection").await;

    // The wire subscription rides a 1m stream regardless of the requested 15s interval
    wait_for(|| !mock.sent_messages().is_empty(), "subscribe request").await;
    mock.push(binance_confirm());
    wait_for(|| subscription.state() == SessionState::Active, "active state").await;

    mock.push(&binance_kline(1000, "100", "110", "95", "105", "60", true));
    let candles = drain_candles(&mut subscription, 4).await;

    assert_eq!(
        candles.iter().map(|candle| candle.time).collect::<Vec<_>>(),
        vec![1000, 1015, 1030, 1045]
    );
    assert_eq!(candles[0].open, dec!(100));
    assert_eq!(candles[3].close, dec!(105));

    let volume: Decimal = candles.iter().map(|candle| candle.volume).sum();
    assert_eq!(volume, dec!(60));

    let highs = candles.iter().filter(|candle| candle.high == dec!(110)).count();
    let lows = candles.iter().filter(|candle| candle.low == dec!(95)).count();
    assert_eq!((highs, lows), (1, 1));

    let closed: Vec<bool> = candles.iter().map(|candle| candle.closed).collect();
    assert_eq!(closed, vec![false, false, false, true]);
}

#[tokio::test(start_paused = true)]
async fn test_sub_minute_siblings_share_one_physical_session() {
    let mock = MockTransport::new();
    let streams = KlineStreams::with_transport(mock.clone(), StreamConfig::default());

    let mut five = streams.subscribe(futures_key(Interval::S5)).expect("subscribe 5s");
    let mut fifteen = streams.subscribe(futures_key(Interval::S15)).expect("subscribe 15s");

    wait_for(|| mock.connects() == 1, "shared connection").await;
    assert_eq!(streams.session_count(), 1);

    mock.push(binance_confirm());
    wait_for(|| five.state() == SessionState::Active, "active state").await;

    mock.push(&binance_kline(1000, "100", "110", "95", "105", "60", true));
    let five_candles = drain_candles(&mut five, 12).await;
    let fifteen_candles = drain_candles(&mut fifteen, 4).await;

    // Both series are derived from the same parent and agree on its envelope
    assert_eq!(five_candles[0].open, fifteen_candles[0].open);
    assert_eq!(five_candles[11].close, fifteen_candles[3].close);

    // Releasing one sibling keeps the shared session and its cache alive
    five.unsubscribe();
    assert_eq!(streams.session_count(), 1);

    mock.push(&binance_kline(1060, "105", "106", "104", "105.5", "30", true));
    let after = drain_candles(&mut fifteen, 4).await;
    assert_eq!(after[0].time, 1060);

    // Releasing the last sibling tears the transport down
    fifteen.unsubscribe();
    wait_for(|| streams.session_count() == 0, "session teardown").await;
    wait_for(|| mock.client_closed(), "transport close").await;

    // The teardown sent a best-effort unsubscribe before closing
    let sent = mock.sent_messages();
    assert!(
        sent.iter().any(|message| message.contains("UNSUBSCRIBE")),
        "expected an unsubscribe frame, got {sent:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn test_identical_key_subscribes_deduplicate() {
    let mock = MockTransport::new();
    let streams = KlineStreams::with_transport(mock.clone(), StreamConfig::default());

    let first = streams.subscribe(futures_key(Interval::S5)).expect("subscribe");
    let second = streams.subscribe(futures_key(Interval::S5)).expect("subscribe again");

    wait_for(|| mock.connects() == 1, "single connection").await;
    assert_eq!(streams.session_count(), 1);

    drop(first);
    drop(second);
    wait_for(|| streams.session_count() == 0, "session teardown").await;
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_parent_candles_are_not_re_emitted() {
    let mock = MockTransport::new();
    let streams = KlineStreams::with_transport(mock.clone(), StreamConfig::default());

    let mut subscription = streams.subscribe(futures_key(Interval::S15)).expect("subscribe");
    wait_for(|| mock.connects() == 1, "first connection").await;
    mock.push(binance_confirm());
    wait_for(|| subscription.state() == SessionState::Active, "active state").await;

    let parent = binance_kline(1000, "100", "110", "95", "105", "60", false);
    mock.push(&parent);
    drain_candles(&mut subscription, 4).await;

    // An identical open-bucket update must not desynchronise the chart with re-resampled
    // duplicates. Events are delivered in order, so if the duplicate had produced anything
    // the next batch would still close at 105 rather than 106.
    mock.push(&parent);
    mock.push(&binance_kline(1000, "100", "110", "95", "106", "60", false));
    let updated = drain_candles(&mut subscription, 4).await;
    assert_eq!(updated[0].time, 1000);
    assert_eq!(updated[3].close, dec!(106));
    assert!(subscription.try_next().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_malformed_frames_do_not_disturb_an_active_session() {
    let mock = MockTransport::new();
    let streams = KlineStreams::with_transport(mock.clone(), StreamConfig::default());

    let mut subscription = streams.subscribe(futures_key(Interval::M1)).expect("subscribe");
    wait_for(|| mock.connects() == 1, "first connection").await;
    mock.push(binance_confirm());
    wait_for(|| subscription.state() == SessionState::Active, "active state").await;

    // Garbage and unknown frames are logged and dropped without reconnecting
    mock.push("not json at all");
    mock.push(r#"{"stream": "btcusdt@depth", "data": {}}"#);

    mock.push(&binance_kline(1000, "100", "110", "95", "105", "60", true));
    let candles = drain_candles(&mut subscription, 1).await;
    assert_eq!(candles[0].close, dec!(105));

    assert_eq!(subscription.state(), SessionState::Active);
    assert_eq!(mock.connects(), 1);
}
