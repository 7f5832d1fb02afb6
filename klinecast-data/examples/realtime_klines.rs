use klinecast_data::{
    ExchangeId, Interval, KlineStreams, MarketType, StreamEvent, SubscriptionKey,
};

#[tokio::main]
async fn main() {
    // Initialise INFO Tracing log subscriber
    init_logging();

    let streams = KlineStreams::new();

    // One physical 1m stream per (exchange, symbol, market); the 5s and 15s subscriptions
    // below share it and receive deterministically synthesised sub-minute candles
    let subscriptions = match streams.subscribe_all([
        SubscriptionKey::new(ExchangeId::Binance, "BTCUSDT", Interval::S15, MarketType::Futures),
        SubscriptionKey::new(ExchangeId::Binance, "BTCUSDT", Interval::S5, MarketType::Futures),
        SubscriptionKey::new(ExchangeId::Okx, "BTCUSDT", Interval::M1, MarketType::Futures),
        SubscriptionKey::new(ExchangeId::Bybit, "ETHUSDT", Interval::M1, MarketType::Spot),
        SubscriptionKey::new(ExchangeId::Gate, "ETHUSDT", Interval::M1, MarketType::Spot),
    ]) {
        Ok(subscriptions) => subscriptions,
        Err(error) => {
            eprintln!("failed to subscribe: {error}");
            return;
        }
    };

    let mut tasks = Vec::new();
    for mut subscription in subscriptions {
        tasks.push(tokio::spawn(async move {
            while let Some(event) = subscription.next().await {
                match event {
                    StreamEvent::Candle { key, candle } => {
                        let marker = if candle.closed { "closed" } else { "open" };
                        println!(
                            "[{key}] t={} o={} h={} l={} c={} v={} ({marker})",
                            candle.time,
                            candle.open,
                            candle.high,
                            candle.low,
                            candle.close,
                            candle.volume,
                        );
                    }
                    StreamEvent::Abandoned { key, reason } => {
                        eprintln!("[{key}] abandoned: {reason}");
                        break;
                    }
                }
            }
        }));
    }

    for task in tasks {
        let _ = task.await;
    }
}

// Initialise an INFO `Subscriber` for `Tracing` logs
fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_ansi(cfg!(debug_assertions))
        .init()
}
