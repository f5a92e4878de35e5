use anyhow::{Context, Result};
use clap::Parser;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use starspin_backend::config::{
    DEFAULT_DATABASE_PATH, DEFAULT_DEDUPE_REDIS_PREFIX, DEFAULT_TELEGRAM_API_URL,
};
use starspin_backend::{build_collaborators, now_ms, Api, Backend, BackendConfig, RedisDedupe};
use starspin_execution::guard::{GovernorRateLimit, MemoryDedupe};
use starspin_execution::{settlement_tasks, Engine, Guard, RequestDedupe, SqliteStore};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() -> Result<()> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .ok()
        .and_then(|value| {
            let trimmed = value.trim().to_string();
            (!trimmed.is_empty()).then_some(trimmed)
        });

    if let Some(endpoint) = endpoint {
        let service_name =
            std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "starspin-backend".to_string());
        let rate = std::env::var("OTEL_SAMPLING_RATE")
            .ok()
            .and_then(|value| value.parse::<f64>().ok())
            .map(|value| value.clamp(0.0, 1.0))
            .unwrap_or(1.0);
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_endpoint(endpoint)
            .build()
            .context("failed to build OTLP exporter")?;
        let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
            .with_sampler(opentelemetry_sdk::trace::Sampler::TraceIdRatioBased(rate))
            .with_resource(
                opentelemetry_sdk::Resource::builder_empty()
                    .with_attributes([opentelemetry::KeyValue::new("service.name", service_name)])
                    .build(),
            )
            .with_batch_exporter(exporter)
            .build();
        let tracer = tracer_provider.tracer("starspin-backend");
        opentelemetry::global::set_tracer_provider(tracer_provider);

        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_filter(LevelFilter::INFO))
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    Ok(())
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host interface to bind (default: localhost).
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    host: IpAddr,

    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// SQLite database file.
    #[arg(long, env = "DATABASE_PATH", default_value = DEFAULT_DATABASE_PATH)]
    database_path: PathBuf,

    /// Per-IP HTTP requests per second (0 disables limit).
    #[arg(long, env = "RATE_LIMIT_HTTP_PER_SEC")]
    http_rate_limit_per_second: Option<u64>,

    /// Per-IP HTTP burst size (0 disables limit).
    #[arg(long, env = "RATE_LIMIT_HTTP_BURST")]
    http_rate_limit_burst: Option<u32>,

    /// Maximum request body size in bytes (0 disables limit).
    #[arg(long, env = "HTTP_BODY_LIMIT_BYTES")]
    http_body_limit_bytes: Option<usize>,

    /// Per-user requests per second (0 disables limit).
    #[arg(long, env = "RATE_LIMIT_USER_PER_SEC")]
    user_rate_limit_per_second: Option<u32>,

    /// Per-user requests per minute (0 disables limit).
    #[arg(long, env = "RATE_LIMIT_USER_PER_MIN")]
    user_rate_limit_per_minute: Option<u32>,

    /// Window in which identical requests are rejected (0 disables dedupe).
    #[arg(long, env = "DEDUPE_WINDOW_MS")]
    dedupe_window_ms: Option<u64>,

    /// Redis URL for request dedupe shared across instances.
    #[arg(long, env = "DEDUPE_REDIS_URL")]
    dedupe_redis_url: Option<String>,

    #[arg(long, env = "DEDUPE_REDIS_PREFIX", default_value = DEFAULT_DEDUPE_REDIS_PREFIX)]
    dedupe_redis_prefix: String,

    /// Token required by `POST /wheels/:id/draw`.
    #[arg(long, env = "ADMIN_TOKEN", hide_env_values = true)]
    admin_token: Option<String>,

    /// Token the payment provider sends with deposit webhooks.
    #[arg(long, env = "WEBHOOK_TOKEN", hide_env_values = true)]
    webhook_token: Option<String>,

    #[arg(long, env = "METRICS_AUTH_TOKEN", hide_env_values = true)]
    metrics_token: Option<String>,

    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    telegram_bot_token: Option<String>,

    #[arg(long, env = "TELEGRAM_API_URL", default_value = DEFAULT_TELEGRAM_API_URL)]
    telegram_api_url: String,

    #[arg(long, env = "TRANSFER_GATEWAY_URL")]
    transfer_gateway_url: Option<String>,

    #[arg(long, env = "GIFT_FULFILLMENT_URL")]
    gift_fulfillment_url: Option<String>,

    #[arg(long, env = "EXCHANGE_RATE_URL")]
    exchange_rate_url: Option<String>,

    /// Stars per TON used when no exchange-rate service is configured.
    #[arg(long, env = "STARS_PER_TON")]
    stars_per_ton: Option<f64>,

    /// Optional case id free spins are restricted to.
    #[arg(long, env = "FREE_CASE_ID")]
    free_case_id: Option<i64>,

    #[arg(long, env = "WHEEL_DRAW_DELAY_MS")]
    wheel_draw_delay_ms: Option<u64>,

    #[arg(long, env = "SLOT_WITHDRAW_FEE_STARS")]
    slot_withdraw_fee_stars: Option<u64>,

    #[arg(long, env = "RUN_DAILY_ATTEMPTS")]
    run_daily_attempts: Option<u32>,

    /// Wheel auto-draw sweep interval (0 disables the sweep).
    #[arg(long, env = "WHEEL_SWEEP_INTERVAL_MS")]
    wheel_sweep_interval_ms: Option<u64>,

    /// Leaderboard period rollover interval (0 disables the sweep).
    #[arg(long, env = "PERIOD_SWEEP_INTERVAL_MS")]
    period_sweep_interval_ms: Option<u64>,
}

fn is_production() -> bool {
    matches!(
        std::env::var("NODE_ENV").as_deref(),
        Ok("production") | Ok("prod")
    )
}

/// Maps an optional arg value to Option: 0 => None, Some(v) => Some(v), None => default
fn map_optional_limit<T: Copy + PartialEq + From<u8>>(
    arg: Option<T>,
    default: Option<T>,
) -> Option<T> {
    match arg {
        Some(v) if v == T::from(0) => None,
        Some(v) => Some(v),
        None => default,
    }
}

fn build_config(args: &Args) -> Result<BackendConfig> {
    let defaults = BackendConfig::default();
    let mut engine = defaults.engine.clone();
    let mut schedule = defaults.schedule.clone();

    if let Some(rate) = args.stars_per_ton {
        if !rate.is_finite() || rate <= 0.0 {
            anyhow::bail!("stars_per_ton must be > 0");
        }
    }
    if let Some(0) = args.run_daily_attempts {
        anyhow::bail!("run_daily_attempts must be > 0 when set");
    }

    // Zero disables per-user limits and dedupe inside the engine.
    engine.rate_limit_per_second = args
        .user_rate_limit_per_second
        .unwrap_or(engine.rate_limit_per_second);
    engine.rate_limit_per_minute = args
        .user_rate_limit_per_minute
        .unwrap_or(engine.rate_limit_per_minute);
    engine.dedupe_window_ms = args.dedupe_window_ms.unwrap_or(engine.dedupe_window_ms);
    engine.free_case_id = args.free_case_id.or(engine.free_case_id);
    engine.wheel_draw_delay_ms = args
        .wheel_draw_delay_ms
        .unwrap_or(engine.wheel_draw_delay_ms);
    engine.slot_withdraw_fee_stars = args
        .slot_withdraw_fee_stars
        .unwrap_or(engine.slot_withdraw_fee_stars);
    engine.run_daily_attempts = args.run_daily_attempts.unwrap_or(engine.run_daily_attempts);

    if let Some(interval) = args.wheel_sweep_interval_ms {
        schedule.wheel_sweep_enabled = interval > 0;
        schedule.wheel_sweep_interval_ms = interval;
    }
    if let Some(interval) = args.period_sweep_interval_ms {
        schedule.period_sweep_enabled = interval > 0;
        schedule.period_sweep_interval_ms = interval;
    }

    Ok(BackendConfig {
        database_path: args.database_path.clone(),
        http_rate_limit_per_second: map_optional_limit(args.http_rate_limit_per_second, defaults.http_rate_limit_per_second),
        http_rate_limit_burst: map_optional_limit(args.http_rate_limit_burst, defaults.http_rate_limit_burst),
        http_body_limit_bytes: map_optional_limit(args.http_body_limit_bytes, defaults.http_body_limit_bytes),
        admin_token: args.admin_token.clone(),
        webhook_token: args.webhook_token.clone(),
        metrics_token: args.metrics_token.clone(),
        telegram_bot_token: args.telegram_bot_token.clone(),
        telegram_api_url: args.telegram_api_url.clone(),
        transfer_gateway_url: args.transfer_gateway_url.clone(),
        gift_fulfillment_url: args.gift_fulfillment_url.clone(),
        exchange_rate_url: args.exchange_rate_url.clone(),
        fallback_stars_per_ton: args.stars_per_ton.unwrap_or(defaults.fallback_stars_per_ton),
        dedupe_redis_url: args.dedupe_redis_url.clone(),
        dedupe_redis_prefix: args.dedupe_redis_prefix.clone(),
        engine,
        schedule,
    })
}

fn require_env(var: &str) -> Result<String> {
    let value = std::env::var(var).unwrap_or_default();
    if value.trim().is_empty() {
        anyhow::bail!("Missing required env: {var}");
    }
    Ok(value)
}

fn ensure_production_env() -> Result<()> {
    if !is_production() {
        return Ok(());
    }

    require_env("ALLOWED_HTTP_ORIGINS")?;
    require_env("TELEGRAM_BOT_TOKEN")?;
    require_env("TRANSFER_GATEWAY_URL")?;
    require_env("WEBHOOK_TOKEN")?;
    require_env("METRICS_AUTH_TOKEN")?;

    Ok(())
}

fn build_guard(config: &BackendConfig) -> Result<Guard> {
    let dedupe: Arc<dyn RequestDedupe> = match config.dedupe_redis_url.as_deref() {
        Some(url) => {
            info!(prefix = %config.dedupe_redis_prefix, "using redis request dedupe");
            Arc::new(
                RedisDedupe::new(url, config.dedupe_redis_prefix.clone())
                    .context("invalid dedupe redis url")?,
            )
        }
        None => Arc::new(MemoryDedupe::default()),
    };
    Ok(Guard::new(
        Arc::new(GovernorRateLimit::new(
            config.engine.rate_limit_per_second,
            config.engine.rate_limit_per_minute,
        )),
        dedupe,
        Duration::from_millis(config.engine.dedupe_window_ms),
    ))
}

async fn shutdown_signal(shutdown: watch::Sender<bool>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
    let _ = shutdown.send(true);
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    ensure_production_env()?;

    let args = Args::parse();
    let config = build_config(&args)?;

    let store = Arc::new(
        SqliteStore::open(&config.database_path)
            .with_context(|| format!("failed to open {}", config.database_path.display()))?,
    );
    let collaborators = build_collaborators(&config).context("invalid collaborator url")?;
    let engine = Arc::new(
        Engine::new(store, collaborators, config.engine.clone()).with_guard(build_guard(&config)?),
    );

    let finalized = engine
        .rollover(now_ms())
        .context("initial period rollover")?;
    info!(finalized = finalized.len(), "leaderboard periods checked");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tasks = settlement_tasks(engine.clone(), &config.schedule, Arc::new(now_ms))
        .spawn(shutdown_rx);

    let addr = SocketAddr::new(args.host, args.port);
    let backend = Arc::new(Backend::new(engine, config));
    let app = Api::new(backend).router();

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on {}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown_tx))
    .await
    .context("axum server error")?;

    for task in tasks {
        if let Err(err) = task.await {
            tracing::warn!(error = %err, "settlement task ended abnormally");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_disables_http_limits() {
        let args = Args::parse_from([
            "starspin-backend",
            "--http-rate-limit-per-second",
            "0",
            "--http-body-limit-bytes",
            "1024",
        ]);
        let config = build_config(&args).expect("config should parse");
        assert_eq!(config.http_rate_limit_per_second, None);
        assert_eq!(config.http_body_limit_bytes, Some(1024));
        assert_eq!(
            config.http_rate_limit_burst,
            BackendConfig::default().http_rate_limit_burst
        );
    }

    #[test]
    fn schedule_intervals_toggle_tasks() {
        let args = Args::parse_from([
            "starspin-backend",
            "--wheel-sweep-interval-ms",
            "0",
            "--period-sweep-interval-ms",
            "5000",
        ]);
        let config = build_config(&args).expect("config should parse");
        assert!(!config.schedule.wheel_sweep_enabled);
        assert!(config.schedule.period_sweep_enabled);
        assert_eq!(config.schedule.period_sweep_interval_ms, 5_000);
    }

    #[test]
    fn engine_overrides_apply() {
        let args = Args::parse_from([
            "starspin-backend",
            "--dedupe-window-ms",
            "0",
            "--free-case-id",
            "3",
            "--slot-withdraw-fee-stars",
            "10",
        ]);
        let config = build_config(&args).expect("config should parse");
        assert_eq!(config.engine.dedupe_window_ms, 0);
        assert_eq!(config.engine.free_case_id, Some(3));
        assert_eq!(config.engine.slot_withdraw_fee_stars, 10);
        assert_eq!(config.fallback_stars_per_ton, BackendConfig::default().fallback_stars_per_ton);
    }

    #[test]
    fn rejects_invalid_rate_and_attempts() {
        let args = Args::parse_from(["starspin-backend", "--stars-per-ton=-1"]);
        assert!(build_config(&args).is_err());
        let args = Args::parse_from(["starspin-backend", "--run-daily-attempts", "0"]);
        assert!(build_config(&args).is_err());
    }
}
