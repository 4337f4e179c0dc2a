use crossing_eta::config::{self, Config};
use crossing_eta::crossing::CrossingMonitor;
use crossing_eta::crossing::trains::WatchZone;
use crossing_eta::feed::records::FrameDecoder;
use crossing_eta::feed::retry::RetryPolicy;
use crossing_eta::feed::stomp::{StompFeed, StompSettings};
use crossing_eta::feed::run_feed;
use crossing_eta::publish::Publisher;
use crossing_eta::publish::mqtt::MqttPublisher;
use crossing_eta::state::AppState;
use crossing_eta::stats::{JsonFileBackend, StatsStore};
use crossing_eta::{api, eta};
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

fn init_tracing(level: tracing::Level) {
    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn config_path() -> String {
    std::env::args()
        .nth(1)
        .unwrap_or_else(|| config::DEFAULT_CONFIG_PATH.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config_path();
    let config = match config::load_from_path(&config_path) {
        Ok(config) => config,
        Err(err) => {
            init_tracing(tracing::Level::INFO);
            tracing::error!(config_path = %config_path, error = %err, "Failed to load config");
            return Err(err.into());
        }
    };
    init_tracing(config.log_level());
    tracing::info!(
        config_path = %config_path,
        app = %config.app.name,
        "crossing-eta starting"
    );

    let state = Arc::new(RwLock::new(AppState::new()));

    let stats_backend = JsonFileBackend::new(config.stats_path());
    tracing::info!(path = %stats_backend.path().display(), "Loading closure stats");
    let stats = match StatsStore::load(Box::new(stats_backend)) {
        Ok(stats) => stats,
        Err(err) => {
            tracing::error!(error = %err, "Failed to load closure stats");
            return Err(err.into());
        }
    };

    let (mqtt, _mqtt_handle) = MqttPublisher::start(
        config.mqtt_client_id(),
        &config.mqtt.broker,
        config.mqtt.port,
    );
    let publisher: Arc<dyn Publisher> = Arc::new(mqtt);

    let snapshots = {
        let guard = state.read().map_err(|_| "state lock poisoned")?;
        guard.subscribe_down_snapshot()
    };
    let _eta_handle = eta::spawn_eta_publisher(
        snapshots,
        Arc::clone(&publisher),
        config.eta_topic().to_string(),
        config.publish_interval(),
    );

    let app = api::router(Arc::clone(&state));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port()));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    let _api_handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            tracing::error!(error = %err, "API server stopped");
        }
    });

    let decoder = FrameDecoder::new(config.area_id(), WatchZone::new(config.watch_berths()));
    let mut monitor = CrossingMonitor::new(
        decoder,
        config.state_topic(),
        stats,
        publisher,
        Arc::clone(&state),
    );

    let mut feed = StompFeed::new(stomp_settings(&config));
    let policy = RetryPolicy::fixed(config.reconnect_delay())
        .with_max_attempts(config.feed.max_reconnect_attempts);

    let err = run_feed(&mut feed, &policy, &mut monitor).await;
    tracing::error!(error = %err, "Feed loop stopped");
    Err(err.into())
}

fn stomp_settings(config: &Config) -> StompSettings {
    StompSettings {
        host: config.feed.host.clone(),
        port: config.feed.port,
        username: config.feed.username.clone(),
        password: config.feed.password.clone(),
        destination: config.feed_topic().to_string(),
        heartbeat: config.heartbeat_interval(),
        read_timeout: config.read_timeout(),
    }
}
