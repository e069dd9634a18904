use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use std::net::SocketAddr;
use std::sync::Arc;

use nexus_relay::config::Config;
use nexus_relay::state::AppState;
use nexus_relay::server::{build_router, print_startup_banner, start_server};

// use mimalloc as the global allocator
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> anyhow::Result<()> {
    // load .env file if it exists (fails silently if not found)
    let _ = dotenvy::dotenv();

    // load configuration from environment variables
    let config = Config::from_env();

    // build tokio runtime with configured worker threads
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads.max(1))
        .enable_all()
        .build()?;

    runtime.block_on(async {
        // initialize tracing
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .with(tracing_subscriber::fmt::layer())
            .init();

        // create shared state
        let state = Arc::new(AppState::new(&config)?);

        let app = build_router(state.clone(), &config);

        let addr = SocketAddr::from((
            config.host.parse::<std::net::IpAddr>()?,
            config.port,
        ));

        // print startup information
        print_startup_banner(&config);

        start_server(app, state, addr).await?;
        Ok::<(), anyhow::Error>(())
    })
}
