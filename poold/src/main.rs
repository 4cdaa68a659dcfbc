use poold::factory::{
    hash_algorithms, servers, services, storages, DefaultManagerFactory, StaticGlobalConfig,
};
use poold::{cli, ui, Config, PoolCoordinator};
use rpc_core::WsDaemonClient;
use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal;
use tokio::time::interval;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args = cli::parse_args();

    // Initialize logging
    init_logging(&args);

    // Load configuration (use defaults unless config file is provided)
    let mut config = match &args.config_path {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                ui::print_status("✗", &format!("Failed to load {}: {}", path.display(), e), ui::StatusType::Error);
                error!("Failed to load config {}: {}", path.display(), e);
                process::exit(1);
            }
        },
        None => Config::default(),
    };

    // Apply CLI overrides
    config.apply_cli_overrides(&args);

    ui::print_banner(env!("CARGO_PKG_VERSION"), &config.pool.coin.name);
    ui::print_config_summary(&config);

    let built = PoolCoordinator::builder()
        .daemon(Arc::new(WsDaemonClient::new()))
        .hash_algorithms(Arc::new(hash_algorithms()))
        .miner_managers(Arc::new(DefaultManagerFactory))
        .job_managers(Arc::new(DefaultManagerFactory))
        .share_managers(Arc::new(DefaultManagerFactory))
        .storages(Arc::new(storages()))
        .servers(Arc::new(servers()))
        .services(Arc::new(services()))
        .global_config(Arc::new(StaticGlobalConfig::new(config.global.clone())))
        .build();

    let mut coordinator = match built {
        Ok(coordinator) => coordinator,
        Err(e) => {
            ui::print_status("✗", &format!("Failed to create pool: {}", e), ui::StatusType::Error);
            error!("Failed to create pool: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = coordinator.initialize(config.pool.clone()).await {
        ui::print_status("✗", &format!("Failed to initialize pool: {}", e), ui::StatusType::Error);
        error!("Failed to initialize pool: {}", e);
        process::exit(1);
    }

    if let Err(e) = coordinator.start().await {
        ui::print_status("✗", &format!("Failed to start pool: {}", e), ui::StatusType::Error);
        error!("Failed to start pool: {}", e);
        let _ = coordinator.stop().await;
        process::exit(1);
    }

    ui::print_status("✓", "Pool node is now running", ui::StatusType::Success);
    ui::print_status("ℹ", "Press Ctrl+C to stop the pool", ui::StatusType::Info);
    println!();

    // Start status update task
    let status_handle = {
        let miners = coordinator.miner_manager();
        let jobs = coordinator.job_manager();
        let storage = coordinator.storage();
        let state = coordinator.state().to_string();
        let period = Duration::from_secs(config.global.status_interval_secs.max(1));
        let start_time = Instant::now();

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;

                let status = ui::PoolStatus {
                    uptime: start_time.elapsed(),
                    state: state.clone(),
                    miners: miners.as_ref().map_or(0, |m| m.count()),
                    current_height: jobs.as_ref().and_then(|j| j.current()).map(|job| job.height),
                    shares: storage.as_ref().map_or(0, |s| s.share_count()),
                    blocks: storage.as_ref().map_or(0, |s| s.block_count()),
                };

                print!("{}", status);
            }
        })
    };

    // Wait for shutdown signal
    if let Err(e) = signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
    }
    ui::print_status("ℹ", "Received Ctrl+C, shutting down gracefully...", ui::StatusType::Warning);
    info!("Received Ctrl+C, shutting down");

    // Cancel status updates
    status_handle.abort();

    if let Err(e) = coordinator.stop().await {
        ui::print_status("✗", &format!("Pool error during shutdown: {}", e), ui::StatusType::Error);
        error!("Pool error during shutdown: {}", e);
        process::exit(1);
    }

    ui::print_status("✓", "Pool node stopped gracefully", ui::StatusType::Success);
    info!("Pool node stopped gracefully");
}

fn init_logging(args: &cli::Args) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();
}
