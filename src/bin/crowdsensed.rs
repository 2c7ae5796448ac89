//! crowdsensed - people counting daemon
//!
//! This daemon:
//! 1. Loads configuration and the persisted camera list
//! 2. Starts one capture worker per enabled camera
//! 3. Serves the camera, detection and analytics HTTP API
//! 4. Stops the API and joins capture workers on Ctrl-C

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};

use crowdsense::{
    api::{ApiConfig, ApiServer},
    build_backend, CameraManager, CrowdService, CrowdsenseConfig, JsonFileStore, ManagerSettings,
    PersonDetector, SourceFactory,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (TOML or JSON).
    #[arg(long, env = "CROWDSENSE_CONFIG")]
    config: Option<PathBuf>,
    /// Override the API listen address.
    #[arg(long)]
    addr: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = CrowdsenseConfig::load_from(args.config.as_deref())?;
    if let Some(addr) = args.addr {
        config.api_addr = addr;
    }
    let zones = config.zone_table()?;

    let store = Arc::new(JsonFileStore::new(config.cameras_path.clone()));
    let opener = Arc::new(SourceFactory::new(config.capture.source_settings()));
    let manager = Arc::new(CameraManager::new(
        ManagerSettings::from_config(&config),
        store,
        opener,
    ));
    let registered = manager.start();
    log::info!(
        "crowdsensed: {} camera(s) registered, list persisted at {}",
        registered,
        config.cameras_path.display()
    );

    let backend = build_backend(&config.detection).context("detector backend")?;
    {
        let guard = backend
            .lock()
            .map_err(|_| anyhow!("backend lock poisoned"))?;
        log::info!("crowdsensed: detector backend '{}'", guard.name());
    }
    let detector =
        PersonDetector::new(backend).with_min_confidence(config.detection.min_confidence);
    let service = Arc::new(CrowdService::new(
        manager.clone(),
        detector,
        zones,
        config.stream.clone(),
    ));

    let api_handle = ApiServer::new(
        ApiConfig {
            addr: config.api_addr.clone(),
        },
        service,
    )
    .spawn()?;
    log::info!("crowdsensed running. api on http://{}", api_handle.addr);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let _ = rx.recv();
    log::info!("shutdown signal received, stopping API server...");
    api_handle.stop()?;
    let report = manager.shutdown(config.capture.shutdown_grace);
    if report.detached > 0 {
        log::warn!(
            "{} capture worker(s) still blocked on camera I/O were detached",
            report.detached
        );
    }
    Ok(())
}
