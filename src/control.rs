//! Runtime setup and the main control loop.
//!
//! kaede is built on tokio.  This module creates the runtime with the configured number of
//! workers, spawns the listeners, and then loops over two periodic duties: pinging idle
//! connections and reloading the configuration file on SIGUSR1 (Ctrl-Break on Windows).
//!
//! The configuration is read once to build the runtime, since the number of workers cannot be
//! changed afterwards; reloads only touch the shared state (see `State::rehash`).

use crate::config::Config;
use crate::net;
use crate::state::State;
use std::net::SocketAddr;
use std::{cmp, process};
use tokio::runtime as rt;
use tokio::{task, time};

/// Creates a tokio runtime with the given number of worker threads, or the tokio default when
/// `workers` is zero.
fn create_runtime(workers: usize) -> rt::Runtime {
    let mut builder = rt::Builder::new_multi_thread();

    if workers != 0 {
        builder.worker_threads(workers);
    }

    builder
        .enable_io()
        .enable_time()
        .build()
        .unwrap_or_else(|err| {
            log::error!("Failed to start the tokio runtime: {}", err);
            process::exit(1);
        })
}

pub fn load_config_and_run(config_path: String) {
    let cfg = Config::from_file(&config_path).unwrap_or_else(|err| {
        log::error!("Failed to read {:?}: {}", config_path, err);
        process::exit(1);
    });

    let runtime = create_runtime(cfg.workers);
    runtime.block_on(run(config_path, cfg));
}

pub async fn run(config_path: String, cfg: Config) {
    let signal_fail = |err| {
        log::error!("Cannot listen for signals to reload the configuration: {}", err);
        process::exit(1);
    };

    #[cfg(unix)]
    let mut signals = {
        use tokio::signal::unix;

        unix::signal(unix::SignalKind::user_defined1()).unwrap_or_else(signal_fail)
    };

    #[cfg(windows)]
    let mut signals = {
        use tokio::signal::windows;

        windows::ctrl_break().unwrap_or_else(signal_fail)
    };

    // Idle connections are pinged well before they can time out.
    let ping_period = cmp::max(1, cfg.state.ping_timeout / 2);

    let shared = State::new(cfg.state);
    tokio::spawn(net::listen(SocketAddr::new(cfg.address, cfg.port), shared.clone(), false));
    if let Some(link_port) = cfg.link_port {
        tokio::spawn(net::listen(SocketAddr::new(cfg.address, link_port), shared.clone(), true));
    }

    let mut ping_interval = time::interval(time::Duration::from_secs(ping_period));
    ping_interval.tick().await;  // The first tick is immediate.

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                shared.ping_sweep().await;
            }
            _ = signals.recv() => {
                do_rehash(&config_path, &shared).await;
            }
        }
    }
}

/// Re-reads the configuration file and applies it to the shared state.
async fn do_rehash(config_path: &str, shared: &State) {
    log::info!("Reloading configuration from {:?}", config_path);
    let path = config_path.to_owned();
    match task::spawn_blocking(move || Config::from_file(&path)).await {
        Ok(Ok(cfg)) => shared.rehash(cfg.state).await,
        Ok(Err(err)) => log::error!("Failed to read {:?}: {}", config_path, err),
        Err(_) => log::error!("Configuration reload was cancelled"),
    }
}
