// src/main.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use log::{error, info, warn};

use camwatch_node::config::{self, Config};
use camwatch_node::core::{Clock, SystemClock};
use camwatch_node::device::{DeviceOpener, SystemOpener};
use camwatch_node::http::HttpServer;
use camwatch_node::reload::{ConfigWatcher, ReloadSignal, WATCH_INTERVAL};
use camwatch_node::supervisor::CaptureSupervisor;

const IDLE_POLL: Duration = Duration::from_millis(200);

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cfg_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "camwatch.toml".into());

    // ------------------------------------------------------------
    // Graceful shutdown
    // ------------------------------------------------------------
    let running = Arc::new(AtomicBool::new(true));
    {
        let r = running.clone();
        ctrlc::set_handler(move || {
            info!("[camwatch] shutdown requested");
            r.store(false, Ordering::SeqCst);
        })?;
    }

    let reload = ReloadSignal::new();
    let _watcher = ConfigWatcher::spawn(&cfg_path, reload.clone(), WATCH_INTERVAL)?;

    // Jede Generation: Config laden, alles aufbauen, auf Reload oder Ctrl+C warten
    let mut generation = 0u64;
    while running.load(Ordering::SeqCst) {
        let cfg = match config::load(&cfg_path) {
            Ok(cfg) => cfg,
            Err(e) if generation == 0 => return Err(e.into()),
            Err(e) => {
                error!("[camwatch] keeping services down, config rejected: {}", e);
                reload.clear();
                wait_for_change(&running, &reload);
                continue;
            }
        };

        generation += 1;
        reload.clear();
        info!("[camwatch] generation {} from {}", generation, cfg_path);

        run_generation(&cfg, &running, &reload)?;

        if reload.is_requested() {
            info!("[camwatch] config reload requested, restarting services");
        }
    }

    info!("[camwatch] bye");
    Ok(())
}

fn run_generation(cfg: &Config, running: &AtomicBool, reload: &ReloadSignal) -> anyhow::Result<()> {
    let opener: Arc<dyn DeviceOpener> = Arc::new(SystemOpener);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let supervisor = CaptureSupervisor::new(cfg.supervisor_settings(), opener, clock);
    for (camera, e) in supervisor.start() {
        warn!("[camwatch] {} unavailable: {}", camera, e);
    }

    let broadcasters = supervisor.broadcasters();
    let server = match HttpServer::start(
        cfg.server_settings(),
        &supervisor.cameras(),
        move |camera| broadcasters.get(&camera).cloned(),
    ) {
        Ok(server) => server,
        Err(e) => {
            supervisor.stop();
            return Err(e);
        }
    };

    wait_for_change(running, reload);

    // Broadcaster zuerst schließen, damit laufende Streams enden
    supervisor.stop();
    drop(server);
    Ok(())
}

fn wait_for_change(running: &AtomicBool, reload: &ReloadSignal) {
    while running.load(Ordering::SeqCst) && !reload.is_requested() {
        thread::sleep(IDLE_POLL);
    }
}
