use anyhow::{Context, Result};
use eframe::egui;
use std::path::Path;
use tracing::{info, warn};

use network_monitor_dashboard::actions::DeviceActions;
use network_monitor_dashboard::api::ApiClient;
use network_monitor_dashboard::config::{Config, DEFAULT_CONFIG_PATH};
use network_monitor_dashboard::scheduler::PollingScheduler;
use network_monitor_dashboard::store::DeviceStore;
use network_monitor_dashboard::{telemetry, ui};

fn main() -> Result<()> {
    let config = Config::load(DEFAULT_CONFIG_PATH)
        .with_context(|| format!("Unable to load configuration from {DEFAULT_CONFIG_PATH}"))?;
    telemetry::init(&config.logging)?;

    if !Path::new(DEFAULT_CONFIG_PATH).exists() {
        match Config::save_example(DEFAULT_CONFIG_PATH) {
            Ok(()) => info!("Config file not found. Wrote defaults to {}", DEFAULT_CONFIG_PATH),
            Err(e) => warn!("Config file not found and defaults could not be written: {}", e),
        }
    }

    // The UI owns the main thread; polling and API calls run on this runtime.
    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    let _guard = runtime.enter();

    let api = ApiClient::from_config(&config.api).context("Failed to build API client")?;
    let store = DeviceStore::with_timeframe(config.ui.default_timeframe);
    let scheduler = PollingScheduler::spawn(api.clone(), store.clone(), config.polling.interval());
    let actions = DeviceActions::new(api.clone(), store.clone());
    info!(api = api.base_url(), "dashboard starting");

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 820.0])
            .with_title("Network Monitoring Dashboard"),
        ..Default::default()
    };

    let api_url = api.base_url().to_string();
    eframe::run_native(
        "Network Monitoring Dashboard",
        options,
        Box::new(move |cc| {
            // Force light mode
            cc.egui_ctx.set_visuals(egui::Visuals::light());
            Box::new(ui::DashboardApp::new(cc, store, actions, scheduler, api_url))
        }),
    )
    .map_err(|e| anyhow::anyhow!("Failed to run application: {}", e))
}
