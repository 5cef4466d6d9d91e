mod audio;
mod config;
mod controller;
mod error;
mod gateway;
mod protocol;
mod state;
mod ui_bridge;

use std::sync::Arc;

use tokio::signal;
use tokio::sync::mpsc;

use config::Config;
use controller::Controller;
use gateway::{GeminiGateway, SolverGateway};
use protocol::UiRequest;
use state::Event;
use ui_bridge::UiBridge;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    // Read once at startup; an absent API key is not validated here and
    // surfaces as a remote authentication failure at the first call.
    let config = Config::from_env().map_err(anyhow::Error::msg)?;

    // UI requests arriving over the bridge
    let (tx_ui_request, mut rx_ui_request) = mpsc::channel::<UiRequest>(100);

    // Completion events posted back by spawned effect tasks
    let (tx_event, mut rx_event) = mpsc::channel::<Event>(100);

    // Start the bridge to the presentation process first, so the initial
    // snapshot has somewhere to go.
    let ui_bridge = Arc::new(UiBridge::new(&config, tx_ui_request).await?);
    let ui_bridge_run = ui_bridge.clone();
    tokio::spawn(async move {
        if let Err(e) = ui_bridge_run.run().await {
            log::error!("UiBridge error: {}", e);
        }
    });

    let gateway: Arc<dyn SolverGateway> = Arc::new(GeminiGateway::new(&config));
    let mut controller = Controller::new(&config, gateway, ui_bridge, tx_event);

    log::info!(
        "Tutor core started, language={}",
        controller.state().language.code()
    );
    controller.publish_snapshot().await;

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                log::info!("Received Ctrl+C, shutting down...");
                break;
            }

            Some(request) = rx_ui_request.recv() => {
                controller.handle_ui_request(request).await;
            }

            Some(event) = rx_event.recv() => {
                controller.handle_event(event).await;
            }
        }
    }
    Ok(())
}
