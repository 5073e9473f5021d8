use graphboard::config::AppConfig;
use graphboard::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    graphboard::telemetry::init_tracing();

    tracing::info!("Starting Graphboard...");

    let config = AppConfig::load()?;
    let state = AppState::connect(config).await?;

    if state.config.demo_mode {
        graphboard::demo_seeder::seed_demo_data(&state).await?;
    }

    let mut node_events = state.events.subscribe(graphboard::events::Topic::Node);
    tracing::info!("Graphboard data layer ready; press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = node_events.recv() => match event {
                Ok(event) => tracing::debug!(?event, "Node changed"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Event listener lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    tracing::info!("Shutting down");
    Ok(())
}
