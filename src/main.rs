use std::sync::Arc;
use zarsage::ai::{LocalModelClient, ModelService};
use zarsage::config::{self, AppConfig};
use zarsage::{ChatController, Session, Timeouts};

fn main() -> anyhow::Result<()> {
    config::load_dotenv();
    let config = AppConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_target(true)
        .init();
    tracing::info!(
        endpoint = ?config.model.endpoint,
        sidecar = %config.model.sidecar_program,
        port = config.model.port,
        "starting zarsage"
    );

    let session = Arc::new(Session::new(config.greeting.clone()));
    let service: Arc<dyn ModelService> = Arc::new(LocalModelClient::new(config.model.clone()));
    let controller = ChatController::new(session, service, Timeouts::from(&config));

    dioxus::LaunchBuilder::desktop()
        .with_context(controller)
        .launch(zarsage::ui::App);
    Ok(())
}
