mod app;
mod config;
mod event;
mod nav;
mod protocol;
mod session;
mod table;
mod theme;
mod transport;

use anyhow::Context;
use app::BloodwiseApp;
use clap::Parser;
use config::Config;
use eframe::egui;
use protocol::ChatController;
use session::identity;
use std::sync::{mpsc, Arc};
use tracing_subscriber::EnvFilter;
use transport::{Dispatcher, HttpChatApi};

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bloodwise=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Explicit identifier first, then the persisted one. Without either the
/// client runs without `X-Session-ID`.
fn resolve_session_id(config: &Config) -> Option<String> {
    if let Some(id) = config.session_id.as_deref().map(str::trim) {
        if !id.is_empty() {
            return Some(id.to_string());
        }
    }

    match identity::load_or_create(&identity::default_dir()) {
        Ok(id) => Some(id),
        Err(err) => {
            tracing::warn!(error = %err, "no session identifier, requests are sent without one");
            None
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::parse();
    let route = config.route().context("invalid --link")?;
    let session_id = resolve_session_id(&config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("bloodwise-runtime")
        .build()?;

    let api = HttpChatApi::new(&config.base_url, session_id, config.timeout())
        .context("failed to build the API client")?;
    tracing::info!(
        base_url = %config.base_url,
        model = %route.model,
        session = api.session_id().is_some(),
        "starting"
    );

    let (tx, rx) = mpsc::channel();
    let dispatcher = Dispatcher::new(Arc::new(api), tx, runtime.handle().clone());
    let controller = ChatController::new(route.clone(), config.history_limit, config.policy());
    let models = config.model_choices(&route.model);
    let _runtime = runtime;

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1180.0, 780.0])
            .with_min_inner_size([720.0, 520.0])
            .with_drag_and_drop(true),
        ..Default::default()
    };

    eframe::run_native(
        "Bloodwise",
        native_options,
        Box::new(move |creation_context| {
            let ctx = creation_context.egui_ctx.clone();
            let dispatcher = dispatcher.with_notify(move || ctx.request_repaint());
            Ok(Box::new(BloodwiseApp::new(
                &creation_context.egui_ctx,
                rx,
                dispatcher,
                controller,
                models,
            )))
        }),
    )
    .map_err(|err| anyhow::anyhow!("ui error: {err}"))?;

    Ok(())
}
