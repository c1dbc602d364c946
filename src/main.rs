use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use biblio_kernel::ledger::Ledger;
use biblio_kernel::notify::NotificationSink;
use biblio_kernel::settings::Settings;
use biblio_kernel::{InitCtx, ModuleRegistry};
use biblio_notify::QueueSink;
use biblio_store::MemoryLedger;

use biblio_app::modules;

#[derive(Parser)]
#[command(name = "biblio-app", about = "Library-management backend", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (the default).
    Serve,
    /// Print the effective configuration as JSON and exit.
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load().context("failed to load configuration")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(settings).await,
        Command::Config => {
            let rendered = serde_json::to_string_pretty(&settings)
                .context("failed to render configuration")?;
            println!("{rendered}");
            Ok(())
        }
    }
}

async fn serve(settings: Settings) -> anyhow::Result<()> {
    biblio_telemetry::init(&settings.telemetry);
    tracing::info!(environment = ?settings.environment, "starting biblio");

    let ledger: Arc<dyn Ledger> = Arc::new(MemoryLedger::new());
    let (queue, dispatcher) = QueueSink::spawn();
    let notifier: Arc<dyn NotificationSink> = queue;

    let mut registry = ModuleRegistry::new();
    modules::register_all(&mut registry, &settings, ledger.clone(), notifier.clone());

    let ctx = InitCtx {
        settings: &settings,
        ledger: &ledger,
        notifier: &notifier,
    };

    registry
        .init_all(&ctx)
        .await
        .context("module initialization failed")?;

    // The bundled in-memory ledger has no schema to migrate; log what a SQL
    // deployment would apply.
    for (module, migration) in registry.collect_migrations() {
        tracing::debug!(module = %module, migration = migration.id, "schema registered");
    }

    registry
        .start_all(&ctx)
        .await
        .context("module startup failed")?;

    let result = biblio_http::start_server(&registry, &settings).await;

    registry.stop_all().await.context("module shutdown failed")?;
    dispatcher.abort();

    result
}
