use anyhow::Result;
use clap::Parser;
use kubewatch::app::ApplicationBuilder;
use kubewatch::config::Cli;
use kubewatch::config::Commands;
use kubewatch::config::WatchArgs;
use utils::logging;
use utils::version;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_global_hooks();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_watcher(*args).await,
    }
}

async fn run_watcher(args: WatchArgs) -> Result<()> {
    logging::init();

    tracing::info!("Starting kubewatch {}", &**version::VERSION);

    let app = ApplicationBuilder::new(args).build().await?;

    app.run().await
}
