use autoflow_runtime::cli::{setup_logging, Cli, CliRunner};
use clap::Parser;
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() {
    let args = Cli::parse();
    setup_logging(args.verbose);

    info!("starting autoflow-runtime v{}", env!("CARGO_PKG_VERSION"));

    let runner = CliRunner::new();
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::broadcast::channel(1);
    let _shutdown_handler = setup_shutdown_handler(shutdown_tx);

    let exit_code = tokio::select! {
        code = runner.run(args) => code,
        _ = shutdown_rx.recv() => {
            info!("received shutdown signal");
            0
        }
    };

    info!("autoflow-runtime stopped");
    std::process::exit(exit_code);
}

fn setup_shutdown_handler(
    shutdown_tx: tokio::sync::broadcast::Sender<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
            .expect("failed to install SIGINT handler");
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");

        tokio::select! {
            _ = sigint.recv() => info!("received SIGINT"),
            _ = sigterm.recv() => info!("received SIGTERM"),
        }

        let _ = shutdown_tx.send(());
    })
}
