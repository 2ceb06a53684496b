use clap::Parser;
use log::{error, info};
use server::network::{BoxError, Server, ServerMessage};
use server::tracker::TrackerConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Main-method of the application.
/// Parses command-line arguments, then runs the host bridge until it stops or Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "9600")]
        port: u16,
        /// Milliseconds between speed samples
        #[clap(short, long, default_value = "1000")]
        tick_rate_ms: u64,
        /// Directory holding the per-car stat files
        #[clap(short, long, default_value = "entry_car_data")]
        data_dir: PathBuf,
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    info!("------------------------------------");
    info!("Starting: Lightspeed driving stats");
    info!("------------------------------------");

    let config = TrackerConfig {
        data_dir: args.data_dir,
        tick_interval: Duration::from_millis(args.tick_rate_ms.max(1)),
        ..TrackerConfig::default()
    };

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, &config).await?;
    let shutdown = server.shutdown_sender();

    let mut server_handle = tokio::spawn(async move { server.run().await });

    tokio::select! {
        result = &mut server_handle => {
            report_exit(result);
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, saving open sessions...");
        }
    }

    // The loop saves open sessions before returning
    let _ = shutdown.send(ServerMessage::Shutdown);
    report_exit(server_handle.await);

    Ok(())
}

fn report_exit(result: Result<Result<(), BoxError>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => info!("Server stopped"),
        Ok(Err(e)) => error!("Server stopped with error: {}", e),
        Err(e) => error!("Server task panicked: {}", e),
    }
}
