use clap::Parser;
use log::{error, info};
use server::game::GameConfig;
use server::{Server, ServerConfig};
use shared::DEFAULT_TICK_RATE;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Tick rate (updates per second)
    #[arg(short, long, default_value_t = DEFAULT_TICK_RATE)]
    tick_rate: u32,

    /// Websocket endpoint path
    #[arg(long, default_value = "/game")]
    path: String,

    /// Keep the ball speed constant on paddle hits
    #[arg(long)]
    no_speedup: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut game = GameConfig::default();
    if args.no_speedup {
        game.paddle_speedup = 1.0;
    }

    let config = ServerConfig {
        bind_addr: format!("{}:{}", args.host, args.port),
        path: args.path,
        tick_rate: args.tick_rate,
        game,
        ..ServerConfig::default()
    };

    info!("Starting server at {}Hz", config.tick_rate);
    let server = Server::bind(config).await?;

    server
        .run_until(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
                Err(e) => {
                    error!("Unable to listen for Ctrl+C: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        })
        .await?;

    Ok(())
}
