//! Headless client that joins a game and, if it gets a paddle, chases the ball.

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use log::{info, warn};
use shared::{MoveCommand, ServerMessage, Snapshot, PADDLE_HEIGHT};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Websocket URL of the game endpoint
    #[arg(short, long, default_value = "ws://127.0.0.1:8080/game")]
    url: String,

    /// Largest paddle move sent per snapshot
    #[arg(short, long, default_value = "8")]
    max_step: f32,
}

/// Delta that moves the paddle centre towards the ball, capped at `max_step`.
fn chase(snapshot: &Snapshot, player_id: u32, max_step: f32) -> Option<f32> {
    let paddle = snapshot.player(player_id)?;
    let centre = paddle.position.y + PADDLE_HEIGHT / 2.0;
    let delta = (snapshot.ball.y - centre).clamp(-max_step, max_step);
    (delta.abs() >= 1.0).then_some(delta)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let (ws_stream, _) = connect_async(args.url.as_str()).await?;
    info!("Connected to {}", args.url);
    let (mut sink, mut stream) = ws_stream.split();

    let mut player_id: Option<u32> = None;
    let mut last_scores: Vec<u32> = Vec::new();

    while let Some(message) = stream.next().await {
        let text = match message? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        match ServerMessage::from_json(&text) {
            Ok(ServerMessage::Role(assignment)) => {
                info!("Assigned role {}", assignment.role);
                player_id = assignment.player_id;
            }
            Ok(ServerMessage::Snapshot(snapshot)) => {
                let scores: Vec<u32> = snapshot.players.iter().map(|p| p.score).collect();
                if scores != last_scores {
                    info!("Score: {:?}", scores);
                    last_scores = scores;
                }

                let Some(id) = player_id else { continue };
                if let Some(delta) = chase(&snapshot, id, args.max_step) {
                    let cmd = MoveCommand {
                        player_id: id,
                        position_y: delta,
                    };
                    sink.send(Message::Text(serde_json::to_string(&cmd)?)).await?;
                }
            }
            Err(e) => warn!("Unrecognised message from server: {}", e),
        }
    }

    info!("Server closed the connection");
    Ok(())
}
