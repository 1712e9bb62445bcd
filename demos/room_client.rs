//! Terminal room client
//!
//! Connects to a running dispatcher, joins a room and speaks the envelope
//! protocol from stdin:
//!   plain text         broadcast to the current room
//!   /join <room>       join another room (and make it current)
//!   /leave <room>      leave a room
//!   /to <id> <text>    send a direct "message" event to a connection
//!   /quit              exit

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::{connect_async, tungstenite::Message};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://127.0.0.1:8080/ws".to_string());
    println!("Connecting to {}", url);

    let (ws_stream, _) = connect_async(url.as_str()).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let mut current_room = "general".to_string();
    ws_sender
        .send(Message::Text(envelope("join", true, json!(current_room))))
        .await?;
    println!("Joined '{}'. Type /quit to exit.", current_room);

    let mut stdin_reader = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            ws_message = ws_receiver.next() => {
                match ws_message {
                    Some(Ok(Message::Text(text))) => print_envelope(&text),
                    Some(Ok(Message::Close(_))) | None => {
                        println!("Connection closed");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        println!("WebSocket error: {}", e);
                        break;
                    }
                }
            }
            line = stdin_reader.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let frame = if line == "/quit" {
                    break;
                } else if let Some(room) = line.strip_prefix("/join ") {
                    current_room = room.trim().to_string();
                    envelope("join", true, json!(current_room))
                } else if let Some(room) = line.strip_prefix("/leave ") {
                    envelope("leave", true, json!(room.trim()))
                } else if let Some(rest) = line.strip_prefix("/to ") {
                    match rest.split_once(' ') {
                        Some((recipient, text)) => envelope(
                            "emitTo",
                            true,
                            json!({"r": recipient, "e": "message", "m": text}),
                        ),
                        None => {
                            println!("Usage: /to <id> <text>");
                            continue;
                        }
                    }
                } else {
                    envelope("broadcast", true, json!({"r": current_room, "m": line}))
                };

                ws_sender.send(Message::Text(frame)).await?;
            }
        }
    }

    ws_sender.close().await?;
    Ok(())
}

fn envelope(event: &str, system: bool, payload: Value) -> String {
    json!({"e": event, "s": system, "m": payload}).to_string()
}

fn print_envelope(text: &str) {
    let Ok(msg) = serde_json::from_str::<Value>(text) else {
        println!("Raw message: {}", text);
        return;
    };

    if msg["s"] == true && msg["e"] == "broadcast" {
        println!("[{}] {}", msg["m"]["r"].as_str().unwrap_or("?"), msg["m"]["m"]);
    } else {
        println!("<{}> {}", msg["e"].as_str().unwrap_or("?"), msg["m"]);
    }
}
