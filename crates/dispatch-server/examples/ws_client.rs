use std::env;
use std::error::Error;
use std::io::{self, Write};
use std::time::Duration;

use dispatch_protocol::decode_request;
use futures_util::{SinkExt, StreamExt};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Where to connect: env override or default.
    let url = env::var("DISPATCH_CLIENT_URL").unwrap_or_else(|_| "ws://127.0.0.1:8080/ws".to_string());
    // How long to keep printing frames after each command.
    let quiet = Duration::from_millis(
        env::var("DISPATCH_CLIENT_WAIT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(500),
    );

    println!("Connecting to {}...", url);
    let (mut ws, _) = connect_async(url.as_str()).await?;
    println!("Connected.");
    println!("Type one JSON envelope per line, like:");
    println!(r#"  {{"action":"heartbeat","requestId":"1"}}"#);
    println!(r#"  {{"action":"search","requestId":"2","query":"squirrels"}}"#);
    println!(r#"  {{"action":"join_chat","requestId":"3","videoId":"park"}}"#);
    println!(r#"  {{"action":"chat_message","requestId":"4","videoId":"park","content":"hi"}}"#);
    println!("Type 'quit' or 'exit' to leave.\n");

    let stdin = io::stdin();

    loop {
        // Prompt
        print!(">> ");
        io::stdout().flush()?;

        let mut line = String::new();
        let n = stdin.read_line(&mut line)?;
        if n == 0 {
            // EOF
            println!("\nEOF on stdin, exiting client.");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.eq_ignore_ascii_case("quit") || trimmed.eq_ignore_ascii_case("exit") {
            println!("Exiting client.");
            break;
        }

        // Catch typos locally before they reach the server.
        match decode_request(trimmed) {
            Ok(request) => println!("-> {} ({})", request.action_name(), request.lane().as_str()),
            Err(e) => {
                eprintln!("Not a JSON object: {}", e);
                continue;
            }
        }

        ws.send(Message::Text(trimmed.to_string())).await?;

        // Print everything that arrives until the connection goes quiet.
        loop {
            match timeout(quiet, ws.next()).await {
                Ok(Some(Ok(Message::Text(text)))) => println!("<< {}", text),
                Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {
                    println!("Server closed the connection.");
                    return Ok(());
                }
                Ok(Some(Ok(_))) => continue,
                Ok(Some(Err(e))) => {
                    eprintln!("Read error: {:?}", e);
                    return Ok(());
                }
                // Timed out waiting for the next frame.
                Err(_) => break,
            }
        }
    }

    ws.close(None).await?;
    Ok(())
}
