//! RESP-speaking TCP front end for `misaka-core`: one accept loop, one
//! task per connection, dispatching parsed commands straight to a shared
//! [`Engine`] and writing back RESP replies.

pub mod commands;
pub mod resp;

use crate::resp::Reply;
use misaka_core::Engine;
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// Accepts connections on `listener` forever, spawning one task per
/// connection against the shared `engine`. Returns only on an accept error.
pub async fn serve(listener: TcpListener, engine: Arc<Engine>) -> std::io::Result<()> {
    loop {
        let (socket, peer) = listener.accept().await?;
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            tracing::debug!(%peer, "connection opened");
            if let Err(err) = handle_connection(socket, engine).await {
                tracing::warn!(%peer, %err, "connection ended with an error");
            }
        });
    }
}

/// Drives one client connection until it sends `quit`, disconnects, or
/// submits a frame that fails to parse.
pub async fn handle_connection(socket: TcpStream, engine: Arc<Engine>) -> anyhow::Result<()> {
    let (reader, mut writer) = socket.into_split();
    let mut reader = BufReader::new(reader);

    loop {
        let command = match resp::read_command(&mut reader).await {
            Ok(Some(command)) => command,
            Ok(None) => return Ok(()),
            Err(err) => {
                let reply = Reply::Error(format!("ERR protocol error: {err}"));
                reply.write_to(&mut writer).await?;
                return Ok(());
            }
        };
        if command.is_empty() {
            continue;
        }
        if command[0].eq_ignore_ascii_case(b"quit") {
            Reply::ok().write_to(&mut writer).await?;
            writer.shutdown().await?;
            return Ok(());
        }

        let reply = commands::dispatch(&engine, &command);
        reply.write_to(&mut writer).await?;
    }
}
