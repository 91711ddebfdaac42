//! Exercises `misaka_cli::resp`'s client-side codec against a real
//! `misaka-server` instance, over a blocking `std::net::TcpStream` the way
//! the interactive REPL itself talks to the wire.

use misaka_cli::resp::{self, Reply};
use misaka_core::{Engine, MisakaConfig};
use std::net::TcpStream;

/// Starts a `misaka-server` on a background Tokio runtime thread and
/// returns its bound address once the listener is ready.
fn start_server(data_dir: &std::path::Path) -> std::net::SocketAddr {
    let mut config = MisakaConfig::default();
    config.storage.data_dir = data_dir.to_path_buf();

    let (addr_tx, addr_rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async move {
            let engine = Engine::open(&config).unwrap();
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            addr_tx.send(listener.local_addr().unwrap()).unwrap();
            misaka_server::serve(listener, engine).await.unwrap();
        });
    });
    addr_rx.recv().unwrap()
}

#[test]
fn set_and_get_round_trip_through_the_client_codec() {
    let dir = tempfile::tempdir().unwrap();
    let addr = start_server(dir.path());
    let mut stream = TcpStream::connect(addr).unwrap();

    let reply = resp::send_command(&mut stream, &["set".into(), "apple".into(), "pie".into()]).unwrap();
    assert!(matches!(reply, Reply::Simple(s) if s == "OK"));

    let reply = resp::send_command(&mut stream, &["get".into(), "apple".into()]).unwrap();
    assert!(matches!(reply, Reply::Bulk(Some(v)) if v == b"pie"));
}

#[test]
fn missing_key_decodes_as_nil_bulk() {
    let dir = tempfile::tempdir().unwrap();
    let addr = start_server(dir.path());
    let mut stream = TcpStream::connect(addr).unwrap();

    let reply = resp::send_command(&mut stream, &["get".into(), "missing".into()]).unwrap();
    assert!(matches!(reply, Reply::Bulk(None)));
}

#[test]
fn unknown_command_decodes_as_error() {
    let dir = tempfile::tempdir().unwrap();
    let addr = start_server(dir.path());
    let mut stream = TcpStream::connect(addr).unwrap();

    let reply = resp::send_command(&mut stream, &["frobnicate".into()]).unwrap();
    assert!(matches!(reply, Reply::Error(_)));
}
