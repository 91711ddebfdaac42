//! `misaka-cli` - a plain `std::io` REPL that connects to a running
//! `misaka-server`, frames each typed line as a multi-bulk command, and
//! prints the decoded reply.

use clap::Parser;
use colored::Colorize;
use misaka_cli::resp::{self, Reply};
use misaka_cli::tokenize;
use std::io::{self, Write};
use std::net::TcpStream;

/// Interactive client for a `misaka-server` instance.
#[derive(Parser, Debug)]
#[command(name = "misaka-cli")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address of the `misaka-server` instance to connect to.
    #[arg(short, long, default_value = "127.0.0.1:6380")]
    addr: String,
}

/// Outcome of one REPL-internal (dot-prefixed) command.
enum CommandResult {
    Continue,
    Quit,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut stream = TcpStream::connect(&args.addr)?;
    println!("{}", format!("connected to misaka-server at {}", args.addr).green());
    println!("type {} for usage, {} to leave", ".help".bold(), ".quit".bold());

    let stdin = io::stdin();
    loop {
        print!("misaka> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            println!();
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match handle_line(&mut stream, line) {
            Ok(CommandResult::Continue) => {}
            Ok(CommandResult::Quit) => break,
            Err(err) => println!("{} {err}", "error:".red().bold()),
        }
    }
    Ok(())
}

fn handle_line(stream: &mut TcpStream, line: &str) -> anyhow::Result<CommandResult> {
    match line {
        ".quit" | ".exit" | ".q" => {
            let _ = resp::send_command(stream, &["quit".to_string()]);
            return Ok(CommandResult::Quit);
        }
        ".help" | ".h" => {
            print_help();
            return Ok(CommandResult::Continue);
        }
        _ => {}
    }

    let args = tokenize::tokenize(line);
    if args.is_empty() {
        return Ok(CommandResult::Continue);
    }
    let reply = resp::send_command(stream, &args)?;
    print_reply(&reply, 0);
    Ok(CommandResult::Continue)
}

fn print_reply(reply: &Reply, depth: usize) {
    let indent = "  ".repeat(depth);
    match reply {
        Reply::Simple(text) => println!("{indent}{}", text.green()),
        Reply::Error(text) => println!("{indent}{}", text.red()),
        Reply::Integer(value) => println!("{indent}{}", value.to_string().cyan()),
        Reply::Bulk(None) => println!("{indent}{}", "(nil)".dimmed()),
        Reply::Bulk(Some(bytes)) => println!("{indent}{}", String::from_utf8_lossy(bytes)),
        Reply::Array(items) => {
            if items.is_empty() {
                println!("{indent}{}", "(empty array)".dimmed());
                return;
            }
            for (i, item) in items.iter().enumerate() {
                print!("{indent}{}) ", i + 1);
                print_reply(item, 0);
            }
        }
    }
}

fn print_help() {
    println!(
        "{}",
        r#"
Commands recognised by misaka-server (forwarded as typed):
  ping
  set key value [ex seconds | px milliseconds]
  setnx key value [ex seconds | px milliseconds]
  get key
  getrange key start end
  getset key value [ex seconds | px milliseconds]
  append key value
  del key
  hset key field value
  hsetnx key field value
  hget key field
  hdel key field
  hlen key
  hexists key field
  hstrlen key field
  lpush key value [ex seconds | px milliseconds]
  lpop key
  linsert key index value [ex seconds | px milliseconds]
  lset key index value
  lrem key count value
  llen key
  lindex key index
  lrange key start end
  zadd key score member [ex seconds | px milliseconds]
  zrem key member
  zscore key member
  zcard key
  zcount key lo hi
  zrange key lo hi

REPL-only commands:
  .help, .h           show this message
  .quit, .exit, .q    close the connection and exit
"#
        .trim_end()
    );
}
