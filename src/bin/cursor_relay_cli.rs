//! cursor-relay CLI — 向上游发送一次对话并流式打印回复
//!
//! Usage:
//!   cursor-relay-cli chat [--model <name>] <prompt>   Stream one reply to stdout
//!   cursor-relay-cli models                           List known models
//!   cursor-relay-cli version                          Show version information

use anyhow::Context;
use cursor_relay::client::supported_models;
use cursor_relay::{Message, RelayClient, RelayConfig, StreamEvent};
use futures::StreamExt;
use std::io::Write;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    match args[1].as_str() {
        "chat" => cmd_chat(&args[2..]).await,
        "models" => {
            cmd_models();
            Ok(())
        }
        "version" | "--version" | "-V" => {
            println!("cursor-relay-cli {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    println!(
        r#"cursor-relay-cli — 对话中继命令行工具

USAGE:
    cursor-relay-cli <COMMAND> [OPTIONS]

COMMANDS:
    chat [--model <name>] <prompt>   Send one user message and stream the reply
    models                           List known models
    version                          Show version information
    help                             Show this help message

ENVIRONMENT:
    SCRIPT_URL, TIMEOUT, MAX_INPUT_LENGTH, USER_AGENT, UNMASKED_VENDOR_WEBGL,
    UNMASKED_RENDERER_WEBGL, SYSTEM_PROMPT_INJECT, SCRIPT_DIR, CURSOR_UPSTREAM_URL,
    RELAY_PROXY_URL, RUST_LOG"#
    );
}

fn parse_chat_args(args: &[String]) -> anyhow::Result<(String, String)> {
    let mut model = String::from("claude-sonnet-4.6");
    let mut prompt = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--model" {
            model = iter.next().context("--model needs a value")?.clone();
        } else {
            prompt.push(arg.as_str());
        }
    }
    if prompt.is_empty() {
        anyhow::bail!("missing prompt");
    }
    Ok((model, prompt.join(" ")))
}

async fn cmd_chat(args: &[String]) -> anyhow::Result<()> {
    let (model, prompt) = parse_chat_args(args)?;
    let client = RelayClient::new(RelayConfig::from_env()).context("failed to build client")?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let mut stream = client
        .chat()
        .model(model)
        .message(Message::user(prompt))
        .cancel_token(cancel)
        .execute_stream()
        .await
        .map_err(|e| {
            let resp = e.to_response();
            anyhow::anyhow!("[{}] {}", resp.status, resp.message)
        })?;

    let mut stdout = std::io::stdout();
    while let Some(event) = stream.next().await {
        match event {
            StreamEvent::Data(chunk) if chunk.is_text_delta() => {
                if let Some(delta) = chunk.delta {
                    stdout.write_all(delta.as_bytes())?;
                    stdout.flush()?;
                }
            }
            StreamEvent::Data(_) => {}
            StreamEvent::Error(err) => anyhow::bail!("[{}] {}", err.status, err.message),
            StreamEvent::Done => break,
        }
    }
    writeln!(stdout)?;
    Ok(())
}

fn cmd_models() {
    for m in supported_models() {
        println!("{:<20} {:<30} {}", m.name, m.id, m.context_window);
    }
}
