//! Secure chat line client.
//!
//! # Usage
//!
//! ```bash
//! # Local demo stack
//! qchat --node 0
//!
//! # Remote API, exponential reconnect backoff
//! QCHAT_API_URL=https://qkd.example QCHAT_WS_URL=wss://qkd.example \
//!     qchat --retry-ms 500 --max-retry-ms 30000
//! ```
//!
//! Type `/join <node>`, then `/send <to> <text>`. Bare text goes to the last
//! recipient. `/decrypt <id>` reveals a received message, `/log` lists the
//! session, `/quit` exits.

mod commands;
mod output;
mod prompt;

use std::{io::Write, time::Duration};

use clap::Parser;
use qchat_client::{
    ChatHandle, ClientConfig, Runtime, SystemEnv,
    config::{DEFAULT_API_URL, DEFAULT_WS_URL},
    http::HttpControlPlane,
    ws::WsTransport,
};
use qchat_core::RetryPolicy;
use qchat_proto::NodeId;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    task::LocalSet,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::prompt::{Prompt, Request};

/// Secure chat client
#[derive(Parser, Debug)]
#[command(name = "qchat")]
#[command(about = "Line client for the QKD secure chat channel")]
#[command(version)]
struct Args {
    /// Base URL of the chat API
    #[arg(long, env = "QCHAT_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Base URL of the push channel
    #[arg(long, env = "QCHAT_WS_URL", default_value = DEFAULT_WS_URL)]
    ws_url: String,

    /// Reconnect delay in milliseconds
    #[arg(long, default_value_t = 2000)]
    retry_ms: u64,

    /// Upper bound for exponential backoff; fixed delay when absent
    #[arg(long)]
    max_retry_ms: Option<u64>,

    /// Node to send as before joining a room
    #[arg(short, long)]
    node: Option<NodeId>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

impl Args {
    fn client_config(&self) -> ClientConfig {
        let initial = Duration::from_millis(self.retry_ms);
        let retry = match self.max_retry_ms {
            Some(max) => RetryPolicy::Exponential { initial, max: Duration::from_millis(max) },
            None => RetryPolicy::Fixed(initial),
        };

        ClientConfig {
            api_url: self.api_url.clone(),
            ws_url: self.ws_url.clone(),
            retry,
            ..ClientConfig::default()
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    // stdout belongs to the conversation
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = args.client_config();
    tracing::info!(ws = %config.ws_endpoint(), api = %config.api_url, "qchat starting");

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    LocalSet::new().block_on(&runtime, run(config, args.node))
}

async fn run(
    config: ClientConfig,
    node: Option<NodeId>,
) -> Result<(), Box<dyn std::error::Error>> {
    let control = HttpControlPlane::new(&config)?;
    let (chat, handle, mut events) =
        Runtime::new(&config, WsTransport::new(), control, SystemEnv::new());

    let driver = tokio::task::spawn_local(chat.run());
    let printer = tokio::task::spawn_local(async move {
        while let Some(event) = events.recv().await {
            if let Some(line) = output::event_line(&event) {
                say(&line);
            }
        }
    });

    let mut prompt = Prompt::new(node);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let command = match commands::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(error) => {
                say(&format!("! {error}"));
                continue;
            },
        };
        match prompt.resolve(command) {
            Ok(Request::Quit) => break,
            Ok(request) => {
                tokio::task::spawn_local(execute(handle.clone(), request));
            },
            Err(error) => say(&format!("! {error}")),
        }
        if handle.is_closed() {
            break;
        }
    }

    handle.close();
    driver.await??;
    printer.await?;
    Ok(())
}

async fn execute(handle: ChatHandle, request: Request) {
    let result = match request {
        Request::Join(room) => handle.join(room).await.map(|()| None),
        Request::Send { sender, receiver, text } => {
            handle.send_message(sender, receiver, text).await.map(|_| None)
        },
        Request::Decrypt(id) => {
            handle.decrypt(id).await.map(|text| Some(format!("#{id} decrypted: {text}")))
        },
        Request::Log => handle.records().await.map(|records| {
            if records.is_empty() {
                return Some(String::from("* log is empty"));
            }
            Some(records.iter().map(output::record_line).collect::<Vec<_>>().join("\n"))
        }),
        Request::Quit => Ok(None),
    };

    match result {
        Ok(Some(text)) => say(&text),
        Ok(None) => {},
        Err(error) => say(&format!("! {error}")),
    }
}

fn say(line: &str) {
    let _ = writeln!(std::io::stdout(), "{line}");
}
