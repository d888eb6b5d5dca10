use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use spoolmail::smtp::mime;
use spoolmail::{Config, MemoryMessageSpool, Message, MessageSpool, SmtpServer, logging};
use tracing::info;

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const PREVIEW_CHARS: usize = 80;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Server domain used in replies and trace headers
    #[arg(short, long)]
    domain: Option<String>,

    /// Domain whose recipients are accepted
    #[arg(long)]
    local_domain: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init();

    let mut config = match &args.config {
        Some(path) => Config::load(path).context("loading configuration")?,
        None => Config::default(),
    };
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(domain) = args.domain {
        config.domain = domain;
    }
    if let Some(local_domain) = args.local_domain {
        config.local_domain = Some(local_domain);
    }

    let spool = Arc::new(MemoryMessageSpool::new());
    let server = SmtpServer::from_config(&config, spool.clone());

    thread::Builder::new()
        .name("spool-consumer".to_owned())
        .spawn(move || consume(&spool))
        .context("starting spool consumer")?;

    server
        .start(config.listen)
        .with_context(|| format!("serving on {}", config.listen))?;

    Ok(())
}

fn consume(spool: &MemoryMessageSpool) {
    let mut count = 0u64;
    loop {
        while let Some(message) = spool.next_message() {
            count += 1;
            log_message(count, &message);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn log_message(count: u64, message: &Message) {
    let from = message
        .from_address()
        .map(ToString::to_string)
        .unwrap_or_default();
    let to: Vec<&str> = message.to_addresses().iter().map(|a| a.full()).collect();

    let preview = message
        .body()
        .map(|body| mime::decode_body(message.headers(), body))
        .map(|body| body.chars().take(PREVIEW_CHARS).collect::<String>())
        .unwrap_or_default();

    info!(
        count,
        %from,
        to = ?to,
        subject = message.subject().unwrap_or(""),
        parts = message.parts().len(),
        size = message.data_size(),
        preview = ?preview,
        "received message"
    );
}
