//! CLI entry point for `mailchunk`: inspect one mbox record.

use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use serde::Serialize;

use mailchunk::config::{self, Config};
use mailchunk::{Chunk, MboxSource, Message, MessageIdentity};

#[derive(Parser)]
#[command(
    name = "mailchunk",
    version,
    about = "Parse one mbox record and show its headers and body chunks"
)]
struct Cli {
    /// MBOX file to read
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Byte offset of the record's `From ` line
    #[arg(short, long, default_value_t = 0)]
    offset: u64,

    /// Print the parsed record as JSON
    #[arg(long)]
    json: bool,

    /// Print the raw record instead of parsing the body
    #[arg(long, conflicts_with = "json")]
    raw: bool,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Serialize)]
struct Report<'a> {
    offset: u64,
    identity: &'a MessageIdentity,
    labels: Vec<&'a str>,
    snippet: Option<&'a str>,
    chunks: &'a [Chunk],
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    if !cli.file.exists() {
        anyhow::bail!("File not found: {}", cli.file.display());
    }

    let mut source = MboxSource::open(&cli.file)?;
    let mut message = Message::load(&mut source, cli.offset, &config.headers)?;

    if cli.raw {
        let raw = message.raw_message(&mut source)?;
        std::io::stdout().write_all(&raw)?;
        return Ok(());
    }

    message.chunks(&mut source, &config.chunking);
    let chunks = message.cached_chunks().unwrap_or_default();

    if cli.json {
        let report = Report {
            offset: cli.offset,
            identity: &message.identity,
            labels: message.labels().collect(),
            snippet: message.snippet(),
            chunks,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_identity(&message);
        println!();
        for chunk in chunks {
            print_chunk(chunk);
        }
    }

    Ok(())
}

fn print_identity(message: &Message) {
    let id = &message.identity;
    let join = |addrs: &[mailchunk::Address]| {
        addrs
            .iter()
            .map(|a| a.full_address())
            .collect::<Vec<_>>()
            .join(", ")
    };

    println!("Message-ID:  {}", id.message_id);
    println!("Date:        {}", id.date.to_rfc2822());
    if let Some(from) = &id.from {
        println!("From:        {}", from.full_address());
    }
    if !id.to.is_empty() {
        println!("To:          {}", join(&id.to));
    }
    if !id.cc.is_empty() {
        println!("Cc:          {}", join(&id.cc));
    }
    println!("Subject:     {}", id.subject);
    if !id.in_reply_to.is_empty() {
        println!("In-Reply-To: {}", id.in_reply_to.join(" "));
    }
    if !id.references.is_empty() {
        println!("References:  {}", id.references.join(" "));
    }
    if let Some(list) = &id.list_address {
        println!("List:        {}", list.email);
    }
    println!("Labels:      {}", message.labels().collect::<Vec<_>>().join(" "));
    if let Some(snippet) = message.snippet() {
        println!("Snippet:     {snippet}");
    }
}

fn print_chunk(chunk: &Chunk) {
    match chunk {
        Chunk::Text(lines) => lines.iter().for_each(|l| println!("  {l}")),
        Chunk::Quote(lines) => lines.iter().for_each(|l| println!("| {l}")),
        Chunk::Signature(lines) => lines.iter().for_each(|l| println!("~ {l}")),
        Chunk::Attachment(a) => {
            let name = a.filename.as_deref().unwrap_or("unnamed");
            println!(
                "[attachment: {name} ({}, {} bytes)]",
                a.content_type, a.part.size
            );
        }
    }
}

/// Configure tracing: stderr plus a log file in the cache directory.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mailchunk.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}
