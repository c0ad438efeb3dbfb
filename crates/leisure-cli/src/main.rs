//! Leisure command-line client.
//!
//! Usage:
//!   # Print the document the session is attached to
//!   leisure --doc notes.org document
//!
//!   # Follow the session, printing the document after every update
//!   leisure --session notes watch
//!
//!   # Read and replace a named data cell
//!   leisure get counter
//!   leisure set counter '{"n": 2}'
//!
//! Settings come from `~/.config/leisure/client.ron` (or `--config`), with
//! flags taking precedence. Set `RUST_LOG` for more detail.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::{EnvFilter, fmt};

use leisure_client::{ClientConfig, LiveDocument, SessionClient};
use leisure_types::{ChunkId, Edit, Replacement};

#[derive(Parser, Debug)]
#[command(name = "leisure")]
#[command(about = "Client for live Leisure documents")]
struct Args {
    /// Config file (RON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Server base URL, e.g. http://localhost:7315
    #[arg(long)]
    server: Option<String>,

    /// Session name
    #[arg(short, long)]
    session: Option<String>,

    /// Document to attach the session to
    #[arg(short, long)]
    doc: Option<String>,

    /// Ask for the bare document text instead of chunks
    #[arg(long)]
    plain: bool,

    /// Take over the session even if another client holds it
    #[arg(long)]
    force: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect and summarize the document
    Connect,
    /// Follow the session until it fails or Ctrl-C
    Watch {
        /// Print rendered HTML instead of document text
        #[arg(long)]
        html: bool,
    },
    /// Print the full document text
    Document,
    /// Print the value of a named data cell
    Get { name: String },
    /// Replace the value of a named data cell (JSON)
    Set { name: String, value: String },
    /// List chunks carrying a tag
    Tag { tag: String },
    /// Replace characters of the document
    Edit {
        /// Offset of the replaced range; -1 replaces everything
        offset: i64,
        /// Length of the replaced range
        length: i64,
        text: String,
    },
    /// Replace the whole text of one chunk
    Replace { chunk: String, text: String },
    /// Create a session on a document without connecting
    Create { document: String },
    /// List sessions known to the server
    List,
    /// Close the session
    Close,
}

impl Args {
    fn client_config(&self) -> Result<ClientConfig> {
        let mut config = ClientConfig::discover(self.config.as_deref())?;
        if let Some(server) = &self.server {
            config.server = server.clone();
        }
        if let Some(session) = &self.session {
            config.session = session.clone();
        }
        if let Some(doc) = &self.doc {
            config.document = Some(doc.clone());
        }
        if self.plain {
            config.org = false;
        }
        config.force |= self.force;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries command output
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.client_config()?;
    tracing::debug!(?config, "resolved config");
    let client = Arc::new(SessionClient::from_config(config)?);

    match args.command {
        // These don't need a connected session
        Command::Create { document } => print_json(&client.create(&document).await?),
        Command::List => print_json(&client.list().await?),
        command => {
            let doc = LiveDocument::new(client);
            doc.connect().await?;
            run(&doc, command).await?;
            doc.close().await?;
            Ok(())
        }
    }
}

async fn run(doc: &LiveDocument, command: Command) -> Result<()> {
    match command {
        Command::Connect => {
            if doc.is_plain() {
                println!("plain document, {} chars", doc.text().chars().count());
            } else {
                let engine = doc.engine();
                println!(
                    "{} chunks, {} nodes, {} named",
                    engine.model().len(),
                    engine.tree().len(),
                    engine.index().names().count()
                );
            }
        }
        Command::Watch { html } => watch(doc, html).await?,
        Command::Document => print!("{}", doc.client().document().await?),
        Command::Get { name } => print_json(&doc.get(&name).await?)?,
        Command::Set { name, value } => {
            let value: Value =
                serde_json::from_str(&value).with_context(|| format!("value for {name} is not JSON"))?;
            doc.set(&name, &value).await?;
            if let Some(current) = doc.engine().value(&name) {
                print_json(current)?;
            }
        }
        Command::Tag { tag } => print_json(&doc.client().tag(&tag).await?)?,
        Command::Edit {
            offset,
            length,
            text,
        } => {
            doc.edit(&Edit::unselected(vec![Replacement::splice(offset, length, text)]))
                .await?;
            print!("{}", doc.text());
        }
        Command::Replace { chunk, text } => {
            doc.edit(&Edit::unselected(vec![Replacement::chunk(ChunkId::new(chunk), text)]))
                .await?;
            print!("{}", doc.text());
        }
        Command::Close | Command::Create { .. } | Command::List => {}
    }
    Ok(())
}

async fn watch(doc: &LiveDocument, html: bool) -> Result<()> {
    let show = |doc: &LiveDocument| {
        if html && !doc.is_plain() {
            println!("{}", doc.engine().to_html());
        } else {
            print!("{}", doc.text());
        }
    };
    show(doc);

    let driven = doc.client().drive(Edit::empty, |update| {
        if update.is_empty() {
            return Ok(());
        }
        doc.apply(update)?;
        show(doc);
        Ok(())
    });

    tokio::select! {
        err = driven => Err(anyhow::Error::new(err).context("session ended")),
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("interrupted, closing session");
            Ok(())
        }
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
