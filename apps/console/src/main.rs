use anyhow::Result;
use clap::{Parser, Subcommand};
use client_core::{load_settings, CallsClient, ClientEvent, ViewState};
use shared::domain::{CallId, CallRecord};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    /// Overrides `server_url` from client.toml and the environment.
    #[arg(long, env = "CALLS_SERVER_URL")]
    server_url: Option<String>,
    #[arg(long)]
    page_size: Option<u32>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print one page of calls.
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value = "")]
        search: String,
    },
    /// Delete a call by id.
    Delete { id: String },
    /// Follow live updates until interrupted.
    Watch {
        #[arg(long, default_value = "")]
        search: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }
    if let Some(page_size) = args.page_size.filter(|size| *size > 0) {
        settings.page_size = page_size;
    }
    let client = CallsClient::new(settings)?;

    match args.command {
        Command::List { page, search } => {
            client.fetch_page(page, &search).await?;
            print_view(&client.snapshot().await);
        }
        Command::Delete { id } => {
            let id = CallId::new(id);
            client.delete_call(&id).await?;
            println!("deleted {id}");
        }
        Command::Watch { search } => {
            client.fetch_page(1, &search).await?;
            print_view(&client.snapshot().await);
            watch(&client).await?;
        }
    }

    client.shutdown().await;
    Ok(())
}

async fn watch(client: &CallsClient) -> Result<()> {
    let mut events = client.subscribe_events();
    client.start_live_updates().await;
    let mut head = client.snapshot().await.calls.first().map(|c| c.id.clone());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(ClientEvent::ViewUpdated(view)) => {
                    let newest = view.calls.first().map(|c| c.id.clone());
                    if newest != head {
                        if let Some(call) = view.calls.first() {
                            println!("+ {}", summary(call));
                        }
                        head = newest;
                    }
                }
                Ok(ClientEvent::ChannelStateChanged(state)) => {
                    tracing::info!(?state, "live updates");
                }
                Ok(ClientEvent::Error(err)) => eprintln!("! {}", err.user_message()),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "dropped client events");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}

fn print_view(view: &ViewState) {
    for call in &view.calls {
        println!("{}", summary(call));
    }
    let meta = view.pagination;
    println!(
        "page {}/{} ({} calls{})",
        meta.current_page,
        meta.pages,
        meta.total,
        if view.search.is_empty() {
            String::new()
        } else {
            format!(", search \"{}\"", view.search)
        }
    );
}

fn summary(call: &CallRecord) -> String {
    format!(
        "{}  {}  {} ({}) -> {} ({})  {}",
        call.id,
        call.created_at.format("%Y-%m-%d %H:%M"),
        call.caller_name,
        call.caller_number,
        call.callee_name,
        call.callee_number,
        call.duration
    )
}
