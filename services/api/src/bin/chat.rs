//! services/api/src/bin/chat.rs
//!
//! A terminal chat client that drives the full client pipeline: local
//! session store, streaming controller, and chunk decoder, all against the
//! relay endpoint served by the `api` binary. Session history persists to
//! the state file between runs.

use api_lib::{
    adapters::{relay::HttpRelayTransport, storage::FileStateStore},
    config::Config,
    error::ApiError,
};
use chatrelay_core::{
    parser, CycleError, Segment, SessionStore, StreamObserver, StreamingController,
};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Prints fragments as they arrive, tracking how much of the accumulator
/// has already been written.
struct ConsoleRenderer {
    printed: usize,
}

impl StreamObserver for ConsoleRenderer {
    fn on_update(&mut self, in_flight: &str) {
        print!("{}", &in_flight[self.printed..]);
        let _ = io::stdout().flush();
        self.printed = in_flight.len();
    }

    fn on_error(&mut self, message: &str) {
        eprintln!("\nFailed to get a response ({message}). Please try again.");
    }
}

/// Reprints any code blocks of a finished reply with their language tags,
/// the way the side panel presents them.
fn render_code_blocks(content: &str) {
    for segment in parser::parse(content) {
        if let Segment::Code { language, value } = segment {
            println!("\n[{language}]");
            println!("{value}");
        }
    }
}

fn print_sessions(store: &SessionStore) {
    for (idx, session) in store.sessions().iter().enumerate() {
        let marker = if session.id == store.active_id() {
            "*"
        } else {
            " "
        };
        println!(
            "{marker} {idx}: {} ({} messages)",
            session.name,
            session.messages.len()
        );
    }
}

fn print_help() {
    println!("Commands:");
    println!("  /new            start a new chat");
    println!("  /list           list chats");
    println!("  /select <n>     switch to chat n");
    println!("  /delete <n>     delete chat n");
    println!("  /rename <name>  rename the current chat");
    println!("  /clear          clear the current conversation");
    println!("  /quit           exit");
}

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new("warn"))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let backend = Arc::new(FileStateStore::new(config.state_path.clone()));
    let store = Mutex::new(SessionStore::load(backend));
    let transport = Arc::new(HttpRelayTransport::new(config.relay_url.clone()));
    let mut controller = StreamingController::new(transport);

    println!("Connected to {}", config.relay_url);
    {
        let store = store.lock().await;
        println!(
            "Active chat: {} ({} messages). /help for commands.",
            store.active_session().name,
            store.active_session().messages.len()
        );
    }

    let stdin = io::stdin();
    loop {
        print!("> ");
        let _ = io::stdout().flush();
        let Some(Ok(line)) = stdin.lock().lines().next() else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            let mut store = store.lock().await;
            let (verb, arg) = command.split_once(' ').unwrap_or((command, ""));
            match verb {
                "new" => {
                    store.create_session();
                    println!("Started {}", store.active_session().name);
                }
                "list" => print_sessions(&store),
                "select" => match arg.parse::<usize>().ok().and_then(|n| {
                    store.sessions().get(n).map(|s| s.id.clone())
                }) {
                    Some(id) => {
                        store.select_session(&id);
                        println!("Switched to {}", store.active_session().name);
                    }
                    None => println!("No such chat: {arg}"),
                },
                "delete" => match arg.parse::<usize>().ok().and_then(|n| {
                    store.sessions().get(n).map(|s| s.id.clone())
                }) {
                    Some(id) => store.delete_session(&id),
                    None => println!("No such chat: {arg}"),
                },
                "rename" => {
                    let id = store.active_id().to_string();
                    store.rename_session(&id, arg);
                }
                "clear" => {
                    let id = store.active_id().to_string();
                    store.clear_messages(&id);
                    println!("Conversation cleared");
                }
                "quit" | "exit" => break,
                _ => print_help(),
            }
            continue;
        }

        let mut renderer = ConsoleRenderer { printed: 0 };
        match controller.submit(&store, line, &mut renderer).await {
            Ok(reply) => {
                println!();
                render_code_blocks(&reply.content);
            }
            Err(CycleError::Busy) => println!("Still waiting on the previous reply."),
            Err(CycleError::EmptyInput) => {}
            // The renderer already reported the failure; the typed message
            // stays in history so resubmitting retries with full context.
            Err(CycleError::Port(_)) => {}
        }
    }

    Ok(())
}
