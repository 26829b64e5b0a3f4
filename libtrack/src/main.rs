// Copyright 2026 The Lib-Track Project
// SPDX-License-Identifier: Apache-2.0

// libtrack-chat: terminal front end for the Lib-Track library assistant.
//
// Usage:
//   libtrack-chat --config libtrack.yaml
//   libtrack-chat --config libtrack.yaml --message "What are the opening hours?"
//   libtrack-chat --no-stream

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::Parser;
use tokio::io::AsyncBufReadExt;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use libtrack::config::{self, FileSource};
use libtrack::conversation::{Conversation, TurnOutcome};
use libtrack::http::ReqwestHttpSender;
use libtrack::message::{ConversationMessage, MessageId, Role};
use libtrack::reconcile::Resolution;

const QUIT_COMMAND: &str = "/quit";

/// Exit status after Ctrl-C at the prompt.
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Parser)]
#[command(name = "libtrack-chat", about = "Chat with the Lib-Track library assistant")]
struct Cli {
    /// Path to the libtrack.yaml config file
    #[arg(long, default_value = "libtrack.yaml", env = "LIBTRACK_CONFIG")]
    config: PathBuf,

    /// Send a single message, print the answer, and exit
    #[arg(long)]
    message: Option<String>,

    /// Use the non-streaming chat endpoint for every turn
    #[arg(long, default_value_t = false)]
    no_stream: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let source = FileSource::new(&cli.config);
    let config = match config::load_config(&source) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("failed to load config: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        base_url = %config.api.base_url,
        user_id = %config.user.user_id,
        streaming = !cli.no_stream,
        "libtrack-chat starting"
    );

    let http = match reqwest::Client::builder().build() {
        Ok(client) => Arc::new(ReqwestHttpSender::new(client)),
        Err(e) => {
            tracing::error!("failed to build HTTP client: {e}");
            std::process::exit(1);
        }
    };

    let conversation = Conversation::new(http, &config).with_streaming(!cli.no_stream);
    let mut renderer = Renderer::default();
    let interrupts = Interrupts::install();

    if let Some(message) = cli.message {
        let outcome = run_turn(&conversation, &mut renderer, &interrupts, &message).await;
        if outcome == Some(TurnOutcome::Resolved(Resolution::Failed)) {
            std::process::exit(2);
        }
        return;
    }

    println!("Lib-Track assistant. Type {QUIT_COMMAND} to leave.");
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("you> ");
        let _ = std::io::stdout().flush();

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("failed to read stdin: {e}");
                std::process::exit(1);
            }
        };
        let line = line.trim();
        if line == QUIT_COMMAND {
            break;
        }
        if line.is_empty() {
            continue;
        }
        run_turn(&conversation, &mut renderer, &interrupts, line).await;
    }
}

/// Routes Ctrl-C for the whole process: it cancels the turn in flight,
/// or exits when no turn is running.
#[derive(Clone, Default)]
struct Interrupts {
    current: Arc<Mutex<Option<CancellationToken>>>,
}

impl Interrupts {
    fn install() -> Self {
        let interrupts = Self::default();
        let listener = interrupts.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if !listener.interrupt() {
                    println!();
                    std::process::exit(INTERRUPTED_EXIT_CODE);
                }
            }
        });
        interrupts
    }

    /// Cancel the turn in flight. `false` when no turn is running.
    fn interrupt(&self) -> bool {
        let turn = self.current.lock().ok().and_then(|mut slot| slot.take());
        match turn {
            Some(cancel) => {
                tracing::info!("turn cancelled by user");
                cancel.cancel();
                true
            }
            None => false,
        }
    }

    fn begin_turn(&self) -> CancellationToken {
        let cancel = CancellationToken::new();
        if let Ok(mut slot) = self.current.lock() {
            *slot = Some(cancel.clone());
        }
        cancel
    }

    fn end_turn(&self) {
        if let Ok(mut slot) = self.current.lock() {
            *slot = None;
        }
    }
}

/// Run one turn while printing transcript changes as they happen.
async fn run_turn(
    conversation: &Conversation,
    renderer: &mut Renderer,
    interrupts: &Interrupts,
    message: &str,
) -> Option<TurnOutcome> {
    let cancel = interrupts.begin_turn();
    let mut updates = conversation.subscribe();

    let result = {
        let turn = conversation.submit_cancellable(message, None, cancel);
        tokio::pin!(turn);
        loop {
            tokio::select! {
                result = &mut turn => break result,
                changed = updates.changed() => {
                    if changed.is_err() {
                        break (&mut turn).await;
                    }
                    let snapshot = updates.borrow_and_update().clone();
                    renderer.render(&snapshot);
                }
            }
        }
    };
    interrupts.end_turn();

    renderer.render(&conversation.transcript().snapshot());
    renderer.end_turn();

    match result {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            eprintln!("{e}");
            None
        }
    }
}

/// Prints assistant messages incrementally: new messages on a new line,
/// appended text as a suffix of the line already shown.
#[derive(Default)]
struct Renderer {
    printed: HashMap<MessageId, usize>,
    open_line: bool,
}

impl Renderer {
    fn render(&mut self, messages: &[ConversationMessage]) {
        let mut out = std::io::stdout().lock();
        for m in messages {
            if m.role == Role::User || m.pending {
                continue;
            }
            match self.printed.get(&m.id).copied() {
                None => {
                    if self.open_line {
                        let _ = writeln!(out);
                    }
                    let _ = write!(out, "assistant> {}", m.text);
                    if let Some(widget) = &m.widget {
                        let _ = write!(out, " [{widget}]");
                    }
                    self.printed.insert(m.id, m.text.len());
                    self.open_line = true;
                }
                Some(shown) if m.text.len() > shown => {
                    if let Some(suffix) = m.text.get(shown..) {
                        let _ = write!(out, "{suffix}");
                    }
                    self.printed.insert(m.id, m.text.len());
                }
                Some(_) => {}
            }
        }
        let _ = out.flush();
    }

    fn end_turn(&mut self) {
        if std::mem::take(&mut self.open_line) {
            println!();
        }
    }
}
