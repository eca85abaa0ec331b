pub mod commands;

use std::io::{self, Write};
use std::path::Path;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use crate::app::{AppError, AppState, TurnOutcome};
use crate::cli::commands::{Commands, ConversationAction};
use crate::config::AppConfig;
use crate::llm::ProviderKind;
use crate::store::{files::load_file, Conversation};

pub async fn run_cli(command: Commands, config_path: String) -> Result<(), AppError> {
    let mut config = AppConfig::load(&config_path)?;
    if matches!(command, Commands::Chat { .. }) {
        config.search.bypass_proxy();
    }
    let state = AppState::open(config)?;

    match command {
        Commands::Serve => {
            warn!("Serve command should be intercepted by main.rs to boot actix-web");
            Ok(())
        }
        Commands::Conversations { action } => run_conversation_action(&state, action),
        Commands::Chat {
            conversation,
            provider,
        } => {
            let provider = provider.unwrap_or_else(|| state.default_provider());
            run_repl(&state, conversation, provider).await
        }
    }
}

fn run_conversation_action(state: &AppState, action: ConversationAction) -> Result<(), AppError> {
    match action {
        ConversationAction::List => {
            let store = state.store();
            if store.conversations().is_empty() {
                println!("No conversations found.");
                return Ok(());
            }
            println!("{:<38} | {:<24} | {:>5} | {}", "ID", "Updated At", "Msgs", "Title");
            println!("{:-<38}-+-{:-<24}-+-{:->5}-+-{:-<20}", "", "", "", "");
            for c in store.conversations() {
                println!(
                    "{:<38} | {:<24} | {:>5} | {}",
                    c.id,
                    c.updated_at.to_rfc3339(),
                    c.messages.len(),
                    c.title
                );
            }
        }
        ConversationAction::Show { id } => {
            let store = state.store();
            match store.conversation(&id) {
                Some(c) => print!("{}", render_transcript(c)),
                None => eprintln!("Conversation {} not found.", id),
            }
        }
        ConversationAction::Delete { id } => {
            if state.delete_conversation(&id)? {
                println!("Deleted conversation {}", id);
            } else {
                eprintln!("Conversation {} not found.", id);
            }
        }
        ConversationAction::Clear => {
            state.clear_all()?;
            println!("All conversations deleted.");
        }
        ConversationAction::Export { id, path } => {
            let transcript = match state.store().conversation(&id) {
                Some(c) => render_transcript(c),
                None => {
                    eprintln!("Conversation {} not found.", id);
                    return Ok(());
                }
            };
            let export_path = path.unwrap_or_else(|| format!("conversation_{}.txt", id));
            std::fs::write(&export_path, transcript)?;
            println!("Conversation exported successfully to: {}", export_path);
        }
    }
    Ok(())
}

/// Plain-text transcript: a header, then `[ROLE]: content` blocks split by `---`.
pub fn render_transcript(conversation: &Conversation) -> String {
    let mut out = String::new();
    out.push_str(&format!("Conversation: {}\n", conversation.title));
    out.push_str(&format!("ID: {}\n", conversation.id));
    out.push_str(&format!("Created At: {}\n", conversation.created_at.to_rfc3339()));
    out.push_str("---\n");
    for m in &conversation.messages {
        out.push_str(&format!("[{}]: {}\n", m.role.as_str().to_uppercase(), m.content));
        out.push_str("---\n");
    }
    out
}

fn print_help() {
    println!("Commands:");
    println!("  /new              start a new conversation");
    println!("  /provider <name>  switch between gemini and claude");
    println!("  /upload <path>    attach a file (shared by all conversations)");
    println!("  /files            list attached files");
    println!("  /clear-files      detach all files");
    println!("  /exit             quit");
    println!("Press Ctrl-C while a reply is streaming to stop it.");
}

fn prompt(label: &str) {
    print!("\n{}> ", label);
    let _ = io::stdout().flush();
}

async fn run_repl(
    state: &AppState,
    conversation: Option<String>,
    mut provider: ProviderKind,
) -> Result<(), AppError> {
    if let Some(id) = conversation.as_deref() {
        if state.store().conversation(id).is_none() {
            eprintln!("Conversation {} not found.", id);
            return Ok(());
        }
    }
    let mut conversation_id = conversation;
    let product = state.service.product().display_name();

    println!("--- {} Terminal Chat ---", product);
    match conversation_id.as_deref() {
        Some(id) => println!("Continuing conversation: {}", id),
        None => println!("A new conversation starts with your first message."),
    }
    println!("Provider: {}. Type /help for commands, /exit to quit.", provider);
    println!("---------------------------");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        prompt("You");
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let text = line.trim();

        if text == "/exit" || text == "/quit" {
            break;
        }
        if let Some(command) = text.strip_prefix('/') {
            let (name, arg) = command.split_once(' ').unwrap_or((command, ""));
            match name {
                "help" => print_help(),
                "new" => {
                    conversation_id = None;
                    println!("Started a new conversation.");
                }
                "provider" => match arg.parse::<ProviderKind>() {
                    Ok(p) => {
                        provider = p;
                        println!("Provider set to {}.", provider);
                    }
                    Err(e) => eprintln!("{}", e),
                },
                "upload" => match load_file(Path::new(arg.trim())) {
                    Ok(file) => {
                        println!("Attached {} ({} rows).", file.name, file.content.len());
                        state.add_file(file);
                    }
                    Err(e) => eprintln!("Could not read {}: {}", arg.trim(), e),
                },
                "files" => {
                    let store = state.store();
                    if store.files().is_empty() {
                        println!("No files attached.");
                    }
                    for f in store.files() {
                        println!("  {} ({}, {} rows)", f.name, f.file_type, f.content.len());
                    }
                }
                "clear-files" => {
                    state.store().clear_files();
                    println!("Files detached.");
                }
                other => eprintln!("Unknown command /{}. Type /help.", other),
            }
            continue;
        }

        let (submission, files) = match state.begin_turn(conversation_id.as_deref(), text) {
            Ok(Some(turn)) => turn,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("{}", e.user_message());
                continue;
            }
        };
        let id = submission.conversation_id.clone();
        conversation_id = Some(id.clone());

        print!("{}> ", product);
        let _ = io::stdout().flush();

        let mut printed = 0usize;
        let mut printer = move |text: &str| {
            if let Some(delta) = text.get(printed..) {
                print!("{}", delta);
                let _ = io::stdout().flush();
                printed = text.len();
            }
        };

        let turn = state.run_turn(submission, files, provider, &mut printer);
        tokio::pin!(turn);
        let outcome = tokio::select! {
            outcome = &mut turn => outcome,
            _ = tokio::signal::ctrl_c() => {
                state.stop(&id);
                turn.await
            }
        };
        println!();

        match outcome {
            Ok(TurnOutcome::Completed { .. }) => {}
            Ok(TurnOutcome::Cancelled { .. }) => println!("[stopped]"),
            Err(e) => eprintln!("Error: {}", e.user_message()),
        }
    }

    Ok(())
}
