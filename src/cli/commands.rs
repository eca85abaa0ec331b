use clap::{Parser, Subcommand};

use crate::llm::ProviderKind;

#[derive(Parser)]
#[command(name = "stratify", version, about = "Domain-scoped AI chat assistant", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the config file path globally
    #[arg(short, long, global = true, default_value = "config.yaml")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API (chat, conversations and the search proxy)
    Serve,

    /// Enter interactive chat REPL mode
    Chat {
        /// Continue an existing conversation instead of starting a new one
        #[arg(long)]
        conversation: Option<String>,

        /// Model backing this session (defaults to the configured provider)
        #[arg(short, long, value_enum)]
        provider: Option<ProviderKind>,
    },

    /// Manage stored conversations
    Conversations {
        #[command(subcommand)]
        action: ConversationAction,
    },
}

#[derive(Subcommand)]
pub enum ConversationAction {
    /// List all conversations, newest first
    List,

    /// Print every message of a conversation
    Show { id: String },

    /// Delete a conversation
    Delete { id: String },

    /// Delete every conversation
    Clear,

    /// Export a conversation to a .txt file
    Export {
        id: String,
        /// The path to the output file (optional)
        #[arg(short, long)]
        path: Option<String>,
    },
}
