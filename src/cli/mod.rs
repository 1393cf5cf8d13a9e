use clap::{Parser, Subcommand};

/// `webagent` - LLM-driven web automation agent.
#[derive(Parser, Debug)]
#[command(name = "webagent")]
#[command(version = "0.1.0")]
#[command(about = "Drive a browser with an LLM to accomplish a task.", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one task against a start URL and print the final status
    Run {
        /// URL to act on
        #[arg(long)]
        url: String,

        /// Task to perform, in natural language
        #[arg(long)]
        task: String,

        /// How many historical actions to feed back into the prompt (0 disables)
        #[arg(long, default_value = "0")]
        num_history: usize,

        /// Task arguments as a JSON object, e.g. '{"email": "jo@example.com"}'
        #[arg(long)]
        kwargs: Option<String>,

        /// Action budget for the task
        #[arg(long)]
        max_actions: Option<u32>,

        /// Completion backend (openai, baseten)
        #[arg(short, long)]
        provider: Option<String>,

        /// Model to use
        #[arg(long)]
        model: Option<String>,

        /// API key (falls back to provider env vars)
        #[arg(long)]
        api_key: Option<String>,

        /// Browser sidecar base URL
        #[arg(long)]
        browser_url: Option<String>,
    },

    /// Start the schema-generation gateway
    Serve {
        /// Host to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },
}
