use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use webagent::cli::{Cli, Commands};
use webagent::env::remote::RemoteBrowserFactory;
use webagent::env::SessionFactory;
use webagent::gateway;
use webagent::providers::create_provider;
use webagent::{Agent, Config, Task};

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let cli = Cli::parse();
    let mut config = Config::load_or_default()?;

    match cli.command {
        Commands::Run {
            url,
            task,
            num_history,
            kwargs,
            max_actions,
            provider,
            model,
            api_key,
            browser_url,
        } => {
            url::Url::parse(&url).context("invalid --url")?;
            if let Some(provider) = provider {
                config.provider.0 = provider;
            }
            if let Some(model) = model {
                config.model.name = model;
            }
            if let Some(browser_url) = browser_url {
                config.browser_url.0 = browser_url;
            }
            config.agent.history_window = num_history;
            let max_actions = max_actions.unwrap_or(config.agent.max_actions);

            let args = match kwargs {
                Some(raw) => serde_json::from_str(&raw)
                    .context("--kwargs must be a JSON object")?,
                None => serde_json::Map::new(),
            };

            let provider = create_provider(&config.provider.0, api_key.as_deref())?;
            let sessions: Arc<dyn SessionFactory> =
                Arc::new(RemoteBrowserFactory::new(&config.browser_url.0)?);
            let agent = Agent::new(provider, sessions, &config);

            let (status, output) = agent
                .run(&url, &Task::new(task, args), max_actions)
                .await?;

            println!("Status: {status}");
            match output {
                Some(map) => println!(
                    "Output: {}",
                    serde_json::to_string_pretty(&serde_json::Value::Object(map))?
                ),
                None => println!("Output: null"),
            }
            Ok(())
        }
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.gateway.host.clone());
            let port = port.unwrap_or(config.gateway.port);
            gateway::run_gateway(&host, port, config).await
        }
    }
}
