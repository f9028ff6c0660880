use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use dotenvy::dotenv;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use promptbox::config::{Config, ConfigFile, SyncConfig};
use promptbox::prompts::PromptRecord;
use promptbox::prompts::file_repository::FilePromptRepository;
use promptbox::prompts::query::{PromptQuery, SortOrder, categories};
use promptbox::prompts::store::PromptStore;
use promptbox::sync::coordinator::SyncCoordinator;
use promptbox::sync::http_api::HttpApiProvider;
use promptbox::sync::{ProviderKind, build_providers};

#[derive(Parser)]
#[command(name = "promptbox", about = "Prompt collection with edit history and sync")]
enum Cli {
    /// List prompts, most recently updated first
    #[command(alias = "ls")]
    List {
        /// Case-insensitive match on title, content or category
        #[arg(long, short)]
        search: Option<String>,
        #[arg(long, short)]
        category: Option<String>,
        #[arg(long, default_value_t = SortOrder::UpdatedDesc)]
        sort: SortOrder,
    },
    /// Add a new prompt
    Add {
        title: String,
        content: String,
        #[arg(long, short, default_value = "")]
        category: String,
    },
    /// Edit an existing prompt; omitted fields keep their current value
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },
    #[command(alias = "rm")]
    Delete { id: String },
    /// Show a prompt and its history, newest version first
    Show { id: String },
    /// Print the content of one past version
    Version { id: String, version: u32 },
    /// List the categories in use
    Categories,
    /// List configured sync providers
    Providers,
    /// Select the active sync provider (gist or http-api)
    Use { provider: String },
    /// Test the active provider's connection and credentials
    Check,
    /// Upload local prompts, then adopt the remote snapshot
    Sync,
    /// Show recent server-side sync versions (http-api only)
    History,
}

struct App {
    config: Config,
    config_file: Arc<ConfigFile>,
    http_client: Arc<reqwest::Client>,
    store: Arc<PromptStore>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_tree::HierarchicalLayer::new(2).with_targets(true).with_bracketed_fields(false))
        .init();

    let app = App::open(config).await?;
    app.run(cli).await
}

impl App {
    async fn open(config: Config) -> Result<Self> {
        let http_client = Arc::new(
            reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .timeout(Duration::from_secs(30))
                .build()
                .context("failed to build HTTP client")?,
        );

        let repository = Arc::new(FilePromptRepository::new(&config.data_dir));
        let store = Arc::new(PromptStore::new(repository));
        store.load().await?;

        let config_file = Arc::new(ConfigFile::new(config.sync_config_path()));
        Ok(Self {
            config,
            config_file,
            http_client,
            store,
        })
    }

    async fn run(&self, cli: Cli) -> Result<()> {
        match cli {
            Cli::List { search, category, sort } => {
                let query = PromptQuery { search, category, sort };
                let all = self.store.list().await;
                let shown = query.apply(&all);
                for prompt in &shown {
                    print_summary(prompt);
                }
                if shown.len() != all.len() {
                    println!("{} of {} prompts", shown.len(), all.len());
                }
            }
            Cli::Add { title, content, category } => {
                validate(&title, &content)?;
                let prompt = self
                    .store
                    .add(title.trim(), content.trim(), category.trim())
                    .await?;
                println!("Added {}", prompt.id);
            }
            Cli::Edit { id, title, content, category } => {
                let Some(current) = self.store.get(&id).await else {
                    bail!("no prompt with id {id}");
                };
                let title = title.unwrap_or(current.title);
                let content = content.unwrap_or(current.content);
                let category = category.unwrap_or(current.category);
                validate(&title, &content)?;

                match self
                    .store
                    .update(&id, title.trim(), content.trim(), category.trim())
                    .await?
                {
                    Some(prompt) => {
                        println!("Updated {} (version {})", prompt.id, prompt.latest_version())
                    }
                    None => bail!("no prompt with id {id}"),
                }
            }
            Cli::Delete { id } => {
                if !self.store.delete(&id).await? {
                    bail!("no prompt with id {id}");
                }
                println!("Deleted {id}");
            }
            Cli::Show { id } => {
                let Some(prompt) = self.store.get(&id).await else {
                    bail!("no prompt with id {id}");
                };
                print_summary(&prompt);
                println!("created {}  updated {}", prompt.created_at, prompt.updated_at);
                for entry in prompt.history_newest_first() {
                    println!("\n--- version {} ({})", entry.version, entry.timestamp);
                    println!("{}", entry.content);
                }
            }
            Cli::Version { id, version } => match self.store.history_version(&id, version).await {
                Some(entry) => println!("{}", entry.content),
                None => bail!("prompt {id} has no version {version}"),
            },
            Cli::Categories => {
                for category in categories(&self.store.list().await) {
                    println!("{category}");
                }
            }
            Cli::Providers => {
                let sync_config = self.config_file.load()?;
                let active = sync_config.active_provider();
                for kind in sync_config.configured_kinds() {
                    let marker = if Some(kind) == active { "*" } else { " " };
                    println!("{marker} {kind}");
                }
            }
            Cli::Use { provider } => {
                let mut sync_config = self.config_file.load()?;
                let Some(kind) = sync_config
                    .configured_kinds()
                    .into_iter()
                    .find(|k| k.as_str() == provider)
                else {
                    bail!(
                        "provider '{provider}' is not configured in {}",
                        self.config_file.path().display()
                    );
                };
                sync_config.active = Some(kind);
                self.config_file.save(&sync_config)?;
                println!("Active provider: {kind}");
            }
            Cli::Check => {
                let coordinator = self.coordinator()?;
                let Some(provider) = coordinator.active_provider() else {
                    bail!("no active sync provider");
                };
                let check = provider.test_connection().await?;
                println!("{}: {}", provider.name(), check.detail);
                if !check.ok {
                    bail!("connection check failed");
                }
            }
            Cli::Sync => {
                let coordinator = self.coordinator()?;
                let report = coordinator.sync_store().await?;
                println!(
                    "Synced with {}: {} remote prompts{}",
                    report.provider,
                    report.downloaded,
                    if report.replaced_local { ", local collection replaced" } else { "" }
                );
                if let Some(version) = report.upload.version {
                    println!("Server version {version}");
                }
                if let Some(url) = report.upload.url {
                    println!("{url}");
                }
            }
            Cli::History => {
                let sync_config = self.config_file.load()?;
                let Some(http_config) = &sync_config.http_api else {
                    bail!("http-api provider is not configured");
                };
                let provider = HttpApiProvider::new(self.http_client.clone(), http_config)?;
                for entry in provider.sync_history().await? {
                    println!(
                        "v{}  {}",
                        entry.version,
                        entry.updated_at.as_deref().unwrap_or("-")
                    );
                }
            }
        }
        Ok(())
    }

    fn coordinator(&self) -> Result<SyncCoordinator> {
        let sync_config: SyncConfig = self.config_file.load()?;
        let mut coordinator = SyncCoordinator::new(self.store.clone())
            .with_remote_id_store(self.config_file.clone());
        if let Some(secs) = sync_config.timeout_secs {
            coordinator = coordinator.with_call_timeout(Duration::from_secs(secs));
        }

        for (kind, provider) in build_providers(&sync_config, self.http_client.clone())? {
            coordinator.register_provider(kind.as_str(), provider);
        }
        match sync_config.active_provider() {
            Some(kind) => {
                if !coordinator.set_active_provider(kind.as_str()) {
                    bail!("active provider '{kind}' has no [{}] section", section_name(kind));
                }
            }
            None => bail!(
                "no sync provider selected; configure one in {}",
                self.config.sync_config_path().display()
            ),
        }
        Ok(coordinator)
    }
}

fn section_name(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Gist => "gist",
        ProviderKind::HttpApi => "http_api",
    }
}

fn validate(title: &str, content: &str) -> Result<()> {
    if title.trim().is_empty() || content.trim().is_empty() {
        bail!("title and content are required");
    }
    Ok(())
}

fn print_summary(prompt: &PromptRecord) {
    let category = if prompt.category.is_empty() {
        String::new()
    } else {
        format!(" [{}]", prompt.category)
    };
    let first_line = prompt.content.lines().next().unwrap_or_default();
    println!(
        "{}  {}{}  v{}\n    {}",
        prompt.id,
        prompt.title,
        category,
        prompt.latest_version(),
        first_line
    );
}
