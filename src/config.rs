use clap::Parser;
use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Path to the DuckDB database file
    pub path: String,
    pub pool_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub backend: String, // "openai" or "ollama"
    pub model: String,
    pub api_key: Option<String>,
    pub api_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    /// Directory holding the persistent query-history index
    pub index_dir: String,
    /// Cache directory for the embedding model weights
    pub model_cache_dir: String,
    /// How many similar past queries to recall per question
    pub recall_limit: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub history: HistoryConfig,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Path to the DuckDB database file
    #[arg(short, long)]
    pub database: Option<String>,

    /// Directory for the query-history index
    #[arg(long)]
    pub history_dir: Option<String>,

    /// The natural-language question to answer
    pub question: String,
}

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config_builder = Config::builder();

        if let Some(config_path) = &args.config {
            config_builder = config_builder.add_source(File::from(config_path.as_path()));
        } else {
            // Check for config in default locations
            let default_locations = vec![
                "config.toml",
                "config/config.toml",
                "/etc/nl-recall/config.toml",
            ];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    break;
                }
            }
        }

        let mut config: AppConfig = config_builder.build()?.try_deserialize()?;

        // Command line args win over the file
        if let Some(database) = &args.database {
            config.database.path = database.clone();
        }
        if let Some(history_dir) = &args.history_dir {
            config.history.index_dir = history_dir.clone();
        }

        Ok(config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                path: "nl-recall.db".to_string(),
                pool_size: 1,
            },
            llm: LlmConfig {
                backend: "openai".to_string(),
                model: "gpt-4o-mini".to_string(),
                api_key: None,
                api_url: None,
            },
            history: HistoryConfig {
                index_dir: "history_index".to_string(),
                model_cache_dir: "models".to_string(),
                recall_limit: 3,
            },
        }
    }
}
