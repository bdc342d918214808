use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use structopt::StructOpt;

use honeyguard::client::{HoneyGuardClient, LocationSource, LogSource, TokenService};
use honeyguard::config::Config;
use honeyguard::geo::{self, MarkerBounds};
use honeyguard::models::{
    LogFilter, LogLevel, LogSearch, Recency, Scope, SortDirection, TimeRange, TokenCategory,
    TokenQuery, TokenSortField,
};
use honeyguard::notify::LogSink;
use honeyguard::output;
use honeyguard::schema::{self, FieldKind, FieldValue, FileBlob};
use honeyguard::submission::SubmissionBuilder;
use honeyguard::wizard::{WizardState, WizardStep};

/// HoneyGuard honeytoken command line interface
#[derive(StructOpt, Debug)]
#[structopt(name = "honeyguard", about = "Create and monitor honeytokens")]
pub struct Cli {
    /// Path to configuration file
    #[structopt(short, long, default_value = "honeyguard.toml", global = true)]
    config: PathBuf,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt, Debug)]
pub enum Command {
    /// Generate a default configuration file
    Config {
        /// Output path for the configuration file
        #[structopt(short, long, default_value = "honeyguard.toml")]
        output: PathBuf,
    },
    /// List token categories and their fields
    Categories,
    /// Create a honeytoken through the four-step wizard
    Create {
        /// image, aws, financial or healthcare
        #[structopt(long)]
        category: TokenCategory,
        #[structopt(long)]
        name: String,
        #[structopt(long)]
        description: String,
        /// Category field as name=value (repeatable)
        #[structopt(long = "field", parse(try_from_str = parse_key_value), number_of_values = 1)]
        fields: Vec<(String, String)>,
        /// File field as name=path (repeatable)
        #[structopt(long = "file", parse(try_from_str = parse_key_value), number_of_values = 1)]
        files: Vec<(String, String)>,
    },
    /// Manage existing tokens
    Tokens(TokensCommand),
    /// Show access logs
    Logs {
        /// Only logs of this token
        #[structopt(long)]
        token: Option<String>,
        /// 1h, 24h, 7d or 30d
        #[structopt(long)]
        time_range: Option<TimeRange>,
        #[structopt(long)]
        level: Option<LogLevel>,
        /// Case-insensitive filter over message, source and IP
        #[structopt(long)]
        search: Option<String>,
        /// Write the (filtered) logs to a CSV file instead of printing
        #[structopt(long)]
        csv: Option<PathBuf>,
    },
    /// Show access locations grouped into map markers
    Map,
}

#[derive(StructOpt, Debug)]
pub enum TokensCommand {
    /// List tokens
    List {
        #[structopt(long)]
        search: Option<String>,
        #[structopt(long)]
        category: Option<TokenCategory>,
        /// token, name, category, status or created_at
        #[structopt(long, default_value = "created_at")]
        sort: TokenSortField,
        /// Sort ascending instead of descending
        #[structopt(long)]
        asc: bool,
    },
    /// Show one token
    Show { token: String },
    /// Delete a token
    Delete { token: String },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected name=value, got '{}'", s)),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .init();

    let cli = Cli::from_args();

    let config = if cli.config.exists() {
        Config::from_file(&cli.config)?
    } else {
        Config::default()
    };

    match cli.command {
        Command::Config { output } => {
            Config::default().to_file(&output)?;
            println!("Default configuration written to: {:?}", output);
        }
        Command::Categories => {
            for category in TokenCategory::ALL.iter() {
                println!("{} ({}): {}", category.label(), category, category.description());
                for field in schema::fields_for(*category) {
                    let required = if field.required { "required" } else { "optional" };
                    let detail = match field.kind {
                        FieldKind::Text { .. } => "text".to_string(),
                        FieldKind::Select { options } => format!(
                            "one of {}",
                            options.iter().map(|o| o.value).collect::<Vec<_>>().join("|")
                        ),
                        FieldKind::File { accept } => format!("file ({})", accept),
                    };
                    println!("    {:<18} {} [{}, {}]", field.name, field.label, detail, required);
                }
            }
        }
        Command::Create {
            category,
            name,
            description,
            fields,
            files,
        } => {
            let state = build_wizard(category, name, description, fields, files)?;
            println!("{}", state.review());

            let client = Arc::new(HoneyGuardClient::new(&config.api)?);
            let builder = SubmissionBuilder::new(client, Arc::new(LogSink));
            let token = builder.submit(&state).await?;

            println!("Token generated successfully: {}", token.token);
            if let Some(url) = token.image_url {
                println!("Image URL: {}", url);
            }
        }
        Command::Tokens(command) => {
            let client = HoneyGuardClient::new(&config.api)?;
            match command {
                TokensCommand::List {
                    search,
                    category,
                    sort,
                    asc,
                } => {
                    let records = client.list_tokens().await?;
                    let query = TokenQuery {
                        search: search.unwrap_or_default(),
                        category,
                        sort_field: sort,
                        direction: if asc { SortDirection::Asc } else { SortDirection::Desc },
                    };
                    let shown = query.apply(&records);
                    println!("{} of {} token(s):", shown.len(), records.len());
                    for record in shown {
                        println!(
                            "  {} {:<24} {:<11} {} {}",
                            record.token,
                            record.token_name,
                            record.category,
                            if record.is_active { "active" } else { "inactive" },
                            record
                                .created_at
                                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                                .unwrap_or_default()
                        );
                    }
                }
                TokensCommand::Show { token } => {
                    let record = client.get_token(&token).await?;
                    println!("{}", serde_json::to_string_pretty(&record)?);
                }
                TokensCommand::Delete { token } => {
                    client.delete_token(&token).await?;
                    println!("Token {} deleted", token);
                }
            }
        }
        Command::Logs {
            token,
            time_range,
            level,
            search,
            csv,
        } => {
            let client = HoneyGuardClient::new(&config.api)?;
            let scope = token.map(Scope::Token).unwrap_or(Scope::Global);
            let filter = LogFilter { time_range, level };
            let entries = client.fetch_logs(&scope, &filter).await?;

            let search = LogSearch {
                term: search.unwrap_or_default(),
                level: None,
            };
            let shown: Vec<_> = search.apply(&entries).into_iter().cloned().collect();

            match csv {
                Some(path) => {
                    output::write_csv(&path, &shown)?;
                    println!("Exported {} log(s) to {:?}", shown.len(), path);
                }
                None => {
                    let now = Utc::now();
                    println!("{} access log(s) for {}:", shown.len(), scope);
                    for entry in &shown {
                        println!(
                            "  [{:<6}] {} {:<8} {:<15} {}: {}",
                            Recency::classify(entry.timestamp, now).label(),
                            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                            entry.level,
                            entry.ip_address,
                            entry.source,
                            entry.message
                        );
                    }
                }
            }
        }
        Command::Map => {
            let client = HoneyGuardClient::new(&config.api)?;
            let aggregation = geo::aggregate(client.fetch_locations().await?);

            println!(
                "{} marker(s) from {} location(s), {} skipped",
                aggregation.markers.len(),
                aggregation.total_records(),
                aggregation.skipped
            );
            for marker in &aggregation.markers {
                println!("  ({:.4}, {:.4}) {}", marker.latitude, marker.longitude, marker.title());
                for line in marker.member_lines() {
                    println!("      {}", line);
                }
            }
            if let Some(bounds) = MarkerBounds::from_markers(&aggregation.markers) {
                let (lat, lon) = bounds.center();
                println!("Center: ({:.4}, {:.4})", lat, lon);
            }
        }
    }

    Ok(())
}

/// Drive a wizard from command-line input, step by step
fn build_wizard(
    category: TokenCategory,
    name: String,
    description: String,
    fields: Vec<(String, String)>,
    files: Vec<(String, String)>,
) -> Result<WizardState, Box<dyn std::error::Error>> {
    let mut state = WizardState::new();

    state.select_category(category)?;
    state.next()?;

    state.set_token_name(name);
    state.set_description(description);
    state.next()?;

    for (field, value) in fields {
        let value = match schema::find_field(category, &field).map(|f| f.kind) {
            Some(FieldKind::Select { .. }) => FieldValue::Choice(value),
            Some(FieldKind::File { .. }) => {
                return Err(format!("{} is a file field, use --file {}=<path>", field, field).into())
            }
            _ => FieldValue::Text(value),
        };
        state.set_field(&field, value)?;
    }
    for (field, path) in files {
        let path = PathBuf::from(path);
        let bytes = std::fs::read(&path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| field.clone());
        state.set_field(&field, FieldValue::File(FileBlob::new(file_name, bytes)))?;
    }
    state.next()?;

    debug_assert_eq!(state.step(), WizardStep::Review);
    Ok(state)
}
