use crate::domain::model::{ListQuery, Resource};
use clap::{Parser, Subcommand};

#[derive(Debug, Clone, Parser)]
#[command(name = "broiler-api")]
#[command(about = "Command-line client for the broiler sales API")]
pub struct CliConfig {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Override the API base URL (falls back to API_BASE_URL)
    #[arg(long)]
    pub base_url: Option<String>,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Send an arbitrary request to a relative API path
    Request {
        method: String,
        path: String,
        /// JSON request body
        #[arg(long)]
        body: Option<String>,
        /// Query parameter as key=value, repeatable
        #[arg(long = "query", value_parser = parse_key_value)]
        query: Vec<(String, String)>,
    },
    /// List a resource collection
    List {
        resource: Resource,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        search: Option<String>,
        /// Filter as key=value, repeatable
        #[arg(long = "filter", value_parser = parse_key_value)]
        filters: Vec<(String, String)>,
    },
    /// Show the signed-in user
    Whoami,
}

impl Command {
    pub fn list_query(&self) -> Option<ListQuery> {
        match self {
            Command::List {
                page,
                limit,
                search,
                filters,
                ..
            } => Some(ListQuery {
                page: *page,
                limit: *limit,
                search: search.clone(),
                filters: filters.iter().cloned().collect(),
            }),
            _ => None,
        }
    }
}

pub fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("status=active").unwrap(),
            ("status".to_string(), "active".to_string())
        );
        assert!(parse_key_value("=x").is_err());
        assert!(parse_key_value("novalue").is_err());
    }

    #[test]
    fn test_parse_list_command() {
        let cli = CliConfig::parse_from([
            "broiler-api",
            "--base-url",
            "http://localhost:4000",
            "list",
            "flocks",
            "--page",
            "3",
            "--filter",
            "shed_id=9",
        ]);

        assert_eq!(cli.base_url.as_deref(), Some("http://localhost:4000"));
        let query = cli.command.list_query().unwrap();
        assert_eq!(query.page, Some(3));
        assert_eq!(query.filters.get("shed_id").map(String::as_str), Some("9"));
        assert!(matches!(
            cli.command,
            Command::List {
                resource: Resource::Flocks,
                ..
            }
        ));
    }
}
