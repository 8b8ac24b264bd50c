use broiler_api::config::cli::Command;
use broiler_api::utils::error::ErrorSeverity;
use broiler_api::utils::{logger, validation::Validate};
use broiler_api::{
    ApiClient, ApiError, AuthService, ClientConfig, CliConfig, Credentials, ResourceClient,
    SessionStore, TomlConfig,
};
use clap::Parser;
use reqwest::Method;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CliConfig::parse();

    // 載入 TOML 配置（若有指定）
    let file_config = match &cli.config {
        Some(path) => match TomlConfig::from_file(path) {
            Ok(config) => Some(config),
            Err(e) => {
                eprintln!("❌ Failed to load config file '{}': {}", path, e);
                eprintln!("💡 Make sure the file exists and is valid TOML format");
                std::process::exit(1);
            }
        },
        None => None,
    };

    // 初始化日誌
    let verbose = cli.verbose || file_config.as_ref().is_some_and(|c| c.verbose());
    if cli.log_json || file_config.as_ref().is_some_and(|c| c.json_logs()) {
        logger::init_json_logger(verbose);
    } else {
        logger::init_cli_logger(verbose);
    }

    tracing::info!("Starting broiler-api CLI");
    if verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    if let Err(e) = run(&cli, file_config).await {
        tracing::error!(
            "❌ Command failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 {}", e.recovery_suggestion());

        let exit_code = match e.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };

        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }

    Ok(())
}

async fn run(cli: &CliConfig, file_config: Option<TomlConfig>) -> broiler_api::Result<()> {
    let (config, credentials) = resolve_config(cli, file_config)?;
    config.validate()?;
    tracing::info!("🌐 API base URL: {}", config.base_url);

    let store = SessionStore::new();
    let client = ApiClient::new(config, Some(store.invalidator()))?;
    let auth = AuthService::new(client.clone(), store);

    if let Some(credentials) = credentials {
        auth.login(&credentials).await?;
    }

    let output = match &cli.command {
        Command::Request {
            method,
            path,
            body,
            query,
        } => {
            let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes()).map_err(
                |e| ApiError::ValidationError {
                    message: format!("Invalid HTTP method '{}': {}", method, e),
                },
            )?;
            let body = body
                .as_deref()
                .map(serde_json::from_str::<serde_json::Value>)
                .transpose()?;
            let options = broiler_api::core::RequestOptions {
                query: query.clone(),
                ..Default::default()
            };
            client.request(method, path, body, Some(options)).await?
        }
        Command::List { resource, .. } => {
            let query = cli.command.list_query().unwrap_or_default();
            ResourceClient::new(client.clone())
                .list(*resource, &query)
                .await?
        }
        Command::Whoami => serde_json::to_value(auth.current_user().await?)?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// 設定來源優先序：命令列 > TOML 檔 > 環境變數
fn resolve_config(
    cli: &CliConfig,
    file_config: Option<TomlConfig>,
) -> broiler_api::Result<(ClientConfig, Option<Credentials>)> {
    let (mut config, mut credentials) = match file_config {
        Some(file_config) => {
            file_config.validate()?;
            (file_config.client_config(), file_config.credentials())
        }
        None => match (ClientConfig::from_env(), &cli.base_url) {
            (Ok(config), _) => (config, None),
            (Err(ApiError::MissingConfigError { .. }), Some(base_url)) => {
                (ClientConfig::new(base_url.clone()), None)
            }
            (Err(e), _) => return Err(e),
        },
    };

    if let Some(base_url) = &cli.base_url {
        config.base_url = base_url.clone();
    }

    if credentials.is_none() {
        if let (Ok(email), Ok(password)) =
            (std::env::var("API_EMAIL"), std::env::var("API_PASSWORD"))
        {
            credentials = Some(Credentials { email, password });
        }
    }

    Ok((config, credentials))
}
