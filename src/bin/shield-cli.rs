use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderValue, AUTHORIZATION};
use serde_json::Value;

use api_shield::config::load_config;
use api_shield::security::headers::compute_headers;
use api_shield::security::origin::{collect_warnings, parse_origin_list};

#[derive(Parser)]
#[command(name = "shield-cli")]
#[command(about = "Operator CLI for api-shield", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a CSRF token from a running server
    Token {
        #[arg(short, long, default_value = "http://localhost:8080")]
        url: String,

        /// Value sent in the Authorization header
        #[arg(short, long)]
        auth: Option<String>,
    },
    /// Validate a config file and print the resolved origins and headers
    Check { config: PathBuf },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Token { url, auth } => {
            let client = reqwest::Client::new();
            let mut request = client.get(format!("{}/api/csrf-token", url.trim_end_matches('/')));
            if let Some(auth) = auth {
                request = request.header(AUTHORIZATION, HeaderValue::from_str(&auth)?);
            }
            let res = request.send().await?;

            let status = res.status();
            if !status.is_success() {
                eprintln!("Error: server returned status {}", status);
                if let Ok(text) = res.text().await {
                    eprintln!("Response: {}", text);
                }
                return Ok(());
            }

            let json: Value = res.json().await?;
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        Commands::Check { config } => {
            let config = load_config(&config)?;
            let origins = parse_origin_list(config.cors.origins.as_deref())?;

            println!("environment: {}", config.environment);
            println!("origins{}:", if origins.is_defaulted() { " (default)" } else { "" });
            for origin in origins.as_strings() {
                println!("  {}", origin);
            }
            for warning in collect_warnings(&origins, config.environment) {
                println!("  warning: {}", warning);
            }

            println!("headers:");
            let headers = compute_headers(config.environment, config.headers.include_hsts);
            for (name, value) in headers.iter() {
                println!("  {}: {}", name, value.to_str().unwrap_or("<binary>"));
            }
        }
    }

    Ok(())
}
