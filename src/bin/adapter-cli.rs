use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "adapter-cli")]
#[command(about = "Management CLI for the gateway adapter", long_about = None)]
struct Cli {
    #[arg(short, long, env = "GATEWAY_ADAPTER_URL", default_value = "http://localhost:3002")]
    url: String,

    #[arg(short, long, env = "GATEWAY_ADAPTER_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show pass counters and the last error
    Status,
    /// Run a resync pass and wait for it
    Resync {
        /// Sync these API ids (comma separated); all APIs with `--all-apis`
        #[arg(long, value_delimiter = ',')]
        apis: Vec<String>,
        #[arg(long, conflicts_with = "apis")]
        all_apis: bool,
        /// Also sync every application's consumers
        #[arg(long)]
        consumers: bool,
    },
    /// Drain pending webhook events now
    Events,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let res = match cli.command {
        Commands::Status => {
            client.get(format!("{}/admin/status", base))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Resync { apis, all_apis, consumers } => {
            let body = json!({
                "syncApis": all_apis || !apis.is_empty(),
                "syncConsumers": consumers,
                "apis": if apis.is_empty() { Value::Null } else { json!(apis) },
            });
            client.post(format!("{}/admin/resync", base))
                .headers(headers)
                .json(&body)
                .send()
                .await?
        }
        Commands::Events => {
            client.post(format!("{}/admin/events", base))
                .headers(headers)
                .send()
                .await?
        }
    };
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
