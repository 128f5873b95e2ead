use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "gatewire-cli")]
#[command(about = "Admin client for the gatewire control plane", long_about = None)]
struct Cli {
    #[arg(short, long, env = "GATEWIRE_ADMIN_URL", default_value = "http://127.0.0.1:8081")]
    url: String,

    #[arg(short, long, env = "GATEWIRE_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Control plane status and record counts
    Status,
    /// Nodes with tunnel runtime and reachability
    Nodes {
        /// Only enabled (true) or disabled (false) nodes
        #[arg(long)]
        enabled: Option<bool>,
        /// Only gateways (true) or non-gateways (false)
        #[arg(long)]
        gateway: Option<bool>,
        /// Match on name or address
        #[arg(long)]
        search: Option<String>,
    },
    /// Print a node's WireGuard client config
    NodeConfig { id: u64 },
    /// Run an expiry sweep now
    Expire,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    match cli.command {
        Commands::Status => {
            let res = client
                .get(format!("{}/admin/status", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_json(res).await?;
        }
        Commands::Nodes { enabled, gateway, search } => {
            let mut query: Vec<(&str, String)> = Vec::new();
            if let Some(enabled) = enabled {
                query.push(("enabled", enabled.to_string()));
            }
            if let Some(gateway) = gateway {
                query.push(("gateway", gateway.to_string()));
            }
            if let Some(search) = search {
                query.push(("search", search));
            }
            let res = client
                .get(format!("{}/admin/nodes", cli.url))
                .query(&query)
                .headers(headers)
                .send()
                .await?;
            print_json(res).await?;
        }
        Commands::NodeConfig { id } => {
            let res = client
                .get(format!("{}/admin/nodes/{}/config", cli.url, id))
                .headers(headers)
                .send()
                .await?;
            if check_status(&res) {
                print!("{}", res.text().await?);
            } else {
                print_error(res).await;
            }
        }
        Commands::Expire => {
            let res = client
                .post(format!("{}/admin/expire", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_json(res).await?;
        }
    }

    Ok(())
}

fn check_status(res: &reqwest::Response) -> bool {
    res.status().is_success()
}

async fn print_error(res: reqwest::Response) {
    eprintln!("Error: admin API returned status {}", res.status());
    if let Ok(text) = res.text().await {
        eprintln!("Response: {}", text);
    }
}

async fn print_json(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    if !check_status(&res) {
        print_error(res).await;
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
