use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "anchor-cli")]
#[command(about = "Management CLI for a batch-anchor node", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:5000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show node status and wired plugins
    Status,
    /// Broadcast a message carrying one JSON value
    Broadcast {
        /// Namespace to broadcast on
        #[arg(long)]
        ns: String,
        /// JSON value of the message's single data entry
        #[arg(long)]
        value: String,
        /// Topic to order the message on
        #[arg(long)]
        topic: Option<String>,
        /// Wait until the message's batch has been dispatched
        #[arg(long)]
        confirm: bool,
    },
    /// Show an operation
    Operation { id: String },
    /// Re-run an operation from its persisted input
    Retry { id: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let res = match cli.command {
        Commands::Status => client.get(format!("{}/api/v1/status", base)).send().await?,
        Commands::Broadcast {
            ns,
            value,
            topic,
            confirm,
        } => {
            let value: Value = serde_json::from_str(&value)
                .unwrap_or(Value::String(value));
            let topics: Vec<String> = topic.into_iter().collect();
            let body = json!({
                "header": { "topics": topics },
                "data": [{ "value": value }],
            });
            client
                .post(format!("{}/api/v1/namespaces/{}/messages/broadcast", base, ns))
                .query(&[("confirm", confirm)])
                .json(&body)
                .send()
                .await?
        }
        Commands::Operation { id } => {
            client
                .get(format!("{}/api/v1/operations/{}", base, id))
                .send()
                .await?
        }
        Commands::Retry { id } => {
            client
                .post(format!("{}/api/v1/operations/{}/retry", base, id))
                .send()
                .await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: node API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
