use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

use phrase_exchange::Passphrase;

#[derive(Parser)]
#[command(name = "exchange-cli")]
#[command(about = "Client and operator CLI for the phrase exchange", long_about = None)]
struct Cli {
    /// Exchange base URL.
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Admin API base URL.
    #[arg(long, default_value = "http://localhost:8081")]
    admin_url: String,

    /// Admin API key.
    #[arg(short, long, env = "EXCHANGE_ADMIN_KEY", default_value = "")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a fresh random phrase
    Generate,
    /// Register an address under a phrase (generated when omitted)
    Register {
        maddr: String,
        #[arg(short, long)]
        phrase: Option<String>,
    },
    /// Claim the address registered under a phrase
    Claim { phrase: String },
    /// Show admin status
    Status,
    /// Show exchange and rate limit counters
    Stats,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Generate => {
            println!("{}", Passphrase::generate(&mut rand::thread_rng()));
        }
        Commands::Register { maddr, phrase } => {
            let phrase = match phrase {
                Some(p) => Passphrase::parse(p)?,
                None => Passphrase::generate(&mut rand::thread_rng()),
            };
            let res = client
                .post(format!("{}/phrase", cli.url))
                .json(&json!({ "phrase": phrase.as_str(), "maddr": maddr }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Claim { phrase } => {
            let res = client
                .get(format!("{}/phrase/{}", cli.url, phrase))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Status => {
            let res = client
                .get(format!("{}/admin/status", cli.admin_url))
                .headers(admin_headers(&cli.key)?)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Stats => {
            let res = client
                .get(format!("{}/admin/stats", cli.admin_url))
                .headers(admin_headers(&cli.key)?)
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

fn admin_headers(key: &str) -> Result<HeaderMap, Box<dyn std::error::Error>> {
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {key}"))?,
    );
    Ok(headers)
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let retry_after = res
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let text = res.text().await?;

    if !status.is_success() {
        eprintln!("Error: exchange returned status {status}");
        if let Some(secs) = retry_after {
            eprintln!("Retry after {secs}s");
        }
        eprintln!("{text}");
        std::process::exit(1);
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{text}"),
    }
    Ok(())
}
