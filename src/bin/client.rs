//! Smoke-test client
//!
//! Runs a fixed sequence of requests against a running LogPrompt API and
//! prints what comes back.

use anyhow::{Context, Result};
use clap::Parser;
use logprompt::api::{PredictRequest, PredictResponse};
use serde_json::Value;
use std::time::{Duration, Instant};

const TEST_TEXTS: [&str; 4] = [
    "Hello, this is a test sentence for BERT processing.",
    "The quick brown fox jumps over the lazy dog.",
    "Machine learning is transforming the world.",
    "Natural language processing enables computers to understand text.",
];

const MODELS_TO_TEST: [&str; 2] = ["bert-base-uncased", "roberta-base"];

#[derive(Parser, Debug)]
#[command(name = "logprompt-client")]
#[command(about = "Exercise a running LogPrompt API")]
#[command(version)]
struct Args {
    /// Base URL of the API
    #[arg(long, default_value = "http://localhost:8000")]
    url: String,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,
}

struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .context("Failed to build HTTP client")?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json(&self, path: &str) -> Result<(u16, Value)> {
        let response = self.client.get(self.url(path)).send().await?;
        let status = response.status().as_u16();
        let body = response.json().await?;
        Ok((status, body))
    }

    async fn predict(&self, request: &PredictRequest) -> Result<(u16, Value)> {
        let response = self
            .client
            .post(self.url("/predict"))
            .json(request)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.json().await?;
        Ok((status, body))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let client = ApiClient::new(&args.url, Duration::from_secs(args.timeout_secs))?;

    println!("LogPrompt API Example");
    println!("{}", "=".repeat(50));

    match client.get_json("/health").await {
        Ok((200, _)) => println!("API is running!"),
        Ok((status, _)) => {
            println!("API is not responding correctly (status {})", status);
            return Ok(());
        }
        Err(e) => {
            println!("Cannot connect to API at {}: {}", args.url, e);
            println!("Start it with: logprompt");
            return Ok(());
        }
    }

    for path in ["/", "/models"] {
        match client.get_json(path).await {
            Ok((status, body)) => println!("GET {} -> {} {}", path, status, body),
            Err(e) => println!("GET {} failed: {}", path, e),
        }
    }

    for model_name in MODELS_TO_TEST {
        println!();
        println!("Testing model: {}", model_name);
        println!("{}", "-".repeat(30));

        for (i, text) in TEST_TEXTS.iter().enumerate() {
            println!();
            println!("Test {}: {}", i + 1, text);
            let request = PredictRequest {
                text: text.to_string(),
                model_name: model_name.to_string(),
                task: "feature-extraction".to_string(),
            };
            run_prediction(&client, &request).await;
        }
    }

    println!();
    println!("Testing unsupported model...");
    let request = PredictRequest {
        text: "Hello world".to_string(),
        model_name: "invalid-model".to_string(),
        task: "feature-extraction".to_string(),
    };
    match client.predict(&request).await {
        Ok((status, body)) => println!("Status: {} Detail: {}", status, body["detail"]),
        Err(e) => println!("Error: {}", e),
    }

    println!();
    println!("{}", "=".repeat(50));
    println!("Testing completed!");

    Ok(())
}

async fn run_prediction(client: &ApiClient, request: &PredictRequest) {
    let started = Instant::now();

    let (status, body) = match client.predict(request).await {
        Ok(result) => result,
        Err(e) if e.downcast_ref::<reqwest::Error>().is_some_and(|e| e.is_timeout()) => {
            println!("Request timed out");
            return;
        }
        Err(e) => {
            println!("Error: {}", e);
            return;
        }
    };

    if status != 200 {
        println!("Error: {}", status);
        println!("Response: {}", body);
        return;
    }

    match serde_json::from_value::<PredictResponse>(body.clone()) {
        Ok(PredictResponse {
            embeddings: Some(embeddings),
            ..
        }) if !embeddings.is_empty() => {
            println!(
                "Success! Shape: {} x {}",
                embeddings.len(),
                embeddings[0].len()
            );
            println!("Time: {:.2}s", started.elapsed().as_secs_f64());
        }
        _ => println!("Response: {}", body),
    }
}
