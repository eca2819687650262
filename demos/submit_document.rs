//! Submits one document read from a JSON file.
//!
//! Usage: `cargo run --example submit_document -- <document.json> [config.json]`
use docgate::{ClientConfig, Document, RegistryClientBuilder};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let document_path = args.next().ok_or("missing document path")?;
    let config = match args.next() {
        Some(path) => ClientConfig::from_json_file(path)?,
        None => ClientConfig::default(),
    };

    let document: Document = serde_json::from_str(&std::fs::read_to_string(document_path)?)?;
    let client = RegistryClientBuilder::from_config(&config).build()?;

    let response = client.create_document(&document).await?.response().await?;
    println!("{} {}", response.status, response.text());
    Ok(())
}
