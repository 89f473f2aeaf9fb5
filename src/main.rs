use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand};
use leonardo::sidecar::{self, RequestSidecar};
use leonardo::{download_generation, Config, GenerationApi, GenerationRequest, Leonardo};
use normpath::PathExt;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Command-line client for the Leonardo.Ai image generation API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new image generation
    Create(CreateArgs),
    /// Check the status of an existing generation
    Status {
        /// Generation ID to check
        #[arg(long)]
        id: String,
        /// Keep polling until the generation leaves the pending state
        #[arg(long)]
        wait: bool,
        /// Seconds between polls
        #[arg(long, default_value_t = 5)]
        interval: u64,
        /// Give up waiting after this many seconds
        #[arg(long, default_value_t = 300)]
        max_wait: u64,
    },
    /// Delete an existing generation
    Delete {
        /// Generation ID to delete
        #[arg(long)]
        id: String,
    },
    /// Show account info and token balances
    Me,
    /// List recent generations
    List {
        /// User ID to list generations for (see `me`)
        #[arg(long)]
        user_id: String,
        #[arg(long, default_value_t = 0)]
        offset: u32,
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
    /// Download images for a completed generation
    Download {
        /// Generation ID to download images for
        #[arg(long)]
        id: String,
        /// Directory to save downloaded images
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Inspect a sidecar metadata JSON file
    Inspect {
        /// Path to a sidecar metadata JSON file
        #[arg(long)]
        file: PathBuf,
    },
}

#[derive(Args, Debug)]
struct CreateArgs {
    /// Text prompt for image generation
    #[arg(long, value_parser = non_blank)]
    prompt: String,
    /// Negative prompt to avoid undesired traits
    #[arg(long)]
    negative_prompt: Option<String>,
    /// Model ID to use for generation
    #[arg(long)]
    model_id: Option<String>,
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
    /// Number of images to generate (1-8)
    #[arg(long)]
    num_images: Option<u32>,
    #[arg(long)]
    seed: Option<u64>,
    /// Comma-separated metadata tags
    #[arg(long, value_delimiter = ',')]
    tags: Vec<String>,
    /// Generate private images (defaults to LEONARDO_PRIVATE)
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    private: Option<bool>,
    /// Enable Alchemy for advanced generation
    #[arg(long)]
    alchemy: bool,
    /// Enable ultra mode for high fidelity generation
    #[arg(long)]
    ultra: bool,
    /// Style UUID to influence generation
    #[arg(long)]
    style_uuid: Option<String>,
    /// Contrast adjustment (0-5)
    #[arg(long)]
    contrast: Option<f64>,
    /// Guidance scale, typically between 1 and 10
    #[arg(long)]
    guidance_scale: Option<f64>,
    /// Directory for the request sidecar file
    #[arg(long, default_value = ".")]
    sidecar_dir: PathBuf,
}

fn non_blank(value: &str) -> Result<String, String> {
    if value.trim().is_empty() {
        Err("must not be empty".to_string())
    } else {
        Ok(value.to_string())
    }
}

impl CreateArgs {
    fn into_request(self, default_private: bool) -> GenerationRequest {
        GenerationRequest {
            prompt: self.prompt,
            negative_prompt: self.negative_prompt,
            model_id: self.model_id,
            width: self.width,
            height: self.height,
            num_images: self.num_images,
            seed: self.seed,
            style_uuid: self.style_uuid,
            contrast: self.contrast,
            guidance_scale: self.guidance_scale,
            alchemy: self.alchemy,
            ultra: self.ultra,
            private: self.private.unwrap_or(default_private),
            tags: parse_tags(self.tags),
        }
    }
}

fn parse_tags(raw: Vec<String>) -> Vec<String> {
    raw.into_iter()
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect()
}

/// Prints `data` indented if it is JSON, verbatim otherwise.
fn print_json(data: &[u8]) {
    match serde_json::from_slice::<serde_json::Value>(data)
        .and_then(|value| serde_json::to_string_pretty(&value))
    {
        Ok(pretty) => println!("{pretty}"),
        Err(_) => println!("{}", String::from_utf8_lossy(data)),
    }
}

fn display_path(path: &Path) -> String {
    path.normalize()
        .map(|p| p.into_path_buf())
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

async fn create_generation(client: &Leonardo, args: CreateArgs) -> anyhow::Result<()> {
    let sidecar_dir = args.sidecar_dir.clone();
    let request = args.into_request(client.config().private);
    let res = client
        .create_generation(&request)
        .await
        .context("creating generation")?;

    if !res.generation_id.trim().is_empty() {
        println!("Generation ID: {}", res.generation_id);
    }
    print_json(&res.raw);

    let sidecar_path = RequestSidecar::new(&request, &res.generation_id)
        .and_then(|sidecar| sidecar.write_to(&sidecar_dir))
        .context("writing request sidecar")?;
    println!("Sidecar metadata: {}", display_path(&sidecar_path));
    Ok(())
}

async fn check_generation_status(
    client: &Leonardo,
    id: &str,
    wait: bool,
    interval: u64,
    max_wait: u64,
) -> anyhow::Result<()> {
    let deadline = Instant::now() + Duration::from_secs(max_wait);
    let status = loop {
        let status = client
            .generation_status(id)
            .await
            .context("checking status")?;
        if !wait || !status.is_pending() {
            break status;
        }
        if Instant::now() >= deadline {
            return Err(anyhow!(
                "generation {id} still {} after {max_wait}s",
                status.status
            ));
        }
        info!("Generation {id} is {}, polling again in {interval}s", status.status);
        tokio::time::sleep(Duration::from_secs(interval)).await;
    };

    if !status.status.trim().is_empty() {
        println!("Status: {}", status.status);
    }
    for (i, url) in status.images.iter().enumerate() {
        println!("Image {} URL: {url}", i + 1);
    }
    print_json(&status.raw);
    Ok(())
}

async fn delete_generation(client: &Leonardo, id: &str) -> anyhow::Result<()> {
    let resp = client
        .delete_generation(id)
        .await
        .context("deleting generation")?;
    if !resp.id.trim().is_empty() {
        println!("Deleted generation: {}", resp.id);
    }
    print_json(&resp.raw);
    Ok(())
}

async fn show_user_info(client: &Leonardo) -> anyhow::Result<()> {
    let info = client.user_info().await.context("getting user info")?;
    if !info.user_id.trim().is_empty() {
        println!("User ID: {}", info.user_id);
    }
    if !info.username.trim().is_empty() {
        println!("Username: {}", info.username);
    }
    println!("API Subscription Tokens: {}", info.subscription_tokens);
    println!("API Paid Tokens: {}", info.paid_tokens);
    if !info.token_renewal_date.trim().is_empty() {
        println!("Token Renewal Date: {}", info.token_renewal_date);
    }
    print_json(&info.raw);
    Ok(())
}

async fn list_generations(
    client: &Leonardo,
    user_id: &str,
    offset: u32,
    limit: u32,
) -> anyhow::Result<()> {
    let resp = client
        .list_generations(user_id, offset, limit)
        .await
        .context("listing generations")?;
    for item in &resp.generations {
        print!("[{}] {} - {}", item.status, item.id, item.prompt);
        if !item.images.is_empty() {
            print!(" ({} images)", item.images.len());
        }
        println!();
    }
    print_json(&resp.raw);
    Ok(())
}

async fn download_images(client: &Leonardo, id: &str, output_dir: &Path) -> anyhow::Result<()> {
    let result = download_generation(client, id, output_dir)
        .await
        .context("downloading images")?;
    for (i, path) in result.file_paths.iter().enumerate() {
        println!("Image {} saved: {}", i + 1, display_path(path));
    }
    Ok(())
}

fn inspect_sidecar(path: &Path) -> anyhow::Result<()> {
    let value = sidecar::inspect(path).context("inspecting sidecar")?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn api_client() -> anyhow::Result<Leonardo> {
    let config = Config::from_env().context("reading LEONARDO_* environment variables")?;
    debug!("Loaded configuration: {config:?}");
    Ok(Leonardo::new(config)?.with_progress(true))
}

async fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Inspect { file } => inspect_sidecar(&file),
        Command::Create(args) => create_generation(&api_client()?, args).await,
        Command::Status {
            id,
            wait,
            interval,
            max_wait,
        } => check_generation_status(&api_client()?, &id, wait, interval, max_wait).await,
        Command::Delete { id } => delete_generation(&api_client()?, &id).await,
        Command::Me => show_user_info(&api_client()?).await,
        Command::List {
            user_id,
            offset,
            limit,
        } => list_generations(&api_client()?, &user_id, offset, limit).await,
        Command::Download { id, output_dir } => {
            download_images(&api_client()?, &id, &output_dir).await
        }
    }
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Warn)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            if let Some(body) = e
                .downcast_ref::<leonardo::Error>()
                .and_then(leonardo::Error::raw_body)
            {
                print_json(body);
            }
            ExitCode::FAILURE
        }
    }
}
