use anyhow::Result;
use apiclient::commands::{self, Mutation, config::Config};
use clap::Parser;
use std::path::PathBuf;

/// apiclient - JSON API client
///
/// Send requests to a JSON API with authentication, retry on server errors
/// and upload progress.
///
/// The base URL is read from API_URL (required when APP_ENV=production) and
/// the bearer token from API_TOKEN, unless given on the command line.
///
/// Examples:
///   apiclient health
///   apiclient get /products -q category=Electronics
///   apiclient post /orders --data '{"productId": 1}'
#[derive(Parser, Debug)]
#[command(author, version = env!("APICLIENT_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// API base URL (overrides API_URL)
    #[arg(long = "base-url", value_name = "URL", global = true)]
    pub base_url: Option<String>,

    /// Bearer token (overrides API_TOKEN)
    #[arg(long, value_name = "TOKEN", global = true)]
    pub token: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Check whether the API is reachable
    Health,

    /// Fetch a resource
    Get(GetArgs),

    /// Create a resource
    Post(BodyArgs),

    /// Replace a resource
    Put(BodyArgs),

    /// Partially update a resource
    Patch(BodyArgs),

    /// Delete a resource
    Delete(PathArgs),

    /// Upload a file as multipart form data
    Upload(UploadArgs),
}

#[derive(clap::Args, Debug)]
pub struct GetArgs {
    /// Request path, relative to the base URL
    pub path: String,

    /// Query parameter in the form key=value (repeatable)
    #[arg(short = 'q', long = "query", value_name = "KEY=VALUE")]
    pub query: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct BodyArgs {
    /// Request path, relative to the base URL
    pub path: String,

    /// JSON request body
    #[arg(short = 'd', long = "data", value_name = "JSON")]
    pub data: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct PathArgs {
    /// Request path, relative to the base URL
    pub path: String,
}

#[derive(clap::Args, Debug)]
pub struct UploadArgs {
    /// Upload endpoint path
    pub path: String,

    /// File to upload
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let config = Config::new(apiclient::runtime::RealRuntime, cli.base_url, cli.token)?;

    match cli.command {
        Commands::Health => commands::health(&config).await?,
        Commands::Get(args) => commands::get(&config, &args.path, &args.query).await?,
        Commands::Post(args) => {
            commands::send(&config, Mutation::Post, &args.path, args.data.as_deref()).await?
        }
        Commands::Put(args) => {
            commands::send(&config, Mutation::Put, &args.path, args.data.as_deref()).await?
        }
        Commands::Patch(args) => {
            commands::send(&config, Mutation::Patch, &args.path, args.data.as_deref()).await?
        }
        Commands::Delete(args) => commands::delete(&config, &args.path).await?,
        Commands::Upload(args) => commands::upload(&config, &args.path, &args.file).await?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_get_parsing() {
        let cli = Cli::try_parse_from([
            "apiclient",
            "get",
            "/products",
            "-q",
            "category=Electronics",
            "--query",
            "page=2",
        ])
        .unwrap();
        match cli.command {
            Commands::Get(args) => {
                assert_eq!(args.path, "/products");
                assert_eq!(args.query, vec!["category=Electronics", "page=2"]);
            }
            _ => panic!("Expected Get command"),
        }
        assert_eq!(cli.base_url, None);
    }

    #[test]
    fn test_cli_post_parsing() {
        let cli =
            Cli::try_parse_from(["apiclient", "post", "/orders", "--data", r#"{"id": 1}"#]).unwrap();
        match cli.command {
            Commands::Post(args) => {
                assert_eq!(args.path, "/orders");
                assert_eq!(args.data.as_deref(), Some(r#"{"id": 1}"#));
            }
            _ => panic!("Expected Post command"),
        }
    }

    #[test]
    fn test_cli_global_options_parsing() {
        let cli = Cli::try_parse_from([
            "apiclient",
            "--base-url",
            "https://api.example.com",
            "health",
            "--token",
            "abc",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Health));
        assert_eq!(cli.base_url.as_deref(), Some("https://api.example.com"));
        assert_eq!(cli.token.as_deref(), Some("abc"));
    }

    #[test]
    fn test_cli_upload_parsing() {
        let cli = Cli::try_parse_from(["apiclient", "upload", "/files", "./report.pdf"]).unwrap();
        match cli.command {
            Commands::Upload(args) => {
                assert_eq!(args.path, "/files");
                assert_eq!(args.file, PathBuf::from("./report.pdf"));
            }
            _ => panic!("Expected Upload command"),
        }
    }

    #[test]
    fn test_cli_no_subcommand_fails() {
        let result = Cli::try_parse_from(["apiclient", "/products"]);
        assert!(result.is_err());
    }
}
