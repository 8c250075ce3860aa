use anyhow::Context as _;
use clap::Parser;
use model_relay_forward::{CatalogConfig, Forwarder};
use model_relay_server::logging::{self, LogFormat};
use model_relay_server::stdio;
use model_relay_server::tools::ToolRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::{error, info, warn};

/// MCP server that forwards prompts to configured chat-completion backends.
#[derive(Parser, Debug)]
#[command(name = "model-relay", version, about, long_about = None)]
struct Args {
    /// Backend catalog (YAML). Uses the built-in catalog when omitted.
    #[arg(long, env = "MODEL_RELAY_CATALOG")]
    catalog: Option<PathBuf>,

    /// Transport to serve on. Only `stdio` is supported.
    #[arg(long, env = "TRANSPORT", default_value = "stdio")]
    transport: String,

    /// Log filter directives (`RUST_LOG` syntax).
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log_level: String,

    #[arg(long, env = "MODEL_RELAY_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Optional; real environment variables win over `.env` entries.
    dotenvy::dotenv().ok();

    let args = Args::parse();
    logging::init(&args.log_level, args.log_format);

    if !args.transport.eq_ignore_ascii_case("stdio") {
        error!(transport = %args.transport, "unsupported transport; only 'stdio' is available");
        std::process::exit(1);
    }

    let catalog = match &args.catalog {
        Some(path) => CatalogConfig::load(path)
            .with_context(|| format!("load catalog {}", path.display()))?,
        None => CatalogConfig::builtin().context("load built-in catalog")?,
    };

    let backends = catalog.resolve(|name| std::env::var(name).ok());
    for b in &backends {
        if b.endpoint.is_complete() {
            info!(tool = %b.tool, backend = %b.endpoint.label, "backend configured");
        } else {
            warn!(
                tool = %b.tool,
                backend = %b.endpoint.label,
                missing = %b.endpoint.missing().join(", "),
                "backend not configured; calls will return an error"
            );
        }
    }

    let forwarder = Forwarder::new().context("build HTTP client")?;
    let registry = Arc::new(ToolRegistry::new(forwarder, backends));

    info!(
        tools = registry.backends().len() + 1,
        "serving MCP over stdio"
    );
    stdio::serve(
        registry,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
}
