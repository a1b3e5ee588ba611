//! CLI entry point for the CareerBuilder API client.
//!
//! Sends one request per invocation and prints the status line and body.
//! Configuration comes from the environment (a `.env` file is honoured).

use anyhow::{Context, Result};
use cb_api_client::{
    auth::{OAuthTokenProvider, StaticToken, TokenProvider},
    config::{OAuthConfig, WebServiceConfig},
    fetch::BasicClient,
    web_service::{ApiResponse, RequestOptions, ResponseBody, Verb, WebService},
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::{Map, Value};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "cb_api_client")]
#[command(about = "Send authenticated requests to the CareerBuilder API", long_about = None)]
struct Cli {
    /// JSON config file; falls back to CB_* environment variables
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Bearer token to use instead of the OAuth client-credentials flow
    #[arg(long, global = true, env = "CB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Extra header sent with the request, as NAME=VALUE (repeatable)
    #[arg(long = "header", value_name = "NAME=VALUE", global = true)]
    headers: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// GET an API path
    Get(QueryArgs),
    /// DELETE an API path
    Delete(QueryArgs),
    /// PUT a body to an API path
    Put(BodyArgs),
    /// POST a body to an API path
    Post {
        #[command(flatten)]
        body: BodyArgs,

        /// Expect an XML (raw text) response
        #[arg(long, default_value_t = false)]
        xml: bool,

        /// Append Outputjson=true to the query string
        #[arg(long, default_value_t = false)]
        output_json: bool,
    },
    /// Call a full URL outside the API with only the extra headers
    External {
        /// Full URL, used verbatim
        url: String,

        #[arg(short, long, value_enum, default_value_t = CliVerb::Get)]
        method: CliVerb,

        /// Query param for GET/DELETE, as KEY=VALUE (repeatable)
        #[arg(short, long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,

        /// JSON body for PUT/POST
        #[arg(short, long)]
        body: Option<String>,

        /// Form-encode the body instead of sending JSON
        #[arg(long, default_value_t = false)]
        form: bool,
    },
}

#[derive(Args)]
struct QueryArgs {
    /// API path, e.g. /v2/jobsearch
    path: String,

    /// Query param, as KEY=VALUE (repeatable)
    #[arg(short, long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,
}

#[derive(Args)]
struct BodyArgs {
    /// API path, e.g. /v2/application/submit
    path: String,

    /// JSON body
    #[arg(short, long)]
    body: Option<String>,

    /// Form-encode the body instead of sending JSON
    #[arg(long, default_value_t = false)]
    form: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliVerb {
    Get,
    Post,
    Put,
    Delete,
}

impl From<CliVerb> for Verb {
    fn from(verb: CliVerb) -> Self {
        match verb {
            CliVerb::Get => Verb::Get,
            CliVerb::Post => Verb::Post,
            CliVerb::Put => Verb::Put,
            CliVerb::Delete => Verb::Delete,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/cb_api_client.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("cb_api_client.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => WebServiceConfig::load(path)?,
        None => WebServiceConfig::from_env()?,
    };
    let tokens: Arc<dyn TokenProvider> = match &cli.token {
        Some(token) => Arc::new(StaticToken::new(token.clone())),
        None => Arc::new(OAuthTokenProvider::new(OAuthConfig::from_env()?)?),
    };

    let service = WebService::new(config, BasicClient::new()?, tokens);
    info!(api_url = %service.config().api_url, "Client ready");
    for header in &cli.headers {
        let (name, value) = split_pair(header)?;
        service.set_extra_header(name, value);
    }

    // Ctrl+C aborts the in-flight request
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling request");
            ctrl_c.cancel();
        }
    });
    let options = RequestOptions::new().cancel_on(cancel.clone());

    let request = async {
        let response = match cli.command {
            Commands::Get(args) => {
                let options = with_params(options, &args.params)?;
                service.get(&args.path, options).await?
            }
            Commands::Delete(args) => {
                let options = with_params(options, &args.params)?;
                service.delete(&args.path, options).await?
            }
            Commands::Put(args) => {
                let options = with_body(options, args.body.as_deref(), args.form)?;
                service.put(&args.path, options).await?
            }
            Commands::Post {
                body,
                xml,
                output_json,
            } => {
                let mut options = with_body(options, body.body.as_deref(), body.form)?;
                if xml {
                    options = options.expect_text();
                }
                if output_json {
                    options = options.output_json();
                }
                service.post(&body.path, options).await?
            }
            Commands::External {
                url,
                method,
                params,
                body,
                form,
            } => {
                let verb = Verb::from(method);
                let options = match verb {
                    Verb::Get | Verb::Delete => with_params(options, &params)?,
                    Verb::Put | Verb::Post => with_body(options, body.as_deref(), form)?,
                };
                service.call_external(&url, verb, options).await?
            }
        };
        Ok::<_, anyhow::Error>(response)
    };
    // Ctrl+C also covers the token load, not just the transport round trip
    let response = until_cancelled(&cancel, request).await?;

    print_response(response).await
}

/// Drives `request` to completion unless `cancel` fires first.
async fn until_cancelled<T>(
    cancel: &CancellationToken,
    request: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        _ = cancel.cancelled() => Err(anyhow::anyhow!("request cancelled")),
        result = request => result,
    }
}

/// Splits `KEY=VALUE`; the value may itself contain `=`.
fn split_pair(raw: &str) -> Result<(&str, &str)> {
    raw.split_once('=')
        .with_context(|| format!("expected KEY=VALUE, got '{raw}'"))
}

fn with_params(options: RequestOptions, params: &[String]) -> Result<RequestOptions> {
    if params.is_empty() {
        return Ok(options);
    }

    let mut map = Map::new();
    for raw in params {
        let (key, value) = split_pair(raw)?;
        match map.get_mut(key) {
            // Repeated keys become an array so they are sent repeatedly.
            Some(Value::Array(items)) => items.push(Value::String(value.to_string())),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value.to_string())]);
            }
            None => {
                map.insert(key.to_string(), Value::String(value.to_string()));
            }
        }
    }

    Ok(options.payload(Value::Object(map)))
}

fn with_body(options: RequestOptions, body: Option<&str>, form: bool) -> Result<RequestOptions> {
    let mut options = match body {
        Some(raw) => {
            let value: Value = serde_json::from_str(raw).context("--body must be valid JSON")?;
            options.payload(value)
        }
        None => options,
    };
    if form {
        options = options.form_encoded();
    }
    Ok(options)
}

async fn print_response(response: ApiResponse) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        info!(%status, "Request completed");
    } else {
        warn!(%status, "API returned a non-success status");
    }

    println!("{status}");
    match response.body().await? {
        ResponseBody::Json(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        ResponseBody::Text(text) => println!("{text}"),
    }

    Ok(())
}
