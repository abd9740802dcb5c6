use hoist::config::parse_pairs;
use hoist::upload::{
    select_files, HttpTransport, PreflightChain, PreflightDecision, ProgressPrinter, RawFile,
    UploadEvent, UploadListener,
};
use hoist::{UploadConfig, UploadManager};
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info, warn};

#[derive(Default)]
struct CliArgs {
    endpoint: Option<String>,
    config_path: Option<PathBuf>,
    field_name: Option<String>,
    headers: Vec<String>,
    fields: Vec<String>,
    accept: Option<String>,
    max_size: Option<u64>,
    max_concurrent: Option<usize>,
    with_credentials: bool,
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() {
    // Use RUST_LOG env var if set, otherwise default to info level
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    let args: Vec<String> = env::args().collect();
    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(message) => {
            error!("{}", message);
            print_usage(&args[0]);
            std::process::exit(1);
        }
    };

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let mut raw_files = Vec::new();
    for path in &cli.files {
        match RawFile::from_path(path.clone()).await {
            Ok(file) => raw_files.push(file),
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }

    // Selection surface rules: accept filter and single-file mode
    let selected = select_files(raw_files, &config.accept, config.multiple);
    if selected.is_empty() {
        error!("No files to upload");
        std::process::exit(1);
    }

    let rejected = Arc::new(AtomicUsize::new(0));
    let mut preflight = PreflightChain::new();
    if let Some(limit) = cli.max_size {
        let rejected = rejected.clone();
        preflight = preflight.with_hook(move |file: RawFile| {
            let rejected = rejected.clone();
            async move {
                if file.size > limit {
                    warn!("Skipping '{}': {} bytes exceeds {}", file.name, file.size, limit);
                    rejected.fetch_add(1, Ordering::SeqCst);
                    PreflightDecision::Reject
                } else {
                    PreflightDecision::Accept(file)
                }
            }
        });
    }

    let transport = match HttpTransport::new() {
        Ok(transport) => Arc::new(transport),
        Err(e) => {
            error!("Failed to build HTTP client: {}", e);
            std::process::exit(1);
        }
    };

    let manager = UploadManager::new(
        config,
        transport,
        preflight,
        tokio::runtime::Handle::current(),
    );
    let printer = ProgressPrinter::stdout();
    let mut events = manager.subscribe_all();

    let submitted = manager.submit_batch(selected);
    let (succeeded, failed) = follow_batch(&mut events, &printer, submitted, &rejected).await;

    info!(
        "{} uploaded, {} failed, {} skipped",
        succeeded,
        failed,
        rejected.load(Ordering::SeqCst)
    );

    if failed > 0 {
        std::process::exit(2);
    }
}

/// Print events until every submitted file is terminal or was rejected.
///
/// A record's terminal event is published after its last change, so once the
/// final one is printed nothing is left to show.
async fn follow_batch(
    events: &mut UnboundedReceiver<UploadEvent>,
    printer: &ProgressPrinter,
    submitted: usize,
    rejected: &AtomicUsize,
) -> (usize, usize) {
    let mut succeeded = 0;
    let mut failed = 0;
    // Rejections publish nothing, so re-check the counter periodically
    let mut ticker = tokio::time::interval(Duration::from_millis(100));

    while succeeded + failed + rejected.load(Ordering::SeqCst) < submitted {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    warn!("Event channel closed before the batch finished");
                    break;
                };
                printer.on_event(&event);
                match event {
                    UploadEvent::Success { .. } => succeeded += 1,
                    UploadEvent::Error { .. } => failed += 1,
                    _ => {}
                }
            }
            _ = ticker.tick() => {}
        }
    }

    (succeeded, failed)
}

fn build_config(cli: &CliArgs) -> Result<UploadConfig, hoist::ConfigError> {
    let mut config = if let Some(path) = &cli.config_path {
        UploadConfig::from_json_file(path)?
    } else if let Some(endpoint) = &cli.endpoint {
        UploadConfig::new(endpoint.clone())
    } else {
        UploadConfig::from_env()?
    };

    if let Some(endpoint) = &cli.endpoint {
        config.endpoint = endpoint.clone();
    }
    if let Some(field_name) = &cli.field_name {
        config.field_name = field_name.clone();
    }
    for header in &cli.headers {
        config.headers.extend(parse_pairs("--header", header)?);
    }
    for field in &cli.fields {
        config.extra_fields.extend(parse_pairs("--data", field)?);
    }
    if let Some(accept) = &cli.accept {
        config.accept = hoist::upload::AcceptFilter::parse(accept);
    }
    if let Some(max) = cli.max_concurrent {
        config.max_concurrent_uploads = Some(max);
    }
    if cli.with_credentials {
        config.with_credentials = true;
    }

    config.validate()?;
    Ok(config)
}

fn parse_args(args: &[String]) -> Result<CliArgs, String> {
    let mut cli = CliArgs::default();

    let mut i = 1;
    while i < args.len() {
        let arg = args[i].as_str();
        match arg {
            "--endpoint" | "--config" | "--field" | "--header" | "--data" | "--accept"
            | "--max-size" | "--max-concurrent" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| format!("{} requires a value", arg))?
                    .clone();
                match arg {
                    "--endpoint" => cli.endpoint = Some(value),
                    "--config" => cli.config_path = Some(PathBuf::from(value)),
                    "--field" => cli.field_name = Some(value),
                    "--header" => cli.headers.push(value),
                    "--data" => cli.fields.push(value),
                    "--accept" => cli.accept = Some(value),
                    "--max-size" => {
                        cli.max_size = Some(
                            value
                                .parse()
                                .map_err(|e| format!("Invalid --max-size: {}", e))?,
                        )
                    }
                    _ => {
                        cli.max_concurrent = Some(
                            value
                                .parse()
                                .map_err(|e| format!("Invalid --max-concurrent: {}", e))?,
                        )
                    }
                }
                i += 2;
            }
            "--with-credentials" => {
                cli.with_credentials = true;
                i += 1;
            }
            other if other.starts_with("--") => {
                return Err(format!("Unknown argument: {}", other));
            }
            path => {
                cli.files.push(PathBuf::from(path));
                i += 1;
            }
        }
    }

    if cli.files.is_empty() {
        return Err("No input files specified".to_string());
    }

    Ok(cli)
}

fn print_usage(program_name: &str) {
    eprintln!("Usage:");
    eprintln!("  {} [options] <file>...", program_name);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --endpoint <url>        Upload URL (default: HOIST_ENDPOINT)");
    eprintln!("  --config <file.json>    Load configuration from a JSON file");
    eprintln!("  --field <name>          Form field for the file (default: file)");
    eprintln!("  --header <k=v>          Extra request header, repeatable");
    eprintln!("  --data <k=v>            Extra form field, repeatable");
    eprintln!("  --accept <list>         Accepted types, e.g. \".png,image/*\"");
    eprintln!("  --max-size <bytes>      Skip files larger than this");
    eprintln!("  --max-concurrent <n>    Limit simultaneous uploads");
    eprintln!("  --with-credentials      Keep and send cookies");
    eprintln!();
    eprintln!("Examples:");
    eprintln!(
        "  {} --endpoint https://example.com/upload a.png b.png",
        program_name
    );
}
