use clap::Parser;
use futures::future::join_all;
use md_bus::model::PublishMeta;
use md_bus::{Config, Error, NormalizedMessage, Result};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "md-bus")]
#[command(about = "Market-data event bus: encode and publish normalized events", long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    #[arg(short, long, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(short, long, help = "Verbose logging")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, args.verbose);

    info!("Starting md-bus");
    info!("Loading configuration from {:?}", args.config);

    let config = match Config::from_file(&args.config) {
        Ok(cfg) => {
            info!("Configuration loaded successfully");
            cfg
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(Error::Config(e.to_string()));
        }
    };
    config.validate()?;

    if config.sinks.is_empty() {
        return Err(Error::Config("no sinks configured".to_string()));
    }

    info!(
        source = %config.bus.source,
        origin = ?config.bus.origin,
        sinks = config.sinks.len(),
        "Configuration summary"
    );

    let mut sinks = Vec::with_capacity(config.sinks.len());
    for sink_config in &config.sinks {
        let mut sink = md_bus::sink::build(sink_config)?;
        sink.start().await?;
        info!(
            tier = sink_config.tier.as_str(),
            transport = sink_config.transport.name(),
            "sink ready"
        );
        sinks.push(sink);
    }

    // Normalized messages arrive from the gateway as newline-delimited
    // JSON on stdin; publishing is fire-and-forget from its perspective.
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut published: u64 = 0;

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                None => break,
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => {
                    match serde_json::from_str::<NormalizedMessage>(&line) {
                        Ok(message) => {
                            let mut meta =
                                PublishMeta::new(config.bus.source.clone(), config.bus.origin);
                            meta.request_id = config.bus.request_id.clone();
                            meta.session_id = config.bus.session_id.clone();
                            meta.extra_meta = config.bus.extra_meta.clone();
                            for sink in &sinks {
                                sink.publish(message.clone(), meta.clone());
                            }
                            published += 1;
                        }
                        Err(e) => warn!(error = %e, "skipping undecodable input line"),
                    }
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    info!(published, "draining sinks");
    let results = join_all(sinks.iter_mut().map(|s| s.close())).await;
    for result in results {
        if let Err(e) = result {
            error!("sink close failed: {}", e);
        }
    }
    info!("md-bus stopped");

    Ok(())
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("md_bus=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("md_bus=info,warn"))
    };

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
