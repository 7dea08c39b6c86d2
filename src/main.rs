//! DataVis-Ingest - Command line entry point
//!
//! Inspects and dumps data sources, and plays either side of the streaming
//! protocol for testing a visualizer against live data.

mod cli;

use anyhow::{anyhow, bail};
use clap::Parser;
use cli::{Cli, Command, DescribeArgs, DumpArgs, SendArgs};
use datavis_ingest::{
    config::{IngestConfig, StreamConfig},
    error::ResultExt,
    stream::Channel,
    CursorError, DataCursor, IngestError, Record, SourceSpec,
};
use std::io::BufRead;
use std::path::Path;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Pause between polls of an idle stream
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(50);

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.log_file.as_deref(), cli.verbose)?;

    let config = match &cli.config {
        Some(path) => IngestConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => IngestConfig::load_or_default(),
    };

    match cli.command {
        Command::Describe(args) => describe(args, &config),
        Command::Dump(args) => dump(args, &config),
        Command::Listen(args) => follow(SourceSpec::Listen { port: args.port }, args.limit, &config),
        Command::Dial(args) => follow(
            SourceSpec::Dial {
                address: args.address,
            },
            args.limit,
            &config,
        ),
        Command::Send(args) => send(args, &config),
    }
}

fn init_logging(log_file: Option<&Path>, verbose: u8) -> anyhow::Result<Option<WorkerGuard>> {
    let default_filter = match verbose {
        0 => "info,datavis_ingest=debug",
        1 => "debug,datavis_ingest=trace",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            let name = path
                .file_name()
                .ok_or_else(|| anyhow!("invalid log file {}", path.display()))?;
            let appender = tracing_appender::rolling::never(dir.unwrap_or(Path::new(".")), name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(guard)
}

fn describe(args: DescribeArgs, config: &IngestConfig) -> anyhow::Result<()> {
    let mut cursor = DataCursor::open(&args.source, config)
        .with_context(|| format!("opening {}", args.source))?;

    println!("source: {} ({})", args.source, cursor.kind());
    for (index, variable) in cursor.describe().variables().iter().enumerate() {
        let unit = if variable.unit.is_empty() {
            String::new()
        } else {
            format!(" [{}]", variable.unit)
        };
        println!("{:>3}  {}  {}{}", index, variable.name, variable.kind, unit);
        for entry in &variable.legend {
            println!("       {}", entry);
        }
    }

    cursor.close().context("closing source")?;
    Ok(())
}

fn dump(args: DumpArgs, config: &IngestConfig) -> anyhow::Result<()> {
    let mut cursor = DataCursor::open(&args.source, config)
        .with_context(|| format!("opening {}", args.source))?;
    let limit = args.limit.unwrap_or(usize::MAX);

    println!("{}", cursor.describe().labels().join(","));
    let mut first_pass = Vec::new();
    for record in cursor.records().take(limit) {
        let record = record.context("reading source")?;
        println!("{}", record.to_csv_line());
        first_pass.push(record);
    }

    if args.rewind_check {
        cursor.rewind().context("rewinding source")?;
        let second_pass = cursor
            .records()
            .take(first_pass.len())
            .collect::<Result<Vec<Record>, CursorError>>()
            .context("reading source after rewind")?;
        if second_pass != first_pass {
            bail!(
                "rewind check failed: {} records before rewind, {} after",
                first_pass.len(),
                second_pass.len()
            );
        }
        eprintln!("rewind check passed: {} records", first_pass.len());
    }

    cursor.close().context("closing source")?;
    Ok(())
}

/// Print records from a streaming source until it closes or `limit` is reached
fn follow(spec: SourceSpec, limit: Option<usize>, config: &IngestConfig) -> anyhow::Result<()> {
    let mut cursor =
        DataCursor::open(&spec, config).with_context(|| format!("opening {}", spec))?;
    println!("{}", cursor.describe().labels().join(","));

    let limit = limit.unwrap_or(usize::MAX);
    let mut printed = 0;
    while printed < limit {
        match cursor.next_record() {
            Ok(record) => {
                println!("{}", record.to_csv_line());
                printed += 1;
            }
            Err(CursorError::EndOfSource) => std::thread::sleep(IDLE_POLL_INTERVAL),
            Err(CursorError::SourceClosed) => break,
            Err(e) => return Err(IngestError::from(e).with_context("reading stream").into()),
        }
    }

    tracing::info!("Received {} records", printed);
    cursor.close().context("closing source")?;
    Ok(())
}

fn send(args: SendArgs, config: &IngestConfig) -> anyhow::Result<()> {
    if args.names.is_empty() {
        bail!("at least one variable name is required");
    }

    let mut channel = open_producer(&args, &config.stream)?;
    channel
        .send_handshake(args.names.as_slice())
        .context("sending handshake")?;
    let interval = Duration::from_millis(args.interval_ms);
    let mut sent = 0usize;

    let mut emit = |record: Record| -> datavis_ingest::Result<()> {
        channel.send_record(&record).context("sending record")?;
        sent += 1;
        if !interval.is_zero() {
            std::thread::sleep(interval);
        }
        Ok(())
    };

    match &args.file {
        Some(spec) => {
            let mut cursor =
                DataCursor::open(spec, config).with_context(|| format!("opening {}", spec))?;
            for record in cursor.records() {
                emit(record.context("reading source")?)?;
            }
            cursor.close().context("closing source")?;
        }
        None => {
            for line in std::io::stdin().lock().lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let values = line
                    .split(',')
                    .map(|t| t.trim().parse::<f64>())
                    .collect::<Result<Vec<_>, _>>();
                match values {
                    Ok(values) => emit(Record::new(values))?,
                    Err(_) => tracing::warn!("Skipping non-numeric line {:?}", line),
                }
            }
        }
    }

    tracing::info!("Sent {} records", sent);
    channel.close();
    Ok(())
}

fn open_producer(args: &SendArgs, config: &StreamConfig) -> datavis_ingest::Result<Channel> {
    match (&args.address, args.port) {
        (Some(address), _) => {
            Channel::dial(address.as_str(), config).with_context(|| format!("connecting to {}", address))
        }
        (None, Some(port)) => {
            Channel::listen(port, config).with_context(|| format!("listening on port {}", port))
        }
        (None, None) => Err(IngestError::Config(
            "either --address or --port is required".to_string(),
        )),
    }
}
