//! Purpose: `pooled-cache` CLI entry point for benchmarking the cache and generating completions.
//! Role: Parse args, dispatch subcommands, and render errors as JSON on stderr.
//! Invariants: Successful output is JSON on stdout; tables and logs go to stderr.
//! Invariants: Process exit codes are derived from the library's `ErrorKind`.
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::error::ErrorKind as ClapErrorKind;
use clap::{CommandFactory, Parser, Subcommand, ValueHint};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

use pooled_cache::api::{Error, ErrorKind, TimePurgePredicate, to_exit_code};

mod bench;

use bench::{BenchArgs, BenchConfig, BenchFormat};

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(code) => code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<i32, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(exit_code);
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Try `pooled-cache --help`."));
            }
        },
    };

    match cli.command {
        Command::Bench(args) => {
            let args = args.resolve()?;
            bench::run_bench(args, env!("CARGO_PKG_VERSION"))?;
        }
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "pooled-cache", &mut io::stdout());
        }
    }
    Ok(0)
}

#[derive(Parser)]
#[command(
    name = "pooled-cache",
    version,
    about = "Pooled in-memory message cache with replaying cursors",
    long_about = None,
    after_help = r#"EXAMPLES
  $ pooled-cache bench --messages 200000 --streams 16
  $ pooled-cache bench --config cache.json --format json
  $ RUST_LOG=debug pooled-cache bench --max-arenas 8 --arena-bytes 65536"#,
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Run synthetic cache workloads",
        long_about = r#"Run synthetic multi-stream workloads through the cache.

Reports ingest, replay, and follow-with-purge throughput as JSON on stdout
and a table on stderr. Flags override values loaded with --config."#
    )]
    Bench(BenchCli),
    #[command(
        arg_required_else_help = true,
        about = "Generate shell completions",
        after_help = r#"EXAMPLES
  $ pooled-cache completion bash > ~/.local/share/bash-completion/completions/pooled-cache
  $ pooled-cache completion zsh > ~/.zfunc/_pooled-cache"#
    )]
    Completion {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
}

#[derive(clap::Args)]
struct BenchCli {
    #[arg(
        long,
        help = "JSON file with optional \"cache\" and \"eviction\" sections",
        value_hint = ValueHint::FilePath
    )]
    config: Option<PathBuf>,
    #[arg(
        long = "payload-bytes",
        value_delimiter = ',',
        default_values_t = [64usize, 1024],
        help = "Payload sizes to run, comma separated"
    )]
    payload_bytes: Vec<usize>,
    #[arg(long, default_value_t = 100_000, help = "Messages per workload")]
    messages: u64,
    #[arg(long, default_value_t = 8, help = "Streams multiplexed into the cache")]
    streams: u64,
    #[arg(long, default_value_t = 64, help = "Records admitted per add")]
    batch: usize,
    #[arg(long = "block-capacity", help = "Records per block")]
    block_capacity: Option<usize>,
    #[arg(long = "arena-bytes", help = "Bytes per payload arena")]
    arena_bytes: Option<usize>,
    #[arg(long = "max-arenas", help = "Cap on live arenas; enables pressure purges")]
    max_arenas: Option<usize>,
    #[arg(long = "min-time-in-cache-ms", help = "Minimum residency before a time purge")]
    min_time_in_cache_ms: Option<u64>,
    #[arg(long = "max-relative-age-ms", help = "Age behind the newest record that allows a purge")]
    max_relative_age_ms: Option<u64>,
    #[arg(long, default_value = "both", help = "Output format: json|table|both")]
    format: String,
    #[arg(long = "log-pool-stats", help = "Log block and arena pool statistics after each workload")]
    log_pool_stats: bool,
}

impl BenchCli {
    fn resolve(self) -> Result<BenchArgs, Error> {
        let config = match &self.config {
            Some(path) => BenchConfig::load(path)?,
            None => BenchConfig::default(),
        };
        let mut options = config.cache.unwrap_or_default();
        if let Some(block_capacity) = self.block_capacity {
            options = options.with_block_capacity(block_capacity);
        }
        if let Some(arena_bytes) = self.arena_bytes {
            options = options.with_arena_capacity(arena_bytes);
        }
        if self.max_arenas.is_some() {
            options = options.with_max_arenas(self.max_arenas);
        }
        options.validate()?;

        let mut predicate = config.eviction.unwrap_or_else(bench_predicate);
        if let Some(ms) = self.min_time_in_cache_ms {
            predicate.min_time_in_cache = std::time::Duration::from_millis(ms);
        }
        if let Some(ms) = self.max_relative_age_ms {
            predicate.max_relative_age = std::time::Duration::from_millis(ms);
        }

        Ok(BenchArgs {
            options,
            predicate,
            payload_sizes: self.payload_bytes,
            messages: self.messages,
            streams: self.streams,
            batch: self.batch,
            format: BenchFormat::parse(&self.format)?,
            log_pool_stats: self.log_pool_stats,
        })
    }
}

// Bench clock advances one millisecond per message.
fn bench_predicate() -> TimePurgePredicate {
    TimePurgePredicate::new(
        std::time::Duration::from_secs(1),
        std::time::Duration::from_secs(5),
    )
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::StaleCursor => "cursor points at evicted data".to_string(),
        ErrorKind::RecordTooLarge => "record too large".to_string(),
        ErrorKind::BlockFull => "block is full".to_string(),
        ErrorKind::OutOfRange => "position out of range".to_string(),
        ErrorKind::PoolExhausted => "pool exhausted".to_string(),
        ErrorKind::Adapter => "adapter failed".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    use std::error::Error as _;

    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(stream) = err.stream() {
        inner.insert("stream".to_string(), json!(stream.to_string()));
    }
    if let Some(token) = err.token() {
        inner.insert("token".to_string(), json!(token.to_string()));
    }
    let (oldest, newest) = err.bounds();
    if let Some(oldest) = oldest {
        inner.insert("oldest".to_string(), json!(oldest.to_string()));
    }
    if let Some(newest) = newest {
        inner.insert("newest".to_string(), json!(newest.to_string()));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    for cause in error_causes(err) {
        lines.push(format!("caused by: {cause}"));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}
