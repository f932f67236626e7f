// Benchmark harness for the pooled cache.
//
// Purpose:
// - Drive synthetic multi-stream workloads (ingest, replay, follow with purges) through `QueueCache`.
// - Emit machine-readable JSON to stdout and a human-readable table to stderr.
//
// Design notes:
// - Time is synthetic (one millisecond per message) so purge behaviour is repeatable.
// - Numbers are for trend tracking, not lab-grade profiling.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::{Value, json};

use pooled_cache::api::{
    BytesAdapter, CacheOptions, CacheStats, CacheStatsSnapshot, ChronologicalEviction, Cursor,
    Error, ErrorKind, EventRecord, QueueCache, SequenceToken, StreamId, TimePurgePredicate, Timestamp,
    TracingMonitor,
};

const CLOCK_BASE_MS: u64 = 1_700_000_000_000;

#[derive(Clone, Debug)]
pub struct BenchArgs {
    pub options: CacheOptions,
    pub predicate: TimePurgePredicate,
    pub payload_sizes: Vec<usize>,
    pub messages: u64,
    pub streams: u64,
    pub batch: usize,
    pub format: BenchFormat,
    /// Route block and arena pool statistics to the log instead of the counters.
    pub log_pool_stats: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BenchFormat {
    Json,
    Table,
    Both,
}

impl BenchFormat {
    pub fn parse(input: &str) -> Result<Self, Error> {
        match input.trim() {
            "json" => Ok(Self::Json),
            "table" => Ok(Self::Table),
            "both" => Ok(Self::Both),
            _ => Err(Error::new(ErrorKind::Usage)
                .with_message("invalid --format (use json|table|both)")),
        }
    }
}

/// Optional JSON document passed with `--config`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchConfig {
    pub cache: Option<CacheOptions>,
    pub eviction: Option<TimePurgePredicate>,
}

impl BenchConfig {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message(format!("failed to read config {}", path.display()))
                .with_source(err)
        })?;
        serde_json::from_str(&text).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("invalid config {}", path.display()))
                .with_hint("Expected {\"cache\": {...}, \"eviction\": {...}} with durations in milliseconds.")
                .with_source(err)
        })
    }
}

pub fn run_bench(args: BenchArgs, program_version: &str) -> Result<(), Error> {
    if args.messages == 0 || args.streams == 0 || args.batch == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--messages, --streams, and --batch must be greater than zero"));
    }
    if args.payload_sizes.is_empty() {
        return Err(Error::new(ErrorKind::Usage).with_message("--payload-bytes needs at least one size"));
    }
    args.options.validate()?;

    let started = Timestamp::now();
    let mut results = Vec::new();
    for payload_bytes in &args.payload_sizes {
        let workload = Workload::new(&args, *payload_bytes);
        let (ingest, replay) = bench_ingest_and_replay(&args, &workload)?;
        results.push(ingest);
        results.push(replay);
        results.push(bench_follow(&args, &workload)?);
    }

    let options = serde_json::to_value(args.options).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode cache options")
            .with_source(err)
    })?;
    let predicate = serde_json::to_value(args.predicate).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode eviction options")
            .with_source(err)
    })?;
    let output = json!({
        "name": "pooled-cache",
        "version": program_version,
        "ts": started.to_rfc3339(),
        "system": system_json(),
        "params": {
            "payload_sizes": args.payload_sizes,
            "messages": args.messages,
            "streams": args.streams,
            "batch": args.batch,
            "cache": options,
            "eviction": predicate,
            "debug_build": cfg!(debug_assertions),
        },
        "results": results,
    });

    emit_bench_output(output, args.format)
}

struct Workload {
    streams: Vec<StreamId>,
    payload: Vec<u8>,
    messages: u64,
    batch: usize,
}

impl Workload {
    fn new(args: &BenchArgs, payload_bytes: usize) -> Self {
        let streams = (0..args.streams)
            .map(|n| StreamId::from_name("bench", &n.to_string()))
            .collect();
        Self {
            streams,
            payload: vec![0x5a; payload_bytes],
            messages: args.messages,
            batch: args.batch,
        }
    }

    fn payload_bytes(&self) -> usize {
        self.payload.len()
    }
}

fn clock(seq: u64) -> Timestamp {
    Timestamp::from_millis(CLOCK_BASE_MS + seq)
}

fn build_cache(
    args: &BenchArgs,
    name: &str,
) -> Result<(QueueCache<BytesAdapter>, Arc<CacheStats>), Error> {
    let stats = Arc::new(CacheStats::new());
    let cache = QueueCache::new(
        args.options,
        BytesAdapter,
        ChronologicalEviction::new(args.predicate),
    )?
    .with_monitor(stats.clone());
    let cache = if args.log_pool_stats {
        cache.with_pool_monitor(Arc::new(TracingMonitor::new(name)))
    } else {
        cache.with_pool_monitor(stats.clone())
    };
    Ok((cache, stats))
}

/// Writes `count` payloads round-robin across streams, admitting them in batches.
fn ingest(
    cache: &mut QueueCache<BytesAdapter>,
    workload: &Workload,
    next_seq: &mut u64,
    count: u64,
) -> Result<(), Error> {
    let mut batch = Vec::with_capacity(workload.batch);
    for _ in 0..count {
        let seq = *next_seq;
        *next_seq += 1;
        let stream = workload.streams[(seq % workload.streams.len() as u64) as usize];
        let now = clock(seq);
        let slice = cache.write_payload_at(&workload.payload, now)?;
        batch.push(EventRecord::new(stream, SequenceToken::new(seq, 0), now, slice));
        if batch.len() == workload.batch {
            cache.add(batch.drain(..), now)?;
        }
    }
    if !batch.is_empty() {
        cache.add(batch.drain(..), clock(*next_seq))?;
    }
    Ok(())
}

fn drain(cache: &QueueCache<BytesAdapter>, cursor: &mut Cursor) -> Result<u64, Error> {
    let mut delivered = 0;
    while cache.try_get_next(cursor)?.is_some() {
        delivered += 1;
    }
    Ok(delivered)
}

fn bench_ingest_and_replay(args: &BenchArgs, workload: &Workload) -> Result<(Value, Value), Error> {
    let (mut cache, stats) = build_cache(args, "ingest")?;
    let mut next_seq = 0;

    let start = Instant::now();
    ingest(&mut cache, workload, &mut next_seq, workload.messages)?;
    let ingest_dur = start.elapsed();
    let snapshot = stats.snapshot();
    let ingest = result_entry(
        "ingest",
        workload,
        ingest_dur,
        Counters {
            delivered: 0,
            purged: snapshot.messages_purged,
            arenas_released: arenas_released(args, &snapshot),
            bytes_in_use: snapshot.bytes_in_use(),
        },
        Some("write_payload + add"),
    );

    let from = cache.cache().oldest_token();
    let start = Instant::now();
    let mut delivered = 0;
    for stream in &workload.streams {
        let mut cursor = cache.get_cursor(*stream, from)?;
        delivered += drain(&cache, &mut cursor)?;
    }
    cache.report_statistics();
    let replay = result_entry(
        "replay",
        workload,
        start.elapsed(),
        Counters {
            delivered,
            purged: 0,
            arenas_released: 0,
            bytes_in_use: stats.snapshot().bytes_in_use(),
        },
        Some("one cursor per stream from oldest"),
    );
    Ok((ingest, replay))
}

fn bench_follow(args: &BenchArgs, workload: &Workload) -> Result<Value, Error> {
    let (mut cache, stats) = build_cache(args, "follow")?;
    let mut cursors = workload
        .streams
        .iter()
        .map(|stream| cache.get_cursor(*stream, Some(SequenceToken::new(0, 0))))
        .collect::<Result<Vec<_>, _>>()?;

    let mut next_seq = 0;
    let mut delivered = 0;
    let start = Instant::now();
    while next_seq < workload.messages {
        let count = (workload.batch as u64).min(workload.messages - next_seq);
        ingest(&mut cache, workload, &mut next_seq, count)?;
        for cursor in &mut cursors {
            delivered += drain(&cache, cursor)?;
        }
        cache.perform_purge(clock(next_seq))?;
    }
    let dur = start.elapsed();
    cache.report_statistics();

    let snapshot = stats.snapshot();
    Ok(result_entry(
        "follow",
        workload,
        dur,
        Counters {
            delivered,
            purged: snapshot.messages_purged,
            arenas_released: arenas_released(args, &snapshot),
            bytes_in_use: snapshot.bytes_in_use(),
        },
        Some("add batch, drain cursors, time purge"),
    ))
}

// Arenas are fixed size, so released bytes divide into whole arenas.
fn arenas_released(args: &BenchArgs, snapshot: &CacheStatsSnapshot) -> u64 {
    snapshot.bytes_released / args.options.arena_capacity.max(1) as u64
}

struct Counters {
    delivered: u64,
    purged: u64,
    arenas_released: u64,
    bytes_in_use: u64,
}

fn result_entry(
    bench: &str,
    workload: &Workload,
    duration: Duration,
    counters: Counters,
    notes: Option<&str>,
) -> Value {
    let messages = workload.messages;
    let dur_ms = duration.as_secs_f64() * 1000.0;
    let ms_per_msg = dur_ms / messages.max(1) as f64;
    let mb = (workload.payload_bytes() as f64 * messages as f64) / (1024.0 * 1024.0);
    let secs = duration.as_secs_f64().max(1e-9);

    let mut map = BTreeMap::new();
    map.insert("bench".to_string(), json!(bench));
    map.insert("payload_bytes".to_string(), json!(workload.payload_bytes()));
    map.insert("messages".to_string(), json!(messages));
    map.insert("streams".to_string(), json!(workload.streams.len()));
    map.insert("duration_ms".to_string(), json!(dur_ms));
    map.insert("ms_per_msg".to_string(), json!(ms_per_msg));
    map.insert("msgs_per_sec".to_string(), json!(messages as f64 / secs));
    map.insert("mb_per_sec".to_string(), json!(mb / secs));
    map.insert("delivered".to_string(), json!(counters.delivered));
    map.insert("purged".to_string(), json!(counters.purged));
    map.insert("arenas_released".to_string(), json!(counters.arenas_released));
    map.insert("bytes_in_use".to_string(), json!(counters.bytes_in_use));
    if let Some(notes) = notes {
        map.insert("notes".to_string(), json!(notes));
    }
    Value::Object(map.into_iter().collect())
}

fn emit_bench_output(value: Value, format: BenchFormat) -> Result<(), Error> {
    if matches!(format, BenchFormat::Json | BenchFormat::Both) {
        println!(
            "{}",
            serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
        );
    }
    if matches!(format, BenchFormat::Table | BenchFormat::Both) {
        emit_table(&value)?;
    }
    Ok(())
}

fn emit_table(value: &Value) -> Result<(), Error> {
    let write_err = |err: io::Error| {
        Error::new(ErrorKind::Io)
            .with_message("failed to write bench table")
            .with_source(err)
    };
    let mut stderr = io::stderr().lock();
    writeln!(stderr, "pooled-cache bench (table)").map_err(write_err)?;

    let results = value
        .get("results")
        .and_then(|v| v.as_array())
        .ok_or_else(|| Error::new(ErrorKind::Internal).with_message("bench results missing"))?;

    writeln!(
        stderr,
        "{:>8}  {:>10}  {:>9}  {:>7}  {:>10}  {:>9}  {:>10}  {}",
        "bench", "payload", "msgs", "streams", "ms/msg", "purged", "in use", "notes"
    )
    .map_err(write_err)?;

    for item in results {
        let bench = item.get("bench").and_then(|v| v.as_str()).unwrap_or("?");
        let payload = item.get("payload_bytes").and_then(|v| v.as_u64()).unwrap_or(0);
        let msgs = item.get("messages").and_then(|v| v.as_u64()).unwrap_or(0);
        let streams = item.get("streams").and_then(|v| v.as_u64()).unwrap_or(0);
        let ms_per_msg = item
            .get("ms_per_msg")
            .and_then(|v| v.as_f64())
            .unwrap_or(f64::NAN);
        let purged = item.get("purged").and_then(|v| v.as_u64()).unwrap_or(0);
        let in_use = item.get("bytes_in_use").and_then(|v| v.as_u64()).unwrap_or(0);
        let notes = item.get("notes").and_then(|v| v.as_str()).unwrap_or("");

        writeln!(
            stderr,
            "{:>8}  {:>10}  {:>9}  {:>7}  {:>10.5}  {:>9}  {:>10}  {}",
            bench,
            format_bytes(payload),
            msgs,
            streams,
            ms_per_msg,
            purged,
            format_bytes(in_use),
            notes
        )
        .map_err(write_err)?;
    }

    Ok(())
}

fn system_json() -> Value {
    let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    json!({
        "os": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
        "cpus": cpus,
    })
}

fn format_bytes(value: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;
    const GB: f64 = 1024.0 * 1024.0 * 1024.0;

    let v = value as f64;
    if v >= GB {
        format!("{:.1}GiB", v / GB)
    } else if v >= MB {
        format!("{:.1}MiB", v / MB)
    } else if v >= KB {
        format!("{:.1}KiB", v / KB)
    } else {
        format!("{value}B")
    }
}
