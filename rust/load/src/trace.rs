//! Replay of cache-access traces.
//!
//! A trace is a comma-separated file with one request per line:
//! `timestamp, anonymized key, key size, value size, client id, operation, ttl`.  Files ending in
//! `.zst`/`.zstd` are zstd-compressed and files ending in `.gz` are gzip-compressed.  The whole
//! trace is parsed into memory up front and replayed read-only; the only mutable state is a pair
//! of atomic cursors.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_compression::tokio::bufread::{GzipDecoder, ZstdDecoder};
use bytes::Bytes;
use raftkv_types::{KvOp, TraceOperation, TraceRecord, WorkItem};
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::config::{ReadMode, TraceConfig};
use crate::errors::TraceError;
use crate::workload::Workload;

/// Value size used when a record carries none.
pub const DEFAULT_VALUE_SIZE: usize = 100;
/// Placeholder written by the update half of `incr`/`decr`.
pub const PLACEHOLDER_VALUE: &[u8] = b"1";

const TRACE_FIELDS: usize = 7;
const READ_BUFFER_SIZE: usize = 64 * 1024;

///////////////////////////////////////////// parsing //////////////////////////////////////////////

/// Parse one trace line.  Lines with the wrong number of fields or an unparsable numeric field
/// yield `None`.
pub fn parse_trace_line(line: &str) -> Option<TraceRecord> {
    let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split(',').collect();
    if fields.len() != TRACE_FIELDS {
        return None;
    }
    Some(TraceRecord {
        timestamp_seconds: fields[0].trim().parse().ok()?,
        key: fields[1].to_string(),
        key_size: fields[2].trim().parse().ok()?,
        value_size: fields[3].trim().parse().ok()?,
        client_id: fields[4].to_string(),
        operation: TraceOperation::parse(fields[5]),
        ttl_seconds: fields[6].trim().parse().ok()?,
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Compression {
    None,
    Gzip,
    Zstd,
}

impl Compression {
    fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("zst") | Some("zstd") => Compression::Zstd,
            Some("gz") => Compression::Gzip,
            _ => Compression::None,
        }
    }
}

/// Read records until EOF or until `max_records` (zero for no cap) have been collected.  Returns
/// the records and the number of lines skipped.
pub async fn read_trace<R: AsyncBufRead + Unpin>(
    reader: R,
    max_records: usize,
) -> Result<(Vec<TraceRecord>, usize), TraceError> {
    let mut records = vec![];
    let mut skipped = 0;
    let mut lines = reader.lines();
    while max_records == 0 || records.len() < max_records {
        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse_trace_line(&line) {
            Some(record) => records.push(record),
            None => skipped += 1,
        }
    }
    Ok((records, skipped))
}

/// Open and parse the trace at `path`, decompressing according to its extension.
pub async fn parse_trace(path: &Path, max_records: usize) -> Result<Vec<TraceRecord>, TraceError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|source| TraceError::Open {
            path: path.display().to_string(),
            source,
        })?;
    let file = BufReader::with_capacity(READ_BUFFER_SIZE, file);
    let (records, skipped) = match Compression::for_path(path) {
        Compression::None => read_trace(file, max_records).await?,
        Compression::Gzip => {
            let mut decoder = GzipDecoder::new(file);
            decoder.multiple_members(true);
            read_trace(BufReader::with_capacity(READ_BUFFER_SIZE, decoder), max_records).await?
        }
        Compression::Zstd => {
            let mut decoder = ZstdDecoder::new(file);
            decoder.multiple_members(true);
            read_trace(BufReader::with_capacity(READ_BUFFER_SIZE, decoder), max_records).await?
        }
    };
    if skipped > 0 {
        tracing::warn!(skipped, path = %path.display(), "skipped malformed trace lines");
    }
    Ok(records)
}

/////////////////////////////////////////// OpBreakdown ////////////////////////////////////////////

/// How the operations of a trace split up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OpBreakdown {
    pub reads: u64,
    pub writes: u64,
    pub deletes: u64,
    pub read_modify_writes: u64,
    pub other: u64,
}

impl OpBreakdown {
    pub fn of(records: &[TraceRecord]) -> Self {
        let mut breakdown = OpBreakdown::default();
        for record in records {
            match record.operation {
                op if op.is_read() => breakdown.reads += 1,
                op if op.is_write() => breakdown.writes += 1,
                TraceOperation::Delete => breakdown.deletes += 1,
                TraceOperation::Incr | TraceOperation::Decr => breakdown.read_modify_writes += 1,
                _ => breakdown.other += 1,
            }
        }
        breakdown
    }
}

fn percent(part: u64, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * part as f64 / total as f64
    }
}

////////////////////////////////////////// TraceWorkload ///////////////////////////////////////////

/// A parsed trace ready to replay.
///
/// Replay claims records through a lock-free cursor so that any number of claimers can share one
/// workload; each record is handed out once per pass.  The load phase walks the unique keys of
/// the trace the same way with its own cursor.
#[derive(Debug)]
pub struct TraceWorkload {
    records: Vec<TraceRecord>,
    keys: Vec<Bytes>,
    cursor: AtomicU64,
    unique_keys: Vec<(Bytes, usize)>,
    load_cursor: AtomicU64,
    read_mode: ReadMode,
    loop_replay: bool,
    write_value_size: usize,
    values: Bytes,
    breakdown: OpBreakdown,
}

impl TraceWorkload {
    pub async fn open(config: &TraceConfig) -> Result<Self, TraceError> {
        let records = parse_trace(Path::new(&config.path), config.max_records).await?;
        if records.is_empty() {
            return Err(TraceError::Empty(config.path.clone()));
        }
        let workload = Self::new(records, config);
        workload.log_summary(&config.path);
        Ok(workload)
    }

    /// Build a workload from already-parsed records.  `records` must not be empty.
    pub fn new(records: Vec<TraceRecord>, config: &TraceConfig) -> Self {
        let keys: Vec<Bytes> = records
            .iter()
            .map(|r| Bytes::copy_from_slice(r.key.as_bytes()))
            .collect();
        let mut index: HashMap<&Bytes, usize> = HashMap::new();
        let mut unique_keys: Vec<(Bytes, usize)> = vec![];
        for (record, key) in records.iter().zip(keys.iter()) {
            let size = if record.value_size > 0 {
                record.value_size as usize
            } else {
                0
            };
            match index.get(key) {
                Some(idx) => {
                    let entry = &mut unique_keys[*idx];
                    entry.1 = entry.1.max(size);
                }
                None => {
                    index.insert(key, unique_keys.len());
                    unique_keys.push((key.clone(), size));
                }
            }
        }
        let largest = records
            .iter()
            .map(|r| r.value_size_or(DEFAULT_VALUE_SIZE))
            .max()
            .unwrap_or(DEFAULT_VALUE_SIZE)
            .max(DEFAULT_VALUE_SIZE)
            .max(config.write_value_size);
        let breakdown = OpBreakdown::of(&records);
        TraceWorkload {
            records,
            keys,
            cursor: AtomicU64::new(0),
            unique_keys,
            load_cursor: AtomicU64::new(0),
            read_mode: config.read_mode,
            loop_replay: config.loop_replay,
            write_value_size: config.write_value_size,
            values: Bytes::from(vec![b'x'; largest]),
            breakdown,
        }
    }

    fn log_summary(&self, path: &str) {
        let total = self.records.len();
        let b = &self.breakdown;
        tracing::info!(
            path,
            records = total,
            unique_keys = self.unique_keys.len(),
            read_mode = %self.read_mode,
            loop_replay = self.loop_replay,
            "loaded trace"
        );
        tracing::info!(
            "operation breakdown: reads {} ({:.1}%), writes {} ({:.1}%), deletes {} ({:.1}%), incr/decr {} ({:.1}%), other {} ({:.1}%)",
            b.reads,
            percent(b.reads, total),
            b.writes,
            percent(b.writes, total),
            b.deletes,
            percent(b.deletes, total),
            b.read_modify_writes,
            percent(b.read_modify_writes, total),
            b.other,
            percent(b.other, total),
        );
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn unique_key_count(&self) -> usize {
        self.unique_keys.len()
    }

    fn value_of(&self, size: usize) -> Bytes {
        self.values.slice(0..size.min(self.values.len()))
    }

    /// Claim the index of the next record to replay.  Once the trace is exhausted this wraps to
    /// the start when looping and returns `None` otherwise.
    pub fn claim(&self) -> Option<usize> {
        let n = self.records.len() as u64;
        if n == 0 {
            return None;
        }
        let loop_replay = self.loop_replay;
        let prev = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                if c < n {
                    Some(c + 1)
                } else if loop_replay {
                    Some(1)
                } else {
                    None
                }
            })
            .ok()?;
        if prev < n {
            Some(prev as usize)
        } else {
            Some(0)
        }
    }

    /// The operation a record replays as.
    pub fn op_for(&self, idx: usize) -> KvOp {
        let record = &self.records[idx];
        let key = self.keys[idx].clone();
        match record.operation {
            TraceOperation::Get | TraceOperation::Gets => match self.read_mode {
                ReadMode::Skip => KvOp::Nop,
                ReadMode::Write => {
                    KvOp::Put(WorkItem::new(key, self.value_of(self.write_value_size)))
                }
                ReadMode::Read => KvOp::Read(key),
            },
            TraceOperation::Add => KvOp::Insert(WorkItem::new(
                key,
                self.value_of(record.value_size_or(DEFAULT_VALUE_SIZE)),
            )),
            TraceOperation::Set
            | TraceOperation::Replace
            | TraceOperation::Cas
            | TraceOperation::Append
            | TraceOperation::Prepend => KvOp::Put(WorkItem::new(
                key,
                self.value_of(record.value_size_or(DEFAULT_VALUE_SIZE)),
            )),
            TraceOperation::Delete => KvOp::Delete(key),
            TraceOperation::Incr | TraceOperation::Decr => KvOp::ReadModifyWrite(WorkItem::new(
                key,
                Bytes::from_static(PLACEHOLDER_VALUE),
            )),
            TraceOperation::Other => KvOp::Nop,
        }
    }

    /// The next insert of the load phase, or `None` once every unique key has been handed out.
    pub fn next_load_op(&self) -> Option<KvOp> {
        let n = self.unique_keys.len() as u64;
        let idx = self
            .load_cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                if c < n {
                    Some(c + 1)
                } else {
                    None
                }
            })
            .ok()?;
        let (key, size) = &self.unique_keys[idx as usize];
        let size = if *size > 0 { *size } else { DEFAULT_VALUE_SIZE };
        Some(KvOp::Insert(WorkItem::new(key.clone(), self.value_of(size))))
    }
}

impl Workload for TraceWorkload {
    fn name(&self) -> &'static str {
        "trace-replay"
    }

    fn next_op(&self) -> Option<KvOp> {
        self.claim().map(|idx| self.op_for(idx))
    }
}

/// The load phase of a trace as a workload of its own.
#[derive(Clone, Debug)]
pub struct TraceLoadPhase {
    trace: Arc<TraceWorkload>,
}

impl TraceLoadPhase {
    pub fn new(trace: Arc<TraceWorkload>) -> Self {
        TraceLoadPhase { trace }
    }
}

impl Workload for TraceLoadPhase {
    fn name(&self) -> &'static str {
        "trace-load"
    }

    fn next_op(&self) -> Option<KvOp> {
        self.trace.next_load_op()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::io::Write;

    use raftkv_types::OpKind;

    use super::*;

    fn record(t: f64, key: &str, value_size: i64, op: &str) -> TraceRecord {
        TraceRecord {
            timestamp_seconds: t,
            key: key.to_string(),
            key_size: key.len() as i64,
            value_size,
            client_id: "c1".to_string(),
            operation: TraceOperation::parse(op),
            ttl_seconds: 0,
        }
    }

    fn config(read_mode: ReadMode, loop_replay: bool) -> TraceConfig {
        let mut config = TraceConfig::new("trace.csv");
        config.read_mode = read_mode;
        config.loop_replay = loop_replay;
        config
    }

    const TRACE: &str = "0,a,1,12,c1,set,0\n\
        1,a,1,0,c1,get,0\n\
        2,b,1,7,c2,ADD,60\n\
        this,line,is,malformed\n\
        3,b,1,x,c2,get,0\n\
        4,c,1,0,c3,incr,0\n\
        5,a,1,0,c1,delete,0\n";

    #[test]
    fn parse_skips_malformed_lines() {
        assert!(parse_trace_line("0,a,1,1,c1,set").is_none());
        assert!(parse_trace_line("0,a,1,1,c1,set,0,extra").is_none());
        assert!(parse_trace_line("zero,a,1,1,c1,set,0").is_none());
        let r = parse_trace_line("0.5,a,1,1,c1,GETS,0\r").unwrap();
        assert_eq!(TraceOperation::Gets, r.operation);
        assert_eq!(0.5, r.timestamp_seconds);
    }

    #[tokio::test]
    async fn read_trace_counts_skips_and_honours_cap() {
        let (records, skipped) = read_trace(TRACE.as_bytes(), 0).await.unwrap();
        assert_eq!(5, records.len());
        assert_eq!(2, skipped);
        let (records, _) = read_trace(TRACE.as_bytes(), 2).await.unwrap();
        assert_eq!(2, records.len());
        assert_eq!(TraceOperation::Get, records[1].operation);
    }

    #[tokio::test]
    async fn short_line_does_not_swallow_the_next_record() {
        let (records, skipped) = read_trace(&b"0,a,1,1,c1\n0,b,1,1,c1,set,0\n"[..], 0)
            .await
            .unwrap();
        assert_eq!(1, skipped);
        assert_eq!(1, records.len());
        assert_eq!("b", records[0].key);
        assert_eq!(TraceOperation::Set, records[0].operation);
    }

    #[test]
    fn write_mode_turns_reads_into_updates() {
        let records = vec![record(0.0, "a", 1, "set"), record(1.0, "a", 1, "get")];
        let trace = TraceWorkload::new(records, &config(ReadMode::Write, false));
        let mut ops = vec![];
        while let Some(op) = trace.next_op() {
            ops.push(op);
        }
        assert_eq!(2, ops.len());
        assert!(ops.iter().all(|op| op.kind() == OpKind::Put));
        let KvOp::Put(item) = &ops[1] else {
            unreachable!()
        };
        assert_eq!(&Bytes::from_static(b"a"), item.key());
        assert_eq!(1, item.value().len());
    }

    #[test]
    fn operation_mapping() {
        let records = vec![
            record(0.0, "a", 0, "set"),
            record(0.0, "a", 5, "add"),
            record(0.0, "a", 5, "get"),
            record(0.0, "a", 5, "delete"),
            record(0.0, "a", 9, "append"),
            record(0.0, "a", 0, "decr"),
            record(0.0, "a", 0, "touch"),
        ];
        let trace = TraceWorkload::new(records, &config(ReadMode::Read, false));
        let kinds: Vec<OpKind> = (0..7).map(|i| trace.op_for(i).kind()).collect();
        assert_eq!(
            vec![
                OpKind::Put,
                OpKind::Insert,
                OpKind::Read,
                OpKind::Delete,
                OpKind::Put,
                OpKind::ReadModifyWrite,
                OpKind::Nop
            ],
            kinds
        );
        let KvOp::Put(item) = trace.op_for(0) else {
            unreachable!()
        };
        assert_eq!(DEFAULT_VALUE_SIZE, item.value().len());
        let KvOp::Put(item) = trace.op_for(4) else {
            unreachable!()
        };
        assert_eq!(9, item.value().len());
        let KvOp::ReadModifyWrite(item) = trace.op_for(5) else {
            unreachable!()
        };
        assert_eq!(&b"1"[..], &item.value()[..]);

        let skip = TraceWorkload::new(vec![record(0.0, "a", 5, "gets")], &config(ReadMode::Skip, false));
        assert!(skip.next_op().unwrap().is_nop());
    }

    #[test]
    fn exhaustion_without_loop_is_clean() {
        let records = vec![record(0.0, "a", 1, "set"), record(1.0, "b", 1, "set")];
        let trace = TraceWorkload::new(records, &config(ReadMode::Read, false));
        assert_eq!(Some(0), trace.claim());
        assert_eq!(Some(1), trace.claim());
        assert_eq!(None, trace.claim());
        assert_eq!(None, trace.claim());
        assert_eq!(2, trace.cursor.load(Ordering::Acquire));
    }

    #[test]
    fn loop_replay_repeats_the_same_sequence() {
        let records = vec![
            record(0.0, "a", 1, "set"),
            record(1.0, "b", 1, "get"),
            record(2.0, "c", 1, "delete"),
        ];
        let trace = TraceWorkload::new(records, &config(ReadMode::Read, true));
        let first: Vec<KvOp> = (0..3).filter_map(|_| trace.next_op()).collect();
        let second: Vec<KvOp> = (0..3).filter_map(|_| trace.next_op()).collect();
        assert_eq!(first, second);
        assert!(trace.cursor.load(Ordering::Acquire) <= 3);
    }

    #[test]
    fn concurrent_claims_partition_the_trace() {
        let records: Vec<TraceRecord> = (0..10_000)
            .map(|i| record(i as f64, &format!("k{i}"), 1, "set"))
            .collect();
        let trace = Arc::new(TraceWorkload::new(records, &config(ReadMode::Read, false)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let trace = Arc::clone(&trace);
                std::thread::spawn(move || {
                    let mut claimed = vec![];
                    while let Some(idx) = trace.claim() {
                        claimed.push(idx);
                    }
                    claimed
                })
            })
            .collect();
        let mut all = vec![];
        for handle in handles {
            all.extend(handle.join().unwrap());
        }
        assert_eq!(10_000, all.len());
        let unique: HashSet<usize> = all.into_iter().collect();
        assert_eq!(10_000, unique.len());
        assert_eq!(10_000, trace.cursor.load(Ordering::Acquire));
    }

    #[test]
    fn load_phase_inserts_each_key_once_at_max_size() {
        let records = vec![
            record(0.0, "a", 10, "set"),
            record(1.0, "b", 0, "get"),
            record(2.0, "a", 40, "set"),
            record(3.0, "c", 3, "add"),
            record(4.0, "b", -1, "get"),
        ];
        let trace = Arc::new(TraceWorkload::new(records, &config(ReadMode::Read, false)));
        let load = TraceLoadPhase::new(Arc::clone(&trace));
        let mut inserted = vec![];
        while let Some(op) = load.next_op() {
            let KvOp::Insert(item) = op else {
                panic!("load phase only inserts");
            };
            inserted.push((item.key().clone(), item.value().len()));
        }
        assert_eq!(
            vec![
                (Bytes::from_static(b"a"), 40),
                (Bytes::from_static(b"b"), DEFAULT_VALUE_SIZE),
                (Bytes::from_static(b"c"), 3),
            ],
            inserted
        );
        assert_eq!(3, trace.unique_key_count());
        // The load phase does not disturb the replay cursor.
        assert_eq!(0, trace.cursor.load(Ordering::Acquire));
    }

    #[test]
    fn breakdown_counts_by_class() {
        let records = vec![
            record(0.0, "a", 1, "get"),
            record(0.0, "a", 1, "gets"),
            record(0.0, "a", 1, "cas"),
            record(0.0, "a", 1, "delete"),
            record(0.0, "a", 1, "incr"),
            record(0.0, "a", 1, "touch"),
        ];
        assert_eq!(
            OpBreakdown {
                reads: 2,
                writes: 1,
                deletes: 1,
                read_modify_writes: 1,
                other: 1,
            },
            OpBreakdown::of(&records)
        );
    }

    #[tokio::test]
    async fn compressed_traces_parse_like_plain_text() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("trace.csv");
        std::fs::write(&plain, TRACE).unwrap();

        let gz = dir.path().join("trace.csv.gz");
        let mut encoder = async_compression::tokio::write::GzipEncoder::new(vec![]);
        tokio::io::AsyncWriteExt::write_all(&mut encoder, TRACE.as_bytes())
            .await
            .unwrap();
        tokio::io::AsyncWriteExt::shutdown(&mut encoder).await.unwrap();
        std::fs::File::create(&gz)
            .unwrap()
            .write_all(&encoder.into_inner())
            .unwrap();

        let zst = dir.path().join("trace.csv.zst");
        let mut encoder = async_compression::tokio::write::ZstdEncoder::new(vec![]);
        tokio::io::AsyncWriteExt::write_all(&mut encoder, TRACE.as_bytes())
            .await
            .unwrap();
        tokio::io::AsyncWriteExt::shutdown(&mut encoder).await.unwrap();
        std::fs::File::create(&zst)
            .unwrap()
            .write_all(&encoder.into_inner())
            .unwrap();

        let expected = parse_trace(&plain, 0).await.unwrap();
        assert_eq!(5, expected.len());
        assert_eq!(expected, parse_trace(&gz, 0).await.unwrap());
        assert_eq!(expected, parse_trace(&zst, 0).await.unwrap());
    }

    #[tokio::test]
    async fn empty_trace_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        std::fs::write(&path, "not,a,trace\n").unwrap();
        let config = TraceConfig::new(path.display().to_string());
        let err = TraceWorkload::open(&config).await.unwrap_err();
        assert!(matches!(err, TraceError::Empty(_)), "{err}");
        let config = TraceConfig::new(dir.path().join("missing.csv").display().to_string());
        let err = TraceWorkload::open(&config).await.unwrap_err();
        assert!(matches!(err, TraceError::Open { .. }), "{err}");
    }
}
