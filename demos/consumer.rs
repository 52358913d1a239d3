// Reads the demo producer's channels, rebuilds every chain and checks the
// argv digest carried in each record's environment.
//
// cargo run --example consumer -- <num_execs>
use dmxp_chunkstream::error::ChainError;
use dmxp_chunkstream::Channel::RingChannel;
use dmxp_chunkstream::Core::SharedMemory::unlink_shared_memory;
use dmxp_chunkstream::Decode::{ChunkStore, ResolvedTask, ResolvedValue};
use dmxp_chunkstream::Signal::{decode_signal, Signal, TaskExecRecord};
use dmxp_chunkstream::Stream::{CopyStatus, StringField};
use dmxp_chunkstream::AgentConfig;
use sha2::{Digest, Sha256};
use std::env;
use std::time::{Duration, Instant};

const SHM_PREFIX: &str = "dmxp_cs_demo";
const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

fn attach(name: &str) -> std::io::Result<RingChannel> {
    let start = Instant::now();
    loop {
        match RingChannel::attach(name) {
            Ok(channel) => return Ok(channel),
            Err(e) if start.elapsed() > IDLE_TIMEOUT => return Err(e),
            Err(_) => std::thread::sleep(Duration::from_millis(50)),
        }
    }
}

fn digest_from_env(env: &[u8]) -> Option<&str> {
    env.split(|&b| b == 0)
        .filter_map(|var| std::str::from_utf8(var).ok())
        .find_map(|var| var.strip_prefix("ARGS_SHA256="))
}

/// Resolve `record`. A chain may still sit behind another producer's open
/// chunk, so missing links are retried after draining more.
fn resolve(
    store: &mut ChunkStore,
    chunks: &RingChannel,
    record: &TaskExecRecord,
    max_chunks: usize,
) -> ResolvedTask {
    store.drain(chunks);
    let mut resolved = store.resolve_task(record, max_chunks);

    let interp_truncated = matches!(record.exec.interp, StringField::Overflow { truncated: true, .. });
    let pending = [
        (&mut resolved.interp, record.exec.interp.chain_head(), interp_truncated),
        (
            &mut resolved.args,
            Some(record.exec.args.head),
            record.exec.args.status == CopyStatus::Truncated,
        ),
        (
            &mut resolved.env,
            Some(record.exec.env.head),
            record.exec.env.status == CopyStatus::Truncated,
        ),
    ];
    for (value, head, truncated) in pending {
        let Some(head) = head else { continue };
        for _ in 0..10 {
            if !matches!(value, ResolvedValue::Broken(ChainError::Missing(_))) {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
            store.drain(chunks);
            if let Ok(chain) = store.reassemble(head, max_chunks) {
                *value = ResolvedValue::Chain {
                    bytes: chain.bytes,
                    truncated,
                };
            }
        }
    }
    resolved
}

fn main() -> std::io::Result<()> {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <expected_execs>", args[0]);
        std::process::exit(1);
    }
    let expected: usize = args[1].parse().expect("Invalid number of execs");

    let mut config = AgentConfig::load_default()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;
    config.channels.shm_prefix.get_or_insert_with(|| SHM_PREFIX.to_string());
    let chunk_name = config.channels.chunk_channel_name().unwrap_or_default();
    let record_name = config.channels.record_channel_name().unwrap_or_default();

    println!("Consumer: Waiting for {} and {}...", chunk_name, record_name);
    let chunks = attach(&chunk_name)?;
    let records = attach(&record_name)?;
    println!("Consumer: Attached");

    let mut store = ChunkStore::new(config.consumer.max_pending);
    let max_chunks = config.stream.max_chunks;
    let (mut received, mut verified, mut mismatched, mut broken) = (0usize, 0usize, 0usize, 0usize);
    let start = Instant::now();

    while received < expected {
        let Some(bytes) = records.receive_timeout(IDLE_TIMEOUT) else {
            eprintln!("Timeout waiting for records");
            break;
        };
        let record = match decode_signal(&bytes) {
            Ok(decoded) => match decoded.signal {
                Signal::TaskExec(record) => record,
                Signal::CgroupSnapshot(_) => continue,
            },
            Err(e) => {
                eprintln!("Corrupt record: {}", e);
                continue;
            }
        };
        received += 1;

        let resolved = resolve(&mut store, &chunks, &record, max_chunks);
        match (resolved.args.bytes(), resolved.env.bytes()) {
            (Some(argv), Some(envp)) => {
                let digest = format!("{:x}", Sha256::digest(argv));
                if digest_from_env(envp) == Some(digest.as_str()) {
                    verified += 1;
                } else {
                    mismatched += 1;
                }
            }
            _ => broken += 1,
        }

        if received % 100 == 0 {
            println!("--- Received {} records (pid {}) ---", received, record.pid.pid);
        }
    }

    println!("\nConsumer: {} records in {:.2?}", received, start.elapsed());
    println!("  verified:   {}", verified);
    println!("  mismatched: {}", mismatched);
    println!("  unresolved: {}", broken);
    println!("  chunks evicted: {}, rejected: {}", store.evicted(), store.rejected());

    drop(chunks);
    drop(records);
    unlink_shared_memory(&chunk_name)?;
    unlink_shared_memory(&record_name)?;
    Ok(())
}
