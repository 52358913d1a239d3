// Simulated exec probe writing into shared memory channels.
//
// cargo run --example producer -- <num_execs> [--auto-exit]
// cargo run --example consumer -- <num_execs>
use dmxp_chunkstream::Signal::EmitOutcome;
use dmxp_chunkstream::Stream::{MemorySource, TaskField, TaskHandle, TaskSnapshot, TrustDomain};
use dmxp_chunkstream::{AgentConfig, ProbeRuntime};
use sha2::{Digest, Sha256};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const SHM_PREFIX: &str = "dmxp_cs_demo";
const PROBE_THREADS: usize = 4;

const FILENAME: u64 = 0xffff_8880_0010_0000;
const INTERP: u64 = 0xffff_8880_0020_0000;
const ARGS: u64 = 0x7ffd_0000_0000;
const ENV: u64 = 0x7ffd_0001_0000;

/// A fake process image for exec number `i`. The environment carries the
/// digest of argv so the consumer can check the reassembled bytes.
fn exec_snapshot(i: usize) -> TaskSnapshot {
    let args = format!("/usr/bin/worker\0--job\0{}\0--payload\0{}\0", i, "x".repeat(i % 3000))
        .into_bytes();
    let digest = format!("{:x}", Sha256::digest(&args));
    let envp = format!("HOME=/root\0ARGS_SHA256={}\0", digest).into_bytes();
    let interp = format!("/lib64/ld-linux-x86-64.so.2/{}", "i".repeat(i % 400));

    let mut memory = MemorySource::new();
    memory.map_cstr(FILENAME, b"/usr/bin/worker", TrustDomain::Collector);
    memory.map_cstr(INTERP, interp.as_bytes(), TrustDomain::Collector);
    let (args_len, env_len) = (args.len() as u64, envp.len() as u64);
    memory.map(ARGS, args, TrustDomain::Monitored);
    memory.map(ENV, envp, TrustDomain::Monitored);

    let task = TaskHandle(i as u64);
    let mut snap = TaskSnapshot::new(memory);
    snap.set_field(task, TaskField::Uid, 1000)
        .set_field(task, TaskField::Gid, 1000)
        .set_field(task, TaskField::Pid, 10_000 + i as u64)
        .set_field(task, TaskField::Tgid, 10_000 + i as u64)
        .set_field(task, TaskField::ParentPid, 1)
        .set_field(task, TaskField::FilenamePtr, FILENAME)
        .set_field(task, TaskField::InterpPtr, INTERP)
        .set_field(task, TaskField::ArgStart, ARGS)
        .set_field(task, TaskField::ArgEnd, ARGS + args_len)
        .set_field(task, TaskField::EnvStart, ENV)
        .set_field(task, TaskField::EnvEnd, ENV + env_len);
    snap
}

fn main() -> std::io::Result<()> {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <num_execs> [--auto-exit]", args[0]);
        std::process::exit(1);
    }

    let num_execs: usize = args[1].parse().expect("Invalid number of execs");
    let auto_exit = args.get(2).map(|s| s == "--auto-exit").unwrap_or(false);

    let mut config = AgentConfig::load_default()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;
    config.channels.shm_prefix.get_or_insert_with(|| SHM_PREFIX.to_string());

    let runtime = ProbeRuntime::new(&config)?;
    println!(
        "Producer: Created channels {:?} and {:?}",
        config.channels.chunk_channel_name(),
        config.channels.record_channel_name()
    );

    let keep_alive = Arc::new(AtomicBool::new(true));
    let keep_alive_for_handler = Arc::clone(&keep_alive);

    // Handle Ctrl+C to stop
    ctrlc::set_handler(move || {
        keep_alive_for_handler.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");

    println!("Producer: Emitting {} execs from {} probe threads...", num_execs, PROBE_THREADS);
    let start = Instant::now();

    let handles: Vec<_> = (0..PROBE_THREADS)
        .map(|t| {
            let runtime = runtime.clone();
            let keep_alive = Arc::clone(&keep_alive);
            thread::spawn(move || {
                let mut dropped = 0usize;
                for i in (t..num_execs).step_by(PROBE_THREADS) {
                    if !keep_alive.load(Ordering::Relaxed) {
                        break;
                    }
                    let snap = exec_snapshot(i);
                    // Read the CPU once per firing, like a probe would.
                    let inv = runtime.invocation();
                    if inv.assembler().emit_task_exec(&snap, TaskHandle(i as u64)) == EmitOutcome::Dropped {
                        dropped += 1;
                    }
                }
                dropped
            })
        })
        .collect();

    let dropped: usize = handles.into_iter().map(|h| h.join().unwrap_or(0)).sum();
    let stats = runtime.stats().snapshot();
    println!("Producer: Done in {:.2?}", start.elapsed());
    println!("  records submitted: {}", stats.records_submitted);
    println!("  records dropped:   {}", dropped);
    println!("  chunks committed:  {}", stats.chunks_committed);
    println!("  copies truncated:  {}", stats.copies_truncated);
    println!("  copies failed:     {}", stats.copies_failed);

    if auto_exit {
        return Ok(());
    }

    println!("Producer: Press Ctrl+C to exit");
    while keep_alive.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(100));
    }
    println!("Producer: Exiting");
    Ok(())
}
