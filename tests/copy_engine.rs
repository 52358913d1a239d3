// Segmented copy engine: chain shape, truncation and failure contracts.
// Run with: cargo test --test copy_engine -- --nocapture

use dmxp_chunkstream::error::{ChainError, SourceFault};
use dmxp_chunkstream::Channel::{ChannelBuilder, RingChannel};
use dmxp_chunkstream::Core::{ChunkId, ChunkIdAllocator};
use dmxp_chunkstream::Decode::ChunkStore;
use dmxp_chunkstream::Stream::{
    decode_chunk, ChunkHeader, ChunkWriter, CopyFailure, CopyStatus, MemorySource, SizeClass,
    StreamStats, TrustDomain,
};
use dmxp_chunkstream::StreamConfig;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

const ADDR: u64 = 0x7f00_0000_1000;

struct Harness {
    channel: RingChannel,
    ids: ChunkIdAllocator,
    stats: StreamStats,
}

impl Harness {
    fn new(capacity: usize) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        Self {
            channel: ChannelBuilder::new().with_capacity(capacity).build().unwrap(),
            ids: ChunkIdAllocator::new(4),
            stats: StreamStats::new(),
        }
    }

    fn writer(&self) -> ChunkWriter<'_> {
        ChunkWriter::new(&self.channel, &self.ids, 1, &self.stats)
    }

    /// Every chunk committed so far, in channel order.
    fn drain_headers(&self) -> Vec<(ChunkHeader, Vec<u8>)> {
        let mut out = Vec::new();
        self.channel.drain_with(|bytes| {
            let view = decode_chunk(bytes).unwrap();
            out.push((view.header, view.data.to_vec()));
        });
        out
    }
}

fn hundred_byte_chunks() -> StreamConfig {
    StreamConfig::default()
        .with_max_chunks(16)
        .with_chunk_class(SizeClass::Custom(100))
}

fn text(len: usize) -> Vec<u8> {
    (0..len).map(|i| b'a' + (i % 26) as u8).collect()
}

#[test]
fn test_three_hundred_byte_string_makes_three_chunks() {
    let h = Harness::new(1 << 20);
    let mut src = MemorySource::new();
    let value = text(300);
    src.map_cstr(ADDR, &value, TrustDomain::Collector);

    let out = h.writer().copy_nul_terminated_string(
        &src,
        ADDR,
        TrustDomain::Collector,
        &hundred_byte_chunks(),
    );

    assert_eq!(out.status, CopyStatus::Success);
    assert_eq!(out.chunks, 3);
    assert_eq!(out.copied, 300);
    assert_eq!(out.failure, None);

    let chunks = h.drain_headers();
    let lengths: Vec<u16> = chunks.iter().map(|(c, _)| c.effective_length).collect();
    assert_eq!(lengths, vec![100, 100, 100]);

    assert_eq!(chunks[0].0.id(), out.head);
    assert_eq!(chunks[0].0.next(), chunks[1].0.id());
    assert_eq!(chunks[1].0.next(), chunks[2].0.id());
    assert!(chunks[2].0.next().is_none());

    let joined: Vec<u8> = chunks.iter().flat_map(|(_, d)| d.clone()).collect();
    assert_eq!(joined, value);
    assert!(chunks.iter().all(|(c, _)| c.id().shard() == 1));
}

#[test]
fn test_first_reserve_failure_commits_nothing() {
    let h = Harness::new(8 * 1024);
    let max = h.channel.max_record_len();
    for _ in 0..4 {
        h.channel.reserve(max).unwrap().commit();
    }

    let mut src = MemorySource::new();
    src.map(ADDR, text(500), TrustDomain::Monitored);

    let out = h
        .writer()
        .copy_bytes(&src, ADDR, 500, TrustDomain::Monitored, &hundred_byte_chunks());

    assert_eq!(out.status, CopyStatus::Failed);
    assert_eq!(out.head, ChunkId::NONE);
    assert_eq!(out.chunks, 0);
    assert_eq!(out.failure, Some(CopyFailure::Capacity));

    // Only the four filler records are on the channel.
    assert_eq!(h.channel.drain_with(|_| {}), 4);
    let stats = h.stats.snapshot();
    assert_eq!(stats.chunks_committed, 0);
    assert_eq!(stats.chunk_reserve_failures, 1);
    assert_eq!(stats.copies_failed, 1);
    // No id was burned on the refused reservation
    assert_eq!(h.ids.next_sequence(1), 1);
}

#[test]
fn test_five_thousand_byte_string_truncates_at_cap() {
    let h = Harness::new(1 << 20);
    let mut src = MemorySource::new();
    let value = text(5000);
    src.map_cstr(ADDR, &value, TrustDomain::Monitored);

    let out = h.writer().copy_nul_terminated_string(
        &src,
        ADDR,
        TrustDomain::Monitored,
        &hundred_byte_chunks(),
    );

    assert_eq!(out.status, CopyStatus::Truncated);
    assert_eq!(out.chunks, 16);
    assert_eq!(out.copied, 1600);
    assert_eq!(out.failure, None);

    let chunks = h.drain_headers();
    assert_eq!(chunks.len(), 16);
    assert!(chunks[15].0.next().is_none());
    for pair in chunks.windows(2) {
        assert_eq!(pair[0].0.next(), pair[1].0.id());
    }

    let joined: Vec<u8> = chunks.iter().flat_map(|(_, d)| d.clone()).collect();
    assert_eq!(joined, &value[..1600]);
    assert_eq!(h.stats.snapshot().copies_truncated, 1);
}

#[test]
fn test_string_filling_chunks_exactly_uses_lookahead() {
    let h = Harness::new(1 << 20);
    let mut src = MemorySource::new();
    src.map_cstr(ADDR, &text(200), TrustDomain::Collector);

    let out = h.writer().copy_nul_terminated_string(
        &src,
        ADDR,
        TrustDomain::Collector,
        &hundred_byte_chunks(),
    );

    // No third chunk holding only the terminator
    assert_eq!(out.status, CopyStatus::Success);
    assert_eq!(out.chunks, 2);
    assert_eq!(h.drain_headers().len(), 2);
}

#[test]
fn test_string_exactly_at_cap_is_not_truncated() {
    let h = Harness::new(1 << 20);
    let mut src = MemorySource::new();
    src.map_cstr(ADDR, &text(1600), TrustDomain::Collector);

    let out = h.writer().copy_nul_terminated_string(
        &src,
        ADDR,
        TrustDomain::Collector,
        &hundred_byte_chunks(),
    );
    assert_eq!(out.status, CopyStatus::Success);
    assert_eq!(out.chunks, 16);
    assert_eq!(out.copied, 1600);
}

#[test]
fn test_byte_copy_exact_boundary() {
    let h = Harness::new(1 << 20);
    let mut src = MemorySource::new();
    let value = text(200);
    // No terminator, and nothing mapped after the block.
    src.map(ADDR, value.clone(), TrustDomain::Monitored);

    let out = h
        .writer()
        .copy_bytes(&src, ADDR, 200, TrustDomain::Monitored, &hundred_byte_chunks());
    assert_eq!(out.status, CopyStatus::Success);
    assert_eq!(out.chunks, 2);
    assert_eq!(out.copied, 200);

    let mut store = ChunkStore::new(64);
    store.drain(&h.channel);
    assert_eq!(store.reassemble(out.head, 16).unwrap().bytes, value);
}

#[test]
fn test_byte_copy_truncates_without_reading_past_cap() {
    let h = Harness::new(1 << 20);
    let mut src = MemorySource::new();
    // Only the first 1600 bytes are readable; the cap stops before them.
    src.map(ADDR, text(1600), TrustDomain::Monitored);

    let out = h
        .writer()
        .copy_bytes(&src, ADDR, 5000, TrustDomain::Monitored, &hundred_byte_chunks());
    assert_eq!(out.status, CopyStatus::Truncated);
    assert_eq!(out.chunks, 16);
    assert_eq!(out.copied, 1600);
}

#[test]
fn test_default_byte_class_fits_small_blocks() {
    let h = Harness::new(1 << 20);
    let mut src = MemorySource::new();
    src.map(ADDR, text(300), TrustDomain::Monitored);

    let out = h
        .writer()
        .copy_bytes(&src, ADDR, 300, TrustDomain::Monitored, &StreamConfig::default());
    assert_eq!(out.status, CopyStatus::Success);
    assert_eq!(out.chunks, 1);

    let chunks = h.drain_headers();
    assert_eq!(chunks[0].0.size_class, SizeClass::Medium.code());
}

#[test]
fn test_source_fault_mid_chain() {
    let h = Harness::new(1 << 20);
    let mut src = MemorySource::new();
    // 250 bytes, no terminator, then unmapped memory
    src.map(ADDR, text(250), TrustDomain::Monitored);

    let out = h.writer().copy_nul_terminated_string(
        &src,
        ADDR,
        TrustDomain::Monitored,
        &hundred_byte_chunks(),
    );

    assert_eq!(out.status, CopyStatus::Failed);
    assert_eq!(out.head, ChunkId::NONE);
    assert_eq!(
        out.failure,
        Some(CopyFailure::Source(SourceFault::Unmapped { addr: ADDR + 250 }))
    );
    assert_eq!(out.chunks, 2);

    // What was committed is still a closed chain.
    let chunks = h.drain_headers();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].0.next(), chunks[1].0.id());
    assert!(chunks[1].0.next().is_none());
}

#[test]
fn test_wrong_trust_domain_fails() {
    let h = Harness::new(1 << 20);
    let mut src = MemorySource::new();
    src.map_cstr(ADDR, b"/usr/bin/python3", TrustDomain::Monitored);

    let out = h.writer().copy_nul_terminated_string(
        &src,
        ADDR,
        TrustDomain::Collector,
        &hundred_byte_chunks(),
    );
    assert_eq!(out.status, CopyStatus::Failed);
    assert_eq!(
        out.failure,
        Some(CopyFailure::Source(SourceFault::WrongDomain { addr: ADDR }))
    );
    assert_eq!(h.channel.used_bytes(), 0);
}

#[test]
fn test_invalid_requests_reserve_nothing() {
    let h = Harness::new(1 << 20);
    let mut src = MemorySource::new();
    src.map(ADDR, text(64), TrustDomain::Monitored);
    let cfg = hundred_byte_chunks();

    let w = h.writer();
    let cases = [
        w.copy_bytes(&src, 0, 64, TrustDomain::Monitored, &cfg),
        w.copy_bytes(&src, ADDR, 0, TrustDomain::Monitored, &cfg),
        w.copy_nul_terminated_string(&src, 0, TrustDomain::Monitored, &cfg),
        w.copy_bytes(
            &src,
            ADDR,
            64,
            TrustDomain::Monitored,
            &cfg.with_byte_chunk(SizeClass::Custom(0)),
        ),
        w.copy_bytes(
            &src,
            ADDR,
            64,
            TrustDomain::Monitored,
            &cfg.with_max_chunks(0),
        ),
    ];

    for out in cases {
        assert_eq!(out.status, CopyStatus::Failed);
        assert_eq!(out.failure, Some(CopyFailure::InvalidRequest));
        assert_eq!(out.head, ChunkId::NONE);
    }
    assert_eq!(h.channel.used_bytes(), 0);
    assert_eq!(h.ids.next_sequence(1), 1);
}

#[test]
fn test_empty_string_has_no_chain() {
    let h = Harness::new(1 << 20);
    let mut src = MemorySource::new();
    src.map_cstr(ADDR, b"", TrustDomain::Collector);

    let out = h.writer().copy_nul_terminated_string(
        &src,
        ADDR,
        TrustDomain::Collector,
        &hundred_byte_chunks(),
    );
    assert_eq!(out.status, CopyStatus::Success);
    assert_eq!(out.head, ChunkId::NONE);
    assert_eq!(out.chunks, 0);
    assert_eq!(h.channel.used_bytes(), 0);
}

#[test]
fn test_channel_full_mid_chain_truncates_cleanly() {
    // Room for seven 1 KiB chunks.
    let h = Harness::new(8 * 1024);
    let mut src = MemorySource::new();
    let value = text(20_000);
    src.map(ADDR, value.clone(), TrustDomain::Monitored);

    let cfg = StreamConfig::default()
        .with_max_chunks(32)
        .with_byte_chunk(SizeClass::Large);
    let out = h
        .writer()
        .copy_bytes(&src, ADDR, value.len(), TrustDomain::Monitored, &cfg);

    println!("{:?}", out);
    assert_eq!(out.status, CopyStatus::Truncated);
    assert_eq!(out.failure, Some(CopyFailure::Capacity));
    assert_eq!(out.chunks, 7);
    assert!(!out.head.is_none());

    // Every committed link names a chunk committed after it.
    let chunks = h.drain_headers();
    assert_eq!(chunks.len(), 7);
    let ids: HashSet<ChunkId> = chunks.iter().map(|(c, _)| c.id()).collect();
    for (c, _) in &chunks {
        assert!(c.next().is_none() || ids.contains(&c.next()));
    }
    let joined: Vec<u8> = chunks.iter().flat_map(|(_, d)| d.clone()).collect();
    assert_eq!(joined, &value[..out.copied]);
}

#[test]
fn test_open_reservation_from_other_producer_hides_chain() {
    let h = Harness::new(1 << 20);
    let mut src = MemorySource::new();
    src.map_cstr(ADDR, &text(450), TrustDomain::Collector);

    let blocker = h.channel.reserve(32).unwrap();
    let out = h.writer().copy_nul_terminated_string(
        &src,
        ADDR,
        TrustDomain::Collector,
        &hundred_byte_chunks(),
    );
    assert_eq!(out.chunks, 5);

    // Nothing is observable while an earlier reservation is open.
    assert!(h.channel.receive().is_none());
    blocker.discard();

    let chunks = h.drain_headers();
    assert_eq!(chunks.len(), 5);
    assert!(chunks[4].0.next().is_none());
}

#[test]
fn test_chain_integrity_random_inputs() {
    let h = Harness::new(1 << 20);
    let mut rng = fastrand::Rng::with_seed(0x5eed);
    let mut store = ChunkStore::new(4096);

    for round in 0..300 {
        let len = rng.usize(1..6000);
        let class = match rng.u8(0..4) {
            0 => SizeClass::Small,
            1 => SizeClass::Medium,
            2 => SizeClass::Large,
            _ => SizeClass::Custom(rng.u16(1..300)),
        };
        let cfg = StreamConfig::default()
            .with_max_chunks(32)
            .with_chunk_class(class);

        let value: Vec<u8> = (0..len).map(|_| rng.u8(1..=255)).collect();
        let mut src = MemorySource::new();
        src.map_cstr(ADDR, &value, TrustDomain::Monitored);

        let as_string = rng.bool();
        let out = if as_string {
            h.writer()
                .copy_nul_terminated_string(&src, ADDR, TrustDomain::Monitored, &cfg)
        } else {
            h.writer()
                .copy_bytes(&src, ADDR, len, TrustDomain::Monitored, &cfg)
        };

        let fits = len <= 32 * class.payload_capacity();
        let expected = if fits {
            CopyStatus::Success
        } else {
            CopyStatus::Truncated
        };
        assert_eq!(out.status, expected, "round {round}: {len} bytes in {class:?}");
        assert!(out.chunks <= 32);

        store.drain(&h.channel);
        let chain = store.reassemble(out.head, 32).unwrap();
        assert_eq!(chain.chunks, out.chunks);
        assert_eq!(chain.bytes, &value[..out.copied], "round {round}");
        if fits {
            assert_eq!(out.copied, len);
        }
    }
    assert!(store.is_empty());
}

#[test]
fn test_string_at_top_of_address_space() {
    let h = Harness::new(1 << 20);
    let cfg = StreamConfig::default()
        .with_max_chunks(4)
        .with_chunk_class(SizeClass::Custom(16));
    // One full chunk of text that runs into the end of the address space.
    let top = u64::MAX - 15;
    let mut src = MemorySource::new();
    src.map(top, vec![b'x'; 16], TrustDomain::Monitored);

    let out = h
        .writer()
        .copy_nul_terminated_string(&src, top, TrustDomain::Monitored, &cfg);
    assert_eq!(out.status, CopyStatus::Failed);
    assert_eq!(out.head, ChunkId::NONE);
    assert!(matches!(
        out.failure,
        Some(CopyFailure::Source(SourceFault::Unmapped { .. }))
    ));

    let chunks = h.drain_headers();
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].0.next().is_none());
    assert_eq!(chunks[0].1, vec![b'x'; 16]);
}

#[test]
fn test_chain_integrity_shared_channel() {
    const PRODUCERS: usize = 4;
    const COPIES: usize = 300;

    let h = Harness::new(64 * 1024);
    let (tx, rx) = std::sync::mpsc::channel::<(ChunkId, Vec<u8>)>();
    let running = AtomicUsize::new(PRODUCERS);

    std::thread::scope(|s| {
        for shard in 0..PRODUCERS {
            let tx = tx.clone();
            let (h, running) = (&h, &running);
            s.spawn(move || {
                let mut rng = fastrand::Rng::with_seed(0xc0ff_ee00 + shard as u64);
                let pattern: Vec<u8> = (0..3000).map(|_| rng.u8(..)).collect();
                let mut src = MemorySource::new();
                src.map(ADDR, pattern.clone(), TrustDomain::Monitored);
                let writer = ChunkWriter::new(&h.channel, &h.ids, shard as u16, &h.stats);

                for _ in 0..COPIES {
                    let off = rng.usize(0..2999);
                    let len = rng.usize(1..=3000 - off);
                    let cfg = StreamConfig::default()
                        .with_max_chunks(16)
                        .with_chunk_class(SizeClass::Custom(rng.u16(1..300)));
                    let out = writer.copy_bytes(&src, ADDR + off as u64, len, TrustDomain::Monitored, &cfg);
                    match out.status {
                        CopyStatus::Success | CopyStatus::Truncated if !out.head.is_none() => {
                            let expected = pattern[off..off + out.copied].to_vec();
                            tx.send((out.head, expected)).unwrap();
                        }
                        // The channel was full before the first chunk.
                        _ => assert!(out.head.is_none()),
                    }
                }
                running.fetch_sub(1, Ordering::Release);
            });
        }
        drop(tx);

        let mut store = ChunkStore::new(4096);
        let mut pending: Vec<(ChunkId, Vec<u8>)> = Vec::new();
        let mut verified = 0usize;
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(30);

        loop {
            // Producers send before they count down, so nothing is sent after this reads 0.
            let done = running.load(Ordering::Acquire) == 0;
            assert!(std::time::Instant::now() < deadline, "{} chains never completed", pending.len());
            pending.extend(rx.try_iter());
            store.drain(&h.channel);

            let mut i = 0;
            while i < pending.len() {
                let (head, expected) = &pending[i];
                match store.reassemble(*head, 16) {
                    Ok(chain) => {
                        assert_eq!(&chain.bytes, expected, "chain {head:?}");
                        pending.swap_remove(i);
                        verified += 1;
                    }
                    Err(ChainError::Missing(_)) => i += 1,
                    Err(e) => panic!("chain {head:?}: {e}"),
                }
            }
            if done && pending.is_empty() {
                break;
            }
            std::thread::yield_now();
        }

        assert!(verified > 0);
        assert_eq!(store.rejected(), 0);
    });
}
