// Wire layout conformance. The consumer may be written in another language,
// so sizes and field offsets of everything that crosses a channel are fixed.
// Run with: cargo test --test layout -- --nocapture

use dmxp_chunkstream::Channel::Ring::layout::{record_span, ChannelHeader};
use dmxp_chunkstream::Signal::{SignalHeader, TaskExecWire};
use dmxp_chunkstream::Stream::{ChunkHeader, StringFieldWire};
use memoffset::offset_of;
use std::mem::{align_of, size_of};

#[test]
fn test_chunk_header_layout() {
    let size = size_of::<ChunkHeader>();
    println!(
        "ChunkHeader => size: {size}, align: {}, offsets: [version:{}, size_class:{}, effective_length:{}, reserved:{}, chunk_id:{}, next_chunk_id:{}]",
        align_of::<ChunkHeader>(),
        offset_of!(ChunkHeader, version),
        offset_of!(ChunkHeader, size_class),
        offset_of!(ChunkHeader, effective_length),
        offset_of!(ChunkHeader, reserved),
        offset_of!(ChunkHeader, chunk_id),
        offset_of!(ChunkHeader, next_chunk_id),
    );

    assert_eq!(size, 24);
    assert_eq!(offset_of!(ChunkHeader, version), 0);
    assert_eq!(offset_of!(ChunkHeader, size_class), 1);
    assert_eq!(offset_of!(ChunkHeader, effective_length), 2);
    assert_eq!(offset_of!(ChunkHeader, reserved), 4);
    assert_eq!(offset_of!(ChunkHeader, chunk_id), 8);
    assert_eq!(offset_of!(ChunkHeader, next_chunk_id), 16);
}

#[test]
fn test_signal_header_layout() {
    assert_eq!(size_of::<SignalHeader>(), 16);
    assert_eq!(offset_of!(SignalHeader, version), 0);
    assert_eq!(offset_of!(SignalHeader, signal_type), 1);
    assert_eq!(offset_of!(SignalHeader, shard_id), 2);
    assert_eq!(offset_of!(SignalHeader, reserved), 4);
    assert_eq!(offset_of!(SignalHeader, timestamp_ns), 8);
}

#[test]
fn test_string_field_layout() {
    assert_eq!(size_of::<StringFieldWire>(), 136);
    assert_eq!(offset_of!(StringFieldWire, tag), 0);
    assert_eq!(offset_of!(StringFieldWire, truncated), 1);
    assert_eq!(offset_of!(StringFieldWire, inline_len), 2);
    assert_eq!(offset_of!(StringFieldWire, data), 8);
}

#[test]
fn test_task_exec_layout() {
    let size = size_of::<TaskExecWire>();
    println!(
        "TaskExecWire => size: {size}, align: {}, filename@{}, interp@{}, args_head@{}, cgroup_id@{}",
        align_of::<TaskExecWire>(),
        offset_of!(TaskExecWire, filename),
        offset_of!(TaskExecWire, interp),
        offset_of!(TaskExecWire, args_head),
        offset_of!(TaskExecWire, cgroup_id),
    );

    assert_eq!(size, 368);
    assert_eq!(align_of::<TaskExecWire>(), align_of::<u64>());
    assert_eq!(offset_of!(TaskExecWire, creds), 0);
    assert_eq!(offset_of!(TaskExecWire, pid), 16);
    assert_eq!(offset_of!(TaskExecWire, parent), 32);
    assert_eq!(offset_of!(TaskExecWire, login_uid), 48);
    assert_eq!(offset_of!(TaskExecWire, session_id), 52);
    assert_eq!(offset_of!(TaskExecWire, start_time), 56);
    assert_eq!(offset_of!(TaskExecWire, filename), 64);
    assert_eq!(offset_of!(TaskExecWire, interp), 200);
    assert_eq!(offset_of!(TaskExecWire, args_head), 336);
    assert_eq!(offset_of!(TaskExecWire, env_head), 344);
    assert_eq!(offset_of!(TaskExecWire, args_status), 352);
    assert_eq!(offset_of!(TaskExecWire, env_status), 353);
    assert_eq!(offset_of!(TaskExecWire, cgroup_id), 360);
}

#[test]
fn test_channel_header_layout() {
    assert_eq!(align_of::<ChannelHeader>(), 128);
    assert_eq!(offset_of!(ChannelHeader, magic), 0);
    assert_eq!(offset_of!(ChannelHeader, version), 8);
    assert_eq!(offset_of!(ChannelHeader, flags), 12);
    assert_eq!(offset_of!(ChannelHeader, capacity), 16);
    assert_eq!(offset_of!(ChannelHeader, data_offset), 24);
    assert_eq!(offset_of!(ChannelHeader, signal), 32);
    assert_eq!(offset_of!(ChannelHeader, waiters), 36);
    // Cursors sit on their own cache lines
    assert_eq!(offset_of!(ChannelHeader, producer_pos) % 64, 0);
    assert_eq!(offset_of!(ChannelHeader, consumer_pos) % 64, 0);
    assert_ne!(
        offset_of!(ChannelHeader, producer_pos) / 64,
        offset_of!(ChannelHeader, consumer_pos) / 64
    );
}

#[test]
fn test_record_span_alignment() {
    assert_eq!(record_span(1), 16);
    assert_eq!(record_span(8), 16);
    assert_eq!(record_span(9), 24);
    assert_eq!(record_span(124), 136);
    assert_eq!(record_span(1024), 1032);
}
