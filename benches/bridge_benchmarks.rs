//! Codec benchmarks for the session bridge.
//!
//! Run with: cargo bench
//! Or for specific benchmarks: cargo bench -- <filter>

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cine_bridge::core::codec::{
    UpstreamCodec, decode_client_frame, decode_server_frame, encode_client_event,
};
use cine_bridge::{
    ClientMessage, Event, EventKind, RealtimeVoice, Role, ToolCallResult, ToolCallStatus,
    UpstreamMessage,
};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::time::Duration;

/// Client frames: the bridge decodes one per inbound WebSocket message
fn bench_client_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("client_decode");
    group.measurement_time(Duration::from_secs(5));

    let small_text = r#"{"type":"text","text":"おすすめの映画を教えて"}"#.to_string();
    let audio_append = format!(
        r#"{{"type":"input_audio_buffer.append","audio":"{}"}}"#,
        STANDARD.encode(vec![0u8; 4800])
    );
    let passthrough = r#"{"type":"session.update","session":{"voice":"sage","modalities":["text"]}}"#.to_string();
    let plain_text = "plain text without any JSON framing".to_string();

    for (name, frame) in [
        ("text", &small_text),
        ("audio_append", &audio_append),
        ("passthrough", &passthrough),
        ("plain_text", &plain_text),
    ] {
        group.throughput(Throughput::Bytes(frame.len() as u64));
        group.bench_with_input(BenchmarkId::new(name, frame.len()), frame, |b, frame| {
            b.iter(|| {
                let _ = decode_client_frame(black_box(frame));
            });
        });
    }

    group.finish();
}

/// Client frames: one encode per outbound event
fn bench_client_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("client_encode");

    let text_done = Event::new(
        42,
        EventKind::UpstreamMessage(UpstreamMessage::TextDone {
            response_id: Some("resp_1".to_string()),
            item_id: Some("item_1".to_string()),
            text: "今週のトレンド映画はこちらです。".repeat(8),
        }),
    );
    let audio_delta = Event::new(
        43,
        EventKind::UpstreamMessage(UpstreamMessage::AudioDelta {
            response_id: Some("resp_1".to_string()),
            item_id: Some("item_2".to_string()),
            delta: STANDARD.encode(vec![0u8; 9600]),
        }),
    );

    group.bench_function("text_response", |b| {
        b.iter(|| encode_client_event(black_box(&text_done)))
    });
    group.bench_function("audio_delta", |b| {
        b.iter(|| encode_client_event(black_box(&audio_delta)))
    });

    group.finish();
}

/// Upstream frames: decode of the hot server events
fn bench_upstream_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("upstream_decode");
    group.measurement_time(Duration::from_secs(5));

    let audio_delta = format!(
        r#"{{"type":"response.audio.delta","event_id":"evt_1","response_id":"resp_1","item_id":"item_1","output_index":0,"content_index":0,"delta":"{}"}}"#,
        STANDARD.encode(vec![0u8; 9600])
    );
    let arguments_done = r#"{"type":"response.function_call_arguments.done","event_id":"evt_2","response_id":"resp_1","item_id":"item_2","output_index":0,"call_id":"call_1","name":"tmdb_movie_search","arguments":"{\"query\":\"Perfect Days\"}"}"#.to_string();
    let rate_limits = r#"{"type":"rate_limits.updated","event_id":"evt_3","rate_limits":[{"name":"requests","limit":1000,"remaining":999,"reset_seconds":60}]}"#.to_string();

    for (name, frame) in [
        ("audio_delta", &audio_delta),
        ("function_call_arguments", &arguments_done),
        ("ignored", &rate_limits),
    ] {
        group.throughput(Throughput::Bytes(frame.len() as u64));
        group.bench_with_input(BenchmarkId::new(name, frame.len()), frame, |b, frame| {
            b.iter(|| {
                let _ = decode_server_frame(black_box(frame));
            });
        });
    }

    group.finish();
}

/// Upstream frames: encode of client turns and tool results
fn bench_upstream_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("upstream_encode");

    let codec = UpstreamCodec::new(false, RealtimeVoice::Sage);
    let user_text = Event::new(
        7,
        EventKind::ClientMessage(ClientMessage::Text {
            role: Role::User,
            text: "宮崎駿の代表作は?".to_string(),
        }),
    );
    let tool_result = Event::new(
        8,
        EventKind::ToolCallResult(ToolCallResult {
            call_id: "call_1".to_string(),
            status: ToolCallStatus::Completed,
            output: "title: 千と千尋の神隠し\nrelease_date: 2001-07-20\n".repeat(5),
        }),
    );

    group.bench_function("user_text", |b| {
        b.iter(|| codec.encode(black_box(&user_text)))
    });
    group.bench_function("tool_result", |b| {
        b.iter(|| codec.encode(black_box(&tool_result)))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_client_decode,
    bench_client_encode,
    bench_upstream_decode,
    bench_upstream_encode,
);
criterion_main!(benches);
