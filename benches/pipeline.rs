use criterion::{black_box, criterion_group, criterion_main, Criterion};

use room_audio_streamer::{
    audio::{AudioChunk, CaptureProcessor, PlaybackRenderer},
    codec::decoder::decode_chunk,
    config::SessionConfig,
    session::SessionContext,
};

const BLOCK: usize = 1024;

fn capture_block(c: &mut Criterion) {
    let ctx = SessionContext::shared(SessionConfig::default());
    let mut processor = CaptureProcessor::new(ctx.clone());
    let block: Vec<f32> = (0..BLOCK).map(|i| (i as f32 / 64.0).sin() * 0.5).collect();

    c.bench_function("capture_f32_block", |b| {
        b.iter(|| {
            processor.process(black_box(&block[..]));
            ctx.send_queue().clear();
        })
    });
}

fn playback_fill(c: &mut Criterion) {
    let ctx = SessionContext::shared(SessionConfig::default());
    let mut renderer = PlaybackRenderer::new(ctx.clone());
    let chunk = AudioChunk::new(vec![1000; 1500]);
    let mut out = vec![0i16; BLOCK];

    c.bench_function("playback_fill_with_leftover", |b| {
        b.iter(|| {
            if ctx.playback_queue().is_empty() {
                ctx.playback_queue().push(chunk.clone());
            }
            renderer.fill(black_box(&mut out))
        })
    });
}

fn decode_inbound(c: &mut Criterion) {
    let ctx = SessionContext::shared(SessionConfig::default());
    let mut processor = CaptureProcessor::new(ctx.clone());
    processor.process(&vec![0.25f32; BLOCK][..]);
    let encoded = ctx.send_queue().try_pop().map(|c| c.data).unwrap_or_default();

    c.bench_function("decode_1024_samples", |b| {
        b.iter(|| decode_chunk(black_box(&encoded)))
    });
}

criterion_group!(benches, capture_block, playback_fill, decode_inbound);
criterion_main!(benches);
