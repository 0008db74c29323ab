//! Splitter fan-out example.
//!
//! Feeds one generated stream to a WAV recorder, an async consumer behind a
//! small channel and a level meter, all through one splitter. The channel
//! is kept deliberately small so the consumer paces the whole pipeline.
//!
//! Run with: cargo run --example splitter_fanout

use std::cell::Cell;
use std::rc::Rc;

use audio_pipe::{
    AudioChunk, AudioSource, AudioSplitter, AudioValve, CallbackSink, ChannelSink, MockSource,
    Reactor, WavFileSink,
};
use tokio::sync::mpsc;

const SAMPLE_RATE: u32 = 8000;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let reactor = Reactor::new();
    let mic = MockSource::new(SAMPLE_RATE);
    let valve = AudioValve::new(false);
    let splitter = AudioSplitter::new(&reactor);
    mic.register_sink(valve.clone());
    valve.register_sink(splitter.clone());

    // Recorder
    let recorder = WavFileSink::new("splitter_fanout.wav", SAMPLE_RATE);
    splitter.add_sink(recorder.clone(), false);

    // Async consumer, at most 4 chunks in flight
    let (tx, mut rx) = mpsc::channel::<AudioChunk>(4);
    let channel = ChannelSink::new(tx, SAMPLE_RATE);
    splitter.add_sink(channel.clone(), false);

    // Peak meter
    let peak = Rc::new(Cell::new(0.0f32));
    let meter = CallbackSink::new();
    let level = peak.clone();
    meter.set_writer(move |samples| {
        let block_peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        level.set(level.get().max(block_peak));
        samples.len()
    });
    let weak = Rc::downgrade(&meter);
    meter.flush_requested().connect(move |_| {
        if let Some(meter) = weak.upgrade() {
            meter.all_samples_flushed();
        }
    });
    splitter.add_sink(meter.clone(), false);

    println!("Generating 2 seconds of audio, muting the second half...");
    for tick in 0..100 {
        if tick == 50 {
            valve.set_open(false);
        }
        mic.generate_sine(440.0, 20);
        mic.pump();

        // One event-loop tick: let the consumer run, then deliver resumes
        while let Ok(chunk) = rx.try_recv() {
            if tick % 10 == 0 {
                println!(
                    "[{:>4}ms] chunk of {} samples",
                    chunk.timestamp.as_millis(),
                    chunk.len()
                );
            }
        }
        channel.poll();
        reactor.run_once();
    }

    mic.flush();
    while rx.try_recv().is_ok() {}
    channel.poll();
    reactor.run_until_idle();
    recorder.close()?;

    println!(
        "Recorded {} samples, peak level {:.2}",
        recorder.samples_written(),
        peak.get()
    );
    Ok(())
}
