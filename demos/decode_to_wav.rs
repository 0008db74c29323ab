//! Decode-to-WAV example.
//!
//! Encodes a test signal with a codec from the registry, "transmits" the
//! packets, and decodes them on the far side through a band-pass filter and
//! gain stage into a WAV file.
//!
//! Run with: cargo run --example decode_to_wav [CODEC]

use std::cell::RefCell;
use std::rc::Rc;

use audio_pipe::codec::CodecRegistry;
use audio_pipe::dsp::{Amplifier, Biquad};
use audio_pipe::{AudioProcessor, AudioSource, CodecOptions, MockSource, WavFileSink};

const SAMPLE_RATE: u32 = 8000;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let codec = std::env::args().nth(1).unwrap_or_else(|| "S16".to_string());
    let registry = CodecRegistry::with_builtin();

    let mut options = CodecOptions::new();
    options.set("FRAME_SIZE", "160");
    let encoder = registry.create_encoder(&codec, &options)?;
    let decoder = registry.create_decoder(&codec, &CodecOptions::new())?;
    println!("Using codec {}", encoder.name());

    // Sending side
    let mic = MockSource::new(SAMPLE_RATE);
    mic.register_sink(encoder.clone());
    let packets = Rc::new(RefCell::new(Vec::new()));
    let outbox = packets.clone();
    encoder
        .encoded()
        .connect(move |bytes| outbox.borrow_mut().push(bytes.clone()));

    mic.generate_sine(1000.0, 500);
    mic.generate_noise(500, 0.3);
    mic.flush();
    mic.pump();
    println!("Sent {} packets", packets.borrow().len());

    // Receiving side: decoder → band-pass → gain → recorder
    let band_pass = AudioProcessor::new(Biquad::parse("HpBq2/300xLpBq2/3400", SAMPLE_RATE)?);
    let gain = AudioProcessor::new(Amplifier::new(-3.0));
    band_pass.register_managed_sink(gain.clone());
    decoder.set_post_processing(band_pass, gain);

    let recorder = WavFileSink::new("decode_to_wav.wav", SAMPLE_RATE);
    decoder.register_sink(recorder.clone());

    for packet in packets.borrow().iter() {
        decoder.write_encoded_samples(packet);
    }
    decoder.flush_encoded_samples();
    encoder.all_encoded_samples_flushed();
    println!("Flushes completed at the sender: {}", mic.flushes_completed());

    recorder.close()?;
    println!("Wrote {} samples to {}", recorder.samples_written(), recorder.path().display());
    Ok(())
}
