//! Generated audio cue pushed by the stub source.
//!
//! A short 16 kHz mono 16-bit PCM sine tone in a RIFF/WAVE container.

use bytes::{BufMut, Bytes, BytesMut};

const SAMPLE_RATE: u32 = 16_000;
const BITS_PER_SAMPLE: u16 = 16;
const CHANNELS: u16 = 1;
const WAV_HEADER_LEN: usize = 44;

/// Build a sine tone WAV of `duration_ms` at `frequency_hz`.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
pub fn tone_wav(frequency_hz: f64, duration_ms: u32) -> Bytes {
    let samples = (u64::from(SAMPLE_RATE) * u64::from(duration_ms) / 1000) as u32;
    let block_align = CHANNELS * BITS_PER_SAMPLE / 8;
    let data_len = samples * u32::from(block_align);

    let mut buf = BytesMut::with_capacity(WAV_HEADER_LEN + data_len as usize);

    // RIFF header
    buf.put_slice(b"RIFF");
    buf.put_u32_le(36 + data_len);
    buf.put_slice(b"WAVE");

    // fmt chunk (PCM)
    buf.put_slice(b"fmt ");
    buf.put_u32_le(16);
    buf.put_u16_le(1);
    buf.put_u16_le(CHANNELS);
    buf.put_u32_le(SAMPLE_RATE);
    buf.put_u32_le(SAMPLE_RATE * u32::from(block_align));
    buf.put_u16_le(block_align);
    buf.put_u16_le(BITS_PER_SAMPLE);

    // data chunk
    buf.put_slice(b"data");
    buf.put_u32_le(data_len);

    let amplitude = f64::from(i16::MAX) * 0.3;
    for n in 0..samples {
        let t = f64::from(n) / f64::from(SAMPLE_RATE);
        let sample = (amplitude * (2.0 * std::f64::consts::PI * frequency_hz * t).sin()) as i16;
        buf.put_i16_le(sample);
    }

    buf.freeze()
}

/// The default notification cue: 880 Hz for 200 ms.
#[must_use]
pub fn default_cue() -> Bytes {
    tone_wav(880.0, 200)
}
