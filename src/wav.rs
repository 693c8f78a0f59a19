use std::io::{Read, Seek, Write};

use anyhow::{Context, Result, bail};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

/// Load 16-bit PCM samples from a WAV reader.
///
/// Format requirements:
/// - Mono (1 channel)
/// - 16-bit integer samples
/// - `expected_rate` Hz, the rate the stage is configured to consume
pub fn read_pcm<R>(reader: R, expected_rate: u64) -> Result<(Vec<i16>, WavSpec)>
where
    R: Read,
{
    let reader = WavReader::new(reader).context("failed to read WAV data from reader")?;
    let spec = reader.spec();

    if spec.channels != 1 {
        bail!(
            "expected mono WAV (1 channel), got {} channels",
            spec.channels
        );
    }

    if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
        bail!(
            "expected 16-bit integer PCM, got {} bits ({:?})",
            spec.bits_per_sample,
            spec.sample_format
        );
    }

    if u64::from(spec.sample_rate) != expected_rate {
        bail!(
            "expected {} Hz sample rate, got {} Hz",
            expected_rate,
            spec.sample_rate
        );
    }

    let samples = reader
        .into_samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("failed to decode WAV samples")?;

    Ok((samples, spec))
}

/// Write mono 16-bit PCM samples as a WAV stream.
pub fn write_pcm<W>(writer: W, sample_rate: u32, samples: &[i16]) -> Result<()>
where
    W: Write + Seek,
{
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut wav = WavWriter::new(writer, spec).context("failed to start WAV output")?;
    for &sample in samples {
        wav.write_sample(sample)?;
    }
    wav.finalize().context("failed to finalize WAV output")?;
    Ok(())
}
