use std::fs::File;
use std::io::{BufReader, BufWriter};

use dsd_stage::backends::decimator::{DecimateMode, Decimator};
use dsd_stage::driver::run_stream;
use dsd_stage::wav::{read_pcm, write_pcm};
use dsd_stage::{DecoderStage, StageOpts};

/// A 48 kHz file goes through the threaded stage and comes out as an 8 kHz file.
#[test]
fn wav_file_is_decimated_end_to_end() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input_path = dir.path().join("in.wav");
    let output_path = dir.path().join("out.wav");

    let opts = StageOpts::default();
    let input: Vec<i16> = (0..48_000).map(|i| ((i % 12) * 100) as i16).collect();
    write_pcm(
        BufWriter::new(File::create(&input_path)?),
        opts.input_sample_rate() as u32,
        &input,
    )?;

    let (samples, _) = read_pcm(
        BufReader::new(File::open(&input_path)?),
        opts.input_sample_rate(),
    )?;
    assert_eq!(samples, input);

    let output_rate = opts.output_sample_rate;
    let mut stage = DecoderStage::new(opts, Decimator::new(6, DecimateMode::Average))?;
    let report = run_stream(&mut stage, &samples, 960)?;
    assert_eq!(report.leftover, 0);

    write_pcm(
        BufWriter::new(File::create(&output_path)?),
        output_rate,
        &report.output,
    )?;
    let (decoded, spec) = read_pcm(BufReader::new(File::open(&output_path)?), 8_000)?;

    assert_eq!(spec.sample_rate, 8_000);
    assert_eq!(decoded.len(), 8_000);
    // Each block of six alternates between the two halves of the 12-sample pattern.
    assert_eq!(&decoded[..4], &[250, 850, 250, 850]);
    Ok(())
}

#[test]
fn stage_options_load_from_a_config_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("stage.json");
    std::fs::write(
        &path,
        r#"{ "decoder":{ "frame_family": "dmr", "verbosity": 2 } }"#,
    )?;

    let opts = StageOpts::from_json_reader(BufReader::new(File::open(&path)?))?;
    assert_eq!(opts.decoder.frame_family, dsd_stage::FrameFamily::Dmr);
    assert_eq!(opts.decoder.verbosity, 2);
    assert_eq!(opts.rate_ratio, 6);
    Ok(())
}
