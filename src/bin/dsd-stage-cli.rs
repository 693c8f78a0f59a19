use std::fs::File;
use std::io::{BufReader, BufWriter};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use dsd_stage::backends::decimator::{DecimateMode, Decimator};
use dsd_stage::driver::run_stream;
use dsd_stage::wav::{read_pcm, write_pcm};
use dsd_stage::{DecoderStage, FrameFamily, Modulation, StageOpts};

fn main() {
    let params = Params::parse();
    dsd_stage::init_logging(params.verbosity.unwrap_or(1));

    if let Err(err) = run(params) {
        error!(error = ?err, "dsd-stage-cli failed");
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run(params: Params) -> Result<()> {
    let opts = load_opts(&params)?;

    let input = File::open(&params.input_path)
        .with_context(|| format!("failed to open input '{}'", params.input_path))?;
    let (samples, _) = read_pcm(BufReader::new(input), opts.input_sample_rate())
        .with_context(|| format!("failed to load '{}'", params.input_path))?;

    let mode = if params.pick {
        DecimateMode::Pick
    } else {
        DecimateMode::Average
    };
    let decoder = Decimator::new(opts.rate_ratio, mode);
    let output_rate = opts.output_sample_rate;

    let mut stage =
        DecoderStage::new(opts, decoder).context("failed to start the decoder stage")?;
    let report = run_stream(&mut stage, &samples, params.block)?;
    let outcome = stage.close();

    info!(
        consumed = report.consumed,
        produced = report.output.len(),
        leftover = report.leftover,
        ?outcome,
        "stream finished"
    );

    let output = File::create(&params.output_path)
        .with_context(|| format!("failed to create output '{}'", params.output_path))?;
    write_pcm(BufWriter::new(output), output_rate, &report.output)?;

    if params.stats {
        let stats = serde_json::to_string_pretty(&stage.stats())?;
        eprintln!("{stats}");
    }

    Ok(())
}

fn load_opts(params: &Params) -> Result<StageOpts> {
    let mut opts = match &params.config_path {
        Some(path) => {
            let file =
                File::open(path).with_context(|| format!("failed to open config '{path}'"))?;
            StageOpts::from_json_reader(BufReader::new(file))
                .with_context(|| format!("invalid config '{path}'"))?
        }
        None => StageOpts::default(),
    };

    if let Some(family) = params.frame_family {
        opts.decoder.frame_family = family;
    }
    if let Some(modulation) = params.modulation {
        opts.decoder.modulation = modulation;
    }
    if let Some(verbosity) = params.verbosity {
        opts.decoder.verbosity = verbosity;
    }
    opts.validate()?;
    Ok(opts)
}

#[derive(Parser, Debug)]
#[command(name = "dsd-stage-cli")]
#[command(about = "Run a mono PCM WAV file through a threaded decoder stage")]
struct Params {
    /// Input WAV (mono, 16-bit, at the configured input rate; 48 kHz by default).
    #[arg(short = 'i', long = "input")]
    input_path: String,

    /// Output WAV, written at the configured output rate.
    #[arg(short = 'o', long = "output")]
    output_path: String,

    /// JSON file with stage options. Missing fields keep their defaults.
    #[arg(short = 'c', long = "config")]
    config_path: Option<String>,

    #[arg(short = 'f', long = "frame-family", value_enum)]
    frame_family: Option<FrameFamily>,

    #[arg(short = 'm', long = "modulation", value_enum)]
    modulation: Option<Modulation>,

    /// Decoder verbosity. Also sets log detail unless `DSD_STAGE_LOG` is set.
    #[arg(short = 'v', long = "verbosity")]
    verbosity: Option<u8>,

    /// Output samples requested per call.
    #[arg(short = 'b', long = "block", default_value_t = 960)]
    block: usize,

    /// Keep the first sample of each block instead of averaging.
    #[arg(long = "pick", default_value_t = false)]
    pick: bool,

    /// Print stage counters as JSON on stderr.
    #[arg(long = "stats", default_value_t = false)]
    stats: bool,
}
