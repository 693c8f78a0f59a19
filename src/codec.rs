use thiserror::Error;

use crate::opts::DecoderOpts;

/// A recoverable failure inside a decoder call.
///
/// The worker answers every `DecodeError` by discarding the samples produced during that call and
/// calling [`FrameDecoder::reset`]. These errors never reach the scheduler as errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Decoder state no longer matches the input (lost sync, impossible frame).
    #[error("corrupt decoder state: {0}")]
    Corrupt(String),

    /// The input carries something this decoder does not handle.
    #[error("unsupported input: {0}")]
    Unsupported(String),
}

/// Pluggable decoder driven by the worker thread of a [`crate::DecoderStage`].
///
/// The value itself is the persistent decode context (symbol timing, partial frames). It is
/// moved into the worker at construction and only ever touched from that thread.
///
/// Contract:
/// - `decode` must return once it has processed `input`; the worker hands over at most
///   `StageOpts::decode_chunk` samples per call and relies on this to stay responsive to shutdown.
/// - decoded samples are appended to `out`; anything appended before an `Err` is discarded.
pub trait FrameDecoder: Send {
    /// Consume `input` and append zero or more decoded samples to `out`.
    fn decode(
        &mut self,
        mode: &DecoderOpts,
        input: &[i16],
        out: &mut Vec<i16>,
    ) -> Result<(), DecodeError>;

    /// Restore a clean decode context after a failure.
    fn reset(&mut self);

    /// The fixed number of input samples per output sample, if the decoder knows it.
    ///
    /// When present, [`crate::DecoderStage::new`] checks it against `StageOpts::rate_ratio`.
    fn rate_ratio(&self) -> Option<usize> {
        None
    }
}

impl<D: FrameDecoder + ?Sized> FrameDecoder for Box<D> {
    fn decode(
        &mut self,
        mode: &DecoderOpts,
        input: &[i16],
        out: &mut Vec<i16>,
    ) -> Result<(), DecodeError> {
        (**self).decode(mode, input, out)
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn rate_ratio(&self) -> Option<usize> {
        (**self).rate_ratio()
    }
}
