//! Microphone capture using CPAL
//!
//! The cpal stream is not `Send`, so each capture runs on its own thread which owns
//! the stream from creation to teardown. Audio leaves that thread as 16-bit
//! little-endian mono PCM chunks on an unbounded channel.

use std::sync::Arc;
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;

use byteorder::{ByteOrder, LittleEndian};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::AudioData;
use crate::error::{Error, Result};

/// Rates the voice service accepts
pub const SUPPORTED_SAMPLE_RATES: [u32; 6] = [8000, 11025, 16000, 22050, 44100, 48000];

pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Volume is reported this often while capturing
pub const LEVEL_INTERVAL_MS: u32 = 100;

const MIN_SIGNAL_DB: f64 = 20.0;
const MAX_SIGNAL_DB: f64 = 80.0;

/// Receives the microphone volume in `[0, 1]`
pub type LevelCallback = Arc<dyn Fn(f32) + Send + Sync>;

/// Wire encoding of captured audio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioEncoding {
    PcmS16Le,
}

impl AudioEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PcmS16Le => "pcm_s16le",
        }
    }
}

/// A source of PCM audio
pub trait AudioInput: Send + Sync {
    /// Begin capturing; every chunk is pushed to `frames`.
    ///
    /// Returns `Error::Permission` when the device cannot be opened. Calling it while
    /// already capturing does nothing.
    fn start(&self, frames: mpsc::UnboundedSender<AudioData>, on_level: Option<LevelCallback>)
    -> Result<()>;

    /// Halt capture and release the device. Idempotent.
    fn stop(&self);

    fn is_capturing(&self) -> bool;

    /// Rate of the PCM pushed to `frames`
    fn sample_rate(&self) -> u32;

    fn encoding(&self) -> AudioEncoding {
        AudioEncoding::PcmS16Le
    }
}

struct CaptureThread {
    stop_tx: std_mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Default input device
pub struct Microphone {
    sample_rate: u32,
    capture: Mutex<Option<CaptureThread>>,
}

impl Microphone {
    pub fn new() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            capture: Mutex::new(None),
        }
    }

    /// Capture at a specific rate; must be one of [`SUPPORTED_SAMPLE_RATES`]
    pub fn with_sample_rate(sample_rate: u32) -> Result<Self> {
        if !SUPPORTED_SAMPLE_RATES.contains(&sample_rate) {
            return Err(Error::Validation(format!(
                "Invalid sample rate {sample_rate}, please use one of {SUPPORTED_SAMPLE_RATES:?}"
            )));
        }
        Ok(Self {
            sample_rate,
            capture: Mutex::new(None),
        })
    }
}

impl Default for Microphone {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioInput for Microphone {
    fn start(
        &self,
        frames: mpsc::UnboundedSender<AudioData>,
        on_level: Option<LevelCallback>,
    ) -> Result<()> {
        let mut capture = self.capture.lock();
        if capture.is_some() {
            return Ok(());
        }

        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<Result<()>>(1);
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let target_rate = self.sample_rate;

        let handle = std::thread::Builder::new()
            .name("w3w-capture".to_string())
            .spawn(move || {
                let sink = FrameSink::new(frames, on_level, target_rate);
                run_capture(sink, ready_tx, stop_rx)
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                *capture = Some(CaptureThread { stop_tx, handle });
                info!("Audio capture started at {} Hz", target_rate);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(Error::Permission(
                    "capture thread exited before opening the device".to_string(),
                ))
            }
        }
    }

    fn stop(&self) {
        let Some(capture) = self.capture.lock().take() else {
            return;
        };
        let _ = capture.stop_tx.send(());
        if capture.handle.join().is_err() {
            error!("Audio capture thread panicked");
        }
        info!("Audio capture stopped");
    }

    fn is_capturing(&self) -> bool {
        self.capture.lock().is_some()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for Microphone {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Body of the capture thread: open, report readiness, wait for stop
fn run_capture(sink: FrameSink, ready: std_mpsc::SyncSender<Result<()>>, stop: std_mpsc::Receiver<()>) {
    let stream = match open_stream(sink) {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Failed to open microphone: {}", e);
            let _ = ready.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready.send(Err(Error::Permission(format!(
            "Failed to start input stream: {e}"
        ))));
        return;
    }

    let _ = ready.send(Ok(()));

    // returns on an explicit stop or when the owner goes away
    let _ = stop.recv();
    drop(stream);
}

fn open_stream(mut sink: FrameSink) -> Result<Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| Error::Permission("No input device available".to_string()))?;

    // note: device.name() is deprecated in cpal 0.17+, but works
    #[allow(deprecated)]
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    info!("Using input device: {}", device_name);

    let supported_configs: Vec<_> = device
        .supported_input_configs()
        .map_err(|e| Error::Permission(format!("Failed to get supported configs: {e}")))?
        .collect();

    let format = choose_capture_format(&supported_configs, sink.target_rate)
        .ok_or_else(|| Error::Audio("No supported input config found".to_string()))?;

    let stream_config = format.config.config();
    sink.configure(format.channels, format.sample_rate);

    debug!(
        "Capturing {} channel(s) of {:?} at {} Hz for {} Hz output",
        format.channels, format.sample_format, format.sample_rate, sink.target_rate
    );

    match format.sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, sink),
        SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, sink),
        SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, sink),
        SampleFormat::I24 => build_stream::<cpal::I24>(&device, &stream_config, sink),
        SampleFormat::U24 => build_stream::<cpal::U24>(&device, &stream_config, sink),
        SampleFormat::I32 => build_stream::<i32>(&device, &stream_config, sink),
        SampleFormat::U32 => build_stream::<u32>(&device, &stream_config, sink),
        SampleFormat::I8 => build_stream::<i8>(&device, &stream_config, sink),
        SampleFormat::U8 => build_stream::<u8>(&device, &stream_config, sink),
        SampleFormat::F64 => build_stream::<f64>(&device, &stream_config, sink),
        SampleFormat::I64 => build_stream::<i64>(&device, &stream_config, sink),
        SampleFormat::U64 => build_stream::<u64>(&device, &stream_config, sink),
        other => Err(Error::Audio(format!("Unsupported sample format: {other:?}"))),
    }
}

fn build_stream<T>(device: &Device, config: &StreamConfig, mut sink: FrameSink) -> Result<Stream>
where
    T: Sample + SizedSample,
    f32: cpal::FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let samples: Vec<f32> = data.iter().map(|sample| sample.to_sample::<f32>()).collect();
                sink.push(&samples);
            },
            |err| error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| Error::Permission(format!("Failed to build input stream: {e}")))
}

/// Turns device buffers into PCM chunks plus periodic volume levels
struct FrameSink {
    frames: mpsc::UnboundedSender<AudioData>,
    on_level: Option<LevelCallback>,
    target_rate: u32,
    channels: usize,
    resampler: Resampler,
    meter: LevelMeter,
}

impl FrameSink {
    fn new(
        frames: mpsc::UnboundedSender<AudioData>,
        on_level: Option<LevelCallback>,
        target_rate: u32,
    ) -> Self {
        Self {
            frames,
            on_level,
            target_rate,
            channels: 1,
            resampler: Resampler::new(target_rate, target_rate),
            meter: LevelMeter::new(target_rate),
        }
    }

    fn configure(&mut self, channels: u16, device_rate: u32) {
        self.channels = usize::from(channels.max(1));
        if device_rate != self.target_rate {
            debug!("Resampling {} Hz -> {} Hz", device_rate, self.target_rate);
        }
        self.resampler = Resampler::new(device_rate, self.target_rate);
    }

    fn push(&mut self, interleaved: &[f32]) {
        let mono = downmix(interleaved, self.channels);
        let resampled = self.resampler.process(&mono);
        if resampled.is_empty() {
            return;
        }

        let pcm = to_pcm16(&resampled);
        if let Some(on_level) = &self.on_level {
            self.meter.push(&pcm, |level| on_level(level));
        }

        // receiver gone means the session is tearing down
        let _ = self.frames.send(encode_le(&pcm));
    }
}

fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

fn to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&sample| (sample.clamp(-1.0, 1.0) * 32767.0) as i16)
        .collect()
}

fn encode_le(pcm: &[i16]) -> AudioData {
    let mut bytes = vec![0u8; pcm.len() * 2];
    LittleEndian::write_i16_into(pcm, &mut bytes);
    bytes
}

/// Linear interpolation between two rates, carrying phase across buffers
struct Resampler {
    step: f64,
    position: f64,
    last: f32,
}

impl Resampler {
    fn new(source_rate: u32, target_rate: u32) -> Self {
        Self {
            step: f64::from(source_rate) / f64::from(target_rate.max(1)),
            position: 1.0,
            last: 0.0,
        }
    }

    fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if (self.step - 1.0).abs() < f64::EPSILON {
            return input.to_vec();
        }
        if input.is_empty() {
            return Vec::new();
        }

        // index 0 is the last sample of the previous buffer
        let at = |i: usize| if i == 0 { self.last } else { input[i - 1] };
        let len = input.len() as f64;

        let mut out = Vec::with_capacity((len / self.step) as usize + 1);
        while self.position <= len {
            let index = self.position.floor() as usize;
            let frac = (self.position - index as f64) as f32;
            let value = if index >= input.len() {
                at(index)
            } else {
                at(index) * (1.0 - frac) + at(index + 1) * frac
            };
            out.push(value);
            self.position += self.step;
        }

        self.position -= len;
        self.last = input[input.len() - 1];
        out
    }
}

/// Accumulates samples and reports one level per interval
struct LevelMeter {
    window: usize,
    sum_squares: f64,
    count: usize,
}

impl LevelMeter {
    fn new(sample_rate: u32) -> Self {
        Self {
            window: (sample_rate * LEVEL_INTERVAL_MS / 1000).max(1) as usize,
            sum_squares: 0.0,
            count: 0,
        }
    }

    fn push(&mut self, samples: &[i16], mut emit: impl FnMut(f32)) {
        for &sample in samples {
            self.sum_squares += f64::from(sample) * f64::from(sample);
            self.count += 1;
            if self.count >= self.window {
                let mean = self.sum_squares / self.count as f64;
                emit(scale_level(mean_square_to_db(mean)));
                self.sum_squares = 0.0;
                self.count = 0;
            }
        }
    }
}

fn mean_square_to_db(mean_square: f64) -> f64 {
    if mean_square > 0.0 {
        10.0 * mean_square.log10()
    } else {
        0.0
    }
}

/// Volume of a buffer in dB: `10 * log10(mean of squared samples)`, 0 for silence
pub fn calculate_volume(samples: &[i16]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    mean_square_to_db(sum / samples.len() as f64)
}

/// Map a dB value linearly from 20..80 onto 0..1, clamped
pub fn scale_level(db: f64) -> f32 {
    let scaled = (db - MIN_SIGNAL_DB) / (MAX_SIGNAL_DB - MIN_SIGNAL_DB);
    scaled.clamp(0.0, 1.0) as f32
}

/// Device settings picked for one capture
#[derive(Debug, Clone)]
struct CaptureFormat {
    config: cpal::SupportedStreamConfig,
    channels: u16,
    sample_format: SampleFormat,
    sample_rate: u32,
}

/// Lower is closer to the i16 PCM the voice service takes
fn format_rank(format: SampleFormat) -> u8 {
    match format {
        SampleFormat::I16 => 0,
        SampleFormat::F32 => 1,
        SampleFormat::I24 | SampleFormat::I32 => 2,
        SampleFormat::F64 => 3,
        SampleFormat::U16 | SampleFormat::U24 | SampleFormat::U32 => 4,
        _ => 5,
    }
}

/// Pick the input range closest to mono i16 at `target_rate`.
///
/// Avoiding resampling matters most, then a mono stream, then the sample format.
fn choose_capture_format(
    ranges: &[cpal::SupportedStreamConfigRange],
    target_rate: u32,
) -> Option<CaptureFormat> {
    let best = ranges.iter().copied().min_by_key(|range| {
        (
            nearest_rate(range, target_rate).abs_diff(target_rate),
            range.channels() != 1,
            format_rank(range.sample_format()),
            range.channels(),
        )
    })?;

    let sample_rate = nearest_rate(&best, target_rate);
    Some(CaptureFormat {
        config: best.with_sample_rate(sample_rate),
        channels: best.channels(),
        sample_format: best.sample_format(),
        sample_rate,
    })
}

fn nearest_rate(range: &cpal::SupportedStreamConfigRange, target_rate: u32) -> u32 {
    target_rate
        .max(range.min_sample_rate())
        .min(range.max_sample_rate())
}
