use crate::model::DAYS_PER_WEEK;
use anyhow::{Context, Result};
use rodio::Source;
use rodio::cpal::traits::{DeviceTrait, HostTrait};
use rodio::source::SineWave;
use rodio::{OutputStream, OutputStreamBuilder, Sink};
#[cfg(unix)]
use std::ffi::CString;
use std::time::Duration;
use tracing::debug;

const MAX_VOLUME: f32 = 2.0;
const DEFAULT_OUTPUT_LABEL: &str = "System default output (CPAL)";
const TONE_GAIN: f32 = 0.2;
const BACKGROUND_TONE_HZ: f32 = 110.0;
const BACKGROUND_GAIN: f32 = 0.08;

/// Day tones, Sunday first, from high to low.
pub const DAY_TONES_HZ: [f32; DAYS_PER_WEEK] =
    [880.00, 659.25, 523.25, 440.00, 329.63, 220.00, 164.81];

/// Seven day channels plus one background channel.
pub trait ToneChannels {
    fn play(&mut self, channel: usize);
    fn stop(&mut self, channel: usize);
    fn play_background(&mut self);
    fn stop_background(&mut self);
    fn output_name(&self) -> Option<String>;

    fn stop_all(&mut self) {
        for channel in 0..DAYS_PER_WEEK {
            self.stop(channel);
        }
    }
}

impl<T: ToneChannels + ?Sized> ToneChannels for Box<T> {
    fn play(&mut self, channel: usize) {
        (**self).play(channel);
    }

    fn stop(&mut self, channel: usize) {
        (**self).stop(channel);
    }

    fn play_background(&mut self) {
        (**self).play_background();
    }

    fn stop_background(&mut self) {
        (**self).stop_background();
    }

    fn output_name(&self) -> Option<String> {
        (**self).output_name()
    }

    fn stop_all(&mut self) {
        (**self).stop_all();
    }
}

/// Sine tones on the system output device.
pub struct ToneBank {
    stream: OutputStream,
    /// Set only when the default device failed and another one opened.
    fallback_output: Option<String>,
    day_sinks: Vec<Option<Sink>>,
    background: Option<Sink>,
    sustain: Duration,
    volume: f32,
}

impl ToneBank {
    pub fn new(sustain: Duration, volume: f32) -> Result<Self> {
        let (stream, fallback_output) = open_output_stream()?;
        Ok(Self {
            stream,
            fallback_output,
            day_sinks: (0..DAYS_PER_WEEK).map(|_| None).collect(),
            background: None,
            sustain,
            volume: volume.clamp(0.0, MAX_VOLUME),
        })
    }
}

impl ToneChannels for ToneBank {
    fn play(&mut self, channel: usize) {
        let Some(frequency) = DAY_TONES_HZ.get(channel).copied() else {
            debug!(channel, "ignoring play on unknown channel");
            return;
        };
        if let Some(previous) = self.day_sinks[channel].take() {
            previous.stop();
        }

        let sink = Sink::connect_new(self.stream.mixer());
        sink.append(
            SineWave::new(frequency)
                .take_duration(self.sustain)
                .amplify(TONE_GAIN),
        );
        sink.set_volume(self.volume);
        self.day_sinks[channel] = Some(sink);
    }

    fn stop(&mut self, channel: usize) {
        if let Some(sink) = self.day_sinks.get_mut(channel).and_then(Option::take) {
            sink.stop();
        }
    }

    fn play_background(&mut self) {
        self.stop_background();
        let sink = Sink::connect_new(self.stream.mixer());
        sink.append(SineWave::new(BACKGROUND_TONE_HZ).amplify(BACKGROUND_GAIN));
        sink.set_volume(self.volume);
        self.background = Some(sink);
    }

    fn stop_background(&mut self) {
        if let Some(sink) = self.background.take() {
            sink.stop();
        }
    }

    fn output_name(&self) -> Option<String> {
        Some(output_label(self.fallback_output.as_deref()))
    }
}

fn output_label(fallback: Option<&str>) -> String {
    fallback.unwrap_or(DEFAULT_OUTPUT_LABEL).to_string()
}

/// Opens the default device, or the first other device that starts. The name
/// is returned when a fallback device was used.
fn open_output_stream() -> Result<(OutputStream, Option<String>)> {
    let (mut stream, fallback) = with_silenced_stderr(|| {
        match OutputStreamBuilder::from_default_device()
            .context("failed to open default system output stream")
            .and_then(|builder| {
                builder
                    .with_error_callback(|_| {})
                    .open_stream_or_fallback()
                    .context("failed to start default output stream")
            }) {
            Ok(stream) => Ok((stream, None)),
            Err(default_err) => {
                let host = rodio::cpal::default_host();
                host.output_devices()
                    .ok()
                    .into_iter()
                    .flatten()
                    .find_map(|device| {
                        let name = device
                            .name()
                            .unwrap_or_else(|_| String::from("Fallback output device"));
                        let stream = OutputStreamBuilder::from_device(device)
                            .ok()?
                            .with_error_callback(|_| {})
                            .open_stream_or_fallback()
                            .ok()?;
                        Some((stream, Some(name)))
                    })
                    .with_context(|| {
                        format!(
                            "unable to start any audio output stream after default failed: {default_err:#}"
                        )
                    })
            }
        }
    })?;
    if let Some(name) = &fallback {
        debug!(output = %name, "default output failed, using fallback device");
    }
    stream.log_on_drop(false);
    Ok((stream, fallback))
}

#[cfg(unix)]
fn with_silenced_stderr<T>(operation: impl FnOnce() -> T) -> T {
    let saved = unsafe { libc::dup(libc::STDERR_FILENO) };
    if saved < 0 {
        return operation();
    }

    let devnull = CString::new("/dev/null")
        .ok()
        .map(|path| unsafe { libc::open(path.as_ptr(), libc::O_WRONLY) })
        .unwrap_or(-1);

    if devnull >= 0 {
        unsafe {
            libc::dup2(devnull, libc::STDERR_FILENO);
            libc::close(devnull);
        }
    }

    let result = operation();

    unsafe {
        libc::dup2(saved, libc::STDERR_FILENO);
        libc::close(saved);
    }

    result
}

#[cfg(not(unix))]
fn with_silenced_stderr<T>(operation: impl FnOnce() -> T) -> T {
    operation()
}

/// Silent stand-in used when no output device can be opened. It still tracks
/// which channels would be sounding.
#[derive(Debug, Default)]
pub struct NullToneBank {
    sounding: [bool; DAYS_PER_WEEK],
    background: bool,
}

impl NullToneBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_sounding(&self, channel: usize) -> bool {
        self.sounding.get(channel).copied().unwrap_or(false)
    }

    pub fn background_playing(&self) -> bool {
        self.background
    }
}

impl ToneChannels for NullToneBank {
    fn play(&mut self, channel: usize) {
        if let Some(slot) = self.sounding.get_mut(channel) {
            *slot = true;
        }
    }

    fn stop(&mut self, channel: usize) {
        if let Some(slot) = self.sounding.get_mut(channel) {
            *slot = false;
        }
    }

    fn play_background(&mut self) {
        self.background = true;
    }

    fn stop_background(&mut self) {
        self.background = false;
    }

    fn output_name(&self) -> Option<String> {
        Some("Null audio engine".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_OUTPUT_LABEL, NullToneBank, ToneChannels, output_label};

    #[test]
    fn output_label_names_the_fallback_device() {
        assert_eq!(output_label(None), DEFAULT_OUTPUT_LABEL);
        assert_eq!(output_label(Some("pulse")), "pulse");
    }

    #[test]
    fn null_bank_tracks_sounding_channels() {
        let mut bank = NullToneBank::new();
        bank.play(0);
        bank.play(6);
        assert!(bank.is_sounding(0));
        assert!(bank.is_sounding(6));

        bank.stop_all();
        assert!((0..7).all(|channel| !bank.is_sounding(channel)));
    }

    #[test]
    fn null_bank_ignores_out_of_range_channels() {
        let mut bank = NullToneBank::new();
        bank.play(9);
        bank.stop(9);
        assert!(!bank.is_sounding(9));
    }

    #[test]
    fn boxed_bank_forwards_background() {
        let mut bank: Box<dyn ToneChannels> = Box::new(NullToneBank::new());
        bank.play_background();
        bank.stop_background();
        assert_eq!(bank.output_name().as_deref(), Some("Null audio engine"));
    }
}
