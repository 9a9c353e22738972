use crate::speech::assembler::{AudioFrame, ListenGate};
use crate::{Result, ZelnaError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use crossbeam_channel::Sender;
use std::sync::Arc;
use tracing::{error, info};

/// Microphone capture feeding the transcript assembler.
///
/// The stream stays open for the lifetime of the worker; the [`ListenGate`]
/// decides whether a callback's samples are forwarded. The callback only does
/// a mono downmix and a non-blocking `try_send`.
pub struct AudioCapture {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Open the default input device
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| ZelnaError::AudioDevice("No input device available".into()))?;

        info!("Using input device: {}", device.name().unwrap_or_else(|_| "Unknown".to_string()));

        let supported = device
            .default_input_config()
            .map_err(|e| ZelnaError::AudioDevice(format!("Failed to get input config: {}", e)))?;
        let sample_format = supported.sample_format();

        Ok(Self {
            device,
            config: supported.into(),
            sample_format,
            stream: None,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn channels(&self) -> u16 {
        self.config.channels
    }

    /// Open the stream; frames flow only while the gate is armed
    pub fn start(&mut self, gate: Arc<ListenGate>, frame_tx: Sender<AudioFrame>) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_stream::<f32>(gate, frame_tx)?,
            SampleFormat::I16 => self.build_stream::<i16>(gate, frame_tx)?,
            SampleFormat::U16 => self.build_stream::<u16>(gate, frame_tx)?,
            other => {
                return Err(ZelnaError::AudioDevice(format!(
                    "Unsupported sample format: {:?}",
                    other
                )))
            }
        };

        stream
            .play()
            .map_err(|e| ZelnaError::AudioDevice(format!("Failed to start input stream: {}", e)))?;

        self.stream = Some(stream);
        info!(
            "Microphone open at {} Hz, {} channel(s)",
            self.sample_rate(),
            self.channels()
        );
        Ok(())
    }

    fn build_stream<T>(&self, gate: Arc<ListenGate>, frame_tx: Sender<AudioFrame>) -> Result<Stream>
    where
        T: SizedSample,
        f32: FromSample<T>,
    {
        let channels = self.config.channels as usize;

        let err_fn = |err| {
            error!("Audio input stream error: {}", err);
        };

        self.device
            .build_input_stream(
                &self.config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    let Some(generation) = gate.open_generation() else {
                        return;
                    };

                    let samples: Vec<f32> = if channels == 1 {
                        data.iter().map(|&s| f32::from_sample(s)).collect()
                    } else {
                        data.chunks(channels)
                            .map(|frame| {
                                frame.iter().map(|&s| f32::from_sample(s)).sum::<f32>()
                                    / channels as f32
                            })
                            .collect()
                    };

                    // A full queue drops the frame rather than blocking the callback
                    if frame_tx.try_send(AudioFrame::new(generation, samples)).is_err() {
                        gate.record_overflow();
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| ZelnaError::AudioDevice(format!("Failed to build input stream: {}", e)))
    }

    /// Close the stream and release the device
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            info!("Microphone closed");
        }
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
