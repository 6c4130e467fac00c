//! In-memory backend for driving the engine in tests
//!
//! Streams are never attached to hardware. Tests call
//! [`ScriptedBackend::render`] to run one callback period on the current
//! stream (only while it is playing) and inspect the recorded events.

use std::sync::{Arc, Mutex, MutexGuard};

use super::backend::{AudioBackend, OutputStream, StreamSpec};
use super::config::DeviceId;
use super::device::OutputDevice;
use super::error::{AudioError, AudioResult};
use crate::engine::Transport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StreamEvent {
    Opened { id: usize, device: String, sample_rate: u32 },
    Played { id: usize },
    Paused { id: usize },
    Rendered { id: usize, sample_rate: u32 },
    Closed { id: usize },
}

/// Shared transport state as a stream saw it while being paused or dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Teardown {
    pub id: usize,
    pub sample_rate: u32,
    pub position: u64,
}

struct LiveStream {
    id: usize,
    sample_rate: u32,
    channels: usize,
    running: bool,
    transport: Transport,
}

struct Script {
    devices: Vec<OutputDevice>,
    fail_opens: usize,
    next_id: usize,
    events: Vec<StreamEvent>,
    teardowns: Vec<Teardown>,
    current: Option<LiveStream>,
}

impl Script {
    fn record_teardown(&mut self, id: usize) {
        if let Some(stream) = self.current.as_ref().filter(|s| s.id == id) {
            let atomics = stream.transport.atomics();
            self.teardowns.push(Teardown {
                id,
                sample_rate: atomics.sample_rate(),
                position: atomics.position(),
            });
        }
    }
}

#[derive(Clone)]
pub(crate) struct ScriptedBackend {
    script: Arc<Mutex<Script>>,
}

impl ScriptedBackend {
    /// Backend offering the named devices; the first is the default
    pub(crate) fn new(device_names: &[&str]) -> Self {
        let devices = device_names
            .iter()
            .enumerate()
            .map(|(i, name)| OutputDevice {
                id: DeviceId::with_host(name, "Scripted"),
                is_default: i == 0,
                sample_rates: vec![44100, 48000],
                max_channels: 2,
            })
            .collect();
        Self {
            script: Arc::new(Mutex::new(Script {
                devices,
                fail_opens: 0,
                next_id: 1,
                events: Vec::new(),
                teardowns: Vec::new(),
                current: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    /// Make the next `count` calls to `open` fail
    pub(crate) fn set_fail_opens(&self, count: usize) {
        self.lock().fail_opens = count;
    }

    pub(crate) fn events(&self) -> Vec<StreamEvent> {
        self.lock().events.clone()
    }

    pub(crate) fn clear_events(&self) {
        let mut script = self.lock();
        script.events.clear();
        script.teardowns.clear();
    }

    pub(crate) fn teardowns(&self) -> Vec<Teardown> {
        self.lock().teardowns.clone()
    }

    /// Whether a stream is open and playing
    pub(crate) fn is_running(&self) -> bool {
        self.lock().current.as_ref().is_some_and(|s| s.running)
    }

    /// Run one callback period of `frames` frames
    ///
    /// Returns None when no stream is playing, like a device that does not
    /// call back.
    pub(crate) fn render(&self, frames: usize) -> Option<Vec<f32>> {
        let mut script = self.lock();
        let stream = script.current.as_mut().filter(|s| s.running)?;
        let mut out = vec![f32::NAN; frames * stream.channels];
        stream.transport.render(&mut out, stream.channels);
        let event = StreamEvent::Rendered {
            id: stream.id,
            sample_rate: stream.sample_rate,
        };
        script.events.push(event);
        Some(out)
    }
}

struct ScriptedStream {
    id: usize,
    sample_rate: u32,
    script: Arc<Mutex<Script>>,
}

impl ScriptedStream {
    fn set_running(&mut self, running: bool) {
        let mut script = self.script.lock().unwrap();
        if !running {
            script.record_teardown(self.id);
        }
        if let Some(stream) = script.current.as_mut().filter(|s| s.id == self.id) {
            stream.running = running;
        }
        let event = if running {
            StreamEvent::Played { id: self.id }
        } else {
            StreamEvent::Paused { id: self.id }
        };
        script.events.push(event);
    }
}

impl OutputStream for ScriptedStream {
    fn play(&mut self) -> AudioResult<()> {
        self.set_running(true);
        Ok(())
    }

    fn pause(&mut self) -> AudioResult<()> {
        self.set_running(false);
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for ScriptedStream {
    fn drop(&mut self) {
        let mut script = self.script.lock().unwrap();
        script.record_teardown(self.id);
        if script.current.as_ref().is_some_and(|s| s.id == self.id) {
            script.current = None;
        }
        script.events.push(StreamEvent::Closed { id: self.id });
    }
}

impl AudioBackend for ScriptedBackend {
    fn default_device(&self) -> AudioResult<DeviceId> {
        self.lock()
            .devices
            .first()
            .map(|d| d.id.clone())
            .ok_or(AudioError::NoDevices)
    }

    fn output_devices(&self) -> AudioResult<Vec<OutputDevice>> {
        Ok(self.lock().devices.clone())
    }

    fn open(
        &mut self,
        device: &DeviceId,
        spec: StreamSpec,
        transport: Transport,
    ) -> AudioResult<Box<dyn OutputStream>> {
        let mut script = self.lock();
        if script.fail_opens > 0 {
            script.fail_opens -= 1;
            return Err(AudioError::StreamBuildError("scripted failure".to_string()));
        }
        // The engine must close the previous stream first
        assert!(script.current.is_none(), "opened a stream while another is live");

        let id = script.next_id;
        script.next_id += 1;
        script.events.push(StreamEvent::Opened {
            id,
            device: device.name.clone(),
            sample_rate: spec.sample_rate,
        });
        script.current = Some(LiveStream {
            id,
            sample_rate: spec.sample_rate,
            channels: spec.channels as usize,
            running: false,
            transport,
        });

        Ok(Box::new(ScriptedStream {
            id,
            sample_rate: spec.sample_rate,
            script: Arc::clone(&self.script),
        }))
    }
}
