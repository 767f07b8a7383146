//! Mock capability providers driving the reconciler, transport and volume
//! tests without an OS media subsystem.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use now_playing_core::error::{ProviderError, Result};
use now_playing_core::mixer::{AudioEndpoint, AudioMixer, AudioSessionControl, EndpointRole};
use now_playing_core::provider::{
    ArtworkSource, EventSink, MediaProperties, MediaSession, SessionEvent, SessionManager,
};
use now_playing_core::snapshot::PlaybackStatus;

fn lock<'a, T>(mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A 1x1 24-bit BMP with the given pixel; decodes with the `image` crate.
pub fn tiny_bmp(pixel: [u8; 3]) -> Vec<u8> {
    let mut b = Vec::with_capacity(58);
    b.extend_from_slice(b"BM");
    b.extend_from_slice(&58u32.to_le_bytes());
    b.extend_from_slice(&[0, 0, 0, 0]);
    b.extend_from_slice(&54u32.to_le_bytes());
    b.extend_from_slice(&40u32.to_le_bytes());
    b.extend_from_slice(&1i32.to_le_bytes());
    b.extend_from_slice(&1i32.to_le_bytes());
    b.extend_from_slice(&1u16.to_le_bytes());
    b.extend_from_slice(&24u16.to_le_bytes());
    b.extend_from_slice(&0u32.to_le_bytes());
    b.extend_from_slice(&4u32.to_le_bytes());
    b.extend_from_slice(&2835i32.to_le_bytes());
    b.extend_from_slice(&2835i32.to_le_bytes());
    b.extend_from_slice(&0u32.to_le_bytes());
    b.extend_from_slice(&0u32.to_le_bytes());
    b.extend_from_slice(&[pixel[2], pixel[1], pixel[0], 0]);
    b
}

/// Blocks artwork reads until opened, to keep a fetch "in flight".
pub struct Gate {
    open: Mutex<bool>,
    cv: Condvar,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            open: Mutex::new(false),
            cv: Condvar::new(),
        })
    }

    pub fn open(&self) {
        *lock(&self.open) = true;
        self.cv.notify_all();
    }

    fn wait(&self) {
        let mut open = lock(&self.open);
        while !*open {
            open = self
                .cv
                .wait(open)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

#[derive(Clone)]
pub struct MockArtworkSpec {
    pub bytes: Vec<u8>,
    pub gate: Option<Arc<Gate>>,
    /// Counts fetches (first chunk read per source).
    pub reads: Arc<AtomicUsize>,
}

impl MockArtworkSpec {
    pub fn plain(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            gate: None,
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn gated(bytes: Vec<u8>, gate: Arc<Gate>) -> Self {
        Self {
            bytes,
            gate: Some(gate),
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

pub struct MockArtwork {
    spec: MockArtworkSpec,
    pos: usize,
    started: bool,
}

impl ArtworkSource for MockArtwork {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.started {
            self.started = true;
            if let Some(gate) = &self.spec.gate {
                gate.wait();
            }
            self.spec.reads.fetch_add(1, Ordering::SeqCst);
        }
        let remaining = self.spec.bytes.len() - self.pos;
        let n = remaining.min(buf.len());
        buf[..n].copy_from_slice(&self.spec.bytes[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[derive(Clone)]
pub struct MockTrack {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub status: PlaybackStatus,
    pub artwork: Option<MockArtworkSpec>,
    pub fail_properties: bool,
    pub reject_commands: bool,
}

impl Default for MockTrack {
    fn default() -> Self {
        Self {
            title: String::new(),
            artist: String::new(),
            album: String::new(),
            status: PlaybackStatus::Unknown,
            artwork: None,
            fail_properties: false,
            reject_commands: false,
        }
    }
}

struct SystemState {
    track: Mutex<Option<MockTrack>>,
    manager_sink: Mutex<Option<EventSink>>,
    session_sink: Mutex<Option<EventSink>>,
    commands: Mutex<Vec<&'static str>>,
}

/// Test-side handle to the mocked media subsystem. Clones share state.
#[derive(Clone)]
pub struct MediaSystem {
    state: Arc<SystemState>,
}

impl MediaSystem {
    pub fn new() -> Self {
        Self {
            state: Arc::new(SystemState {
                track: Mutex::new(None),
                manager_sink: Mutex::new(None),
                session_sink: Mutex::new(None),
                commands: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn manager(&self) -> MockManager {
        MockManager {
            state: Arc::clone(&self.state),
        }
    }

    pub fn set_track(&self, track: Option<MockTrack>) {
        *lock(&self.state.track) = track;
    }

    pub fn update_track(&self, change: impl FnOnce(&mut MockTrack)) {
        if let Some(track) = lock(&self.state.track).as_mut() {
            change(track);
        }
    }

    pub fn fire_session_changed(&self) {
        if let Some(sink) = lock(&self.state.manager_sink).as_ref() {
            sink.notify(SessionEvent::SessionChanged);
        }
    }

    pub fn fire_properties_changed(&self) {
        if let Some(sink) = lock(&self.state.session_sink).as_ref() {
            sink.notify(SessionEvent::MediaPropertiesChanged);
        }
    }

    pub fn fire_playback_changed(&self) {
        if let Some(sink) = lock(&self.state.session_sink).as_ref() {
            sink.notify(SessionEvent::PlaybackInfoChanged);
        }
    }

    pub fn has_manager_listener(&self) -> bool {
        lock(&self.state.manager_sink).is_some()
    }

    pub fn has_session_listener(&self) -> bool {
        lock(&self.state.session_sink).is_some()
    }

    pub fn commands(&self) -> Vec<&'static str> {
        lock(&self.state.commands).clone()
    }
}

pub struct MockManager {
    state: Arc<SystemState>,
}

impl SessionManager for MockManager {
    type Session = MockSession;

    fn current_session(&self) -> Result<Option<MockSession>> {
        if lock(&self.state.track).is_some() {
            Ok(Some(MockSession {
                state: Arc::clone(&self.state),
            }))
        } else {
            Ok(None)
        }
    }

    fn attach_session_changed(&mut self, sink: EventSink) -> Result<()> {
        *lock(&self.state.manager_sink) = Some(sink);
        Ok(())
    }

    fn detach_session_changed(&mut self) {
        *lock(&self.state.manager_sink) = None;
    }
}

pub struct MockSession {
    state: Arc<SystemState>,
}

impl MockSession {
    fn track(&self) -> Result<MockTrack> {
        lock(&self.state.track)
            .clone()
            .ok_or_else(|| ProviderError::Lost("session torn down".into()))
    }

    fn command(&self, name: &'static str) -> Result<bool> {
        let track = self.track()?;
        lock(&self.state.commands).push(name);
        Ok(!track.reject_commands)
    }
}

impl MediaSession for MockSession {
    type Artwork = MockArtwork;

    fn media_properties(&self) -> Result<MediaProperties<MockArtwork>> {
        let track = self.track()?;
        if track.fail_properties {
            return Err(ProviderError::Lost("properties unavailable".into()));
        }
        Ok(MediaProperties {
            title: track.title,
            artist: track.artist,
            album: track.album,
            artwork: track.artwork.map(|spec| MockArtwork {
                spec,
                pos: 0,
                started: false,
            }),
        })
    }

    fn playback_status(&self) -> Result<PlaybackStatus> {
        Ok(self.track()?.status)
    }

    fn attach_listeners(&mut self, sink: EventSink) -> Result<()> {
        *lock(&self.state.session_sink) = Some(sink);
        Ok(())
    }

    fn detach_listeners(&mut self) {
        *lock(&self.state.session_sink) = None;
    }

    fn skip_next(&self) -> Result<bool> {
        self.command("next")
    }

    fn skip_previous(&self) -> Result<bool> {
        self.command("previous")
    }

    fn play(&self) -> Result<bool> {
        self.command("play")
    }

    fn pause(&self) -> Result<bool> {
        self.command("pause")
    }
}

// --- audio mixer mocks ---

#[derive(Clone)]
pub struct MockAudioSession {
    pub pid: u32,
    pub display: String,
    pub volume: Arc<Mutex<f32>>,
    pub fail_pid: bool,
}

pub fn audio_session(pid: u32, display: &str) -> MockAudioSession {
    MockAudioSession {
        pid,
        display: display.to_string(),
        volume: Arc::new(Mutex::new(1.0)),
        fail_pid: false,
    }
}

impl MockAudioSession {
    pub fn current_volume(&self) -> f32 {
        *lock(&self.volume)
    }

    pub fn set_level(&self, volume: f32) {
        *lock(&self.volume) = volume;
    }
}

impl AudioSessionControl for MockAudioSession {
    fn process_id(&self) -> Result<u32> {
        if self.fail_pid {
            Err(ProviderError::Lost("session control gone".into()))
        } else {
            Ok(self.pid)
        }
    }

    fn display_name(&self) -> Result<String> {
        Ok(self.display.clone())
    }

    fn volume(&self) -> Result<f32> {
        Ok(*lock(&self.volume))
    }

    fn set_volume(&self, volume: f32) -> Result<()> {
        *lock(&self.volume) = volume;
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MockEndpoint {
    pub sessions: Vec<MockAudioSession>,
    pub fail_sessions: bool,
}

impl MockEndpoint {
    pub fn with_sessions(sessions: Vec<MockAudioSession>) -> Self {
        Self {
            sessions,
            fail_sessions: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            sessions: Vec::new(),
            fail_sessions: true,
        }
    }
}

impl AudioEndpoint for MockEndpoint {
    type Session = MockAudioSession;

    fn sessions(&self) -> Result<Vec<MockAudioSession>> {
        if self.fail_sessions {
            Err(ProviderError::Lost("endpoint gone".into()))
        } else {
            Ok(self.sessions.clone())
        }
    }
}

#[derive(Default)]
pub struct MockMixer {
    pub endpoints: Vec<MockEndpoint>,
    pub defaults: Vec<(EndpointRole, usize)>,
    pub names: HashMap<u32, String>,
    pub fail_enumeration: bool,
    pub enumerations: Arc<AtomicUsize>,
}

impl MockMixer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint(mut self, endpoint: MockEndpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    pub fn with_default(mut self, role: EndpointRole, index: usize) -> Self {
        self.defaults.push((role, index));
        self
    }

    pub fn with_name(mut self, pid: u32, name: &str) -> Self {
        self.names.insert(pid, name.to_string());
        self
    }

    pub fn enumeration_count(&self) -> usize {
        self.enumerations.load(Ordering::SeqCst)
    }
}

impl AudioMixer for MockMixer {
    type Endpoint = MockEndpoint;

    fn default_endpoint(&self, role: EndpointRole) -> Result<Option<MockEndpoint>> {
        Ok(self
            .defaults
            .iter()
            .find(|(r, _)| *r == role)
            .and_then(|(_, index)| self.endpoints.get(*index).cloned()))
    }

    fn active_endpoints(&self) -> Result<Vec<MockEndpoint>> {
        self.enumerations.fetch_add(1, Ordering::SeqCst);
        if self.fail_enumeration {
            Err(ProviderError::Unavailable("no audio subsystem".into()))
        } else {
            Ok(self.endpoints.clone())
        }
    }

    fn process_name(&self, pid: u32) -> Option<String> {
        self.names.get(&pid).cloned()
    }
}
