//! Windows capability providers: SMTC for media sessions, WASAPI for
//! per-application audio sessions.
//!
//! WinRT async operations are bridged onto the calling thread with
//! `block_on`; every public entry point therefore assumes it runs on a thread
//! whose COM lifetime is covered by a [`ComGuard`].

use std::future::IntoFuture;

use futures::executor::block_on;
use tracing::{debug, trace};
use windows::{
    core::{Interface, Result as WinResult, PWSTR},
    Foundation::TypedEventHandler,
    Media::Control::{
        GlobalSystemMediaTransportControlsSession,
        GlobalSystemMediaTransportControlsSessionManager,
        GlobalSystemMediaTransportControlsSessionMediaProperties,
        GlobalSystemMediaTransportControlsSessionPlaybackStatus,
    },
    Storage::Streams::{
        DataReader, IRandomAccessStreamReference, IRandomAccessStreamWithContentType,
        InputStreamOptions,
    },
    Win32::{
        Foundation::{CloseHandle, MAX_PATH, RPC_E_CHANGED_MODE},
        Media::Audio::{
            eConsole, eMultimedia, eRender, IAudioSessionControl, IAudioSessionControl2,
            IAudioSessionManager2, IMMDevice, IMMDeviceEnumerator, ISimpleAudioVolume,
            MMDeviceEnumerator, DEVICE_STATE_ACTIVE,
        },
        System::{
            Com::{
                CoCreateInstance, CoInitializeEx, CoUninitialize, CLSCTX_ALL,
                COINIT_MULTITHREADED,
            },
            Threading::{
                OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32,
                PROCESS_QUERY_LIMITED_INFORMATION,
            },
        },
    },
};

use crate::error::{ProviderError, Result};
use crate::mixer::{AudioEndpoint, AudioMixer, AudioSessionControl, EndpointRole};
use crate::provider::{
    ArtworkSource, EventSink, MediaProperties, MediaSession, SessionEvent, SessionManager,
};
use crate::snapshot::PlaybackStatus;

fn win_err(e: windows::core::Error) -> ProviderError {
    ProviderError::Os(format!("{e:?}"))
}

fn block_on_operation<O, T>(operation: O) -> WinResult<T>
where
    O: IntoFuture<Output = WinResult<T>>,
{
    block_on(operation.into_future())
}

/// Per-thread COM initialization with a paired uninit on drop.
///
/// `RPC_E_CHANGED_MODE` means another component already initialized this
/// thread with a different apartment model; we can use COM but must not
/// uninitialize it.
pub struct ComGuard {
    initialized: bool,
}

impl ComGuard {
    pub fn new() -> Result<Self> {
        let hr = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) };
        if hr.is_ok() {
            Ok(Self { initialized: true })
        } else if hr == RPC_E_CHANGED_MODE {
            Ok(Self { initialized: false })
        } else {
            Err(ProviderError::Unavailable(format!(
                "COM init failed: {hr:?}"
            )))
        }
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        if self.initialized {
            unsafe { CoUninitialize() };
        }
    }
}

/// SMTC-backed [`SessionManager`].
///
/// Construct on the thread that will own it (the reconciler's control thread,
/// or the caller's thread for transport use); the COM guard lives as long as
/// the manager.
pub struct WindowsSessionManager {
    manager: GlobalSystemMediaTransportControlsSessionManager,
    session_changed_token: Option<i64>,
    _com: ComGuard,
}

impl WindowsSessionManager {
    pub fn request() -> Result<Self> {
        let com = ComGuard::new()?;
        let manager = GlobalSystemMediaTransportControlsSessionManager::RequestAsync()
            .and_then(block_on_operation)
            .map_err(|e| ProviderError::Unavailable(format!("{e:?}")))?;
        Ok(Self {
            manager,
            session_changed_token: None,
            _com: com,
        })
    }
}

impl SessionManager for WindowsSessionManager {
    type Session = WindowsMediaSession;

    fn current_session(&self) -> Result<Option<WindowsMediaSession>> {
        match self.manager.GetCurrentSession() {
            Ok(session) => Ok(Some(WindowsMediaSession::new(session))),
            Err(e) => {
                trace!("no current session: {e:?}");
                Ok(None)
            }
        }
    }

    fn attach_session_changed(&mut self, sink: EventSink) -> Result<()> {
        let token = self
            .manager
            .CurrentSessionChanged(&TypedEventHandler::new(move |_, _| {
                sink.notify(SessionEvent::SessionChanged);
                Ok(())
            }))
            .map_err(win_err)?;
        self.session_changed_token = Some(token);
        Ok(())
    }

    fn detach_session_changed(&mut self) {
        if let Some(token) = self.session_changed_token.take() {
            if let Err(e) = self.manager.RemoveCurrentSessionChanged(token) {
                debug!("failed to remove session-changed listener: {e:?}");
            }
        }
    }
}

impl Drop for WindowsSessionManager {
    fn drop(&mut self) {
        self.detach_session_changed();
    }
}

pub struct WindowsMediaSession {
    session: GlobalSystemMediaTransportControlsSession,
    listener_tokens: Option<(i64, i64)>,
}

impl WindowsMediaSession {
    fn new(session: GlobalSystemMediaTransportControlsSession) -> Self {
        Self {
            session,
            listener_tokens: None,
        }
    }
}

impl MediaSession for WindowsMediaSession {
    type Artwork = WindowsArtworkStream;

    fn media_properties(&self) -> Result<MediaProperties<WindowsArtworkStream>> {
        let props = self
            .session
            .TryGetMediaPropertiesAsync()
            .and_then(block_on_operation)
            .map_err(win_err)?;
        Ok(read_media_properties(&props))
    }

    fn playback_status(&self) -> Result<PlaybackStatus> {
        let info = self.session.GetPlaybackInfo().map_err(win_err)?;
        let status = info.PlaybackStatus().map_err(win_err)?;
        Ok(map_playback_status(status))
    }

    fn attach_listeners(&mut self, sink: EventSink) -> Result<()> {
        let props_sink = sink.clone();
        let playback_sink = sink;
        let tokens = (
            self.session
                .MediaPropertiesChanged(&TypedEventHandler::new(move |_, _| {
                    props_sink.notify(SessionEvent::MediaPropertiesChanged);
                    Ok(())
                }))
                .map_err(win_err)?,
            self.session
                .PlaybackInfoChanged(&TypedEventHandler::new(move |_, _| {
                    playback_sink.notify(SessionEvent::PlaybackInfoChanged);
                    Ok(())
                }))
                .map_err(win_err)?,
        );
        self.listener_tokens = Some(tokens);
        Ok(())
    }

    fn detach_listeners(&mut self) {
        if let Some(tokens) = self.listener_tokens.take() {
            let _ = self.session.RemoveMediaPropertiesChanged(tokens.0);
            let _ = self.session.RemovePlaybackInfoChanged(tokens.1);
        }
    }

    fn skip_next(&self) -> Result<bool> {
        self.session
            .TrySkipNextAsync()
            .and_then(block_on_operation)
            .map_err(win_err)
    }

    fn skip_previous(&self) -> Result<bool> {
        self.session
            .TrySkipPreviousAsync()
            .and_then(block_on_operation)
            .map_err(win_err)
    }

    fn play(&self) -> Result<bool> {
        self.session
            .TryPlayAsync()
            .and_then(block_on_operation)
            .map_err(win_err)
    }

    fn pause(&self) -> Result<bool> {
        self.session
            .TryPauseAsync()
            .and_then(block_on_operation)
            .map_err(win_err)
    }
}

impl Drop for WindowsMediaSession {
    fn drop(&mut self) {
        self.detach_listeners();
    }
}

fn read_media_properties(
    props: &GlobalSystemMediaTransportControlsSessionMediaProperties,
) -> MediaProperties<WindowsArtworkStream> {
    MediaProperties {
        title: props
            .Title()
            .map(|s| s.to_string_lossy())
            .unwrap_or_default(),
        artist: props
            .Artist()
            .map(|s| s.to_string_lossy())
            .unwrap_or_default(),
        album: props
            .AlbumTitle()
            .map(|s| s.to_string_lossy())
            .unwrap_or_default(),
        artwork: props.Thumbnail().ok().map(WindowsArtworkStream::new),
    }
}

fn map_playback_status(
    status: GlobalSystemMediaTransportControlsSessionPlaybackStatus,
) -> PlaybackStatus {
    match status {
        GlobalSystemMediaTransportControlsSessionPlaybackStatus::Playing => {
            PlaybackStatus::Playing
        }
        GlobalSystemMediaTransportControlsSessionPlaybackStatus::Paused => PlaybackStatus::Paused,
        GlobalSystemMediaTransportControlsSessionPlaybackStatus::Stopped
        | GlobalSystemMediaTransportControlsSessionPlaybackStatus::Closed => {
            PlaybackStatus::Stopped
        }
        _ => PlaybackStatus::Unknown,
    }
}

/// SMTC thumbnail stream.
///
/// Opened lazily on the first read so the open runs on the fetching thread,
/// which takes its own COM guard for the duration of the read.
pub struct WindowsArtworkStream {
    reference: IRandomAccessStreamReference,
    reader: Option<DataReader>,
    _com: Option<ComGuard>,
}

impl WindowsArtworkStream {
    fn new(reference: IRandomAccessStreamReference) -> Self {
        Self {
            reference,
            reader: None,
            _com: None,
        }
    }
}

impl ArtworkSource for WindowsArtworkStream {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.reader.is_none() {
            let com = ComGuard::new()?;
            let stream: IRandomAccessStreamWithContentType = self
                .reference
                .OpenReadAsync()
                .and_then(block_on_operation)
                .map_err(win_err)?;
            let input_stream = stream.GetInputStreamAt(0).map_err(win_err)?;
            let reader = DataReader::CreateDataReader(&input_stream).map_err(win_err)?;
            reader
                .SetInputStreamOptions(InputStreamOptions::Partial)
                .map_err(win_err)?;
            self._com = Some(com);
            self.reader = Some(reader);
        }
        let Some(reader) = self.reader.as_ref() else {
            return Ok(0);
        };

        let loaded = reader
            .LoadAsync(buf.len() as u32)
            .and_then(block_on_operation)
            .map_err(win_err)?;
        if loaded == 0 {
            return Ok(0);
        }
        let n = loaded as usize;
        reader.ReadBytes(&mut buf[..n]).map_err(win_err)?;
        Ok(n)
    }
}

/// WASAPI-backed [`AudioMixer`].
///
/// Holds no device state; every call enumerates fresh. Construct on the
/// thread the volume calls will run on.
pub struct WindowsAudioMixer {
    _com: ComGuard,
}

impl WindowsAudioMixer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            _com: ComGuard::new()?,
        })
    }

    fn enumerator(&self) -> Result<IMMDeviceEnumerator> {
        unsafe { CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL) }
            .map_err(|e| ProviderError::Unavailable(format!("{e:?}")))
    }
}

impl AudioMixer for WindowsAudioMixer {
    type Endpoint = WindowsAudioEndpoint;

    fn default_endpoint(&self, role: EndpointRole) -> Result<Option<WindowsAudioEndpoint>> {
        let enumerator = self.enumerator()?;
        let os_role = match role {
            EndpointRole::Multimedia => eMultimedia,
            EndpointRole::Console => eConsole,
        };
        match unsafe { enumerator.GetDefaultAudioEndpoint(eRender, os_role) } {
            Ok(device) => Ok(Some(WindowsAudioEndpoint { device })),
            Err(e) => {
                trace!("no default render endpoint for {role:?}: {e:?}");
                Ok(None)
            }
        }
    }

    fn active_endpoints(&self) -> Result<Vec<WindowsAudioEndpoint>> {
        let enumerator = self.enumerator()?;
        let collection = unsafe { enumerator.EnumAudioEndpoints(eRender, DEVICE_STATE_ACTIVE) }
            .map_err(win_err)?;
        let count = unsafe { collection.GetCount() }.map_err(win_err)?;

        let mut endpoints = Vec::with_capacity(count as usize);
        for i in 0..count {
            match unsafe { collection.Item(i) } {
                Ok(device) => endpoints.push(WindowsAudioEndpoint { device }),
                Err(e) => debug!("skipping audio endpoint {i}: {e:?}"),
            }
        }
        Ok(endpoints)
    }

    fn process_name(&self, pid: u32) -> Option<String> {
        process_name_from_pid(pid)
    }
}

pub struct WindowsAudioEndpoint {
    device: IMMDevice,
}

impl AudioEndpoint for WindowsAudioEndpoint {
    type Session = WindowsAudioSession;

    fn sessions(&self) -> Result<Vec<WindowsAudioSession>> {
        let manager: IAudioSessionManager2 =
            unsafe { self.device.Activate(CLSCTX_ALL, None) }.map_err(win_err)?;
        let enumerator = unsafe { manager.GetSessionEnumerator() }.map_err(win_err)?;
        let count = unsafe { enumerator.GetCount() }.map_err(win_err)?;

        let mut sessions = Vec::new();
        for i in 0..count {
            let control = match unsafe { enumerator.GetSession(i) } {
                Ok(control) => control,
                Err(e) => {
                    debug!("skipping audio session {i}: {e:?}");
                    continue;
                }
            };
            let control2 = match control.cast::<IAudioSessionControl2>() {
                Ok(control2) => control2,
                Err(e) => {
                    debug!("skipping audio session {i}, no control2: {e:?}");
                    continue;
                }
            };
            let volume = match control.cast::<ISimpleAudioVolume>() {
                Ok(volume) => volume,
                Err(e) => {
                    debug!("skipping audio session {i}, no volume control: {e:?}");
                    continue;
                }
            };
            sessions.push(WindowsAudioSession {
                control,
                control2,
                volume,
            });
        }
        Ok(sessions)
    }
}

pub struct WindowsAudioSession {
    control: IAudioSessionControl,
    control2: IAudioSessionControl2,
    volume: ISimpleAudioVolume,
}

impl AudioSessionControl for WindowsAudioSession {
    fn process_id(&self) -> Result<u32> {
        unsafe { self.control2.GetProcessId() }.map_err(win_err)
    }

    fn display_name(&self) -> Result<String> {
        let name = unsafe {
            let raw = self.control.GetDisplayName().map_err(win_err)?;
            raw.to_string().unwrap_or_default()
        };
        // Resource references ("@%SystemRoot%\...") are useless as labels;
        // report them as empty so callers fall back to the process name.
        if name.starts_with("@%") {
            return Ok(String::new());
        }
        Ok(name)
    }

    fn volume(&self) -> Result<f32> {
        unsafe { self.volume.GetMasterVolume() }.map_err(win_err)
    }

    fn set_volume(&self, volume: f32) -> Result<()> {
        unsafe { self.volume.SetMasterVolume(volume, std::ptr::null()) }.map_err(win_err)
    }
}

pub(crate) fn process_name_from_pid(pid: u32) -> Option<String> {
    if pid == 0 {
        return None;
    }

    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid).ok()?;
        let mut buffer = [0u16; MAX_PATH as usize];
        let mut size = buffer.len() as u32;
        let queried = QueryFullProcessImageNameW(
            handle,
            PROCESS_NAME_WIN32,
            PWSTR(buffer.as_mut_ptr()),
            &mut size,
        );
        let _ = CloseHandle(handle);
        if queried.is_err() {
            return None;
        }

        let full_path = String::from_utf16_lossy(&buffer[..size as usize]);
        full_path
            .rsplit('\\')
            .next()
            .map(|name| name.trim_end_matches(".exe").to_string())
            .filter(|name| !name.is_empty())
    }
}
