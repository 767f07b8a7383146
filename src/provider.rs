//! Capability traits over "some OS media/session provider".
//!
//! The reconciler and transport controller are written against these traits;
//! `platform::windows` implements them over SMTC. Calls that cross the OS/IPC
//! boundary may block the calling thread and may fail transiently — callers
//! treat failures per the skip-and-continue policy.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::snapshot::PlaybackStatus;

/// Notification kinds a provider can deliver.
///
/// Providers raise these from arbitrary OS callback contexts; the sink hops
/// them onto the reconciler's control thread.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SessionEvent {
    SessionChanged,
    MediaPropertiesChanged,
    PlaybackInfoChanged,
}

/// Cross-thread delivery point for [`SessionEvent`]s.
///
/// Cheap to clone; providers hold one per registered callback. Delivery after
/// the receiving side has shut down is a silent no-op.
#[derive(Clone)]
pub struct EventSink {
    notify: Arc<dyn Fn(SessionEvent) + Send + Sync>,
}

impl EventSink {
    pub fn new(notify: impl Fn(SessionEvent) + Send + Sync + 'static) -> Self {
        Self {
            notify: Arc::new(notify),
        }
    }

    pub fn notify(&self, event: SessionEvent) {
        (self.notify)(event);
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventSink")
    }
}

/// Metadata reported by a session. Null OS-side fields arrive as empty
/// strings.
#[derive(Debug)]
pub struct MediaProperties<A> {
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Present when the session reports artwork; the stream is read lazily.
    pub artwork: Option<A>,
}

/// A readable artwork stream. Read in fixed-size chunks; a short read ends
/// the stream.
pub trait ArtworkSource {
    /// Reads up to `buf.len()` bytes, returning how many were read. Zero
    /// means end of stream.
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize>;
}

/// The OS's handle to one media-playing application.
///
/// Owned exclusively by the reconciler's control thread. Listeners must be
/// detached before the handle is dropped or replaced; leaking a registration
/// risks stale-session events.
pub trait MediaSession {
    type Artwork: ArtworkSource + Send + 'static;

    /// Fetches title/artist/album and the artwork stream, if any. Suspends
    /// across the OS boundary.
    fn media_properties(&self) -> Result<MediaProperties<Self::Artwork>>;

    fn playback_status(&self) -> Result<PlaybackStatus>;

    fn attach_listeners(&mut self, sink: EventSink) -> Result<()>;
    fn detach_listeners(&mut self);

    fn skip_next(&self) -> Result<bool>;
    fn skip_previous(&self) -> Result<bool>;
    fn play(&self) -> Result<bool>;
    fn pause(&self) -> Result<bool>;
}

/// The OS facility tracking which session is currently active system-wide.
pub trait SessionManager {
    type Session: MediaSession;

    /// Resolves the currently active session, if any. `Ok(None)` is the
    /// normal "nothing is playing anywhere" answer.
    fn current_session(&self) -> Result<Option<Self::Session>>;

    fn attach_session_changed(&mut self, sink: EventSink) -> Result<()>;
    fn detach_session_changed(&mut self);
}
