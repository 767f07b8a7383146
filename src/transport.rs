//! Transport commands against the active media session.
//!
//! Each command resolves the current session fresh rather than caching a
//! handle, so a player switch between two clicks is picked up automatically.
//! Failures are reported as diagnostics and swallowed; the caller's UI stays
//! responsive even when a command silently did nothing.

use tracing::{debug, warn};

use crate::error::Result;
use crate::provider::{MediaSession, SessionManager};
use crate::snapshot::PlaybackStatus;

pub struct TransportController<F> {
    request_manager: F,
}

impl<F, M> TransportController<F>
where
    F: Fn() -> Result<M>,
    M: SessionManager,
{
    pub fn new(request_manager: F) -> Self {
        Self { request_manager }
    }

    pub fn next(&self) {
        self.command("next", |session| session.skip_next());
    }

    pub fn previous(&self) {
        self.command("previous", |session| session.skip_previous());
    }

    /// Pauses when the session reads as playing, plays otherwise — including
    /// when the status is paused, unknown, or unreadable.
    pub fn toggle_play_pause(&self) {
        let Some(session) = self.resolve_session("play/pause") else {
            return;
        };

        let playing = match session.playback_status() {
            Ok(status) => status == PlaybackStatus::Playing,
            Err(e) => {
                debug!("play/pause: status read failed, assuming not playing: {e}");
                false
            }
        };

        if playing {
            report("pause", session.pause());
        } else {
            report("play", session.play());
        }
    }

    fn command(&self, name: &str, action: impl FnOnce(&M::Session) -> Result<bool>) {
        let Some(session) = self.resolve_session(name) else {
            return;
        };
        report(name, action(&session));
    }

    fn resolve_session(&self, name: &str) -> Option<M::Session> {
        let manager = match (self.request_manager)() {
            Ok(manager) => manager,
            Err(e) => {
                warn!("{name}: media subsystem unavailable: {e}");
                return None;
            }
        };
        match manager.current_session() {
            Ok(Some(session)) => Some(session),
            Ok(None) => {
                debug!("{name}: no active media session");
                None
            }
            Err(e) => {
                warn!("{name}: session lookup failed: {e}");
                None
            }
        }
    }
}

fn report(name: &str, result: Result<bool>) {
    match result {
        Ok(true) => debug!("{name} command accepted"),
        Ok(false) => warn!("{name} command was rejected by the media session"),
        Err(e) => warn!("{name} failed: {e}"),
    }
}
