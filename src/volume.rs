//! Per-application volume routing.
//!
//! Every call enumerates the mixer fresh; there is no cross-call state.
//! Failures at any level of the enumeration skip the offending item and
//! continue — a volume call never propagates an error to the caller.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::mixer::{AudioEndpoint, AudioMixer, AudioSessionControl, ROLE_PREFERENCE};
use crate::settings::WidgetSettings;

/// One selectable per-application audio session.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AudioSessionDescriptor {
    pub process_name: String,
    pub display_name: String,
}

/// Resolves a configured process name to its audio sessions and gets/sets
/// their volume.
pub struct VolumeRouter<M: AudioMixer> {
    mixer: M,
}

impl<M: AudioMixer> VolumeRouter<M> {
    pub fn new(mixer: M) -> Self {
        Self { mixer }
    }

    /// Volume of the first session owned by `process_name`, in `[0, 1]`.
    ///
    /// Returns full volume when the target is unset, nothing matches, or
    /// enumeration fails. An unset target short-circuits without touching
    /// the mixer.
    pub fn volume(&self, process_name: Option<&str>) -> f32 {
        let Some(target) = normalize_target(process_name) else {
            return 1.0;
        };

        let endpoints = match self.mixer.active_endpoints() {
            Ok(endpoints) => endpoints,
            Err(e) => {
                warn!("audio endpoint enumeration failed: {e}");
                return 1.0;
            }
        };

        for endpoint in endpoints {
            let sessions = match endpoint.sessions() {
                Ok(sessions) => sessions,
                Err(e) => {
                    debug!("skipping endpoint, session enumeration failed: {e}");
                    continue;
                }
            };
            for session in sessions {
                if !self.session_owned_by(&session, target) {
                    continue;
                }
                match session.volume() {
                    Ok(v) => return v,
                    Err(e) => debug!("skipping session, volume read failed: {e}"),
                }
            }
        }

        1.0
    }

    /// Sets the volume of every session owned by `process_name`.
    ///
    /// The value is clamped to `[0, 1]`. A process may legitimately own one
    /// audio session per endpoint; all of them are written for consistency.
    /// No-op when the target is unset.
    pub fn set_volume(&self, volume: f32, process_name: Option<&str>) {
        let Some(target) = normalize_target(process_name) else {
            return;
        };
        let volume = volume.clamp(0.0, 1.0);

        let endpoints = match self.mixer.active_endpoints() {
            Ok(endpoints) => endpoints,
            Err(e) => {
                warn!("audio endpoint enumeration failed: {e}");
                return;
            }
        };

        for endpoint in endpoints {
            let sessions = match endpoint.sessions() {
                Ok(sessions) => sessions,
                Err(e) => {
                    debug!("skipping endpoint, session enumeration failed: {e}");
                    continue;
                }
            };
            for session in sessions {
                if !self.session_owned_by(&session, target) {
                    continue;
                }
                if let Err(e) = session.set_volume(volume) {
                    debug!("volume write failed for '{target}': {e}");
                }
            }
        }
    }

    /// Enumerates candidate sessions for the selection UI.
    ///
    /// Prefers the default render endpoints (multimedia role, then console)
    /// and falls back to scanning every active endpoint only when the
    /// defaults yield nothing. Deduplicated by process name, sorted by
    /// display name case-insensitively.
    pub fn audio_sessions(&self) -> Vec<AudioSessionDescriptor> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for role in ROLE_PREFERENCE {
            match self.mixer.default_endpoint(role) {
                Ok(Some(endpoint)) => self.collect_sessions(&endpoint, &mut seen, &mut out),
                Ok(None) => {}
                Err(e) => debug!("no default endpoint for {role:?}: {e}"),
            }
            if !out.is_empty() {
                break;
            }
        }

        if out.is_empty() {
            match self.mixer.active_endpoints() {
                Ok(endpoints) => {
                    for endpoint in endpoints {
                        self.collect_sessions(&endpoint, &mut seen, &mut out);
                    }
                }
                Err(e) => warn!("audio endpoint enumeration failed: {e}"),
            }
        }

        out.sort_by(|a, b| {
            a.display_name
                .to_lowercase()
                .cmp(&b.display_name.to_lowercase())
        });
        out
    }

    /// Reads the configured target process from settings and returns its
    /// volume. The settings file is re-read on every call so external edits
    /// take effect immediately.
    pub fn configured_volume(&self) -> f32 {
        let settings = WidgetSettings::load().unwrap_or_default();
        self.volume(settings.volume_target_process.as_deref())
    }

    /// Settings-backed counterpart of [`VolumeRouter::set_volume`].
    pub fn set_configured_volume(&self, volume: f32) {
        let settings = WidgetSettings::load().unwrap_or_default();
        self.set_volume(volume, settings.volume_target_process.as_deref());
    }

    fn collect_sessions(
        &self,
        endpoint: &M::Endpoint,
        seen: &mut HashSet<String>,
        out: &mut Vec<AudioSessionDescriptor>,
    ) {
        let sessions = match endpoint.sessions() {
            Ok(sessions) => sessions,
            Err(e) => {
                debug!("skipping endpoint, session enumeration failed: {e}");
                return;
            }
        };

        for session in sessions {
            let pid = match session.process_id() {
                Ok(0) => continue,
                Ok(pid) => pid,
                Err(e) => {
                    debug!("skipping session, pid read failed: {e}");
                    continue;
                }
            };
            let Some(process_name) = self.mixer.process_name(pid) else {
                continue;
            };
            if process_name.is_empty() || !seen.insert(process_name.to_lowercase()) {
                continue;
            }

            let display_name = match session.display_name() {
                Ok(name) if !name.trim().is_empty() => name,
                _ => process_name.clone(),
            };
            out.push(AudioSessionDescriptor {
                process_name,
                display_name,
            });
        }
    }

    fn session_owned_by(
        &self,
        session: &<M::Endpoint as AudioEndpoint>::Session,
        target: &str,
    ) -> bool {
        let pid = match session.process_id() {
            Ok(pid) => pid,
            Err(e) => {
                debug!("skipping session, pid read failed: {e}");
                return false;
            }
        };
        match self.mixer.process_name(pid) {
            Some(name) => name.eq_ignore_ascii_case(target),
            None => false,
        }
    }
}

fn normalize_target(process_name: Option<&str>) -> Option<&str> {
    let trimmed = process_name?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
