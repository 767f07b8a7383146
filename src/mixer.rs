//! Capability traits over the OS audio mixer.
//!
//! The volume router enumerates endpoints and per-application audio sessions
//! fresh on every call; implementations hold no state the router relies on.

use crate::error::Result;

/// Default-endpoint roles, tried in preference order when listing sessions.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EndpointRole {
    Multimedia,
    Console,
}

/// Preference order for resolving the default render endpoint.
pub(crate) const ROLE_PREFERENCE: [EndpointRole; 2] =
    [EndpointRole::Multimedia, EndpointRole::Console];

/// A per-application volume control scoped to one endpoint.
pub trait AudioSessionControl {
    /// Owning process id; zero for system sounds sessions.
    fn process_id(&self) -> Result<u32>;

    /// Session display name as reported by the OS; often empty.
    fn display_name(&self) -> Result<String>;

    /// Scalar volume in `[0, 1]`.
    fn volume(&self) -> Result<f32>;

    fn set_volume(&self, volume: f32) -> Result<()>;
}

/// An OS-level audio output device.
pub trait AudioEndpoint {
    type Session: AudioSessionControl;

    /// Enumerates the audio sessions currently present on this endpoint.
    fn sessions(&self) -> Result<Vec<Self::Session>>;
}

/// Entry point to the OS audio-mixer capability.
pub trait AudioMixer {
    type Endpoint: AudioEndpoint;

    /// The OS-designated default render endpoint for `role`, if one exists.
    fn default_endpoint(&self, role: EndpointRole) -> Result<Option<Self::Endpoint>>;

    /// All active render endpoints.
    fn active_endpoints(&self) -> Result<Vec<Self::Endpoint>>;

    /// Resolves a process id to a process name. `None` when the process
    /// exited between enumeration and lookup.
    fn process_name(&self, pid: u32) -> Option<String>;
}
