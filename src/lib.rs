//! Media-session synchronization core for a desktop now-playing widget.
//!
//! The [`SessionReconciler`] mirrors the OS's active media session into an
//! immutable [`MediaSnapshot`] that UI layers subscribe to; the
//! [`TransportController`] and [`VolumeRouter`] carry commands the other way.
//! OS specifics live behind the capability traits in [`provider`] and
//! [`mixer`]; on Windows the [`platform::windows`] module implements them
//! over SMTC and WASAPI.

pub mod artwork;
pub mod error;
pub mod mixer;
pub mod platform;
pub mod provider;
pub mod reconciler;
pub mod settings;
pub mod snapshot;
pub mod transport;
pub mod volume;

pub use error::ProviderError;
pub use mixer::{AudioEndpoint, AudioMixer, AudioSessionControl, EndpointRole};
pub use provider::{
    ArtworkSource, EventSink, MediaProperties, MediaSession, SessionEvent, SessionManager,
};
pub use reconciler::{SessionReconciler, SnapshotSubscription};
pub use settings::WidgetSettings;
pub use snapshot::{Artwork, MediaSnapshot, PlaybackStatus};
pub use transport::TransportController;
pub use volume::{AudioSessionDescriptor, VolumeRouter};
