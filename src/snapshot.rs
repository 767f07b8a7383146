/// Playback state of the active media session, reduced to the four values
/// the rest of the system acts on.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum PlaybackStatus {
    Playing,
    Paused,
    Stopped,
    #[default]
    Unknown,
}

impl PlaybackStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PlaybackStatus::Playing => "Playing",
            PlaybackStatus::Paused => "Paused",
            PlaybackStatus::Stopped => "Stopped",
            PlaybackStatus::Unknown => "Unknown",
        }
    }
}

/// Artwork bytes together with the content digest used for change detection.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Artwork {
    /// Lowercase hex md5 of `bytes`.
    pub hash: String,
    pub bytes: Vec<u8>,
}

/// Immutable view of "what is currently playing".
///
/// Snapshots are created by the reconciler and superseded, never mutated; the
/// current one is shared behind an `Arc` with a single writer and any number
/// of readers. A new snapshot is only published when at least one field
/// differs from the previous one.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct MediaSnapshot {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub status: PlaybackStatus,
    pub artwork: Option<Artwork>,
}

impl MediaSnapshot {
    /// The value published when no media session is active.
    pub fn empty() -> Self {
        Self {
            status: PlaybackStatus::Stopped,
            ..Self::default()
        }
    }

    pub fn artwork_hash(&self) -> Option<&str> {
        self.artwork.as_ref().map(|a| a.hash.as_str())
    }

    /// Whether the fields compared during a reconciliation pass differ.
    ///
    /// Artist intentionally rides along without triggering a publish on its
    /// own; artwork changes are detected separately by hash.
    pub(crate) fn text_differs(&self, other: &Self) -> bool {
        self.album != other.album || self.title != other.title || self.status != other.status
    }
}
