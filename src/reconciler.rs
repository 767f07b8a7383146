//! The media-session synchronization and reconciliation engine.
//!
//! One control thread owns the session-manager capability, the current
//! session handle and the last published snapshot. OS notifications hop onto
//! it as messages; bursts are drained and coalesced into a single
//! reconciliation pass, so passes never run in parallel against the shared
//! handle. Artwork is fetched on short-lived worker threads and accepted only
//! when it still belongs to the currently bound session.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::artwork::{self, ArtworkCache};
use crate::error::{ProviderError, Result};
use crate::provider::{EventSink, MediaSession, SessionEvent, SessionManager};
use crate::snapshot::{Artwork, MediaSnapshot};

enum Message {
    Notification(SessionEvent),
    ArtworkReady {
        epoch: u64,
        request: u64,
        result: Result<Vec<u8>>,
    },
    Shutdown,
}

/// Receiving end of the snapshot feed handed to one subscriber.
pub struct SnapshotSubscription {
    rx: Receiver<Arc<MediaSnapshot>>,
}

impl SnapshotSubscription {
    /// Blocks until the next snapshot; `None` once the reconciler is gone.
    pub fn recv(&self) -> Option<Arc<MediaSnapshot>> {
        self.rx.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<Arc<MediaSnapshot>> {
        self.rx.recv_timeout(timeout).ok()
    }

    pub fn try_recv(&self) -> Option<Arc<MediaSnapshot>> {
        self.rx.try_recv().ok()
    }
}

/// Snapshot state shared between the control thread and readers.
struct Published {
    current: Mutex<Arc<MediaSnapshot>>,
    subscribers: Mutex<Vec<Sender<Arc<MediaSnapshot>>>>,
}

impl Published {
    fn new() -> Self {
        Self {
            current: Mutex::new(Arc::new(MediaSnapshot::default())),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    fn publish(&self, snapshot: MediaSnapshot) {
        let snapshot = Arc::new(snapshot);
        *self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Arc::clone(&snapshot);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| tx.send(Arc::clone(&snapshot)).is_ok());
    }

    fn current(&self) -> Arc<MediaSnapshot> {
        Arc::clone(&self.current.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn subscribe(&self) -> SnapshotSubscription {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        SnapshotSubscription { rx }
    }
}

/// Maintains exactly one logical "current media session" and keeps the
/// published [`MediaSnapshot`] consistent with it.
///
/// Constructed once per process and handed to consumers explicitly; dropping
/// it (or calling [`SessionReconciler::shutdown`]) detaches every OS listener
/// and stops reconciliation for good.
pub struct SessionReconciler {
    tx: Sender<Message>,
    published: Arc<Published>,
    worker: Option<JoinHandle<()>>,
}

impl SessionReconciler {
    /// Acquires the session manager through `factory` on a dedicated control
    /// thread, registers the session-changed listener, binds the initial
    /// session and runs one reconciliation pass before returning.
    ///
    /// The factory runs on the control thread so provider handles never have
    /// to cross threads. Failure to acquire the manager (no media subsystem)
    /// is the only error surfaced to the caller.
    pub fn initialize<F, M>(factory: F) -> Result<Self>
    where
        F: FnOnce() -> Result<M> + Send + 'static,
        M: SessionManager + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let published = Arc::new(Published::new());
        let (ready_tx, ready_rx) = mpsc::channel();

        let pipeline_tx = tx.clone();
        let pipeline_published = Arc::clone(&published);
        let worker = thread::spawn(move || {
            let manager = match factory() {
                Ok(manager) => manager,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            let mut pipeline = Pipeline::new(manager, pipeline_tx, rx, pipeline_published);
            match pipeline.bind() {
                Ok(()) => {
                    let _ = ready_tx.send(Ok(()));
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            }
            pipeline.run();
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                tx,
                published,
                worker: Some(worker),
            }),
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => {
                let _ = worker.join();
                Err(ProviderError::Unavailable(
                    "reconciler control thread exited during initialization".into(),
                ))
            }
        }
    }

    /// The last published snapshot.
    pub fn current(&self) -> Arc<MediaSnapshot> {
        self.published.current()
    }

    /// Registers a subscriber for every snapshot published from now on.
    pub fn subscribe(&self) -> SnapshotSubscription {
        self.published.subscribe()
    }

    /// Detaches all OS listeners and stops the control thread.
    pub fn shutdown(mut self) {
        self.shutdown_inner();
    }

    fn shutdown_inner(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.tx.send(Message::Shutdown);
            let _ = worker.join();
        }
    }
}

impl Drop for SessionReconciler {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}

/// Everything the control thread owns.
struct Pipeline<M: SessionManager> {
    manager: M,
    session: Option<M::Session>,
    /// Bumped whenever the bound session changes; artwork results from an
    /// older epoch are stale and dropped.
    epoch: u64,
    next_request: u64,
    latest_request: Option<u64>,
    cache: ArtworkCache,
    last: Option<MediaSnapshot>,
    tx: Sender<Message>,
    rx: Receiver<Message>,
    published: Arc<Published>,
}

#[derive(Default)]
struct Batch {
    session_changed: bool,
    properties_changed: bool,
    playback_changed: bool,
    artwork: Vec<(u64, u64, Result<Vec<u8>>)>,
    shutdown: bool,
}

impl Batch {
    fn absorb(&mut self, message: Message) {
        match message {
            Message::Notification(SessionEvent::SessionChanged) => self.session_changed = true,
            Message::Notification(SessionEvent::MediaPropertiesChanged) => {
                self.properties_changed = true;
            }
            Message::Notification(SessionEvent::PlaybackInfoChanged) => {
                self.playback_changed = true;
            }
            Message::ArtworkReady {
                epoch,
                request,
                result,
            } => self.artwork.push((epoch, request, result)),
            Message::Shutdown => self.shutdown = true,
        }
    }
}

impl<M: SessionManager> Pipeline<M> {
    fn new(manager: M, tx: Sender<Message>, rx: Receiver<Message>, published: Arc<Published>) -> Self {
        Self {
            manager,
            session: None,
            epoch: 0,
            next_request: 1,
            latest_request: None,
            cache: ArtworkCache::new(),
            last: None,
            tx,
            rx,
            published,
        }
    }

    fn bind(&mut self) -> Result<()> {
        let sink = self.sink();
        self.manager.attach_session_changed(sink)?;
        self.acquire_session();
        self.reconcile(true);
        Ok(())
    }

    fn run(mut self) {
        loop {
            let first = match self.rx.recv() {
                Ok(message) => message,
                Err(_) => break,
            };

            // Drain whatever else queued up so a notification burst becomes
            // one pass instead of several.
            let mut batch = Batch::default();
            batch.absorb(first);
            while let Ok(more) = self.rx.try_recv() {
                batch.absorb(more);
            }

            if batch.shutdown {
                break;
            }

            if batch.session_changed {
                debug!("active session changed, rebinding");
                self.acquire_session();
            }
            if batch.session_changed || batch.properties_changed || batch.playback_changed {
                self.reconcile(batch.session_changed || batch.properties_changed);
            }
            for (epoch, request, result) in batch.artwork {
                self.finish_artwork(epoch, request, result);
            }
        }

        self.teardown();
    }

    fn sink(&self) -> EventSink {
        let tx = self.tx.clone();
        EventSink::new(move |event| {
            let _ = tx.send(Message::Notification(event));
        })
    }

    /// Detaches the old session's listeners, resolves the new active session
    /// and attaches to it. Always runs in this order so no registration
    /// outlives its handle.
    fn acquire_session(&mut self) {
        if let Some(mut old) = self.session.take() {
            old.detach_listeners();
        }
        self.epoch += 1;
        self.latest_request = None;

        match self.manager.current_session() {
            Ok(Some(mut session)) => {
                if let Err(e) = session.attach_listeners(self.sink()) {
                    warn!("failed to attach session listeners: {e}");
                }
                self.session = Some(session);
            }
            Ok(None) => trace!("no active media session"),
            Err(e) => warn!("session lookup failed: {e}"),
        }
    }

    /// One reconciliation pass. Each boundary call is independently
    /// fault-tolerant: a failure skips that contribution and the next
    /// notification is the recovery path.
    fn reconcile(&mut self, refresh_artwork: bool) {
        let session = match self.session.as_ref() {
            Some(session) => session,
            None => {
                self.publish_empty();
                return;
            }
        };

        let mut candidate = self.last.clone().unwrap_or_default();
        let mut artwork_source = None;
        let mut fetched_any = false;

        match session.media_properties() {
            Ok(props) => {
                candidate.title = props.title;
                candidate.artist = props.artist;
                candidate.album = props.album;
                artwork_source = props.artwork;
                fetched_any = true;
            }
            Err(e) => warn!("media properties fetch failed, keeping previous text: {e}"),
        }

        match session.playback_status() {
            Ok(status) => {
                candidate.status = status;
                fetched_any = true;
            }
            Err(e) => warn!("playback status fetch failed, keeping previous status: {e}"),
        }

        if !fetched_any {
            return;
        }

        let text_changed = match &self.last {
            Some(last) => last.text_differs(&candidate),
            None => true,
        };
        if text_changed {
            self.publish(candidate);
        }

        // Artwork is only re-verified when properties may have changed;
        // playback-status-only events never trigger a refetch.
        if refresh_artwork {
            if let Some(source) = artwork_source {
                self.spawn_artwork_fetch(source);
            }
        }
    }

    fn spawn_artwork_fetch(&mut self, mut source: <M::Session as MediaSession>::Artwork) {
        let request = self.next_request;
        self.next_request = self.next_request.wrapping_add(1);
        self.latest_request = Some(request);

        let epoch = self.epoch;
        let tx = self.tx.clone();
        thread::spawn(move || {
            let result = artwork::fetch_bytes(&mut source);
            let _ = tx.send(Message::ArtworkReady {
                epoch,
                request,
                result,
            });
        });
    }

    fn finish_artwork(&mut self, epoch: u64, request: u64, result: Result<Vec<u8>>) {
        if epoch != self.epoch {
            trace!("discarding artwork fetched for a superseded session");
            return;
        }
        if self.latest_request != Some(request) {
            trace!("discarding superseded artwork request");
            return;
        }
        self.latest_request = None;

        let bytes = match result {
            Ok(bytes) if !bytes.is_empty() => bytes,
            Ok(_) => {
                trace!("session reported an empty artwork stream");
                return;
            }
            Err(e) => {
                warn!("artwork fetch failed: {e}");
                return;
            }
        };

        let Some(hash) = self.cache.admit(&bytes) else {
            return;
        };

        let mut snapshot = self.last.clone().unwrap_or_default();
        snapshot.artwork = Some(Artwork { hash, bytes });
        self.publish(snapshot);
    }

    fn publish(&mut self, snapshot: MediaSnapshot) {
        trace!(
            title = %snapshot.title,
            status = snapshot.status.as_str(),
            has_artwork = snapshot.artwork.is_some(),
            "publishing snapshot"
        );
        self.last = Some(snapshot.clone());
        self.published.publish(snapshot);
    }

    fn publish_empty(&mut self) {
        let empty = MediaSnapshot::empty();
        if self.last.as_ref().is_some_and(|last| *last == empty) {
            return;
        }
        self.cache.reset();
        self.publish(empty);
    }

    fn teardown(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.detach_listeners();
        }
        self.manager.detach_session_changed();
        debug!("reconciler disposed");
    }
}
