use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{self, Receiver};
use dashmap::DashMap;
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};

use crate::api::SynthError;
use crate::generator::{CancelToken, VolumeSynthesizer};
use crate::volume::{Dims, Volume};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VolumeKey {
    pub case_id: String,
    pub dims: Dims,
}

impl VolumeKey {
    pub fn new(case_id: &str, dims: Dims) -> Self {
        Self { case_id: case_id.to_string(), dims }
    }
}

/// Built volumes keyed by case and resolution.
#[derive(Default)]
pub struct VolumeCache {
    volumes: DashMap<VolumeKey, Arc<Volume>>,
}

impl VolumeCache {
    pub fn new() -> Self {
        Self { volumes: DashMap::new() }
    }

    pub fn get(&self, key: &VolumeKey) -> Option<Arc<Volume>> {
        self.volumes.get(key).map(|v| Arc::clone(v.value()))
    }

    pub fn insert(&self, key: VolumeKey, volume: Arc<Volume>) {
        self.volumes.insert(key, volume);
    }

    pub fn remove(&self, key: &VolumeKey) -> Option<Arc<Volume>> {
        self.volumes.remove(key).map(|(_, volume)| volume)
    }

    /// Returns the cached volume or builds it. Concurrent builders of the
    /// same key all get the first volume inserted.
    pub fn get_or_generate(
        &self,
        synth: &VolumeSynthesizer,
        case_id: &str,
        dims: Dims,
    ) -> Result<Arc<Volume>, SynthError> {
        let key = VolumeKey::new(case_id, Dims::new(dims.width, dims.height, dims.depth));
        if let Some(volume) = self.get(&key) {
            debug!("Volume cache hit for '{}'", case_id);
            return Ok(volume);
        }
        let volume = Arc::new(synth.generate(case_id, key.dims.width, key.dims.height, key.dims.depth)?);
        Ok(Arc::clone(self.volumes.entry(key).or_insert(volume).value()))
    }

    pub fn clear(&self) {
        self.volumes.clear();
    }

    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }
}

type BuildOutcome = Result<Arc<Volume>, SynthError>;

/// Handle to a build started by [`VolumeSlot::request`].
pub struct BuildTicket {
    generation: u64,
    receiver: Receiver<BuildOutcome>,
}

impl BuildTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Blocks until the build finishes. A build thread that died without
    /// reporting counts as cancelled.
    pub fn wait(self) -> BuildOutcome {
        self.receiver.recv().unwrap_or(Err(SynthError::Cancelled))
    }

    pub fn try_result(&self) -> Option<BuildOutcome> {
        self.receiver.try_recv().ok()
    }
}

/// The volume a viewer is currently showing. New volumes are built off to the
/// side and swapped in on completion, only if no newer request was made.
#[derive(Default)]
pub struct VolumeSlot {
    current: Arc<RwLock<Option<Arc<Volume>>>>,
    latest: Arc<AtomicU64>,
    in_flight: Mutex<Option<CancelToken>>,
}

impl VolumeSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Arc<Volume>> {
        self.current.read().clone()
    }

    /// Cancels any in-flight build and starts a new one on its own thread.
    pub fn request(
        &self,
        synth: Arc<VolumeSynthesizer>,
        case_id: &str,
        dims: Dims,
    ) -> Result<BuildTicket, SynthError> {
        let generation = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancelToken::new();
        if let Some(previous) = self.in_flight.lock().replace(cancel.clone()) {
            previous.cancel();
        }

        let (sender, receiver) = channel::bounded(1);
        let current = Arc::clone(&self.current);
        let latest = Arc::clone(&self.latest);
        let case_id = case_id.to_string();
        thread::Builder::new()
            .name(format!("volume_build_{}", generation))
            .spawn(move || {
                let outcome = synth
                    .generate_with_cancel(&case_id, dims.width, dims.height, dims.depth, &cancel)
                    .map(Arc::new);
                match &outcome {
                    Ok(volume) => {
                        let mut slot = current.write();
                        if latest.load(Ordering::SeqCst) == generation {
                            *slot = Some(Arc::clone(volume));
                            info!("Displaying '{}' (request {})", case_id, generation);
                        } else {
                            debug!("Discarding superseded build of '{}' (request {})", case_id, generation);
                        }
                    }
                    Err(SynthError::Cancelled) => debug!("Build of '{}' cancelled", case_id),
                    Err(e) => warn!("Build of '{}' failed, keeping the previous volume: {}", case_id, e),
                }
                let _ = sender.send(outcome);
            })?;

        Ok(BuildTicket { generation, receiver })
    }

    /// Cancels the in-flight build, if any. The displayed volume is kept.
    pub fn cancel_pending(&self) {
        if let Some(token) = self.in_flight.lock().take() {
            token.cancel();
        }
    }
}
