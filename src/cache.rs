//! URL-keyed resource cache.
//!
//! [`ResourceCache::load_res`] runs the loader strategy for a resource kind at
//! most once per URL and records the outcome, success or failure, as a cache
//! entry. [`ResourceCache::get_res`] hands out what was recorded: textures are
//! shared (or cloned on request), model containers are instantiated into a
//! fresh [`Entity`] on every call.

use std::{cell::RefCell, collections::HashMap, fmt, rc::Rc};

use futures::channel::oneshot;
use instant::{Duration, Instant};

use crate::{
    config::CachePolicy,
    data_structures::{
        scene_graph::{Entity, MaterialSharing, ModelContainer},
        texture::{CubeTexture, Dispose, Texture},
    },
    resources::{ResourceError, ResourceKind, ResourceLoader, TransferProgress},
};

/// A loaded resource as stored in the cache.
#[derive(Clone, Debug)]
pub enum ResourceData {
    Texture(Rc<Texture>),
    CubeTexture(Rc<CubeTexture>),
    Model(Rc<ModelContainer>),
}

impl ResourceData {
    fn dispose(&self) {
        match self {
            ResourceData::Texture(texture) => texture.dispose(),
            ResourceData::CubeTexture(texture) => texture.dispose(),
            ResourceData::Model(_) => {}
        }
    }
}

/// What [`ResourceCache::get_res`] returns.
#[derive(Debug)]
pub enum ResourceHandle {
    Texture(Rc<Texture>),
    CubeTexture(Rc<CubeTexture>),
    /// A fresh instantiation of a model container.
    Entity(Entity),
}

impl ResourceHandle {
    pub fn into_texture(self) -> Option<Rc<Texture>> {
        match self {
            ResourceHandle::Texture(texture) => Some(texture),
            _ => None,
        }
    }

    pub fn into_cube_texture(self) -> Option<Rc<CubeTexture>> {
        match self {
            ResourceHandle::CubeTexture(texture) => Some(texture),
            _ => None,
        }
    }

    pub fn into_entity(self) -> Option<Entity> {
        match self {
            ResourceHandle::Entity(entity) => Some(entity),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryStatus {
    /// A load for this URL is in flight.
    Pending,
    Loaded,
    Failed,
}

/// The recorded outcome of one load attempt.
struct CacheEntry {
    kind: ResourceKind,
    error: Option<anyhow::Error>,
    data: Option<ResourceData>,
    transfer_size: Option<u64>,
    elapsed: Duration,
}

enum Slot {
    Pending {
        kind: ResourceKind,
        waiters: Vec<oneshot::Sender<()>>,
    },
    Ready(CacheEntry),
}

impl Slot {
    fn kind(&self) -> &ResourceKind {
        match self {
            Slot::Pending { kind, .. } => kind,
            Slot::Ready(entry) => &entry.kind,
        }
    }
}

pub struct ResourceCache<L> {
    loader: L,
    policy: CachePolicy,
    sharing: MaterialSharing,
    entries: RefCell<HashMap<String, Slot>>,
}

impl<L> fmt::Debug for ResourceCache<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.borrow();
        let mut urls: Vec<&String> = entries.keys().collect();
        urls.sort();
        f.debug_struct("ResourceCache")
            .field("policy", &self.policy)
            .field("sharing", &self.sharing)
            .field("urls", &urls)
            .finish()
    }
}

impl<L: ResourceLoader> ResourceCache<L> {
    pub fn new(loader: L, policy: CachePolicy, sharing: MaterialSharing) -> Self {
        Self {
            loader,
            policy,
            sharing,
            entries: RefCell::new(HashMap::new()),
        }
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Load `url` as `kind` unless it is already cached.
    ///
    /// A URL with a recorded entry is not fetched again (failed entries are
    /// retried only when [`CachePolicy::retry_failed`] is set). A URL whose load
    /// is in flight is not fetched twice either: the call waits for the
    /// running attempt to be recorded. In both cases `on_progress` is never
    /// called. Otherwise `on_progress` receives fractions in `[0, 1]` while the
    /// transfer is measurable and exactly `1.0` once the outcome is recorded.
    ///
    /// Failures never surface here; they are logged and recorded, and show up
    /// as `None` from [`get_res`](Self::get_res).
    pub async fn load_res(
        &self,
        kind: impl Into<ResourceKind>,
        url: &str,
        mut on_progress: Option<&mut dyn FnMut(f64)>,
    ) {
        let kind = kind.into();
        let waiting = {
            let mut entries = self.entries.borrow_mut();
            match entries.get_mut(url) {
                Some(Slot::Ready(entry)) if !(self.policy.retry_failed && entry.error.is_some()) => {
                    log::trace!("{url} already cached");
                    return;
                }
                Some(Slot::Pending { waiters, .. }) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    Some(rx)
                }
                _ => {
                    entries.insert(
                        url.to_string(),
                        Slot::Pending {
                            kind: kind.clone(),
                            waiters: Vec::new(),
                        },
                    );
                    None
                }
            }
        };
        if let Some(rx) = waiting {
            log::debug!("{url} is already loading, waiting for it");
            // A dropped sender means the first attempt was abandoned.
            let _ = rx.await;
            return;
        }

        let mut in_flight = InFlight {
            entries: &self.entries,
            url,
            armed: true,
        };
        let start = Instant::now();
        let mut transfer_size = None;
        let result = {
            let mut report = |progress: TransferProgress| {
                transfer_size = Some(progress.loaded);
                if let (Some(fraction), Some(on_progress)) = (progress.fraction(), on_progress.as_deref_mut()) {
                    on_progress(fraction);
                }
            };
            self.attempt(&kind, url, &mut report).await
        };
        let elapsed = start.elapsed();

        let (data, error) = match result {
            Ok(data) => {
                log::info!("loaded {kind} {url} in {elapsed:?}");
                (Some(data), None)
            }
            Err(err) => {
                log::error!("failed to load {kind} {url}: {err:#}");
                (None, Some(err))
            }
        };
        in_flight.record(CacheEntry {
            kind,
            error,
            data,
            transfer_size,
            elapsed,
        });

        if let Some(on_progress) = on_progress {
            on_progress(1.0);
        }
    }

    async fn attempt(
        &self,
        kind: &ResourceKind,
        url: &str,
        report: &mut dyn FnMut(TransferProgress),
    ) -> anyhow::Result<ResourceData> {
        let data = match kind {
            ResourceKind::Texture => {
                ResourceData::Texture(Rc::new(self.loader.load_texture(url, report).await?))
            }
            ResourceKind::CubeTexture => {
                ResourceData::CubeTexture(Rc::new(self.loader.load_cube_texture(url, report).await?))
            }
            ResourceKind::EquirectangularCubeTexture => ResourceData::CubeTexture(Rc::new(
                self.loader
                    .load_equirectangular_cube_texture(url, report)
                    .await?,
            )),
            ResourceKind::Model => ResourceData::Model(Rc::new(self.loader.load_model(url, report).await?)),
            ResourceKind::Unsupported(name) => {
                return Err(ResourceError::UnsupportedKind(name.clone()).into());
            }
        };
        Ok(data)
    }
}

impl<L> ResourceCache<L> {
    /// The resource recorded for `url`, or `None` if it never loaded
    /// successfully.
    ///
    /// Model containers are instantiated anew on every call. Textures are
    /// shared unless `clone` is set.
    pub fn get_res(&self, url: &str, clone: bool) -> Option<ResourceHandle> {
        let entries = self.entries.borrow();
        let Some(Slot::Ready(entry)) = entries.get(url) else {
            return None;
        };
        Some(match entry.data.as_ref()? {
            ResourceData::Model(container) => ResourceHandle::Entity(container.instantiate(self.sharing)),
            ResourceData::Texture(texture) if clone => ResourceHandle::Texture(Rc::new(Texture::clone(texture))),
            ResourceData::Texture(texture) => ResourceHandle::Texture(Rc::clone(texture)),
            ResourceData::CubeTexture(texture) if clone => {
                ResourceHandle::CubeTexture(Rc::new(CubeTexture::clone(texture)))
            }
            ResourceData::CubeTexture(texture) => ResourceHandle::CubeTexture(Rc::clone(texture)),
        })
    }

    /// The model container recorded for `url`, without instantiating it.
    pub fn container(&self, url: &str) -> Option<Rc<ModelContainer>> {
        match self.entries.borrow().get(url)? {
            Slot::Ready(CacheEntry {
                data: Some(ResourceData::Model(container)),
                ..
            }) => Some(Rc::clone(container)),
            _ => None,
        }
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.borrow().contains_key(url)
    }

    pub fn status(&self, url: &str) -> Option<EntryStatus> {
        Some(match self.entries.borrow().get(url)? {
            Slot::Pending { .. } => EntryStatus::Pending,
            Slot::Ready(entry) if entry.error.is_some() => EntryStatus::Failed,
            Slot::Ready(_) => EntryStatus::Loaded,
        })
    }

    /// The recorded failure for `url`, with its cause chain.
    pub fn error(&self, url: &str) -> Option<String> {
        match self.entries.borrow().get(url)? {
            Slot::Ready(entry) => entry.error.as_ref().map(|err| format!("{err:#}")),
            Slot::Pending { .. } => None,
        }
    }

    /// Bytes received for `url` as last reported by the loader.
    pub fn transfer_size(&self, url: &str) -> Option<u64> {
        match self.entries.borrow().get(url)? {
            Slot::Ready(entry) => entry.transfer_size,
            Slot::Pending { .. } => None,
        }
    }

    pub fn load_time(&self, url: &str) -> Option<Duration> {
        match self.entries.borrow().get(url)? {
            Slot::Ready(entry) => Some(entry.elapsed),
            Slot::Pending { .. } => None,
        }
    }

    pub fn kind(&self, url: &str) -> Option<ResourceKind> {
        self.entries.borrow().get(url).map(|slot| slot.kind().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release every entry and dispose the GPU side of every texture.
    ///
    /// Callers waiting on an in-flight load are released. The cache can be
    /// used again afterwards.
    pub fn destroy(&self) {
        let entries = std::mem::take(&mut *self.entries.borrow_mut());
        if entries.is_empty() {
            return;
        }
        log::debug!("destroying resource cache with {} entries", entries.len());
        for slot in entries.into_values() {
            if let Slot::Ready(CacheEntry { data: Some(data), .. }) = slot {
                data.dispose();
            }
        }
    }
}

impl<L> Drop for ResourceCache<L> {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Owns the pending slot of a running load. Dropping it without recording
/// removes the slot so a later call can try again.
struct InFlight<'a> {
    entries: &'a RefCell<HashMap<String, Slot>>,
    url: &'a str,
    armed: bool,
}

impl InFlight<'_> {
    fn record(&mut self, entry: CacheEntry) {
        self.armed = false;
        let previous = self.entries.borrow_mut().insert(self.url.to_string(), Slot::Ready(entry));
        wake(previous);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut entries = self.entries.borrow_mut();
        let previous = match entries.get(self.url) {
            Some(Slot::Pending { .. }) => entries.remove(self.url),
            _ => None,
        };
        drop(entries);
        log::warn!("load of {} was abandoned before completing", self.url);
        wake(previous);
    }
}

fn wake(slot: Option<Slot>) {
    if let Some(Slot::Pending { waiters, .. }) = slot {
        for waiter in waiters {
            let _ = waiter.send(());
        }
    }
}
