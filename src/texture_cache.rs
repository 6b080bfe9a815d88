// texture_cache.rs — 纹理缓存：按 URL 加载一次、多次复用；后台线程解码，每帧在主循环里收结果
//
// 没有淘汰策略：缓存随场景数量增长，dispose 时整体释放。

use crate::error::AssetError;
use image::io::Reader as ImageReader;
use image::RgbaImage;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};

/// Turns an image URL into pixels. Runs on a worker, so it must be `Send + Sync`.
pub trait ImageLoader: Send + Sync {
    fn load(&self, url: &str) -> Result<RgbaImage, AssetError>;
}

/// Resolves URLs as paths under `root` (a leading `/` is treated as root-relative).
pub struct FileImageLoader {
    root: PathBuf,
}

impl FileImageLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, url: &str) -> Result<PathBuf, AssetError> {
        if url.trim().is_empty() {
            return Err(AssetError::EmptyUrl);
        }
        if url.contains("://") || url.starts_with("data:") {
            return Err(AssetError::UnsupportedUrl(url.to_string()));
        }
        let direct = PathBuf::from(url);
        if direct.is_absolute() && direct.exists() {
            return Ok(direct);
        }
        Ok(self.root.join(url.trim_start_matches('/')))
    }
}

impl ImageLoader for FileImageLoader {
    fn load(&self, url: &str) -> Result<RgbaImage, AssetError> {
        let path = self.resolve(url)?;
        let file = File::open(&path).map_err(|source| AssetError::Io {
            url: url.to_string(),
            source,
        })?;

        // 全景图往往很大，关闭解码尺寸限制
        let img = ImageReader::new(BufReader::new(file))
            .with_guessed_format()
            .map_err(image::ImageError::IoError)
            .and_then(|mut r| {
                r.no_limits();
                r.decode()
            })
            .map_err(|source| AssetError::Decode {
                url: url.to_string(),
                source,
            })?;

        log::debug!("decoded {} ({}x{})", url, img.width(), img.height());
        Ok(img.to_rgba8())
    }
}

/// Serves images registered up front; anything else is [`AssetError::Missing`].
#[derive(Default)]
pub struct MemoryImageLoader {
    images: HashMap<String, RgbaImage>,
}

impl MemoryImageLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: impl Into<String>, image: RgbaImage) -> Self {
        self.images.insert(url.into(), image);
        self
    }
}

impl ImageLoader for MemoryImageLoader {
    fn load(&self, url: &str) -> Result<RgbaImage, AssetError> {
        self.images
            .get(url)
            .cloned()
            .ok_or_else(|| AssetError::Missing(url.to_string()))
    }
}

pub type LoadJob = Box<dyn FnOnce() + Send + 'static>;

/// Where decode jobs run.
pub trait LoadExecutor {
    fn spawn(&self, job: LoadJob);
}

/// One OS thread per request, like the desktop image loader always did.
pub struct ThreadExecutor;

impl LoadExecutor for ThreadExecutor {
    fn spawn(&self, job: LoadJob) {
        let cell = Arc::new(Mutex::new(Some(job)));
        let worker_cell = Arc::clone(&cell);
        let spawned = std::thread::Builder::new()
            .name("texture-loader".into())
            .spawn(move || {
                if let Some(job) = worker_cell.lock().ok().and_then(|mut j| j.take()) {
                    job();
                }
            });
        if let Err(e) = spawned {
            // 线程创建失败时退化为同步执行
            log::warn!("texture loader thread failed to start: {}", e);
            if let Some(job) = cell.lock().ok().and_then(|mut j| j.take()) {
                job();
            }
        }
    }
}

/// Queues jobs until [`DeferredExecutor::run_pending`] is called.
/// Lets a host (or a test) decide exactly when loads complete.
#[derive(Clone, Default)]
pub struct DeferredExecutor {
    queue: Arc<Mutex<VecDeque<LoadJob>>>,
}

impl DeferredExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn run_pending(&self) {
        loop {
            let job = match self.queue.lock() {
                Ok(mut q) => q.pop_front(),
                Err(_) => None,
            };
            match job {
                Some(job) => job(),
                None => break,
            }
        }
    }
}

impl LoadExecutor for DeferredExecutor {
    fn spawn(&self, job: LoadJob) {
        if let Ok(mut q) = self.queue.lock() {
            q.push_back(job);
        }
    }
}

/// A finished fetch, as seen by [`TextureCache::drain`].
#[derive(Debug)]
pub struct LoadFinished {
    pub url: String,
    pub result: Result<Arc<RgbaImage>, AssetError>,
}

struct LoadMessage {
    generation: u64,
    url: String,
    result: Result<RgbaImage, AssetError>,
}

pub enum CacheLookup {
    Ready(Arc<RgbaImage>),
    Pending,
}

pub struct TextureCache {
    loader: Arc<dyn ImageLoader>,
    executor: Rc<dyn LoadExecutor>,
    entries: HashMap<String, Arc<RgbaImage>>,
    in_flight: HashSet<String>,
    generation: u64,
    tx: Sender<LoadMessage>,
    rx: Receiver<LoadMessage>,
}

impl TextureCache {
    pub fn new(loader: Arc<dyn ImageLoader>, executor: Rc<dyn LoadExecutor>) -> Self {
        let (tx, rx) = channel();
        Self {
            loader,
            executor,
            entries: HashMap::new(),
            in_flight: HashSet::new(),
            generation: 0,
            tx,
            rx,
        }
    }

    pub fn loader(&self) -> Arc<dyn ImageLoader> {
        Arc::clone(&self.loader)
    }

    pub fn get(&self, url: &str) -> Option<Arc<RgbaImage>> {
        self.entries.get(url).cloned()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains_key(url)
    }

    pub fn is_in_flight(&self, url: &str) -> bool {
        self.in_flight.contains(url)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached image, or start (at most one) fetch and report `Pending`.
    pub fn request(&mut self, url: &str) -> CacheLookup {
        if let Some(img) = self.get(url) {
            return CacheLookup::Ready(img);
        }
        self.fetch(url);
        CacheLookup::Pending
    }

    /// Fire-and-forget warm-up. Failures only show up in the debug log.
    pub fn preload(&mut self, url: &str) {
        if url.is_empty() || self.contains(url) {
            return;
        }
        self.fetch(url);
    }

    fn fetch(&mut self, url: &str) {
        if !self.in_flight.insert(url.to_string()) {
            return;
        }
        let loader = Arc::clone(&self.loader);
        let tx = self.tx.clone();
        let generation = self.generation;
        let url = url.to_string();
        self.executor.spawn(Box::new(move || {
            let result = loader.load(&url);
            // 接收端可能已经释放（引擎已销毁），忽略发送失败
            let _ = tx.send(LoadMessage {
                generation,
                url,
                result,
            });
        }));
    }

    /// Collects every fetch that finished since the last call. Successful
    /// images are cached before being reported.
    pub fn drain(&mut self) -> Vec<LoadFinished> {
        let mut done = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            if msg.generation != self.generation {
                continue;
            }
            self.in_flight.remove(&msg.url);
            let result = match msg.result {
                Ok(img) => {
                    let img = Arc::new(img);
                    self.entries.insert(msg.url.clone(), Arc::clone(&img));
                    Ok(img)
                }
                Err(e) => {
                    log::debug!("texture load failed: {}", e);
                    Err(e)
                }
            };
            done.push(LoadFinished {
                url: msg.url,
                result,
            });
        }
        done
    }

    /// Drops every cached image; fetches still running are ignored when they land.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.in_flight.clear();
        self.generation += 1;
    }
}
