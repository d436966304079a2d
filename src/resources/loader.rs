//! Asset fetching with a shared progress monitor.
//!
//! Bytes come from an [`AssetProvider`]; the [`FileLoader`] queues requests,
//! weighs them by a relative size for progress reporting and can abort every
//! request still in flight.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use anyhow::{Context as _, anyhow};
use futures::future::{AbortHandle, Abortable, LocalBoxFuture};

use crate::error::Error;
use crate::utf::UtfReader;

/// Source of whole files by path.
pub trait AssetProvider {
    fn fetch(&self, path: &str) -> LocalBoxFuture<'static, anyhow::Result<Vec<u8>>>;
}

/// Reads assets below a root directory, or below `<origin>/<root>/` on the web.
#[derive(Clone, Debug)]
pub struct FileProvider {
    root: std::path::PathBuf,
}

impl FileProvider {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[cfg(target_arch = "wasm32")]
fn format_url(root: &std::path::Path, file_name: &str) -> anyhow::Result<reqwest::Url> {
    let window = web_sys::window().ok_or_else(|| anyhow!("no window"))?;
    let origin = window.location().origin().map_err(|_| anyhow!("no location origin"))?;
    let root = root.to_string_lossy();
    let root = root.trim_start_matches("./").trim_matches('/');
    let base = reqwest::Url::parse(&format!("{origin}/{root}/"))?;
    Ok(base.join(file_name)?)
}

impl AssetProvider for FileProvider {
    fn fetch(&self, path: &str) -> LocalBoxFuture<'static, anyhow::Result<Vec<u8>>> {
        let root = self.root.clone();
        let path = path.to_string();
        Box::pin(async move {
            #[cfg(target_arch = "wasm32")]
            let data = {
                let url = format_url(&root, &path)?;
                let response = reqwest::get(url).await?.error_for_status()?;
                response.bytes().await?.to_vec()
            };
            #[cfg(not(target_arch = "wasm32"))]
            let data = {
                let full = root.join(&path);
                tokio::fs::read(&full)
                    .await
                    .with_context(|| format!("reading {}", full.display()))?
            };
            Ok(data)
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestState {
    Pending,
    Loading,
    Done,
    Failed,
    Aborted,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoaderStatus {
    #[default]
    Idle,
    Loading,
}

#[derive(Debug)]
struct Request {
    id: u64,
    path: String,
    state: RequestState,
    abort: AbortHandle,
}

#[derive(Debug, Default)]
struct Queue {
    next_id: u64,
    requests: Vec<Request>,
    progress: f64,
    progress_max: Option<f64>,
    message: String,
    status: LoaderStatus,
}

impl Queue {
    fn count(&self, state: RequestState) -> usize {
        self.requests.iter().filter(|r| r.state == state).count()
    }

    fn set_state(&mut self, id: u64, state: RequestState) {
        if let Some(request) = self.requests.iter_mut().find(|r| r.id == id) {
            request.state = state;
        }
    }

    fn update_status(&mut self) {
        let remaining = self.requests.len() - self.count(RequestState::Done);
        self.message = match remaining {
            0 => "Sequence completed!".to_string(),
            1..=3 => format!("Only {remaining} more to go\u{2026}"),
            _ => format!("There are {remaining} more to go\u{2026}"),
        };
    }

    fn clear(&mut self, text: impl Into<String>) {
        self.requests.clear();
        self.progress = 0.0;
        self.progress_max = None;
        self.message = text.into();
    }
}

/// A concatenated blob of files and where each one sits in it.
#[derive(Clone, Debug, PartialEq)]
pub struct PackageManifest {
    pub url: String,
    pub files: Vec<PackageFile>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PackageFile {
    pub name: String,
    pub size: usize,
}

/// Parallel file loads with one progress monitor. Clones share the queue.
#[derive(Clone)]
pub struct FileLoader {
    provider: Rc<dyn AssetProvider>,
    queue: Rc<RefCell<Queue>>,
}

impl FileLoader {
    pub fn new(provider: Rc<dyn AssetProvider>) -> Self {
        Self {
            provider,
            queue: Rc::new(RefCell::new(Queue::default())),
        }
    }

    pub fn status(&self) -> LoaderStatus {
        self.queue.borrow().status
    }

    pub fn queued_count(&self) -> usize {
        self.queue.borrow().requests.len()
    }

    pub fn completed_count(&self) -> usize {
        self.queue.borrow().count(RequestState::Done)
    }

    pub fn pending_count(&self) -> usize {
        self.queue.borrow().count(RequestState::Pending)
    }

    pub fn loading_count(&self) -> usize {
        self.queue.borrow().count(RequestState::Loading)
    }

    pub fn request_state(&self, path: &str) -> Option<RequestState> {
        let queue = self.queue.borrow();
        queue.requests.iter().rev().find(|r| r.path == path).map(|r| r.state)
    }

    pub fn progress(&self) -> f64 {
        self.queue.borrow().progress
    }

    pub fn progress_max(&self) -> Option<f64> {
        self.queue.borrow().progress_max
    }

    pub fn status_text(&self) -> String {
        self.queue.borrow().message.clone()
    }

    /// Aborts every queued request, current and pending.
    pub fn abort(&self, text: &str) {
        let mut queue = self.queue.borrow_mut();
        for request in &mut queue.requests {
            request.abort.abort();
            request.state = RequestState::Aborted;
        }
        queue.status = LoaderStatus::Idle;
        queue.clear(text);
    }

    /// Fetches one file. `size` is its weight relative to the other queued
    /// files; zero keeps it out of the progress bar.
    pub async fn load(&self, path: &str, size: f64) -> anyhow::Result<Vec<u8>> {
        let (abort, registration) = AbortHandle::new_pair();
        let id = {
            let mut queue = self.queue.borrow_mut();
            if queue.count(RequestState::Done) == queue.requests.len() {
                queue.clear("");
            }
            let id = queue.next_id;
            queue.next_id += 1;
            queue.requests.push(Request {
                id,
                path: path.to_string(),
                state: RequestState::Pending,
                abort,
            });
            if size > 0.0 {
                queue.progress_max = Some(queue.progress_max.unwrap_or(0.0) + size);
            }
            queue.status = LoaderStatus::Loading;
            queue.update_status();
            id
        };

        let fetch = {
            let queue = self.queue.clone();
            let inner = self.provider.fetch(path);
            async move {
                queue.borrow_mut().set_state(id, RequestState::Loading);
                inner.await
            }
        };

        match Abortable::new(fetch, registration).await {
            Err(_) => Err(anyhow!("{path}: aborted")),
            Ok(Err(error)) => {
                log::warn!("failed to load {path}: {error:#}");
                self.queue.borrow_mut().set_state(id, RequestState::Failed);
                self.abort(&format!("{path}: {error}"));
                Err(error)
            }
            Ok(Ok(bytes)) => {
                let mut queue = self.queue.borrow_mut();
                queue.set_state(id, RequestState::Done);
                if size > 0.0 {
                    queue.progress += size;
                }
                queue.update_status();
                if queue.count(RequestState::Done) == queue.requests.len() {
                    queue.progress = queue.progress_max.unwrap_or(queue.progress);
                    queue.status = LoaderStatus::Idle;
                }
                log::debug!("loaded {path} ({} bytes)", bytes.len());
                Ok(bytes)
            }
        }
    }

    pub async fn load_text(&self, path: &str) -> anyhow::Result<String> {
        let bytes = self.load(path, 1.0).await?;
        String::from_utf8(bytes).with_context(|| format!("{path} is not UTF-8 text"))
    }

    pub async fn load_utf(&self, path: &str, size: f64) -> anyhow::Result<UtfReader> {
        let bytes = self.load(path, size).await?;
        let reader = UtfReader::from_bytes(&bytes).with_context(|| format!("parsing {path}"))?;
        Ok(reader.with_filename(path))
    }

    /// Loads a package blob and splits it into its files by the manifest.
    pub async fn load_package(
        &self,
        manifest: &PackageManifest,
    ) -> anyhow::Result<HashMap<String, Vec<u8>>> {
        let total: usize = manifest.files.iter().map(|file| file.size).sum();
        let blob = self.load(&manifest.url, total as f64).await?;
        if blob.len() < total {
            return Err(Error::range(format!(
                "package {} holds {} bytes but its manifest lists {total}",
                manifest.url,
                blob.len()
            ))
            .into());
        }

        let mut offset = 0;
        let mut files = HashMap::with_capacity(manifest.files.len());
        for file in &manifest.files {
            files.insert(file.name.clone(), blob[offset..offset + file.size].to_vec());
            offset += file.size;
        }
        Ok(files)
    }
}
