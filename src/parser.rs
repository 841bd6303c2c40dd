//! A reusable parser that keeps at most one parse in flight.
//!
//! Starting a parse cancels whatever the same parser was doing before, so a
//! front end can simply fire off a new parse when the user opens another file
//! and stop worrying about the old one.

use crate::error::{ParseError, Result};
use crate::model::LinkMap;
use crate::scan::{scan, CancelToken, ScanConfig};
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct LinkMapParser {
    config: ScanConfig,
    /// Token of the most recently started parse.
    in_flight: Mutex<Option<CancelToken>>,
}

impl LinkMapParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ScanConfig) -> Self {
        Self {
            config,
            in_flight: Mutex::default(),
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Cancels the parse in flight, if there is one.
    pub fn cancel(&self) {
        if let Some(token) = self.slot().take() {
            debug!("canceling in-flight parse");
            token.cancel();
        }
    }

    /// Parses a map that's already in memory.
    pub fn parse_bytes(
        &self,
        bytes: &[u8],
        on_progress: impl FnMut(u64, u64),
    ) -> Result<LinkMap> {
        let token = self.begin();
        self.run(bytes, on_progress, &token)
    }

    /// Maps `path` into memory and parses it.
    pub fn parse_file(
        &self,
        path: impl AsRef<Path>,
        on_progress: impl FnMut(u64, u64),
    ) -> Result<LinkMap> {
        let token = self.begin();
        self.parse_file_with(path.as_ref(), on_progress, &token)
    }

    /// Like `parse_file`, but on a background thread. `on_progress` is called
    /// from that thread.
    pub fn spawn_file(
        self: &Arc<Self>,
        path: impl Into<PathBuf>,
        on_progress: impl FnMut(u64, u64) + Send + 'static,
    ) -> ParseJob {
        let token = self.begin();
        let parser = Arc::clone(self);
        let path = path.into();
        let job_token = token.clone();
        let handle = std::thread::Builder::new()
            .name("linkmap-parse".into())
            .spawn(move || parser.parse_file_with(&path, on_progress, &job_token));
        ParseJob { token, handle }
    }

    /// Installs a fresh token, canceling the previous one.
    fn begin(&self) -> CancelToken {
        let token = CancelToken::new();
        if let Some(previous) = self.slot().replace(token.clone()) {
            debug!("new parse supersedes the one in flight");
            previous.cancel();
        }
        token
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<CancelToken>> {
        // The slot only ever holds a token; a panic elsewhere can't leave it
        // half-written.
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn parse_file_with(
        &self,
        path: &Path,
        on_progress: impl FnMut(u64, u64),
        token: &CancelToken,
    ) -> Result<LinkMap> {
        let source = MappedFile::open(path)?;
        debug!(path = %path.display(), size = source.bytes().len(), "mapped link map");
        self.run(source.bytes(), on_progress, token)
    }

    fn run(
        &self,
        bytes: &[u8],
        on_progress: impl FnMut(u64, u64),
        token: &CancelToken,
    ) -> Result<LinkMap> {
        let result = scan(bytes, &self.config, on_progress, token);
        match &result {
            Ok(map) => info!(
                binary = %map.name,
                arch = %map.arch,
                objects = map.objects.len(),
                sections = map.sections.len(),
                symbols = map.symbols.len(),
                "parsed link map"
            ),
            Err(e) => debug!(error = %e, "parse did not produce a map"),
        }
        result
    }
}

/// A parse running on a background thread.
#[derive(Debug)]
pub struct ParseJob {
    token: CancelToken,
    handle: std::io::Result<JoinHandle<Result<LinkMap>>>,
}

impl ParseJob {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        match &self.handle {
            Ok(h) => h.is_finished(),
            Err(_) => true,
        }
    }

    /// Waits for the parse to end.
    pub fn join(self) -> Result<LinkMap> {
        match self.handle {
            Ok(h) => h
                .join()
                .unwrap_or_else(|_| Err(ParseError::Unknown("parse thread panicked".into()))),
            Err(e) => Err(ParseError::Unknown(format!("can't start parse thread: {e}"))),
        }
    }
}

/// Read-only view of a file's bytes.
struct MappedFile {
    // None for empty files, which can't be mapped.
    map: Option<Mmap>,
}

impl MappedFile {
    fn open(path: &Path) -> Result<Self> {
        let open_failed = |source| ParseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(open_failed)?;
        let len = file.metadata().map_err(open_failed)?.len();
        let map = if len == 0 {
            None
        } else {
            // Safety: read-only map of a regular file. Someone truncating the
            // file underneath us is outside what we can defend against.
            Some(unsafe { Mmap::map(&file) }.map_err(open_failed)?)
        };
        Ok(Self { map })
    }

    fn bytes(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }
}
