//! Local filesystem sourcing
//!
//! Enumerates certificate-like files in a directory and resolves a paired
//! key file, with 1-indexed selection over multiple candidates. Selection
//! indices come from an optional callback so interactive prompting stays in
//! the CLI; with no callback the first candidate wins, which keeps scripted
//! reruns deterministic.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::{CertificateMaterial, MaterialSource, SourceError};

const CERT_EXTENSIONS: &[&str] = &["crt", "cer", "pem"];
const KEY_EXTENSIONS: &[&str] = &["key"];

/// Which kind of file a selection is being made over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectKind {
    Certificate,
    Key,
}

/// Supplies a 1-indexed choice over listed candidates; `None` means take
/// the first.
pub type Selector = Box<dyn Fn(&[PathBuf], SelectKind) -> Option<usize> + Send + Sync>;

/// List files in `dir` whose extension matches (case-insensitive), sorted
/// by name so the 1-indexed listing is stable across runs.
pub fn find_candidates(dir: &Path, extensions: &[&str]) -> io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let matched = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| extensions.iter().any(|x| e.eq_ignore_ascii_case(x)))
            .unwrap_or(false);
        if matched {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

/// Resolve a 1-indexed selection against a candidate list.
///
/// `None` defaults to the first candidate; anything outside `1..=len` is a
/// selection error (indices are 1-based, so 0 is always invalid).
pub fn select_indexed(
    candidates: &[PathBuf],
    index: Option<usize>,
) -> Result<&PathBuf, SourceError> {
    match index {
        None => candidates.first().ok_or(SourceError::Selection {
            index: 1,
            count: 0,
        }),
        Some(i) if i >= 1 && i <= candidates.len() => Ok(&candidates[i - 1]),
        Some(i) => Err(SourceError::Selection {
            index: i,
            count: candidates.len(),
        }),
    }
}

/// Sources a certificate/key pair from files already on disk.
pub struct LocalSource {
    dir: PathBuf,
    cert_extensions: Vec<String>,
    key_extensions: Vec<String>,
    selector: Option<Selector>,
}

impl LocalSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cert_extensions: CERT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            key_extensions: KEY_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            selector: None,
        }
    }

    /// Install a selection callback (interactive or index-forwarding).
    pub fn with_selector(mut self, selector: Selector) -> Self {
        self.selector = Some(selector);
        self
    }

    fn select_from(&self, candidates: &[PathBuf], kind: SelectKind) -> Option<usize> {
        self.selector.as_ref().and_then(|s| s(candidates, kind))
    }

    fn extensions(&self, kind: SelectKind) -> Vec<&str> {
        match kind {
            SelectKind::Certificate => self.cert_extensions.iter().map(|s| s.as_str()).collect(),
            SelectKind::Key => self.key_extensions.iter().map(|s| s.as_str()).collect(),
        }
    }

    fn pick(&self, kind: SelectKind, what: &'static str) -> Result<PathBuf, SourceError> {
        let candidates = find_candidates(&self.dir, &self.extensions(kind))?;
        if candidates.is_empty() {
            return Err(SourceError::NotFound {
                what,
                dir: self.dir.clone(),
            });
        }
        debug!(count = candidates.len(), what, "enumerated local candidates");
        let index = self.select_from(&candidates, kind);
        select_indexed(&candidates, index).cloned()
    }

    /// Find the key paired with `cert_path`: same stem with a key extension
    /// wins; otherwise fall back to indexed selection over all key files.
    fn resolve_key(&self, cert_path: &Path) -> Result<PathBuf, SourceError> {
        for ext in &self.key_extensions {
            let sibling = cert_path.with_extension(ext);
            if sibling.is_file() {
                debug!(key = %sibling.display(), "found key by matching stem");
                return Ok(sibling);
            }
        }
        self.pick(SelectKind::Key, "key")
    }
}

#[async_trait]
impl MaterialSource for LocalSource {
    async fn resolve(&self) -> Result<CertificateMaterial, SourceError> {
        let cert_path = self.pick(SelectKind::Certificate, "certificate")?;
        let key_path = self.resolve_key(&cert_path)?;

        let certificate = std::fs::read(&cert_path)?;
        let key = std::fs::read(&key_path)?;
        info!(
            cert = %cert_path.display(),
            key = %key_path.display(),
            "resolved local certificate material"
        );

        Ok(CertificateMaterial {
            certificate,
            key,
            cert_path,
            key_path,
        })
    }
}
