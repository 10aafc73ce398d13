//! Download observation and relocation.
//!
//! The browser writes files into a bound directory on its own schedule, so
//! completion is inferred from the filesystem: snapshot the directory before
//! triggering the download, then watch for a new, non-partial file whose size
//! holds steady across two polls. Finished artifacts are moved into a dated
//! subtree under the configured root.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, info, instrument, warn};

use crate::errors::EngineError;

/// Extensions browsers use for in-flight downloads.
const PARTIAL_SUFFIXES: [&str; 3] = ["crdownload", "part", "tmp"];

/// Two size samples closer together than this cannot prove stability.
const MIN_STABILITY_GAP: Duration = Duration::from_millis(500);

/// Glob-lite filename filter: `*` matches any run of characters, everything
/// else is literal. Anchored to the whole name.
#[derive(Debug, Clone)]
pub struct NamePattern {
    regex: regex::Regex,
}

impl NamePattern {
    pub fn new(pattern: &str) -> Result<Self, EngineError> {
        let escaped = regex::escape(pattern).replace(r"\*", ".*");
        let regex = regex::Regex::new(&format!("^{escaped}$"))
            .map_err(|e| EngineError::Pattern(format!("{pattern}: {e}")))?;
        Ok(Self { regex })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

/// A completed download on disk.
#[derive(Debug, Clone)]
pub struct DownloadArtifact {
    pub path: PathBuf,
    pub len: u64,
    pub first_seen: SystemTime,
}

/// Snapshot of a download directory taken before a download is triggered.
/// Files present in the snapshot are never reported as the new artifact.
#[derive(Debug)]
pub struct DownloadWatch {
    dir: PathBuf,
    pattern: NamePattern,
    preexisting: HashSet<String>,
}

impl DownloadWatch {
    pub fn begin(dir: &Path, pattern: NamePattern) -> Result<Self, EngineError> {
        let mut preexisting = HashSet::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if pattern.matches(&name) {
                preexisting.insert(name);
            }
        }
        debug!(dir = %dir.display(), known = preexisting.len(), "download watch started");
        Ok(Self {
            dir: dir.to_path_buf(),
            pattern,
            preexisting,
        })
    }

    /// Waits until a new matching file finishes, where finished means the same
    /// path reports the same non-zero size on two consecutive polls. The poll
    /// interval is clamped up to the minimum stability gap so the two samples
    /// are far enough apart to mean anything.
    #[instrument(level = "debug", skip(self), fields(dir = %self.dir.display()))]
    pub async fn await_stable(
        &self,
        timeout: Duration,
        poll: Duration,
    ) -> Result<DownloadArtifact, EngineError> {
        let poll = poll.max(MIN_STABILITY_GAP);
        let deadline = tokio::time::Instant::now() + timeout;
        let mut last: Option<(PathBuf, u64)> = None;

        loop {
            match self.newest_candidate()? {
                Some((path, len, first_seen)) => {
                    if last.as_ref() == Some(&(path.clone(), len)) {
                        info!(path = %path.display(), len, "download complete");
                        return Ok(DownloadArtifact {
                            path,
                            len,
                            first_seen,
                        });
                    }
                    last = Some((path, len));
                }
                None => last = None,
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Err(EngineError::DownloadTimeout(format!(
                    "no stable file appeared in {} within {timeout:?}",
                    self.dir.display()
                )));
            }
            tokio::time::sleep(poll.min(deadline - now)).await;
        }
    }

    /// Newest matching file that is new since the snapshot, fully named and
    /// non-empty. Newest by modification time so a retriggered download wins.
    fn newest_candidate(&self) -> Result<Option<(PathBuf, u64, SystemTime)>, EngineError> {
        let mut best: Option<(PathBuf, u64, SystemTime)> = None;
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.preexisting.contains(&name) || !self.pattern.matches(&name) {
                continue;
            }
            if is_partial(&name) {
                continue;
            }
            let meta = entry.metadata()?;
            if !meta.is_file() || meta.len() == 0 {
                continue;
            }
            let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            if best.as_ref().map_or(true, |(_, _, t)| mtime > *t) {
                best = Some((entry.path(), meta.len(), mtime));
            }
        }
        Ok(best)
    }
}

fn is_partial(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map_or(false, |ext| {
            PARTIAL_SUFFIXES.iter().any(|s| ext.eq_ignore_ascii_case(s))
        })
}

/// Moves a finished artifact into `dest_dir`, creating it as needed. A name
/// collision keeps the existing file and leaves the new one where it landed.
pub fn relocate(artifact: &DownloadArtifact, dest_dir: &Path) -> Result<PathBuf, EngineError> {
    std::fs::create_dir_all(dest_dir)?;
    let name = artifact
        .path
        .file_name()
        .ok_or_else(|| EngineError::Pattern(format!("no file name: {}", artifact.path.display())))?;
    let dest = dest_dir.join(name);
    if dest.exists() {
        warn!(dest = %dest.display(), "destination exists, keeping earlier file");
        return Ok(dest);
    }
    std::fs::rename(&artifact.path, &dest)?;
    info!(from = %artifact.path.display(), to = %dest.display(), "artifact relocated");
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_star_spans_anything() {
        let p = NamePattern::new("order-*.csv").unwrap();
        assert!(p.matches("order-123.csv"));
        assert!(p.matches("order-.csv"));
        assert!(!p.matches("order-123.csv.part"));
        assert!(!p.matches("xorder-123.csv"));
    }

    #[test]
    fn pattern_escapes_regex_metacharacters() {
        let p = NamePattern::new("report(1).pdf").unwrap();
        assert!(p.matches("report(1).pdf"));
        assert!(!p.matches("report1.pdf"));
    }

    #[test]
    fn partial_suffixes_detected_case_insensitively() {
        assert!(is_partial("a.csv.crdownload"));
        assert!(is_partial("a.CSV.PART"));
        assert!(is_partial("a.tmp"));
        assert!(!is_partial("a.csv"));
    }
}
