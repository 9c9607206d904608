//! # Source Discovery & Deduplication
//!
//! Espande gli input in file candidati e scarta i duplicati sull'intero
//! insieme accumulato (non per singolo input), in tre livelli di costo crescente:
//! 1. Path identico → duplicato
//! 2. Dimensione uguale → si passa al livello 3 solo in caso di collisione
//! 3. MD5 uguale (calcolato solo quando serve e poi memorizzato) → duplicato
//!
//! Un Cancel ricevuto durante la scansione la interrompe tra un candidato e l'altro.

use crate::config::FilterConfig;
use crate::encoder::control::ControlHub;
use crate::file_manager::FileManager;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// An accepted input file
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    /// Input path that produced this file
    pub target: PathBuf,
    pub path: PathBuf,
    pub size: u64,
    /// Present only when a size collision forced hashing
    pub md5: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Unique,
    Duplicate { original: PathBuf },
    /// Vanished or unreadable during the check
    Unreadable,
}

/// Incremental three-tier duplicate filter
#[derive(Debug, Default)]
pub struct DuplicateFilter {
    accepted: Vec<SourceFile>,
    seen_paths: HashSet<PathBuf>,
    by_size: HashMap<u64, Vec<usize>>,
}

impl DuplicateFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check `path` against everything accepted so far, accepting it if unique
    pub async fn insert(&mut self, target: &Path, path: PathBuf) -> Verdict {
        let key = path.canonicalize().unwrap_or_else(|_| path.clone());
        if self.seen_paths.contains(&key) {
            return Verdict::Duplicate { original: path };
        }

        let size = match FileManager::file_size(&path).await {
            Ok(size) => size,
            Err(e) => {
                warn!("Cannot stat {}: {}", path.display(), e);
                return Verdict::Unreadable;
            }
        };

        let mut md5 = None;
        let collisions = self.by_size.get(&size).cloned().unwrap_or_default();
        if !collisions.is_empty() {
            let hash = match FileManager::md5_hash(&path).await {
                Ok(hash) => hash,
                Err(e) => {
                    warn!("Cannot hash {}: {}", path.display(), e);
                    return Verdict::Unreadable;
                }
            };

            for index in collisions {
                let Some(other_hash) = self.hash_of(index).await else {
                    continue;
                };
                if other_hash == hash {
                    return Verdict::Duplicate {
                        original: self.accepted[index].path.clone(),
                    };
                }
            }
            md5 = Some(hash);
        }

        let index = self.accepted.len();
        self.accepted.push(SourceFile {
            target: target.to_path_buf(),
            path,
            size,
            md5,
        });
        self.seen_paths.insert(key);
        self.by_size.entry(size).or_default().push(index);
        Verdict::Unique
    }

    /// Hash of an accepted file, computed on first request
    async fn hash_of(&mut self, index: usize) -> Option<String> {
        let file = &mut self.accepted[index];
        if file.md5.is_none() {
            debug!("Hashing earlier candidate {}", file.path.display());
            match FileManager::md5_hash(&file.path).await {
                Ok(hash) => file.md5 = Some(hash),
                Err(e) => {
                    warn!("Cannot hash {}: {}", file.path.display(), e);
                    return None;
                }
            }
        }
        file.md5.clone()
    }

    pub fn into_files(self) -> Vec<SourceFile> {
        self.accepted
    }
}

/// Result of the discovery phase
#[derive(Debug, Default)]
pub struct ScanReport {
    pub files: Vec<SourceFile>,
    pub duplicate_count: usize,
    /// Cancelled before every candidate was checked
    pub interrupted: bool,
}

impl ScanReport {
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Accepted files grouped by the input path that produced them
    pub fn by_target(&self) -> Vec<(&Path, Vec<&SourceFile>)> {
        let mut groups: Vec<(&Path, Vec<&SourceFile>)> = Vec::new();
        for file in &self.files {
            match groups.last_mut() {
                Some((target, files)) if *target == file.target.as_path() => files.push(file),
                _ => groups.push((file.target.as_path(), vec![file])),
            }
        }
        groups
    }
}

/// Discover and deduplicate every input path
pub async fn scan_sources(
    inputs: &[PathBuf],
    filter: Option<&FilterConfig>,
    control: &mut ControlHub,
) -> ScanReport {
    let mut dedup = DuplicateFilter::new();
    let mut duplicate_count = 0;
    let mut interrupted = false;

    'inputs: for input in inputs {
        let candidates = FileManager::get_media_files(input, filter);
        debug!("{} candidate(s) under {}", candidates.len(), input.display());

        for candidate in candidates {
            if control.is_cancelled() {
                warn!("Scan cancelled at {}", candidate.display());
                interrupted = true;
                break 'inputs;
            }
            match dedup.insert(input, candidate.clone()).await {
                Verdict::Unique => {}
                Verdict::Duplicate { original } => {
                    warn!(
                        "Duplicate file excluded: {} (same as {})",
                        candidate.display(),
                        original.display()
                    );
                    duplicate_count += 1;
                }
                Verdict::Unreadable => {}
            }
        }
    }

    let report = ScanReport {
        files: dedup.into_files(),
        duplicate_count,
        interrupted,
    };
    info!(
        "Found {} source file(s), {} duplicate(s) excluded",
        report.file_count(),
        report.duplicate_count
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::control::ControlSignal;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_same_content_different_paths() {
        let temp_dir = TempDir::new().unwrap();
        let a = write(temp_dir.path(), "a.mp4", b"identical bytes");
        let b = write(temp_dir.path(), "b.mp4", b"identical bytes");

        let mut filter = DuplicateFilter::new();
        assert_eq!(filter.insert(temp_dir.path(), a.clone()).await, Verdict::Unique);
        assert_eq!(
            filter.insert(temp_dir.path(), b).await,
            Verdict::Duplicate { original: a }
        );
        assert_eq!(filter.into_files().len(), 1);
    }

    #[tokio::test]
    async fn test_same_size_different_content() {
        let temp_dir = TempDir::new().unwrap();
        let a = write(temp_dir.path(), "a.mp4", b"aaaa");
        let b = write(temp_dir.path(), "b.mp4", b"bbbb");

        let mut filter = DuplicateFilter::new();
        assert_eq!(filter.insert(temp_dir.path(), a).await, Verdict::Unique);
        assert_eq!(filter.insert(temp_dir.path(), b).await, Verdict::Unique);

        let files = filter.into_files();
        assert_eq!(files.len(), 2);
        // Il primo hash viene calcolato solo alla collisione
        assert!(files.iter().all(|f| f.md5.is_some()));
    }

    #[tokio::test]
    async fn test_hash_only_on_size_collision() {
        let temp_dir = TempDir::new().unwrap();
        let a = write(temp_dir.path(), "a.mp4", b"short");
        let b = write(temp_dir.path(), "b.mp4", b"a bit longer");

        let mut filter = DuplicateFilter::new();
        filter.insert(temp_dir.path(), a).await;
        filter.insert(temp_dir.path(), b).await;

        assert!(filter.into_files().iter().all(|f| f.md5.is_none()));
    }

    #[tokio::test]
    async fn test_dedup_spans_all_inputs() {
        let temp_dir = TempDir::new().unwrap();
        let dir_a = temp_dir.path().join("a");
        let dir_b = temp_dir.path().join("b");
        std::fs::create_dir_all(&dir_a).unwrap();
        std::fs::create_dir_all(&dir_b).unwrap();
        let first = write(&dir_a, "clip.mp4", b"same clip");
        write(&dir_b, "copy.mp4", b"same clip");
        write(&dir_b, "other.mkv", b"another clip");

        let inputs = vec![dir_a.clone(), dir_b.clone(), first.clone()];
        let report = scan_sources(&inputs, Some(&FilterConfig::default()), &mut ControlHub::new()).await;

        assert_eq!(report.file_count(), 2);
        assert_eq!(report.duplicate_count, 2);

        let groups = report.by_target();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, dir_a.as_path());
        assert_eq!(groups[0].1[0].path, first);
        assert_eq!(groups[1].1[0].path, dir_b.join("other.mkv"));
    }

    #[tokio::test]
    async fn test_cancel_stops_scan() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "a.mp4", b"same");
        write(temp_dir.path(), "b.mp4", b"same");

        let mut control = ControlHub::new();
        control.sender().send(ControlSignal::Cancel).unwrap();
        let inputs = vec![temp_dir.path().to_path_buf()];
        let report = scan_sources(&inputs, Some(&FilterConfig::default()), &mut control).await;

        assert!(report.interrupted);
        assert_eq!(report.file_count(), 0);
        assert_eq!(report.duplicate_count, 0);
    }

    #[tokio::test]
    async fn test_vanished_file_is_unreadable() {
        let temp_dir = TempDir::new().unwrap();
        let mut filter = DuplicateFilter::new();
        let verdict = filter
            .insert(temp_dir.path(), temp_dir.path().join("gone.mp4"))
            .await;
        assert_eq!(verdict, Verdict::Unreadable);
    }
}
