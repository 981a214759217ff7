use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::warn;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::OrganizeError;

/// (size, SHA-256) of a file's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentFingerprint {
    pub size: u64,
    pub hash: String,
}

impl ContentFingerprint {
    /// Short token used when a name collision cannot be resolved numerically.
    pub fn token(&self) -> String {
        self.hash.chars().take(8).collect()
    }
}

/// Outcome of a duplicate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateDecision {
    /// Registered; pass the ticket back once the file has a destination.
    Unique(Ticket),
    /// Same bytes as an earlier file, identified by its placed path (or its
    /// source path if not yet placed).
    Duplicate { original: PathBuf },
}

/// Handle on a registry entry created by [`DuplicateRegistry::check_duplicate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    size: u64,
    index: usize,
}

#[derive(Debug)]
struct Entry {
    /// Where the bytes can be read right now.
    content_path: PathBuf,
    /// Hashed lazily, only once another file shares the size.
    hash: Option<String>,
    placed: Option<PathBuf>,
}

impl Entry {
    fn original(&self) -> PathBuf {
        self.placed.clone().unwrap_or_else(|| self.content_path.clone())
    }

    fn ensure_hash(&mut self) -> io::Result<()> {
        if self.hash.is_none() {
            let hash = match hash_file(&self.content_path) {
                Ok(h) => h,
                // A moved source is only readable at its destination.
                Err(e) => match &self.placed {
                    Some(placed) => hash_file(placed)?,
                    None => return Err(e),
                },
            };
            self.hash = Some(hash);
        }
        Ok(())
    }
}

/// Fingerprints of every file placed so far, bucketed by size.
///
/// Check-and-register runs under one lock, so two identical files can never
/// both come back unique.
#[derive(Debug, Default)]
pub struct DuplicateRegistry {
    by_size: Mutex<HashMap<u64, Vec<Entry>>>,
}

impl DuplicateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Vec<Entry>>> {
        self.by_size.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of registered files.
    pub fn len(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a file that is already at its final location.
    pub fn seed(&self, path: &Path, size: u64) {
        self.lock().entry(size).or_default().push(Entry {
            content_path: path.to_path_buf(),
            hash: None,
            placed: Some(path.to_path_buf()),
        });
    }

    /// Seed with every regular file under `root`, skipping the `exclude`
    /// subtrees. Returns the number of files registered.
    pub fn seed_from_dir(&self, root: &Path, exclude: &[PathBuf]) -> usize {
        let mut count = 0;
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !exclude.iter().any(|ex| e.path() == ex));
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Skipping unreadable output entry: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(meta) = entry.metadata() {
                self.seed(entry.path(), meta.len());
                count += 1;
            }
        }
        count
    }

    /// Size first; content hashes only within a shared-size bucket.
    pub fn check_duplicate(&self, path: &Path, size: u64) -> Result<DuplicateDecision, OrganizeError> {
        let mut by_size = self.lock();
        let bucket = by_size.entry(size).or_default();

        let incoming_hash = match find_in_bucket(bucket, path)? {
            Found::Original(original) => return Ok(DuplicateDecision::Duplicate { original }),
            Found::Nothing(hash) => hash,
        };

        bucket.push(Entry {
            content_path: path.to_path_buf(),
            hash: incoming_hash,
            placed: None,
        });
        Ok(DuplicateDecision::Unique(Ticket {
            size,
            index: bucket.len() - 1,
        }))
    }

    /// Like [`check_duplicate`](Self::check_duplicate) without registering.
    pub fn lookup(&self, path: &Path, size: u64) -> Result<Option<PathBuf>, OrganizeError> {
        let mut by_size = self.lock();
        let Some(bucket) = by_size.get_mut(&size) else {
            return Ok(None);
        };
        Ok(match find_in_bucket(bucket, path)? {
            Found::Original(original) => Some(original),
            Found::Nothing(_) => None,
        })
    }

    /// Record where a unique file is going to land.
    pub fn mark_placed(&self, ticket: Ticket, destination: &Path) {
        if let Some(entry) = self
            .lock()
            .get_mut(&ticket.size)
            .and_then(|bucket| bucket.get_mut(ticket.index))
        {
            entry.placed = Some(destination.to_path_buf());
        }
    }

    /// Full fingerprint of a registered file, hashing it if needed.
    pub fn fingerprint(&self, ticket: Ticket) -> Option<ContentFingerprint> {
        let mut by_size = self.lock();
        let entry = by_size.get_mut(&ticket.size)?.get_mut(ticket.index)?;
        entry.ensure_hash().ok()?;
        Some(ContentFingerprint {
            size: ticket.size,
            hash: entry.hash.clone()?,
        })
    }
}

enum Found {
    Original(PathBuf),
    /// No match; carries the incoming hash if it had to be computed.
    Nothing(Option<String>),
}

fn find_in_bucket(bucket: &mut [Entry], path: &Path) -> Result<Found, OrganizeError> {
    if bucket.is_empty() {
        return Ok(Found::Nothing(None));
    }
    let hash = hash_file(path).map_err(|e| OrganizeError::io(path, e))?;
    for entry in bucket.iter_mut() {
        if let Err(e) = entry.ensure_hash() {
            warn!("Cannot hash {}: {e}", entry.content_path.display());
            continue;
        }
        if entry.hash.as_deref() == Some(hash.as_str()) {
            return Ok(Found::Original(entry.original()));
        }
    }
    Ok(Found::Nothing(Some(hash)))
}

/// Streaming SHA-256 of a file, hex encoded.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
