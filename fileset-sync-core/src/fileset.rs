//! Matched files, content digests, and the order-independent aggregate
//! digest of a fileset.

use std::collections::BTreeMap;
use std::fmt;

use sha2::digest::Output;
use sha2::{Digest, Sha256};

/// SHA-256 digest of some content.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentDigest(Output<Sha256>);

impl ContentDigest {
    pub fn of(data: &[u8]) -> Self {
        Self(Sha256::digest(data))
    }

    /// 64-character lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        format!("{:x}", self.0)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl From<Sha256> for ContentDigest {
    fn from(hasher: Sha256) -> Self {
        Self(hasher.finalize())
    }
}

/// One local file that matched the pattern, loaded and hashed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedFile {
    /// Slash-separated path relative to the discovery root.
    pub path: String,
    pub digest: ContentDigest,
    pub bytes: Vec<u8>,
}

impl MatchedFile {
    pub fn new(path: impl Into<String>, bytes: Vec<u8>) -> Self {
        let digest = ContentDigest::of(&bytes);
        Self {
            path: path.into(),
            digest,
            bytes,
        }
    }
}

/// The files matched by one pattern in one operation, keyed by relative path.
///
/// Never empty when produced by discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fileset {
    files: BTreeMap<String, MatchedFile>,
}

impl Fileset {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&MatchedFile> {
        self.files.get(path)
    }

    /// Files in path order.
    pub fn iter(&self) -> impl Iterator<Item = &MatchedFile> {
        self.files.values()
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.values().map(|f| f.bytes.len() as u64).sum()
    }

    /// Relative path to hex digest, as persisted for the host.
    pub fn file_digests(&self) -> BTreeMap<String, String> {
        self.files
            .iter()
            .map(|(path, file)| (path.clone(), file.digest.to_hex()))
            .collect()
    }

    pub fn aggregate_digest(&self) -> ContentDigest {
        aggregate_digest(self.files.values())
    }
}

impl FromIterator<MatchedFile> for Fileset {
    fn from_iter<I: IntoIterator<Item = MatchedFile>>(iter: I) -> Self {
        Self {
            files: iter.into_iter().map(|f| (f.path.clone(), f)).collect(),
        }
    }
}

impl Extend<MatchedFile> for Fileset {
    fn extend<I: IntoIterator<Item = MatchedFile>>(&mut self, iter: I) {
        self.files
            .extend(iter.into_iter().map(|f| (f.path.clone(), f)));
    }
}

/// Combines file contents into one digest, independent of input order.
///
/// Files are stably sorted by their own digest and their raw contents are
/// fed into a single hasher in that order.
pub fn aggregate_digest<'a, I>(files: I) -> ContentDigest
where
    I: IntoIterator<Item = &'a MatchedFile>,
{
    let mut sorted: Vec<&MatchedFile> = files.into_iter().collect();
    sorted.sort_by(|a, b| a.digest.cmp(&b.digest));

    let mut hasher = Sha256::new();
    for file in sorted {
        hasher.update(&file.bytes);
    }
    ContentDigest::from(hasher)
}
