//! Merkle hashing and diffing over directory trees.
//!
//! The canonical scheme: entries at each level are sorted by name; a leaf
//! entry hashes as `H(name || "F" || file_hash_hex)` and a directory entry
//! as `H(name || "D" || child_root_hex)`, where the child root reduces the
//! sorted child entry digests pairwise (`H(a_hex || b_hex)`, duplicating
//! the last digest of an odd level) down to a single digest. An empty
//! directory hashes to the digest of the empty string.

use crate::hash::ContentHash;
use serde::{Deserialize, Serialize};

/// A node in a directory tree: a file leaf or a directory with children.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Entry name within its parent.
    pub name: String,
    /// Whether this entry is a directory.
    pub is_dir: bool,
    /// Content hash: the file hash for leaves; ignored for directories,
    /// whose content digest is derived from `children`.
    pub hash: ContentHash,
    /// Size in bytes (files) or aggregate size (directories).
    pub size: u64,
    /// Child entries, for directories.
    #[serde(default)]
    pub children: Vec<DirectoryEntry>,
}

impl DirectoryEntry {
    /// Create a file leaf.
    pub fn file(name: impl Into<String>, hash: ContentHash, size: u64) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
            hash,
            size,
            children: Vec::new(),
        }
    }

    /// Create a directory from its children.
    pub fn dir(name: impl Into<String>, children: Vec<DirectoryEntry>) -> Self {
        let size = children.iter().map(|c| c.size).sum();
        Self {
            name: name.into(),
            is_dir: true,
            hash: tree_root(&children),
            size,
            children,
        }
    }

    /// The content digest of this entry: the file hash for leaves, the
    /// Merkle root of the children for directories.
    pub fn content_digest(&self) -> ContentHash {
        if self.is_dir {
            tree_root(&self.children)
        } else {
            self.hash
        }
    }

    /// The digest of this entry within its parent level.
    pub fn entry_digest(&self) -> ContentHash {
        let tag: &[u8] = if self.is_dir { b"D" } else { b"F" };
        let mut hasher = ContentHash::hasher();
        hasher.update(self.name.as_bytes());
        hasher.update(tag);
        hasher.update(self.content_digest().to_hex().as_bytes());
        hasher.finalize()
    }
}

/// Compute the Merkle root of one directory level.
pub fn tree_root(entries: &[DirectoryEntry]) -> ContentHash {
    if entries.is_empty() {
        return ContentHash::compute(b"");
    }

    let mut sorted: Vec<&DirectoryEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut level: Vec<ContentHash> = sorted.iter().map(|e| e.entry_digest()).collect();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            // Odd level: duplicate the trailing digest.
            if let Some(&last) = level.last() {
                level.push(last);
            }
        }
        level = level
            .chunks(2)
            .map(|pair| {
                let mut hasher = ContentHash::hasher();
                hasher.update(pair[0].to_hex().as_bytes());
                hasher.update(pair[1].to_hex().as_bytes());
                hasher.finalize()
            })
            .collect();
    }
    level[0]
}

/// One changed entry in a tree diff, addressed by its slash-joined path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    /// Path from the diff root, components joined with `/`.
    pub path: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
    /// Content digest on the side that defines the change (new side for
    /// added/modified, old side for removed).
    pub hash: ContentHash,
    /// Size on the defining side.
    pub size: u64,
}

/// The differences between two directory trees.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TreeDiff {
    /// Entries present only in the new tree.
    pub added: Vec<DiffEntry>,
    /// Entries present only in the old tree.
    pub removed: Vec<DiffEntry>,
    /// Entries present in both with differing content digests.
    pub modified: Vec<DiffEntry>,
}

impl TreeDiff {
    /// True if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

fn diff_entry(prefix: &str, entry: &DirectoryEntry) -> DiffEntry {
    DiffEntry {
        path: join(prefix, &entry.name),
        is_dir: entry.is_dir,
        hash: entry.content_digest(),
        size: entry.size,
    }
}

fn diff_level(prefix: &str, old: &[DirectoryEntry], new: &[DirectoryEntry], out: &mut TreeDiff) {
    let mut old_sorted: Vec<&DirectoryEntry> = old.iter().collect();
    let mut new_sorted: Vec<&DirectoryEntry> = new.iter().collect();
    old_sorted.sort_by(|a, b| a.name.cmp(&b.name));
    new_sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let (mut i, mut j) = (0usize, 0usize);
    while i < old_sorted.len() && j < new_sorted.len() {
        let (o, n) = (old_sorted[i], new_sorted[j]);
        match o.name.cmp(&n.name) {
            std::cmp::Ordering::Equal => {
                if o.content_digest() != n.content_digest() {
                    out.modified.push(diff_entry(prefix, n));
                    if o.is_dir && n.is_dir {
                        diff_level(&join(prefix, &n.name), &o.children, &n.children, out);
                    }
                }
                i += 1;
                j += 1;
            }
            std::cmp::Ordering::Less => {
                out.removed.push(diff_entry(prefix, o));
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                out.added.push(diff_entry(prefix, n));
                j += 1;
            }
        }
    }
    for o in &old_sorted[i..] {
        out.removed.push(diff_entry(prefix, o));
    }
    for n in &new_sorted[j..] {
        out.added.push(diff_entry(prefix, n));
    }
}

/// Diff two directory trees given their roots and top-level entries.
///
/// Equal roots short-circuit to an empty diff; otherwise the sorted name
/// lists are walked in parallel and directory modifications recurse.
pub fn diff(
    old_root: ContentHash,
    new_root: ContentHash,
    old_entries: &[DirectoryEntry],
    new_entries: &[DirectoryEntry],
) -> TreeDiff {
    let mut out = TreeDiff::default();
    if old_root == new_root {
        return out;
    }
    diff_level("", old_entries, new_entries, &mut out);
    out
}
