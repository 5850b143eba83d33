//! B-tree traversal.
//!
//! A logical tree is rooted at its father data page (FDP). The root page's
//! tag 0 holds the root header (space-tree FDP, extent policy); branch pages
//! carry `{key, child page}` entries; leaf pages carry `{key, record}`
//! entries. Within one level, pages form a doubly-linked sibling chain, so
//! an ordered scan descends to the leftmost leaf once and then follows
//! `next_page`.
//!
//! Entry keys may be prefix-compressed: a tag with the common-key flag
//! starts with a 16-bit count of bytes shared with the preceding entry's
//! key. Branch-level and leaf-level traversal both resolve the full key
//! before yielding.
//!
//! Corruption policy: a record that cannot be parsed is skipped with a
//! warning; a page that cannot be read or parsed ends that part of the
//! traversal with a warning, without failing the iteration as a whole.
//! Sibling cycles introduced by corruption are detected by bounding the
//! walk at the total page count.

use byteorder::{ByteOrder, LittleEndian};
use std::sync::Arc;

use crate::ese::constants::*;
use crate::ese::page::{Page, RootPageHeader};
use crate::EseError;

/// Access to decoded pages, provided by the database handle.
pub trait PageReader {
    /// Read and decode a page through the cache.
    fn tree_page(&self, page_number: u32) -> Result<Arc<Page>, EseError>;

    /// Total number of pages in the file; bounds sibling walks.
    fn total_pages(&self) -> u32;

    /// Returns `Err(EseError::Aborted)` when cancellation was signalled.
    fn check_abort(&self) -> Result<(), EseError>;

    /// Record a non-fatal corruption warning.
    fn warn(&self, message: String);
}

/// Returns true for page numbers that terminate descent: zero and the
/// reserved sentinel range.
pub fn is_sentinel_page(page_number: u32) -> bool {
    page_number == 0 || page_number >= PAGE_NUMBER_SENTINEL_FIRST
}

/// One `{key, child}` entry of a branch page.
#[derive(Debug, Clone)]
pub struct BranchEntry {
    /// Full (prefix-resolved) key.
    pub key: Vec<u8>,
    /// Child page number.
    pub child_page: u32,
}

/// One `{key, record}` entry of a leaf page.
#[derive(Debug, Clone)]
pub struct LeafEntry {
    /// Page the entry was read from.
    pub page_number: u32,
    /// Tag index within the page.
    pub tag_index: usize,
    /// Full (prefix-resolved) key.
    pub key: Vec<u8>,
    /// The entry payload (a record, an index entry, or a long-value chunk).
    pub data: Vec<u8>,
}

/// Split one entry's value into (full key, payload), resolving the common
/// key prefix against the preceding entry's full key.
fn split_entry(
    value: &[u8],
    has_common_key: bool,
    previous_key: &[u8],
) -> Result<(Vec<u8>, usize), EseError> {
    let mut offset = 0usize;
    let mut key = Vec::new();

    if has_common_key {
        if value.len() < 2 {
            return Err(EseError::Format("Entry too short for a common key size".into()));
        }
        let common = LittleEndian::read_u16(&value[0..]) as usize;
        offset += 2;
        if common > previous_key.len() {
            return Err(EseError::Format(format!(
                "Common key of {} bytes exceeds the {} byte preceding key",
                common,
                previous_key.len()
            )));
        }
        key.extend_from_slice(&previous_key[..common]);
    }

    if value.len() < offset + 2 {
        return Err(EseError::Format("Entry too short for a local key size".into()));
    }
    let local = LittleEndian::read_u16(&value[offset..]) as usize;
    offset += 2;
    if value.len() < offset + local {
        return Err(EseError::Format(format!(
            "Local key of {} bytes overruns the {} byte entry",
            local,
            value.len()
        )));
    }
    key.extend_from_slice(&value[offset..offset + local]);
    offset += local;

    Ok((key, offset))
}

/// Parse the branch entries of a parent page, in tag order.
pub fn branch_entries(page: &Page) -> Result<Vec<BranchEntry>, EseError> {
    let mut entries = Vec::new();
    let mut previous_key: Vec<u8> = Vec::new();

    for tag_index in 1..page.tag_count() {
        let tag = page.tags[tag_index];
        if tag.is_deleted() {
            continue;
        }
        let value = page.value(tag_index)?;
        let (key, payload_offset) = split_entry(&value, tag.has_common_key(), &previous_key)?;
        if value.len() < payload_offset + 4 {
            return Err(EseError::Format(format!(
                "Branch entry {} on page {} has no child page number",
                tag_index, page.number
            )));
        }
        let child_page = LittleEndian::read_u32(&value[payload_offset..]);
        previous_key = key.clone();
        entries.push(BranchEntry { key, child_page });
    }

    Ok(entries)
}

/// Parse the leaf entries of a leaf page, in tag order.
pub fn leaf_entries(page: &Page) -> Result<Vec<LeafEntry>, EseError> {
    let mut entries = Vec::new();
    let mut previous_key: Vec<u8> = Vec::new();

    for tag_index in 1..page.tag_count() {
        let tag = page.tags[tag_index];
        if tag.is_deleted() {
            continue;
        }
        let value = page.value(tag_index)?;
        let (key, payload_offset) = split_entry(&value, tag.has_common_key(), &previous_key)?;
        previous_key = key.clone();
        entries.push(LeafEntry {
            page_number: page.number,
            tag_index,
            key,
            data: value[payload_offset..].to_vec(),
        });
    }

    Ok(entries)
}

/// Read the root header slot of a tree's root page, if present.
pub fn root_header(reader: &dyn PageReader, root_page: u32) -> Result<Option<RootPageHeader>, EseError> {
    let page = reader.tree_page(root_page)?;
    if !page.header.is_root() || page.tag_count() == 0 {
        return Ok(None);
    }
    let value = page.value(0)?;
    match RootPageHeader::parse(&value) {
        Ok(header) => Ok(Some(header)),
        // Space trees and some index roots keep other data in tag 0.
        Err(_) => Ok(None),
    }
}

/// Descend from the root to the leftmost leaf page of a tree.
fn leftmost_leaf(reader: &dyn PageReader, root_page: u32) -> Result<Option<u32>, EseError> {
    let mut current = root_page;
    let mut depth = 0u32;

    loop {
        reader.check_abort()?;
        if is_sentinel_page(current) {
            return Err(EseError::Format(format!(
                "Tree truncated: child page {:#x} while descending from page {}",
                current, root_page
            )));
        }
        if depth > reader.total_pages() {
            return Err(EseError::Format(format!(
                "Descent from page {} exceeded the page count; cyclic child references",
                root_page
            )));
        }
        depth += 1;

        let page = reader.tree_page(current)?;
        if page.header.is_leaf() {
            return Ok(Some(current));
        }
        if page.header.is_empty() || page.tag_count() <= 1 {
            return Ok(None);
        }
        if !page.header.is_branch() && !page.header.is_root() {
            return Err(EseError::Format(format!(
                "Page {} is neither branch nor leaf within its tree",
                current
            )));
        }

        let entries = branch_entries(&page)?;
        match entries.first() {
            Some(entry) => current = entry.child_page,
            None => return Ok(None),
        }
    }
}

/// Ordered iterator over every leaf entry of a tree.
///
/// Descends once to the leftmost leaf, then walks the sibling chain. The
/// iterator is restartable by constructing it again from the root.
pub struct LeafIter<'a> {
    reader: &'a dyn PageReader,
    fdp: u32,
    state: LeafIterState,
    pending: std::vec::IntoIter<LeafEntry>,
    pages_walked: u32,
    previous_page: u32,
}

enum LeafIterState {
    Start(u32),
    Walking(u32),
    Done,
}

impl<'a> LeafIter<'a> {
    /// Iterate the tree rooted at `root_page`, which doubles as the expected
    /// father data page of every member page.
    pub fn new(reader: &'a dyn PageReader, root_page: u32) -> Self {
        LeafIter {
            reader,
            fdp: root_page,
            state: LeafIterState::Start(root_page),
            pending: Vec::new().into_iter(),
            pages_walked: 0,
            previous_page: 0,
        }
    }

    /// Like [`LeafIter::new`] but with a separate FDP identity, for trees
    /// whose root page number differs from the owning object identifier.
    pub fn with_fdp(reader: &'a dyn PageReader, root_page: u32, fdp: u32) -> Self {
        LeafIter {
            reader,
            fdp,
            state: LeafIterState::Start(root_page),
            pending: Vec::new().into_iter(),
            pages_walked: 0,
            previous_page: 0,
        }
    }

    fn load_page(&mut self, page_number: u32) -> Result<bool, EseError> {
        self.reader.check_abort()?;

        if self.pages_walked > self.reader.total_pages() {
            self.reader.warn(format!(
                "Sibling chain of tree {} exceeds the page count; cycle assumed at page {}",
                self.fdp, page_number
            ));
            self.state = LeafIterState::Done;
            return Ok(false);
        }
        self.pages_walked += 1;

        let page = match self.reader.tree_page(page_number) {
            Ok(page) => page,
            Err(error) => {
                self.reader.warn(format!(
                    "Leaf page {} unreadable, ending scan of tree {}: {}",
                    page_number, self.fdp, error
                ));
                self.state = LeafIterState::Done;
                return Ok(false);
            }
        };

        if !page.header.is_leaf() {
            self.reader.warn(format!(
                "Page {} in the sibling chain of tree {} is not a leaf",
                page_number, self.fdp
            ));
            self.state = LeafIterState::Done;
            return Ok(false);
        }
        if page.header.father_data_page != self.fdp {
            self.reader.warn(format!(
                "Page {} belongs to tree {} but was linked from tree {}; stopping",
                page_number, page.header.father_data_page, self.fdp
            ));
            self.state = LeafIterState::Done;
            return Ok(false);
        }
        if page.header.has_prev() && self.previous_page != 0 && page.header.prev_page != self.previous_page
        {
            self.reader.warn(format!(
                "Page {} back-links to {} instead of {}",
                page_number, page.header.prev_page, self.previous_page
            ));
        }

        let entries = match leaf_entries(&page) {
            Ok(entries) => entries,
            Err(error) => {
                self.reader
                    .warn(format!("Page {}: {}; its records are skipped", page_number, error));
                Vec::new()
            }
        };
        self.pending = entries.into_iter();
        self.previous_page = page_number;
        self.state = if page.header.has_next() {
            LeafIterState::Walking(page.header.next_page)
        } else {
            LeafIterState::Done
        };
        Ok(true)
    }
}

impl Iterator for LeafIter<'_> {
    type Item = Result<LeafEntry, EseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.pending.next() {
                return Some(Ok(entry));
            }

            let next_page = match self.state {
                LeafIterState::Start(root) => {
                    self.state = LeafIterState::Done;
                    match leftmost_leaf(self.reader, root) {
                        Ok(Some(page)) => page,
                        Ok(None) => return None,
                        Err(error) => return Some(Err(error)),
                    }
                }
                LeafIterState::Walking(page) => page,
                LeafIterState::Done => return None,
            };

            if let LeafIterState::Walking(_) = self.state {
                self.state = LeafIterState::Done;
            }
            match self.load_page(next_page) {
                Ok(true) => continue,
                Ok(false) => return None,
                Err(error) => {
                    self.state = LeafIterState::Done;
                    return Some(Err(error));
                }
            }
        }
    }
}

/// Find the leaf entry with exactly the given key, descending branch pages
/// by lexicographic comparison.
pub fn find_entry(
    reader: &dyn PageReader,
    root_page: u32,
    key: &[u8],
) -> Result<Option<LeafEntry>, EseError> {
    let mut current = root_page;
    let mut depth = 0u32;

    loop {
        reader.check_abort()?;
        if is_sentinel_page(current) {
            return Err(EseError::Format(format!(
                "Tree truncated at child page {:#x}",
                current
            )));
        }
        if depth > reader.total_pages() {
            return Err(EseError::Format(
                "Key descent exceeded the page count; cyclic child references".into(),
            ));
        }
        depth += 1;

        let page = reader.tree_page(current)?;
        if page.header.is_leaf() {
            let entries = leaf_entries(&page)?;
            return Ok(entries.into_iter().find(|entry| entry.key == key));
        }

        let entries = branch_entries(&page)?;
        if entries.is_empty() {
            return Ok(None);
        }
        // Branch keys are upper bounds: take the first child whose key is
        // not below the target, falling back to the rightmost child.
        let chosen = entries
            .iter()
            .find(|entry| entry.key.as_slice() >= key)
            .unwrap_or_else(|| entries.last().unwrap());
        current = chosen.child_page;
    }
}
