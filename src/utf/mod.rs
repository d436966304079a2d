//! UTF container reader.
//!
//! A UTF file is a small filesystem packed into one buffer: a fixed header,
//! a tree of 0x2C-byte entry records linked by offsets, a dictionary of
//! NUL-terminated entry names and a data segment holding file contents.
//! The root entry always sits at tree offset 0. Folder children form a
//! singly linked sibling list that [`Entry::children`] walks lazily.
//!
//! Header layout (little-endian `u32`s, 0x38 bytes): signature, version,
//! tree offset, tree size, unused offset, entry size, names offset, names
//! allocated size, names used size, data offset, filetime low, filetime high.
//!
//! Entry layout (little-endian `u32`s, 0x2C bytes): next sibling offset, name
//! offset, file attributes, sharing attributes, child or data offset,
//! allocated data size, used data size, uncompressed size, three timestamps.

pub mod cursor;

use std::rc::Rc;

use crate::error::{Error, Result};

pub use cursor::Cursor;

pub const SIGNATURE: u32 = 0x2046_5455;
pub const VERSION: u32 = 0x101;
pub const HEADER_SIZE: usize = 0x38;
pub const ENTRY_SIZE: usize = 0x2C;
pub const ATTRIBUTE_FILE: u32 = 0x80;
pub const ATTRIBUTE_FOLDER: u32 = 0x10;

/// Parsed container with its three segments split out.
#[derive(Debug)]
pub struct UtfReader {
    tree: Vec<u8>,
    names: Vec<u8>,
    data: Rc<[u8]>,
    filename: Option<String>,
}

fn range_slice<'a>(bytes: &'a [u8], offset: u32, len: u32, what: &str) -> Result<&'a [u8]> {
    let start = offset as usize;
    let end = start
        .checked_add(len as usize)
        .filter(|&end| end <= bytes.len())
        .ok_or_else(|| {
            Error::range(format!(
                "{what} ({len} bytes at {offset}) exceeds file of {} bytes",
                bytes.len()
            ))
        })?;
    Ok(&bytes[start..end])
}

impl UtfReader {
    /// Validates the header and splits `bytes` into tree, names and data.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE + ENTRY_SIZE {
            return Err(Error::range(format!(
                "{} bytes is too small for a UTF file",
                bytes.len()
            )));
        }

        let mut header = Cursor::from_vec(bytes[..HEADER_SIZE].to_vec());
        let fields = header.read_u32s(10)?;
        let [signature, version, tree_offset, tree_size] =
            [fields[0], fields[1], fields[2], fields[3]];
        let [entry_size, names_offset, names_size, names_used] =
            [fields[5], fields[6], fields[7], fields[8]];
        let data_offset = fields[9];
        let size = bytes.len() as u64;

        if signature != SIGNATURE {
            return Err(Error::format(format!("invalid UTF signature {signature:#010x}")));
        }
        if version != VERSION {
            return Err(Error::format(format!("invalid UTF version {version:#x}")));
        }
        if entry_size as usize != ENTRY_SIZE {
            return Err(Error::format(format!("invalid UTF entry size {entry_size:#x}")));
        }
        if tree_offset as u64 > size {
            return Err(Error::range("tree offset is out of bounds"));
        }
        if tree_size == 0 {
            return Err(Error::range("tree has no size"));
        }
        if names_offset as u64 > size {
            return Err(Error::range("dictionary offset is out of bounds"));
        }
        if names_used > names_size {
            return Err(Error::range("dictionary used size exceeds allocated size"));
        }
        if data_offset as u64 > size {
            return Err(Error::range("data offset is out of bounds"));
        }

        let tree = range_slice(bytes, tree_offset, tree_size, "tree")?.to_vec();
        let names = range_slice(bytes, names_offset, names_size, "dictionary")?.to_vec();
        let data: Rc<[u8]> = bytes[data_offset as usize..].into();

        Ok(Self {
            tree,
            names,
            data,
            filename: None,
        })
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// Size of the data segment in bytes.
    pub fn data_len(&self) -> usize {
        self.data.len()
    }

    pub fn root(&self) -> Result<Entry<'_>> {
        self.entry(0)
    }

    /// Decodes the entry record at `offset` into the tree.
    pub fn entry(&self, offset: u32) -> Result<Entry<'_>> {
        let start = offset as usize;
        if start + ENTRY_SIZE > self.tree.len() {
            return Err(Error::range(format!("invalid entry offset {offset}")));
        }
        let record = &self.tree[start..start + ENTRY_SIZE];
        let field = |index: usize| {
            let at = index * 4;
            u32::from_le_bytes([record[at], record[at + 1], record[at + 2], record[at + 3]])
        };

        let attributes = field(2);
        // Some producers write folders with a non-zero used size.
        let data_size = if attributes & ATTRIBUTE_FOLDER != 0 { 0 } else { field(6) };

        Ok(Entry {
            reader: self,
            offset,
            next_offset: field(0),
            name_offset: field(1),
            attributes,
            child_offset: field(4),
            data_size,
        })
    }

    /// Name stored at `name_offset` in the dictionary, up to the first NUL.
    pub fn entry_name(&self, name_offset: u32) -> String {
        let start = (name_offset as usize).min(self.names.len());
        let tail = &self.names[start..];
        let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
        tail[..end].iter().map(|&b| b as char).collect()
    }
}

/// One record of the entry tree, borrowed from its reader.
#[derive(Clone, Copy)]
pub struct Entry<'r> {
    reader: &'r UtfReader,
    offset: u32,
    next_offset: u32,
    name_offset: u32,
    attributes: u32,
    child_offset: u32,
    data_size: u32,
}

impl std::fmt::Debug for Entry<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("name", &self.name())
            .field("offset", &self.offset)
            .field("child_offset", &self.child_offset)
            .field("data_size", &self.data_size)
            .finish()
    }
}

impl PartialEq for Entry<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.reader, other.reader) && self.offset == other.offset
    }
}

impl<'r> Entry<'r> {
    pub fn reader(&self) -> &'r UtfReader {
        self.reader
    }

    /// Offset of this record in the tree.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn name(&self) -> String {
        self.reader.entry_name(self.name_offset)
    }

    /// Lower-case name used for lookups.
    pub fn tag(&self) -> String {
        self.name().to_ascii_lowercase()
    }

    pub fn is_folder(&self) -> bool {
        self.attributes & ATTRIBUTE_FOLDER != 0
    }

    pub fn has_sibling(&self) -> bool {
        self.next_offset > 0
    }

    pub fn has_child(&self) -> bool {
        self.data_size == 0 && self.child_offset > 0
    }

    pub fn has_data(&self) -> bool {
        self.data_size > 0
    }

    pub fn data_size(&self) -> u32 {
        self.data_size
    }

    /// Cursor over the file contents.
    pub fn data(&self) -> Result<Cursor> {
        if !self.has_data() {
            return Err(Error::structure(format!("entry {} holds no data", self.name())));
        }
        let end = self.child_offset as u64 + self.data_size as u64;
        if end > self.reader.data.len() as u64 {
            return Err(Error::range(format!(
                "data of entry {} is out of bounds",
                self.name()
            )));
        }
        Cursor::new(
            self.reader.data.clone(),
            self.child_offset as usize,
            self.data_size as usize,
        )
    }

    /// Lazy iterator over the direct children; each call starts over.
    pub fn children(&self) -> Children<'r> {
        let first = if self.has_child() { self.child_offset } else { 0 };
        Children {
            reader: self.reader,
            next: first,
            budget: self.reader.tree.len() / ENTRY_SIZE + 1,
        }
    }

    /// Finds several children by tag in a single pass.
    ///
    /// Matching is case-insensitive and the first child with a tag wins.
    pub fn find<const N: usize>(&self, tags: [&str; N]) -> Result<[Option<Entry<'r>>; N]> {
        let tags = tags.map(str::to_ascii_lowercase);
        let mut found: [Option<Entry<'r>>; N] = [None; N];
        let mut missing = N;

        for child in self.children() {
            if missing == 0 {
                break;
            }
            let (tag, entry) = child?;
            if let Some(index) = tags.iter().position(|t| *t == tag) {
                if found[index].is_none() {
                    found[index] = Some(entry);
                    missing -= 1;
                }
            }
        }
        Ok(found)
    }

    pub fn find_one(&self, tag: &str) -> Result<Option<Entry<'r>>> {
        let [entry] = self.find([tag])?;
        Ok(entry)
    }
}

/// Walks a sibling list; yields `(tag, entry)` pairs.
///
/// Stops after an invalid offset (yielding the error once) or once more
/// records were visited than the tree can hold, which only happens for
/// cyclic sibling chains.
pub struct Children<'r> {
    reader: &'r UtfReader,
    next: u32,
    budget: usize,
}

impl<'r> Iterator for Children<'r> {
    type Item = Result<(String, Entry<'r>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next == 0 {
            return None;
        }
        if self.budget == 0 {
            log::warn!("UTF sibling chain loops at offset {}", self.next);
            self.next = 0;
            return None;
        }
        self.budget -= 1;

        match self.reader.entry(self.next) {
            Ok(entry) => {
                self.next = entry.next_offset;
                Some(Ok((entry.tag(), entry)))
            }
            Err(e) => {
                self.next = 0;
                Some(Err(e))
            }
        }
    }
}
