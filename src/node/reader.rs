//! Block-level reader for node files.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use memmap2::Mmap;
use parking_lot::Mutex;

use super::format::*;
use crate::util::{Error, Result};

/// Parsed 16-byte file header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u16,
    /// False if the last commit did not complete.
    pub committed: bool,
    pub root_pos: u64,
}

impl FileHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::UnexpectedEof(bytes.len() as u64));
        }
        if &bytes[..NODE_MAGIC.len()] != NODE_MAGIC {
            return Err(Error::InvalidMagic);
        }
        Ok(Self {
            version: LittleEndian::read_u16(&bytes[VERSION_OFFSET..]),
            committed: bytes[FLAG_OFFSET] == COMMITTED_FLAG,
            root_pos: LittleEndian::read_u64(&bytes[ROOT_POS_OFFSET..]),
        })
    }
}

enum Source {
    Mapped(Mmap),
    /// seek + read pairs must not interleave between threads
    Locked(Mutex<File>),
}

/// Random-access reader over the blocks of one node file snapshot.
///
/// The file length is fixed at open time; blocks appended afterwards are
/// only visible to a new reader.
pub struct BlockReader {
    source: Source,
    header: FileHeader,
    len: u64,
}

impl BlockReader {
    /// Open `path`, memory-mapping it when `use_mmap` is set and the `mmap`
    /// feature is enabled.
    pub fn open(path: impl AsRef<Path>, use_mmap: bool) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
            _ => Error::Io(e),
        })?;
        let len = file.metadata()?.len();
        if len < HEADER_SIZE as u64 {
            return Err(Error::UnexpectedEof(len));
        }

        let (source, header) = if use_mmap && cfg!(feature = "mmap") {
            // Safety: committed blocks are never rewritten in place, only the
            // header flag and root position are patched.
            let map = unsafe { Mmap::map(&file) }.map_err(|e| Error::MmapFailed(e.to_string()))?;
            let header = FileHeader::parse(&map)?;
            (Source::Mapped(map), header)
        } else {
            let mut bytes = [0u8; HEADER_SIZE];
            file.read_exact(&mut bytes)?;
            (Source::Locked(Mutex::new(file)), FileHeader::parse(&bytes)?)
        };
        Ok(Self { source, header, len })
    }

    #[inline]
    pub fn header(&self) -> FileHeader {
        self.header
    }

    /// File length at open time.
    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == HEADER_SIZE as u64
    }

    #[inline]
    pub fn is_mapped(&self) -> bool {
        matches!(self.source, Source::Mapped(_))
    }

    /// Fill `buf` from `pos`, failing if the range runs past the end.
    pub fn read_at(&self, pos: u64, buf: &mut [u8]) -> Result<()> {
        let end = pos
            .checked_add(buf.len() as u64)
            .filter(|&end| end <= self.len)
            .ok_or(Error::UnexpectedEof(pos.saturating_add(buf.len() as u64)))?;
        match &self.source {
            Source::Mapped(map) => buf.copy_from_slice(&map[pos as usize..end as usize]),
            Source::Locked(file) => {
                let mut file = file.lock();
                file.seek(SeekFrom::Start(pos))?;
                file.read_exact(buf)?;
            }
        }
        Ok(())
    }

    pub fn read_u64_at(&self, pos: u64) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_at(pos, &mut buf)?;
        Ok(LittleEndian::read_u64(&buf))
    }
}

/// A decoded child offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChildRef {
    Group(u64),
    Data(u64),
}

impl ChildRef {
    pub fn decode(raw: u64) -> Self {
        if is_group_offset(raw) {
            Self::Group(extract_offset(raw))
        } else {
            Self::Data(extract_offset(raw))
        }
    }

    pub fn encode(self) -> u64 {
        match self {
            Self::Group(pos) => make_group_offset(pos),
            Self::Data(pos) => make_data_offset(pos),
        }
    }

    #[inline]
    pub fn pos(self) -> u64 {
        match self {
            Self::Group(pos) | Self::Data(pos) => pos,
        }
    }
}

/// A group block: an ordered list of child references.
#[derive(Clone)]
pub struct GroupBlock {
    reader: Arc<BlockReader>,
    pos: u64,
    children: Vec<ChildRef>,
}

impl GroupBlock {
    /// Read the group at `pos`. Position 0 is the empty group.
    pub fn read(reader: Arc<BlockReader>, pos: u64) -> Result<Self> {
        if pos == 0 {
            return Ok(Self { reader, pos, children: Vec::new() });
        }
        let count = reader.read_u64_at(pos)?;
        let table = pos + 8;
        // bound the count by the bytes left so a corrupt value cannot allocate
        if count > reader.len().saturating_sub(table) / 8 {
            return Err(Error::UnexpectedEof(table.saturating_add(count.saturating_mul(8))));
        }
        let mut raw = vec![0u8; count as usize * 8];
        reader.read_at(table, &mut raw)?;
        let children = raw
            .chunks_exact(8)
            .map(|c| ChildRef::decode(LittleEndian::read_u64(c)))
            .collect();
        Ok(Self { reader, pos, children })
    }

    #[inline]
    pub fn pos(&self) -> u64 {
        self.pos
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn child(&self, index: usize) -> Result<ChildRef> {
        self.children.get(index).copied().ok_or(Error::IndexOutOfBounds {
            index,
            len: self.children.len(),
        })
    }

    pub fn child_refs(&self) -> &[ChildRef] {
        &self.children
    }

    /// Child group at `index`.
    pub fn group(&self, index: usize) -> Result<GroupBlock> {
        match self.child(index)? {
            ChildRef::Group(pos) => GroupBlock::read(self.reader.clone(), pos),
            ChildRef::Data(_) => Err(Error::other(format!(
                "child {} of group at {} is data, expected a group",
                index, self.pos
            ))),
        }
    }

    /// Child data block at `index`.
    pub fn data(&self, index: usize) -> Result<DataBlock> {
        match self.child(index)? {
            ChildRef::Data(pos) => DataBlock::read(self.reader.clone(), pos),
            ChildRef::Group(_) => Err(Error::other(format!(
                "child {} of group at {} is a group, expected data",
                index, self.pos
            ))),
        }
    }

    pub fn blocks(&self) -> impl Iterator<Item = Result<Block>> + '_ {
        self.children.iter().map(move |child| match *child {
            ChildRef::Group(pos) => GroupBlock::read(self.reader.clone(), pos).map(Block::Group),
            ChildRef::Data(pos) => DataBlock::read(self.reader.clone(), pos).map(Block::Data),
        })
    }
}

/// Either kind of block.
pub enum Block {
    Group(GroupBlock),
    Data(DataBlock),
}

impl Block {
    pub fn as_group(&self) -> Option<&GroupBlock> {
        match self {
            Self::Group(g) => Some(g),
            Self::Data(_) => None,
        }
    }

    pub fn as_data(&self) -> Option<&DataBlock> {
        match self {
            Self::Data(d) => Some(d),
            Self::Group(_) => None,
        }
    }
}

/// A length-prefixed data block.
pub struct DataBlock {
    reader: Arc<BlockReader>,
    pos: u64,
    len: u64,
}

impl DataBlock {
    /// Read the length of the block at `pos`. Position 0 is empty data.
    pub fn read(reader: Arc<BlockReader>, pos: u64) -> Result<Self> {
        let len = if pos == 0 { 0 } else { reader.read_u64_at(pos)? };
        let end = pos.saturating_add(8).saturating_add(len);
        if pos != 0 && end > reader.len() {
            return Err(Error::UnexpectedEof(end));
        }
        Ok(Self { reader, pos, len })
    }

    #[inline]
    pub fn pos(&self) -> u64 {
        self.pos
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bytes(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.len as usize];
        if !buf.is_empty() {
            self.reader.read_at(self.pos + 8, &mut buf)?;
        }
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::BlockWriter;

    #[test]
    fn test_header_parse() {
        let mut bytes = [0u8; 16];
        bytes[..5].copy_from_slice(NODE_MAGIC);
        bytes[FLAG_OFFSET] = COMMITTED_FLAG;
        bytes[VERSION_OFFSET] = 1;
        bytes[ROOT_POS_OFFSET] = 0x40;

        let header = FileHeader::parse(&bytes).unwrap();
        assert_eq!(header, FileHeader { version: 1, committed: true, root_pos: 0x40 });
        assert!(matches!(FileHeader::parse(&[0u8; 16]), Err(Error::InvalidMagic)));
        assert!(matches!(FileHeader::parse(&bytes[..8]), Err(Error::UnexpectedEof(8))));
    }

    #[test]
    fn test_child_ref_bits() {
        assert_eq!(ChildRef::decode(make_data_offset(0x20)), ChildRef::Data(0x20));
        assert_eq!(ChildRef::decode(0x20), ChildRef::Group(0x20));
        assert_eq!(ChildRef::Data(0x20).encode(), make_data_offset(0x20));
    }

    #[test]
    fn test_walk_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.acq");
        let mut out = BlockWriter::create(&path).unwrap();
        let a = out.write_data(b"alpha").unwrap();
        let empty = out.write_data(&[]).unwrap();
        let inner = out.write_group(&[ChildRef::Data(a)]).unwrap();
        let root = out
            .write_group(&[ChildRef::Data(a), ChildRef::Data(empty), ChildRef::Group(inner)])
            .unwrap();
        out.commit_root(root).unwrap();
        drop(out);

        for use_mmap in [false, true] {
            let reader = Arc::new(BlockReader::open(&path, use_mmap).unwrap());
            assert!(reader.header().committed);
            assert_eq!(reader.is_mapped(), use_mmap && cfg!(feature = "mmap"));
            let group = GroupBlock::read(reader.clone(), reader.header().root_pos).unwrap();
            let blocks: Vec<Block> = group.blocks().collect::<Result<_>>().unwrap();
            assert_eq!(blocks.len(), 3);
            assert_eq!(blocks[0].as_data().unwrap().bytes().unwrap(), b"alpha");
            assert!(blocks[1].as_data().unwrap().is_empty());
            let inner = blocks[2].as_group().unwrap();
            assert_eq!(inner.data(0).unwrap().len(), 5);
            assert!(inner.group(0).is_err());
            assert!(group.child(3).is_err());
        }
    }

    #[test]
    fn test_short_or_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.acq");
        std::fs::write(&path, b"ACQND").unwrap();
        assert!(matches!(BlockReader::open(&path, false), Err(Error::UnexpectedEof(5))));
        assert!(matches!(
            BlockReader::open(dir.path().join("missing.acq"), false),
            Err(Error::FileNotFound(_))
        ));
    }
}
