//! Named node trees on top of the block format.
//!
//! [`NodeFile`] reads the whole node hierarchy (headers only) into a
//! [`NodeSnapshot`] tree and writes a new hierarchy from a [`NodeSpec`].
//! Writing is append-only: unchanged subtrees are referenced by position
//! with [`NodeSpec::Existing`], new nodes are written bottom-up, and the
//! header's root position is patched last.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use super::codec::{decode_header, encode_header, NodeHeader, NodeKind, PayloadInfo};
use super::compression::{self, Codec};
use super::format::*;
use super::reader::{BlockReader, ChildRef, DataBlock, GroupBlock};
use super::writer::BlockWriter;
use crate::util::{Attributes, Error, Result};

/// Options for opening or creating a node file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeOptions {
    /// Allow commits.
    pub writable: bool,
    /// Read through a memory map.
    pub use_mmap: bool,
    /// zlib level for new payloads, 0 to store them uncompressed.
    pub compression_level: u32,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            writable: true,
            use_mmap: true,
            compression_level: 0,
        }
    }
}

/// Location of an array node's payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PayloadRef {
    /// Data block position (0 when empty).
    pub pos: u64,
    pub info: PayloadInfo,
}

/// A node as read from disk, without its payload.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeSnapshot {
    pub name: String,
    /// Slash-separated path from the root (`/` for the root).
    pub path: String,
    pub kind: NodeKind,
    pub attrs: Attributes,
    /// Position of the node's group block.
    pub pos: u64,
    pub payload: Option<PayloadRef>,
    pub children: Vec<NodeSnapshot>,
    /// Set when the node could not be decoded; the rest is placeholder.
    pub error: Option<String>,
}

impl NodeSnapshot {
    pub fn child(&self, name: &str) -> Option<&NodeSnapshot> {
        self.children.iter().find(|c| c.name == name && c.error.is_none())
    }

    #[inline]
    pub fn is_group(&self) -> bool {
        self.kind == NodeKind::Group
    }

    /// Child path for `name` below this node.
    pub fn join(&self, name: &str) -> String {
        join_path(&self.path, name)
    }

    fn broken(path: String, pos: u64, reason: String) -> Self {
        let name = path.rsplit('/').next().unwrap_or_default().to_string();
        Self {
            name,
            path,
            kind: NodeKind::Group,
            attrs: Attributes::new(),
            pos,
            payload: None,
            children: Vec::new(),
            error: Some(reason),
        }
    }
}

/// Description of a node tree to write.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeSpec {
    /// Reuse a node already in the file, by group position.
    Existing(u64),
    Group {
        name: String,
        attrs: Attributes,
        children: Vec<NodeSpec>,
    },
    Array {
        name: String,
        attrs: Attributes,
        payload: Vec<u8>,
    },
}

impl NodeSpec {
    pub fn group(name: impl Into<String>, attrs: Attributes, children: Vec<NodeSpec>) -> Self {
        Self::Group { name: name.into(), attrs, children }
    }

    pub fn array(name: impl Into<String>, attrs: Attributes, payload: Vec<u8>) -> Self {
        Self::Array { name: name.into(), attrs, payload }
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// An open node file.
pub struct NodeFile {
    path: PathBuf,
    options: NodeOptions,
    reader: Arc<BlockReader>,
    root: NodeSnapshot,
}

impl NodeFile {
    /// Create a new file holding an empty root group.
    pub fn create(path: impl AsRef<Path>, options: NodeOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut out = BlockWriter::create(&path)?;
        let root = write_spec(&mut out, &NodeSpec::group("", Attributes::new(), Vec::new()), 0)?;
        out.commit_root(root)?;
        drop(out);
        debug!(path = %path.display(), "created node file");
        Self::open(path, options)
    }

    /// Open an existing file and read its node hierarchy.
    pub fn open(path: impl AsRef<Path>, options: NodeOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let reader = Arc::new(BlockReader::open(&path, options.use_mmap)?);
        let version = reader.header().version;
        if version > CURRENT_VERSION {
            return Err(Error::UnsupportedSchema {
                path: "/".to_string(),
                version: version.into(),
                supported: CURRENT_VERSION.into(),
            });
        }
        if !reader.header().committed {
            warn!(path = %path.display(), "node file has an unfinished commit, reading last committed root");
        }
        let root = read_root(&reader)?;
        Ok(Self { path, options, reader, root })
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn options(&self) -> NodeOptions {
        self.options
    }

    #[inline]
    pub fn root(&self) -> &NodeSnapshot {
        &self.root
    }

    /// File size in bytes.
    #[inline]
    pub fn size(&self) -> u64 {
        self.reader.len()
    }

    /// Read, inflate and verify an array node's payload.
    pub fn read_payload(&self, node: &NodeSnapshot) -> Result<Vec<u8>> {
        let payload = node
            .payload
            .ok_or_else(|| Error::other(format!("'{}' has no payload", node.path)))?;
        let raw_len = usize::try_from(payload.info.raw_len)
            .map_err(|_| Error::other(format!("payload length {} out of range", payload.info.raw_len)))?;
        let stored = DataBlock::read(self.reader.clone(), payload.pos)?.bytes()?;
        let raw = match payload.info.codec {
            Codec::None => stored,
            Codec::Zlib => compression::decompress(&stored, raw_len)?,
        };
        if raw.len() != raw_len {
            return Err(Error::length("payload", raw_len, raw.len()));
        }
        let crc = compression::checksum(&raw);
        if crc != payload.info.crc32 {
            return Err(Error::other(format!(
                "payload checksum mismatch: stored {:08x}, computed {:08x}",
                payload.info.crc32, crc
            )));
        }
        Ok(raw)
    }

    /// Write `root` as the new root node and reload the hierarchy.
    pub fn commit(&mut self, root: &NodeSpec) -> Result<()> {
        if !self.options.writable {
            return Err(Error::ReadOnly);
        }
        let mut out = BlockWriter::append(&self.path)?;
        let root_pos = write_spec(&mut out, root, self.options.compression_level)?;
        out.commit_root(root_pos)?;
        drop(out);
        debug!(path = %self.path.display(), root_pos, "committed node tree");
        self.reload()
    }

    /// Re-read the file, picking up blocks appended since it was opened.
    pub fn reload(&mut self) -> Result<()> {
        let reader = Arc::new(BlockReader::open(&self.path, self.options.use_mmap)?);
        self.root = read_root(&reader)?;
        self.reader = reader;
        Ok(())
    }

    /// Spec that rewrites `node` and its subtree with fresh payload blocks.
    pub fn to_spec(&self, node: &NodeSnapshot) -> Result<NodeSpec> {
        if let Some(reason) = &node.error {
            return Err(Error::other(format!("'{}': {}", node.path, reason)));
        }
        Ok(match node.kind {
            NodeKind::Group => NodeSpec::Group {
                name: node.name.clone(),
                attrs: node.attrs.clone(),
                children: node
                    .children
                    .iter()
                    .filter(|c| c.error.is_none())
                    .map(|c| self.to_spec(c))
                    .collect::<Result<_>>()?,
            },
            NodeKind::Array => NodeSpec::Array {
                name: node.name.clone(),
                attrs: node.attrs.clone(),
                payload: self.read_payload(node)?,
            },
        })
    }

    /// Rewrite the file keeping only the nodes reachable from the root.
    pub fn compact(&mut self) -> Result<()> {
        if !self.options.writable {
            return Err(Error::ReadOnly);
        }
        let spec = self.to_spec(&self.root)?;
        let tmp = self.path.with_extension("compact.tmp");
        let mut out = BlockWriter::create(&tmp)?;
        let root_pos = write_spec(&mut out, &spec, self.options.compression_level)?;
        out.commit_root(root_pos)?;
        drop(out);
        let before = self.reader.len();
        std::fs::rename(&tmp, &self.path)?;
        self.reload()?;
        debug!(before, after = self.reader.len(), "compacted node file");
        Ok(())
    }
}

/// Write a spec bottom-up and return the group position of its node.
fn write_spec(out: &mut BlockWriter, spec: &NodeSpec, level: u32) -> Result<u64> {
    match spec {
        NodeSpec::Existing(pos) => Ok(*pos),
        NodeSpec::Group { name, attrs, children } => {
            let header = NodeHeader {
                kind: NodeKind::Group,
                name: name.clone(),
                payload: None,
                attrs: attrs.clone(),
            };
            let header_pos = out.write_data(&encode_header(&header)?)?;
            let mut offsets = Vec::with_capacity(children.len() + 1);
            offsets.push(ChildRef::Data(header_pos));
            for child in children {
                offsets.push(ChildRef::Group(write_spec(out, child, level)?));
            }
            out.write_group(&offsets)
        }
        NodeSpec::Array { name, attrs, payload } => {
            let crc32 = compression::checksum(payload);
            let (codec, stored) = match compression::compress(payload, level)? {
                Some(compressed) => (Codec::Zlib, compressed),
                None => (Codec::None, payload.clone()),
            };
            let header = NodeHeader {
                kind: NodeKind::Array,
                name: name.clone(),
                payload: Some(PayloadInfo {
                    codec,
                    raw_len: payload.len() as u64,
                    crc32,
                }),
                attrs: attrs.clone(),
            };
            let header_pos = out.write_data(&encode_header(&header)?)?;
            let payload_pos = out.write_data(&stored)?;
            out.write_group(&[ChildRef::Data(header_pos), ChildRef::Data(payload_pos)])
        }
    }
}

fn read_root(reader: &Arc<BlockReader>) -> Result<NodeSnapshot> {
    let root_pos = reader.header().root_pos;
    if root_pos < HEADER_SIZE as u64 || root_pos >= reader.len() {
        return Err(Error::UnexpectedEof(root_pos));
    }
    read_node(reader, root_pos, None)
}

/// Read the node whose group block is at `pos`. Children that fail to
/// decode become placeholder snapshots carrying the error.
fn read_node(reader: &Arc<BlockReader>, pos: u64, parent: Option<&str>) -> Result<NodeSnapshot> {
    let group = GroupBlock::read(reader.clone(), pos)?;
    let header_data = group.data(NODE_HEADER_CHILD)?;
    if header_data.pos() >= pos {
        return Err(Error::other("node header is not below its group"));
    }
    let header = decode_header(&header_data.bytes()?)?;
    let path = match parent {
        Some(parent) => join_path(parent, &header.name),
        None => "/".to_string(),
    };

    let mut node = NodeSnapshot {
        name: header.name,
        path,
        kind: header.kind,
        attrs: header.attrs,
        pos,
        payload: None,
        children: Vec::new(),
        error: None,
    };

    match node.kind {
        NodeKind::Array => {
            let data = group.data(NODE_PAYLOAD_CHILD)?;
            let info = header.payload.unwrap_or_default();
            node.payload = Some(PayloadRef { pos: data.pos(), info });
        }
        NodeKind::Group => {
            for (i, &child_ref) in group.child_refs().iter().enumerate().skip(1) {
                let child_pos = child_ref.pos();
                // children are always written before their parent
                let child = match child_ref {
                    ChildRef::Group(p) if p != 0 && p < pos => read_node(reader, p, Some(&node.path)),
                    _ => Err(Error::other(format!("bad child reference {:?}", child_ref))),
                };
                match child {
                    Ok(child) => node.children.push(child),
                    Err(e) => {
                        let placeholder = node.join(&format!("#{}", i - 1));
                        warn!(path = %placeholder, error = %e, "unreadable node");
                        node.children.push(NodeSnapshot::broken(placeholder, child_pos, e.to_string()));
                    }
                }
            }
        }
    }
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(level: u32) -> NodeOptions {
        NodeOptions { writable: true, use_mmap: false, compression_level: level }
    }

    fn tree() -> NodeSpec {
        NodeSpec::group(
            "",
            Attributes::new().with("title", "run"),
            vec![NodeSpec::group(
                "frame",
                Attributes::new().with("order", 0i64),
                vec![
                    NodeSpec::array("data00", Attributes::new().with("unit", "V"), vec![7u8; 400]),
                    NodeSpec::array("empty", Attributes::new(), Vec::new()),
                ],
            )],
        )
    }

    #[test]
    fn test_create_commit_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.acq");
        let mut file = NodeFile::create(&path, opts(0)).unwrap();
        assert!(file.root().children.is_empty());

        file.commit(&tree()).unwrap();
        let root = file.root();
        assert_eq!(root.path, "/");
        assert_eq!(root.attrs.get_str("title"), Some("run"));
        let frame = root.child("frame").unwrap();
        assert_eq!(frame.path, "/frame");
        let data = frame.child("data00").unwrap();
        assert_eq!(data.path, "/frame/data00");
        assert_eq!(data.kind, NodeKind::Array);
        assert_eq!(file.read_payload(data).unwrap(), vec![7u8; 400]);
        assert!(file.read_payload(frame.child("empty").unwrap()).unwrap().is_empty());

        let reopened = NodeFile::open(&path, NodeOptions { use_mmap: true, ..opts(0) }).unwrap();
        assert_eq!(reopened.root(), file.root());
    }

    #[test]
    fn test_compressed_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("z.acq");
        let mut file = NodeFile::create(&path, opts(6)).unwrap();
        file.commit(&tree()).unwrap();
        let data = file.root().child("frame").unwrap().child("data00").unwrap().clone();
        assert_eq!(data.payload.unwrap().info.codec, Codec::Zlib);
        assert_eq!(file.read_payload(&data).unwrap(), vec![7u8; 400]);
    }

    #[test]
    fn test_existing_reuse_and_compact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.acq");
        let mut file = NodeFile::create(&path, opts(0)).unwrap();
        file.commit(&tree()).unwrap();
        let frame_pos = file.root().child("frame").unwrap().pos;

        // same frame under a second root, plus one more group
        let root = NodeSpec::group(
            "",
            Attributes::new(),
            vec![
                NodeSpec::Existing(frame_pos),
                NodeSpec::group("other", Attributes::new(), Vec::new()),
            ],
        );
        file.commit(&root).unwrap();
        assert_eq!(file.root().children.len(), 2);
        assert_eq!(file.root().child("frame").unwrap().pos, frame_pos);

        let size = file.size();
        file.compact().unwrap();
        assert!(file.size() < size);
        let data = file.root().child("frame").unwrap().child("data00").unwrap().clone();
        assert_eq!(file.read_payload(&data).unwrap(), vec![7u8; 400]);
    }

    #[test]
    fn test_corrupt_payload_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.acq");
        let mut file = NodeFile::create(&path, opts(0)).unwrap();
        file.commit(&tree()).unwrap();
        let data = file.root().child("frame").unwrap().child("data00").unwrap().clone();
        drop(file);

        let mut bytes = std::fs::read(&path).unwrap();
        let at = (data.payload.unwrap().pos + 8 + 10) as usize;
        bytes[at] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let file = NodeFile::open(&path, opts(0)).unwrap();
        let err = file.read_payload(&data).unwrap_err();
        assert!(err.to_string().contains("checksum"));
    }

    #[test]
    fn test_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ro.acq");
        NodeFile::create(&path, opts(0)).unwrap();
        let mut file = NodeFile::open(&path, NodeOptions { writable: false, ..opts(0) }).unwrap();
        assert!(matches!(file.commit(&tree()), Err(Error::ReadOnly)));
    }

    #[test]
    fn test_newer_format_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.acq");
        NodeFile::create(&path, opts(0)).unwrap();
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[VERSION_OFFSET..VERSION_OFFSET + 2].copy_from_slice(&(CURRENT_VERSION + 1).to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();
        assert!(matches!(
            NodeFile::open(&path, opts(0)),
            Err(Error::UnsupportedSchema { version: 2, supported: 1, .. })
        ));
    }
}
