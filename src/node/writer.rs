//! Append-only block writer for node files.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};

use super::format::*;
use super::reader::ChildRef;
use crate::util::Result;

const BUFFER_SIZE: usize = 1 << 20;

/// Appends blocks to a node file and publishes new roots.
///
/// Blocks written by one commit become visible to readers only once
/// [`commit_root`](Self::commit_root) patches the header.
pub struct BlockWriter {
    out: BufWriter<File>,
    pos: u64,
}

impl BlockWriter {
    /// Create (or truncate) a file and write a dirty header with no root.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let mut writer = Self { out: BufWriter::with_capacity(BUFFER_SIZE, file), pos: 0 };

        writer.out.write_all(NODE_MAGIC)?;
        writer.out.write_u8(DIRTY_FLAG)?;
        writer.out.write_u16::<LittleEndian>(CURRENT_VERSION)?;
        writer.out.write_u64::<LittleEndian>(0)?;
        writer.pos = HEADER_SIZE as u64;
        Ok(writer)
    }

    /// Open an existing file for appending and flag it dirty until the next
    /// [`commit_root`](Self::commit_root).
    pub fn append(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        file.seek(SeekFrom::Start(FLAG_OFFSET as u64))?;
        file.write_u8(DIRTY_FLAG)?;
        let pos = file.seek(SeekFrom::End(0))?;
        Ok(Self { out: BufWriter::with_capacity(BUFFER_SIZE, file), pos })
    }

    /// Position the next block will be written at.
    #[inline]
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Write a data block and return its position (0 for empty data).
    pub fn write_data(&mut self, data: &[u8]) -> Result<u64> {
        if data.is_empty() {
            return Ok(0);
        }
        let pos = self.pos;
        self.out.write_u64::<LittleEndian>(data.len() as u64)?;
        self.out.write_all(data)?;
        self.pos += 8 + data.len() as u64;
        Ok(pos)
    }

    /// Write a group block and return its position (0 for no children).
    pub fn write_group(&mut self, children: &[ChildRef]) -> Result<u64> {
        if children.is_empty() {
            return Ok(0);
        }
        let pos = self.pos;
        self.out.write_u64::<LittleEndian>(children.len() as u64)?;
        for child in children {
            self.out.write_u64::<LittleEndian>(child.encode())?;
        }
        self.pos += 8 * (children.len() as u64 + 1);
        Ok(pos)
    }

    /// Flush all blocks, point the header at `root_pos` and mark the file
    /// committed. The flag is written after the root so a crash in between
    /// leaves the file flagged dirty.
    pub fn commit_root(&mut self, root_pos: u64) -> Result<()> {
        self.out.flush()?;
        let file = self.out.get_mut();
        file.sync_data()?;
        file.seek(SeekFrom::Start(ROOT_POS_OFFSET as u64))?;
        file.write_u64::<LittleEndian>(root_pos)?;
        file.sync_data()?;
        file.seek(SeekFrom::Start(FLAG_OFFSET as u64))?;
        file.write_u8(COMMITTED_FLAG)?;
        file.sync_data()?;
        file.seek(SeekFrom::Start(self.pos))?;
        Ok(())
    }
}
