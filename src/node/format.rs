//! Node file format constants and structures.
//!
//! Layout: a 16-byte header followed by append-only blocks.
//!
//! ```text
//! header  : magic[5] | flag u8 | version u16 LE | root position u64 LE
//! data    : size u64 LE | bytes[size]
//! group   : child count u64 LE | child offset u64 LE * count
//! ```
//!
//! A child offset with the MSB set points to a data block, clear points to
//! a group. A position of 0 means "empty". Blocks are written bottom-up, so
//! every child sits before its parent in the file.
//!
//! Every named node is a group whose first child is its encoded header
//! (see [`codec`](super::codec)). Group nodes list their child nodes after
//! the header; array nodes have exactly one more child, the payload.

/// Magic bytes at the start of a node file.
pub const NODE_MAGIC: &[u8; 5] = b"ACQND";

/// Size of the file header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Offset of the commit flag in the header.
pub const FLAG_OFFSET: usize = 5;

/// Offset of the version in the header.
pub const VERSION_OFFSET: usize = 6;

/// Offset of the root group position in the header.
pub const ROOT_POS_OFFSET: usize = 8;

/// Current file format version.
pub const CURRENT_VERSION: u16 = 1;

/// Flag value once a commit has completed.
pub const COMMITTED_FLAG: u8 = 0xFF;

/// Flag value while a commit is in progress.
pub const DIRTY_FLAG: u8 = 0x00;

/// MSB of a child offset: set for data, clear for groups.
pub const TYPE_FLAG_MASK: u64 = 1 << 63;

/// Mask to extract the position from a child offset.
pub const OFFSET_MASK: u64 = !(1 << 63);

/// Child index of the node header inside a node group.
pub const NODE_HEADER_CHILD: usize = 0;

/// Child index of the payload inside an array node group.
pub const NODE_PAYLOAD_CHILD: usize = 1;

#[inline]
pub const fn is_group_offset(offset: u64) -> bool {
    (offset & TYPE_FLAG_MASK) == 0
}

/// Extract the position from a child offset.
#[inline]
pub const fn extract_offset(offset: u64) -> u64 {
    offset & OFFSET_MASK
}

#[inline]
pub const fn make_group_offset(pos: u64) -> u64 {
    pos & OFFSET_MASK
}

#[inline]
pub const fn make_data_offset(pos: u64) -> u64 {
    pos | TYPE_FLAG_MASK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets() {
        let group_offset = make_group_offset(0x1234);
        assert!(is_group_offset(group_offset));
        assert_eq!(extract_offset(group_offset), 0x1234);

        let data_offset = make_data_offset(0x5678);
        assert!(!is_group_offset(data_offset));
        assert_eq!(extract_offset(data_offset), 0x5678);
        assert_eq!(data_offset, 0x8000000000005678);
    }
}
