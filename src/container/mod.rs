//! Container file format and the filesystem seam used to replace it.

pub mod fs;
pub mod layout;

pub use fs::{FileOps, StdFileOps, TempFile};
pub use layout::{block_of, block_skip, ciphertext_offset, load_header, Header, IV_SIZE};
