//! 文件系统的缓存层

mod bio;

pub use bio::{Bcache, Buf, BufData};
