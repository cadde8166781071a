//! 缓存层相关常量

use static_assertions::const_assert;

/// 单个文件系统操作最多写入的块数
pub const MAXOPBLOCKS: usize = 10;

/// 磁盘块缓存的大小
pub const NBUF: usize = MAXOPBLOCKS * 3;

/// 哈希桶的数量
pub const NBUCKET: usize = 13;

/// 块大小
pub const BSIZE: usize = 1024;

const_assert!(NBUCKET > 0);
const_assert!(NBUF > 0);
const_assert!(BSIZE % 8 == 0);
