//! 内核常量

use static_assertions::const_assert;

pub mod fs;

/// 最大 CPU（hart）数量，同时也是空闲页链表的数量
pub const NCPU: usize = 8;

pub const PGSIZE: usize = 4096;
pub const PGSHIFT: usize = 12;

/// 释放页面时写入的填充字节，用于暴露悬垂引用
pub const FREE_POISON: u8 = 1;

/// 分配页面时写入的填充字节，用于暴露对隐式清零的依赖
pub const ALLOC_POISON: u8 = 5;

const_assert!(NCPU > 0);
const_assert!(PGSIZE == 1 << PGSHIFT);
const_assert!(FREE_POISON != ALLOC_POISON);
