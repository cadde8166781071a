//! 内存管理模块

pub use addr::{is_page_aligned, pg_round_down, pg_round_up, PhysAddr};
pub use kalloc::Kmem;

mod addr;
mod kalloc;
mod list;
