//! xv6 内核的并发核心：自旋锁、睡眠锁、按哈希分桶的块缓存以及按 CPU 划分的物理页分配器。
//!
//! 本 crate 不包含启动代码与驱动，内核需要在使用任何锁之前调用 [`process::init`]
//! 安装硬件线程与调度器原语，并为块缓存提供一个 [`BlockDevice`]。

#![cfg_attr(not(test), no_std)]
#![warn(rust_2018_idioms)]

pub mod consts;
pub mod driver;
pub mod fs;
pub mod mm;
pub mod process;
pub mod sleeplock;
pub mod spinlock;

pub use driver::BlockDevice;
pub use fs::{Bcache, Buf, BufData};
pub use mm::{Kmem, PhysAddr};
pub use process::{Hart, Sched};
pub use sleeplock::{SleepLock, SleepLockGuard};
pub use spinlock::{SpinLock, SpinLockGuard};
