//! 物理页分配器，按 CPU 划分空闲页链表
//!
//! 为用户进程、内核栈、页表页和管道缓冲区分配整页（4096 字节）的物理内存。
//! 每个 CPU 拥有一条独立加锁的空闲链表，本 CPU 链表为空时才依次向其他 CPU 借页。

use array_macro::array;

use core::ptr;

use crate::consts::{ALLOC_POISON, FREE_POISON, NCPU, PGSIZE};
use crate::process::lk_cpu_id;
use crate::spinlock::SpinLock;
use super::addr::{is_page_aligned, pg_round_down, pg_round_up, PhysAddr};
use super::list::FreeList;

/// 物理页分配器。
///
/// 在内核启动时以可管理物理内存的边界构造一次，此后常驻，通过共享引用使用。
///
/// # 锁
/// 每条链表各有一把自旋锁；任何时刻至多持有其中一把，因此各链表之间不存在加锁顺序问题。
pub struct Kmem {
    lists: [SpinLock<FreeList>; NCPU],

    /// 内核镜像之后的第一个地址
    start: usize,

    /// 可管理物理内存的上界（不含）
    end: usize,
}

impl Kmem {
    /// 构造分配器并把 `[start, end)` 中的所有整页轮流分给各 CPU 的链表。
    ///
    /// # 安全性
    /// - `[start, end)` 必须是真实可写的内存，且除本分配器外无人使用；
    /// - 必须在 [`process::init`](crate::process::init) 之后调用。
    pub unsafe fn new(start: usize, end: usize) -> Self {
        let kmem = Self {
            lists: array![_ => SpinLock::new(FreeList::new(), "kmem"); NCPU],
            start,
            end,
        };
        kmem.freerange();
        log::info!(
            "kmem: available physical memory [{:#x}, {:#x}), {} pages",
            start,
            end,
            kmem.nfree()
        );
        #[cfg(feature = "verbose_init_info")]
        for (cpu, list) in kmem.lists.iter().enumerate() {
            log::info!("kmem: cpu {} free list has {} pages", cpu, list.lock().len());
        }
        kmem
    }

    unsafe fn freerange(&self) {
        let mut pa = pg_round_up(self.start);
        let top = pg_round_down(self.end);
        let mut cpu = 0;
        while pa < top {
            self.kfree_to(PhysAddr::from_raw(pa), cpu % NCPU);
            pa += PGSIZE;
            cpu += 1;
        }
    }

    /// 释放一页物理内存到当前 CPU 的空闲链表。
    ///
    /// # 安全性
    /// `pa` 应当是此前 `kalloc` 返回的页，调用后不得再访问该页。
    pub unsafe fn kfree(&self, pa: PhysAddr) {
        self.kfree_to(pa, lk_cpu_id() % NCPU);
    }

    /// 释放一页物理内存到指定 CPU 的空闲链表。
    ///
    /// # 流程解释
    /// 1. 检查地址页对齐，且落在 `[start, end)` 之内，否则认为内存已被破坏，触发 panic；
    /// 2. 用 `FREE_POISON` 填满整页，使悬垂引用读到的内容显而易见；
    /// 3. 在该链表的锁下把页插入链表头部。
    ///
    /// # 安全性
    /// 同 [`kfree`](Self::kfree)。
    pub unsafe fn kfree_to(&self, pa: PhysAddr, cpu: usize) {
        let raw = pa.into_raw();
        if !is_page_aligned(raw) || raw < self.start || raw >= self.end {
            panic!("kfree: bad address {:#x}", pa);
        }
        if cpu >= NCPU {
            panic!("kfree: no cpu {}", cpu);
        }

        ptr::write_bytes(raw as *mut u8, FREE_POISON, PGSIZE);
        self.lists[cpu].lock().push(raw);
    }

    /// 分配一页物理内存。
    ///
    /// # 流程解释
    /// - 先从当前 CPU 的链表取页；
    /// - 若为空，从下一个 CPU 开始轮流尝试其余链表，每次只持有一把锁，取到即止；
    /// - 取到的页用 `ALLOC_POISON` 填满后返回。
    ///
    /// # 返回值
    /// 所有链表都为空时返回 `None`，由调用者决定如何处理，这里不会阻塞也不会 panic。
    pub fn kalloc(&self) -> Option<PhysAddr> {
        let id = lk_cpu_id() % NCPU;

        let mut pa = unsafe { self.lists[id].lock().pop() };
        if pa.is_none() {
            for other in (1..NCPU).map(|k| (id + k) % NCPU) {
                pa = unsafe { self.lists[other].lock().pop() };
                if pa.is_some() {
                    log::trace!("kalloc: cpu {} steals a page from cpu {}", id, other);
                    break;
                }
            }
        }

        match pa {
            Some(pa) => unsafe {
                ptr::write_bytes(pa as *mut u8, ALLOC_POISON, PGSIZE);
                Some(PhysAddr::from_raw(pa))
            },
            None => {
                log::debug!("kalloc: out of memory");
                None
            }
        }
    }

    /// 所有链表中空闲页的总数。
    ///
    /// 各链表依次加锁计数，并发分配时结果只是近似值。
    pub fn nfree(&self) -> usize {
        self.lists.iter().map(|list| list.lock().len()).sum()
    }
}
