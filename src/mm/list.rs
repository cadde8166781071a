//! 空闲页链表
//!
//! 空闲页没有独立的元数据，链表的 next 指针直接存放在空闲页自身的开头。

use core::mem::{align_of, size_of};
use core::ptr;

use static_assertions::const_assert;

use crate::consts::PGSIZE;

/// 存放在空闲页开头的链表节点
#[repr(C)]
struct Run {
    next: *mut Run,
}

const_assert!(size_of::<Run>() <= PGSIZE);
const_assert!(PGSIZE % align_of::<Run>() == 0);

/// 单向空闲页链表，附带页数计数。
///
/// # 安全说明
/// - 链表中的每个地址都是一块页对齐、大小为 `PGSIZE`、不被任何人使用的内存；
/// - 链表本身不做同步，由外层的自旋锁保护。
pub struct FreeList {
    head: *mut Run,
    len: usize,
}

/// Raw pointers are automatically thread-unsafe.
/// 链表中的页只在持有外层锁时访问。
unsafe impl Send for FreeList {}

impl FreeList {
    pub const fn new() -> Self {
        Self {
            head: ptr::null_mut(),
            len: 0,
        }
    }

    /// 将一页插入链表头部
    ///
    /// # 安全性
    /// - `pa` 必须页对齐且指向一整页可写内存；
    /// - 调用后该页归链表所有，调用者不得再访问。
    pub unsafe fn push(&mut self, pa: usize) {
        let run = pa as *mut Run;
        ptr::write(run, Run { next: self.head });
        self.head = run;
        self.len += 1;
    }

    /// 从链表头部取出一页，链表为空时返回 `None`。
    ///
    /// # 安全性
    /// 链表中的页此前都由 `push` 放入且未被他人改写。
    pub unsafe fn pop(&mut self) -> Option<usize> {
        if self.head.is_null() {
            return None;
        }
        let run = self.head;
        self.head = (*run).next;
        self.len -= 1;
        Some(run as usize)
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C, align(4096))]
    struct Page([u8; PGSIZE]);

    #[test]
    fn lifo_order() {
        let mut pages: Vec<Page> = (0..3).map(|_| Page([0; PGSIZE])).collect();
        let addrs: Vec<usize> = pages.iter_mut().map(|p| p as *mut Page as usize).collect();

        let mut list = FreeList::new();
        assert_eq!(list.len(), 0);
        unsafe {
            for &pa in &addrs {
                list.push(pa);
            }
            assert_eq!(list.len(), 3);
            assert_eq!(list.pop(), Some(addrs[2]));
            assert_eq!(list.pop(), Some(addrs[1]));
            list.push(addrs[2]);
            assert_eq!(list.pop(), Some(addrs[2]));
            assert_eq!(list.pop(), Some(addrs[0]));
            assert_eq!(list.pop(), None);
        }
        assert_eq!(list.len(), 0);
    }
}
