//! 物理地址包装

use bit_field::BitField;

use core::fmt;

use crate::consts::{PGSHIFT, PGSIZE};

/// 物理页的地址。
///
/// # 合法性保证
/// 只能通过 unsafe 的 [`from_raw`](Self::from_raw) 构造，由调用者保证页对齐；
/// [`Kmem`](super::Kmem) 在释放时再次检查对齐以及是否落在可管理的物理内存之内。
#[repr(C)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct PhysAddr(usize);

impl PhysAddr {
    /// 从原始usize值构造物理地址
    ///
    /// # 安全性
    /// 调用者必须确保`raw`页对齐，且确实指向一个物理页。
    #[inline]
    pub unsafe fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    /// 解封装获取原始物理地址
    #[inline]
    pub fn into_raw(self) -> usize {
        self.0
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.0 as *const u8
    }

    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.0 as *mut u8
    }
}

impl fmt::LowerHex for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

#[inline]
pub fn is_page_aligned(addr: usize) -> bool {
    addr.get_bits(0..PGSHIFT) == 0
}

/// 向上取整到页边界
#[inline]
pub fn pg_round_up(address: usize) -> usize {
    (address + (PGSIZE - 1)) & !(PGSIZE - 1)
}

/// 向下取整到页边界
#[inline]
pub fn pg_round_down(address: usize) -> usize {
    address & !(PGSIZE - 1)
}
