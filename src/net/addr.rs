//! IPv4 地址分配
//!
//! 每条点对点链路拥有独立的地址块；两条链路共享（或重叠）前缀属于配置错误，
//! 在构建拓扑时即被拒绝。

use std::net::Ipv4Addr;

use crate::error::{HarnessError, Result};

use super::id::LinkId;

/// 一个 IPv4 前缀（例如 10.1.3.0/24）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressBlock {
    pub base: Ipv4Addr,
    pub prefix_len: u8,
}

impl AddressBlock {
    pub fn new(base: Ipv4Addr, prefix_len: u8) -> Self {
        assert!(prefix_len <= 32, "prefix length {prefix_len} out of range");
        let mask = Self::mask_of(prefix_len);
        Self {
            base: Ipv4Addr::from(u32::from(base) & mask),
            prefix_len,
        }
    }

    fn mask_of(prefix_len: u8) -> u32 {
        if prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(prefix_len))
        }
    }

    pub fn mask(&self) -> u32 {
        Self::mask_of(self.prefix_len)
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & self.mask() == u32::from(self.base)
    }

    /// 两个前缀是否有公共地址（较短前缀包含较长前缀的网络号即重叠）
    pub fn overlaps(&self, other: &AddressBlock) -> bool {
        let m = Self::mask_of(self.prefix_len.min(other.prefix_len));
        u32::from(self.base) & m == u32::from(other.base) & m
    }

    /// 块内第 `n` 个主机地址（1 起，不含广播地址）
    pub fn host(&self, n: u32) -> Option<Ipv4Addr> {
        let size = (!self.mask()) as u64 + 1;
        if n == 0 || u64::from(n) + 1 >= size {
            return None;
        }
        Some(Ipv4Addr::from(u32::from(self.base) + n))
    }
}

/// 节点上的一个接口：地址 + 所属地址块 + 出方向链路
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Iface {
    pub addr: Ipv4Addr,
    pub block: AddressBlock,
    pub egress: LinkId,
}

/// 地址块登记表：保证各链路前缀互不重叠
#[derive(Debug, Default)]
pub struct AddressAllocator {
    blocks: Vec<AddressBlock>,
}

impl AddressAllocator {
    /// 登记一个新的地址块；与已有块重叠时报错
    pub fn claim(&mut self, block: AddressBlock) -> Result<AddressBlock> {
        if self.blocks.iter().any(|b| b.overlaps(&block)) {
            return Err(HarnessError::PrefixOverlap {
                base: block.base,
                prefix_len: block.prefix_len,
            });
        }
        self.blocks.push(block);
        Ok(block)
    }

    pub fn blocks(&self) -> &[AddressBlock] {
        &self.blocks
    }
}
