//! 内存管理模块
//!
//! 客户机可见的地址空间是一块映射在 `memory_base` 处的连续字节缓冲区。
//! 所有访问都经过边界检查，越界访问只会得到错误，不会触及缓冲区以外的宿主内存。

use thiserror::Error;

use crate::const_values::MemoryConfig;

use super::ptr::MemPtr;

/// 内存错误类型
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("内存访问越界: 地址 {addr:#010x}, 大小 {size}")]
    OutOfBounds { addr: u32, size: usize },
    #[error("字符串过长: 地址 {addr:#010x} 处 {limit} 字节内没有结束符")]
    StringTooLong { addr: u32, limit: usize },
    #[error("内存大小无效: {size:#x} 字节 (必须是 2 的幂)")]
    InvalidSize { size: usize },
}

/// 内存管理结构
#[derive(Debug, Clone)]
pub struct Memory {
    /// 内存数据
    data: Vec<u8>,
    /// 客户机地址空间基址
    memory_base: u32,
}

impl Memory {
    /// 创建新的内存实例
    pub fn new(memory_base: u32, size: usize) -> Result<Self, MemoryError> {
        if !size.is_power_of_two() {
            return Err(MemoryError::InvalidSize { size });
        }
        if (memory_base as u64) + (size as u64) > 1 << 32 {
            return Err(MemoryError::InvalidSize { size });
        }
        Ok(Self {
            data: vec![0; size],
            memory_base,
        })
    }

    /// 使用配置创建内存实例 (`memory_size` 单位为 MiB)
    pub fn from_config(config: &MemoryConfig) -> Result<Self, MemoryError> {
        Self::new(config.memory_base, config.memory_size * 1024 * 1024)
    }

    #[inline(always)]
    pub fn base(&self) -> u32 {
        self.memory_base
    }

    #[inline(always)]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// 地址空间末尾 (不含)
    #[inline(always)]
    pub fn end(&self) -> u64 {
        self.memory_base as u64 + self.data.len() as u64
    }

    /// 检查给定地址范围是否完全在内存区域内
    #[inline(always)]
    pub fn is_mem_region_range(&self, addr: u32, size: usize) -> bool {
        addr >= self.memory_base && (addr as u64).saturating_add(size as u64) <= self.end()
    }

    /// 转换并检查地址有效性，返回缓冲区内的偏移范围
    #[inline(always)]
    fn translate_address(&self, addr: u32, size: usize) -> Result<usize, MemoryError> {
        if !self.is_mem_region_range(addr, size) {
            return Err(MemoryError::OutOfBounds { addr, size });
        }
        Ok((addr - self.memory_base) as usize)
    }

    #[inline(always)]
    fn bytes<const N: usize>(&self, addr: u32) -> Result<[u8; N], MemoryError> {
        let start = self.translate_address(addr, N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[start..start + N]);
        Ok(out)
    }

    /// 读取内存
    pub fn read(&self, addr: u32, size: usize) -> Result<Vec<u8>, MemoryError> {
        let start = self.translate_address(addr, size)?;
        Ok(self.data[start..start + size].to_vec())
    }

    /// 读取内存到给定缓冲区
    pub fn read_into(&self, addr: u32, out: &mut [u8]) -> Result<(), MemoryError> {
        let start = self.translate_address(addr, out.len())?;
        out.copy_from_slice(&self.data[start..start + out.len()]);
        Ok(())
    }

    /// 写入内存
    pub fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), MemoryError> {
        let start = self.translate_address(addr, data.len())?;
        self.data[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// 用同一个字节填充一段内存
    pub fn fill(&mut self, addr: u32, size: usize, value: u8) -> Result<(), MemoryError> {
        let start = self.translate_address(addr, size)?;
        self.data[start..start + size].fill(value);
        Ok(())
    }

    /// 读取字节
    #[inline(always)]
    pub fn read_byte(&self, addr: u32) -> Result<u8, MemoryError> {
        Ok(self.bytes::<1>(addr)?[0])
    }

    /// 读取半字
    #[inline(always)]
    pub fn read_halfword(&self, addr: u32) -> Result<u16, MemoryError> {
        Ok(u16::from_le_bytes(self.bytes(addr)?))
    }

    /// 读取字
    #[inline(always)]
    pub fn read_word(&self, addr: u32) -> Result<u32, MemoryError> {
        Ok(u32::from_le_bytes(self.bytes(addr)?))
    }

    /// 写入字节
    #[inline(always)]
    pub fn write_byte(&mut self, addr: u32, value: u8) -> Result<(), MemoryError> {
        self.write(addr, &[value])
    }

    /// 写入半字
    #[inline(always)]
    pub fn write_halfword(&mut self, addr: u32, value: u16) -> Result<(), MemoryError> {
        self.write(addr, &value.to_le_bytes())
    }

    /// 写入字
    #[inline(always)]
    pub fn write_word(&mut self, addr: u32, value: u32) -> Result<(), MemoryError> {
        self.write(addr, &value.to_le_bytes())
    }

    /// 获取指向 `addr` 的客户机指针
    #[inline(always)]
    pub fn ptr(&mut self, addr: u32) -> MemPtr<'_> {
        MemPtr::new(self, addr)
    }
}
