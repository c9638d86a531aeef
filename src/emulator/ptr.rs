//! 客户机指针
//!
//! [`Ptr`] 是绑定到地址空间中某个地址的访问能力。系统调用层通过它读写客户机传入的
//! 缓冲区与结构体；[`DummyPtr`] 用于客户机传入空指针但调用方仍需无条件解引用的场合。

use std::fmt;

use super::memory::{Memory, MemoryError};
use crate::utils::bytes::PspStruct;

/// `read_stringz` 的最大长度
pub const STRINGZ_LIMIT: usize = 0x1000;

pub trait Ptr {
    fn addr(&self) -> u32;

    fn lb(&self, offset: u32) -> Result<u8, MemoryError>;
    fn lh(&self, offset: u32) -> Result<u16, MemoryError>;
    fn lw(&self, offset: u32) -> Result<u32, MemoryError>;

    fn sb(&mut self, offset: u32, value: u8) -> Result<(), MemoryError>;
    fn sh(&mut self, offset: u32, value: u16) -> Result<(), MemoryError>;
    fn sw(&mut self, offset: u32, value: u32) -> Result<(), MemoryError>;

    /// 读取 64 位值：低字在 `offset`，高字在 `offset + 4`
    fn ldw(&self, offset: u32) -> Result<u64, MemoryError> {
        let low = self.lw(offset)? as u64;
        let high = self.lw(offset.wrapping_add(4))? as u64;
        Ok((high << 32) | low)
    }

    /// 写入 64 位值：先写低字再写高字
    fn sdw(&mut self, offset: u32, value: u64) -> Result<(), MemoryError> {
        self.sw(offset, value as u32)?;
        self.sw(offset.wrapping_add(4), (value >> 32) as u32)
    }

    #[inline(always)]
    fn is_null(&self) -> bool {
        self.addr() == 0
    }

    #[inline(always)]
    fn is_not_null(&self) -> bool {
        !self.is_null()
    }

    fn read_bytes(&self, offset: u32, count: usize) -> Result<Vec<u8>, MemoryError> {
        (0..count)
            .map(|n| self.lb(offset.wrapping_add(n as u32)))
            .collect()
    }

    fn write_bytes(&mut self, offset: u32, bytes: &[u8]) -> Result<(), MemoryError> {
        for (n, &b) in bytes.iter().enumerate() {
            self.sb(offset.wrapping_add(n as u32), b)?;
        }
        Ok(())
    }

    /// 读取以 0 结尾的字符串，超过 [`STRINGZ_LIMIT`] 字节视为错误
    fn read_stringz(&self) -> Result<String, MemoryError> {
        let mut out = Vec::new();
        let mut n = 0u32;
        loop {
            let c = self.lb(n)?;
            n = n.wrapping_add(1);
            if c == 0 {
                break;
            }
            out.push(c);
            if out.len() >= STRINGZ_LIMIT {
                return Err(MemoryError::StringTooLong {
                    addr: self.addr(),
                    limit: STRINGZ_LIMIT,
                });
            }
        }
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    fn read_struct<T: PspStruct>(&self) -> Result<T, MemoryError>
    where
        Self: Sized,
    {
        let bytes = self.read_bytes(0, T::SIZE)?;
        T::from_bytes(&bytes).map_err(|_| MemoryError::OutOfBounds {
            addr: self.addr(),
            size: T::SIZE,
        })
    }

    fn write_struct<T: PspStruct>(&mut self, value: &T) -> Result<(), MemoryError>
    where
        Self: Sized,
    {
        let bytes = value.to_bytes();
        debug_assert_eq!(bytes.len(), T::SIZE);
        self.write_bytes(0, &bytes)
    }
}

/// 指向真实地址空间的指针
pub struct MemPtr<'a> {
    mem: &'a mut Memory,
    addr: u32,
}

impl<'a> MemPtr<'a> {
    pub fn new(mem: &'a mut Memory, addr: u32) -> Self {
        Self { mem, addr }
    }

    #[inline(always)]
    fn at(&self, offset: u32) -> u32 {
        self.addr.wrapping_add(offset)
    }
}

impl Ptr for MemPtr<'_> {
    #[inline(always)]
    fn addr(&self) -> u32 {
        self.addr
    }

    fn lb(&self, offset: u32) -> Result<u8, MemoryError> {
        self.mem.read_byte(self.at(offset))
    }

    fn lh(&self, offset: u32) -> Result<u16, MemoryError> {
        self.mem.read_halfword(self.at(offset))
    }

    fn lw(&self, offset: u32) -> Result<u32, MemoryError> {
        self.mem.read_word(self.at(offset))
    }

    fn sb(&mut self, offset: u32, value: u8) -> Result<(), MemoryError> {
        let addr = self.at(offset);
        self.mem.write_byte(addr, value)
    }

    fn sh(&mut self, offset: u32, value: u16) -> Result<(), MemoryError> {
        let addr = self.at(offset);
        self.mem.write_halfword(addr, value)
    }

    fn sw(&mut self, offset: u32, value: u32) -> Result<(), MemoryError> {
        let addr = self.at(offset);
        self.mem.write_word(addr, value)
    }

    // 整块拷贝；越界时与逐字节访问一样整体失败且不写入任何字节
    fn read_bytes(&self, offset: u32, count: usize) -> Result<Vec<u8>, MemoryError> {
        self.mem.read(self.at(offset), count)
    }

    fn write_bytes(&mut self, offset: u32, bytes: &[u8]) -> Result<(), MemoryError> {
        let addr = self.at(offset);
        self.mem.write(addr, bytes)
    }
}

impl fmt::Display for MemPtr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ptr({:#010X})", self.addr)
    }
}

/// 丢弃写入、读取恒为 0 的空指针替身
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DummyPtr;

impl Ptr for DummyPtr {
    fn addr(&self) -> u32 {
        0
    }

    fn lb(&self, _offset: u32) -> Result<u8, MemoryError> {
        Ok(0)
    }

    fn lh(&self, _offset: u32) -> Result<u16, MemoryError> {
        Ok(0)
    }

    fn lw(&self, _offset: u32) -> Result<u32, MemoryError> {
        Ok(0)
    }

    fn sb(&mut self, _offset: u32, _value: u8) -> Result<(), MemoryError> {
        Ok(())
    }

    fn sh(&mut self, _offset: u32, _value: u16) -> Result<(), MemoryError> {
        Ok(())
    }

    fn sw(&mut self, _offset: u32, _value: u32) -> Result<(), MemoryError> {
        Ok(())
    }
}

/// 空地址时退化为 [`DummyPtr`] 的指针
pub enum GuestPtr<'a> {
    Mem(MemPtr<'a>),
    Dummy(DummyPtr),
}

impl Memory {
    pub fn ptr_or_dummy(&mut self, addr: u32) -> GuestPtr<'_> {
        if addr == 0 {
            GuestPtr::Dummy(DummyPtr)
        } else {
            GuestPtr::Mem(self.ptr(addr))
        }
    }
}

macro_rules! forward_ptr {
    ($self:ident, $p:ident => $e:expr) => {
        match $self {
            GuestPtr::Mem($p) => $e,
            GuestPtr::Dummy($p) => $e,
        }
    };
}

impl Ptr for GuestPtr<'_> {
    fn addr(&self) -> u32 {
        forward_ptr!(self, p => p.addr())
    }

    fn lb(&self, offset: u32) -> Result<u8, MemoryError> {
        forward_ptr!(self, p => p.lb(offset))
    }

    fn lh(&self, offset: u32) -> Result<u16, MemoryError> {
        forward_ptr!(self, p => p.lh(offset))
    }

    fn lw(&self, offset: u32) -> Result<u32, MemoryError> {
        forward_ptr!(self, p => p.lw(offset))
    }

    fn sb(&mut self, offset: u32, value: u8) -> Result<(), MemoryError> {
        forward_ptr!(self, p => p.sb(offset, value))
    }

    fn sh(&mut self, offset: u32, value: u16) -> Result<(), MemoryError> {
        forward_ptr!(self, p => p.sh(offset, value))
    }

    fn sw(&mut self, offset: u32, value: u32) -> Result<(), MemoryError> {
        forward_ptr!(self, p => p.sw(offset, value))
    }

    fn read_bytes(&self, offset: u32, count: usize) -> Result<Vec<u8>, MemoryError> {
        forward_ptr!(self, p => p.read_bytes(offset, count))
    }

    fn write_bytes(&mut self, offset: u32, bytes: &[u8]) -> Result<(), MemoryError> {
        forward_ptr!(self, p => p.write_bytes(offset, bytes))
    }
}
