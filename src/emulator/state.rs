//! CPU状态管理
//!
//! 解释器本身不在本 crate 中；这里只保存系统调用层和中断层需要读写的寄存器。

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("寄存器访问错误: 寄存器 r{0} 超出范围")]
    InvalidRegister(usize),
}

/// 寄存器编号
pub mod reg {
    pub const ZERO: usize = 0;
    pub const V0: usize = 2;
    pub const V1: usize = 3;
    pub const A0: usize = 4;
    pub const T3: usize = 11;
    pub const GP: usize = 28;
    pub const SP: usize = 29;
    pub const RA: usize = 31;
}

/// 系统调用参数寄存器 ($a0-$a3, $t0-$t3)
pub const ARG_REGS: [usize; 8] = [4, 5, 6, 7, 8, 9, 10, 11];

/// Allegrex CPU 状态
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpuState {
    // 通用寄存器
    pub registers: [u32; 32],
    // 程序计数器
    pub pc: u32,
    pub hi: u32,
    pub lo: u32,
}

impl CpuState {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn get_regs(&self) -> &[u32; 32] {
        &self.registers
    }

    /// 获取寄存器值
    #[inline(always)]
    pub fn get_reg(&self, reg: usize) -> Result<u32, StateError> {
        if reg >= self.registers.len() {
            return Err(StateError::InvalidRegister(reg));
        }
        Ok(if reg == reg::ZERO {
            0 // r0 永远是0
        } else {
            self.registers[reg]
        })
    }

    /// 设置寄存器值
    #[inline(always)]
    pub fn set_reg(&mut self, reg: usize, value: u32) -> Result<(), StateError> {
        if reg >= self.registers.len() {
            return Err(StateError::InvalidRegister(reg));
        }
        if reg != reg::ZERO {
            // r0不可写
            self.registers[reg] = value;
        }
        Ok(())
    }

    #[inline(always)]
    pub fn get_pc(&self) -> u32 {
        self.pc
    }

    #[inline(always)]
    pub fn set_pc(&mut self, value: u32) {
        self.pc = value;
    }

    /// 写入 32 位返回值 ($v0)
    #[inline(always)]
    pub fn set_return_i32(&mut self, value: i32) {
        self.registers[reg::V0] = value as u32;
    }

    /// 写入 64 位返回值 ($v0 低位, $v1 高位)
    #[inline(always)]
    pub fn set_return_i64(&mut self, value: i64) {
        self.registers[reg::V0] = value as u32;
        self.registers[reg::V1] = ((value as u64) >> 32) as u32;
    }
}

/// Allegrex寄存器别名
fn get_register_alias(reg: usize) -> &'static str {
    const ALIASES: [&str; 32] = [
        "zero", "at", "v0", "v1", "a0", "a1", "a2", "a3", "t0", "t1", "t2", "t3", "t4", "t5",
        "t6", "t7", "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "t8", "t9", "k0", "k1", "gp",
        "sp", "fp", "ra",
    ];
    ALIASES.get(reg).copied().unwrap_or("unknown")
}

impl fmt::Display for CpuState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== CPU State ===")?;
        writeln!(f, "PC: 0x{:08x}  HI: 0x{:08x}  LO: 0x{:08x}", self.pc, self.hi, self.lo)?;
        for i in 0..32 {
            let value = if i == 0 { 0 } else { self.registers[i] };
            write!(f, "  r{:2}({:>4}): 0x{:08x}", i, get_register_alias(i), value)?;
            if i % 4 == 3 {
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_register_is_hardwired() {
        let mut state = CpuState::new();
        state.set_reg(0, 123).unwrap();
        assert_eq!(state.get_reg(0).unwrap(), 0);
        state.set_reg(reg::A0, 5).unwrap();
        assert_eq!(state.get_reg(reg::A0).unwrap(), 5);
    }

    #[test]
    fn test_invalid_register() {
        let mut state = CpuState::new();
        assert_eq!(state.get_reg(32), Err(StateError::InvalidRegister(32)));
        assert!(state.set_reg(40, 1).is_err());
    }

    #[test]
    fn test_return_registers() {
        let mut state = CpuState::new();
        state.set_return_i32(-1);
        assert_eq!(state.registers[reg::V0], 0xFFFF_FFFF);

        state.set_return_i64(0x1122_3344_5566_7788);
        assert_eq!(state.registers[reg::V0], 0x5566_7788);
        assert_eq!(state.registers[reg::V1], 0x1122_3344);
    }

    #[test]
    fn test_display() {
        let mut state = CpuState::new();
        state.set_pc(0x0890_0008);
        let text = state.to_string();
        assert!(text.contains("PC: 0x08900008"));
        assert!(text.contains("gp"));
    }
}
