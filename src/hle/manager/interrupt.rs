//! 中断登记表
//!
//! 每条中断线有 32 个处理程序槽位。整张表在第一次访问时才分配，
//! 每条线的槽位也在第一次访问该线时才分配。

use thiserror::Error;
use tracing::debug;

use crate::const_values::{INTERRUPT_LINES, INTERRUPT_SLOTS};
use crate::emulator::state::CpuState;

/// PSP 中断线编号
pub mod psp_interrupt {
    pub const GPIO: usize = 4;
    pub const ATA: usize = 5;
    pub const UMD: usize = 6;
    pub const AUDIO: usize = 10;
    pub const SYSTIMER0: usize = 15;
    pub const THREAD0: usize = 19;
    pub const GE: usize = 25;
    pub const VBLANK: usize = 30;
    pub const MECODEC: usize = 31;
    pub const THREAD1: usize = 65;
    pub const INTERRUPT: usize = 66;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InterruptError {
    #[error("中断槽位超出范围: 中断线 {line}, 槽位 {slot}")]
    OutOfRange { line: usize, slot: usize },
}

/// 执行客户机中断处理程序，由外部线程调度器实现
pub trait InterruptExecutor {
    fn execute_interrupt(&mut self, address: u32, argument: u32) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterruptHandler {
    pub line: usize,
    pub index: usize,
    pub enabled: bool,
    pub address: u32,
    pub argument: u32,
    /// 处理程序运行时使用的 CPU 状态快照
    pub cpu_state: Option<Box<CpuState>>,
}

#[derive(Debug)]
struct InterruptLine {
    index: usize,
    handlers: Option<Box<[InterruptHandler]>>,
}

impl InterruptLine {
    fn handlers(&mut self) -> &mut [InterruptHandler] {
        let line = self.index;
        self.handlers.get_or_insert_with(|| {
            (0..INTERRUPT_SLOTS)
                .map(|index| InterruptHandler {
                    line,
                    index,
                    ..Default::default()
                })
                .collect()
        })
    }
}

#[derive(Debug, Default)]
pub struct InterruptManager {
    flags: u32,
    lines: Option<Vec<InterruptLine>>,
}

impl InterruptManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// 关闭全部中断，返回之前的中断标志
    pub fn disable_all_interrupts(&mut self) -> u32 {
        std::mem::take(&mut self.flags)
    }

    /// 把 `mask` 按位或回中断标志
    pub fn restore_interrupts(&mut self, mask: u32) {
        self.flags |= mask;
    }

    pub fn is_line_allocated(&self, line: usize) -> bool {
        self.lines
            .as_ref()
            .and_then(|lines| lines.get(line))
            .is_some_and(|l| l.handlers.is_some())
    }

    pub fn get(&mut self, line: usize, slot: usize) -> Result<&mut InterruptHandler, InterruptError> {
        if line >= INTERRUPT_LINES || slot >= INTERRUPT_SLOTS {
            return Err(InterruptError::OutOfRange { line, slot });
        }
        let lines = self.lines.get_or_insert_with(|| {
            (0..INTERRUPT_LINES)
                .map(|index| InterruptLine {
                    index,
                    handlers: None,
                })
                .collect()
        });
        Ok(&mut lines[line].handlers()[slot])
    }

    /// 登记处理程序；是否启用由 [`Self::set_enabled`] 单独控制
    pub fn register_handler(
        &mut self,
        line: usize,
        slot: usize,
        address: u32,
        argument: u32,
    ) -> Result<(), InterruptError> {
        let handler = self.get(line, slot)?;
        handler.address = address;
        handler.argument = argument;
        debug!(line, slot, address = format_args!("{:#010x}", address), "登记中断处理程序");
        Ok(())
    }

    pub fn release_handler(&mut self, line: usize, slot: usize) -> Result<(), InterruptError> {
        let handler = self.get(line, slot)?;
        *handler = InterruptHandler {
            line,
            index: slot,
            ..Default::default()
        };
        Ok(())
    }

    pub fn set_enabled(&mut self, line: usize, slot: usize, enabled: bool) -> Result<(), InterruptError> {
        self.get(line, slot)?.enabled = enabled;
        Ok(())
    }

    /// 按槽位升序同步执行 `line` 上所有已启用的处理程序，返回执行的数量
    pub fn dispatch(&mut self, line: usize, executor: &mut dyn InterruptExecutor) -> anyhow::Result<usize> {
        // 槽位 0 的检查顺便完成懒分配与范围检查
        self.get(line, 0)?;
        let targets: Vec<(usize, u32, u32)> = self.lines.as_mut().map_or_else(Vec::new, |lines| {
            lines[line]
                .handlers()
                .iter()
                .filter(|h| h.enabled)
                .map(|h| (h.index, h.address, h.argument))
                .collect()
        });
        for &(slot, address, argument) in &targets {
            debug!(line, slot, address = format_args!("{:#010x}", address), argument, "执行中断处理程序");
            executor.execute_interrupt(address, argument)?;
        }
        Ok(targets.len())
    }

    pub fn dispatch_vsync(&mut self, executor: &mut dyn InterruptExecutor) -> anyhow::Result<usize> {
        self.dispatch(psp_interrupt::VBLANK, executor)
    }
}
