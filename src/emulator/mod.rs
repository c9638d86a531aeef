//! 模拟器核心模块
//!
//! [`Emulator`] 汇集了客户机执行所需的全部状态：地址空间、CPU 寄存器、内核对象管理器
//! 和 HLE 系统调用表。指令解释器和线程调度器在本 crate 之外，它们通过
//! [`Emulator::syscall`] 和 [`Emulator::dispatch_vsync`] 驱动这里的状态。

pub mod memory;
pub mod ptr;
pub mod state;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};

use crate::const_values::EmuConfig;
use crate::format::elf::{Elf, ElfProgramHeaderType};
use crate::hle::manager::{CallbackManager, InterruptExecutor, InterruptManager};
use crate::hle::modules::io_file_mgr::IoFileMgr;
use crate::hle::vfs::{HostVfs, Vfs};
use crate::hle::{self, DispatchState, HleModule, SyscallTable, error_code};
pub use memory::{Memory, MemoryError};
use state::{CpuState, reg};

/// 模拟器与宿主前端之间交换的数据 (`emulator:` 设备)
#[derive(Debug, Clone, Default)]
pub struct HostChannel {
    pub has_display: bool,
    /// 客户程序通过 devctl 输出的文本
    pub output: Vec<u8>,
    /// 最近一帧手柄数据
    pub ctrl_data: Vec<u8>,
    pub screenshot_requests: u32,
}

impl HostChannel {
    pub fn output_text(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

/// 模拟器结构体
pub struct Emulator {
    pub memory: Memory,
    pub cpu: CpuState,
    pub interrupts: InterruptManager,
    pub callbacks: CallbackManager,
    pub io: IoFileMgr,
    pub host: HostChannel,
    syscalls: SyscallTable,
}

impl Emulator {
    /// 按配置创建模拟器，登记全部 HLE 模块
    pub fn new(config: &EmuConfig, vfs: Box<dyn Vfs>) -> Result<Self> {
        Self::with_modules(config, vfs, hle::modules::ALL)
    }

    pub fn with_modules(config: &EmuConfig, vfs: Box<dyn Vfs>, modules: &[&HleModule]) -> Result<Self> {
        let memory = Memory::from_config(&config.memory).with_context(|| {
            format!(
                "无法创建客户机内存: 基址 {:#010x}, 大小 {} MiB",
                config.memory.memory_base, config.memory.memory_size
            )
        })?;
        let syscalls = SyscallTable::new(config.hle.firmware_version, modules);
        info!(
            firmware = config.hle.firmware_version,
            functions = syscalls.len(),
            "系统调用表就绪"
        );
        Ok(Self {
            memory,
            cpu: CpuState::new(),
            interrupts: InterruptManager::new(),
            callbacks: CallbackManager::new(config.hle.callback_queue_size),
            io: IoFileMgr::new(vfs),
            host: HostChannel::default(),
            syscalls,
        })
    }

    /// 按配置中的根目录创建宿主文件系统
    pub fn from_config(config: &EmuConfig) -> Result<Self> {
        Self::new(config, Box::new(HostVfs::new(&config.vfs.root)))
    }

    pub fn syscalls(&self) -> &SyscallTable {
        &self.syscalls
    }

    /// 执行 `syscall` 指令对应的 NID
    ///
    /// 未知 NID 写入 `SCE_KERNEL_ERROR_LIBRARY_NOT_YET_LINKED`；任何错误都不会中断宿主。
    pub fn syscall(&mut self, nid: u32) -> DispatchState {
        let Some(function) = self.syscalls.lookup(nid).copied() else {
            warn!(nid = format_args!("{:#010x}", nid), pc = format_args!("{:#010x}", self.cpu.pc), "未知的 NID");
            self.cpu
                .set_return_i32(error_code::SCE_KERNEL_ERROR_LIBRARY_NOT_YET_LINKED as i32);
            return DispatchState::Completed;
        };
        hle::dispatch(self, &function)
    }

    /// 按槽位顺序执行 VBLANK 中断线上启用的处理程序
    pub fn dispatch_vsync(&mut self, executor: &mut dyn InterruptExecutor) -> Result<usize> {
        self.interrupts.dispatch_vsync(executor)
    }

    /// 加载ELF文件
    pub fn load_elf(&mut self, path: &str) -> Result<()> {
        let data = std::fs::read(path).with_context(|| format!("无法读取ELF文件 '{}'", path))?;
        self.load_elf_bytes(&data)
            .with_context(|| format!("无法从 '{}' 加载ELF文件", path))
    }

    /// 把可执行映像的 Load 段写入内存，设置入口点和 `$gp`
    pub fn load_elf_bytes(&mut self, data: &[u8]) -> Result<()> {
        let elf = Elf::parse(data)?;
        if elf.header.is_prx() {
            let relocations = elf.relocations()?.len();
            bail!("PRX 模块需要由模块链接器加载 (共 {} 个重定位项)", relocations);
        }

        // 先检查全部 Load 段，任何一段不合法都不写入内存
        let mut segments = Vec::new();
        for ph in elf.program_headers.iter().filter(|ph| ph.ty == ElfProgramHeaderType::Load) {
            if ph.memory_size < ph.file_size {
                bail!(
                    "段 {:#010x} 的内存大小 {:#x} 小于文件大小 {:#x}",
                    ph.virtual_address,
                    ph.memory_size,
                    ph.file_size
                );
            }
            if !self.memory.is_mem_region_range(ph.virtual_address, ph.memory_size as usize) {
                bail!(
                    "段 {:#010x} (大小 {:#x}) 超出客户机内存",
                    ph.virtual_address,
                    ph.memory_size
                );
            }
            segments.push((ph, elf.program_data(ph)?));
        }

        for (ph, bytes) in segments {
            self.memory
                .write(ph.virtual_address, bytes)
                .with_context(|| format!("无法写入段 {:#010x}", ph.virtual_address))?;
            let bss = (ph.memory_size - ph.file_size) as usize;
            self.memory
                .fill(ph.virtual_address.wrapping_add(ph.file_size), bss, 0)
                .with_context(|| format!("无法清零段 {:#010x} 的 bss", ph.virtual_address))?;
            debug!(
                vaddr = format_args!("{:#010x}", ph.virtual_address),
                filesz = ph.file_size,
                memsz = ph.memory_size,
                "加载段"
            );
        }

        match elf.module_info() {
            Ok(module_info) => {
                info!(name = %module_info.name, gp = format_args!("{:#010x}", module_info.gp), "模块信息");
                self.cpu.registers[reg::GP] = module_info.gp;
            }
            Err(e) => warn!("{}，$gp 保持不变", e),
        }
        self.cpu.pc = elf.header.entry_point;
        info!(entry = format_args!("{:#010x}", self.cpu.pc), "ELF 加载完成");
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn for_test(modules: &[&HleModule]) -> Self {
        Self::for_test_with_vfs(modules, Box::new(HostVfs::new("vfs")))
    }

    /// 1 MiB 内存，位于 0x08000000
    #[cfg(test)]
    pub(crate) fn for_test_with_vfs(modules: &[&HleModule], vfs: Box<dyn Vfs>) -> Self {
        let mut config = EmuConfig::default();
        config.memory.memory_size = 1;
        Self::with_modules(&config, vfs, modules).unwrap()
    }
}
