//! PSP 模拟器的客户机执行核心

use std::path::PathBuf;

use anyhow::{Ok, Result};
use clap::Parser;
use tracing::info;

use crate::const_values::EmuConfig;
use crate::emulator::Emulator;

pub mod const_values;
pub mod emulator;
pub mod format;
pub mod hle;
pub mod utils;

/// PSP 模拟器核心
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// ELF文件路径
    #[arg(short, long)]
    pub elf: Option<String>,

    /// 配置文件路径，相对路径基于 crate 根目录
    #[arg(short, long, default_value = "profile/config.toml")]
    pub config: PathBuf,

    /// 虚拟文件系统根目录，覆盖配置文件中的设置
    #[arg(long)]
    pub vfs_root: Option<PathBuf>,
}

impl Args {
    pub fn config_path(&self) -> PathBuf {
        if self.config.is_absolute() {
            self.config.clone()
        } else {
            PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(&self.config)
        }
    }
}

pub fn build_emu_run_blocking(args: Args) -> Result<()> {
    let mut config = EmuConfig::new(args.config_path())?;
    if let Some(root) = args.vfs_root {
        config.vfs.root = root;
    }
    info!(
        memory_base = format_args!("{:#010x}", config.memory.memory_base),
        memory_size_mb = config.memory.memory_size,
        vfs_root = %config.vfs.root.display(),
        "配置加载完成"
    );

    // 创建模拟器
    let mut emu = Emulator::from_config(&config)?;

    if let Some(elf_path) = args.elf {
        info!(path = %elf_path, "加载ELF文件");
        emu.load_elf(&elf_path)?;
        // 解释器不在本 crate 中，这里只报告加载结果
        info!(
            pc = format_args!("{:#010x}", emu.cpu.pc),
            gp = format_args!("{:#010x}", emu.cpu.registers[emulator::state::reg::GP]),
            "客户程序就绪"
        );
    }

    Ok(())
}
