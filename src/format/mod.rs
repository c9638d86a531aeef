//! 可执行文件格式

pub mod elf;
