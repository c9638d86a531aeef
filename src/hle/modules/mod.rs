//! 已移植的固件模块

pub mod io_file_mgr;
pub mod rtc;

use super::HleModule;

/// 模拟器默认登记的全部模块
pub static ALL: &[&HleModule] = &[&io_file_mgr::MODULE, &rtc::MODULE];
