use anyhow::{self, Context};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// PSP 用户内存基址
pub const DEFAULT_MEMORY_BASE: u32 = 0x0800_0000;
/// 默认内存大小 (MiB)
pub const DEFAULT_MEMORY_SIZE: usize = 32;
/// 默认模拟的固件版本 (1.50)
pub const DEFAULT_FIRMWARE_VERSION: u32 = 150;
pub const DEFAULT_CALLBACK_QUEUE_SIZE: usize = 64;

/// 中断线数量
pub const INTERRUPT_LINES: usize = 68;
/// 每条中断线的处理程序槽位数量
pub const INTERRUPT_SLOTS: usize = 32;

#[derive(Deserialize, Debug, Clone)]
pub struct MemoryConfig {
    pub memory_base: u32,
    /// 单位: MiB
    pub memory_size: usize,
}

#[derive(Deserialize, Debug, Clone)]
pub struct HleConfig {
    #[serde(default = "default_firmware_version")]
    pub firmware_version: u32,
    #[serde(default = "default_callback_queue_size")]
    pub callback_queue_size: usize,
}

#[derive(Deserialize, Debug, Clone)]
pub struct VfsConfig {
    pub root: PathBuf,
}

fn default_firmware_version() -> u32 {
    DEFAULT_FIRMWARE_VERSION
}

fn default_callback_queue_size() -> usize {
    DEFAULT_CALLBACK_QUEUE_SIZE
}

/// 主模拟器配置（来自 profile/config.toml）
#[derive(Deserialize, Debug, Clone)]
pub struct EmuConfig {
    pub memory: MemoryConfig,
    pub hle: HleConfig,
    pub vfs: VfsConfig,
}

impl EmuConfig {
    pub fn new(path: impl AsRef<Path>) -> anyhow::Result<EmuConfig> {
        let toml_str = std::fs::read_to_string(&path)
            .with_context(|| format!("无法读取主配置文件: {:?}", &path.as_ref().as_os_str()))?;
        let mut config: EmuConfig = toml::from_str(&toml_str)
            .with_context(|| format!("无法解析主配置文件: {:?}", &path.as_ref().as_os_str()))?;
        // 相对的 vfs 根目录以配置文件所在目录为基准
        if config.vfs.root.is_relative() {
            if let Some(dir) = path.as_ref().parent() {
                config.vfs.root = dir.join(&config.vfs.root);
            }
        }
        anyhow::Ok(config)
    }
}

impl Default for EmuConfig {
    fn default() -> Self {
        Self {
            memory: MemoryConfig {
                memory_base: DEFAULT_MEMORY_BASE,
                memory_size: DEFAULT_MEMORY_SIZE,
            },
            hle: HleConfig {
                firmware_version: DEFAULT_FIRMWARE_VERSION,
                callback_queue_size: DEFAULT_CALLBACK_QUEUE_SIZE,
            },
            vfs: VfsConfig {
                root: PathBuf::from("vfs"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_profile() {
        let config: EmuConfig = toml::from_str(
            r#"
            [memory]
            memory_base = 0x08000000
            memory_size = 16

            [hle]
            firmware_version = 660

            [vfs]
            root = "/tmp/psp"
            "#,
        )
        .unwrap();
        assert_eq!(config.memory.memory_base, 0x0800_0000);
        assert_eq!(config.memory.memory_size, 16);
        assert_eq!(config.hle.firmware_version, 660);
        assert_eq!(config.hle.callback_queue_size, DEFAULT_CALLBACK_QUEUE_SIZE);
        assert_eq!(config.vfs.root, PathBuf::from("/tmp/psp"));
    }

    #[test]
    fn test_vfs_root_relative_to_config_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        let profile = |root: &str| {
            format!(
                "[memory]\nmemory_base = 0x08000000\nmemory_size = 1\n[hle]\n[vfs]\nroot = \"{root}\"\n"
            )
        };

        std::fs::write(&path, profile("../vfs")).unwrap();
        let config = EmuConfig::new(&path).unwrap();
        assert_eq!(config.vfs.root, tmp.path().join("../vfs"));

        std::fs::write(&path, profile("/srv/psp")).unwrap();
        let config = EmuConfig::new(&path).unwrap();
        assert_eq!(config.vfs.root, PathBuf::from("/srv/psp"));
    }

    #[test]
    fn test_shipped_profile_parses() {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("profile/config.toml");
        let config = EmuConfig::new(path).unwrap();
        assert_eq!(config.memory.memory_base, DEFAULT_MEMORY_BASE);
        assert_eq!(config.hle.firmware_version, DEFAULT_FIRMWARE_VERSION);
    }
}
