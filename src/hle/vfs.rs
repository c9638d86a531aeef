//! 宿主虚拟文件系统
//!
//! 客户机路径形如 `ms0:/PSP/GAME/x`。[`HostVfs`] 把它映射到 `<root>/ms0/PSP/GAME/x`，
//! 拒绝任何 `..` 分量，客户机无法访问根目录以外的宿主文件。

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// 打开的文件流
pub trait VfsStream: Read + Write + Seek {}

impl<T: Read + Write + Seek> VfsStream for T {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    Create,
    CreateOrTruncate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VfsStat {
    pub is_directory: bool,
    pub size: u64,
    pub created: SystemTime,
    pub accessed: SystemTime,
    pub modified: SystemTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VfsEntry {
    pub name: String,
    pub stat: VfsStat,
}

pub trait Vfs {
    fn open(&mut self, path: &str, mode: OpenMode) -> io::Result<Box<dyn VfsStream>>;
    fn stat(&self, path: &str) -> io::Result<VfsStat>;
    fn mkdir(&mut self, path: &str) -> io::Result<()>;
    fn remove_dir(&mut self, path: &str) -> io::Result<()>;
    /// 目录内容，按名字排序
    fn list(&self, path: &str) -> io::Result<Vec<VfsEntry>>;
}

#[derive(Debug, Clone)]
pub struct HostVfs {
    root: PathBuf,
}

impl HostVfs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 把 `device:/a/b` 解析为宿主路径
    pub fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let (device, rest) = path.split_once(':').ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("路径缺少设备名: {path}"))
        })?;
        if device.is_empty() || device.contains(['/', '\\']) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("无效的设备名: {path}"),
            ));
        }

        let mut resolved = self.root.join(device.to_ascii_lowercase());
        for component in rest.split(['/', '\\']) {
            match component {
                "" | "." => {}
                ".." => {
                    return Err(io::Error::new(
                        io::ErrorKind::PermissionDenied,
                        format!("路径越出虚拟文件系统: {path}"),
                    ));
                }
                name => resolved.push(name),
            }
        }
        Ok(resolved)
    }
}

fn stat_from_metadata(metadata: &fs::Metadata) -> VfsStat {
    let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    VfsStat {
        is_directory: metadata.is_dir(),
        size: if metadata.is_dir() { 0 } else { metadata.len() },
        created: metadata.created().unwrap_or(modified),
        accessed: metadata.accessed().unwrap_or(modified),
        modified,
    }
}

impl Vfs for HostVfs {
    fn open(&mut self, path: &str, mode: OpenMode) -> io::Result<Box<dyn VfsStream>> {
        let host = self.resolve(path)?;
        let file: File = match mode {
            OpenMode::Read => File::open(&host)?,
            OpenMode::Write => OpenOptions::new().read(true).write(true).open(&host)?,
            OpenMode::Create => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&host)?,
            OpenMode::CreateOrTruncate => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(&host)?,
        };
        Ok(Box::new(file))
    }

    fn stat(&self, path: &str) -> io::Result<VfsStat> {
        Ok(stat_from_metadata(&fs::metadata(self.resolve(path)?)?))
    }

    fn mkdir(&mut self, path: &str) -> io::Result<()> {
        fs::create_dir(self.resolve(path)?)
    }

    fn remove_dir(&mut self, path: &str) -> io::Result<()> {
        fs::remove_dir(self.resolve(path)?)
    }

    fn list(&self, path: &str) -> io::Result<Vec<VfsEntry>> {
        let mut entries = fs::read_dir(self.resolve(path)?)?
            .map(|entry| {
                let entry = entry?;
                Ok(VfsEntry {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    stat: stat_from_metadata(&entry.metadata()?),
                })
            })
            .collect::<io::Result<Vec<_>>>()?;
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}
