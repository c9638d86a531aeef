//! IoFileMgrForUser: 文件、目录与模拟器调试设备
//!
//! 访问宿主文件系统的操作都以挂起形式完成：处理函数在调用时解码参数、读取客户机缓冲区，
//! 真正的 I/O 放在延续中，由调度器恢复时执行。

use std::io::{Read, Seek, SeekFrom, Write};

use tracing::{debug, info, warn};

use crate::emulator::Emulator;
use crate::emulator::memory::MemoryError;
use crate::emulator::ptr::Ptr;
use crate::hle::vfs::{OpenMode, Vfs, VfsEntry, VfsStat, VfsStream};
use crate::hle::{
    Arg, Continuation, HleArgs, HleCall, HleError, HleFunction, HleModule, HleResult, Ret, SuspendFn,
    unimplemented,
};
use crate::utils::bytes::{ByteReader, ByteWriter, BytesError, PspStruct};
use crate::utils::{ResourceError, ResourceItem, ResourceList};

use super::rtc::ScePspDateTime;

/// `sceIoOpen` 的标志位
pub mod open_flags {
    pub const READ: u32 = 0x0001;
    pub const WRITE: u32 = 0x0002;
    pub const READ_WRITE: u32 = READ | WRITE;
    pub const APPEND: u32 = 0x0100;
    pub const CREATE: u32 = 0x0200;
    pub const TRUNCATE: u32 = 0x0400;
}

/// `SceIoStat::mode` 中的文件类型
pub mod io_file_mode {
    pub const DIRECTORY: u32 = 0x0010;
    pub const FILE: u32 = 0x0020;
}

/// `sceIoLseek` 的 whence
pub mod seek_type {
    pub const SET: u32 = 0;
    pub const CUR: u32 = 1;
    pub const END: u32 = 2;
    pub const TELL: u32 = 65536;
}

/// `sceIoDevctl` 在 `emulator:` 设备上的命令
pub mod emulator_devctl {
    pub const GET_HAS_DISPLAY: i32 = 0x01;
    pub const SEND_OUTPUT: i32 = 0x02;
    pub const IS_EMULATOR: i32 = 0x03;
    pub const SEND_CTRLDATA: i32 = 0x10;
    pub const EMIT_SCREENSHOT: i32 = 0x20;
}

pub fn open_mode(flags: u32) -> OpenMode {
    if flags & open_flags::TRUNCATE != 0 {
        OpenMode::CreateOrTruncate
    } else if flags & open_flags::CREATE != 0 {
        OpenMode::Create
    } else if flags & open_flags::WRITE != 0 {
        OpenMode::Write
    } else {
        OpenMode::Read
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SceIoStat {
    pub mode: u32,
    pub attributes: u32,
    pub size: u64,
    pub time_creation: ScePspDateTime,
    pub time_last_access: ScePspDateTime,
    pub time_last_modification: ScePspDateTime,
    pub device: [u32; 6],
}

impl From<&VfsStat> for SceIoStat {
    fn from(stat: &VfsStat) -> Self {
        Self {
            mode: if stat.is_directory {
                io_file_mode::DIRECTORY
            } else {
                io_file_mode::FILE
            },
            attributes: 0,
            size: stat.size,
            time_creation: ScePspDateTime::from_system_time(stat.created),
            time_last_access: ScePspDateTime::from_system_time(stat.accessed),
            time_last_modification: ScePspDateTime::from_system_time(stat.modified),
            device: [0; 6],
        }
    }
}

impl PspStruct for SceIoStat {
    const SIZE: usize = 88;

    fn decode(r: &mut ByteReader<'_>) -> Result<Self, BytesError> {
        let mode = r.u32_le()?;
        let attributes = r.u32_le()?;
        let size = r.u64_le()?;
        let time_creation = ScePspDateTime::decode(r)?;
        let time_last_access = ScePspDateTime::decode(r)?;
        let time_last_modification = ScePspDateTime::decode(r)?;
        let mut device = [0u32; 6];
        for word in &mut device {
            *word = r.u32_le()?;
        }
        Ok(Self {
            mode,
            attributes,
            size,
            time_creation,
            time_last_access,
            time_last_modification,
            device,
        })
    }

    fn encode(&self, w: &mut ByteWriter) {
        w.u32_le(self.mode);
        w.u32_le(self.attributes);
        w.u64_le(self.size);
        self.time_creation.encode(w);
        self.time_last_access.encode(w);
        self.time_last_modification.encode(w);
        for word in self.device {
            w.u32_le(word);
        }
    }
}

const DIRENT_NAME_LEN: usize = 256;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SceIoDirent {
    pub stat: SceIoStat,
    pub name: String,
    pub private_data: u32,
    pub dummy: u32,
}

impl PspStruct for SceIoDirent {
    const SIZE: usize = SceIoStat::SIZE + DIRENT_NAME_LEN + 8;

    fn decode(r: &mut ByteReader<'_>) -> Result<Self, BytesError> {
        Ok(Self {
            stat: SceIoStat::decode(r)?,
            name: r.fixed_str(DIRENT_NAME_LEN)?,
            private_data: r.u32_le()?,
            dummy: r.u32_le()?,
        })
    }

    fn encode(&self, w: &mut ByteWriter) {
        self.stat.encode(w);
        w.fixed_str(&self.name, DIRENT_NAME_LEN);
        w.u32_le(self.private_data);
        w.u32_le(self.dummy);
    }
}

pub struct FileDescriptor {
    pub id: i32,
    pub path: String,
    stream: Option<Box<dyn VfsStream>>,
}

impl ResourceItem for FileDescriptor {
    fn id(&self) -> i32 {
        self.id
    }
}

#[derive(Debug, Default)]
pub struct DirectoryListing {
    pub id: i32,
    pub path: String,
    entries: Vec<VfsEntry>,
    position: usize,
}

impl ResourceItem for DirectoryListing {
    fn id(&self) -> i32 {
        self.id
    }
}

/// IoFileMgrForUser 的状态
pub struct IoFileMgr {
    vfs: Box<dyn Vfs>,
    files: ResourceList<FileDescriptor>,
    directories: ResourceList<DirectoryListing>,
    cwd: String,
}

impl IoFileMgr {
    pub fn new(vfs: Box<dyn Vfs>) -> Self {
        Self {
            vfs,
            files: ResourceList::new("FileDescriptor", |id| FileDescriptor {
                id,
                path: String::new(),
                stream: None,
            }),
            directories: ResourceList::new("DirectoryListing", |id| DirectoryListing {
                id,
                ..Default::default()
            }),
            cwd: String::from("ms0:/"),
        }
    }

    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    pub fn open_files(&self) -> impl Iterator<Item = &FileDescriptor> + '_ {
        self.files.iter()
    }

    pub fn open_directories(&self) -> usize {
        self.directories.len()
    }

    /// 没有设备名的路径相对于当前目录
    pub fn absolute(&self, path: &str) -> String {
        if path.contains(':') {
            path.to_string()
        } else if self.cwd.ends_with('/') {
            format!("{}{}", self.cwd, path.trim_start_matches('/'))
        } else {
            format!("{}/{}", self.cwd, path.trim_start_matches('/'))
        }
    }

    fn stream(&mut self, fd: i32) -> Result<&mut Box<dyn VfsStream>, HleError> {
        let file = self.files.get_mut(fd)?;
        Ok(file.stream.as_mut().ok_or(ResourceError::NotFound {
            kind: "FileDescriptor",
            id: fd,
        })?)
    }

    fn seek(&mut self, fd: i32, offset: i64, whence: u32) -> Result<i64, HleError> {
        let stream = self.stream(fd)?;
        let position = match whence {
            seek_type::SET => {
                let start = u64::try_from(offset)
                    .map_err(|_| HleError::InvalidArgument(format!("负的文件偏移: {offset}")))?;
                stream.seek(SeekFrom::Start(start))?
            }
            seek_type::CUR => stream.seek(SeekFrom::Current(offset))?,
            seek_type::END => stream.seek(SeekFrom::End(offset))?,
            seek_type::TELL => stream.stream_position()?,
            other => return Err(HleError::InvalidArgument(format!("无效的 whence: {other}"))),
        };
        Ok(position as i64)
    }
}

fn required_path(emu: &Emulator, args: &HleArgs, index: usize) -> Result<String, HleError> {
    let path = args
        .str(index)?
        .ok_or_else(|| HleError::InvalidArgument(String::from("空路径")))?;
    Ok(emu.io.absolute(path))
}

fn non_negative(value: i32, what: &str) -> Result<usize, HleError> {
    usize::try_from(value).map_err(|_| HleError::InvalidArgument(format!("{what} 为负数: {value}")))
}

fn deferred(f: impl FnOnce(&mut Emulator) -> Result<i64, HleError> + 'static) -> Result<HleResult, HleError> {
    Ok(HleResult::Pending(Continuation::new(f)))
}

fn sce_io_devctl(emu: &mut Emulator, args: &HleArgs) -> Result<HleResult, HleError> {
    let device = args.str(0)?.unwrap_or_default();
    let command = args.int(1)?;
    let (input, input_len) = (args.ptr(2)?, args.int(3)?);
    let output = args.ptr(4)?;

    if device != "emulator:" && device != "kemulator:" {
        warn!(device, command, "不支持的 sceIoDevctl 设备");
        return Ok(HleResult::Done(-1));
    }

    let result = match command {
        emulator_devctl::IS_EMULATOR => 0,
        emulator_devctl::GET_HAS_DISPLAY => {
            let has_display = emu.host.has_display as u32;
            emu.memory.ptr_or_dummy(output).sw(0, has_display)?;
            0
        }
        emulator_devctl::SEND_OUTPUT => {
            let bytes = emu.memory.read(input, non_negative(input_len, "输入长度")?)?;
            emu.host.output.extend_from_slice(&bytes);
            0
        }
        emulator_devctl::SEND_CTRLDATA => {
            emu.host.ctrl_data = emu.memory.read(input, non_negative(input_len, "输入长度")?)?;
            0
        }
        emulator_devctl::EMIT_SCREENSHOT => {
            emu.host.screenshot_requests += 1;
            info!(count = emu.host.screenshot_requests, "客户程序请求截图");
            0
        }
        _ => {
            warn!(device, command, "未处理的模拟器命令");
            -1
        }
    };
    Ok(HleResult::Done(result))
}

fn sce_io_open(emu: &mut Emulator, args: &HleArgs) -> Result<HleResult, HleError> {
    let path = required_path(emu, args, 0)?;
    let flags = args.int(1)? as u32;
    deferred(move |emu| {
        let mut stream = emu.io.vfs.open(&path, open_mode(flags))?;
        if flags & open_flags::APPEND != 0 {
            stream.seek(SeekFrom::End(0))?;
        }
        let file = emu.io.files.alloc();
        file.path = path;
        file.stream = Some(stream);
        debug!(fd = file.id, path = %file.path, flags = format_args!("{:#x}", flags), "打开文件");
        Ok(file.id as i64)
    })
}

fn sce_io_lseek32(_emu: &mut Emulator, args: &HleArgs) -> Result<HleResult, HleError> {
    let (fd, offset, whence) = (args.int(0)?, args.int(1)? as i64, args.int(2)? as u32);
    deferred(move |emu| Ok(emu.io.seek(fd, offset, whence)? as i32 as i64))
}

fn sce_io_lseek(_emu: &mut Emulator, args: &HleArgs) -> Result<HleResult, HleError> {
    let (fd, offset, whence) = (args.int(0)?, args.long(1)?, args.int(2)? as u32);
    deferred(move |emu| emu.io.seek(fd, offset, whence))
}

fn sce_io_read(_emu: &mut Emulator, args: &HleArgs) -> Result<HleResult, HleError> {
    let (fd, dst) = (args.int(0)?, args.ptr(1)?);
    let len = non_negative(args.int(2)?, "读取长度")?;
    deferred(move |emu| {
        // 先检查目标缓冲区，失败时文件位置不变
        if !emu.memory.is_mem_region_range(dst, len) {
            return Err(MemoryError::OutOfBounds { addr: dst, size: len }.into());
        }
        let mut buf = Vec::new();
        let stream = emu.io.stream(fd)?;
        Read::by_ref(stream).take(len as u64).read_to_end(&mut buf)?;
        emu.memory.write(dst, &buf)?;
        Ok(buf.len() as i64)
    })
}

fn sce_io_write(emu: &mut Emulator, args: &HleArgs) -> Result<HleResult, HleError> {
    let (fd, src) = (args.int(0)?, args.ptr(1)?);
    let data = emu.memory.read(src, non_negative(args.int(2)?, "写入长度")?)?;
    deferred(move |emu| {
        emu.io.stream(fd)?.write_all(&data)?;
        Ok(data.len() as i64)
    })
}

fn sce_io_close(emu: &mut Emulator, args: &HleArgs) -> Result<HleResult, HleError> {
    let fd = args.int(0)?;
    let file = emu.io.files.get_mut(fd)?;
    file.stream = None;
    debug!(fd, path = %file.path, "关闭文件");
    emu.io.files.free(fd)?;
    Ok(HleResult::Done(0))
}

fn sce_io_getstat(emu: &mut Emulator, args: &HleArgs) -> Result<HleResult, HleError> {
    let path = required_path(emu, args, 0)?;
    let out = args.ptr(1)?;
    deferred(move |emu| {
        let stat = SceIoStat::from(&emu.io.vfs.stat(&path)?);
        emu.memory.ptr(out).write_struct(&stat)?;
        Ok(0)
    })
}

fn sce_io_dopen(emu: &mut Emulator, args: &HleArgs) -> Result<HleResult, HleError> {
    let path = required_path(emu, args, 0)?;
    deferred(move |emu| {
        let entries = emu.io.vfs.list(&path)?;
        let listing = emu.io.directories.alloc();
        debug!(id = listing.id, path = %path, count = entries.len(), "打开目录");
        listing.path = path;
        listing.entries = entries;
        listing.position = 0;
        Ok(listing.id as i64)
    })
}

fn sce_io_dread(emu: &mut Emulator, args: &HleArgs) -> Result<HleResult, HleError> {
    let (id, out) = (args.int(0)?, args.ptr(1)?);
    let listing = emu.io.directories.get(id)?;
    let Some(entry) = listing.entries.get(listing.position) else {
        return Ok(HleResult::Done(0));
    };
    let dirent = SceIoDirent {
        stat: SceIoStat::from(&entry.stat),
        name: entry.name.clone(),
        ..Default::default()
    };
    emu.memory.ptr(out).write_struct(&dirent)?;
    emu.io.directories.get_mut(id)?.position += 1;
    Ok(HleResult::Done(1))
}

fn sce_io_dclose(emu: &mut Emulator, args: &HleArgs) -> Result<HleResult, HleError> {
    let id = args.int(0)?;
    emu.io.directories.get_mut(id)?.entries.clear();
    emu.io.directories.free(id)?;
    Ok(HleResult::Done(0))
}

fn sce_io_mkdir(emu: &mut Emulator, args: &HleArgs) -> Result<HleResult, HleError> {
    let path = required_path(emu, args, 0)?;
    deferred(move |emu| {
        emu.io.vfs.mkdir(&path)?;
        Ok(0)
    })
}

fn sce_io_rmdir(emu: &mut Emulator, args: &HleArgs) -> Result<HleResult, HleError> {
    let path = required_path(emu, args, 0)?;
    deferred(move |emu| {
        emu.io.vfs.remove_dir(&path)?;
        Ok(0)
    })
}

fn sce_io_chdir(emu: &mut Emulator, args: &HleArgs) -> Result<HleResult, HleError> {
    let path = required_path(emu, args, 0)?;
    debug!(cwd = %path, "切换当前目录");
    emu.io.cwd = path;
    Ok(HleResult::Done(0))
}

const fn suspend(name: &'static str, nid: u32, args: &'static [Arg], ret: Ret, func: SuspendFn) -> HleFunction {
    HleFunction {
        name,
        nid,
        since: 150,
        call: HleCall::Suspend { args, ret, func },
    }
}

pub static MODULE: HleModule = HleModule {
    name: "IoFileMgrForUser",
    functions: &[
        // 设备
        suspend(
            "sceIoDevctl",
            0x54F5FB11,
            &[Arg::Str, Arg::Int, Arg::Ptr, Arg::Int, Arg::Ptr, Arg::Int],
            Ret::Int,
            sce_io_devctl,
        ),
        // 文件
        suspend("sceIoOpen", 0x109F50BC, &[Arg::Str, Arg::Int, Arg::Int], Ret::Int, sce_io_open),
        suspend("sceIoLseek32", 0x68963324, &[Arg::Int, Arg::Int, Arg::Int], Ret::Int, sce_io_lseek32),
        suspend("sceIoLseek", 0x27EB27B8, &[Arg::Int, Arg::Long, Arg::Int], Ret::Long, sce_io_lseek),
        suspend("sceIoWrite", 0x42EC03AC, &[Arg::Int, Arg::Ptr, Arg::Int], Ret::Int, sce_io_write),
        suspend("sceIoRead", 0x6A638D83, &[Arg::Int, Arg::Ptr, Arg::Int], Ret::Int, sce_io_read),
        suspend("sceIoClose", 0x810C4BC3, &[Arg::Int], Ret::Int, sce_io_close),
        suspend("sceIoGetstat", 0xACE946E8, &[Arg::Str, Arg::Ptr], Ret::Int, sce_io_getstat),
        // 目录
        suspend("sceIoDopen", 0xB29DDF9C, &[Arg::Str], Ret::Int, sce_io_dopen),
        suspend("sceIoDread", 0xE3EB004C, &[Arg::Int, Arg::Ptr], Ret::Int, sce_io_dread),
        suspend("sceIoDclose", 0xEB092469, &[Arg::Int], Ret::Int, sce_io_dclose),
        suspend("sceIoMkdir", 0x06A70004, &[Arg::Str, Arg::Int], Ret::Int, sce_io_mkdir),
        suspend("sceIoRmdir", 0x1117C65F, &[Arg::Str], Ret::Int, sce_io_rmdir),
        suspend("sceIoChdir", 0x55F4717D, &[Arg::Str], Ret::Int, sce_io_chdir),
        unimplemented("sceIoGetDevType", 0x08BD7374, 150),
        unimplemented("sceIoWriteAsync", 0x0FACAB19, 150),
        unimplemented("sceIoLseek32Async", 0x1B385D8F, 150),
        unimplemented("sceIoPollAsync", 0x3251EA56, 150),
        unimplemented("sceIoWaitAsyncCB", 0x35DBD746, 150),
        unimplemented("sceIoGetFdList", 0x5C2BE2CC, 150),
        unimplemented("sceIoIoctl", 0x63632449, 150),
        unimplemented("sceIoUnassign", 0x6D08A871, 150),
        unimplemented("sceIoLseekAsync", 0x71B19E77, 150),
        unimplemented("sceIoRename", 0x779103A0, 150),
        unimplemented("sceIoOpenAsync", 0x89AA9906, 150),
        unimplemented("sceIoReadAsync", 0xA0B5A7C2, 150),
        unimplemented("sceIoSetAsyncCallback", 0xA12A0514, 150),
        unimplemented("sceIoSync", 0xAB96437F, 150),
        unimplemented("sceIoChangeAsyncPriority", 0xB293727F, 150),
        unimplemented("sceIoAssign", 0xB2A628C1, 150),
        unimplemented("sceIoChstat", 0xB8A740F4, 150),
        unimplemented("sceIoGetAsyncStat", 0xCB05F8D6, 150),
        unimplemented("sceIoWaitAsync", 0xE23EEC33, 150),
        unimplemented("sceIoCancel", 0xE8BC6571, 150),
        unimplemented("sceIoIoctlAsync", 0xE95A012B, 150),
        unimplemented("sceIoRemove", 0xF27A9C51, 150),
        unimplemented("sceIoCloseAsync", 0xFF5940B6, 150),
    ],
};
