//! HLE 系统调用层
//!
//! 客户机通过 `syscall` 指令调用固件函数，函数以 32 位 NID 标识。每个 NID 对应一个
//! [`HleFunction`]，其中记录了函数的调用形式：
//!
//! - [`HleCall::Typed`]: 按参数描述从 `$a0-$a3, $t0-$t3` 依次解码参数，返回值写回 `$v0` (`$v1`)
//! - [`HleCall::Raw`]: 处理函数直接读写整个模拟器状态
//! - [`HleCall::Suspend`]: 处理函数可以返回一个延续，由调度器在之后恢复执行
//!
//! 处理函数的错误都会被转换成负的错误码写入 `$v0`，不会中断宿主。

pub mod manager;
pub mod modules;
pub mod vfs;

use std::collections::HashMap;
use std::fmt;

use nohash_hasher::BuildNoHashHasher;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::emulator::Emulator;
use crate::emulator::memory::MemoryError;
use crate::emulator::ptr::Ptr;
use crate::emulator::state::ARG_REGS;
use crate::utils::ResourceError;
use manager::{CallbackError, InterruptError};

/// 客户机可见的错误码
pub mod error_code {
    pub const SCE_KERNEL_ERROR_ERROR: u32 = 0x8002_0001;
    pub const SCE_KERNEL_ERROR_ILLEGAL_INTRCODE: u32 = 0x8002_0065;
    pub const SCE_KERNEL_ERROR_LIBRARY_NOT_YET_LINKED: u32 = 0x8002_013A;
    pub const SCE_KERNEL_ERROR_ILLEGAL_ADDR: u32 = 0x8002_00D3;
    pub const SCE_KERNEL_ERROR_BADF: u32 = 0x8002_0323;
    pub const SCE_ERROR_ERRNO_FILE_NOT_FOUND: u32 = 0x8001_0002;
    pub const SCE_ERROR_ERRNO_IO_ERROR: u32 = 0x8001_0005;
    pub const SCE_ERROR_ERRNO_INVALID_ARGUMENT: u32 = 0x8001_0016;
}

use error_code::*;

#[derive(Debug, Error)]
pub enum HleError {
    #[error("未实现的函数")]
    Unimplemented,
    #[error("参数 {index} 类型错误: 需要 {expected}")]
    ArgumentType { index: usize, expected: &'static str },
    #[error("{function} 的参数超出寄存器数量")]
    ArgumentOverflow { function: &'static str },
    #[error("无效参数: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Memory(#[from] MemoryError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    Callback(#[from] CallbackError),
    #[error(transparent)]
    Interrupt(#[from] InterruptError),
    #[error("宿主 I/O 错误: {0}")]
    Io(#[from] std::io::Error),
    #[error("错误码 {0:#010x}")]
    Code(u32),
}

impl HleError {
    /// 写入 `$v0` 的错误码
    pub fn sce_code(&self) -> u32 {
        match self {
            HleError::Unimplemented
            | HleError::ArgumentType { .. }
            | HleError::ArgumentOverflow { .. } => SCE_KERNEL_ERROR_ERROR,
            HleError::InvalidArgument(_) => SCE_ERROR_ERRNO_INVALID_ARGUMENT,
            HleError::Memory(_) => SCE_KERNEL_ERROR_ILLEGAL_ADDR,
            HleError::Resource(_) => SCE_KERNEL_ERROR_BADF,
            HleError::Callback(CallbackError::InvalidAddress(_)) => SCE_KERNEL_ERROR_ILLEGAL_ADDR,
            HleError::Callback(CallbackError::Resource(_)) => SCE_KERNEL_ERROR_BADF,
            HleError::Callback(CallbackError::Queue(_)) => SCE_KERNEL_ERROR_ERROR,
            HleError::Interrupt(_) => SCE_KERNEL_ERROR_ILLEGAL_INTRCODE,
            HleError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => {
                SCE_ERROR_ERRNO_FILE_NOT_FOUND
            }
            HleError::Io(_) => SCE_ERROR_ERRNO_IO_ERROR,
            HleError::Code(code) => *code,
        }
    }
}

/// 参数类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arg {
    Int,
    /// 占用一对对齐到偶数的寄存器 (低位, 高位)
    Long,
    Ptr,
    /// 以 0 结尾的字符串，空指针解码为 `None`
    Str,
}

/// 返回值类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ret {
    Int,
    Long,
    Void,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Int(i32),
    Long(i64),
    Ptr(u32),
    Str(Option<String>),
}

/// 解码后的参数列表
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HleArgs(Vec<ArgValue>);

impl HleArgs {
    pub fn new(values: Vec<ArgValue>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[ArgValue] {
        &self.0
    }

    pub fn int(&self, index: usize) -> Result<i32, HleError> {
        match self.0.get(index) {
            Some(ArgValue::Int(v)) => Ok(*v),
            _ => Err(HleError::ArgumentType { index, expected: "int" }),
        }
    }

    pub fn long(&self, index: usize) -> Result<i64, HleError> {
        match self.0.get(index) {
            Some(ArgValue::Long(v)) => Ok(*v),
            _ => Err(HleError::ArgumentType { index, expected: "long" }),
        }
    }

    pub fn ptr(&self, index: usize) -> Result<u32, HleError> {
        match self.0.get(index) {
            Some(ArgValue::Ptr(v)) => Ok(*v),
            _ => Err(HleError::ArgumentType { index, expected: "ptr" }),
        }
    }

    pub fn str(&self, index: usize) -> Result<Option<&str>, HleError> {
        match self.0.get(index) {
            Some(ArgValue::Str(v)) => Ok(v.as_deref()),
            _ => Err(HleError::ArgumentType { index, expected: "str" }),
        }
    }
}

/// 挂起的调用恢复时要执行的剩余部分
pub struct Continuation(Box<dyn FnOnce(&mut Emulator) -> Result<i64, HleError>>);

impl Continuation {
    pub fn new(f: impl FnOnce(&mut Emulator) -> Result<i64, HleError> + 'static) -> Self {
        Self(Box::new(f))
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Continuation(..)")
    }
}

#[derive(Debug)]
pub enum HleResult {
    Done(i64),
    Pending(Continuation),
}

pub type TypedFn = fn(&mut Emulator, &HleArgs) -> Result<i64, HleError>;
pub type RawFn = fn(&mut Emulator) -> Result<(), HleError>;
pub type SuspendFn = fn(&mut Emulator, &HleArgs) -> Result<HleResult, HleError>;

#[derive(Clone, Copy)]
pub enum HleCall {
    Typed {
        args: &'static [Arg],
        ret: Ret,
        func: TypedFn,
    },
    Raw(RawFn),
    Suspend {
        args: &'static [Arg],
        ret: Ret,
        func: SuspendFn,
    },
}

impl fmt::Debug for HleCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HleCall::Typed { args, ret, .. } => write!(f, "Typed({args:?} -> {ret:?})"),
            HleCall::Raw(_) => write!(f, "Raw"),
            HleCall::Suspend { args, ret, .. } => write!(f, "Suspend({args:?} -> {ret:?})"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HleFunction {
    pub name: &'static str,
    pub nid: u32,
    /// 首次出现的固件版本
    pub since: u32,
    pub call: HleCall,
}

fn not_ported(_emu: &mut Emulator) -> Result<(), HleError> {
    Err(HleError::Unimplemented)
}

/// 尚未移植的函数：调用时记录警告并返回 `SCE_KERNEL_ERROR_ERROR`
pub const fn unimplemented(name: &'static str, nid: u32, since: u32) -> HleFunction {
    HleFunction {
        name,
        nid,
        since,
        call: HleCall::Raw(not_ported),
    }
}

#[derive(Debug)]
pub struct HleModule {
    pub name: &'static str,
    pub functions: &'static [HleFunction],
}

/// NID 到函数的映射
#[derive(Debug, Clone, Default)]
pub struct SyscallTable {
    firmware_version: u32,
    functions: HashMap<u32, HleFunction, BuildNoHashHasher<u32>>,
}

impl SyscallTable {
    /// 登记 `since <= firmware_version` 的函数，更新的函数直接忽略
    pub fn new(firmware_version: u32, modules: &[&HleModule]) -> Self {
        let mut functions = HashMap::with_hasher(BuildNoHashHasher::default());
        for module in modules {
            let mut registered = 0usize;
            for function in module.functions {
                if function.since > firmware_version {
                    continue;
                }
                if let Some(old) = functions.insert(function.nid, *function) {
                    warn!(
                        nid = format_args!("{:#010x}", function.nid),
                        old = old.name,
                        new = function.name,
                        "NID 重复登记"
                    );
                }
                registered += 1;
            }
            debug!(module = module.name, registered, "登记 HLE 模块");
        }
        Self {
            firmware_version,
            functions,
        }
    }

    pub fn firmware_version(&self) -> u32 {
        self.firmware_version
    }

    pub fn lookup(&self, nid: u32) -> Option<&HleFunction> {
        self.functions.get(&nid)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// 一次系统调用结束后的状态
#[derive(Debug)]
pub enum DispatchState {
    Completed,
    Suspended(SuspendedCall),
}

/// 等待调度器恢复的调用
#[derive(Debug)]
pub struct SuspendedCall {
    pub function: HleFunction,
    ret: Ret,
    continuation: Continuation,
}

impl SuspendedCall {
    /// 执行剩余部分并写回返回值寄存器，返回写入的值
    pub fn resume(self, emu: &mut Emulator) -> i64 {
        trace!(name = self.function.name, "恢复挂起的系统调用");
        let result = (self.continuation.0)(emu);
        write_result(emu, &self.function, self.ret, result)
    }
}

fn next_reg(emu: &Emulator, function: &'static str, cursor: &mut usize) -> Result<u32, HleError> {
    let reg = *ARG_REGS
        .get(*cursor)
        .ok_or(HleError::ArgumentOverflow { function })?;
    *cursor += 1;
    Ok(emu.cpu.registers[reg])
}

/// 从参数寄存器解码参数
pub fn decode_args(emu: &mut Emulator, function: &'static str, kinds: &[Arg]) -> Result<HleArgs, HleError> {
    let mut values = Vec::with_capacity(kinds.len());
    let mut cursor = 0usize;
    for kind in kinds {
        let value = match kind {
            Arg::Int => ArgValue::Int(next_reg(emu, function, &mut cursor)? as i32),
            Arg::Ptr => ArgValue::Ptr(next_reg(emu, function, &mut cursor)?),
            Arg::Long => {
                cursor += cursor & 1;
                let low = next_reg(emu, function, &mut cursor)? as u64;
                let high = next_reg(emu, function, &mut cursor)? as u64;
                ArgValue::Long(((high << 32) | low) as i64)
            }
            Arg::Str => {
                let addr = next_reg(emu, function, &mut cursor)?;
                if addr == 0 {
                    ArgValue::Str(None)
                } else {
                    ArgValue::Str(Some(emu.memory.ptr(addr).read_stringz()?))
                }
            }
        };
        values.push(value);
    }
    Ok(HleArgs(values))
}

/// 写回返回值；错误被转换为错误码
fn write_result(emu: &mut Emulator, function: &HleFunction, ret: Ret, result: Result<i64, HleError>) -> i64 {
    let value = match result {
        Ok(value) => value,
        Err(err) => {
            match &err {
                HleError::Unimplemented
                | HleError::ArgumentType { .. }
                | HleError::ArgumentOverflow { .. } => {
                    warn!(name = function.name, nid = format_args!("{:#010x}", function.nid), "{}", err)
                }
                _ => debug!(name = function.name, "系统调用失败: {}", err),
            }
            let code = err.sce_code() as i32 as i64;
            // 无返回值的函数出错时同样写入 $v0
            if ret == Ret::Long {
                emu.cpu.set_return_i64(code);
            } else {
                emu.cpu.set_return_i32(code as i32);
            }
            return code;
        }
    };
    match ret {
        Ret::Int => emu.cpu.set_return_i32(value as i32),
        Ret::Long => emu.cpu.set_return_i64(value),
        Ret::Void => {}
    }
    value
}

/// 调用一个已找到的函数
pub fn dispatch(emu: &mut Emulator, function: &HleFunction) -> DispatchState {
    trace!(name = function.name, nid = format_args!("{:#010x}", function.nid), "系统调用");
    match function.call {
        HleCall::Typed { args, ret, func } => {
            let result = decode_args(emu, function.name, args).and_then(|args| func(emu, &args));
            write_result(emu, function, ret, result);
            DispatchState::Completed
        }
        HleCall::Raw(func) => {
            if let Err(err) = func(emu) {
                write_result(emu, function, Ret::Int, Err(err));
            }
            DispatchState::Completed
        }
        HleCall::Suspend { args, ret, func } => {
            match decode_args(emu, function.name, args).and_then(|args| func(emu, &args)) {
                Ok(HleResult::Pending(continuation)) => {
                    trace!(name = function.name, "系统调用挂起");
                    DispatchState::Suspended(SuspendedCall {
                        function: *function,
                        ret,
                        continuation,
                    })
                }
                Ok(HleResult::Done(value)) => {
                    write_result(emu, function, ret, Ok(value));
                    DispatchState::Completed
                }
                Err(err) => {
                    write_result(emu, function, ret, Err(err));
                    DispatchState::Completed
                }
            }
        }
    }
}
