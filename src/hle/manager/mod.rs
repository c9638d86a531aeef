//! 系统调用层依赖的内核对象管理器

pub mod callback;
pub mod interrupt;

pub use callback::{CallbackError, CallbackManager, PspCallback, QueuedCall};
pub use interrupt::{InterruptError, InterruptExecutor, InterruptHandler, InterruptManager, psp_interrupt};
