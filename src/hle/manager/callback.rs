//! 回调管理
//!
//! 回调对象保存在 [`ResourceList`] 中。排队等待执行的客户机函数放进定长队列，
//! 由外部线程调度器通过 [`CallbackManager::drain_queued`] 取走。

use thiserror::Error;
use tracing::debug;

use crate::utils::{ResourceError, ResourceItem, ResourceList, RingBuffer, RingBufferError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallbackError {
    #[error("无效的回调函数地址: {0:#010x}")]
    InvalidAddress(u32),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error("回调队列: {0}")]
    Queue(#[from] RingBufferError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PspCallback {
    pub id: i32,
    pub name: String,
    pub func: u32,
    pub arg: u32,
    /// 被通知的次数
    pub notify_count: u32,
}

impl ResourceItem for PspCallback {
    fn id(&self) -> i32 {
        self.id
    }
}

/// 等待调度器执行的一次函数调用
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueuedCall {
    pub func: u32,
    pub arg: u32,
    /// 来自已登记回调时为其编号
    pub callback_id: Option<i32>,
}

#[derive(Debug)]
pub struct CallbackManager {
    callbacks: ResourceList<PspCallback>,
    queue: RingBuffer<QueuedCall>,
}

impl CallbackManager {
    pub fn new(queue_size: usize) -> Self {
        Self {
            callbacks: ResourceList::new("Callback", |id| PspCallback {
                id,
                ..Default::default()
            }),
            queue: RingBuffer::new(queue_size),
        }
    }

    pub fn create(&mut self, name: &str, func: u32, arg: u32) -> Result<i32, CallbackError> {
        Self::check_address(func)?;
        let callback = self.callbacks.alloc();
        callback.name = name.to_string();
        callback.func = func;
        callback.arg = arg;
        callback.notify_count = 0;
        debug!(id = callback.id, name, func = format_args!("{:#010x}", func), "创建回调");
        Ok(callback.id)
    }

    pub fn get(&self, id: i32) -> Result<&PspCallback, CallbackError> {
        Ok(self.callbacks.get(id)?)
    }

    pub fn delete(&mut self, id: i32) -> Result<(), CallbackError> {
        Ok(self.callbacks.free_by_id(id)?)
    }

    pub fn callbacks(&self) -> impl Iterator<Item = &PspCallback> + '_ {
        self.callbacks.iter()
    }

    /// 排队执行客户机函数 `func(arg)`
    pub fn queue_function1(&mut self, func: u32, arg: u32) -> Result<(), CallbackError> {
        Self::check_address(func)?;
        self.queue.push(QueuedCall {
            func,
            arg,
            callback_id: None,
        })?;
        Ok(())
    }

    /// 排队执行已登记的回调
    pub fn queue_callback(&mut self, id: i32) -> Result<(), CallbackError> {
        let callback = self.callbacks.get_mut(id)?;
        let call = QueuedCall {
            func: callback.func,
            arg: callback.arg,
            callback_id: Some(id),
        };
        self.queue.push(call)?;
        callback.notify_count += 1;
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// 按入队顺序取出所有待执行的调用
    pub fn drain_queued(&mut self) -> Vec<QueuedCall> {
        self.queue.drain()
    }

    fn check_address(func: u32) -> Result<(), CallbackError> {
        if func == 0 || func % 4 != 0 {
            return Err(CallbackError::InvalidAddress(func));
        }
        Ok(())
    }
}
