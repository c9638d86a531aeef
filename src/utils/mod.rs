//! 工具模块

pub mod bytes;
pub mod resource_list;
pub mod ringbuf;

pub use resource_list::{ResourceError, ResourceItem, ResourceList};
pub use ringbuf::{RingBuffer, RingBufferError};
