use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RingBufferError {
    #[error("队列已满 (容量 {0})")]
    Full(usize),
    #[error("队列为空")]
    Empty,
}

/// 定长环形队列，先进先出
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    buf: Vec<T>,
    read: usize,
    write: usize,
    full: bool,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// 容量为 0 时按 1 处理
    pub fn new(size: usize) -> Self {
        RingBuffer {
            buf: vec![T::default(); size.max(1)],
            read: 0,
            write: 0,
            full: false,
        }
    }

    pub fn push(&mut self, item: T) -> Result<(), RingBufferError> {
        if self.full {
            return Err(RingBufferError::Full(self.buf.len()));
        }
        self.buf[self.write] = item;
        self.write = (self.write + 1) % self.buf.len();
        if self.write == self.read {
            self.full = true;
        }
        Ok(())
    }

    pub fn pop(&mut self) -> Result<T, RingBufferError> {
        if self.is_empty() {
            return Err(RingBufferError::Empty);
        }
        let item = self.buf[self.read];
        self.read = (self.read + 1) % self.buf.len();
        self.full = false;
        Ok(item)
    }

    pub fn peek(&self) -> Option<T> {
        (!self.is_empty()).then(|| self.buf[self.read])
    }

    /// 按入队顺序取出全部元素
    pub fn drain(&mut self) -> Vec<T> {
        let mut items = Vec::with_capacity(self.len());
        while let Ok(item) = self.pop() {
            items.push(item);
        }
        items
    }

    pub fn is_empty(&self) -> bool {
        !self.full && self.read == self.write
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn len(&self) -> usize {
        if self.full {
            self.buf.len()
        } else {
            (self.write + self.buf.len() - self.read) % self.buf.len()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let rb: RingBuffer<u32> = RingBuffer::new(4);
        assert_eq!(rb.capacity(), 4);
        assert!(rb.is_empty());
        assert!(!rb.is_full());
        assert_eq!(RingBuffer::<u32>::new(0).capacity(), 1);
    }

    #[test]
    fn test_push_until_full() {
        let mut rb = RingBuffer::new(2);
        rb.push((0x0890_0000u32, 1u32)).unwrap();
        rb.push((0x0890_0010, 2)).unwrap();
        assert!(rb.is_full());
        assert_eq!(rb.push((0x0890_0020, 3)), Err(RingBufferError::Full(2)));
        assert_eq!(rb.peek(), Some((0x0890_0000, 1)));
    }

    #[test]
    fn test_fifo_order_with_wraparound() {
        let mut rb = RingBuffer::new(3);
        rb.push(1).unwrap();
        rb.push(2).unwrap();
        assert_eq!(rb.pop().unwrap(), 1);
        rb.push(3).unwrap();
        rb.push(4).unwrap();
        assert_eq!(rb.len(), 3);
        assert_eq!(rb.drain(), vec![2, 3, 4]);
        assert!(rb.is_empty());
        assert_eq!(rb.pop(), Err(RingBufferError::Empty));
        assert_eq!(rb.peek(), None);
    }
}
