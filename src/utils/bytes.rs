//! 小端字节流读写，用于客户机中的定长结构体

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BytesError {
    #[error("数据不足: 偏移 {offset} 处需要 {needed} 字节, 剩余 {remaining} 字节")]
    UnexpectedEof {
        offset: usize,
        needed: usize,
        remaining: usize,
    },
}

/// 客户机内存中的定长结构体
///
/// `encode` 必须恰好写出 `SIZE` 字节。
pub trait PspStruct: Sized {
    const SIZE: usize;

    fn decode(r: &mut ByteReader<'_>) -> Result<Self, BytesError>;

    fn encode(&self, w: &mut ByteWriter);

    fn from_bytes(bytes: &[u8]) -> Result<Self, BytesError> {
        Self::decode(&mut ByteReader::new(bytes))
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(Self::SIZE);
        self.encode(&mut w);
        w.into_inner()
    }
}

#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    #[inline(always)]
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], BytesError> {
        let remaining = self.data.len() - self.pos;
        if n > remaining {
            return Err(BytesError::UnexpectedEof {
                offset: self.pos,
                needed: n,
                remaining,
            });
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], BytesError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, BytesError> {
        Ok(self.array::<1>()?[0])
    }

    pub fn u16_le(&mut self) -> Result<u16, BytesError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn u32_le(&mut self) -> Result<u32, BytesError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn u64_le(&mut self) -> Result<u64, BytesError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    /// 读取 `n` 字节定长字段中以 0 结尾的字符串
    pub fn fixed_str(&mut self, n: usize) -> Result<String, BytesError> {
        let raw = self.bytes(n)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn u16_le(&mut self, value: u16) {
        self.bytes(&value.to_le_bytes());
    }

    pub fn u32_le(&mut self, value: u32) {
        self.bytes(&value.to_le_bytes());
    }

    pub fn u64_le(&mut self, value: u64) {
        self.bytes(&value.to_le_bytes());
    }

    /// 写入 `n` 字节定长字符串字段，超长截断，不足补 0
    pub fn fixed_str(&mut self, s: &str, n: usize) {
        let raw = s.as_bytes();
        let len = raw.len().min(n);
        self.bytes(&raw[..len]);
        self.buf.resize(self.buf.len() + (n - len), 0);
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}
