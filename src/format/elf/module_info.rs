use crate::utils::bytes::{ByteReader, ByteWriter, BytesError, PspStruct};

/// 模块名字段长度 (含结束符)
const MODULE_NAME_LEN: usize = 28;

/// `sceModuleInfo` 记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElfPspModuleInfo {
    pub attributes: u16,
    pub version: u16,
    pub name: String,
    pub gp: u32,
    pub exports_start: u32,
    pub exports_end: u32,
    pub imports_start: u32,
    pub imports_end: u32,
}

impl ElfPspModuleInfo {
    pub fn is_kernel(&self) -> bool {
        self.attributes & 0x1000 != 0
    }

    /// 导出表项数 (每项 16 字节)
    pub fn export_count(&self) -> u32 {
        self.exports_end.saturating_sub(self.exports_start) / 16
    }

    /// 导入表项数 (每项 20 字节)
    pub fn import_count(&self) -> u32 {
        self.imports_end.saturating_sub(self.imports_start) / 20
    }
}

impl PspStruct for ElfPspModuleInfo {
    const SIZE: usize = 52;

    fn decode(r: &mut ByteReader<'_>) -> Result<Self, BytesError> {
        Ok(Self {
            attributes: r.u16_le()?,
            version: r.u16_le()?,
            name: r.fixed_str(MODULE_NAME_LEN)?,
            gp: r.u32_le()?,
            exports_start: r.u32_le()?,
            exports_end: r.u32_le()?,
            imports_start: r.u32_le()?,
            imports_end: r.u32_le()?,
        })
    }

    fn encode(&self, w: &mut ByteWriter) {
        w.u16_le(self.attributes);
        w.u16_le(self.version);
        w.fixed_str(&self.name, MODULE_NAME_LEN);
        w.u32_le(self.gp);
        w.u32_le(self.exports_start);
        w.u32_le(self.exports_end);
        w.u32_le(self.imports_start);
        w.u32_le(self.imports_end);
    }
}
