//! ELF / PRX 解析
//!
//! 解析分两步：先从字节流中读出头部与各表项的原始字段，再解析节名、绑定节数据视图，
//! 最后得到只读的 [`Elf`]。任何一步失败都会让整个解析失败，调用方不会拿到半成品。

mod module_info;
mod types;

use object::elf::{FileHeader32, ProgramHeader32, Rel32, SectionHeader32};
use object::endian::LittleEndian as LE;
use object::pod;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::utils::bytes::PspStruct;

pub use module_info::ElfPspModuleInfo;
pub use types::{
    ElfMachine, ElfProgramHeaderFlags, ElfProgramHeaderType, ElfRelocType,
    ElfSectionHeaderFlags, ElfSectionHeaderType, ElfType,
};

pub const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];

const PROGRAM_HEADER_SIZE: usize = 32;
const SECTION_HEADER_SIZE: usize = 40;
const RELOC_SIZE: usize = 8;
const MODULE_INFO_SECTION: &str = ".rodata.sceModuleInfo";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ElfError {
    #[error("不是 ELF 文件: 魔数 {0:02x?}")]
    InvalidMagic([u8; 4]),
    #[error("不是 PSP ELF 文件: machine = {0}")]
    InvalidMachine(u16),
    #[error("既不是可执行文件也不是 PRX: type = {0:#06x}")]
    InvalidType(u16),
    #[error("{what} 超出文件范围: 偏移 {offset:#x}, 大小 {size:#x}, 文件长度 {len:#x}")]
    Truncated {
        what: &'static str,
        offset: u64,
        size: u64,
        len: usize,
    },
    #[error("{table} 表项大小 {entsize} 小于 {min}")]
    EntrySizeTooSmall {
        table: &'static str,
        entsize: u16,
        min: usize,
    },
    #[error("节名字符串表索引 {index} 超出范围 (共 {count} 个节)")]
    InvalidStringTableIndex { index: u16, count: u16 },
    #[error("节名偏移 {offset:#x} 超出字符串表 (大小 {size:#x})")]
    InvalidNameOffset { offset: u32, size: usize },
    #[error("未知的 {kind} 取值: {value:#x}")]
    UnknownVariant { kind: &'static str, value: u32 },
    #[error("不支持的重定位格式: {0}")]
    UnsupportedRelocation(&'static str),
    #[error("找不到模块信息")]
    MissingModuleInfo,
}

/// 从 `data` 中截取 `[offset, offset + size)`
fn slice<'d>(data: &'d [u8], offset: u64, size: u64, what: &'static str) -> Result<&'d [u8], ElfError> {
    let truncated = ElfError::Truncated {
        what,
        offset,
        size,
        len: data.len(),
    };
    let end = offset
        .checked_add(size)
        .filter(|&end| end <= data.len() as u64)
        .ok_or(truncated)?;
    Ok(&data[offset as usize..end as usize])
}

/// ELF 文件头
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElfHeader {
    pub magic: [u8; 4],
    pub class: u8,
    pub data: u8,
    pub id_version: u8,
    pub padding: [u8; 9],
    pub elf_type: u16,
    pub machine: u16,
    pub version: u32,
    pub entry_point: u32,
    pub program_header_offset: u32,
    pub section_header_offset: u32,
    pub flags: u32,
    pub elf_header_size: u16,
    pub program_header_entry_size: u16,
    pub program_header_count: u16,
    pub section_header_entry_size: u16,
    pub section_header_count: u16,
    pub section_header_string_table: u16,
}

impl ElfHeader {
    /// 解析并校验文件头，依次检查魔数、机器类型与文件类型
    pub fn parse(data: &[u8]) -> Result<Self, ElfError> {
        let (raw, _) = pod::from_bytes::<FileHeader32<LE>>(data).map_err(|()| ElfError::Truncated {
            what: "ELF 文件头",
            offset: 0,
            size: std::mem::size_of::<FileHeader32<LE>>() as u64,
            len: data.len(),
        })?;

        let ident = &raw.e_ident;
        let mut padding = [0u8; 9];
        padding[0] = ident.os_abi;
        padding[1] = ident.abi_version;
        padding[2..].copy_from_slice(&ident.padding);

        let header = Self {
            magic: ident.magic,
            class: ident.class,
            data: ident.data,
            id_version: ident.version,
            padding,
            elf_type: raw.e_type.get(LE),
            machine: raw.e_machine.get(LE),
            version: raw.e_version.get(LE),
            entry_point: raw.e_entry.get(LE),
            program_header_offset: raw.e_phoff.get(LE),
            section_header_offset: raw.e_shoff.get(LE),
            flags: raw.e_flags.get(LE),
            elf_header_size: raw.e_ehsize.get(LE),
            program_header_entry_size: raw.e_phentsize.get(LE),
            program_header_count: raw.e_phnum.get(LE),
            section_header_entry_size: raw.e_shentsize.get(LE),
            section_header_count: raw.e_shnum.get(LE),
            section_header_string_table: raw.e_shstrndx.get(LE),
        };

        if !header.has_valid_magic() {
            return Err(ElfError::InvalidMagic(header.magic));
        }
        if !header.has_valid_machine() {
            return Err(ElfError::InvalidMachine(header.machine));
        }
        if !header.has_valid_type() {
            return Err(ElfError::InvalidType(header.elf_type));
        }
        Ok(header)
    }

    pub fn has_valid_magic(&self) -> bool {
        self.magic == ELF_MAGIC
    }

    pub fn has_valid_machine(&self) -> bool {
        self.machine == ElfMachine::Allegrex.raw()
    }

    pub fn has_valid_type(&self) -> bool {
        ElfType::try_from(self.elf_type).is_ok()
    }

    pub fn elf_type(&self) -> Result<ElfType, ElfError> {
        ElfType::try_from(self.elf_type)
    }

    pub fn is_prx(&self) -> bool {
        self.elf_type == ElfType::Prx.raw()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElfProgramHeader {
    pub ty: ElfProgramHeaderType,
    pub offset: u32,
    pub virtual_address: u32,
    pub physical_address: u32,
    pub file_size: u32,
    pub memory_size: u32,
    pub flags: ElfProgramHeaderFlags,
    pub alignment: u32,
}

impl ElfProgramHeader {
    fn parse(entry: &[u8]) -> Result<Self, ElfError> {
        let (raw, _) = pod::from_bytes::<ProgramHeader32<LE>>(entry).map_err(|()| ElfError::Truncated {
            what: "程序头",
            offset: 0,
            size: PROGRAM_HEADER_SIZE as u64,
            len: entry.len(),
        })?;
        Ok(Self {
            ty: raw.p_type.get(LE).into(),
            offset: raw.p_offset.get(LE),
            virtual_address: raw.p_vaddr.get(LE),
            physical_address: raw.p_paddr.get(LE),
            file_size: raw.p_filesz.get(LE),
            memory_size: raw.p_memsz.get(LE),
            flags: ElfProgramHeaderFlags::from_bits_retain(raw.p_flags.get(LE)),
            alignment: raw.p_align.get(LE),
        })
    }
}

/// 第一阶段的节头：只有原始字段
#[derive(Debug, Clone, Copy)]
struct RawSectionHeader {
    name_offset: u32,
    ty: ElfSectionHeaderType,
    flags: ElfSectionHeaderFlags,
    address: u32,
    offset: u32,
    size: u32,
    link: u32,
    info: u32,
    address_align: u32,
    entity_size: u32,
}

impl RawSectionHeader {
    fn parse(entry: &[u8]) -> Result<Self, ElfError> {
        let (raw, _) = pod::from_bytes::<SectionHeader32<LE>>(entry).map_err(|()| ElfError::Truncated {
            what: "节头",
            offset: 0,
            size: SECTION_HEADER_SIZE as u64,
            len: entry.len(),
        })?;
        Ok(Self {
            name_offset: raw.sh_name.get(LE),
            ty: ElfSectionHeaderType::try_from(raw.sh_type.get(LE))?,
            flags: ElfSectionHeaderFlags::from_bits_retain(raw.sh_flags.get(LE)),
            address: raw.sh_addr.get(LE),
            offset: raw.sh_offset.get(LE),
            size: raw.sh_size.get(LE),
            link: raw.sh_link.get(LE),
            info: raw.sh_info.get(LE),
            address_align: raw.sh_addralign.get(LE),
            entity_size: raw.sh_entsize.get(LE),
        })
    }

    /// Null / NoBits 节的偏移没有意义，绑定空视图
    fn data<'d>(&self, data: &'d [u8]) -> Result<&'d [u8], ElfError> {
        match self.ty {
            ElfSectionHeaderType::Null | ElfSectionHeaderType::NoBits => Ok(&[]),
            _ => slice(data, self.offset as u64, self.size as u64, "节数据"),
        }
    }
}

/// 名字与数据都已解析完成的节头
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElfSectionHeader<'data> {
    pub name_offset: u32,
    pub name: String,
    pub ty: ElfSectionHeaderType,
    pub flags: ElfSectionHeaderFlags,
    pub address: u32,
    pub offset: u32,
    pub size: u32,
    pub link: u32,
    pub info: u32,
    pub address_align: u32,
    pub entity_size: u32,
    /// 指向源字节流的视图
    pub data: &'data [u8],
}

/// 重定位项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElfReloc {
    pub pointer_address: u32,
    pub info: u32,
}

impl ElfReloc {
    pub fn new(pointer_address: u32, info: u32) -> Self {
        Self {
            pointer_address,
            info,
        }
    }

    pub fn pointee_section_header_base(&self) -> u32 {
        (self.info >> 16) & 0xFF
    }

    pub fn pointer_section_header_base(&self) -> u32 {
        (self.info >> 8) & 0xFF
    }

    pub fn reloc_type(&self) -> Result<ElfRelocType, ElfError> {
        ElfRelocType::try_from((self.info & 0xFF) as u8)
    }
}

fn parse_relocs(data: &[u8]) -> Result<Vec<ElfReloc>, ElfError> {
    let (relocs, _) = pod::slice_from_bytes::<Rel32<LE>>(data, data.len() / RELOC_SIZE).map_err(|()| {
        ElfError::Truncated {
            what: "重定位表",
            offset: 0,
            size: data.len() as u64,
            len: data.len(),
        }
    })?;
    Ok(relocs
        .iter()
        .map(|r| ElfReloc::new(r.r_offset.get(LE), r.r_info.get(LE)))
        .collect())
}

/// 以 0 结尾读取字符串表中的名字；表尾视为结束符
fn string_at(table: &[u8], offset: u32) -> Result<String, ElfError> {
    if table.is_empty() && offset == 0 {
        return Ok(String::new());
    }
    let start = offset as usize;
    if start >= table.len() {
        return Err(ElfError::InvalidNameOffset {
            offset,
            size: table.len(),
        });
    }
    let rest = &table[start..];
    let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
    Ok(String::from_utf8_lossy(&rest[..end]).into_owned())
}

/// 解析后的 ELF 映像
#[derive(Debug, Clone)]
pub struct Elf<'data> {
    data: &'data [u8],
    pub header: ElfHeader,
    pub program_headers: Vec<ElfProgramHeader>,
    pub section_headers: Vec<ElfSectionHeader<'data>>,
    section_headers_by_name: FxHashMap<String, usize>,
}

impl<'data> Elf<'data> {
    pub fn parse(data: &'data [u8]) -> Result<Self, ElfError> {
        let header = ElfHeader::parse(data)?;

        let program_headers = Self::table(
            data,
            "程序头表",
            header.program_header_offset,
            header.program_header_entry_size,
            header.program_header_count,
            PROGRAM_HEADER_SIZE,
        )?
        .map(ElfProgramHeader::parse)
        .collect::<Result<Vec<_>, _>>()?;

        let raw_sections = Self::table(
            data,
            "节头表",
            header.section_header_offset,
            header.section_header_entry_size,
            header.section_header_count,
            SECTION_HEADER_SIZE,
        )?
        .map(RawSectionHeader::parse)
        .collect::<Result<Vec<_>, _>>()?;

        let string_table = if raw_sections.is_empty() {
            &[][..]
        } else {
            let index = header.section_header_string_table;
            let table = raw_sections
                .get(index as usize)
                .ok_or(ElfError::InvalidStringTableIndex {
                    index,
                    count: header.section_header_count,
                })?;
            table.data(data)?
        };

        let mut section_headers = Vec::with_capacity(raw_sections.len());
        let mut section_headers_by_name = FxHashMap::default();
        for (index, raw) in raw_sections.iter().enumerate() {
            let name = string_at(string_table, raw.name_offset)?;
            section_headers_by_name.insert(name.clone(), index);
            section_headers.push(ElfSectionHeader {
                name_offset: raw.name_offset,
                name,
                ty: raw.ty,
                flags: raw.flags,
                address: raw.address,
                offset: raw.offset,
                size: raw.size,
                link: raw.link,
                info: raw.info,
                address_align: raw.address_align,
                entity_size: raw.entity_size,
                data: raw.data(data)?,
            });
        }

        tracing::debug!(
            programs = program_headers.len(),
            sections = section_headers.len(),
            entry = format_args!("{:#010x}", header.entry_point),
            "解析ELF完成"
        );

        Ok(Self {
            data,
            header,
            program_headers,
            section_headers,
            section_headers_by_name,
        })
    }

    /// 按 `offset + entsize * count` 切出表，并按表项大小逐项迭代
    fn table(
        data: &'data [u8],
        what: &'static str,
        offset: u32,
        entsize: u16,
        count: u16,
        min: usize,
    ) -> Result<impl Iterator<Item = &'data [u8]>, ElfError> {
        if count > 0 && (entsize as usize) < min {
            return Err(ElfError::EntrySizeTooSmall {
                table: what,
                entsize,
                min,
            });
        }
        let stride = entsize as usize;
        let table = slice(data, offset as u64, stride as u64 * count as u64, what)?;
        Ok((0..count as usize).map(move |i| &table[i * stride..(i + 1) * stride]))
    }

    pub fn data(&self) -> &'data [u8] {
        self.data
    }

    pub fn section_header_string_table(&self) -> Option<&ElfSectionHeader<'data>> {
        self.section_headers
            .get(self.header.section_header_string_table as usize)
    }

    pub fn section_by_name(&self, name: &str) -> Option<&ElfSectionHeader<'data>> {
        self.section_headers_by_name
            .get(name)
            .map(|&index| &self.section_headers[index])
    }

    /// 程序头在文件中的数据
    pub fn program_data(&self, ph: &ElfProgramHeader) -> Result<&'data [u8], ElfError> {
        slice(self.data, ph.offset as u64, ph.file_size as u64, "段数据")
    }

    /// 收集 PRX 重定位项；节表中没有重定位节时退回到程序头
    pub fn relocations(&self) -> Result<Vec<ElfReloc>, ElfError> {
        let mut relocs = Vec::new();
        let mut found = false;
        for section in &self.section_headers {
            match section.ty {
                ElfSectionHeaderType::PrxRelocation => {
                    found = true;
                    relocs.extend(parse_relocs(section.data)?);
                }
                ElfSectionHeaderType::PrxRelocationFw5 => {
                    return Err(ElfError::UnsupportedRelocation("固件 5.x 压缩重定位节"));
                }
                _ => {}
            }
        }
        if found {
            return Ok(relocs);
        }

        for ph in &self.program_headers {
            match ph.ty {
                ElfProgramHeaderType::Reloc1 => relocs.extend(parse_relocs(self.program_data(ph)?)?),
                ElfProgramHeaderType::Reloc2 => {
                    return Err(ElfError::UnsupportedRelocation("固件 5.x 压缩重定位段"));
                }
                _ => {}
            }
        }
        Ok(relocs)
    }

    /// 读取模块信息
    ///
    /// 优先查找 `.rodata.sceModuleInfo` 节；PRX 没有节表时，第一个程序头的物理地址
    /// (去掉最高位) 是模块信息在文件中的偏移。
    pub fn module_info(&self) -> Result<ElfPspModuleInfo, ElfError> {
        let bytes = if let Some(section) = self.section_by_name(MODULE_INFO_SECTION) {
            section.data
        } else if let Some(first) = self.program_headers.first().filter(|_| self.header.is_prx()) {
            let offset = (first.physical_address & 0x7FFF_FFFF) as u64;
            slice(self.data, offset, ElfPspModuleInfo::SIZE as u64, "模块信息")?
        } else {
            return Err(ElfError::MissingModuleInfo);
        };
        ElfPspModuleInfo::from_bytes(bytes).map_err(|_| ElfError::Truncated {
            what: "模块信息",
            offset: 0,
            size: ElfPspModuleInfo::SIZE as u64,
            len: bytes.len(),
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! 构造测试用的 PSP ELF 映像

    pub const SHT_PROGBITS: u32 = 1;
    pub const SHT_NOBITS: u32 = 8;
    pub const SHT_PRXREL: u32 = 0x7000_00A0;
    pub const PT_LOAD: u32 = 1;
    pub const PT_PRXREL: u32 = 0x7000_00A0;

    pub struct TestSection {
        pub name: String,
        pub ty: u32,
        pub flags: u32,
        pub addr: u32,
        pub data: Vec<u8>,
        /// NoBits 节的声明大小
        pub size: u32,
    }

    pub struct TestSegment {
        pub ty: u32,
        pub vaddr: u32,
        pub paddr: u32,
        pub data: Vec<u8>,
        pub memsz: u32,
        pub flags: u32,
    }

    pub struct TestImage {
        pub elf_type: u16,
        pub machine: u16,
        pub entry: u32,
        pub sections: Vec<TestSection>,
        pub segments: Vec<TestSegment>,
    }

    fn put_u16(buf: &mut [u8], at: usize, v: u16) {
        buf[at..at + 2].copy_from_slice(&v.to_le_bytes());
    }

    fn put_u32(buf: &mut [u8], at: usize, v: u32) {
        buf[at..at + 4].copy_from_slice(&v.to_le_bytes());
    }

    fn align4(buf: &mut Vec<u8>) {
        while buf.len() % 4 != 0 {
            buf.push(0);
        }
    }

    impl TestImage {
        pub fn executable(entry: u32) -> Self {
            Self {
                elf_type: 0x0002,
                machine: 8,
                entry,
                sections: Vec::new(),
                segments: Vec::new(),
            }
        }

        pub fn prx() -> Self {
            Self {
                elf_type: 0xFFA0,
                ..Self::executable(0)
            }
        }

        pub fn section(mut self, name: &str, ty: u32, flags: u32, addr: u32, data: &[u8]) -> Self {
            self.sections.push(TestSection {
                name: name.to_string(),
                ty,
                flags,
                addr,
                size: data.len() as u32,
                data: data.to_vec(),
            });
            self
        }

        pub fn bss(mut self, name: &str, addr: u32, size: u32) -> Self {
            self.sections.push(TestSection {
                name: name.to_string(),
                ty: SHT_NOBITS,
                flags: 0x3,
                addr,
                data: Vec::new(),
                size,
            });
            self
        }

        pub fn segment(mut self, ty: u32, vaddr: u32, data: &[u8], memsz: u32) -> Self {
            self.segments.push(TestSegment {
                ty,
                vaddr,
                paddr: vaddr,
                data: data.to_vec(),
                memsz,
                flags: 0x5,
            });
            self
        }

        /// 布局：文件头, 程序头表, 段数据, 节数据, 节名字符串表, 节头表
        pub fn build(&self) -> Vec<u8> {
            let phnum = self.segments.len();
            let mut out = vec![0u8; 52 + 32 * phnum];

            let mut seg_offsets = Vec::new();
            for seg in &self.segments {
                align4(&mut out);
                seg_offsets.push(out.len() as u32);
                out.extend_from_slice(&seg.data);
            }

            let mut sec_offsets = Vec::new();
            for sec in &self.sections {
                align4(&mut out);
                sec_offsets.push(out.len() as u32);
                out.extend_from_slice(&sec.data);
            }

            let mut strtab = vec![0u8];
            let mut name_offsets = Vec::new();
            for sec in &self.sections {
                name_offsets.push(strtab.len() as u32);
                strtab.extend_from_slice(sec.name.as_bytes());
                strtab.push(0);
            }
            let shstrtab_name = strtab.len() as u32;
            strtab.extend_from_slice(b".shstrtab\0");
            align4(&mut out);
            let strtab_offset = out.len() as u32;
            out.extend_from_slice(&strtab);

            align4(&mut out);
            let shoff = out.len();
            let shnum = self.sections.len() + 2;
            out.resize(shoff + 40 * shnum, 0);
            for (i, sec) in self.sections.iter().enumerate() {
                let at = shoff + 40 * (i + 1);
                put_u32(&mut out, at, name_offsets[i]);
                put_u32(&mut out, at + 4, sec.ty);
                put_u32(&mut out, at + 8, sec.flags);
                put_u32(&mut out, at + 12, sec.addr);
                put_u32(&mut out, at + 16, sec_offsets[i]);
                put_u32(&mut out, at + 20, sec.size);
                put_u32(&mut out, at + 32, 4);
            }
            let at = shoff + 40 * (shnum - 1);
            put_u32(&mut out, at, shstrtab_name);
            put_u32(&mut out, at + 4, 3);
            put_u32(&mut out, at + 16, strtab_offset);
            put_u32(&mut out, at + 20, strtab.len() as u32);
            put_u32(&mut out, at + 32, 1);

            for (i, seg) in self.segments.iter().enumerate() {
                let at = 52 + 32 * i;
                put_u32(&mut out, at, seg.ty);
                put_u32(&mut out, at + 4, seg_offsets[i]);
                put_u32(&mut out, at + 8, seg.vaddr);
                put_u32(&mut out, at + 12, seg.paddr);
                put_u32(&mut out, at + 16, seg.data.len() as u32);
                put_u32(&mut out, at + 20, seg.memsz);
                put_u32(&mut out, at + 24, seg.flags);
                put_u32(&mut out, at + 28, 16);
            }

            out[0..4].copy_from_slice(&super::ELF_MAGIC);
            out[4] = 1;
            out[5] = 1;
            out[6] = 1;
            put_u16(&mut out, 16, self.elf_type);
            put_u16(&mut out, 18, self.machine);
            put_u32(&mut out, 20, 1);
            put_u32(&mut out, 24, self.entry);
            put_u32(&mut out, 28, if phnum > 0 { 52 } else { 0 });
            put_u32(&mut out, 32, shoff as u32);
            put_u16(&mut out, 40, 52);
            put_u16(&mut out, 42, 32);
            put_u16(&mut out, 44, phnum as u16);
            put_u16(&mut out, 46, 40);
            put_u16(&mut out, 48, shnum as u16);
            put_u16(&mut out, 50, (shnum - 1) as u16);
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::utils::bytes::PspStruct;

    fn module_info_bytes(name: &str, gp: u32) -> Vec<u8> {
        ElfPspModuleInfo {
            attributes: 0,
            version: 0x0101,
            name: name.to_string(),
            gp,
            exports_start: 0x0890_1000,
            exports_end: 0x0890_1020,
            imports_start: 0x0890_1020,
            imports_end: 0x0890_1048,
        }
        .to_bytes()
    }

    fn sample_executable() -> Vec<u8> {
        TestImage::executable(0x0890_0008)
            .segment(PT_LOAD, 0x0890_0000, &[0x11; 64], 0x100)
            .section(".text", SHT_PROGBITS, 0x6, 0x0890_0000, &[0x11; 64])
            .section(
                ".rodata.sceModuleInfo",
                SHT_PROGBITS,
                0x2,
                0x0890_0040,
                &module_info_bytes("minifire", 0x0000_4821),
            )
            .bss(".bss", 0x0890_0080, 0x80)
            .build()
    }

    #[test]
    fn test_parse_valid_executable() {
        let bytes = sample_executable();
        let elf = Elf::parse(&bytes).unwrap();

        assert!(elf.header.has_valid_magic());
        assert!(elf.header.has_valid_machine());
        assert!(elf.header.has_valid_type());
        assert_eq!(elf.header.elf_type().unwrap(), ElfType::Executable);
        assert_eq!(elf.header.entry_point, 0x0890_0008);
        assert_eq!(elf.program_headers.len(), 1);
        assert_eq!(elf.program_headers[0].ty, ElfProgramHeaderType::Load);
        assert_eq!(elf.program_headers[0].memory_size, 0x100);
        assert!(elf.program_headers[0]
            .flags
            .contains(ElfProgramHeaderFlags::EXECUTABLE | ElfProgramHeaderFlags::READABLE));
        assert_eq!(elf.program_data(&elf.program_headers[0]).unwrap(), &[0x11; 64]);

        let names: Vec<_> = elf.section_headers.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["", ".text", ".rodata.sceModuleInfo", ".bss", ".shstrtab"]);
        assert_eq!(elf.section_header_string_table().unwrap().name, ".shstrtab");

        let text = elf.section_by_name(".text").unwrap();
        assert_eq!(text.data, &[0x11; 64]);
        assert!(text.flags.contains(ElfSectionHeaderFlags::EXECUTE));
    }

    #[test]
    fn test_section_names_match_string_table() {
        let bytes = sample_executable();
        let elf = Elf::parse(&bytes).unwrap();
        let strtab = elf.section_header_string_table().unwrap().data;
        for section in elf.section_headers.iter().skip(1) {
            let rest = &strtab[section.name_offset as usize..];
            let end = rest.iter().position(|&b| b == 0).unwrap();
            assert_eq!(section.name.as_bytes(), &rest[..end]);
        }
    }

    #[test]
    fn test_null_and_nobits_have_empty_views() {
        let bytes = sample_executable();
        let elf = Elf::parse(&bytes).unwrap();
        assert!(elf.section_headers[0].data.is_empty());
        let bss = elf.section_by_name(".bss").unwrap();
        assert_eq!(bss.ty, ElfSectionHeaderType::NoBits);
        assert_eq!(bss.size, 0x80);
        assert!(bss.data.is_empty());
    }

    #[test]
    fn test_nobits_with_bogus_offset_is_accepted() {
        let mut bytes = sample_executable();
        let elf = Elf::parse(&bytes).unwrap();
        let shoff = elf.header.section_header_offset as usize;
        // .bss 是第 3 个节，把它的偏移改成文件外
        bytes[shoff + 40 * 3 + 16..shoff + 40 * 3 + 20].copy_from_slice(&0xFFFF_0000u32.to_le_bytes());
        assert!(Elf::parse(&bytes).is_ok());
    }

    #[test]
    fn test_invalid_magic() {
        let mut bytes = sample_executable();
        bytes[1] = b'X';
        assert_eq!(
            Elf::parse(&bytes).unwrap_err(),
            ElfError::InvalidMagic([0x7F, b'X', b'L', b'F'])
        );
    }

    #[test]
    fn test_invalid_machine_and_type() {
        let mut image = TestImage::executable(0);
        image.machine = 3;
        assert_eq!(Elf::parse(&image.build()).unwrap_err(), ElfError::InvalidMachine(3));

        let mut image = TestImage::executable(0);
        image.elf_type = 1;
        assert_eq!(Elf::parse(&image.build()).unwrap_err(), ElfError::InvalidType(1));
    }

    #[test]
    fn test_magic_checked_before_machine() {
        let mut image = TestImage::executable(0);
        image.machine = 3;
        let mut bytes = image.build();
        bytes[0] = 0;
        assert!(matches!(Elf::parse(&bytes), Err(ElfError::InvalidMagic(_))));
    }

    #[test]
    fn test_truncated_header() {
        let bytes = sample_executable();
        assert!(matches!(
            Elf::parse(&bytes[..40]),
            Err(ElfError::Truncated { .. })
        ));
    }

    #[test]
    fn test_section_table_out_of_range() {
        let bytes = sample_executable();
        let elf = Elf::parse(&bytes).unwrap();
        let shoff = elf.header.section_header_offset as usize;
        assert!(matches!(
            Elf::parse(&bytes[..shoff + 40]),
            Err(ElfError::Truncated { what: "节头表", .. })
        ));
    }

    #[test]
    fn test_entry_size_too_small() {
        let mut bytes = sample_executable();
        bytes[46..48].copy_from_slice(&20u16.to_le_bytes());
        assert_eq!(
            Elf::parse(&bytes).unwrap_err(),
            ElfError::EntrySizeTooSmall {
                table: "节头表",
                entsize: 20,
                min: 40
            }
        );
    }

    #[test]
    fn test_invalid_string_table_index() {
        let mut bytes = sample_executable();
        bytes[50..52].copy_from_slice(&99u16.to_le_bytes());
        assert_eq!(
            Elf::parse(&bytes).unwrap_err(),
            ElfError::InvalidStringTableIndex { index: 99, count: 5 }
        );
    }

    #[test]
    fn test_unknown_section_type() {
        let bytes = TestImage::executable(0)
            .section(".weird", 0x6FFF_FFF0, 0, 0, &[1, 2, 3, 4])
            .build();
        assert_eq!(
            Elf::parse(&bytes).unwrap_err(),
            ElfError::UnknownVariant {
                kind: "ElfSectionHeaderType",
                value: 0x6FFF_FFF0
            }
        );
    }

    #[test]
    fn test_section_data_out_of_range() {
        let mut bytes = sample_executable();
        let elf = Elf::parse(&bytes).unwrap();
        let shoff = elf.header.section_header_offset as usize;
        bytes[shoff + 40 + 20..shoff + 40 + 24].copy_from_slice(&0x10_0000u32.to_le_bytes());
        assert!(matches!(
            Elf::parse(&bytes),
            Err(ElfError::Truncated { what: "节数据", .. })
        ));
    }

    #[test]
    fn test_module_info_from_section() {
        let bytes = sample_executable();
        let elf = Elf::parse(&bytes).unwrap();
        let info = elf.module_info().unwrap();
        assert_eq!(info.name, "minifire");
        assert_eq!(info.gp, 0x0000_4821);
        assert_eq!(info.export_count(), 2);
        assert_eq!(info.import_count(), 2);
        assert!(!info.is_kernel());
    }

    #[test]
    fn test_module_info_from_prx_program_header() {
        let info = module_info_bytes("prxmod", 0x8000);
        let mut image = TestImage::prx().segment(PT_LOAD, 0, &info, info.len() as u32);
        let draft = image.build();
        // 段数据紧跟在程序头表之后
        image.segments[0].paddr = Elf::parse(&draft).unwrap().program_headers[0].offset;
        let bytes = image.build();

        let elf = Elf::parse(&bytes).unwrap();
        assert!(elf.header.is_prx());
        let parsed = elf.module_info().unwrap();
        assert_eq!(parsed.name, "prxmod");
        assert_eq!(parsed.gp, 0x8000);
    }

    #[test]
    fn test_missing_module_info() {
        let bytes = TestImage::executable(0).build();
        assert_eq!(
            Elf::parse(&bytes).unwrap().module_info().unwrap_err(),
            ElfError::MissingModuleInfo
        );
    }

    fn reloc_bytes(entries: &[(u32, u32)]) -> Vec<u8> {
        entries
            .iter()
            .flat_map(|&(addr, info)| {
                let mut v = addr.to_le_bytes().to_vec();
                v.extend_from_slice(&info.to_le_bytes());
                v
            })
            .collect()
    }

    #[test]
    fn test_relocations_from_section() {
        let relocs = reloc_bytes(&[(0x10, 0x0002_0102), (0x20, 0x0001_0205)]);
        let bytes = TestImage::prx()
            .section(".text", SHT_PROGBITS, 0x6, 0, &[0; 0x40])
            .section(".rel.text", SHT_PRXREL, 0, 0, &relocs)
            .build();
        let elf = Elf::parse(&bytes).unwrap();
        let parsed = elf.relocations().unwrap();

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].pointer_address, 0x10);
        assert_eq!(parsed[0].reloc_type().unwrap(), ElfRelocType::Mips32);
        assert_eq!(parsed[0].pointer_section_header_base(), 1);
        assert_eq!(parsed[0].pointee_section_header_base(), 2);
        assert_eq!(parsed[1].reloc_type().unwrap(), ElfRelocType::MipsHi16);
        assert_eq!(parsed[1].pointer_section_header_base(), 2);
        assert_eq!(parsed[1].pointee_section_header_base(), 1);
    }

    #[test]
    fn test_relocations_from_program_header() {
        let relocs = reloc_bytes(&[(0x44, 0x0000_0004)]);
        let bytes = TestImage::prx().segment(PT_PRXREL, 0, &relocs, 0).build();
        let parsed = Elf::parse(&bytes).unwrap().relocations().unwrap();
        assert_eq!(parsed, vec![ElfReloc::new(0x44, 4)]);
        assert_eq!(parsed[0].reloc_type().unwrap(), ElfRelocType::Mips26);
    }

    #[test]
    fn test_compressed_relocations_unsupported() {
        let bytes = TestImage::prx()
            .section(".rel.fw5", 0x7000_00A1, 0, 0, &[0; 8])
            .build();
        assert!(matches!(
            Elf::parse(&bytes).unwrap().relocations(),
            Err(ElfError::UnsupportedRelocation(_))
        ));
    }

    #[test]
    fn test_unknown_reloc_type() {
        let reloc = ElfReloc::new(0, 0x0000_0030);
        assert_eq!(
            reloc.reloc_type().unwrap_err(),
            ElfError::UnknownVariant {
                kind: "ElfRelocType",
                value: 0x30
            }
        );
    }
}
