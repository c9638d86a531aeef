//! ELF 枚举与标志位

use bitflags::bitflags;

use super::ElfError;

/// 生成一个带有原始值映射的枚举，未知值返回 [`ElfError::UnknownVariant`]
macro_rules! elf_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident : $raw:ty {
            $($variant:ident = $value:expr),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant),+
        }

        impl $name {
            pub const fn raw(self) -> $raw {
                match self {
                    $(Self::$variant => $value),+
                }
            }
        }

        impl TryFrom<$raw> for $name {
            type Error = ElfError;

            fn try_from(value: $raw) -> Result<Self, ElfError> {
                $(
                    if value == $value {
                        return Ok(Self::$variant);
                    }
                )+
                Err(ElfError::UnknownVariant {
                    kind: stringify!($name),
                    value: value as u32,
                })
            }
        }
    };
}

elf_enum! {
    pub enum ElfType: u16 {
        Executable = 0x0002,
        Prx = 0xFFA0,
    }
}

elf_enum! {
    pub enum ElfMachine: u16 {
        Allegrex = 8,
    }
}

elf_enum! {
    pub enum ElfSectionHeaderType: u32 {
        Null = 0,
        ProgramBits = 1,
        SymTab = 2,
        StrTab = 3,
        Rela = 4,
        Hash = 5,
        Dynamic = 6,
        Note = 7,
        NoBits = 8,
        Relocation = 9,
        ShLib = 10,
        DynSym = 11,
        InitArray = 14,
        FiniArray = 15,
        PreinitArray = 16,
        MipsRegInfo = 0x7000_0006,
        MipsAbiFlags = 0x7000_002A,
        PrxRelocation = 0x7000_00A0,
        PrxRelocationFw5 = 0x7000_00A1,
    }
}

elf_enum! {
    pub enum ElfRelocType: u8 {
        None = 0,
        Mips16 = 1,
        Mips32 = 2,
        MipsRel32 = 3,
        Mips26 = 4,
        MipsHi16 = 5,
        MipsLo16 = 6,
        MipsGpRel16 = 7,
        MipsLiteral = 8,
        MipsGot16 = 9,
        MipsPc16 = 10,
        MipsCall16 = 11,
        MipsGpRel32 = 12,
        StopRelocation = 0xFF,
    }
}

/// 程序头类型；其余取值原样保留
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElfProgramHeaderType {
    NoLoad,
    Load,
    Reloc1,
    Reloc2,
    Other(u32),
}

impl From<u32> for ElfProgramHeaderType {
    fn from(value: u32) -> Self {
        match value {
            0 => Self::NoLoad,
            1 => Self::Load,
            0x7000_00A0 => Self::Reloc1,
            0x7000_00A1 => Self::Reloc2,
            other => Self::Other(other),
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ElfSectionHeaderFlags: u32 {
        const WRITE = 0x1;
        const ALLOCATE = 0x2;
        const EXECUTE = 0x4;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ElfProgramHeaderFlags: u32 {
        const EXECUTABLE = 0x1;
        // 部分 demo PRX 的段没有可写标志
        const WRITABLE = 0x2;
        const READABLE = 0x4;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_variants() {
        assert_eq!(ElfType::try_from(0xFFA0).unwrap(), ElfType::Prx);
        assert_eq!(ElfType::Executable.raw(), 2);
        assert_eq!(
            ElfSectionHeaderType::try_from(0x7000_00A0).unwrap(),
            ElfSectionHeaderType::PrxRelocation
        );
        assert_eq!(ElfRelocType::try_from(0xFF).unwrap(), ElfRelocType::StopRelocation);
    }

    #[test]
    fn test_unknown_variant() {
        assert_eq!(
            ElfSectionHeaderType::try_from(0x1234).unwrap_err(),
            ElfError::UnknownVariant {
                kind: "ElfSectionHeaderType",
                value: 0x1234
            }
        );
        assert!(ElfRelocType::try_from(13).is_err());
        assert!(ElfMachine::try_from(3).is_err());
    }

    #[test]
    fn test_program_header_type_is_open() {
        assert_eq!(ElfProgramHeaderType::from(1), ElfProgramHeaderType::Load);
        assert_eq!(ElfProgramHeaderType::from(0x7000_00A1), ElfProgramHeaderType::Reloc2);
        assert_eq!(ElfProgramHeaderType::from(4), ElfProgramHeaderType::Other(4));
    }

    #[test]
    fn test_flags_combine() {
        let flags = ElfSectionHeaderFlags::from_bits_retain(0x6);
        assert!(flags.contains(ElfSectionHeaderFlags::ALLOCATE | ElfSectionHeaderFlags::EXECUTE));
        assert!(!flags.contains(ElfSectionHeaderFlags::WRITE));
        // 未知位保留
        assert_eq!(ElfSectionHeaderFlags::from_bits_retain(0x10000003).bits(), 0x10000003);
    }
}
