use core::{fmt, str::FromStr};

/// 页面置换算法的选择。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PolicyKind {
    /// 先进先出：换出创建最早的页。
    Fifo,
    /// 二次机会（时钟）算法。
    SecondChance,
}

impl FromStr for PolicyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fifo" | "FIFO" => Ok(Self::Fifo),
            "second-chance" | "second_chance" | "clock" => Ok(Self::SecondChance),
            _ => Err(ConfigError::UnknownPolicy),
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fifo => f.write_str("fifo"),
            Self::SecondChance => f.write_str("second-chance"),
        }
    }
}

/// 虚存配置。
///
/// 虚地址高 `page_address_bits` 位是页号，其余是页内偏移。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VmConfig {
    /// 虚地址位数。
    pub virtual_address_bits: u32,
    /// 页号位数，决定页表大小。
    pub page_address_bits: u32,
    /// 物理页帧总数。
    pub frames: usize,
    /// 置换算法。
    pub policy: PolicyKind,
    /// 时钟算法一次扫描希望腾出的页帧数。
    pub frames_wanted: usize,
}

/// 页表项数的上限（位数）。
const MAX_PAGE_ADDRESS_BITS: u32 = 20;

impl VmConfig {
    /// 检查配置是否自洽。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.virtual_address_bits == 0 || self.virtual_address_bits >= usize::BITS {
            return Err(ConfigError::VirtualAddressBits(self.virtual_address_bits));
        }
        if self.page_address_bits > self.virtual_address_bits {
            return Err(ConfigError::PageBitsExceedVirtual {
                page: self.page_address_bits,
                virtual_: self.virtual_address_bits,
            });
        }
        if self.page_address_bits > MAX_PAGE_ADDRESS_BITS {
            return Err(ConfigError::PageTableTooLarge(self.page_address_bits));
        }
        if self.frames == 0 {
            return Err(ConfigError::NoFrames);
        }
        if self.frames_wanted == 0 || self.frames_wanted > self.frames {
            return Err(ConfigError::FramesWanted {
                wanted: self.frames_wanted,
                frames: self.frames,
            });
        }
        Ok(())
    }

    /// 每张页表的项数。
    #[inline]
    pub const fn page_table_size(&self) -> usize {
        1 << self.page_address_bits
    }

    /// 页内偏移的位数。
    #[inline]
    pub const fn offset_bits(&self) -> u32 {
        self.virtual_address_bits - self.page_address_bits
    }
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            virtual_address_bits: 16,
            page_address_bits: 6,
            frames: 16,
            policy: PolicyKind::SecondChance,
            frames_wanted: 1,
        }
    }
}

/// 配置错误。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// 虚地址位数为 0 或超出机器字长。
    VirtualAddressBits(u32),
    /// 页号位数多于虚地址位数。
    PageBitsExceedVirtual {
        /// 页号位数
        page: u32,
        /// 虚地址位数
        virtual_: u32,
    },
    /// 页表过大。
    PageTableTooLarge(u32),
    /// 没有物理页帧。
    NoFrames,
    /// 一次扫描希望腾出的页帧数不在 `1..=frames`。
    FramesWanted {
        /// 配置的值
        wanted: usize,
        /// 页帧总数
        frames: usize,
    },
    /// 无法识别的置换算法名。
    UnknownPolicy,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VirtualAddressBits(bits) => {
                write!(f, "virtual address width {bits} is out of range")
            }
            Self::PageBitsExceedVirtual { page, virtual_ } => write!(
                f,
                "page address bits ({page}) exceed virtual address bits ({virtual_})"
            ),
            Self::PageTableTooLarge(bits) => write!(
                f,
                "page address bits {bits} exceed the limit of {MAX_PAGE_ADDRESS_BITS}"
            ),
            Self::NoFrames => f.write_str("frame table must not be empty"),
            Self::FramesWanted { wanted, frames } => {
                write!(f, "frames wanted per sweep must be in 1..={frames}, got {wanted}")
            }
            Self::UnknownPolicy => {
                f.write_str("unknown replacement policy, expected `fifo` or `second-chance`")
            }
        }
    }
}
