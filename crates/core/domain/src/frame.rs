/// 固定长度帧：值恒为哨兵 1，表示"事件发生"。
pub const CONSTANT_LENGTH: u8 = 1;

/// 变长帧：值为 4 位十六进制编码的整数（温度）。
pub const VARIABLE_LENGTH: u8 = 4;

/// 固定长度帧的哨兵值。
pub const CONSTANT_VALUE: i32 = 1;

/// 串口协议帧（tag, length, value）。
///
/// 每次解码创建一次，之后不再修改。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub tag: u8,
    pub length: u8,
    pub value: i32,
}

/// 固件定义的事件标签。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Rain,
    Temperature,
    SoftReset,
    HardReset,
    Pause,
    Unpause,
}

impl Tag {
    pub const ALL: [Tag; 6] = [
        Tag::Rain,
        Tag::Temperature,
        Tag::SoftReset,
        Tag::HardReset,
        Tag::Pause,
        Tag::Unpause,
    ];

    /// 协议中的数值编码。
    pub fn code(self) -> u8 {
        match self {
            Tag::Rain => 0,
            Tag::Temperature => 1,
            Tag::SoftReset => 2,
            Tag::HardReset => 3,
            Tag::Pause => 4,
            Tag::Unpause => 5,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.code() == code)
    }
}

impl TryFrom<i64> for Tag {
    type Error = i64;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .ok()
            .and_then(Tag::from_code)
            .ok_or(value)
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Tag::Rain => "rain",
            Tag::Temperature => "temperature",
            Tag::SoftReset => "soft_reset",
            Tag::HardReset => "hard_reset",
            Tag::Pause => "pause",
            Tag::Unpause => "unpause",
        };
        f.write_str(name)
    }
}
