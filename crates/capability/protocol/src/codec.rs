//! 串口帧解码
//!
//! 帧格式（ASCII 十六进制）：
//!
//! ```text
//! [tag][length][v0 v1 v2 v3]\n
//! ```
//!
//! - `length == 1`：无取值，`value` 恒为 1
//! - `length == 4`：四位十六进制取值，首位非零时按固件编码折算为负数

use crate::error::DecodeError;
use domain::{Frame, CONSTANT_LENGTH, CONSTANT_VALUE, VARIABLE_LENGTH};

/// 固件对负数的编码偏移。
const SIGNED_FOLD: i32 = 65535;

/// 解码一帧。
///
/// 纯函数，不做 IO。`raw` 之后多余的字节（换行符等）会被忽略。
pub fn decode(raw: &[u8]) -> Result<Frame, DecodeError> {
    if raw.len() < 2 {
        return Err(DecodeError::TooShort(raw.len()));
    }
    let tag = hex_digit(raw[0], 0)?;
    let length = hex_digit(raw[1], 1)?;

    let value = match length {
        CONSTANT_LENGTH => CONSTANT_VALUE,
        VARIABLE_LENGTH => {
            let digits = raw
                .get(2..6)
                .ok_or(DecodeError::TooShort(raw.len()))?;
            decode_value(digits)?
        }
        other => return Err(DecodeError::UnsupportedLength(other)),
    };

    Ok(Frame { tag, length, value })
}

fn decode_value(digits: &[u8]) -> Result<i32, DecodeError> {
    let mut nibbles = [0u8; 4];
    for (idx, byte) in digits.iter().enumerate() {
        nibbles[idx] = hex_digit(*byte, idx + 2)?;
    }
    let value = nibbles
        .iter()
        .fold(0i32, |acc, nibble| (acc << 4) | i32::from(*nibble));
    if nibbles[0] > 0 {
        Ok(value - SIGNED_FOLD)
    } else {
        Ok(value)
    }
}

fn hex_digit(byte: u8, offset: usize) -> Result<u8, DecodeError> {
    match byte {
        b'0'..=b'9' => Ok(byte - b'0'),
        b'A'..=b'F' => Ok(byte - b'A' + 10),
        _ => Err(DecodeError::InvalidDigit { byte, offset }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_digit_rejects_lowercase() {
        assert_eq!(hex_digit(b'F', 0), Ok(15));
        assert_eq!(
            hex_digit(b'f', 3),
            Err(DecodeError::InvalidDigit { byte: b'f', offset: 3 })
        );
    }

    #[test]
    fn top_nibble_folds_into_negative_range() {
        assert_eq!(decode_value(b"FFE7"), Ok(-24));
        assert_eq!(decode_value(b"1000"), Ok(4096 - 65535));
        assert_eq!(decode_value(b"0FFF"), Ok(4095));
    }
}
