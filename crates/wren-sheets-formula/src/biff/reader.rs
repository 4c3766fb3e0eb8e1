//! Low-level binary reading helpers for formula token streams.
//!
//! All multi-byte integers are little-endian. Every read is bounds-checked
//! and reports a typed [`DecodeError`] instead of panicking, so a truncated
//! or corrupt stream fails fast with the offending offset.

use super::DecodeError;

/// Read a `u8` at `offset`, advancing `offset`.
#[inline]
pub fn read_u8(data: &[u8], offset: &mut usize) -> Result<u8, DecodeError> {
    let v = *data.get(*offset).ok_or(DecodeError::UnexpectedEof {
        offset: *offset,
        need: 1,
    })?;
    *offset += 1;
    Ok(v)
}

/// Read a `u16` (little-endian) at `offset`, advancing `offset`.
#[inline]
pub fn read_u16(data: &[u8], offset: &mut usize) -> Result<u16, DecodeError> {
    if *offset + 2 > data.len() {
        return Err(DecodeError::UnexpectedEof {
            offset: *offset,
            need: 2,
        });
    }
    let v = u16::from_le_bytes([data[*offset], data[*offset + 1]]);
    *offset += 2;
    Ok(v)
}

/// Read an `i16` (little-endian).
#[inline]
pub fn read_i16(data: &[u8], offset: &mut usize) -> Result<i16, DecodeError> {
    read_u16(data, offset).map(|v| v as i16)
}

/// Read an `f64` (IEEE 754 double, little-endian).
#[inline]
pub fn read_f64(data: &[u8], offset: &mut usize) -> Result<f64, DecodeError> {
    if *offset + 8 > data.len() {
        return Err(DecodeError::UnexpectedEof {
            offset: *offset,
            need: 8,
        });
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[*offset..*offset + 8]);
    *offset += 8;
    Ok(f64::from_le_bytes(bytes))
}

/// Skip `count` bytes, checking bounds.
#[inline]
pub fn skip(data: &[u8], offset: &mut usize, count: usize) -> Result<(), DecodeError> {
    if *offset + count > data.len() {
        return Err(DecodeError::UnexpectedEof {
            offset: *offset,
            need: count,
        });
    }
    *offset += count;
    Ok(())
}

/// Read character data given a char count and the BIFF flags byte.
///
/// Flag bit 0 selects the encoding: 0 = compressed Latin-1 (one byte per
/// character), 1 = UTF-16LE (two bytes per character).
pub fn read_chars(
    data: &[u8],
    offset: &mut usize,
    char_count: usize,
    flags: u8,
) -> Result<String, DecodeError> {
    let wide = (flags & 0x01) != 0;
    if wide {
        let byte_len = char_count * 2;
        if *offset + byte_len > data.len() {
            return Err(DecodeError::UnexpectedEof {
                offset: *offset,
                need: byte_len,
            });
        }
        let mut units = Vec::with_capacity(char_count);
        for i in 0..char_count {
            units.push(u16::from_le_bytes([
                data[*offset + i * 2],
                data[*offset + i * 2 + 1],
            ]));
        }
        let start = *offset;
        *offset += byte_len;
        String::from_utf16(&units).map_err(|_| DecodeError::BadString { offset: start })
    } else {
        if *offset + char_count > data.len() {
            return Err(DecodeError::UnexpectedEof {
                offset: *offset,
                need: char_count,
            });
        }
        let s: String = data[*offset..*offset + char_count]
            .iter()
            .map(|&b| b as char)
            .collect();
        *offset += char_count;
        Ok(s)
    }
}

/// Read a string with a 1-byte char count and a flags byte (PtgStr form).
pub fn read_short_string(data: &[u8], offset: &mut usize) -> Result<String, DecodeError> {
    let cch = read_u8(data, offset)? as usize;
    let flags = read_u8(data, offset)?;
    read_chars(data, offset, cch, flags)
}

/// Read a string with a 2-byte char count and a flags byte (array-constant
/// element form).
pub fn read_long_string(data: &[u8], offset: &mut usize) -> Result<String, DecodeError> {
    let cch = read_u16(data, offset)? as usize;
    let flags = read_u8(data, offset)?;
    read_chars(data, offset, cch, flags)
}

/// Append a string with the given length-prefix width, choosing compressed
/// or UTF-16 encoding per its contents.
pub fn write_string(out: &mut Vec<u8>, s: &str, wide_len: bool) {
    let units: Vec<u16> = s.encode_utf16().collect();
    let compressible = units.iter().all(|&u| u <= 0xFF);
    let cch = units.len();
    if wide_len {
        out.extend_from_slice(&(cch as u16).to_le_bytes());
    } else {
        out.push(cch as u8);
    }
    if compressible {
        out.push(0x00);
        out.extend(units.iter().map(|&u| u as u8));
    } else {
        out.push(0x01);
        for u in units {
            out.extend_from_slice(&u.to_le_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_u16() {
        let data = [0x34, 0x12];
        let mut off = 0;
        assert_eq!(read_u16(&data, &mut off).unwrap(), 0x1234);
        assert_eq!(off, 2);
    }

    #[test]
    fn test_read_past_end_is_typed_error() {
        let data = [0x01];
        let mut off = 0;
        assert_eq!(
            read_u16(&data, &mut off),
            Err(DecodeError::UnexpectedEof { offset: 0, need: 2 })
        );
        assert_eq!(off, 0, "offset unchanged on failure");
    }

    #[test]
    fn test_compressed_string_roundtrip() {
        let mut buf = Vec::new();
        write_string(&mut buf, "abc", false);
        let mut off = 0;
        assert_eq!(read_short_string(&buf, &mut off).unwrap(), "abc");
        assert_eq!(off, buf.len());
    }

    #[test]
    fn test_wide_string_roundtrip() {
        let mut buf = Vec::new();
        write_string(&mut buf, "héllo ✓", true);
        let mut off = 0;
        assert_eq!(read_long_string(&buf, &mut off).unwrap(), "héllo ✓");
    }

    #[test]
    fn test_read_f64() {
        let bytes = 3.25_f64.to_le_bytes();
        let mut off = 0;
        assert_eq!(read_f64(&bytes, &mut off).unwrap(), 3.25);
    }
}
