
use crate::error::{format_error, VmResult};

/// Cursor over a byte slice. All offsets reported in errors are absolute,
/// including for readers produced by [`ByteReader::sub_reader`].
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        ByteReader {
            bytes,
            pos: 0,
            base: 0,
        }
    }

    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_finished(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    /// Bytes consumed since `start`, a value previously returned by [`position`].
    ///
    /// [`position`]: ByteReader::position
    pub fn consumed_since(&self, start: usize) -> &'a [u8] {
        &self.bytes[start..self.pos]
    }

    pub fn read_byte(&mut self) -> VmResult<u8> {
        let Some(&byte) = self.bytes.get(self.pos) else {
            return Err(format_error!(
                "unexpected end of input at offset {:#x}",
                self.offset()
            ));
        };
        self.pos += 1;
        Ok(byte)
    }

    pub fn read_bytes(&mut self, len: usize) -> VmResult<&'a [u8]> {
        if len > self.remaining() {
            return Err(format_error!(
                "expected {len} bytes at offset {:#x}, only {} left",
                self.offset(),
                self.remaining()
            ));
        }
        let bytes = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn skip(&mut self, len: usize) -> VmResult<()> {
        self.read_bytes(len).map(|_| ())
    }

    /// Splits off the next `len` bytes as an independent reader.
    pub fn sub_reader(&mut self, len: usize) -> VmResult<ByteReader<'a>> {
        let base = self.offset();
        let bytes = self.read_bytes(len)?;
        Ok(ByteReader { bytes, pos: 0, base })
    }

    pub fn read_u32(&mut self) -> VmResult<u32> {
        let start = self.offset();
        let mut result: u64 = 0;
        let mut shift = 0;
        loop {
            let byte = self.read_byte()?;
            result |= u64::from(byte & 0x7f) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                break;
            }
            if shift >= 35 {
                return Err(format_error!(
                    "u32 LEB128 at offset {start:#x} is longer than 5 bytes"
                ));
            }
        }
        u32::try_from(result)
            .map_err(|_| format_error!("u32 LEB128 at offset {start:#x} overflows"))
    }

    pub fn read_s32(&mut self) -> VmResult<i32> {
        let start = self.offset();
        let value = self.read_signed(32)?;
        i32::try_from(value)
            .map_err(|_| format_error!("s32 LEB128 at offset {start:#x} overflows"))
    }

    pub fn read_s33(&mut self) -> VmResult<i64> {
        self.read_signed(33)
    }

    pub fn read_s64(&mut self) -> VmResult<i64> {
        self.read_signed(64)
    }

    fn read_signed(&mut self, bits: u32) -> VmResult<i64> {
        let start = self.offset();
        let max_bytes = bits.div_ceil(7);
        let mut result: i64 = 0;
        let mut shift = 0;
        let mut count = 0;
        loop {
            let byte = self.read_byte()?;
            count += 1;
            if shift < 64 {
                result |= i64::from(byte & 0x7f) << shift;
            }
            shift += 7;
            if byte & 0x80 == 0 {
                if shift < 64 && byte & 0x40 != 0 {
                    result |= -1i64 << shift;
                }
                return Ok(result);
            }
            if count >= max_bytes {
                return Err(format_error!(
                    "s{bits} LEB128 at offset {start:#x} is longer than {max_bytes} bytes"
                ));
            }
        }
    }

    pub fn read_f32(&mut self) -> VmResult<f32> {
        let bytes = self.read_bytes(4)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(bytes);
        Ok(f32::from_le_bytes(raw))
    }

    pub fn read_f64(&mut self) -> VmResult<f64> {
        let bytes = self.read_bytes(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(f64::from_le_bytes(raw))
    }

    /// Length-prefixed name. Invalid UTF-8 is replaced rather than rejected.
    pub fn read_name(&mut self) -> VmResult<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.read_bytes(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}
