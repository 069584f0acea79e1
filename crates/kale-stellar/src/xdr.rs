// ============================================================================
// KALE-STELLAR - XDR Primitives
// ============================================================================
// Minimal XDR (RFC 4506) reader/writer: big-endian integers, fixed and
// variable-length opaque data padded to 4-byte boundaries.
// ============================================================================

use crate::error::KaleError;
use crate::Result;

pub(crate) fn write_u32(xdr: &mut Vec<u8>, value: u32) {
    xdr.extend_from_slice(&value.to_be_bytes());
}

pub(crate) fn write_i64(xdr: &mut Vec<u8>, value: i64) {
    xdr.extend_from_slice(&value.to_be_bytes());
}

pub(crate) fn write_u64(xdr: &mut Vec<u8>, value: u64) {
    xdr.extend_from_slice(&value.to_be_bytes());
}

/// Fixed-length opaque (no length prefix)
pub(crate) fn write_fixed(xdr: &mut Vec<u8>, bytes: &[u8]) {
    xdr.extend_from_slice(bytes);
    pad(xdr, bytes.len());
}

/// Variable-length opaque / string with u32 length prefix
pub(crate) fn write_var(xdr: &mut Vec<u8>, bytes: &[u8]) {
    write_u32(xdr, bytes.len() as u32);
    xdr.extend_from_slice(bytes);
    pad(xdr, bytes.len());
}

fn pad(xdr: &mut Vec<u8>, len: usize) {
    let padding = (4 - (len % 4)) % 4;
    xdr.extend(std::iter::repeat(0u8).take(padding));
}

/// Cursor over an XDR buffer
pub(crate) struct XdrReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> XdrReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                KaleError::Encoding(format!(
                    "Unexpected end of XDR at byte {} (wanted {})",
                    self.pos, len
                ))
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_be_bytes(buf))
    }

    pub(crate) fn read_i64(&mut self) -> Result<i64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(i64::from_be_bytes(buf))
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_be_bytes(buf))
    }

    pub(crate) fn read_fixed<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N)?);
        self.skip_padding(N)?;
        Ok(buf)
    }

    pub(crate) fn read_var(&mut self, max_len: usize) -> Result<Vec<u8>> {
        let len = self.read_u32()? as usize;
        if len > max_len {
            return Err(KaleError::Encoding(format!(
                "Opaque length {} exceeds maximum {}",
                len, max_len
            )));
        }
        let bytes = self.take(len)?.to_vec();
        self.skip_padding(len)?;
        Ok(bytes)
    }

    fn skip_padding(&mut self, len: usize) -> Result<()> {
        let padding = (4 - (len % 4)) % 4;
        if self.take(padding)?.iter().any(|b| *b != 0) {
            return Err(KaleError::Encoding("Non-zero XDR padding".to_string()));
        }
        Ok(())
    }

    /// Fail if bytes remain
    pub(crate) fn finish(self) -> Result<()> {
        if self.pos != self.data.len() {
            return Err(KaleError::Encoding(format!(
                "{} trailing bytes after XDR value",
                self.data.len() - self.pos
            )));
        }
        Ok(())
    }
}
