//! Name-value pair decoding for PARAMS and GET_VALUES content.
//!
//! The content is a run of `(name_length, value_length, name, value)` tuples
//! with no separators. Each length is either one byte (high bit clear, 0-127)
//! or four bytes Big Endian with the high bit of the first byte set as a
//! marker and masked off.
//!
//! # Example
//!
//! ```
//! use fcgi_engine::protocol::{encode_param, Params};
//!
//! let mut block = Vec::new();
//! encode_param(&mut block, b"REQUEST_URI", b"/");
//! encode_param(&mut block, b"REQUEST_METHOD", b"GET");
//!
//! let mut params = Params::new(&block);
//! let first = params.next_param().unwrap().unwrap();
//! assert_eq!(first.name, b"REQUEST_URI");
//! assert_eq!(first.value, b"/");
//! assert_eq!(Params::new(&block).get(b"REQUEST_METHOD"), Some(&b"GET"[..]));
//! ```

use bytes::BufMut;

use crate::error::{FcgiError, Result};

/// Largest length the four-byte form can carry.
pub const MAX_PARAM_LENGTH: usize = 0x7FFF_FFFF;

/// Marker bit for the four-byte length form.
const LONG_LENGTH_FLAG: u8 = 0x80;

/// One decoded name-value pair, borrowing from the content region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Param<'a> {
    pub name: &'a [u8],
    pub value: &'a [u8],
}

impl<'a> Param<'a> {
    /// Name as UTF-8, if valid.
    pub fn name_str(&self) -> Option<&'a str> {
        std::str::from_utf8(self.name).ok()
    }

    /// Value as UTF-8, if valid.
    pub fn value_str(&self) -> Option<&'a str> {
        std::str::from_utf8(self.value).ok()
    }
}

/// Cursor over an encoded name-value block.
///
/// Decoding never reads past the end of the region: a length that claims more
/// bytes than remain yields [`FcgiError::Protocol`], after which the cursor
/// is exhausted.
#[derive(Debug, Clone)]
pub struct Params<'a> {
    data: &'a [u8],
    position: usize,
    failed: bool,
}

impl<'a> Params<'a> {
    /// Start decoding at the beginning of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            position: 0,
            failed: false,
        }
    }

    /// Decode the next pair.
    ///
    /// Returns `Ok(None)` once the position reaches the end of the region.
    pub fn next_param(&mut self) -> Result<Option<Param<'a>>> {
        if self.failed || self.position == self.data.len() {
            return Ok(None);
        }

        match self.decode_pair() {
            Ok(param) => Ok(Some(param)),
            Err(e) => {
                self.failed = true;
                Err(e)
            }
        }
    }

    fn decode_pair(&mut self) -> Result<Param<'a>> {
        let mut pos = self.position;
        let name_length = read_length(self.data, &mut pos)?;
        let value_length = read_length(self.data, &mut pos)?;

        let available = self.data.len() - pos;
        if name_length + value_length > available {
            return Err(FcgiError::Protocol(format!(
                "name-value pair needs {} bytes, {} remain",
                name_length + value_length,
                available
            )));
        }

        let name = &self.data[pos..pos + name_length];
        let value = &self.data[pos + name_length..pos + name_length + value_length];
        self.position = pos + name_length + value_length;
        Ok(Param { name, value })
    }

    /// Walk the whole block from the start, failing on the first bad pair.
    pub fn validate(&self) -> Result<()> {
        Params::new(self.data).try_for_each(|p| p.map(|_| ()))
    }

    /// Look up a value by exact name, scanning from the start of the block.
    ///
    /// Malformed blocks are treated as ending at the first bad pair; the
    /// server only hands out blocks that passed [`validate`](Self::validate).
    pub fn get(&self, name: &[u8]) -> Option<&'a [u8]> {
        Params::new(self.data)
            .map_while(|p| p.ok())
            .find(|p| p.name == name)
            .map(|p| p.value)
    }

    /// Bytes consumed so far.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }
}

impl<'a> Iterator for Params<'a> {
    type Item = Result<Param<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_param().transpose()
    }
}

/// Read one length field at `*pos`, advancing it.
fn read_length(data: &[u8], pos: &mut usize) -> Result<usize> {
    let rest = &data[*pos..];
    let first = *rest
        .first()
        .ok_or_else(|| FcgiError::Protocol("truncated name-value length".to_string()))?;

    if first & LONG_LENGTH_FLAG == 0 {
        *pos += 1;
        return Ok(first as usize);
    }

    if rest.len() < 4 {
        return Err(FcgiError::Protocol(format!(
            "four-byte length field truncated to {} bytes",
            rest.len()
        )));
    }
    *pos += 4;
    Ok(u32::from_be_bytes([first & !LONG_LENGTH_FLAG, rest[1], rest[2], rest[3]]) as usize)
}

/// Encode a length field, using the one-byte form when it fits.
///
/// # Panics
///
/// Panics if `len` exceeds [`MAX_PARAM_LENGTH`].
pub fn encode_length<B: BufMut>(out: &mut B, len: usize) {
    assert!(len <= MAX_PARAM_LENGTH, "name-value length {} too large", len);
    if len < LONG_LENGTH_FLAG as usize {
        out.put_u8(len as u8);
    } else {
        out.put_u32(len as u32 | 0x8000_0000);
    }
}

/// Append one encoded name-value pair.
pub fn encode_param<B: BufMut>(out: &mut B, name: &[u8], value: &[u8]) {
    encode_length(out, name.len());
    encode_length(out, value.len());
    out.put_slice(name);
    out.put_slice(value);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(data: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        Params::new(data)
            .map(|p| {
                let p = p.unwrap();
                (p.name.to_vec(), p.value.to_vec())
            })
            .collect()
    }

    #[test]
    fn test_short_lengths() {
        let data = [11, 1, b'R', b'E', b'Q', b'U', b'E', b'S', b'T', b'_', b'U', b'R', b'I', b'/'];
        let pairs = collect(&data);
        assert_eq!(pairs, vec![(b"REQUEST_URI".to_vec(), b"/".to_vec())]);
    }

    #[test]
    fn test_long_length_form() {
        let value = vec![b'v'; 300];
        let mut data = vec![4, 0x80, 0x00, 0x01, 0x2C];
        data.extend_from_slice(b"BODY");
        data.extend_from_slice(&value);

        let mut params = Params::new(&data);
        let p = params.next_param().unwrap().unwrap();
        assert_eq!(p.name, b"BODY");
        assert_eq!(p.value.len(), 300);
        assert!(params.next_param().unwrap().is_none());
    }

    #[test]
    fn test_empty_block() {
        let mut params = Params::new(&[]);
        assert!(params.next_param().unwrap().is_none());
        assert!(params.next().is_none());
    }

    #[test]
    fn test_empty_value() {
        let mut data = Vec::new();
        encode_param(&mut data, b"QUERY_STRING", b"");
        encode_param(&mut data, b"A", b"b");
        let pairs = collect(&data);
        assert_eq!(pairs[0], (b"QUERY_STRING".to_vec(), Vec::new()));
        assert_eq!(pairs[1], (b"A".to_vec(), b"b".to_vec()));
    }

    #[test]
    fn test_reencode_reproduces_block() {
        let long_name = vec![b'N'; 127];
        let long_value = vec![b'x'; 70_000];
        let pairs: Vec<(&[u8], &[u8])> = vec![
            (&b"SCRIPT_NAME"[..], &b"/index"[..]),
            (&long_name[..], &b"short"[..]),
            (&b"HTTP_COOKIE"[..], &long_value[..]),
            (&b"EMPTY"[..], &b""[..]),
        ];
        let mut block = Vec::new();
        for (n, v) in &pairs {
            encode_param(&mut block, n, v);
        }

        let mut decoded = Vec::new();
        let mut reencoded = Vec::new();
        for p in Params::new(&block) {
            let p = p.unwrap();
            encode_param(&mut reencoded, p.name, p.value);
            decoded.push((p.name, p.value));
        }

        assert_eq!(decoded, pairs);
        assert_eq!(reencoded, block);
    }

    #[test]
    fn test_length_boundary_uses_long_form_at_128() {
        let mut out = Vec::new();
        encode_length(&mut out, 127);
        assert_eq!(out, [127]);
        out.clear();
        encode_length(&mut out, 128);
        assert_eq!(out, [0x80, 0, 0, 128]);
    }

    #[test]
    fn test_value_length_exceeds_region() {
        let data = [3, 10, b'a', b'b', b'c', b'd'];
        let mut params = Params::new(&data);
        let err = params.next_param().unwrap_err();
        assert!(err.to_string().contains("remain"));
        // Cursor is exhausted after a failure.
        assert!(params.next_param().unwrap().is_none());
    }

    #[test]
    fn test_truncated_long_length() {
        let data = [0x80, 0x00];
        let mut params = Params::new(&data);
        assert!(params.next_param().is_err());
    }

    #[test]
    fn test_missing_value_length() {
        let data = [1];
        assert!(Params::new(&data).next().unwrap().is_err());
    }

    #[test]
    fn test_validate_walks_whole_block() {
        let mut data = Vec::new();
        encode_param(&mut data, b"A", b"b");
        assert!(Params::new(&data).validate().is_ok());

        data.extend_from_slice(&[11, 100]);
        data.extend_from_slice(b"REQUEST_URI/");
        assert!(Params::new(&data).validate().is_err());
        assert_eq!(Params::new(&data).get(b"A"), Some(&b"b"[..]));
    }

    #[test]
    fn test_get_by_name() {
        let mut data = Vec::new();
        encode_param(&mut data, b"REQUEST_URI", b"/users/1");
        encode_param(&mut data, b"REQUEST_METHOD", b"POST");
        let params = Params::new(&data);

        assert_eq!(params.get(b"REQUEST_METHOD"), Some(&b"POST"[..]));
        assert_eq!(params.get(b"REQUEST"), None);
    }

    #[test]
    fn test_param_str_accessors() {
        let p = Param {
            name: b"A",
            value: &[0xFF],
        };
        assert_eq!(p.name_str(), Some("A"));
        assert_eq!(p.value_str(), None);
    }
}
