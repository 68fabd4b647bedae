//! Order-preserving row-key encoding primitives.
//!
//! Composite index keys are built by direct byte concatenation, so each field
//! encoding must keep two promises at once:
//!
//! - **Order**: comparing two encoded keys byte-wise gives the same result as
//!   comparing the original field values lexicographically, field by field.
//! - **Separability**: a decoder positioned at the start of a field can find
//!   its end without any out-of-band length information.
//!
//! Fixed-length fields are stored verbatim. Variable-length fields escape the
//! `0x00` data byte as `0x00 0xFF` and terminate with `0x00 0x00`; both
//! sequences compare below any continuation byte, which is what preserves
//! lexicographic order across field boundaries. String fields add a leading
//! presence marker so a null value stays distinct from the empty string and
//! sorts before every present value.
//!
//! Record-id fields reserve a fixed number of leading bytes ahead of the
//! escaped remainder (see [`put_var_bytes_with_prefix`]): the record-id type
//! byte and the first identifier byte stay unescaped in the key head, so
//! store-side range splits can be configured against the raw input.

use crate::error::{Error, Result};

/// Escape introducer and terminator byte.
const ZERO: u8 = 0x00;
/// Second byte of an escaped `0x00` data byte.
const ESCAPED_ZERO: u8 = 0xFF;

/// Marker byte for a null string field.
const STR_NULL: u8 = 0x00;
/// Marker byte preceding a present string's payload.
const STR_PRESENT: u8 = 0x01;

/// Append a fixed-length field verbatim.
///
/// Length discipline is the caller's: the index definition checks the value
/// length before this is reached.
pub fn put_fixed_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(bytes);
}

/// Consume exactly `len` bytes of a fixed-length field.
pub fn take_fixed_bytes<'a>(input: &mut &'a [u8], len: usize) -> Result<&'a [u8]> {
    if input.len() < len {
        return Err(Error::CorruptEncoding(format!(
            "fixed field needs {len} bytes, {} remain",
            input.len()
        )));
    }
    let (field, rest) = input.split_at(len);
    *input = rest;
    Ok(field)
}

/// Append a terminated variable-length byte field.
pub fn put_var_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    for &b in bytes {
        if b == ZERO {
            buf.push(ZERO);
            buf.push(ESCAPED_ZERO);
        } else {
            buf.push(b);
        }
    }
    buf.push(ZERO);
    buf.push(ZERO);
}

/// Consume a terminated variable-length byte field.
pub fn take_var_bytes(input: &mut &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut cursor = *input;
    loop {
        let (&first, rest) = cursor
            .split_first()
            .ok_or_else(|| Error::CorruptEncoding("unterminated variable field".to_string()))?;
        cursor = rest;
        if first != ZERO {
            out.push(first);
            continue;
        }
        let (&second, rest) = cursor
            .split_first()
            .ok_or_else(|| Error::CorruptEncoding("truncated escape sequence".to_string()))?;
        cursor = rest;
        match second {
            ESCAPED_ZERO => out.push(ZERO),
            ZERO => {
                *input = cursor;
                return Ok(out);
            }
            other => {
                return Err(Error::CorruptEncoding(format!(
                    "invalid escape byte 0x{other:02x}"
                )))
            }
        }
    }
}

/// Append a variable-length byte field whose first `prefix_len` bytes are
/// stored verbatim ahead of the terminated remainder.
pub fn put_var_bytes_with_prefix(buf: &mut Vec<u8>, bytes: &[u8], prefix_len: usize) -> Result<()> {
    if bytes.len() < prefix_len {
        return Err(Error::Encoding(format!(
            "variable field needs at least {prefix_len} bytes for its fixed prefix, got {}",
            bytes.len()
        )));
    }
    buf.extend_from_slice(&bytes[..prefix_len]);
    put_var_bytes(buf, &bytes[prefix_len..]);
    Ok(())
}

/// Consume a variable-length byte field with a verbatim `prefix_len`-byte head.
pub fn take_var_bytes_with_prefix(input: &mut &[u8], prefix_len: usize) -> Result<Vec<u8>> {
    let head = take_fixed_bytes(input, prefix_len)?.to_vec();
    let mut out = head;
    out.extend_from_slice(&take_var_bytes(input)?);
    Ok(out)
}

/// Append a terminated, nullable string field.
///
/// `None` encodes as a single marker byte and sorts before every present
/// string, including the empty one.
pub fn put_opt_str(buf: &mut Vec<u8>, value: Option<&str>) {
    match value {
        None => buf.push(STR_NULL),
        Some(s) => {
            buf.push(STR_PRESENT);
            put_var_bytes(buf, s.as_bytes());
        }
    }
}

/// Consume a terminated, nullable string field.
pub fn take_opt_str(input: &mut &[u8]) -> Result<Option<String>> {
    let (&marker, rest) = input
        .split_first()
        .ok_or_else(|| Error::CorruptEncoding("missing string marker".to_string()))?;
    *input = rest;
    match marker {
        STR_NULL => Ok(None),
        STR_PRESENT => {
            let bytes = take_var_bytes(input)?;
            let s = String::from_utf8(bytes)
                .map_err(|e| Error::CorruptEncoding(format!("string field is not utf-8: {e}")))?;
            Ok(Some(s))
        }
        other => Err(Error::CorruptEncoding(format!(
            "invalid string marker 0x{other:02x}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_var(bytes: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        put_var_bytes(&mut buf, bytes);
        buf
    }

    #[test]
    fn var_bytes_round_trip() {
        for case in [
            &b""[..],
            &b"a"[..],
            &b"abc"[..],
            &[0x00][..],
            &[0x00, 0x00][..],
            &[0x61, 0x00, 0x62][..],
            &[0xFF, 0x00, 0xFF][..],
        ] {
            let encoded = encode_var(case);
            let mut input = encoded.as_slice();
            assert_eq!(take_var_bytes(&mut input).unwrap(), case);
            assert!(input.is_empty());
        }
    }

    #[test]
    fn var_bytes_encoded_length() {
        // escaped zeros double, terminator adds two
        assert_eq!(encode_var(b"abc").len(), 5);
        assert_eq!(encode_var(&[0x00, 0x61]).len(), 5);
    }

    #[test]
    fn var_bytes_preserves_order() {
        let mut inputs: Vec<&[u8]> = vec![
            b"",
            &[0x00],
            &[0x00, 0x00],
            &[0x00, 0x01],
            &[0x01],
            b"a",
            &[0x61, 0x00],
            &[0x61, 0x00, 0x62],
            b"ab",
            b"b",
            &[0xFF],
        ];
        inputs.sort();
        let mut encoded: Vec<Vec<u8>> = inputs.iter().map(|i| encode_var(i)).collect();
        let sorted = encoded.clone();
        encoded.sort();
        assert_eq!(encoded, sorted);
    }

    #[test]
    fn var_bytes_order_holds_with_key_suffix() {
        // A terminated field followed by more key bytes must still compare by
        // the field value first, whatever the suffix contains.
        let mut short = encode_var(b"a");
        short.extend_from_slice(&[0xFF; 4]);
        let mut long = encode_var(&[0x61, 0x00]);
        long.extend_from_slice(&[0x00; 4]);
        assert!(short < long);
    }

    #[test]
    fn var_bytes_decode_stops_at_terminator() {
        let mut buf = encode_var(b"key");
        buf.extend_from_slice(b"rest");
        let mut input = buf.as_slice();
        assert_eq!(take_var_bytes(&mut input).unwrap(), b"key");
        assert_eq!(input, b"rest");
    }

    #[test]
    fn var_bytes_truncation_is_corrupt() {
        let encoded = encode_var(b"abc");
        for cut in 0..encoded.len() {
            let mut input = &encoded[..cut];
            assert!(matches!(
                take_var_bytes(&mut input),
                Err(Error::CorruptEncoding(_))
            ));
        }
    }

    #[test]
    fn var_bytes_bad_escape_is_corrupt() {
        let mut input: &[u8] = &[0x61, 0x00, 0x07];
        assert!(matches!(
            take_var_bytes(&mut input),
            Err(Error::CorruptEncoding(_))
        ));
    }

    #[test]
    fn prefixed_var_bytes_round_trip() {
        let id = [0x01, 0x64, 0x6F, 0x63, 0x00, 0x31];
        let mut buf = Vec::new();
        put_var_bytes_with_prefix(&mut buf, &id, 2).unwrap();
        // the first two bytes are stored raw even though byte 0 could need escaping
        assert_eq!(&buf[..2], &id[..2]);
        let mut input = buf.as_slice();
        assert_eq!(take_var_bytes_with_prefix(&mut input, 2).unwrap(), id);
        assert!(input.is_empty());
    }

    #[test]
    fn prefixed_var_bytes_rejects_short_input() {
        let mut buf = Vec::new();
        assert!(matches!(
            put_var_bytes_with_prefix(&mut buf, &[0x01], 2),
            Err(Error::Encoding(_))
        ));
    }

    #[test]
    fn fixed_bytes_round_trip() {
        let mut buf = Vec::new();
        put_fixed_bytes(&mut buf, &[1, 2, 3, 4]);
        let mut input = buf.as_slice();
        assert_eq!(take_fixed_bytes(&mut input, 4).unwrap(), &[1, 2, 3, 4][..]);
        assert!(input.is_empty());
    }

    #[test]
    fn fixed_bytes_short_input_is_corrupt() {
        let mut input: &[u8] = &[1, 2];
        assert!(matches!(
            take_fixed_bytes(&mut input, 4),
            Err(Error::CorruptEncoding(_))
        ));
    }

    #[test]
    fn opt_str_round_trip() {
        for case in [None, Some(""), Some("en"), Some("a\u{0}b"), Some("héllo")] {
            let mut buf = Vec::new();
            put_opt_str(&mut buf, case);
            let mut input = buf.as_slice();
            assert_eq!(take_opt_str(&mut input).unwrap().as_deref(), case);
            assert!(input.is_empty());
        }
    }

    #[test]
    fn null_string_is_distinct_from_empty() {
        let mut null_buf = Vec::new();
        put_opt_str(&mut null_buf, None);
        let mut empty_buf = Vec::new();
        put_opt_str(&mut empty_buf, Some(""));
        assert_ne!(null_buf, empty_buf);
        assert!(null_buf < empty_buf);
    }

    #[test]
    fn opt_str_preserves_order() {
        let inputs = [None, Some(""), Some("a"), Some("ab"), Some("b")];
        let encoded: Vec<Vec<u8>> = inputs
            .iter()
            .map(|i| {
                let mut buf = Vec::new();
                put_opt_str(&mut buf, i.as_deref());
                buf
            })
            .collect();
        for pair in encoded.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn opt_str_invalid_utf8_is_corrupt() {
        let mut buf = Vec::new();
        buf.push(0x01);
        put_var_bytes(&mut buf, &[0xC0, 0x80]);
        let mut input = buf.as_slice();
        assert!(matches!(
            take_opt_str(&mut input),
            Err(Error::CorruptEncoding(_))
        ));
    }

    #[test]
    fn opt_str_empty_input_is_corrupt() {
        let mut input: &[u8] = &[];
        assert!(matches!(
            take_opt_str(&mut input),
            Err(Error::CorruptEncoding(_))
        ));
    }
}
