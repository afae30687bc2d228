// Minimal OSC 1.0 message decoder for headband datagrams
//
// Each datagram carries one message: a padded address pattern, a type tag
// string, and big-endian arguments. Only the numeric tags the headband
// emits are supported; everything else is an error and the datagram is
// dropped by the caller.

use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum OscError {
    #[error("datagram truncated")]
    Truncated,

    #[error("OSC bundles are not supported")]
    Bundle,

    #[error("address must start with '/'")]
    BadAddress,

    #[error("missing type tag string")]
    MissingTypeTags,

    #[error("unsupported type tag '{0}'")]
    UnsupportedTag(char),

    #[error("string is not valid UTF-8")]
    BadString,
}

/// A decoded OSC message: address pattern plus numeric arguments in order.
#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    pub address: String,
    pub args: Vec<f32>,
}

/// Decodes a single OSC message from a datagram payload.
pub fn decode(datagram: &[u8]) -> Result<OscMessage, OscError> {
    let (address, rest) = read_padded_str(datagram)?;
    if address.starts_with('#') {
        return Err(OscError::Bundle);
    }
    if !address.starts_with('/') {
        return Err(OscError::BadAddress);
    }

    let (tags, mut rest) = read_padded_str(rest).map_err(|e| match e {
        OscError::Truncated => OscError::MissingTypeTags,
        other => other,
    })?;
    let tags = tags.strip_prefix(',').ok_or(OscError::MissingTypeTags)?;

    let mut args = Vec::with_capacity(tags.len());
    for tag in tags.chars() {
        match tag {
            'f' => {
                args.push(BigEndian::read_f32(take(&mut rest, 4)?));
            }
            'i' => {
                args.push(BigEndian::read_i32(take(&mut rest, 4)?) as f32);
            }
            'd' => {
                args.push(BigEndian::read_f64(take(&mut rest, 8)?) as f32);
            }
            other => return Err(OscError::UnsupportedTag(other)),
        }
    }

    Ok(OscMessage {
        address: address.to_string(),
        args,
    })
}

/// Reads a NUL-terminated string padded to a 4-byte boundary, returning the
/// string and the remaining bytes.
fn read_padded_str(buf: &[u8]) -> Result<(&str, &[u8]), OscError> {
    let nul = buf
        .iter()
        .position(|&b| b == 0)
        .ok_or(OscError::Truncated)?;
    let s = std::str::from_utf8(&buf[..nul]).map_err(|_| OscError::BadString)?;
    let advance = (nul / 4 + 1) * 4;
    if advance > buf.len() {
        return Err(OscError::Truncated);
    }
    Ok((s, &buf[advance..]))
}

fn take<'a>(rest: &mut &'a [u8], len: usize) -> Result<&'a [u8], OscError> {
    if rest.len() < len {
        return Err(OscError::Truncated);
    }
    let (head, tail) = rest.split_at(len);
    *rest = tail;
    Ok(head)
}
