use serde::{de::DeserializeOwned, Serialize};

/// Encode an arbitrary serializable value into a vec, preceded by a tag byte.
///
/// The tag lets a receiver reject data meant for another round before
/// attempting to decode it.
pub fn encode_with_tag<T: Serialize + ?Sized>(
    tag: u8,
    val: &T,
) -> Result<Vec<u8>, rmp_serde::encode::Error> {
    let mut out = vec![tag];
    rmp_serde::encode::write(&mut out, val)?;
    Ok(out)
}

/// Split the tag from some encoded data, and decode the rest.
pub fn decode_tagged<T: DeserializeOwned>(
    data: &[u8],
) -> Option<(u8, Result<T, rmp_serde::decode::Error>)> {
    let (&tag, rest) = data.split_first()?;
    Some((tag, rmp_serde::decode::from_slice(rest)))
}

/// Check that a byte field was actually filled in.
pub fn non_empty_bytes(bytes: &[u8]) -> bool {
    !bytes.is_empty()
}

/// Check that a multi-part field has exactly the expected number of parts, none empty.
pub fn non_empty_multi_bytes(parts: &[Vec<u8>], expected: usize) -> bool {
    parts.len() == expected && parts.iter().all(|p| non_empty_bytes(p))
}
