use super::is_deleted_marker;
use crate::entity::{BoundingBox, Tuple, TupleBody, DELETED_MARKER};
use crate::error::{Error, Result};
use bytes::{Buf, BufMut, Bytes};

/// key_len (2) + box_len (4) + value_len (4) + version_timestamp (8)
pub(crate) const RECORD_HEADER_LEN: usize = 18;

struct RecordHeader {
    key_len: usize,
    box_len: usize,
    value_len: usize,
    version_timestamp: i64,
}

impl RecordHeader {
    fn total_len(&self) -> usize {
        RECORD_HEADER_LEN + self.key_len + self.box_len + self.value_len
    }
}

/// Appends the encoded record of `tuple` to `buf`.
pub(crate) fn encode_record(tuple: &Tuple, buf: &mut Vec<u8>) -> Result<()> {
    let key = tuple.key().as_bytes();
    let key_len = u16::try_from(key.len()).map_err(|_| {
        Error::invalid_argument(format!("Key too long: {} bytes", key.len()))
    })?;

    let (box_bytes, value): (Vec<u8>, &[u8]) = match tuple.body() {
        TupleBody::Value { bounding_box, data } => (bounding_box.to_bytes(), &data[..]),
        TupleBody::Tombstone => (DELETED_MARKER.to_vec(), DELETED_MARKER),
    };

    let box_len = u32::try_from(box_bytes.len())
        .map_err(|_| Error::invalid_argument("Bounding box too large"))?;
    let value_len = u32::try_from(value.len())
        .map_err(|_| Error::invalid_argument(format!("Value too large: {} bytes", value.len())))?;

    buf.reserve(RECORD_HEADER_LEN + key.len() + box_bytes.len() + value.len());
    buf.put_u16(key_len);
    buf.put_u32(box_len);
    buf.put_u32(value_len);
    buf.put_i64(tuple.version_timestamp());
    buf.put_slice(key);
    buf.put_slice(&box_bytes);
    buf.put_slice(value);
    Ok(())
}

fn read_header(data: &[u8], offset: usize) -> Result<RecordHeader> {
    let mut raw = data
        .get(offset..offset.saturating_add(RECORD_HEADER_LEN))
        .ok_or_else(|| Error::corruption(format!("Truncated record header at offset {}", offset)))?;

    let header = RecordHeader {
        key_len: raw.get_u16() as usize,
        box_len: raw.get_u32() as usize,
        value_len: raw.get_u32() as usize,
        version_timestamp: raw.get_i64(),
    };

    if offset.saturating_add(header.total_len()) > data.len() {
        return Err(Error::corruption(format!("Truncated record at offset {}", offset)));
    }

    Ok(header)
}

/// Decodes only the key of the record at `offset`.
pub(crate) fn decode_key(data: &[u8], offset: usize) -> Result<&str> {
    let header = read_header(data, offset)?;
    let start = offset + RECORD_HEADER_LEN;
    std::str::from_utf8(&data[start..start + header.key_len])
        .map_err(|_| Error::corruption(format!("Key at offset {} is not UTF-8", offset)))
}

/// Decodes the record at `offset`. Returns the tuple and the offset of the
/// following record.
pub(crate) fn decode_record(data: &[u8], offset: usize) -> Result<(Tuple, usize)> {
    let header = read_header(data, offset)?;
    let key = decode_key(data, offset)?.to_string();

    let box_start = offset + RECORD_HEADER_LEN + header.key_len;
    let value_start = box_start + header.box_len;
    let end = value_start + header.value_len;

    let box_bytes = &data[box_start..value_start];
    let value = &data[value_start..end];

    let tuple = if is_deleted_marker(box_bytes) && is_deleted_marker(value) {
        Tuple::tombstone(key, header.version_timestamp)
    } else {
        Tuple::new(
            key,
            BoundingBox::from_bytes(box_bytes)?,
            Bytes::copy_from_slice(value),
            header.version_timestamp,
        )
    };

    Ok((tuple, end))
}
