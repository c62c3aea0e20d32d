//! Configuration message body.
//!
//! Every string and list is preceded by a 4-byte little-endian length or
//! count; numeric fields are consecutive 4-byte little-endian integers:
//! ```text
//! u32 path_len | path
//! u32 logging_mode | u32 history_time | u32 follow_time | u32 split_time | u32 data_length
//! u32 file_count | file_count × { u32 id | 4 × (u32 len | utf8) }
//! u32 meta_len | meta
//! ```
//! `meta` is itself versioned:
//! `u32 version | u32 pair_count | pair_count × (u32 len | key, u32 len | value) | u32 len | issue`,
//! with pairs in key order so identical metadata always encodes identically.

use std::collections::BTreeMap;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Version tag written at the start of the metadata block.
pub const METADATA_VERSION: u32 = 1;

const PREFIX: usize = 4;

/// One logging file descriptor. `id` uniqueness is not enforced here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingFile {
    pub id: u32,
    pub enable: String,
    pub name_prefix: String,
    pub name_subfix: String,
    pub extension: String,
}

/// Free-form recording metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaData {
    pub entries: BTreeMap<String, String>,
    pub issue: String,
}

impl MetaData {
    fn encoded_len(&self) -> usize {
        let pairs: usize = self
            .entries
            .iter()
            .map(|(k, v)| PREFIX + k.len() + PREFIX + v.len())
            .sum();
        PREFIX + PREFIX + pairs + PREFIX + self.issue.len()
    }
}

/// Body of a start/stop recording command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigMessage {
    pub logging_directory_path: String,
    pub logging_mode: u32,
    pub history_time: u32,
    pub follow_time: u32,
    pub split_time: u32,
    pub data_length: u32,
    pub logging_files: Vec<LoggingFile>,
    pub meta_data: MetaData,
}

impl ConfigMessage {
    fn encoded_len(&self) -> usize {
        let files: usize = self
            .logging_files
            .iter()
            .map(|f| {
                PREFIX
                    + PREFIX
                    + f.enable.len()
                    + PREFIX
                    + f.name_prefix.len()
                    + PREFIX
                    + f.name_subfix.len()
                    + PREFIX
                    + f.extension.len()
            })
            .sum();
        PREFIX
            + self.logging_directory_path.len()
            + 5 * 4
            + PREFIX
            + files
            + PREFIX
            + self.meta_data.encoded_len()
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        encode_body(self, &mut buf)?;
        Ok(buf.freeze())
    }
}

/// Exact byte count [`encode_body`] produces for `msg`.
///
/// Fails when a field or the whole body does not fit a 32-bit length.
pub fn compute_body_length(msg: &ConfigMessage) -> Result<u32> {
    check_field("logging_directory_path", &msg.logging_directory_path)?;
    check_count("logging_file_list", msg.logging_files.len())?;
    for file in &msg.logging_files {
        check_field("enable", &file.enable)?;
        check_field("name_prefix", &file.name_prefix)?;
        check_field("name_subfix", &file.name_subfix)?;
        check_field("extension", &file.extension)?;
    }
    check_count("meta_data", msg.meta_data.entries.len())?;
    for (key, value) in &msg.meta_data.entries {
        check_field("meta_data.key", key)?;
        check_field("meta_data.value", value)?;
    }
    check_field("meta_data.issue", &msg.meta_data.issue)?;
    check_count("meta_data", msg.meta_data.encoded_len())?;

    let total = msg.encoded_len();
    u32::try_from(total).map_err(|_| FrameError::FieldTooLong {
        field: "body",
        len: total,
    })
}

/// Append the encoded body to `dst`.
///
/// Nothing is written if any field is too long to encode.
pub fn encode_body(msg: &ConfigMessage, dst: &mut BytesMut) -> Result<()> {
    let len = compute_body_length(msg)? as usize;
    dst.reserve(len);

    put_str(dst, &msg.logging_directory_path);
    dst.put_u32_le(msg.logging_mode);
    dst.put_u32_le(msg.history_time);
    dst.put_u32_le(msg.follow_time);
    dst.put_u32_le(msg.split_time);
    dst.put_u32_le(msg.data_length);

    dst.put_u32_le(msg.logging_files.len() as u32);
    for file in &msg.logging_files {
        dst.put_u32_le(file.id);
        put_str(dst, &file.enable);
        put_str(dst, &file.name_prefix);
        put_str(dst, &file.name_subfix);
        put_str(dst, &file.extension);
    }

    let meta = &msg.meta_data;
    dst.put_u32_le(meta.encoded_len() as u32);
    dst.put_u32_le(METADATA_VERSION);
    dst.put_u32_le(meta.entries.len() as u32);
    for (key, value) in &meta.entries {
        put_str(dst, key);
        put_str(dst, value);
    }
    put_str(dst, &meta.issue);

    Ok(())
}

/// Decode a body that spans exactly `src`.
pub fn decode_body(src: &[u8]) -> Result<ConfigMessage> {
    let mut cur = Cursor::new(src);

    let logging_directory_path = cur.string("logging_directory_path")?;
    let logging_mode = cur.u32()?;
    let history_time = cur.u32()?;
    let follow_time = cur.u32()?;
    let split_time = cur.u32()?;
    let data_length = cur.u32()?;

    let file_count = cur.u32()? as usize;
    // Every file takes at least five prefixes; don't trust the count for allocation.
    let mut logging_files = Vec::with_capacity(file_count.min(cur.remaining() / (5 * PREFIX)));
    for _ in 0..file_count {
        logging_files.push(LoggingFile {
            id: cur.u32()?,
            enable: cur.string("enable")?,
            name_prefix: cur.string("name_prefix")?,
            name_subfix: cur.string("name_subfix")?,
            extension: cur.string("extension")?,
        });
    }

    let meta_len = cur.u32()? as usize;
    let meta_data = decode_meta(cur.take(meta_len)?)?;

    cur.finish()?;

    Ok(ConfigMessage {
        logging_directory_path,
        logging_mode,
        history_time,
        follow_time,
        split_time,
        data_length,
        logging_files,
        meta_data,
    })
}

fn decode_meta(src: &[u8]) -> Result<MetaData> {
    let mut cur = Cursor::new(src);

    let version = cur.u32()?;
    if version != METADATA_VERSION {
        return Err(FrameError::UnsupportedMetadataVersion(version));
    }

    let pair_count = cur.u32()? as usize;
    let mut entries = BTreeMap::new();
    for _ in 0..pair_count {
        let key = cur.string("meta_data.key")?;
        let value = cur.string("meta_data.value")?;
        if entries.contains_key(&key) {
            return Err(FrameError::DuplicateMetadataKey(key));
        }
        entries.insert(key, value);
    }
    let issue = cur.string("meta_data.issue")?;

    cur.finish()?;

    Ok(MetaData { entries, issue })
}

fn put_str(dst: &mut BytesMut, value: &str) {
    dst.put_u32_le(value.len() as u32);
    dst.put_slice(value.as_bytes());
}

fn check_field(field: &'static str, value: &str) -> Result<()> {
    if u32::try_from(value.len()).is_err() {
        return Err(FrameError::FieldTooLong {
            field,
            len: value.len(),
        });
    }
    Ok(())
}

fn check_count(field: &'static str, count: usize) -> Result<()> {
    if u32::try_from(count).is_err() {
        return Err(FrameError::FieldTooLong { field, len: count });
    }
    Ok(())
}

/// Bounds-checked little-endian reader over a borrowed slice.
struct Cursor<'a> {
    buf: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.buf.len() {
            return Err(FrameError::Truncated {
                needed: len,
                available: self.buf.len(),
            });
        }
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    fn u32(&mut self) -> Result<u32> {
        let bytes = self.take(PREFIX)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn string(&mut self, field: &'static str) -> Result<String> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| FrameError::InvalidUtf8 { field })
    }

    fn finish(self) -> Result<()> {
        if !self.buf.is_empty() {
            return Err(FrameError::TrailingBytes {
                count: self.buf.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ConfigMessage {
        let mut entries = BTreeMap::new();
        entries.insert("vehicle".to_string(), "test-07".to_string());
        entries.insert("driver".to_string(), "kim".to_string());
        ConfigMessage {
            logging_directory_path: "/data/log/2024-05-01".to_string(),
            logging_mode: 2,
            history_time: 30,
            follow_time: 10,
            split_time: 60,
            data_length: 1,
            logging_files: vec![LoggingFile {
                id: 7,
                enable: "true".to_string(),
                name_prefix: "cam_front".to_string(),
                name_subfix: "raw".to_string(),
                extension: "bin".to_string(),
            }],
            meta_data: MetaData {
                entries,
                issue: "brake noise".to_string(),
            },
        }
    }

    #[test]
    fn roundtrip_populated_body() {
        let msg = sample();
        let bytes = msg.to_bytes().unwrap();
        assert_eq!(bytes.len(), compute_body_length(&msg).unwrap() as usize);
        assert_eq!(decode_body(&bytes).unwrap(), msg);
    }

    #[test]
    fn empty_body_layout() {
        let msg = ConfigMessage::default();
        let bytes = msg.to_bytes().unwrap();
        // path prefix + 5 numerics + file count + meta prefix + meta(version, pairs, issue prefix)
        assert_eq!(bytes.len(), 4 + 20 + 4 + 4 + 12);
        assert_eq!(compute_body_length(&msg).unwrap(), 44);
        assert_eq!(&bytes[28..32], &12u32.to_le_bytes());
        assert_eq!(&bytes[32..36], &METADATA_VERSION.to_le_bytes());
    }

    #[test]
    fn numeric_fields_follow_path_in_order() {
        let msg = ConfigMessage {
            logging_directory_path: "ab".to_string(),
            logging_mode: 1,
            history_time: 2,
            follow_time: 3,
            split_time: 4,
            data_length: 5,
            ..ConfigMessage::default()
        };
        let bytes = msg.to_bytes().unwrap();
        assert_eq!(&bytes[0..4], &2u32.to_le_bytes());
        assert_eq!(&bytes[4..6], b"ab");
        for (i, expected) in (1u32..=5).enumerate() {
            let start = 6 + i * 4;
            assert_eq!(&bytes[start..start + 4], &expected.to_le_bytes());
        }
    }

    #[test]
    fn oversized_path_prefix_is_truncated() {
        let mut bytes = sample().to_bytes().unwrap().to_vec();
        bytes[0..4].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            decode_body(&bytes),
            Err(FrameError::Truncated { .. })
        ));
    }

    #[test]
    fn invalid_utf8_is_reported_with_field() {
        let msg = ConfigMessage {
            logging_directory_path: "ok".to_string(),
            ..ConfigMessage::default()
        };
        let mut bytes = msg.to_bytes().unwrap().to_vec();
        bytes[4] = 0xFF;
        assert!(matches!(
            decode_body(&bytes),
            Err(FrameError::InvalidUtf8 {
                field: "logging_directory_path"
            })
        ));
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = sample().to_bytes().unwrap().to_vec();
        bytes.extend_from_slice(&[0, 0]);
        assert!(matches!(
            decode_body(&bytes),
            Err(FrameError::TrailingBytes { count: 2 })
        ));
    }

    #[test]
    fn unknown_metadata_version_rejected() {
        let msg = ConfigMessage::default();
        let mut bytes = msg.to_bytes().unwrap().to_vec();
        bytes[32..36].copy_from_slice(&9u32.to_le_bytes());
        assert!(matches!(
            decode_body(&bytes),
            Err(FrameError::UnsupportedMetadataVersion(9))
        ));
    }

    #[test]
    fn metadata_length_must_cover_block_exactly() {
        let msg = ConfigMessage::default();
        let mut bytes = msg.to_bytes().unwrap().to_vec();
        // Declare one extra metadata byte and supply it.
        bytes[28..32].copy_from_slice(&13u32.to_le_bytes());
        bytes.push(0);
        assert!(matches!(
            decode_body(&bytes),
            Err(FrameError::TrailingBytes { count: 1 })
        ));
    }

    #[test]
    fn repeated_metadata_key_rejected() {
        let mut bytes = ConfigMessage::default().to_bytes().unwrap().to_vec();
        let issue = bytes.split_off(40);
        let pair = [&1u32.to_le_bytes()[..], b"k", &1u32.to_le_bytes(), b"v"].concat();
        bytes[36..40].copy_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&pair);
        bytes.extend_from_slice(&pair);
        bytes.extend_from_slice(&issue);
        let meta_len = (bytes.len() - 32) as u32;
        bytes[28..32].copy_from_slice(&meta_len.to_le_bytes());

        match decode_body(&bytes) {
            Err(FrameError::DuplicateMetadataKey(key)) => assert_eq!(key, "k"),
            other => panic!("expected duplicate key error, got {other:?}"),
        }
    }

    #[test]
    fn huge_file_count_does_not_allocate() {
        let mut bytes = ConfigMessage::default().to_bytes().unwrap().to_vec();
        bytes[24..28].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            decode_body(&bytes),
            Err(FrameError::Truncated { .. })
        ));
    }

    #[test]
    fn metadata_encoding_is_order_independent() {
        let mut a = MetaData::default();
        a.entries.insert("z".into(), "1".into());
        a.entries.insert("a".into(), "2".into());
        let mut b = MetaData::default();
        b.entries.insert("a".into(), "2".into());
        b.entries.insert("z".into(), "1".into());

        let left = ConfigMessage {
            meta_data: a,
            ..ConfigMessage::default()
        };
        let right = ConfigMessage {
            meta_data: b,
            ..ConfigMessage::default()
        };
        assert_eq!(left.to_bytes().unwrap(), right.to_bytes().unwrap());
    }
}
