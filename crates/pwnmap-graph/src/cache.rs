//! Object cache files.
//!
//! A cache is a zstd stream holding an 8-byte header (`PWNC` and a
//! little-endian version) followed by length-prefixed bincode records, one
//! per directory object.
//!
//! Dumps can be interrupted, so a stream cut off after the header is not an
//! error: iteration yields every complete record and then ends as if the
//! stream were finished. [`CacheReader::is_truncated`] tells the two apart
//! afterwards. A stream cut off inside the header is
//! [`GraphError::TruncatedCache`], while a complete zstd frame with no
//! content is a cache without records.

use crate::error::{GraphError, Result};
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use pwnmap_core::{names, Attributes, Object};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;
use tracing::warn;

pub const MAGIC: [u8; 4] = *b"PWNC";
pub const VERSION: u32 = 1;

/// Attributes kept when `import_all` is off.
pub const DEFAULT_ATTRIBUTES: &[&str] = &[
    names::OBJECT_CLASS,
    names::OBJECT_CATEGORY,
    names::OBJECT_SID,
    names::OBJECT_GUID,
    names::NT_SECURITY_DESCRIPTOR,
    names::DISTINGUISHED_NAME,
    names::NAME,
    names::DISPLAY_NAME,
    names::SAM_ACCOUNT_NAME,
    names::SAM_ACCOUNT_TYPE,
    names::MEMBER_OF,
    names::MEMBER,
    names::PRIMARY_GROUP_ID,
    names::USER_ACCOUNT_CONTROL,
    names::LAST_LOGON_TIMESTAMP,
    names::PWD_LAST_SET,
    names::WHEN_CREATED,
    names::OPERATING_SYSTEM,
    names::SERVICE_PRINCIPAL_NAME,
    names::TRUST_DIRECTION,
    names::TRUST_ATTRIBUTES,
    names::TRUST_PARTNER,
    names::SCHEMA_ID_GUID,
    names::RIGHTS_GUID,
    names::LAPS_EXPIRATION_TIME,
];

/// One object as dumped from the directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawObject {
    pub distinguished_name: String,
    pub attributes: BTreeMap<String, Vec<Vec<u8>>>,
}

impl RawObject {
    pub fn new(distinguished_name: impl Into<String>) -> Self {
        Self {
            distinguished_name: distinguished_name.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with<I, V>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Vec<u8>>,
    {
        self.attributes
            .insert(name.to_string(), values.into_iter().map(Into::into).collect());
        self
    }

    pub fn into_object(self, import_all: bool) -> Object {
        let mut attributes = Attributes::new();
        for (name, values) in self.attributes {
            if import_all || is_default_attribute(&name) {
                attributes.set(&name, values);
            }
        }
        Object::with_attributes(self.distinguished_name, attributes)
    }
}

fn is_default_attribute(name: &str) -> bool {
    DEFAULT_ATTRIBUTES
        .iter()
        .any(|known| known.eq_ignore_ascii_case(name))
}

/// Writes a cache stream.
pub struct CacheWriter<W: Write> {
    encoder: zstd::stream::write::Encoder<'static, W>,
    records: usize,
}

impl CacheWriter<File> {
    pub fn create(path: &Path) -> Result<Self> {
        Self::new(File::create(path)?)
    }
}

impl<W: Write> CacheWriter<W> {
    pub fn new(inner: W) -> Result<Self> {
        let mut encoder = zstd::stream::write::Encoder::new(inner, 0)?;
        encoder.write_all(&MAGIC)?;
        encoder.write_u32::<LittleEndian>(VERSION)?;
        Ok(Self { encoder, records: 0 })
    }

    pub fn write(&mut self, object: &RawObject) -> Result<()> {
        let bytes = bincode::serialize(object)?;
        let len = u32::try_from(bytes.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "record too large"))?;
        self.encoder.write_u32::<LittleEndian>(len)?;
        self.encoder.write_all(&bytes)?;
        self.records += 1;
        Ok(())
    }

    pub fn records(&self) -> usize {
        self.records
    }

    /// Flushes the zstd frame and returns the underlying writer.
    pub fn finish(self) -> Result<W> {
        Ok(self.encoder.finish()?)
    }
}

/// Reads a cache stream record by record.
pub struct CacheReader<R: Read> {
    decoder: zstd::stream::read::Decoder<'static, BufReader<R>>,
    done: bool,
    truncated: bool,
}

impl CacheReader<File> {
    pub fn open(path: &Path) -> Result<Self> {
        Self::new(File::open(path)?)
    }
}

/// Outcome of reading a fixed number of bytes from the stream.
enum Chunk {
    Complete(Vec<u8>),
    /// The stream ended cleanly before the first byte.
    End,
    /// The stream ended part way, or the zstd frame was incomplete.
    Short(usize),
}

fn read_chunk(reader: &mut impl Read, len: usize) -> io::Result<Chunk> {
    let mut bytes = Vec::new();
    let result = reader.take(len as u64).read_to_end(&mut bytes);
    match result {
        Ok(n) if n == len => Ok(Chunk::Complete(bytes)),
        Ok(0) => Ok(Chunk::End),
        Ok(n) => Ok(Chunk::Short(n)),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(Chunk::Short(bytes.len())),
        Err(e) => Err(e),
    }
}

impl<R: Read> CacheReader<R> {
    /// Validates the header.
    pub fn new(inner: R) -> Result<Self> {
        let mut decoder = zstd::stream::read::Decoder::new(inner)?;

        let header = match read_chunk(&mut decoder, 8)? {
            Chunk::Complete(header) => header,
            Chunk::End => {
                return Ok(Self {
                    decoder,
                    done: true,
                    truncated: false,
                })
            }
            Chunk::Short(n) => return Err(GraphError::TruncatedCache(n)),
        };
        if header[..4] != MAGIC {
            return Err(GraphError::BadMagic);
        }
        let version = LittleEndian::read_u32(&header[4..]);
        if version != VERSION {
            return Err(GraphError::UnsupportedVersion(version));
        }

        Ok(Self {
            decoder,
            done: false,
            truncated: false,
        })
    }

    /// Whether iteration stopped at a cut-off record instead of a clean end.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    fn next_record(&mut self) -> Result<Option<RawObject>> {
        let len = match read_chunk(&mut self.decoder, 4)? {
            Chunk::Complete(prefix) => LittleEndian::read_u32(&prefix) as usize,
            Chunk::End => return Ok(None),
            Chunk::Short(_) => {
                warn!("Cache ends inside a record length");
                self.truncated = true;
                return Ok(None);
            }
        };

        match read_chunk(&mut self.decoder, len)? {
            Chunk::Complete(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            Chunk::End | Chunk::Short(_) => {
                warn!("Cache ends in a truncated record ({} bytes announced)", len);
                self.truncated = true;
                Ok(None)
            }
        }
    }
}

impl<R: Read> Iterator for CacheReader<R> {
    type Item = Result<RawObject>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(object)) => Some(Ok(object)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample(i: usize) -> RawObject {
        RawObject::new(format!("CN=user{},DC=corp", i))
            .with(names::OBJECT_CLASS, ["top", "user"])
            .with(names::SAM_ACCOUNT_NAME, [format!("user{}", i)])
            .with("thumbnailPhoto", [vec![0xffu8, 0xd8]])
    }

    #[test]
    fn test_round_trip_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("objects.pwnc");

        let mut writer = CacheWriter::create(&path).unwrap();
        for i in 0..3 {
            writer.write(&sample(i)).unwrap();
        }
        assert_eq!(writer.records(), 3);
        writer.finish().unwrap();

        let read: Vec<RawObject> = CacheReader::open(&path)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(read, (0..3).map(sample).collect::<Vec<_>>());
    }

    fn plain_stream(records: &[RawObject]) -> Vec<u8> {
        let mut plain = Vec::new();
        plain.extend_from_slice(&MAGIC);
        plain.extend_from_slice(&VERSION.to_le_bytes());
        for record in records {
            let bytes = bincode::serialize(record).unwrap();
            plain.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            plain.extend_from_slice(&bytes);
        }
        plain
    }

    #[test]
    fn test_truncated_final_record() {
        let record = bincode::serialize(&sample(1)).unwrap();
        let mut plain = plain_stream(&[sample(0)]);
        plain.extend_from_slice(&(record.len() as u32).to_le_bytes());
        plain.extend_from_slice(&record[..record.len() / 2]);
        let compressed = zstd::encode_all(plain.as_slice(), 0).unwrap();

        let mut reader = CacheReader::new(compressed.as_slice()).unwrap();
        let read: Vec<RawObject> = (&mut reader).collect::<Result<_>>().unwrap();
        assert_eq!(read, vec![sample(0)]);
        assert!(reader.is_truncated());
    }

    #[test]
    fn test_huge_announced_length() {
        let mut plain = plain_stream(&[sample(0), sample(1)]);
        plain.extend_from_slice(&u32::MAX.to_le_bytes());
        plain.extend_from_slice(b"not nearly four gigabytes");
        let compressed = zstd::encode_all(plain.as_slice(), 0).unwrap();

        let mut reader = CacheReader::new(compressed.as_slice()).unwrap();
        let read: Vec<RawObject> = (&mut reader).collect::<Result<_>>().unwrap();
        assert_eq!(read, vec![sample(0), sample(1)]);
        assert!(reader.is_truncated());
    }

    #[test]
    fn test_cut_off_stream_yields_prefix() {
        let mut writer = CacheWriter::new(Vec::new()).unwrap();
        for i in 0..20_000 {
            writer.write(&sample(i)).unwrap();
        }
        let compressed = writer.finish().unwrap();
        let half = &compressed[..compressed.len() / 2];

        let mut reader = CacheReader::new(half).unwrap();
        let read: Vec<RawObject> = (&mut reader).collect::<Result<_>>().unwrap();
        assert!(!read.is_empty());
        assert!(read.len() < 20_000);
        assert_eq!(read, (0..read.len()).map(sample).collect::<Vec<_>>());
        assert!(reader.is_truncated());

        let mut complete = CacheReader::new(compressed.as_slice()).unwrap();
        assert_eq!((&mut complete).count(), 20_000);
        assert!(!complete.is_truncated());
    }

    #[test]
    fn test_bad_header() {
        let wrong_magic = zstd::encode_all(&b"NOPE\x01\x00\x00\x00"[..], 0).unwrap();
        assert!(matches!(
            CacheReader::new(wrong_magic.as_slice()),
            Err(GraphError::BadMagic)
        ));

        let future = zstd::encode_all(&b"PWNC\x09\x00\x00\x00"[..], 0).unwrap();
        assert!(matches!(
            CacheReader::new(future.as_slice()),
            Err(GraphError::UnsupportedVersion(9))
        ));

        let partial = zstd::encode_all(&b"PWN"[..], 0).unwrap();
        assert!(matches!(
            CacheReader::new(partial.as_slice()),
            Err(GraphError::TruncatedCache(3))
        ));

        // Cut inside the first zstd block: nothing decodes at all.
        let mut writer = CacheWriter::new(Vec::new()).unwrap();
        writer.write(&sample(0)).unwrap();
        let compressed = writer.finish().unwrap();
        assert!(matches!(
            CacheReader::new(&compressed[..4]),
            Err(GraphError::TruncatedCache(0))
        ));

        let empty = zstd::encode_all(&b""[..], 0).unwrap();
        let mut reader = CacheReader::new(empty.as_slice()).unwrap();
        assert!(reader.next().is_none());
        assert!(!reader.is_truncated());
    }

    #[test]
    fn test_import_filter() {
        let object = sample(1).into_object(false);
        assert!(object.attribute("thumbnailPhoto").is_empty());
        assert_eq!(object.one_attribute(names::SAM_ACCOUNT_NAME), "user1");

        let object = sample(1).into_object(true);
        assert_eq!(object.attribute("thumbnailPhoto").len(), 1);
    }
}
