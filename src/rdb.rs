use crate::errors::RdbError;
use crate::protocol_constants::*;
use crate::registry::Registry;
use byteorder::{LittleEndian, ReadBytesExt};
use crc::{Crc, CRC_64_REDIS};
use std::io::{Cursor, Read};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

const RDB_CRC: Crc<u64> = Crc::<u64>::new(&CRC_64_REDIS);

/// One key/value pair recovered from the snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct RdbRecord {
    pub key: String,
    pub value: String,
    pub expires_at: Option<SystemTime>,
}

#[derive(Default)]
struct RdbLoad {
    records: Vec<RdbRecord>,
    done: bool,
}

type SectionFn = fn(&mut Cursor<&[u8]>, &mut RdbLoad) -> Result<(), RdbError>;

pub fn load_file(path: &Path) -> Result<Vec<RdbRecord>, RdbError> {
    let bytes = std::fs::read(path)?;
    parse(&bytes)
}

/// Parse a full RDB payload: `REDIS0011` header, then opcode-driven sections
/// until the EOF marker and its checksum.
pub fn parse(bytes: &[u8]) -> Result<Vec<RdbRecord>, RdbError> {
    let mut cursor = Cursor::new(bytes);
    read_header(&mut cursor)?;

    let sections = section_registry();
    let mut load = RdbLoad::default();
    while !load.done {
        let opcode = read_u8(&mut cursor)?;
        let handler = sections
            .get(&opcode)
            .ok_or(RdbError::UnknownOpcode(opcode))?;
        handler(&mut cursor, &mut load)?;
    }
    Ok(load.records)
}

fn section_registry() -> Registry<u8, SectionFn> {
    let mut registry: Registry<u8, SectionFn> = Registry::new();
    registry.register(OPCODE_META, section_aux);
    registry.register(OPCODE_START_DB, section_select_db);
    registry.register(OPCODE_SIZE, section_hash_sizes);
    registry.register(OPCODE_EXPIRETIME_S, section_expiry_seconds);
    registry.register(OPCODE_EXPIRETIME_MS, section_expiry_millis);
    registry.register(OPCODE_STRING, section_string_value);
    registry.register(OPCODE_EOF, section_eof);
    registry
}

fn read_header(cursor: &mut Cursor<&[u8]>) -> Result<(), RdbError> {
    let mut magic = [0u8; 5];
    read_exact(cursor, &mut magic)?;
    if &magic[..] != MAGIC_NUMBER {
        return Err(RdbError::BadMagic(
            String::from_utf8_lossy(&magic).to_string(),
        ));
    }
    let mut version = [0u8; 4];
    read_exact(cursor, &mut version)?;
    if &version[..] != RDB_VERSION {
        return Err(RdbError::BadVersion(
            String::from_utf8_lossy(&version).to_string(),
        ));
    }
    Ok(())
}

fn section_aux(cursor: &mut Cursor<&[u8]>, _load: &mut RdbLoad) -> Result<(), RdbError> {
    let key = read_string(cursor)?;
    let value = read_string(cursor)?;
    debug!(%key, %value, "rdb aux field");
    Ok(())
}

fn section_select_db(cursor: &mut Cursor<&[u8]>, _load: &mut RdbLoad) -> Result<(), RdbError> {
    let db_index = match read_length(cursor)? {
        Length::Plain(n) => n as u64,
        Length::Special(encoding) => return Err(RdbError::UnknownEncoding(encoding)),
    };
    debug!(db_index, "rdb select db");
    Ok(())
}

fn section_hash_sizes(cursor: &mut Cursor<&[u8]>, _load: &mut RdbLoad) -> Result<(), RdbError> {
    let total = read_plain_length(cursor)?;
    let with_expiry = read_plain_length(cursor)?;
    debug!(total = total as u64, with_expiry = with_expiry as u64, "rdb hash table sizes");
    Ok(())
}

fn section_expiry_seconds(cursor: &mut Cursor<&[u8]>, load: &mut RdbLoad) -> Result<(), RdbError> {
    let seconds = cursor.read_u32::<LittleEndian>().map_err(eof)?;
    let expires_at = UNIX_EPOCH + Duration::from_secs(seconds as u64);
    read_expiring_value(cursor, load, expires_at)
}

fn section_expiry_millis(cursor: &mut Cursor<&[u8]>, load: &mut RdbLoad) -> Result<(), RdbError> {
    let millis = cursor.read_u64::<LittleEndian>().map_err(eof)?;
    let expires_at = UNIX_EPOCH + Duration::from_millis(millis);
    read_expiring_value(cursor, load, expires_at)
}

fn read_expiring_value(
    cursor: &mut Cursor<&[u8]>,
    load: &mut RdbLoad,
    expires_at: SystemTime,
) -> Result<(), RdbError> {
    let value_type = read_u8(cursor)?;
    if value_type != OPCODE_STRING {
        return Err(RdbError::UnknownOpcode(value_type));
    }
    push_string_record(cursor, load, Some(expires_at))
}

fn section_string_value(cursor: &mut Cursor<&[u8]>, load: &mut RdbLoad) -> Result<(), RdbError> {
    push_string_record(cursor, load, None)
}

fn push_string_record(
    cursor: &mut Cursor<&[u8]>,
    load: &mut RdbLoad,
    expires_at: Option<SystemTime>,
) -> Result<(), RdbError> {
    let key = read_string(cursor)?;
    let value = read_string(cursor)?;
    debug!(%key, %value, ?expires_at, "rdb key loaded");
    load.records.push(RdbRecord {
        key,
        value,
        expires_at,
    });
    Ok(())
}

fn section_eof(cursor: &mut Cursor<&[u8]>, load: &mut RdbLoad) -> Result<(), RdbError> {
    // The checksum covers everything up to and including the EOF opcode.
    let hashed_len = cursor.position() as usize;
    let stored = cursor.read_u64::<LittleEndian>().map_err(eof)?;
    if stored != 0 {
        let computed = RDB_CRC.checksum(&cursor.get_ref()[..hashed_len]);
        if computed != stored {
            return Err(RdbError::ChecksumMismatch { stored, computed });
        }
    }
    debug!("rdb checksum ok: {:016x}", stored);
    load.done = true;
    Ok(())
}

enum Length {
    Plain(usize),
    Special(u8),
}

/// Size-encoded value: top two bits select 6-bit, 14-bit, 32-bit big-endian,
/// or a special string encoding.
fn read_length(cursor: &mut Cursor<&[u8]>) -> Result<Length, RdbError> {
    let first = read_u8(cursor)?;
    match first >> 6 {
        0b00 => Ok(Length::Plain((first & 0x3F) as usize)),
        0b01 => {
            let second = read_u8(cursor)?;
            Ok(Length::Plain((((first & 0x3F) as usize) << 8) | second as usize))
        }
        0b10 => {
            let len = cursor.read_u32::<byteorder::BigEndian>().map_err(eof)?;
            Ok(Length::Plain(len as usize))
        }
        _ => Ok(Length::Special(first)),
    }
}

fn read_plain_length(cursor: &mut Cursor<&[u8]>) -> Result<usize, RdbError> {
    match read_length(cursor)? {
        Length::Plain(n) => Ok(n),
        Length::Special(encoding) => Err(RdbError::UnknownEncoding(encoding)),
    }
}

fn read_string(cursor: &mut Cursor<&[u8]>) -> Result<String, RdbError> {
    match read_length(cursor)? {
        Length::Plain(len) => {
            let mut buf = vec![0u8; len];
            read_exact(cursor, &mut buf)?;
            Ok(String::from_utf8_lossy(&buf).to_string())
        }
        Length::Special(0xC0) => Ok((read_u8(cursor)? as i8).to_string()),
        Length::Special(0xC1) => Ok(cursor.read_i16::<LittleEndian>().map_err(eof)?.to_string()),
        Length::Special(0xC2) => Ok(cursor.read_i32::<LittleEndian>().map_err(eof)?.to_string()),
        Length::Special(0xC3) => Err(RdbError::LzfUnsupported),
        Length::Special(encoding) => Err(RdbError::UnknownEncoding(encoding)),
    }
}

fn read_u8(cursor: &mut Cursor<&[u8]>) -> Result<u8, RdbError> {
    cursor.read_u8().map_err(eof)
}

fn read_exact(cursor: &mut Cursor<&[u8]>, buf: &mut [u8]) -> Result<(), RdbError> {
    cursor.read_exact(buf).map_err(eof)
}

fn eof(_: std::io::Error) -> RdbError {
    RdbError::UnexpectedEof
}
