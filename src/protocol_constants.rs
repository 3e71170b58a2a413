pub const SIMPLE_STRING_PREFIX: u8 = b'+';
pub const ERROR_PREFIX: u8 = b'-';
pub const INTEGER_PREFIX: u8 = b':';
pub const BULK_STRING_PREFIX: u8 = b'$';
pub const ARRAY_PREFIX: u8 = b'*';
pub const CRLF: &str = "\r\n";

pub const MAGIC_NUMBER: &[u8] = b"REDIS";
pub const RDB_VERSION: &[u8] = b"0011";

pub const OPCODE_META: u8 = 0xFA;
pub const OPCODE_START_DB: u8 = 0xFE;
pub const OPCODE_SIZE: u8 = 0xFB;
pub const OPCODE_EXPIRETIME_S: u8 = 0xFD;
pub const OPCODE_EXPIRETIME_MS: u8 = 0xFC;
pub const OPCODE_STRING: u8 = 0x00;
pub const OPCODE_EOF: u8 = 0xFF;

// Snapshot of an empty database, sent verbatim in reply to PSYNC ? -1.
pub const EMPTY_RDB_HEX: &str = "524544495330303131fa0972656469732d76657205372e322e30fa0a72656469\
732d62697473c040fa056374696d65c26d08bc65fa08757365642d6d656dc2b0c41000fa08616f662d62617365c000ff\
f06e3bfec0ff5aa2";

pub fn hex_to_binary(hex: &str) -> Vec<u8> {
    debug_assert!(hex.len() % 2 == 0);
    hex.as_bytes()
        .chunks(2)
        .map(|pair| {
            let hi = (pair[0] as char).to_digit(16).unwrap_or(0) as u8;
            let lo = (pair[1] as char).to_digit(16).unwrap_or(0) as u8;
            (hi << 4) | lo
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_rdb_literal_is_88_bytes() {
        let bytes = hex_to_binary(EMPTY_RDB_HEX);
        assert_eq!(bytes.len(), 88);
        assert!(bytes.starts_with(b"REDIS0011"));
        assert_eq!(bytes[bytes.len() - 9], 0xFF);
    }
}
