use thiserror::Error;

#[derive(Error, Debug)]
pub enum RespError {
    #[error("unknown RESP type prefix: 0x{0:02X}")]
    UnknownPrefix(u8),
    #[error("missing CRLF terminator in {0} line")]
    MissingCrlf(&'static str),
    #[error("invalid {0} length: {1}")]
    InvalidLength(&'static str, String),
    #[error("invalid integer: {0}")]
    InvalidInteger(String),
    #[error("bulk string is not valid UTF-8")]
    NonUtf8,
    #[error("empty command array")]
    EmptyCommand,
    #[error("command elements must be bulk strings")]
    NonBulkCommandElement,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum StoreError {
    #[error("Operation against a key holding the wrong kind of value")]
    WrongType,
    #[error("value is not an integer or out of range")]
    NotAnInteger,
    #[error("Invalid entry_id for stream")]
    InvalidStreamId,
    #[error("The ID specified in XADD must be greater than 0-0")]
    StreamIdZero,
    #[error("The ID specified in XADD is equal or smaller than the target stream top item")]
    StreamIdTooSmall,
    #[error("The timestamp in ID is from the future")]
    StreamIdFromFuture,
    #[error("stream clock went backwards")]
    ClockWentBackwards,
}

#[derive(Error, Debug)]
pub enum RdbError {
    #[error("failed to read RDB file: {0}")]
    Io(#[from] std::io::Error),
    #[error("wrong magic string, expected REDIS, found {0}")]
    BadMagic(String),
    #[error("unsupported RDB version: {0}")]
    BadVersion(String),
    #[error("unknown opcode 0x{0:02X} during RDB parsing")]
    UnknownOpcode(u8),
    #[error("unknown special string encoding: 0x{0:02X}")]
    UnknownEncoding(u8),
    #[error("LZF-compressed strings are not supported")]
    LzfUnsupported,
    #[error("RDB checksum mismatch: stored {stored:016x}, computed {computed:016x}")]
    ChecksumMismatch { stored: u64, computed: u64 },
    #[error("unexpected end of RDB payload")]
    UnexpectedEof,
}

#[derive(Error, Debug)]
pub enum ReplicationError {
    #[error("failed to reach master: {0}")]
    Io(#[from] std::io::Error),
    #[error("handshake failed at {step}: {detail}")]
    Handshake { step: &'static str, detail: String },
    #[error("master link protocol error: {0}")]
    Protocol(String),
}
