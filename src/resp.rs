use crate::errors::RespError;
use crate::protocol_constants::*;

/// One RESP wire value. Commands arrive as `Array` of `Bulk`; replies use
/// every variant. `NullBulk`/`NullArray` serialize as `$-1`/`*-1`.
#[derive(Debug, Clone, PartialEq)]
pub enum Resp {
    Simple(String),
    Error(String),
    Int(i64),
    Bulk(String),
    NullBulk,
    Array(Vec<Resp>),
    NullArray,
}

impl Resp {
    pub fn simple(s: impl Into<String>) -> Resp {
        Resp::Simple(s.into())
    }

    pub fn bulk(s: impl Into<String>) -> Resp {
        Resp::Bulk(s.into())
    }

    /// Standard `-ERR <detail>` reply.
    pub fn err(detail: impl AsRef<str>) -> Resp {
        Resp::Error(format!("ERR {}", detail.as_ref()))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            Resp::Simple(s) => {
                out.push(SIMPLE_STRING_PREFIX);
                out.extend_from_slice(s.as_bytes());
                out.extend_from_slice(CRLF.as_bytes());
            }
            Resp::Error(s) => {
                out.push(ERROR_PREFIX);
                out.extend_from_slice(s.as_bytes());
                out.extend_from_slice(CRLF.as_bytes());
            }
            Resp::Int(n) => {
                out.push(INTEGER_PREFIX);
                out.extend_from_slice(n.to_string().as_bytes());
                out.extend_from_slice(CRLF.as_bytes());
            }
            Resp::Bulk(s) => {
                out.push(BULK_STRING_PREFIX);
                out.extend_from_slice(s.len().to_string().as_bytes());
                out.extend_from_slice(CRLF.as_bytes());
                out.extend_from_slice(s.as_bytes());
                out.extend_from_slice(CRLF.as_bytes());
            }
            Resp::NullBulk => out.extend_from_slice(b"$-1\r\n"),
            Resp::Array(items) => {
                out.push(ARRAY_PREFIX);
                out.extend_from_slice(items.len().to_string().as_bytes());
                out.extend_from_slice(CRLF.as_bytes());
                for item in items {
                    item.write_to(out);
                }
            }
            Resp::NullArray => out.extend_from_slice(b"*-1\r\n"),
        }
    }
}

/// `$<len>\r\n<payload>` without the trailing CRLF. Only used for the RDB
/// snapshot a master sends right after `+FULLRESYNC`.
pub fn encode_rdb_bulk(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 16);
    out.push(BULK_STRING_PREFIX);
    out.extend_from_slice(payload.len().to_string().as_bytes());
    out.extend_from_slice(CRLF.as_bytes());
    out.extend_from_slice(payload);
    out
}

/// Outbound command frame: array of bulk strings.
pub fn encode_command(args: &[&str]) -> Vec<u8> {
    let mut out = Vec::new();
    Resp::Array(args.iter().map(|a| Resp::bulk(*a)).collect()).write_to(&mut out);
    out
}

/// Pull one frame off the front of `buf`. `Ok(None)` means the buffer holds
/// only a partial frame; read more and retry. `Ok(Some((frame, n)))` consumed
/// exactly `n` bytes.
pub fn parse_frame(buf: &[u8]) -> Result<Option<(Resp, usize)>, RespError> {
    parse_value(buf, 0)
}

fn parse_value(buf: &[u8], pos: usize) -> Result<Option<(Resp, usize)>, RespError> {
    let Some(&prefix) = buf.get(pos) else {
        return Ok(None);
    };
    let pos = pos + 1;
    match prefix {
        SIMPLE_STRING_PREFIX => match read_line(buf, pos, "simple string")? {
            Some((line, next)) => Ok(Some((Resp::Simple(line.to_string()), next))),
            None => Ok(None),
        },
        ERROR_PREFIX => match read_line(buf, pos, "error")? {
            Some((line, next)) => Ok(Some((Resp::Error(line.to_string()), next))),
            None => Ok(None),
        },
        INTEGER_PREFIX => match read_line(buf, pos, "integer")? {
            Some((line, next)) => {
                let n: i64 = line
                    .parse()
                    .map_err(|_| RespError::InvalidInteger(line.to_string()))?;
                Ok(Some((Resp::Int(n), next)))
            }
            None => Ok(None),
        },
        BULK_STRING_PREFIX => {
            let Some((line, next)) = read_line(buf, pos, "bulk length")? else {
                return Ok(None);
            };
            let len: i64 = line
                .parse()
                .map_err(|_| RespError::InvalidLength("bulk string", line.to_string()))?;
            if len == -1 {
                return Ok(Some((Resp::NullBulk, next)));
            }
            if len < 0 {
                return Err(RespError::InvalidLength("bulk string", line.to_string()));
            }
            let len = len as usize;
            if buf.len() < next + len + 2 {
                return Ok(None);
            }
            if &buf[next + len..next + len + 2] != CRLF.as_bytes() {
                return Err(RespError::MissingCrlf("bulk string"));
            }
            let value = std::str::from_utf8(&buf[next..next + len])
                .map_err(|_| RespError::NonUtf8)?
                .to_string();
            Ok(Some((Resp::Bulk(value), next + len + 2)))
        }
        ARRAY_PREFIX => {
            let Some((line, next)) = read_line(buf, pos, "array length")? else {
                return Ok(None);
            };
            let len: i64 = line
                .parse()
                .map_err(|_| RespError::InvalidLength("array", line.to_string()))?;
            if len == -1 {
                return Ok(Some((Resp::NullArray, next)));
            }
            if len < 0 {
                return Err(RespError::InvalidLength("array", line.to_string()));
            }
            let mut items = Vec::with_capacity(len as usize);
            let mut cursor = next;
            for _ in 0..len {
                match parse_value(buf, cursor)? {
                    Some((item, new_cursor)) => {
                        items.push(item);
                        cursor = new_cursor;
                    }
                    None => return Ok(None),
                }
            }
            Ok(Some((Resp::Array(items), cursor)))
        }
        other => Err(RespError::UnknownPrefix(other)),
    }
}

/// `$<len>\r\n<len bytes>` with NO trailing CRLF (the snapshot framing).
pub fn parse_rdb_bulk(buf: &[u8]) -> Result<Option<(Vec<u8>, usize)>, RespError> {
    let Some(&prefix) = buf.first() else {
        return Ok(None);
    };
    if prefix != BULK_STRING_PREFIX {
        return Err(RespError::UnknownPrefix(prefix));
    }
    let Some((line, next)) = read_line(buf, 1, "rdb length")? else {
        return Ok(None);
    };
    let len: usize = line
        .parse()
        .map_err(|_| RespError::InvalidLength("rdb payload", line.to_string()))?;
    if buf.len() < next + len {
        return Ok(None);
    }
    Ok(Some((buf[next..next + len].to_vec(), next + len)))
}

/// Commands must be arrays of bulk strings; anything else is rejected here.
pub fn command_args(frame: &Resp) -> Result<Vec<String>, RespError> {
    let Resp::Array(items) = frame else {
        return Err(RespError::NonBulkCommandElement);
    };
    if items.is_empty() {
        return Err(RespError::EmptyCommand);
    }
    let mut args = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Resp::Bulk(s) => args.push(s.clone()),
            _ => return Err(RespError::NonBulkCommandElement),
        }
    }
    Ok(args)
}

fn read_line<'a>(
    buf: &'a [u8],
    pos: usize,
    what: &'static str,
) -> Result<Option<(&'a str, usize)>, RespError> {
    let mut i = pos;
    while i + 1 < buf.len() {
        if buf[i] == b'\r' {
            if buf[i + 1] != b'\n' {
                return Err(RespError::MissingCrlf(what));
            }
            let line = std::str::from_utf8(&buf[pos..i]).map_err(|_| RespError::NonUtf8)?;
            return Ok(Some((line, i + 2)));
        }
        i += 1;
    }
    Ok(None)
}
