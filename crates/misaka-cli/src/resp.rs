//! Minimal multi-bulk RESP codec for the client side: encodes a typed
//! command line for the wire and decodes the server's reply for printing.
//! Deliberately synchronous (plain `std::io`) to match this crate's
//! `rustyline`-free, non-`tokio` CLI style.

use std::io::{BufRead, Read, Write};

/// Encodes `args` as a multi-bulk command frame.
pub fn encode_command(args: &[String]) -> Vec<u8> {
    let mut out = format!("*{}\r\n", args.len()).into_bytes();
    for arg in args {
        out.extend(format!("${}\r\n", arg.len()).into_bytes());
        out.extend_from_slice(arg.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// A decoded server reply, printed by the caller.
#[derive(Debug)]
pub enum Reply {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Option<Vec<u8>>),
    Array(Vec<Reply>),
}

/// Reads one reply frame from `reader`.
pub fn read_reply<R: BufRead>(reader: &mut R) -> std::io::Result<Reply> {
    let line = read_line(reader)?;
    let Some((tag, rest)) = line.split_at_checked(1) else {
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "empty reply line"));
    };
    match tag {
        "+" => Ok(Reply::Simple(rest.to_string())),
        "-" => Ok(Reply::Error(rest.to_string())),
        ":" => {
            let value = rest.parse().map_err(invalid_data)?;
            Ok(Reply::Integer(value))
        }
        "$" => {
            let len: i64 = rest.parse().map_err(invalid_data)?;
            if len < 0 {
                return Ok(Reply::Bulk(None));
            }
            let mut buf = vec![0u8; len as usize];
            reader.read_exact(&mut buf)?;
            let mut crlf = [0u8; 2];
            reader.read_exact(&mut crlf)?;
            Ok(Reply::Bulk(Some(buf)))
        }
        "*" => {
            let count: i64 = rest.parse().map_err(invalid_data)?;
            if count < 0 {
                return Ok(Reply::Array(Vec::new()));
            }
            let mut items = Vec::with_capacity(count as usize);
            for _ in 0..count {
                items.push(read_reply(reader)?);
            }
            Ok(Reply::Array(items))
        }
        other => Err(std::io::Error::new(std::io::ErrorKind::InvalidData, format!("unknown reply tag {other:?}"))),
    }
}

fn read_line<R: BufRead>(reader: &mut R) -> std::io::Result<String> {
    let mut raw = Vec::new();
    let read = reader.read_until(b'\n', &mut raw)?;
    if read == 0 {
        return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "connection closed"));
    }
    while raw.last() == Some(&b'\n') || raw.last() == Some(&b'\r') {
        raw.pop();
    }
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

fn invalid_data<E: std::fmt::Display>(err: E) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, err.to_string())
}

/// Sends `args` as one command and returns the decoded reply.
pub fn send_command<S: Read + Write>(stream: &mut S, args: &[String]) -> std::io::Result<Reply> {
    stream.write_all(&encode_command(args))?;
    stream.flush()?;
    let mut reader = std::io::BufReader::new(stream);
    read_reply(&mut reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn encodes_a_command() {
        let encoded = encode_command(&["SET".into(), "k".into(), "v".into()]);
        assert_eq!(encoded, b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n");
    }

    #[test]
    fn decodes_each_reply_shape() {
        let mut reader = Cursor::new(b"+OK\r\n".to_vec());
        assert!(matches!(read_reply(&mut reader).unwrap(), Reply::Simple(s) if s == "OK"));

        let mut reader = Cursor::new(b"-ERR bad\r\n".to_vec());
        assert!(matches!(read_reply(&mut reader).unwrap(), Reply::Error(s) if s == "ERR bad"));

        let mut reader = Cursor::new(b":42\r\n".to_vec());
        assert!(matches!(read_reply(&mut reader).unwrap(), Reply::Integer(42)));

        let mut reader = Cursor::new(b"$-1\r\n".to_vec());
        assert!(matches!(read_reply(&mut reader).unwrap(), Reply::Bulk(None)));

        let mut reader = Cursor::new(b"*2\r\n$1\r\na\r\n$1\r\nb\r\n".to_vec());
        let Reply::Array(items) = read_reply(&mut reader).unwrap() else { panic!("expected array") };
        assert_eq!(items.len(), 2);
    }
}
