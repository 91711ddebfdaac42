//! Wire codec for the multi-bulk RESP subset the server speaks: frame
//! parsing off a buffered socket, and reply encoding back onto it.

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt};

/// A frame that failed to parse as a well-formed multi-bulk command.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("expected array header, got {0:?}")]
    ExpectedArray(String),
    #[error("expected bulk string header, got {0:?}")]
    ExpectedBulk(String),
    #[error("negative or unreasonable length: {0}")]
    BadLength(i64),
    #[error("bulk string missing trailing CRLF")]
    MissingTerminator,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Caps a single bulk argument so a hostile peer cannot force an unbounded
/// allocation; well past any real command argument in this protocol.
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Reads one multi-bulk command (`*<argc>\r\n` then `argc` bulk strings)
/// from `reader`. Returns `Ok(None)` on a clean EOF before any bytes of the
/// next frame arrive (the ordinary way a client disconnects).
pub async fn read_command<R>(reader: &mut R) -> Result<Option<Vec<Vec<u8>>>, ProtocolError>
where
    R: AsyncBufReadExt + Unpin,
{
    let Some(line) = read_line(reader).await? else {
        return Ok(None);
    };
    if line.is_empty() {
        return Ok(Some(Vec::new()));
    }
    let Some(rest) = line.strip_prefix('*') else {
        return Err(ProtocolError::ExpectedArray(line));
    };
    let argc: i64 = rest.parse().map_err(|_| ProtocolError::ExpectedArray(line.clone()))?;
    if argc <= 0 {
        return Ok(Some(Vec::new()));
    }

    let mut args = Vec::with_capacity(argc as usize);
    for _ in 0..argc {
        let Some(header) = read_line(reader).await? else {
            return Err(ProtocolError::Io(std::io::ErrorKind::UnexpectedEof.into()));
        };
        let Some(rest) = header.strip_prefix('$') else {
            return Err(ProtocolError::ExpectedBulk(header));
        };
        let len: i64 = rest.parse().map_err(|_| ProtocolError::ExpectedBulk(header.clone()))?;
        if len < 0 || len > MAX_BULK_LEN {
            return Err(ProtocolError::BadLength(len));
        }
        let mut buf = vec![0u8; len as usize];
        reader.read_exact(&mut buf).await?;
        let mut crlf = [0u8; 2];
        reader.read_exact(&mut crlf).await?;
        if &crlf != b"\r\n" {
            return Err(ProtocolError::MissingTerminator);
        }
        args.push(buf);
    }
    Ok(Some(args))
}

/// Reads one `\r\n`-or-`\n`-terminated line, trimming the terminator.
/// Returns `Ok(None)` if the peer closed the connection with no bytes read.
async fn read_line<R>(reader: &mut R) -> Result<Option<String>, ProtocolError>
where
    R: AsyncBufReadExt + Unpin,
{
    let mut raw = Vec::new();
    let read = reader.read_until(b'\n', &mut raw).await?;
    if read == 0 {
        return Ok(None);
    }
    while raw.last() == Some(&b'\n') || raw.last() == Some(&b'\r') {
        raw.pop();
    }
    Ok(Some(String::from_utf8_lossy(&raw).into_owned()))
}

/// A RESP reply value, encoded in the conventional type-prefixed form.
#[derive(Debug, Clone)]
pub enum Reply {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Option<Vec<u8>>),
    Array(Vec<Reply>),
}

impl Reply {
    pub fn ok() -> Self {
        Reply::Simple("OK".to_string())
    }

    pub fn nil() -> Self {
        Reply::Bulk(None)
    }

    pub fn bulk(value: impl Into<Vec<u8>>) -> Self {
        Reply::Bulk(Some(value.into()))
    }

    /// Writes this reply's RESP encoding onto `writer`.
    pub async fn write_to<W>(&self, writer: &mut W) -> std::io::Result<()>
    where
        W: tokio::io::AsyncWrite + Unpin,
    {
        match self {
            Reply::Simple(text) => {
                writer.write_all(b"+").await?;
                writer.write_all(text.as_bytes()).await?;
                writer.write_all(b"\r\n").await?;
            }
            Reply::Error(text) => {
                writer.write_all(b"-").await?;
                writer.write_all(text.as_bytes()).await?;
                writer.write_all(b"\r\n").await?;
            }
            Reply::Integer(value) => {
                writer.write_all(format!(":{value}\r\n").as_bytes()).await?;
            }
            Reply::Bulk(None) => {
                writer.write_all(b"$-1\r\n").await?;
            }
            Reply::Bulk(Some(bytes)) => {
                writer.write_all(format!("${}\r\n", bytes.len()).as_bytes()).await?;
                writer.write_all(bytes).await?;
                writer.write_all(b"\r\n").await?;
            }
            Reply::Array(items) => {
                writer.write_all(format!("*{}\r\n", items.len()).as_bytes()).await?;
                for item in items {
                    Box::pin(item.write_to(writer)).await?;
                }
            }
        }
        writer.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn reads_a_simple_multi_bulk_command() {
        let raw = b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n".to_vec();
        let mut reader = BufReader::new(Cursor::new(raw));
        let args = read_command(&mut reader).await.unwrap().unwrap();
        assert_eq!(args, vec![b"SET".to_vec(), b"k".to_vec(), b"v".to_vec()]);
    }

    #[tokio::test]
    async fn clean_eof_yields_none() {
        let mut reader = BufReader::new(Cursor::new(Vec::new()));
        assert!(read_command(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_a_non_array_header() {
        let raw = b"PING\r\n".to_vec();
        let mut reader = BufReader::new(Cursor::new(raw));
        assert!(matches!(read_command(&mut reader).await, Err(ProtocolError::ExpectedArray(_))));
    }

    #[tokio::test]
    async fn encodes_an_array_of_bulk_strings() {
        let reply = Reply::Array(vec![Reply::bulk("a"), Reply::nil(), Reply::Integer(7)]);
        let mut out = Vec::new();
        reply.write_to(&mut out).await.unwrap();
        assert_eq!(out, b"*3\r\n$1\r\na\r\n$-1\r\n:7\r\n");
    }
}
