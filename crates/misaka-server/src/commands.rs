//! Translates a parsed multi-bulk command into an [`Engine`] call and maps
//! the result back onto a RESP [`Reply`], per the per-command conventions:
//! `KeyNotFound`/`FieldNotFound`/`ValueExpired`/
//! `MemberExpired` downgrade to nil bulk replies or integer `0` rather than
//! protocol errors; every other `Error` becomes a `-ERR ...` reply.

use crate::resp::Reply;
use misaka_core::entry::NO_EXPIRY;
use misaka_core::{Engine, Error};

/// Dispatches one already-parsed command line to `engine`, returning the
/// reply to send back. `quit` is special-cased by the caller, not here.
pub fn dispatch(engine: &Engine, args: &[Vec<u8>]) -> Reply {
    if args.is_empty() {
        return Reply::Error("ERR empty command".to_string());
    }
    let name = String::from_utf8_lossy(&args[0]).to_ascii_lowercase();
    let rest = &args[1..];

    match name.as_str() {
        "ping" => Reply::Simple("PONG".to_string()),

        "set" => with_expiry(rest, 2, |key, value, expiry| {
            engine.set(key, value, expiry).map(|()| Reply::ok())
        }),
        "setnx" => with_expiry(rest, 2, |key, value, expiry| {
            engine.setnx(key, value, expiry).map(|()| Reply::Integer(1)).or_ok_as_zero()
        }),
        "get" => arity(rest, 1, |a| match engine.get(&a[0]) {
            Ok(value) => Reply::bulk(value),
            Err(Error::KeyNotFound | Error::ValueExpired) => Reply::nil(),
            Err(err) => error_reply(&err),
        }),
        "getrange" => arity(rest, 3, |a| {
            let (Ok(start), Ok(end)) = (parse_i64(&a[1]), parse_i64(&a[2])) else {
                return Reply::Error("ERR value is not an integer or out of range".to_string());
            };
            match engine.get_range(&a[0], start, end) {
                Ok(value) => Reply::bulk(value),
                Err(Error::KeyNotFound | Error::ValueExpired) => Reply::nil(),
                Err(err) => error_reply(&err),
            }
        }),
        "getset" => with_expiry(rest, 2, |key, value, expiry| {
            engine.getset(key, value, expiry).map(|prev| match prev {
                Some(bytes) => Reply::bulk(bytes),
                None => Reply::nil(),
            })
        }),
        "append" => arity(rest, 2, |a| match engine.append(&a[0], &a[1]) {
            Ok(len) => Reply::Integer(len as i64),
            Err(err) => error_reply(&err),
        }),
        "del" => arity(rest, 1, |a| match engine.del(&a[0]) {
            Ok(()) => Reply::Integer(1),
            Err(Error::KeyNotFound) => Reply::Integer(0),
            Err(err) => error_reply(&err),
        }),

        "hset" => arity(rest, 3, |a| match engine.hset(&a[0], &a[1], &a[2]) {
            Ok(()) => Reply::ok(),
            Err(err) => error_reply(&err),
        }),
        "hsetnx" => arity(rest, 3, |a| match engine.hsetnx(&a[0], &a[1], &a[2]) {
            Ok(()) => Reply::Integer(1),
            Err(Error::FieldAlreadyExists) => Reply::Integer(0),
            Err(err) => error_reply(&err),
        }),
        "hget" => arity(rest, 2, |a| match engine.hget(&a[0], &a[1]) {
            Ok(value) => Reply::bulk(value),
            Err(Error::KeyNotFound | Error::FieldNotFound | Error::ValueExpired) => Reply::nil(),
            Err(err) => error_reply(&err),
        }),
        "hdel" => arity(rest, 2, |a| match engine.hdel(&a[0], &a[1]) {
            Ok(()) => Reply::Integer(1),
            Err(Error::KeyNotFound | Error::FieldNotFound) => Reply::Integer(0),
            Err(err) => error_reply(&err),
        }),
        "hlen" => arity(rest, 1, |a| match engine.hlen(&a[0]) {
            Ok(len) => Reply::Integer(len as i64),
            Err(Error::KeyNotFound) => Reply::Integer(0),
            Err(err) => error_reply(&err),
        }),
        "hexists" => arity(rest, 2, |a| Reply::Integer(engine.hexists(&a[0], &a[1]) as i64)),
        "hstrlen" => arity(rest, 2, |a| Reply::Integer(engine.hstrlen(&a[0], &a[1]) as i64)),

        "lpush" => with_expiry(rest, 2, |key, value, expiry| {
            engine.lpush(key, value, expiry).map(|()| Reply::ok())
        }),
        "lpop" => arity(rest, 1, |a| match engine.lpop(&a[0]) {
            Ok(value) => Reply::bulk(value),
            Err(Error::KeyNotFound) => Reply::nil(),
            Err(err) => error_reply(&err),
        }),
        "linsert" => {
            if rest.len() < 3 {
                return Reply::Error("ERR wrong number of arguments, expected at least 3".to_string());
            }
            let Ok(index) = parse_i64(&rest[1]) else {
                return Reply::Error("ERR value is not an integer or out of range".to_string());
            };
            let expiry = match parse_expiry(&rest[3..]) {
                Ok(expiry) => expiry,
                Err(reply) => return reply,
            };
            match engine.linsert(&rest[0], index, &rest[2], expiry) {
                Ok(()) => Reply::ok(),
                Err(err) => error_reply(&err),
            }
        }
        "lset" => arity(rest, 3, |a| {
            let Ok(index) = parse_i64(&a[1]) else {
                return Reply::Error("ERR value is not an integer or out of range".to_string());
            };
            match engine.lset(&a[0], index, &a[2]) {
                Ok(()) => Reply::ok(),
                Err(err) => error_reply(&err),
            }
        }),
        "lrem" => arity(rest, 3, |a| {
            let Ok(count) = parse_i64(&a[1]) else {
                return Reply::Error("ERR value is not an integer or out of range".to_string());
            };
            match engine.lrem(&a[0], count, &a[2]) {
                Ok(removed) => Reply::Integer(removed as i64),
                Err(Error::RemoveCountInsufficient) => Reply::Integer(0),
                Err(Error::KeyNotFound) => Reply::Integer(0),
                Err(err) => error_reply(&err),
            }
        }),
        "llen" => arity(rest, 1, |a| match engine.llen(&a[0]) {
            Ok(len) => Reply::Integer(len as i64),
            Err(Error::KeyNotFound) => Reply::Integer(0),
            Err(err) => error_reply(&err),
        }),
        "lindex" => arity(rest, 2, |a| {
            let Ok(index) = parse_i64(&a[1]) else {
                return Reply::Error("ERR value is not an integer or out of range".to_string());
            };
            match engine.lindex(&a[0], index) {
                Ok(value) => Reply::bulk(value),
                Err(Error::KeyNotFound | Error::IndexOutOfRange { .. }) => Reply::nil(),
                Err(err) => error_reply(&err),
            }
        }),
        "lrange" => arity(rest, 3, |a| {
            let (Ok(start), Ok(end)) = (parse_i64(&a[1]), parse_i64(&a[2])) else {
                return Reply::Error("ERR value is not an integer or out of range".to_string());
            };
            match engine.lrange(&a[0], start, end) {
                Ok(values) => Reply::Array(values.into_iter().map(Reply::bulk).collect()),
                Err(Error::KeyNotFound) => Reply::Array(Vec::new()),
                Err(err) => error_reply(&err),
            }
        }),

        "zadd" => {
            if rest.len() < 3 {
                return Reply::Error("ERR wrong number of arguments, expected at least 3".to_string());
            }
            let Ok(score) = parse_i64(&rest[1]) else {
                return Reply::Error("ERR value is not an integer or out of range".to_string());
            };
            let expiry = match parse_expiry(&rest[3..]) {
                Ok(expiry) => expiry,
                Err(reply) => return reply,
            };
            match engine.zadd(&rest[0], &rest[2], score, expiry) {
                Ok(()) => Reply::ok(),
                Err(err) => error_reply(&err),
            }
        }
        "zrem" => arity(rest, 2, |a| match engine.zrem(&a[0], &a[1]) {
            Ok(()) => Reply::Integer(1),
            Err(Error::KeyNotFound | Error::MemberNotFound) => Reply::Integer(0),
            Err(err) => error_reply(&err),
        }),
        "zscore" => arity(rest, 2, |a| match engine.zscore(&a[0], &a[1]) {
            Ok(score) => Reply::bulk(score.to_string()),
            Err(Error::KeyNotFound | Error::MemberNotFound | Error::MemberExpired) => Reply::nil(),
            Err(err) => error_reply(&err),
        }),
        "zcard" => arity(rest, 1, |a| match engine.zcard(&a[0]) {
            Ok(len) => Reply::Integer(len as i64),
            Err(Error::KeyNotFound) => Reply::Integer(0),
            Err(err) => error_reply(&err),
        }),
        "zcount" => arity(rest, 3, |a| {
            let (Ok(lo), Ok(hi)) = (parse_i64(&a[1]), parse_i64(&a[2])) else {
                return Reply::Error("ERR value is not an integer or out of range".to_string());
            };
            match engine.zcount(&a[0], lo, hi) {
                Ok(count) => Reply::Integer(count as i64),
                Err(Error::KeyNotFound) => Reply::Integer(0),
                Err(err) => error_reply(&err),
            }
        }),
        "zrange" => arity(rest, 3, |a| {
            let (Ok(lo), Ok(hi)) = (parse_i64(&a[1]), parse_i64(&a[2])) else {
                return Reply::Error("ERR value is not an integer or out of range".to_string());
            };
            match engine.zrange(&a[0], lo, hi) {
                Ok(members) => Reply::Array(members.into_iter().map(Reply::bulk).collect()),
                Err(Error::KeyNotFound) => Reply::Array(Vec::new()),
                Err(err) => error_reply(&err),
            }
        }),

        other => Reply::Error(format!("ERR unknown command '{other}'")),
    }
}

fn error_reply(err: &Error) -> Reply {
    Reply::Error(format!("ERR {err}"))
}

fn parse_i64(bytes: &[u8]) -> Result<i64, std::num::ParseIntError> {
    std::str::from_utf8(bytes).unwrap_or_default().parse()
}

/// Requires exactly `n` arguments (beyond the command name), replying with
/// a protocol error otherwise.
fn arity<'a>(args: &'a [Vec<u8>], n: usize, body: impl FnOnce(&'a [Vec<u8>]) -> Reply) -> Reply {
    if args.len() != n {
        return Reply::Error(format!("ERR wrong number of arguments, expected {n}"));
    }
    body(args)
}

/// Requires at least `min` arguments, passes `key`, `value`, and the
/// absolute-millisecond expiry parsed from a trailing `ex <seconds>` /
/// `px <milliseconds>` modifier (or `NO_EXPIRY` if none is present).
fn with_expiry<'a>(
    args: &'a [Vec<u8>],
    min: usize,
    body: impl FnOnce(&'a [u8], &'a [u8], i64) -> misaka_core::Result<Reply>,
) -> Reply {
    if args.len() < min {
        return Reply::Error(format!("ERR wrong number of arguments, expected at least {min}"));
    }
    let expiry = match parse_expiry(&args[min..]) {
        Ok(expiry) => expiry,
        Err(reply) => return reply,
    };
    match body(&args[0], &args[1], expiry) {
        Ok(reply) => reply,
        Err(err) => error_reply(&err),
    }
}

/// Parses a trailing `ex <seconds>` / `px <milliseconds>` modifier (if any)
/// into an absolute millisecond timestamp.
fn parse_expiry(modifier: &[Vec<u8>]) -> Result<i64, Reply> {
    if modifier.is_empty() {
        return Ok(NO_EXPIRY);
    }
    if modifier.len() != 2 {
        return Err(Reply::Error("ERR syntax error".to_string()));
    }
    let unit = String::from_utf8_lossy(&modifier[0]).to_ascii_lowercase();
    let Ok(amount) = parse_i64(&modifier[1]) else {
        return Err(Reply::Error("ERR value is not an integer or out of range".to_string()));
    };
    let now = misaka_core::slot::now_ms();
    match unit.as_str() {
        "ex" => Ok(now + amount.saturating_mul(1000)),
        "px" => Ok(now + amount),
        other => Err(Reply::Error(format!("ERR unsupported time unit: {other}"))),
    }
}

/// Small adapter so `setnx`-style commands can downgrade their "already
/// exists" failure to an integer `0` without repeating the match arm.
trait OrOkAsZero {
    fn or_ok_as_zero(self) -> misaka_core::Result<Reply>;
}

impl OrOkAsZero for misaka_core::Result<Reply> {
    fn or_ok_as_zero(self) -> misaka_core::Result<Reply> {
        match self {
            Err(Error::KeyAlreadyExists) => Ok(Reply::Integer(0)),
            other => other,
        }
    }
}
