//! Bus traces: scripted host activity replayed against the peripherals.
//!
//! One operation per line. Numbers are hex, with or without a `0x` prefix,
//! except `wait` which takes decimal microseconds.
//!
//! ```text
//! # select a 256-byte sector and write it
//! out CE 00
//! out CF 30
//! in  CF =48
//! vid 3C00 48 49
//! text 3C40 "READY"
//! wait 5000
//! ```

use std::fmt;

/// A single step of host activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceOp {
    Out { port: u16, value: u8 },
    In { port: u16, expect: Option<u8> },
    /// Consecutive memory writes starting at `address`.
    Video { address: u16, bytes: Vec<u8> },
    Wait { micros: u64 },
}

/// A parse failure, with the 1-based line it occurred on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceError {
    pub line: usize,
    pub desc: String,
}

impl TraceError {
    fn new<S>(line: usize, desc: S) -> Self
        where S: Into<String>
    {
        TraceError {
            line,
            desc: desc.into(),
        }
    }
}

impl fmt::Display for TraceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.desc)
    }
}

impl std::error::Error for TraceError {}

/// Parse a whole trace.
pub fn parse(source: &str) -> Result<Vec<TraceOp>, TraceError> {
    let mut ops = Vec::new();
    for (i, raw) in source.lines().enumerate() {
        let line = i + 1;
        let text = strip_comment(raw).trim();
        if text.is_empty() {
            continue;
        }
        ops.push(parse_line(text).map_err(|desc| TraceError::new(line, desc))?);
    }
    Ok(ops)
}

/// Drop a trailing `#` comment, leaving any `#` inside quotes alone.
fn strip_comment(line: &str) -> &str {
    let mut quoted = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            '#' if !quoted => return &line[..i],
            _ => {}
        }
    }
    line
}

fn parse_line(text: &str) -> Result<TraceOp, String> {
    let (keyword, rest) = match text.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (text, ""),
    };

    match keyword.to_ascii_lowercase().as_str() {
        "out" => {
            let args = words(rest, 2, 2)?;
            Ok(TraceOp::Out {
                port: parse_hex_u16(args[0])?,
                value: parse_hex_u8(args[1])?,
            })
        }
        "in" => {
            let args = words(rest, 1, 2)?;
            let expect = match args.get(1) {
                None => None,
                Some(arg) => {
                    let value = arg.strip_prefix('=')
                        .ok_or_else(|| format!("expected '=<byte>', found '{}'", arg))?;
                    Some(parse_hex_u8(value)?)
                }
            };
            Ok(TraceOp::In {
                port: parse_hex_u16(args[0])?,
                expect,
            })
        }
        "vid" => {
            let args = words(rest, 2, usize::MAX)?;
            let bytes = args[1..].iter()
                .map(|arg| parse_hex_u8(arg))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(TraceOp::Video {
                address: parse_hex_u16(args[0])?,
                bytes,
            })
        }
        "text" => {
            let (address, string) = rest.split_once(char::is_whitespace)
                .ok_or_else(|| "expected an address and a quoted string".to_owned())?;
            Ok(TraceOp::Video {
                address: parse_hex_u16(address)?,
                bytes: parse_string(string.trim())?,
            })
        }
        "wait" => {
            let args = words(rest, 1, 1)?;
            let micros = args[0].parse::<u64>()
                .map_err(|_| format!("invalid microsecond count '{}'", args[0]))?;
            Ok(TraceOp::Wait { micros })
        }
        _ => Err(format!("unknown operation '{}'", keyword)),
    }
}

/// Split arguments, checking there are between `min` and `max` of them.
fn words(rest: &str, min: usize, max: usize) -> Result<Vec<&str>, String> {
    let args: Vec<&str> = rest.split_whitespace().collect();
    if args.len() < min {
        Err(format!("expected at least {} argument(s), found {}", min, args.len()))
    } else if args.len() > max {
        Err(format!("expected at most {} argument(s), found {}", max, args.len()))
    } else {
        Ok(args)
    }
}

fn parse_hex(arg: &str) -> Result<u32, String> {
    let digits = arg.strip_prefix("0x")
        .or_else(|| arg.strip_prefix("0X"))
        .unwrap_or(arg);
    u32::from_str_radix(digits, 16)
        .map_err(|_| format!("invalid hex number '{}'", arg))
}

fn parse_hex_u16(arg: &str) -> Result<u16, String> {
    u16::try_from(parse_hex(arg)?)
        .map_err(|_| format!("'{}' does not fit in 16 bits", arg))
}

fn parse_hex_u8(arg: &str) -> Result<u8, String> {
    u8::try_from(parse_hex(arg)?)
        .map_err(|_| format!("'{}' does not fit in 8 bits", arg))
}

/// A double-quoted ASCII string with `\"` and `\\` escapes.
fn parse_string(arg: &str) -> Result<Vec<u8>, String> {
    let inner = arg.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .filter(|_| arg.len() >= 2)
        .ok_or_else(|| format!("expected a quoted string, found '{}'", arg))?;

    let mut bytes = Vec::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        let c = match c {
            '\\' => chars.next()
                .ok_or_else(|| "dangling '\\' in string".to_owned())?,
            '"' => return Err("unescaped '\"' in string".to_owned()),
            c => c,
        };
        if !c.is_ascii() {
            return Err(format!("non-ASCII character '{}' in string", c));
        }
        bytes.push(c as u8);
    }
    Ok(bytes)
}
