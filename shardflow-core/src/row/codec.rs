//! Binary row codec.
//!
//! Wire form: `[key_len:u32][key:bytes][values:value]` where the values are
//! always a tagged map. A value is `[tag:u8][payload]`:
//!
//! - `0x00` null, no payload
//! - `0x01` bool: `[0|1]`
//! - `0x02` int: `[i64:be]`
//! - `0x03` float: `[f64 bits:be]`
//! - `0x04` bytes: `[len:u32][raw]`
//! - `0x05` string: `[len:u32][utf8]`
//! - `0x06` list: `[count:u32][value]*`
//! - `0x07` map: `[count:u32]([key_len:u32][key:utf8][value])*`
//!
//! All integers are big-endian. Producer-side encoding is infallible;
//! decoding returns a typed error on truncation, unknown tags, invalid
//! UTF-8, or trailing bytes.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::row::{Row, Value};

const TAG_NULL: u8 = 0x00;
const TAG_BOOL: u8 = 0x01;
const TAG_INT: u8 = 0x02;
const TAG_FLOAT: u8 = 0x03;
const TAG_BYTES: u8 = 0x04;
const TAG_STRING: u8 = 0x05;
const TAG_LIST: u8 = 0x06;
const TAG_MAP: u8 = 0x07;

pub(crate) fn encode_row(row: &Row) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + row.key.len());
    put_str(&mut out, &row.key);
    encode_map(&mut out, &row.values);
    out
}

pub(crate) fn decode_row(data: &[u8]) -> Result<Row> {
    let mut cursor = Cursor::new(data);
    let key = cursor.take_str()?;
    let values = match cursor.take_value()? {
        Value::Map(values) => values,
        other => {
            return Err(Error::Decode(format!(
                "row values must be a map, found {other:?}"
            )))
        }
    };
    cursor.finish()?;
    Ok(Row { key, values })
}

fn encode_value(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Null => out.push(TAG_NULL),
        Value::Bool(v) => {
            out.push(TAG_BOOL);
            out.push(u8::from(*v));
        }
        Value::Int(v) => {
            out.push(TAG_INT);
            out.extend_from_slice(&v.to_be_bytes());
        }
        Value::Float(v) => {
            out.push(TAG_FLOAT);
            out.extend_from_slice(&v.to_bits().to_be_bytes());
        }
        Value::Bytes(v) => {
            out.push(TAG_BYTES);
            put_len(out, v.len());
            out.extend_from_slice(v);
        }
        Value::String(v) => {
            out.push(TAG_STRING);
            put_str(out, v);
        }
        Value::List(items) => {
            out.push(TAG_LIST);
            put_len(out, items.len());
            for item in items {
                encode_value(out, item);
            }
        }
        Value::Map(entries) => encode_map(out, entries),
    }
}

fn encode_map(out: &mut Vec<u8>, entries: &HashMap<String, Value>) {
    out.push(TAG_MAP);
    put_len(out, entries.len());
    for (key, value) in entries {
        put_str(out, key);
        encode_value(out, value);
    }
}

fn put_len(out: &mut Vec<u8>, len: usize) {
    out.extend_from_slice(&(len as u32).to_be_bytes());
}

fn put_str(out: &mut Vec<u8>, s: &str) {
    put_len(out, s.len());
    out.extend_from_slice(s.as_bytes());
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.data.len() - self.pos < n {
            return Err(Error::Decode(format!(
                "truncated row: wanted {n} bytes at offset {}, {} remain",
                self.pos,
                self.data.len() - self.pos
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn take_len(&mut self) -> Result<usize> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize)
    }

    fn take_str(&mut self) -> Result<String> {
        let len = self.take_len()?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|err| Error::Decode(format!("invalid utf-8 string: {err}")))
    }

    fn take_value(&mut self) -> Result<Value> {
        let tag = self.take_u8()?;
        match tag {
            TAG_NULL => Ok(Value::Null),
            TAG_BOOL => match self.take_u8()? {
                0 => Ok(Value::Bool(false)),
                1 => Ok(Value::Bool(true)),
                other => Err(Error::Decode(format!("invalid bool byte: {other:#04x}"))),
            },
            TAG_INT => {
                let bytes = self.take(8)?;
                let mut buf = [0u8; 8];
                buf.copy_from_slice(bytes);
                Ok(Value::Int(i64::from_be_bytes(buf)))
            }
            TAG_FLOAT => {
                let bytes = self.take(8)?;
                let mut buf = [0u8; 8];
                buf.copy_from_slice(bytes);
                Ok(Value::Float(f64::from_bits(u64::from_be_bytes(buf))))
            }
            TAG_BYTES => {
                let len = self.take_len()?;
                Ok(Value::Bytes(self.take(len)?.to_vec()))
            }
            TAG_STRING => Ok(Value::String(self.take_str()?)),
            TAG_LIST => {
                let count = self.take_len()?;
                let mut items = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    items.push(self.take_value()?);
                }
                Ok(Value::List(items))
            }
            TAG_MAP => {
                let count = self.take_len()?;
                let mut entries = HashMap::with_capacity(count.min(1024));
                for _ in 0..count {
                    let key = self.take_str()?;
                    entries.insert(key, self.take_value()?);
                }
                Ok(Value::Map(entries))
            }
            other => Err(Error::Decode(format!("unknown value tag: {other:#04x}"))),
        }
    }

    fn finish(&self) -> Result<()> {
        if self.pos != self.data.len() {
            return Err(Error::Decode(format!(
                "{} trailing bytes after row",
                self.data.len() - self.pos
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/codec_tests.rs"]
mod tests;
