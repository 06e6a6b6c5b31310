use num::traits::FromPrimitive;
use num_derive::{FromPrimitive, ToPrimitive};
use std::collections::HashMap;

use crate::value::{Data, Value};

/// Wire tag of a constant pool entry. `FLOAT` is reserved; the toolchain
/// emits doubles.
#[derive(Clone, Copy, PartialEq, Eq, Debug, FromPrimitive, ToPrimitive)]
pub enum ConstTag {
    INT = 1,
    FLOAT = 2,
    DOUBLE = 3,
    CHAR = 4,
    STRING = 5,
}

impl ConstTag {
    /// Decodes a tag byte from the wire.
    #[inline]
    pub fn from_byte(byte: u8) -> Option<ConstTag> {
        ConstTag::from_u8(byte)
    }

    /// Encodes the tag as its wire byte.
    #[inline]
    pub fn byte(self) -> u8 {
        self as u8
    }
}

/// A typed constant as stored in object files and program images.
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Int(i64),
    Double(f64),
    Char(u8),
    Str(String),
}

impl Constant {
    pub fn tag(&self) -> ConstTag {
        match self {
            Constant::Int(_) => ConstTag::INT,
            Constant::Double(_) => ConstTag::DOUBLE,
            Constant::Char(_) => ConstTag::CHAR,
            Constant::Str(_) => ConstTag::STRING,
        }
    }
}

impl From<&Constant> for Value {
    fn from(constant: &Constant) -> Value {
        match constant {
            Constant::Int(v) => Value::new(Data::Int(*v as i32)),
            Constant::Double(v) => Value::new(Data::Double(*v)),
            Constant::Char(c) => Value::new(Data::Int(i32::from(*c))),
            Constant::Str(s) => Value::new(Data::Str(s.clone())),
        }
    }
}

/// Append-with-dedup store of typed constants.
///
/// Indices are insertion-order stable; adding an entry equal to an existing
/// one returns the prior index without appending. Strings get a hash-indexed
/// fast path, everything else dedups by structural comparison.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConstantPool {
    entries: Vec<Constant>,
    string_index: HashMap<String, usize>,
}

impl ConstantPool {
    pub fn new() -> ConstantPool {
        ConstantPool::default()
    }

    pub fn add_int(&mut self, val: i64) -> usize {
        self.add(Constant::Int(val))
    }

    pub fn add_double(&mut self, val: f64) -> usize {
        self.add(Constant::Double(val))
    }

    pub fn add_char(&mut self, c: u8) -> usize {
        self.add(Constant::Char(c))
    }

    pub fn add_string(&mut self, s: &str) -> usize {
        if let Some(&index) = self.string_index.get(s) {
            return index;
        }
        self.push(Constant::Str(s.to_owned()))
    }

    /// Generic dedup insert; reuses an existing structurally equal entry.
    pub fn add(&mut self, entry: Constant) -> usize {
        if let Constant::Str(s) = &entry {
            if let Some(&index) = self.string_index.get(s) {
                return index;
            }
        } else if let Some(index) = self.entries.iter().position(|e| *e == entry) {
            return index;
        }
        self.push(entry)
    }

    fn push(&mut self, entry: Constant) -> usize {
        let index = self.entries.len();
        if let Constant::Str(s) = &entry {
            self.string_index.insert(s.clone(), index);
        }
        self.entries.push(entry);
        index
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[Constant] {
        &self.entries[..]
    }

    pub fn get(&self, index: usize) -> Option<&Constant> {
        self.entries.get(index)
    }

    /// Converts every entry into a runtime value, in pool order.
    pub fn to_values(&self) -> Vec<Value> {
        self.entries.iter().map(Value::from).collect()
    }
}

/// Does the token parse as a decimal integer (optional sign)?
pub fn is_int(s: &str) -> bool {
    let digits = s.strip_prefix(|c| c == '-' || c == '+').unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Does the token parse as a decimal with a `.`?
pub fn is_float(s: &str) -> bool {
    let digits = s.strip_prefix(|c| c == '-' || c == '+').unwrap_or(s);
    let mut parts = digits.splitn(2, '.');
    let whole = parts.next().unwrap_or("");
    match parts.next() {
        Some(frac) => {
            !whole.is_empty()
                && whole.bytes().all(|b| b.is_ascii_digit())
                && frac.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

/// Is the token a double-quoted string literal?
pub fn is_string(s: &str) -> bool {
    s.len() >= 2 && s.starts_with('"') && s.ends_with('"')
}

/// Is the token a single-quoted character literal?
pub fn is_char(s: &str) -> bool {
    s.len() == 3 && s.starts_with('\'') && s.ends_with('\'')
}

/// Strips the surrounding quotes of a string literal, if present.
pub fn strip_quotes(s: &str) -> &str {
    if is_string(s) {
        &s[1..s.len() - 1]
    } else {
        s
    }
}
