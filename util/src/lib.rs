use std::{error::Error, fmt};

/// Byte order used by every binary format in the workspace.
pub type Endian = byteorder::LittleEndian;

/// A token that names no variant of an instruction-set enum — an unknown
/// mnemonic, register bank or similar. `what` is the human-readable kind of
/// thing the token was expected to name.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct EnumParseError {
    pub token: String,
    pub what: &'static str,
}

impl EnumParseError {
    pub fn new(token: &str, what: &'static str) -> EnumParseError {
        EnumParseError {
            token: token.to_owned(),
            what,
        }
    }
}

impl fmt::Display for EnumParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?} does not name a {}", self.token, self.what)
    }
}

impl Error for EnumParseError {}
