//! Binary codecs for the two file formats of the toolchain.
//!
//! * **Object files** (`DTOB`) are relocatable: constant pool, function
//!   table, unresolved references, label table and code, in that order.
//!   They are what `oasm` emits and what `olink` consumes.
//! * **Program images** (`DTVM`) are executable: a self-describing constant
//!   pool (every entry carries a size prefix, so unknown kinds could be
//!   skipped) and the linked code. They are what `olink` emits and what the
//!   `ovm` runner loads.
//!
//! All multi-byte fields are little-endian; see [`util::Endian`].

use byteorder::{ReadBytesExt, WriteBytesExt};
use std::error::Error as StdError;
use std::fmt;
use std::fs::File;
use std::io::prelude::*;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use ovm::ops::{Instruction, Opcode};
use ovm::pool::{ConstTag, Constant};
use ovm::unit::{Function, ObjectUnit, UnresolvedRef};
use util::Endian;

pub const OBJECT_MAGIC: &[u8; 4] = b"DTOB";
pub const OBJECT_VERSION: u16 = 1;

pub const IMAGE_MAGIC: &[u8; 4] = b"DTVM";
pub const IMAGE_VERSION: u64 = 1;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    BadMagic([u8; 4]),
    UnsupportedVersion(u64),
    BadTag { expected: &'static str, found: [u8; 4] },
    BadConstTag(u8),
    BadOpcode(u8),
    BadString,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "i/o error: {}", err),
            Error::BadMagic(found) => write!(f, "invalid file magic {:?}", found),
            Error::UnsupportedVersion(version) => {
                write!(f, "unsupported format version {}", version)
            }
            Error::BadTag { expected, found } => write!(
                f,
                "expected section tag {:?}, found {:?}",
                expected,
                String::from_utf8_lossy(found)
            ),
            Error::BadConstTag(byte) => write!(f, "unknown constant type {:#04x}", byte),
            Error::BadOpcode(byte) => write!(f, "unknown opcode {:#04x}", byte),
            Error::BadString => write!(f, "string payload is not valid UTF-8"),
        }
    }
}

impl StdError for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// The decoded form of a program image.
#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    pub pool: Vec<Constant>,
    pub code: Vec<Instruction>,
}

fn write_tag<W: Write>(writer: &mut W, tag: &'static str) -> Result<()> {
    writer.write_all(tag.as_bytes())?;
    Ok(())
}

fn expect_tag<R: Read>(reader: &mut R, expected: &'static str) -> Result<()> {
    let mut found = [0u8; 4];
    reader.read_exact(&mut found)?;
    if found != expected.as_bytes() {
        return Err(Error::BadTag { expected, found });
    }
    Ok(())
}

fn write_str<W: Write>(writer: &mut W, s: &str) -> Result<()> {
    writer.write_u32::<Endian>(s.len() as u32)?;
    writer.write_all(s.as_bytes())?;
    Ok(())
}

fn read_bytes<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_str<R: Read>(reader: &mut R) -> Result<String> {
    let len = reader.read_u32::<Endian>()? as usize;
    String::from_utf8(read_bytes(reader, len)?).map_err(|_| Error::BadString)
}

fn write_instruction<W: Write>(writer: &mut W, inst: &Instruction) -> Result<()> {
    writer.write_u8(inst.opcode.byte())?;
    writer.write_u16::<Endian>(inst.a)?;
    writer.write_u16::<Endian>(inst.b)?;
    writer.write_u16::<Endian>(inst.c)?;
    Ok(())
}

fn read_instruction<R: Read>(reader: &mut R) -> Result<Instruction> {
    let byte = reader.read_u8()?;
    let opcode = Opcode::from_byte(byte).ok_or(Error::BadOpcode(byte))?;
    let a = reader.read_u16::<Endian>()?;
    let b = reader.read_u16::<Endian>()?;
    let c = reader.read_u16::<Endian>()?;
    Ok(Instruction { opcode, a, b, c })
}

/// Serialises an assembler unit as a relocatable object file.
pub fn write_object<W: Write>(writer: &mut W, unit: &ObjectUnit) -> Result<()> {
    writer.write_all(OBJECT_MAGIC)?;
    writer.write_u16::<Endian>(OBJECT_VERSION)?;

    write_tag(writer, "POOL")?;
    writer.write_u32::<Endian>(unit.pool.size() as u32)?;
    for entry in unit.pool.entries() {
        writer.write_u8(entry.tag().byte())?;
        match entry {
            Constant::Int(val) => writer.write_i64::<Endian>(*val)?,
            Constant::Double(val) => writer.write_f64::<Endian>(*val)?,
            Constant::Str(s) => write_str(writer, s)?,
            Constant::Char(c) => writer.write_u8(*c)?,
        }
    }

    write_tag(writer, "FUNC")?;
    writer.write_u32::<Endian>(unit.funcs.len() as u32)?;
    for (name, func) in &unit.funcs {
        write_str(writer, name)?;
        writer.write_u16::<Endian>(func.params)?;
        writer.write_u16::<Endian>(func.locals)?;
        writer.write_u32::<Endian>(func.pc_start as u32)?;
        writer.write_u32::<Endian>((func.pc_end - func.pc_start) as u32)?;
    }

    write_tag(writer, "UNRS")?;
    writer.write_u32::<Endian>(unit.unresolved.len() as u32)?;
    for unresolved in &unit.unresolved {
        writer.write_u32::<Endian>(unresolved.inst_index as u32)?;
        writer.write_u8(unresolved.opcode.byte())?;
        writer.write_u8(unresolved.target_in_b as u8)?;
        write_str(writer, &unresolved.symbol)?;
    }

    write_tag(writer, "LBLS")?;
    writer.write_u32::<Endian>(unit.labels.len() as u32)?;
    for (label, pc) in &unit.labels {
        write_str(writer, label)?;
        writer.write_u32::<Endian>(*pc as u32)?;
    }

    write_tag(writer, "CODE")?;
    writer.write_u32::<Endian>(unit.code.len() as u32)?;
    for inst in &unit.code {
        write_instruction(writer, inst)?;
    }

    Ok(())
}

/// Reads an object file back into its in-memory form. The `var`/`param`
/// name maps are assembler-internal and not part of the format.
pub fn read_object<R: Read>(reader: &mut R) -> Result<ObjectUnit> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != OBJECT_MAGIC {
        return Err(Error::BadMagic(magic));
    }
    let version = reader.read_u16::<Endian>()?;
    if version != OBJECT_VERSION {
        return Err(Error::UnsupportedVersion(u64::from(version)));
    }

    let mut unit = ObjectUnit::default();

    expect_tag(reader, "POOL")?;
    let const_count = reader.read_u32::<Endian>()?;
    for _ in 0..const_count {
        let byte = reader.read_u8()?;
        let tag = ConstTag::from_byte(byte).ok_or(Error::BadConstTag(byte))?;
        match tag {
            ConstTag::INT => {
                let val = reader.read_i64::<Endian>()?;
                unit.pool.add_int(val);
            }
            ConstTag::FLOAT | ConstTag::DOUBLE => {
                let val = reader.read_f64::<Endian>()?;
                unit.pool.add_double(val);
            }
            ConstTag::STRING => {
                let s = read_str(reader)?;
                unit.pool.add_string(&s);
            }
            ConstTag::CHAR => {
                let c = reader.read_u8()?;
                unit.pool.add_char(c);
            }
        }
    }

    expect_tag(reader, "FUNC")?;
    let func_count = reader.read_u32::<Endian>()?;
    for _ in 0..func_count {
        let name = read_str(reader)?;
        let params = reader.read_u16::<Endian>()?;
        let locals = reader.read_u16::<Endian>()?;
        let offset = reader.read_u32::<Endian>()? as usize;
        let size = reader.read_u32::<Endian>()? as usize;
        unit.funcs.insert(
            name.clone(),
            Function {
                name,
                params,
                locals,
                pc_start: offset,
                pc_end: offset + size,
                ..Function::default()
            },
        );
    }

    expect_tag(reader, "UNRS")?;
    let unresolved_count = reader.read_u32::<Endian>()?;
    for _ in 0..unresolved_count {
        let inst_index = reader.read_u32::<Endian>()? as usize;
        let byte = reader.read_u8()?;
        let opcode = Opcode::from_byte(byte).ok_or(Error::BadOpcode(byte))?;
        let target_in_b = reader.read_u8()? != 0;
        let symbol = read_str(reader)?;
        unit.unresolved.push(UnresolvedRef {
            inst_index,
            symbol,
            opcode,
            target_in_b,
        });
    }

    expect_tag(reader, "LBLS")?;
    let label_count = reader.read_u32::<Endian>()?;
    for _ in 0..label_count {
        let label = read_str(reader)?;
        let pc = reader.read_u32::<Endian>()? as usize;
        unit.labels.insert(label, pc);
    }

    expect_tag(reader, "CODE")?;
    let code_count = reader.read_u32::<Endian>()?;
    unit.code.reserve(code_count as usize);
    for _ in 0..code_count {
        unit.code.push(read_instruction(reader)?);
    }

    Ok(unit)
}

/// Serialises a linked unit as an executable program image.
pub fn write_image<W: Write>(writer: &mut W, unit: &ObjectUnit) -> Result<()> {
    writer.write_all(IMAGE_MAGIC)?;
    writer.write_u64::<Endian>(IMAGE_VERSION)?;

    write_tag(writer, "POOL")?;
    writer.write_u64::<Endian>(unit.pool.size() as u64)?;
    for entry in unit.pool.entries() {
        writer.write_u8(entry.tag().byte())?;
        match entry {
            Constant::Int(val) => {
                writer.write_u64::<Endian>(8)?;
                writer.write_i64::<Endian>(*val)?;
            }
            Constant::Double(val) => {
                writer.write_u64::<Endian>(8)?;
                writer.write_f64::<Endian>(*val)?;
            }
            Constant::Str(s) => {
                writer.write_u64::<Endian>(s.len() as u64)?;
                writer.write_all(s.as_bytes())?;
            }
            Constant::Char(c) => {
                writer.write_u64::<Endian>(1)?;
                writer.write_u8(*c)?;
            }
        }
    }

    write_tag(writer, "TEXT")?;
    writer.write_u64::<Endian>(unit.code.len() as u64)?;
    for inst in &unit.code {
        write_instruction(writer, inst)?;
    }

    Ok(())
}

/// Loads a program image. Trailing bytes after the `TEXT` section are
/// reported on stderr but tolerated.
pub fn read_image<R: Read>(reader: &mut R) -> Result<Image> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != IMAGE_MAGIC {
        return Err(Error::BadMagic(magic));
    }
    let version = reader.read_u64::<Endian>()?;
    if version > IMAGE_VERSION {
        return Err(Error::UnsupportedVersion(version));
    }

    expect_tag(reader, "POOL")?;
    let pool_size = reader.read_u64::<Endian>()?;
    let mut pool = Vec::with_capacity(pool_size as usize);
    for _ in 0..pool_size {
        let byte = reader.read_u8()?;
        let tag = ConstTag::from_byte(byte).ok_or(Error::BadConstTag(byte))?;
        let size = reader.read_u64::<Endian>()? as usize;
        let entry = match tag {
            ConstTag::INT => Constant::Int(reader.read_i64::<Endian>()?),
            ConstTag::FLOAT | ConstTag::DOUBLE => Constant::Double(reader.read_f64::<Endian>()?),
            ConstTag::STRING => {
                Constant::Str(String::from_utf8(read_bytes(reader, size)?).map_err(|_| Error::BadString)?)
            }
            ConstTag::CHAR => Constant::Char(reader.read_u8()?),
        };
        pool.push(entry);
    }

    expect_tag(reader, "TEXT")?;
    let text_size = reader.read_u64::<Endian>()?;
    let mut code = Vec::with_capacity(text_size as usize);
    for _ in 0..text_size {
        code.push(read_instruction(reader)?);
    }

    let mut probe = [0u8; 1];
    if reader.read(&mut probe)? > 0 {
        eprintln!("[ovm] warning: trailing bytes after TEXT section");
    }

    Ok(Image { pool, code })
}

pub trait ReadObjExt: Read + Sized {
    fn read_object(&mut self) -> Result<ObjectUnit> {
        read_object(self)
    }

    fn read_image(&mut self) -> Result<Image> {
        read_image(self)
    }
}

impl<R: Read + Sized> ReadObjExt for R {}

pub trait WriteObjExt: Write + Sized {
    fn write_object(&mut self, unit: &ObjectUnit) -> Result<()> {
        write_object(self, unit)
    }

    fn write_image(&mut self, unit: &ObjectUnit) -> Result<()> {
        write_image(self, unit)
    }
}

impl<W: Write + Sized> WriteObjExt for W {}

pub fn read_object_file<P: AsRef<Path>>(path: P) -> Result<ObjectUnit> {
    BufReader::new(File::open(path)?).read_object()
}

pub fn write_object_file<P: AsRef<Path>>(path: P, unit: &ObjectUnit) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_object(unit)?;
    writer.flush()?;
    Ok(())
}

pub fn read_image_file<P: AsRef<Path>>(path: P) -> Result<Image> {
    BufReader::new(File::open(path)?).read_image()
}

pub fn write_image_file<P: AsRef<Path>>(path: P, unit: &ObjectUnit) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_image(unit)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod test;
