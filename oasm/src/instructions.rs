//! Per-opcode operand parsing and validation.
//!
//! Operand tokens are classified individually: register tokens (`%rN` and
//! friends), identifier tokens and literals. Identifiers in register
//! positions are rewritten through the current function's `var`/`param`
//! maps; identifiers in jump/call target positions are never rewritten and
//! come back as symbolic targets.

use ovm::constants;
use ovm::ops::{Bank, Instruction, Opcode};
use ovm::pool::{self, ConstantPool};
use ovm::unit::Function;

use crate::error::ErrorKind;

/// A parsed instruction plus its symbolic jump/call target, if any.
#[derive(Debug, PartialEq)]
pub(crate) struct Parsed {
    pub inst: Instruction,
    pub symbol: Option<String>,
}

enum Target {
    Pc(u16),
    Symbol(String),
}

fn parse_reg(token: &str) -> Result<(Bank, u16), ErrorKind> {
    let bytes = token.as_bytes();
    if bytes.len() >= 3 && bytes[0] == b'%' {
        if let Some(bank) = Bank::from_selector(bytes[1] as char) {
            if let Ok(index) = token[2..].parse::<u16>() {
                return Ok((bank, index));
            }
        }
    }
    Err(ErrorKind::BadRegister(token.to_owned()))
}

fn lookup_name(token: &str, scope: Option<&Function>) -> Option<(Bank, u16)> {
    let func = scope?;
    if let Some(&index) = func.local_names.get(token) {
        return Some((Bank::Local, index));
    }
    if let Some(&index) = func.param_names.get(token) {
        return Some((Bank::Arg, index));
    }
    None
}

/// A register operand of any bank; declared `var`/`param` names are
/// rewritten here.
fn any_reg(token: &str, scope: Option<&Function>) -> Result<(Bank, u16), ErrorKind> {
    if token.starts_with('%') {
        parse_reg(token)
    } else if let Some(resolved) = lookup_name(token, scope) {
        Ok(resolved)
    } else {
        Err(ErrorKind::UnknownName(token.to_owned()))
    }
}

/// A register operand that must come from a specific bank.
fn expect_reg(token: &str, expected: Bank, scope: Option<&Function>) -> Result<u16, ErrorKind> {
    let (bank, index) = any_reg(token, scope)?;
    if bank == expected {
        Ok(index)
    } else {
        Err(ErrorKind::BankMismatch {
            token: token.to_owned(),
            expected,
        })
    }
}

fn expect_imm(token: &str) -> Result<u16, ErrorKind> {
    token
        .parse::<u16>()
        .map_err(|_| ErrorKind::BadImmediate(token.to_owned()))
}

fn parse_target(token: &str) -> Result<Target, ErrorKind> {
    if token.is_empty() {
        Err(ErrorKind::BadImmediate(token.to_owned()))
    } else if pool::is_int(token) {
        expect_imm(token).map(Target::Pc)
    } else {
        Ok(Target::Symbol(token.to_owned()))
    }
}

fn want(operands: &[&str], count: usize) -> Result<(), ErrorKind> {
    if operands.len() == count {
        Ok(())
    } else {
        Err(ErrorKind::OperandCount {
            expected: count,
            found: operands.len(),
        })
    }
}

fn want_dest(dest: Option<&str>) -> Result<&str, ErrorKind> {
    dest.ok_or(ErrorKind::MissingDest)
}

fn no_dest(dest: Option<&str>) -> Result<(), ErrorKind> {
    if dest.is_some() {
        Err(ErrorKind::UnexpectedDest)
    } else {
        Ok(())
    }
}

/// Interns a literal token into the pool and returns its index.
fn intern_literal(token: &str, pool: &mut ConstantPool) -> Result<u16, ErrorKind> {
    let index = if pool::is_int(token) {
        let value = token
            .parse::<i64>()
            .map_err(|_| ErrorKind::BadLiteral(token.to_owned()))?;
        pool.add_int(value)
    } else if pool::is_float(token) {
        let value = token
            .parse::<f64>()
            .map_err(|_| ErrorKind::BadLiteral(token.to_owned()))?;
        pool.add_double(value)
    } else if pool::is_string(token) {
        pool.add_string(pool::strip_quotes(token))
    } else if pool::is_char(token) {
        pool.add_char(token.as_bytes()[1])
    } else {
        return Err(ErrorKind::BadLiteral(token.to_owned()));
    };
    if index > constants::MAX_OPERAND {
        return Err(ErrorKind::PoolLimit);
    }
    Ok(index as u16)
}

/// Parses one (already comment-stripped, trimmed, non-directive) source
/// line into an instruction, interning literal constants as needed.
pub(crate) fn parse_instruction(
    line: &str,
    pool: &mut ConstantPool,
    scope: Option<&Function>,
) -> Result<Parsed, ErrorKind> {
    let mnemonic = line.split_whitespace().next().unwrap_or("");
    let opcode: Opcode = mnemonic
        .parse()
        .map_err(|_| ErrorKind::UnknownMnemonic(mnemonic.to_owned()))?;
    let rest = line[mnemonic.len()..].trim();

    // LOADC/LOADCL take the whole pre-arrow remainder verbatim so quoted
    // strings survive, commas included.
    if opcode == Opcode::LOADC || opcode == Opcode::LOADCL {
        let arrow = rest.rfind("->").ok_or(ErrorKind::MissingDest)?;
        let literal = rest[..arrow].trim();
        let dest = rest[arrow + 2..].trim();
        let bank = if opcode == Opcode::LOADC {
            Bank::Global
        } else {
            Bank::Local
        };
        let a = expect_reg(dest, bank, scope)?;
        let b = intern_literal(literal, pool)?;
        return Ok(Parsed {
            inst: Instruction { opcode, a, b, c: 0 },
            symbol: None,
        });
    }

    let (left, dest) = match rest.rfind("->") {
        Some(pos) => (rest[..pos].trim(), Some(rest[pos + 2..].trim())),
        None => (rest, None),
    };
    let operands: Vec<&str> = if left.is_empty() {
        Vec::new()
    } else {
        left.split(',').map(str::trim).collect()
    };

    let mut symbol = None;
    let (a, b, c) = match opcode {
        // three-operand arithmetic over globals
        Opcode::ADD
        | Opcode::SUB
        | Opcode::MUL
        | Opcode::DIV
        | Opcode::CMP
        | Opcode::AND
        | Opcode::OR => {
            want(&operands, 2)?;
            let a = expect_reg(want_dest(dest)?, Bank::Global, scope)?;
            let b = expect_reg(operands[0], Bank::Global, scope)?;
            let c = expect_reg(operands[1], Bank::Global, scope)?;
            (a, b, c)
        }

        // and over frame locals
        Opcode::ADDL
        | Opcode::SUBL
        | Opcode::MULL
        | Opcode::DIVL
        | Opcode::CMPL
        | Opcode::ANDL
        | Opcode::ORL => {
            want(&operands, 2)?;
            let a = expect_reg(want_dest(dest)?, Bank::Local, scope)?;
            let b = expect_reg(operands[0], Bank::Local, scope)?;
            let c = expect_reg(operands[1], Bank::Local, scope)?;
            (a, b, c)
        }

        Opcode::MOV | Opcode::NEG | Opcode::NOT => {
            want(&operands, 1)?;
            let a = expect_reg(want_dest(dest)?, Bank::Global, scope)?;
            let b = expect_reg(operands[0], Bank::Global, scope)?;
            (a, b, 0)
        }

        Opcode::MOVL | Opcode::NEGL | Opcode::NOTL => {
            want(&operands, 1)?;
            let a = expect_reg(want_dest(dest)?, Bank::Local, scope)?;
            let b = expect_reg(operands[0], Bank::Local, scope)?;
            (a, b, 0)
        }

        Opcode::LOADL => {
            want(&operands, 1)?;
            let a = expect_reg(want_dest(dest)?, Bank::Global, scope)?;
            let b = expect_reg(operands[0], Bank::Local, scope)?;
            (a, b, 0)
        }

        Opcode::STOREL => {
            want(&operands, 1)?;
            let a = expect_reg(want_dest(dest)?, Bank::Local, scope)?;
            let b = expect_reg(operands[0], Bank::Global, scope)?;
            (a, b, 0)
        }

        Opcode::LOADARG => {
            want(&operands, 1)?;
            let a = expect_reg(want_dest(dest)?, Bank::Local, scope)?;
            let b = expect_reg(operands[0], Bank::Arg, scope)?;
            (a, b, 0)
        }

        Opcode::LOADP => {
            no_dest(dest)?;
            want(&operands, 2)?;
            let a = expect_reg(operands[0], Bank::Param, scope)?;
            let b = expect_reg(operands[1], Bank::Global, scope)?;
            (a, b, 0)
        }

        Opcode::LOADLP => {
            no_dest(dest)?;
            want(&operands, 2)?;
            let a = expect_reg(operands[0], Bank::Param, scope)?;
            let b = expect_reg(operands[1], Bank::Local, scope)?;
            (a, b, 0)
        }

        Opcode::JMP => {
            no_dest(dest)?;
            want(&operands, 1)?;
            match parse_target(operands[0])? {
                Target::Pc(pc) => (pc, 0, 0),
                Target::Symbol(name) => {
                    symbol = Some(name);
                    (0, 0, 0)
                }
            }
        }

        Opcode::JZ | Opcode::JNZ | Opcode::JL | Opcode::JG => {
            no_dest(dest)?;
            want(&operands, 2)?;
            let a = expect_reg(operands[0], Bank::Global, scope)?;
            match parse_target(operands[1])? {
                Target::Pc(pc) => (a, pc, 0),
                Target::Symbol(name) => {
                    symbol = Some(name);
                    (a, 0, 0)
                }
            }
        }

        Opcode::JLZ | Opcode::JLNZ | Opcode::JLL | Opcode::JLG => {
            no_dest(dest)?;
            want(&operands, 2)?;
            let a = expect_reg(operands[0], Bank::Local, scope)?;
            match parse_target(operands[1])? {
                Target::Pc(pc) => (a, pc, 0),
                Target::Symbol(name) => {
                    symbol = Some(name);
                    (a, 0, 0)
                }
            }
        }

        Opcode::CALL => {
            no_dest(dest)?;
            if operands.is_empty() || operands.len() > 2 {
                return Err(ErrorKind::OperandCount {
                    expected: 1,
                    found: operands.len(),
                });
            }
            // an explicit argc may be given; the linker overwrites it from
            // the function table anyway
            let b = if operands.len() == 2 {
                expect_imm(operands[1])?
            } else {
                0
            };
            match parse_target(operands[0])? {
                Target::Pc(pc) => (pc, b, 0),
                Target::Symbol(name) => {
                    symbol = Some(name);
                    (0, b, 0)
                }
            }
        }

        Opcode::RET => {
            no_dest(dest)?;
            if operands.is_empty() {
                (constants::RET_NO_VALUE, 0, 0)
            } else {
                want(&operands, 1)?;
                let a = expect_reg(operands[0], Bank::Local, scope)?;
                (a, 0, 0)
            }
        }

        Opcode::ENTER => {
            no_dest(dest)?;
            want(&operands, 2)?;
            let b = expect_imm(operands[0])?;
            let c = expect_imm(operands[1])?;
            (0, b, c)
        }

        Opcode::LEAVE | Opcode::NOP | Opcode::HALT => {
            no_dest(dest)?;
            want(&operands, 0)?;
            (0, 0, 0)
        }

        Opcode::NEWARR => {
            want(&operands, 1)?;
            let a = expect_reg(want_dest(dest)?, Bank::Global, scope)?;
            let c = expect_imm(operands[0])?;
            (a, 0, c)
        }

        Opcode::LOADARR => {
            want(&operands, 2)?;
            let a = expect_reg(want_dest(dest)?, Bank::Global, scope)?;
            let b = expect_reg(operands[0], Bank::Global, scope)?;
            let c = expect_reg(operands[1], Bank::Global, scope)?;
            (a, b, c)
        }

        Opcode::STOREARR => {
            no_dest(dest)?;
            want(&operands, 3)?;
            let a = expect_reg(operands[0], Bank::Global, scope)?;
            let b = expect_reg(operands[1], Bank::Global, scope)?;
            let c = expect_reg(operands[2], Bank::Global, scope)?;
            (a, b, c)
        }

        Opcode::LEN => {
            want(&operands, 1)?;
            let a = expect_reg(want_dest(dest)?, Bank::Global, scope)?;
            let b = expect_reg(operands[0], Bank::Global, scope)?;
            (a, b, 0)
        }

        Opcode::PRINT => {
            no_dest(dest)?;
            want(&operands, 1)?;
            let (bank, index) = any_reg(operands[0], scope)?;
            (index, bank.code(), 0)
        }

        Opcode::OWN | Opcode::MOVE | Opcode::VIEW | Opcode::EDIT | Opcode::CLONE => {
            no_dest(dest)?;
            want(&operands, 2)?;
            let a = expect_reg(operands[0], Bank::Global, scope)?;
            let b = expect_reg(operands[1], Bank::Global, scope)?;
            (a, b, 0)
        }

        Opcode::DROP | Opcode::RAIIDROP | Opcode::FREE => {
            no_dest(dest)?;
            want(&operands, 1)?;
            let a = expect_reg(operands[0], Bank::Global, scope)?;
            (a, 0, 0)
        }

        // not assemblable (legacy aliases, rejected by the mnemonic table)
        _ => return Err(ErrorKind::UnknownMnemonic(mnemonic.to_owned())),
    };

    Ok(Parsed {
        inst: Instruction { opcode, a, b, c },
        symbol,
    })
}
