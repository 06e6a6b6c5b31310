use super::*;
use ovm::instr;
use ovm::unit::ObjectUnit;
use std::io::Cursor;

fn sample_unit() -> ObjectUnit {
    let mut unit = ObjectUnit::default();
    unit.pool.add_int(5);
    unit.pool.add_string("hi");
    unit.pool.add_double(2.5);
    unit.pool.add_char(b'x');
    unit.code = vec![
        instr!(LOADC, 1, 0),
        instr!(LOADP, 0, 1),
        instr!(CALL),
        instr!(PRINT, 0, 3),
        instr!(HALT),
        instr!(LOADARG, 0, 0),
        instr!(RET, 0),
    ];
    unit.labels.insert("entry".to_owned(), 0);
    unit.labels.insert("fact".to_owned(), 5);
    unit.funcs.insert(
        "fact".to_owned(),
        Function {
            name: "fact".to_owned(),
            params: 1,
            locals: 1,
            pc_start: 5,
            pc_end: 7,
            ..Function::default()
        },
    );
    unit.unresolved.push(UnresolvedRef {
        inst_index: 2,
        symbol: "fact".to_owned(),
        opcode: ovm::Opcode::CALL,
        target_in_b: false,
    });
    unit
}

#[test]
fn object_round_trip() {
    let unit = sample_unit();

    let mut buf = Vec::new();
    write_object(&mut buf, &unit).unwrap();
    let read_back = read_object(&mut Cursor::new(&buf)).unwrap();

    assert_eq!(read_back, unit);
}

#[test]
fn object_round_trip_through_file() {
    let unit = sample_unit();
    let path = std::env::temp_dir().join("ofile_round_trip.oobj");

    write_object_file(&path, &unit).unwrap();
    let read_back = read_object_file(&path).unwrap();

    assert_eq!(read_back, unit);

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn image_round_trip() {
    let unit = sample_unit();

    let mut buf = Vec::new();
    write_image(&mut buf, &unit).unwrap();
    let image = read_image(&mut Cursor::new(&buf)).unwrap();

    assert_eq!(image.pool, unit.pool.entries().to_vec());
    assert_eq!(image.code, unit.code);
}

#[test]
fn object_magic_is_checked() {
    let mut buf = Vec::new();
    write_object(&mut buf, &ObjectUnit::default()).unwrap();
    buf[0] = b'X';

    match read_object(&mut Cursor::new(&buf)) {
        Err(Error::BadMagic(_)) => {}
        other => panic!("expected BadMagic, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn image_version_is_checked() {
    let mut buf = Vec::new();
    write_image(&mut buf, &ObjectUnit::default()).unwrap();
    // bump the little-endian u64 version that follows the magic
    buf[4] = 0xFF;

    match read_image(&mut Cursor::new(&buf)) {
        Err(Error::UnsupportedVersion(_)) => {}
        other => panic!("expected UnsupportedVersion, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn truncated_object_is_an_io_error() {
    let mut buf = Vec::new();
    write_object(&mut buf, &sample_unit()).unwrap();
    buf.truncate(buf.len() / 2);

    match read_object(&mut Cursor::new(&buf)) {
        Err(Error::Io(_)) => {}
        other => panic!("expected Io, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn corrupt_section_tag_is_reported() {
    let mut buf = Vec::new();
    write_object(&mut buf, &ObjectUnit::default()).unwrap();
    // the POOL tag sits right after magic + version
    buf[6] = b'Q';

    match read_object(&mut Cursor::new(&buf)) {
        Err(Error::BadTag { expected: "POOL", .. }) => {}
        other => panic!("expected BadTag, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn unknown_opcode_byte_is_rejected() {
    let mut unit = ObjectUnit::default();
    unit.code.push(instr!(HALT));
    let mut buf = Vec::new();
    write_image(&mut buf, &unit).unwrap();
    let opcode_offset = buf.len() - 7;
    buf[opcode_offset] = 0xEE;

    match read_image(&mut Cursor::new(&buf)) {
        Err(Error::BadOpcode(0xEE)) => {}
        other => panic!("expected BadOpcode, got {:?}", other.map(|_| ())),
    }
}
