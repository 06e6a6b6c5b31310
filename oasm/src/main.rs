use clap::{App, Arg};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

#[derive(Debug)]
enum Error {
    Io(std::io::Error, PathBuf),
    Asm(oasm::Error),
    Format(ofile::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err, path) => {
                write!(f, "reading \"{}\" failed: {}", path.display(), err)
            }
            Error::Asm(err) => write!(f, "assembly failed: {}", err),
            Error::Format(err) => write!(f, "writing object file failed: {}", err),
        }
    }
}

fn main() {
    let matches = App::new("oasm")
        .about("Assembles ovm assembly into a relocatable object file")
        .arg(
            Arg::with_name("INPUT")
                .help("Assembly source file")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("OUTPUT")
                .help("Object file to write (defaults to INPUT with extension .oobj)")
                .index(2),
        )
        .get_matches();

    let input = matches.value_of("INPUT").unwrap();
    let output = matches.value_of("OUTPUT");

    if let Err(err) = run(input, output) {
        eprintln!("{}", err);
        process::exit(1);
    }
}

fn run(input: &str, output: Option<&str>) -> Result<(), Error> {
    let input_path = Path::new(input);
    let source =
        fs::read_to_string(input_path).map_err(|err| Error::Io(err, input_path.to_owned()))?;

    let unit = oasm::assemble(&source).map_err(Error::Asm)?;

    let output_path = output
        .map(PathBuf::from)
        .unwrap_or_else(|| input_path.with_extension("oobj"));

    ofile::write_object_file(&output_path, &unit).map_err(Error::Format)?;

    println!(
        "[oasm] assembled {} instruction(s) -> {}",
        unit.code.len(),
        output_path.display()
    );
    Ok(())
}
