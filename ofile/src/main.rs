use clap::{App, Arg};
use std::fmt;
use std::process;

use ovm::value::Value;
use ovm::vm::{Vm, VmError};

#[derive(Debug)]
enum Error {
    Format(ofile::Error),
    Vm(VmError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Format(err) => write!(f, "loading image failed: {}", err),
            Error::Vm(err) => write!(f, "{}", err),
        }
    }
}

fn main() {
    let matches = App::new("ovm")
        .about("Executes a linked program image")
        .arg(
            Arg::with_name("IMAGE")
                .help("Program image to execute")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("regs")
                .short("r")
                .long("regs")
                .takes_value(true)
                .value_name("COUNT")
                .default_value("8")
                .help("Size of the global register file"),
        )
        .get_matches();

    let image = matches.value_of("IMAGE").unwrap();
    let regs = match matches.value_of("regs").unwrap().parse::<usize>() {
        Ok(count) if count > 0 => count,
        _ => {
            eprintln!("ovm: --regs expects a positive integer");
            process::exit(1);
        }
    };

    if let Err(err) = run(image, regs) {
        eprintln!("{}", err);
        process::exit(1);
    }
}

fn run(path: &str, regs: usize) -> Result<(), Error> {
    let image = ofile::read_image_file(path).map_err(Error::Format)?;

    let mut vm = Vm::new(regs);
    vm.load(image.pool.iter().map(Value::from).collect(), image.code);
    vm.run().map_err(Error::Vm)
}
