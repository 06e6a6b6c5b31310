use clap::{App, Arg};
use oasm::linker;
use std::fmt;
use std::path::PathBuf;
use std::process;

#[derive(Debug)]
enum Error {
    Format(ofile::Error, PathBuf),
    Link(linker::LinkError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Format(err, path) => write!(f, "\"{}\": {}", path.display(), err),
            Error::Link(err) => write!(f, "linking failed: {}", err),
        }
    }
}

fn main() {
    let matches = App::new("olink")
        .about("Links object files into an executable program image")
        .arg(
            Arg::with_name("FILES")
                .help("Input object files followed by the output image")
                .required(true)
                .multiple(true)
                .min_values(2),
        )
        .get_matches();

    let files: Vec<&str> = matches.values_of("FILES").unwrap().collect();
    let (output, inputs) = files.split_last().unwrap();

    if let Err(err) = run(inputs, output) {
        eprintln!("{}", err);
        process::exit(1);
    }
}

fn run(inputs: &[&str], output: &str) -> Result<(), Error> {
    let mut units = Vec::with_capacity(inputs.len());
    for input in inputs {
        let path = PathBuf::from(input);
        let unit = ofile::read_object_file(&path).map_err(|err| Error::Format(err, path))?;
        units.push(unit);
    }

    let mut linked = linker::link_units(&units).map_err(Error::Link)?;
    let resolved = linker::link_labels(&mut linked).map_err(Error::Link)?;
    println!("[olink] resolved {} reference(s)", resolved);

    let output_path = PathBuf::from(output);
    ofile::write_image_file(&output_path, &linked)
        .map_err(|err| Error::Format(err, output_path.clone()))?;

    println!(
        "[olink] linked {} object(s) -> {}",
        inputs.len(),
        output_path.display()
    );
    Ok(())
}
