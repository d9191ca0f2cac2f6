//! Command-line entry point.

use std::{env, fs, process};

use log::info;

use stressgen::options::{parse_args, Options, ParsedArgs, USAGE};
use stressgen::program::ProgramGenerator;
use stressgen::GenError;

fn main() {
    env_logger::init();
    let parsed = match parse_args(env::args().skip(1)) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("stressgen: {e}");
            eprint!("{USAGE}");
            process::exit(1);
        }
    };
    let opts = match parsed {
        ParsedArgs::Help => {
            print!("{USAGE}");
            return;
        }
        ParsedArgs::Version => {
            println!("stressgen {}", env!("CARGO_PKG_VERSION"));
            return;
        }
        ParsedArgs::Run(opts) => opts,
    };
    if let Err(e) = run(opts) {
        eprintln!("stressgen: {e}");
        process::exit(1);
    }
}

fn run(opts: Options) -> Result<(), GenError> {
    let seed = opts.seed.unwrap_or_else(rand::random);
    info!("seed {seed}");

    let mut generator = ProgramGenerator::new(opts.clone(), seed);
    generator.generate()?;
    let text = generator.emit();

    fs::create_dir_all(&opts.out_dir)?;
    let path = opts.out_dir.join(opts.std.file_name());
    fs::write(&path, text)?;
    println!("seed: {seed}");
    println!("written: {}", path.display());
    Ok(())
}
