//! Option storage and command-line parsing.

use std::path::PathBuf;

use crate::error::GenError;

pub const USAGE: &str = "\
Usage: stressgen [options]

Options:
  -s, --seed <N>        seed for the random generator (default: random)
      --std <name>      output dialect: c++ (default), ispc, sycl
  -o, --out-dir <dir>   directory for the generated program (default: .)
      --allow-dead-data permit assignments that are dead for value propagation
  -h, --help            print this help
  -v, --version         print the version
";

/// Output dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdKind {
    Cxx,
    Ispc,
    Sycl,
}

impl StdKind {
    pub fn parse(name: &str) -> Option<StdKind> {
        match name {
            "c++" | "cxx" | "c++11" | "c++14" | "c++17" => Some(StdKind::Cxx),
            "ispc" => Some(StdKind::Ispc),
            "sycl" => Some(StdKind::Sycl),
            _ => None,
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            StdKind::Cxx => "prog.cpp",
            StdKind::Ispc => "prog.ispc",
            StdKind::Sycl => "prog.cpp",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Options {
    /// None picks a fresh seed from entropy at startup.
    pub seed: Option<u64>,
    pub std: StdKind,
    pub out_dir: PathBuf,
    pub allow_dead_data: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            seed: None,
            std: StdKind::Cxx,
            out_dir: PathBuf::from("."),
            allow_dead_data: false,
        }
    }
}

#[derive(Debug)]
pub enum ParsedArgs {
    Run(Options),
    Help,
    Version,
}

pub fn parse_args(args: impl Iterator<Item = String>) -> Result<ParsedArgs, GenError> {
    let mut opts = Options::default();
    let mut args = args;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(ParsedArgs::Help),
            "-v" | "--version" => return Ok(ParsedArgs::Version),
            "-s" | "--seed" => {
                let val = args
                    .next()
                    .ok_or_else(|| GenError::BadOption("--seed needs a value".into()))?;
                let seed = val
                    .parse::<u64>()
                    .map_err(|_| GenError::BadOption(format!("bad seed `{val}`")))?;
                opts.seed = Some(seed);
            }
            "--std" => {
                let val = args
                    .next()
                    .ok_or_else(|| GenError::BadOption("--std needs a value".into()))?;
                opts.std = StdKind::parse(&val)
                    .ok_or_else(|| GenError::BadOption(format!("unknown dialect `{val}`")))?;
            }
            "-o" | "--out-dir" => {
                let val = args
                    .next()
                    .ok_or_else(|| GenError::BadOption("--out-dir needs a value".into()))?;
                opts.out_dir = PathBuf::from(val);
            }
            "--allow-dead-data" => opts.allow_dead_data = true,
            other => {
                if let Some(val) = other.strip_prefix("--std=") {
                    opts.std = StdKind::parse(val)
                        .ok_or_else(|| GenError::BadOption(format!("unknown dialect `{val}`")))?;
                } else if let Some(val) = other.strip_prefix("--seed=") {
                    let seed = val
                        .parse::<u64>()
                        .map_err(|_| GenError::BadOption(format!("bad seed `{val}`")))?;
                    opts.seed = Some(seed);
                } else {
                    return Err(GenError::BadOption(format!("unknown option `{other}`")));
                }
            }
        }
    }
    Ok(ParsedArgs::Run(opts))
}
