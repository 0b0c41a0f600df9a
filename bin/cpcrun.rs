use std::fmt::Display;
use std::str::FromStr;

use clap::{App, Arg, ArgMatches};
use slog::{o, Discard, Drain, Logger};
use slog_term::{FullFormat, TermDecorator};

use cpc::{
    bytecode::Program,
    compiler::{Config, Session},
    vm::StdConsole,
};

enum Error {
    IO(std::io::Error),
    Argument(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::IO(e)
    }
}

fn parse_arguments() -> ArgMatches<'static> {
    App::new("cpcrun")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Mitja Karhusaari <mitja@karhusaari.me>")
        .about("Utility for compiling and executing C programs")
        .arg(
            Arg::with_name("source")
                .help("File containing the C source")
                .value_name("SOURCE")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("debug")
                .help("Prints diagnostics about the compiled program")
                .long("debug"),
        )
        .arg(
            Arg::with_name("listing")
                .help("Prints the assembly listing before execution")
                .long("listing"),
        )
        .arg(
            Arg::with_name("strict")
                .help("Rejects characters that cannot start a token")
                .long("strict"),
        )
        .arg(
            Arg::with_name("stack-size")
                .help("Number of word slots in the stack")
                .long("stack-size")
                .value_name("SLOTS")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("max-cycles")
                .help("Number of instructions after which execution is aborted")
                .long("max-cycles")
                .value_name("CYCLES")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("heap-size")
                .help("Size of the heap in bytes")
                .long("heap-size")
                .value_name("BYTES")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("verbose")
                .help("Enables verbose logging")
                .long("verbose")
                .short("v"),
        )
        .get_matches()
}

fn parse_value<T>(args: &ArgMatches, name: &str, default: T) -> Result<T, Error>
where
    T: FromStr,
    T::Err: Display,
{
    match args.value_of(name) {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|e| Error::Argument(format!("invalid value for --{}: {}", name, e))),
    }
}

fn config(args: &ArgMatches) -> Result<Config, Error> {
    let defaults = Config::default();

    Ok(Config::default()
        .debug_mode(args.is_present("debug"))
        .strict_lexing(args.is_present("strict"))
        .max_stack_size(parse_value(args, "stack-size", defaults.max_stack_size)?)
        .max_cycles(parse_value(args, "max-cycles", defaults.max_cycles)?)
        .heap_size(parse_value(args, "heap-size", defaults.heap_size)?))
}

fn main() {
    let args = parse_arguments();

    let code = match run(&args) {
        Ok(code) => code,
        Err(Error::IO(io)) => {
            eprintln!("IO error: {}", io);
            -1
        }
        Err(Error::Argument(msg)) => {
            eprintln!("{}", msg);
            -1
        }
    };

    std::process::exit(code as i32);
}

fn run(args: &ArgMatches) -> Result<i64, Error> {
    let file_path = args.value_of("source").unwrap_or_default();
    let source = std::fs::read_to_string(file_path)?;

    let logger = if args.is_present("verbose") {
        let decorator = TermDecorator::new().build();
        let drain = FullFormat::new(decorator).build().fuse();
        let drain = slog_async::Async::new(drain).build().fuse();
        Logger::root(drain, o!())
    } else {
        Logger::root(Discard, o!())
    };

    let session = Session::with_logger(config(args)?, logger).file(file_path);

    let compiled = match session.compile_to::<Program>(&source) {
        Ok(compiled) => compiled,
        Err(err) => {
            eprintln!("{}", err);
            return Ok(cpc::Error::from(err).exit_code());
        }
    };

    if args.is_present("listing") {
        print!("{}", compiled.target.listing());
    }

    let outcome = session.run_compiled(compiled, StdConsole);

    for line in &outcome.diagnostics {
        eprintln!("{}", line);
    }

    if let Some(err) = outcome.error {
        eprintln!("{}", err);
    }

    Ok(outcome.exit_code)
}
