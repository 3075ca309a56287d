use instant::Instant;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use typhon as lib;
use typhon::config::{Command, Config, USAGE};
use typhon::runtime_io::StdIo;
use typhon::vm::disasm::disassemble_image_to_string;
use typhon::{Error, Session, Value};

fn init_tracing() {
    let filter = EnvFilter::try_from_env("TYPHON_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_source(path: &str) -> Result<String, Error> {
    let src = std::fs::read_to_string(path)
        .map_err(|e| Error::new(lib::ErrorKind::IoError, format!("cannot read {}: {}", path, e)))?;
    Ok(if src.ends_with('\n') { src } else { format!("{}\n", src) })
}

fn report_time(config: &Config, stage: &str, started: Instant) {
    if config.time {
        eprintln!("[time] {}: {} ms", stage, started.elapsed().as_millis());
    }
}

fn print_result(value: &Value) {
    if *value != Value::None {
        println!("{}", value);
    }
}

fn run(config: &Config, path: &str, src: &str) -> Result<(), Error> {
    let session = Session::with_limits(config.limits);
    match config.command {
        Command::Run => {
            let t0 = Instant::now();
            let mut staged = session.stage(src)?;
            report_time(config, "compile", t0);

            let t1 = Instant::now();
            let word = lib::Vm::with_limits(config.limits).run(&staged.image, &mut staged.store, &mut StdIo)?;
            report_time(config, "execute", t1);
            print_result(&staged.store.value_of(word, &staged.result_type)?);
        }
        Command::Check => {
            let t0 = Instant::now();
            let ty = session.typecheck_only(src)?;
            report_time(config, "check", t0);
            println!("{}", ty);
        }
        Command::Disasm => {
            let staged = session.stage(src)?;
            print!("{}", disassemble_image_to_string(&staged.image));
        }
        Command::Compile => {
            let t0 = Instant::now();
            let staged = session.stage(src)?;
            report_time(config, "compile", t0);
            let out = config.output.as_deref().unwrap_or("out.tyb");
            lib::save_program(&staged.saved_program()?, out)?;
            println!("wrote {}", out);
        }
        Command::Exec | Command::Repl => {
            return Err(Error::internal(format!("'{}' does not read source from {}", config.command, path)));
        }
    }
    Ok(())
}

fn exec(config: &Config, path: &str) -> Result<(), Error> {
    let t0 = Instant::now();
    let program = lib::load_program(path)?;
    report_time(config, "load", t0);
    let t1 = Instant::now();
    let value = lib::exec_program(&program, config.limits, &mut StdIo)?;
    report_time(config, "execute", t1);
    print_result(&value);
    Ok(())
}

fn main() -> ExitCode {
    init_tracing();

    let config = match Config::from_args(std::env::args().skip(1)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}\n\n{}", e, USAGE);
            return ExitCode::from(2);
        }
    };
    tracing::debug!(?config, "starting");

    let path = config.input.clone().unwrap_or_default();
    let (result, src) = match config.command {
        Command::Repl => (lib::repl::run_repl(config.limits), String::new()),
        Command::Exec => (exec(&config, &path), String::new()),
        _ => match read_source(&path) {
            Ok(src) => (run(&config, &path, &src), src),
            Err(e) => (Err(e), String::new()),
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprint!("{}", e.render(&path, &src));
            if e.span.is_none() {
                eprintln!();
            }
            ExitCode::FAILURE
        }
    }
}
