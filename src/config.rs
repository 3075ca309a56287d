use crate::vm::VmLimits;
use strum::{Display, EnumString};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Command {
    Run,
    Check,
    Disasm,
    Compile,
    Exec,
    Repl,
}

impl Command {
    fn needs_input(self) -> bool {
        !matches!(self, Command::Repl)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown option '{0}'")]
    UnknownOption(String),
    #[error("option {0} expects a value")]
    MissingValue(String),
    #[error("invalid value '{value}' for {option}")]
    InvalidValue { option: String, value: String },
    #[error("'{0}' needs an input file")]
    MissingInput(Command),
    #[error("unexpected argument '{0}'")]
    UnexpectedArgument(String),
}

/// Command-line settings for `typhc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub command: Command,
    pub input: Option<String>,
    pub output: Option<String>,
    pub limits: VmLimits,
    /// Report stage timings.
    pub time: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            command: Command::Repl,
            input: None,
            output: None,
            limits: VmLimits::default(),
            time: false,
        }
    }
}

fn parse_limit(option: &str, value: Option<String>) -> Result<usize, ConfigError> {
    let value = value.ok_or_else(|| ConfigError::MissingValue(option.to_string()))?;
    value
        .parse::<usize>()
        .ok()
        .filter(|&n| n > 0)
        .ok_or(ConfigError::InvalidValue {
            option: option.to_string(),
            value,
        })
}

impl Config {
    /// Parses arguments after the program name.
    ///
    ///   typhc run prog.ty [--max-stack N] [--max-frames N] [--time]
    ///   typhc compile prog.ty -o prog.tyb
    ///   typhc exec prog.tyb
    ///   typhc            (REPL)
    pub fn from_args<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = Config::default();
        let mut args = args.into_iter().peekable();

        if let Some(first) = args.peek()
            && let Ok(command) = first.parse::<Command>()
        {
            config.command = command;
            args.next();
        }

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-o" | "--output" => {
                    config.output = Some(args.next().ok_or_else(|| ConfigError::MissingValue(arg.clone()))?);
                }
                "--max-stack" => config.limits.max_stack = parse_limit(&arg, args.next())?,
                "--max-frames" => config.limits.max_frames = parse_limit(&arg, args.next())?,
                "--time" => config.time = true,
                s if s.starts_with('-') => return Err(ConfigError::UnknownOption(arg)),
                _ if config.input.is_none() => {
                    // a bare file means `run`
                    if config.command == Command::Repl {
                        config.command = Command::Run;
                    }
                    config.input = Some(arg);
                }
                _ => return Err(ConfigError::UnexpectedArgument(arg)),
            }
        }

        if config.command.needs_input() && config.input.is_none() {
            return Err(ConfigError::MissingInput(config.command));
        }
        Ok(config)
    }
}

pub const USAGE: &str = "\
usage: typhc [command] [file] [options]

commands:
  run <file>        compile and execute, print the result value
  check <file>      type check only, print the result type
  disasm <file>     print the generated instructions
  compile <file>    write a compiled image (-o <out>, default out.tyb)
  exec <image>      execute a compiled image
  repl              interactive session (default)

options:
  --max-stack N     VM operand stack limit in words (default 1024)
  --max-frames N    VM call depth limit (default 256)
  --time            report stage timings
";
