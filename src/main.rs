use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Parser, Subcommand};
use kiln::interp::{BufferedHost, Interpreter, StdioHost};
use log::{debug, info};

use mila::codegen::ENTRY_FUNCTION;
use mila::errors::pretty;
use mila::Compilation;

#[derive(Parser)]
#[command(name = "mila", version, about = "Compiler for the Mila language")]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile to an object file, optionally linking an executable
    Build {
        /// Source file; stdin when omitted
        file: Option<PathBuf>,
        #[arg(short, long, default_value = "output.o")]
        output: PathBuf,
        /// Link the object with the runtime into this executable
        #[arg(long)]
        exe: Option<PathBuf>,
    },
    /// Compile and execute `main`
    Run {
        file: Option<PathBuf>,
        /// JIT-compile instead of interpreting
        #[arg(long)]
        native: bool,
        /// Numbers handed to `readln` instead of reading stdin
        #[arg(long, num_args = 1.., allow_negative_numbers = true)]
        input: Vec<i32>,
    },
    /// Print the generated IR
    Ir { file: Option<PathBuf> },
    /// Interactive session
    Repl,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::Build { file, output, exe } => run_build(file.as_deref(), &output, exe.as_deref()),
        Command::Run {
            file,
            native,
            input,
        } => run_program(file.as_deref(), native, input),
        Command::Ir { file } => run_ir(file.as_deref()),
        Command::Repl => mila::repl::run().map_err(|err| format!("repl error: {}", err)),
    };

    if let Err(err) = result {
        eprintln!("{}", err);
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn read_source(file: Option<&Path>) -> Result<(String, String), String> {
    match file {
        Some(path) => {
            let source = fs::read_to_string(path)
                .map_err(|err| format!("failed to read '{}': {}", path.display(), err))?;
            let name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| "mila".to_string());
            Ok((name, source))
        }
        None => {
            let mut source = String::new();
            io::stdin()
                .read_to_string(&mut source)
                .map_err(|err| format!("failed to read stdin: {}", err))?;
            Ok(("stdin".to_string(), source))
        }
    }
}

/// Compile and print every diagnostic against the source.
fn compile(file: Option<&Path>) -> Result<Compilation, String> {
    let (name, source) = read_source(file)?;
    let compilation = mila::compile_source(&name, &source).map_err(|err| err.to_string())?;
    for diagnostic in &compilation.diagnostics {
        eprintln!("{}", pretty::render(&source, diagnostic));
    }
    Ok(compilation)
}

fn check_clean(compilation: &Compilation) -> Result<(), String> {
    match compilation.diagnostics.len() {
        0 => Ok(()),
        1 => Err("compilation reported 1 error".to_string()),
        n => Err(format!("compilation reported {} errors", n)),
    }
}

fn run_ir(file: Option<&Path>) -> Result<(), String> {
    let compilation = compile(file)?;
    print!("{}", compilation.module);
    check_clean(&compilation)
}

#[cfg(feature = "native")]
fn run_build(file: Option<&Path>, output: &Path, exe: Option<&Path>) -> Result<(), String> {
    use kiln::backend::cranelift::CraneliftBackend;
    use kiln::backend::Backend;

    let compilation = compile(file)?;
    let backend = CraneliftBackend::new();
    let bytes = backend
        .generate(&compilation.module)
        .map_err(|err| err.to_string())?;
    fs::write(output, bytes)
        .map_err(|err| format!("failed to write '{}': {}", output.display(), err))?;
    info!("wrote {} for {}", output.display(), backend.target());

    if let Some(exe) = exe {
        link_executable(output, exe)?;
        info!("linked {}", exe.display());
    }
    check_clean(&compilation)
}

#[cfg(not(feature = "native"))]
fn run_build(_file: Option<&Path>, _output: &Path, _exe: Option<&Path>) -> Result<(), String> {
    Err("this build of mila has no native backend; rebuild with --features native".to_string())
}

/// Link `object` against the C runtime with the system compiler (`$CC`,
/// else `cc`).
#[cfg(feature = "native")]
fn link_executable(object: &Path, exe: &Path) -> Result<(), String> {
    let dir = tempfile::tempdir().map_err(|err| format!("failed to create temp dir: {}", err))?;
    let runtime = dir.path().join("mila_runtime.c");
    fs::write(&runtime, kiln::backend::C_RUNTIME)
        .map_err(|err| format!("failed to write runtime: {}", err))?;

    let compiler = std::env::var("CC").unwrap_or_else(|_| "cc".to_string());
    debug!("linking with '{}'", compiler);
    let status = process::Command::new(&compiler)
        .arg(object)
        .arg(&runtime)
        .arg("-o")
        .arg(exe)
        .status()
        .map_err(|err| format!("failed to run '{}': {}", compiler, err))?;
    if !status.success() {
        return Err(format!("'{}' exited with {}", compiler, status));
    }
    Ok(())
}

fn run_program(file: Option<&Path>, native: bool, input: Vec<i32>) -> Result<(), String> {
    let compilation = compile(file)?;
    let code = if native {
        run_native(&compilation)?
    } else if input.is_empty() {
        let mut interpreter = Interpreter::new(&compilation.module, StdioHost);
        interpreter
            .run(ENTRY_FUNCTION)
            .map_err(|err| err.to_string())?
    } else {
        let mut interpreter =
            Interpreter::new(&compilation.module, BufferedHost::with_input(input));
        let code = interpreter
            .run(ENTRY_FUNCTION)
            .map_err(|err| err.to_string())?;
        for value in &interpreter.host().output {
            println!("{}", value);
        }
        code
    };
    debug!("main returned {}", code);
    check_clean(&compilation)
}

#[cfg(feature = "native")]
fn run_native(compilation: &Compilation) -> Result<i32, String> {
    kiln::backend::cranelift::CraneliftBackend::new()
        .run_main(&compilation.module)
        .map_err(|err| err.to_string())
}

#[cfg(not(feature = "native"))]
fn run_native(_compilation: &Compilation) -> Result<i32, String> {
    Err("this build of mila has no native backend; rebuild with --features native".to_string())
}
