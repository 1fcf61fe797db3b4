use std::error::Error;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::errors::pretty;
use crate::session::Session;

const MODULE_NAME: &str = "repl";

enum CommandAction {
    NotHandled,
    Handled,
    Exit,
}

/// Read lines, push each into one long-lived [`Session`] and show what the
/// module looks like afterwards.
pub fn run() -> Result<(), Box<dyn Error>> {
    let mut session = Session::new(MODULE_NAME, Vec::new());
    session.declare_io();
    let mut editor = DefaultEditor::new()?;

    println!("Mila REPL");
    println!("Commands: :ir, :help, :quit");

    loop {
        let line = match editor.readline("mila> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => return Err(Box::new(err)),
        };

        match handle_meta_command(line.trim(), &session) {
            CommandAction::NotHandled => {}
            CommandAction::Handled => continue,
            CommandAction::Exit => break,
        }
        if line.trim().is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(line.as_str());

        match feed_line(&mut session, &line) {
            Ok(report) => {
                for message in &report.diagnostics {
                    eprintln!("{}", message);
                }
                print!("{}", session.module());
            }
            Err(err) => {
                eprintln!("{}", err);
                if err.is_fatal() {
                    break;
                }
            }
        }
    }
    Ok(())
}

/// What one line of input produced.
#[derive(Debug, Default)]
pub struct LineReport {
    pub diagnostics: Vec<String>,
}

/// Lex `line`, run the pipeline over it and render any new diagnostics.
pub fn feed_line(
    session: &mut Session,
    line: &str,
) -> Result<LineReport, crate::errors::CompileError> {
    let seen = session.diagnostics().len();
    session.push_source(line)?;
    session.run_pipeline()?;

    let diagnostics = session.diagnostics()[seen..]
        .iter()
        .map(|diagnostic| pretty::render(line, diagnostic))
        .collect();
    Ok(LineReport { diagnostics })
}

fn handle_meta_command(input: &str, session: &Session) -> CommandAction {
    match input {
        ":quit" | ":q" => CommandAction::Exit,
        ":ir" => {
            print!("{}", session.module());
            CommandAction::Handled
        }
        ":help" => {
            println!("Enter Mila statements, declarations or functions.");
            println!(":ir    print the module built so far");
            println!(":quit  leave the REPL");
            CommandAction::Handled
        }
        _ => CommandAction::NotHandled,
    }
}
