use kiln::interp::run_buffered;
use mila::codegen::ENTRY_FUNCTION;
use mila::errors::CompileError;
use mila::lexer::token::Operator;
use mila::session::Session;

fn session(source: &str) -> Session {
    let mut session = Session::from_source("pipeline", source).expect("lex should succeed");
    session.declare_io();
    session.run_pipeline().expect("no fatal errors");
    session
}

fn errors(session: &Session) -> Vec<CompileError> {
    session
        .diagnostics()
        .iter()
        .map(|diagnostic| diagnostic.error.clone())
        .collect()
}

#[test]
fn constant_used_in_function_and_protected_from_assignment() {
    let session = session(
        "const MAX = 10;\n\
         function limit(x: integer): integer;\n\
         begin\n  if x > MAX then MAX else x\nend;\n\
         writeln(limit(3));\n\
         writeln(limit(30));\n\
         MAX := 1;\n\
         writeln(MAX);",
    );
    assert_eq!(
        errors(&session),
        vec![CompileError::AssignToConstant("MAX".to_string())]
    );

    let module = session.finish().expect("module should verify");
    let (code, printed) = run_buffered(&module, ENTRY_FUNCTION, Vec::new()).unwrap();
    assert_eq!(code, 0);
    assert_eq!(printed, vec![3, 10, 10]);
}

#[test]
fn counting_loop_over_a_declared_variable() {
    let session = session(
        "program count;\n\
         var i: integer;\n\
         begin\n\
           for i := 1 to 3 do begin writeln(i); end;\n\
           writeln(i);\n\
         end.",
    );
    assert!(errors(&session).is_empty());

    let module = session.finish().expect("module should verify");
    let (_, printed) = run_buffered(&module, ENTRY_FUNCTION, Vec::new()).unwrap();
    // The global `i` is untouched by the loop's own binding.
    assert_eq!(printed, vec![1, 2, 3, 0]);
}

#[test]
fn user_defined_operator_becomes_available() {
    let mut session = session(
        "function binaryÆ(a: integer; b: integer): integer;\n\
         begin a * 10 + b end;",
    );
    assert!(session
        .context()
        .precedence
        .contains(Operator::Symbol('Æ')));
    assert_eq!(session.context().precedence.get(Operator::Symbol('Æ')), 30);

    session.push_source("var x, y: integer; x := 4; y := 2; writeln(x Æ y);").unwrap();
    session.run_pipeline().unwrap();
    assert!(errors(&session).is_empty());

    let module = session.finish().expect("module should verify");
    let (_, printed) = run_buffered(&module, ENTRY_FUNCTION, Vec::new()).unwrap();
    assert_eq!(printed, vec![42]);
}

#[test]
fn unknown_function_does_not_stop_compilation() {
    let session = session(
        "writeln(1);\n\
         foo(1, 2);\n\
         function bar(): integer; begin 7 end;\n\
         writeln(bar());",
    );
    assert_eq!(
        errors(&session),
        vec![CompileError::UnknownFunction("foo".to_string())]
    );
    assert_eq!(session.diagnostics()[0].line, 2);

    let module = session.finish().expect("module should verify");
    let (_, printed) = run_buffered(&module, ENTRY_FUNCTION, Vec::new()).unwrap();
    assert_eq!(printed, vec![1, 7]);
}

#[test]
fn compile_source_reports_lex_errors() {
    let err = mila::compile_source("bad", "writeln(99999999999);").unwrap_err();
    assert!(matches!(err, CompileError::Lex(_)));
}

#[test]
fn printed_ir_names_every_function() {
    let compilation = mila::compile_source(
        "printed",
        "var g: integer; function f(a: integer): integer; begin a + g end; writeln(f(1));",
    )
    .unwrap();
    let text = compilation.module.to_string();
    assert!(text.contains("global @g = 0"));
    assert!(text.contains("define i32 @f(i32 %a)"));
    assert!(text.contains("declare i32 @writeln(i32 %value)"));
    assert!(text.contains("define i32 @main()"));
}

#[cfg(feature = "native")]
mod native {
    use kiln::backend::cranelift::CraneliftBackend;
    use kiln::backend::Backend;

    #[test]
    fn object_file_is_emitted_for_a_program() {
        let compilation = mila::compile_source(
            "native",
            "function sq(x: integer): integer; begin x * x end; writeln(sq(9));",
        )
        .unwrap();
        assert!(compilation.is_clean());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("native.o");
        let bytes = CraneliftBackend::new().generate(&compilation.module).unwrap();
        std::fs::write(&path, &bytes).unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn jit_agrees_with_the_interpreter_on_exit_code() {
        let compilation = mila::compile_source(
            "jit",
            "var n: integer; for i := 1 to 4 do begin n := n + i; end;",
        )
        .unwrap();
        let code = CraneliftBackend::new().run_main(&compilation.module).unwrap();
        assert_eq!(code, 0);
    }
}
