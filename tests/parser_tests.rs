use mila::codegen::Context;
use mila::lexer::token::Operator;
use mila::parser::ast::{Direction, Expr, Item};
use mila::parser::Parser;

fn parse_items(source: &str) -> (Vec<Item>, Context) {
    let tokens = mila::lexer::lex(source).expect("lex should succeed");
    let mut parser = Parser::new(tokens);
    let mut ctx = Context::new("test");
    let mut items = Vec::new();
    loop {
        let item = parser.parse_item(&mut ctx).expect("parse should succeed");
        if item == Item::Eof {
            return (items, ctx);
        }
        items.push(item);
    }
}

fn parse_statement(source: &str) -> Expr {
    let (mut items, _) = parse_items(source);
    match items.remove(0) {
        Item::Statement(expr) => expr,
        other => panic!("expected a statement, got {:?}", other),
    }
}

fn var(name: &str) -> Box<Expr> {
    Box::new(Expr::Variable(name.to_string()))
}

fn binary(op: Operator, lhs: Box<Expr>, rhs: Box<Expr>) -> Box<Expr> {
    Box::new(Expr::Binary { op, lhs, rhs })
}

const LEVELS: [&[(&str, Operator)]; 3] = [
    &[
        ("<", Operator::Less),
        ("<=", Operator::LessEqual),
        (">", Operator::Greater),
        (">=", Operator::GreaterEqual),
        ("==", Operator::Equal),
        ("!=", Operator::NotEqual),
    ],
    &[("+", Operator::Plus), ("-", Operator::Minus)],
    &[("*", Operator::Star), ("/", Operator::Slash)],
];

#[test]
fn equal_precedence_folds_left() {
    for level in LEVELS {
        for &(first, first_op) in level {
            for &(second, second_op) in level {
                let source = format!("a {} b {} c", first, second);
                let expected = binary(second_op, binary(first_op, var("a"), var("b")), var("c"));
                assert_eq!(Box::new(parse_statement(&source)), expected, "{}", source);
            }
        }
    }
}

#[test]
fn tighter_operator_on_the_right_binds_first() {
    for (index, loose_level) in LEVELS.iter().enumerate() {
        for tight_level in &LEVELS[index + 1..] {
            for &(loose, loose_op) in loose_level.iter() {
                for &(tight, tight_op) in tight_level.iter() {
                    let source = format!("a {} b {} c", loose, tight);
                    let expected =
                        binary(loose_op, var("a"), binary(tight_op, var("b"), var("c")));
                    assert_eq!(Box::new(parse_statement(&source)), expected, "{}", source);
                }
            }
        }
    }
}

#[test]
fn assignment_binds_loosest() {
    let expected = binary(
        Operator::Assign,
        var("x"),
        binary(Operator::Plus, var("a"), var("b")),
    );
    assert_eq!(Box::new(parse_statement("x := a + b;")), expected);
}

#[test]
fn unregistered_symbol_ends_the_expression() {
    let (items, _) = parse_items("a | b");
    assert_eq!(items.len(), 2);
    assert_eq!(items[0], Item::Statement(Expr::Variable("a".to_string())));
    assert!(matches!(&items[1], Item::Statement(Expr::Unary { op: '|', .. })));
}

#[test]
fn registered_operator_takes_part_in_climbing() {
    let tokens = mila::lexer::lex("a | b * c").expect("lex");
    let mut parser = Parser::new(tokens);
    let mut ctx = Context::new("test");
    ctx.precedence.register(Operator::Symbol('|'), 50);

    let expr = match parser.parse_item(&mut ctx).expect("parse") {
        Item::Statement(expr) => expr,
        other => panic!("expected a statement, got {:?}", other),
    };
    let expected = binary(
        Operator::Star,
        binary(Operator::Symbol('|'), var("a"), var("b")),
        var("c"),
    );
    assert_eq!(Box::new(expr), expected);
}

#[test]
fn parses_var_section_forms() {
    let (items, _) = parse_items("var a, b : integer; c : integer; d, e: integer;");
    match &items[0] {
        Item::Var(section) => assert_eq!(section.names, vec!["a", "b", "c", "d", "e"]),
        other => panic!("expected var section, got {:?}", other),
    }
    assert_eq!(items.len(), 1);
}

#[test]
fn var_section_stops_before_a_statement() {
    let (items, _) = parse_items("var a : integer; a := 1;");
    assert_eq!(items.len(), 2);
    assert!(matches!(items[1], Item::Statement(Expr::Binary { .. })));
}

#[test]
fn const_section_records_names_while_parsing() {
    let (items, ctx) = parse_items("const MAX = 10; MIN = MAX - 10; writeln(MAX);");
    match &items[0] {
        Item::Const(section) => {
            let names: Vec<_> = section.entries.iter().map(|e| e.name.as_str()).collect();
            assert_eq!(names, vec!["MAX", "MIN"]);
        }
        other => panic!("expected const section, got {:?}", other),
    }
    assert!(ctx.consts.contains("MAX"));
    assert!(ctx.consts.contains("MIN"));
    assert!(matches!(items[1], Item::Statement(Expr::Call { .. })));
}

#[test]
fn parses_function_with_locals() {
    let source = "function sum(a: integer; b: integer): integer;\n\
                  var t: integer;\n\
                  begin\n  t := a + b;\n  t\nend;";
    let (items, _) = parse_items(source);
    match &items[0] {
        Item::Function(function) => {
            assert_eq!(function.proto.name, "sum");
            assert_eq!(function.proto.params, vec!["a", "b"]);
            assert!(!function.proto.is_procedure);
            assert_eq!(function.body.len(), 3);
            assert!(matches!(function.body[0], Expr::Var(_)));
        }
        other => panic!("expected function, got {:?}", other),
    }
}

#[test]
fn parses_forward_declarations() {
    let (items, _) = parse_items(
        "function isodd(n: integer): integer; forward;\nforward procedure report(n: integer);",
    );
    match (&items[0], &items[1]) {
        (Item::Forward(odd), Item::Forward(report)) => {
            assert_eq!(odd.name, "isodd");
            assert!(!odd.is_procedure);
            assert_eq!(report.name, "report");
            assert!(report.is_procedure);
        }
        other => panic!("expected two forward declarations, got {:?}", other),
    }
}

#[test]
fn parses_operator_prototypes() {
    let (items, _) = parse_items(
        "function binary| 5 (a: integer; b: integer): integer; begin a end;\n\
         function unary!(v: integer): integer; begin 0 - v end;",
    );
    match (&items[0], &items[1]) {
        (Item::Function(bin), Item::Function(un)) => {
            assert_eq!(bin.proto.name, "binary|");
            assert!(bin.proto.is_binary_op());
            assert_eq!(bin.proto.precedence, 5);
            assert_eq!(un.proto.name, "unary!");
            assert!(un.proto.is_unary_op());
            assert_eq!(un.proto.operator_char(), Some('!'));
        }
        other => panic!("expected two functions, got {:?}", other),
    }
}

#[test]
fn rejects_operator_with_wrong_operand_count() {
    let tokens = mila::lexer::lex("function binary% (a: integer): integer; begin a end;").expect("lex");
    let mut parser = Parser::new(tokens);
    let mut ctx = Context::new("test");
    let err = parser.parse_item(&mut ctx).unwrap_err();
    assert!(err.message.contains("needs 2 operand(s)"));
}

#[test]
fn rejects_out_of_range_precedence() {
    let tokens =
        mila::lexer::lex("function binary% 101 (a: integer; b: integer): integer; begin a end;")
            .expect("lex");
    let mut parser = Parser::new(tokens);
    let mut ctx = Context::new("test");
    let err = parser.parse_item(&mut ctx).unwrap_err();
    assert!(err.message.contains("1..100"));
}

#[test]
fn parses_if_with_semicolon_before_else() {
    let expr = parse_statement("if x > 0 then writeln(1); else writeln(2);");
    match expr {
        Expr::If {
            then_branch,
            else_branch,
            ..
        } => {
            assert_eq!(then_branch.len(), 1);
            assert!(else_branch.is_some());
        }
        other => panic!("expected if, got {:?}", other),
    }
}

#[test]
fn parses_for_loops_with_direction_and_step() {
    let expr = parse_statement("for i := 10 downto 1 step 2 do begin writeln(i); end;");
    match expr {
        Expr::For {
            var,
            direction,
            step,
            body,
            ..
        } => {
            assert_eq!(var, "i");
            assert_eq!(direction, Direction::Down);
            assert_eq!(step, Some(Box::new(Expr::Number(2))));
            assert_eq!(body.len(), 1);
        }
        other => panic!("expected for loop, got {:?}", other),
    }
}

#[test]
fn program_header_and_main_block_are_transparent() {
    let (items, _) = parse_items("program demo;\nbegin\n  writeln(1);\nend.");
    assert_eq!(items.len(), 1);
    assert!(matches!(items[0], Item::Statement(Expr::Call { .. })));
}

#[test]
fn const_inside_a_block_is_rejected() {
    let tokens = mila::lexer::lex("if 1 then begin const A = 1; end").expect("lex");
    let mut parser = Parser::new(tokens);
    let mut ctx = Context::new("test");
    let err = parser.parse_item(&mut ctx).unwrap_err();
    assert!(err.message.contains("module level"));
}
