use mila::lexer::token::{Operator, TokenKind};

fn kinds(source: &str) -> Vec<TokenKind> {
    mila::lexer::lex(source)
        .expect("lex should succeed")
        .into_iter()
        .map(|token| token.kind)
        .collect()
}

#[test]
fn lexes_assignment_statement() {
    assert_eq!(
        kinds("x := 42;"),
        vec![
            TokenKind::Identifier("x".to_string()),
            TokenKind::Op(Operator::Assign),
            TokenKind::Number(42),
            TokenKind::Semicolon,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn lexes_numbers_in_every_base() {
    assert_eq!(
        kinds("10 $1F &17"),
        vec![
            TokenKind::Number(10),
            TokenKind::Number(31),
            TokenKind::Number(15),
            TokenKind::Eof,
        ]
    );
}

#[test]
fn rejects_numbers_wider_than_32_bits() {
    let err = mila::lexer::lex("x := 4294967296;").unwrap_err();
    assert_eq!(err.line, 1);
    assert_eq!(err.column, 6);
    assert!(err.message.contains("32 bits"));
}

#[test]
fn lexes_comparison_spellings() {
    assert_eq!(
        kinds("a <= b >= c == d != e <> f = g"),
        vec![
            TokenKind::Identifier("a".to_string()),
            TokenKind::Op(Operator::LessEqual),
            TokenKind::Identifier("b".to_string()),
            TokenKind::Op(Operator::GreaterEqual),
            TokenKind::Identifier("c".to_string()),
            TokenKind::Op(Operator::Equal),
            TokenKind::Identifier("d".to_string()),
            TokenKind::Op(Operator::NotEqual),
            TokenKind::Identifier("e".to_string()),
            TokenKind::Op(Operator::NotEqual),
            TokenKind::Identifier("f".to_string()),
            TokenKind::Op(Operator::Assign),
            TokenKind::Identifier("g".to_string()),
            TokenKind::Eof,
        ]
    );
}

#[test]
fn keywords_are_case_sensitive() {
    let kinds = kinds("begin Begin end");
    assert_eq!(kinds[0], TokenKind::Begin);
    assert_eq!(kinds[1], TokenKind::Identifier("Begin".to_string()));
    assert_eq!(kinds[2], TokenKind::End);
}

#[test]
fn unknown_characters_become_operator_symbols() {
    assert_eq!(
        kinds("a Æ b | c"),
        vec![
            TokenKind::Identifier("a".to_string()),
            TokenKind::Op(Operator::Symbol('Æ')),
            TokenKind::Identifier("b".to_string()),
            TokenKind::Op(Operator::Symbol('|')),
            TokenKind::Identifier("c".to_string()),
            TokenKind::Eof,
        ]
    );
}

#[test]
fn skips_comments_and_tracks_lines() {
    let tokens = mila::lexer::lex("# header\nwriteln(1); # trailing\n  x").expect("lex");
    assert_eq!(tokens[0].kind, TokenKind::Identifier("writeln".to_string()));
    assert_eq!((tokens[0].line, tokens[0].column), (2, 1));
    let x = &tokens[tokens.len() - 2];
    assert_eq!(x.kind, TokenKind::Identifier("x".to_string()));
    assert_eq!((x.line, x.column), (3, 3));
}

#[test]
fn lexes_program_skeleton() {
    let kinds = kinds("program demo; begin end.");
    assert_eq!(
        kinds,
        vec![
            TokenKind::Program,
            TokenKind::Identifier("demo".to_string()),
            TokenKind::Semicolon,
            TokenKind::Begin,
            TokenKind::End,
            TokenKind::Dot,
            TokenKind::Eof,
        ]
    );
}
