use expect_test::expect;
use homeplc_syntax::lexer::{lex_with_text, TokenKind};

fn non_trivia(source: &str) -> String {
    lex_with_text(source)
        .into_iter()
        .filter(|(token, _)| !token.kind.is_trivia())
        .map(|(token, text)| format!("{:?} {text:?}", token.kind))
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn keywords_ignore_case_and_comments_nest() {
    let source = "if In.up (* outer (* inner *) *) tHeN // tail\nEnd_If";
    let kinds: Vec<_> = lex_with_text(source)
        .into_iter()
        .map(|(token, _)| token.kind)
        .collect();
    assert_eq!(
        kinds
            .iter()
            .filter(|kind| **kind == TokenKind::BlockComment)
            .count(),
        1
    );
    assert!(kinds.contains(&TokenKind::LineComment));

    expect![[r#"
        KwIf "if"
        Ident "In"
        Dot "."
        Ident "up"
        KwThen "tHeN"
        KwEndIf "End_If""#]]
    .assert_eq(&non_trivia(source));
}

#[test]
fn literals() {
    expect![[r#"
        IntLiteral "16#FF"
        Comma ","
        IntLiteral "1_000"
        Comma ","
        RealLiteral "2.5"
        Comma ","
        TimeLiteral "T#1m30s"
        Comma ","
        TimeLiteral "time#100ms""#]]
    .assert_eq(&non_trivia("16#FF, 1_000, 2.5, T#1m30s, time#100ms"));
}

#[test]
fn case_ranges_split_into_dots() {
    expect![[r#"
        IntLiteral "1"
        Dot "."
        Dot "."
        IntLiteral "2"
        Colon ":""#]]
    .assert_eq(&non_trivia("1..2:"));
}

#[test]
fn unknown_characters_become_error_tokens() {
    let tokens = lex_with_text("x := $;");
    assert!(tokens
        .iter()
        .any(|(token, text)| token.kind == TokenKind::Error && *text == "$"));
}
