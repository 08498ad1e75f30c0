use crate::lexer::*;

#[test]
fn test_tokenize_keywords() {
    let tokens = tokenize("function return const let if else import export default").unwrap();
    assert!(matches!(tokens[0].token, Token::Function));
    assert!(matches!(tokens[1].token, Token::Return));
    assert!(matches!(tokens[2].token, Token::Const));
    assert!(matches!(tokens[3].token, Token::Let));
    assert!(matches!(tokens[4].token, Token::If));
    assert!(matches!(tokens[5].token, Token::Else));
    assert!(matches!(tokens[6].token, Token::Import));
    assert!(matches!(tokens[7].token, Token::Export));
    assert!(matches!(tokens[8].token, Token::Default));
}

#[test]
fn test_keyword_prefix_is_identifier() {
    let tokens = tokenize("constant returned").unwrap();
    assert!(matches!(&tokens[0].token, Token::Identifier(s) if s == "constant"));
    assert!(matches!(&tokens[1].token, Token::Identifier(s) if s == "returned"));
}

#[test]
fn test_tokenize_identifiers() {
    let tokens = tokenize("useState $el _private NavDS").unwrap();
    assert!(matches!(&tokens[0].token, Token::Identifier(s) if s == "useState"));
    assert!(matches!(&tokens[1].token, Token::Identifier(s) if s == "$el"));
    assert!(matches!(&tokens[2].token, Token::Identifier(s) if s == "_private"));
    assert!(matches!(&tokens[3].token, Token::Identifier(s) if s == "NavDS"));
}

#[test]
fn test_tokenize_numbers() {
    let tokens = tokenize("0 42 3.5 1e3").unwrap();
    assert!(matches!(tokens[0].token, Token::Number(n) if n == 0.0));
    assert!(matches!(tokens[1].token, Token::Number(n) if n == 42.0));
    assert!(matches!(tokens[2].token, Token::Number(n) if n == 3.5));
    assert!(matches!(tokens[3].token, Token::Number(n) if n == 1000.0));
}

#[test]
fn test_tokenize_strings() {
    let tokens = tokenize(r#""hello" 'it\'s' "tab\there""#).unwrap();
    assert!(matches!(&tokens[0].token, Token::String(s) if s == "hello"));
    assert!(matches!(&tokens[1].token, Token::String(s) if s == "it's"));
    assert!(matches!(&tokens[2].token, Token::String(s) if s == "tab\there"));
}

#[test]
fn test_template_keeps_raw_body() {
    let tokens = tokenize("`count: ${n}`").unwrap();
    assert!(matches!(&tokens[0].token, Token::Template(s) if s == "count: ${n}"));
}

#[test]
fn test_longest_operator_wins() {
    let tokens = tokenize("=== !== => ?. ?? ... <= +=").unwrap();
    let kinds: Vec<_> = tokens.iter().map(|t| t.token.clone()).collect();
    assert_eq!(
        kinds,
        vec![
            Token::EqEqEq,
            Token::NotEqEq,
            Token::Arrow,
            Token::QuestionDot,
            Token::Nullish,
            Token::Ellipsis,
            Token::Le,
            Token::PlusEq,
            Token::Eof,
        ]
    );
}

#[test]
fn test_comments_skipped() {
    let tokens = tokenize("a // line\n/* block\n comment */ b").unwrap();
    assert_eq!(tokens.len(), 3);
    assert!(matches!(&tokens[1].token, Token::Identifier(s) if s == "b"));
}

#[test]
fn test_newline_tracking() {
    let tokens = tokenize("a b\nc").unwrap();
    assert!(!tokens[0].newline_before);
    assert!(!tokens[1].newline_before);
    assert!(tokens[2].newline_before);
}

#[test]
fn test_spans() {
    let tokens = tokenize("let total").unwrap();
    assert_eq!(tokens[0].span.start, 0);
    assert_eq!(tokens[0].span.end, 3);
    assert_eq!(tokens[1].span.start, 4);
    assert_eq!(tokens[1].span.end, 9);
}

#[test]
fn test_invalid_character() {
    let err = tokenize("let a = #;").unwrap_err();
    assert_eq!(err.message(), "Invalid or unexpected token");
    assert_eq!(err.span().start, 8);
}

#[test]
fn test_unterminated_string() {
    let err = tokenize("const s = \"open").unwrap_err();
    assert_eq!(err.message(), "Invalid or unexpected token");
}

#[test]
fn test_unicode_escape() {
    assert_eq!(unescape_str("\\u00e9t\\u00e9"), "\u{e9}t\u{e9}");
}
