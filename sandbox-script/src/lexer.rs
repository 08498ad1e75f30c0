use crate::error::{Result, ScriptError, Span};
use logos::Logos;

/// Tokens of the component script language
///
/// JSX text and tag names are not tokenized here; the parser scans them
/// directly from the source and resumes lexing afterwards.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
pub enum Token {
    // Keywords
    #[token("function")]
    Function,
    #[token("return")]
    Return,
    #[token("const")]
    Const,
    #[token("let")]
    Let,
    #[token("var")]
    Var,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("for")]
    For,
    #[token("new")]
    New,
    #[token("typeof")]
    Typeof,
    #[token("throw")]
    Throw,
    #[token("import")]
    Import,
    #[token("export")]
    Export,
    #[token("default")]
    Default,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    // Identifiers and literals
    #[regex(r"[a-zA-Z_$][a-zA-Z0-9_$]*", |lex| lex.slice().to_string())]
    Identifier(String),

    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),

    #[regex(r#""([^"\\\n]|\\.)*""#, unescape)]
    #[regex(r#"'([^'\\\n]|\\.)*'"#, unescape)]
    String(String),

    /// Raw template body between the backticks; interpolations are parsed later
    #[regex(r"`([^`\\]|\\.)*`", |lex| {
        let s = lex.slice();
        s[1..s.len() - 1].to_string()
    })]
    Template(String),

    // Operators
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("==")]
    EqEq,
    #[token("===")]
    EqEqEq,
    #[token("!=")]
    NotEq,
    #[token("!==")]
    NotEqEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("??")]
    Nullish,
    #[token("!")]
    Bang,
    #[token("=")]
    Eq,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("=>")]
    Arrow,
    #[token("?")]
    Question,
    #[token("?.")]
    QuestionDot,
    #[token("...")]
    Ellipsis,

    // Delimiters
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,

    // Punctuation
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,

    // End of file
    Eof,
}

fn unescape(lex: &mut logos::Lexer<Token>) -> String {
    let s = lex.slice();
    unescape_str(&s[1..s.len() - 1])
}

/// Resolve backslash escapes in a string or template segment
pub fn unescape_str(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(ch) => out.push(ch),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some('\n') => {}
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }

    out
}

impl Token {
    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            Token::Function
                | Token::Return
                | Token::Const
                | Token::Let
                | Token::Var
                | Token::If
                | Token::Else
                | Token::For
                | Token::New
                | Token::Typeof
                | Token::Throw
                | Token::Import
                | Token::Export
                | Token::Default
                | Token::True
                | Token::False
                | Token::Null
        )
    }
}

/// A token with its source span
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
    /// A line break separates this token from the previous one
    pub newline_before: bool,
}

impl SpannedToken {
    pub fn new(token: Token, span: Span) -> Self {
        Self {
            token,
            span,
            newline_before: false,
        }
    }
}

/// Tokenize a whole source string
///
/// The parser lexes lazily so that it can switch into JSX scanning; this
/// helper is for callers that want the plain token stream.
pub fn tokenize(source: &str) -> Result<Vec<SpannedToken>> {
    let mut lex = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut last_end = 0;

    while let Some(token_result) = lex.next() {
        let span = Span::new(lex.span().start, lex.span().end);

        match token_result {
            Ok(token) => {
                let newline_before = source[last_end..span.start].contains('\n');
                tokens.push(SpannedToken {
                    token,
                    span,
                    newline_before,
                });
                last_end = span.end;
            }
            Err(_) => {
                return Err(ScriptError::lexer(span, "Invalid or unexpected token"));
            }
        }
    }

    tokens.push(SpannedToken::new(
        Token::Eof,
        Span::new(source.len(), source.len()),
    ));
    Ok(tokens)
}
