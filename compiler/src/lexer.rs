// Lexer for .tir textual IR.
//
// Tokenizes IR text with the `logos` crate. Type literals are parsed
// entirely in lexer callbacks, so the parser only ever sees a finished
// `Type`.
//
// Preconditions: input is valid UTF-8.
// Postconditions: returns all tokens with byte-offset spans, plus any lex
//   errors.
// Failure modes: unrecognized characters produce `LexError`; lexing
//   continues.
// Side effects: none.

use logos::Logos;
use std::fmt;

use crate::diag::Span;
use crate::ir::{DimSize, ElemType, Type};

/// A lexer error with location.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub span: Span,
    pub message: String,
}

/// Result of lexing: tokens plus any errors (non-fatal).
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<(Token, Span)>,
    pub errors: Vec<LexError>,
}

/// .tir token types.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+|//[^\n]*")]
pub enum Token {
    // ── Keywords ──
    #[token("func")]
    Func,
    #[token("for")]
    For,
    #[token("to")]
    To,
    #[token("step")]
    Step,
    #[token("return")]
    Return,
    #[token("store")]
    Store,
    #[token("fill")]
    Fill,

    // ── Symbols ──
    #[token("=")]
    Equals,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,

    // ── Type literals ──
    //
    // Array types are lexed whole so dims and element type are resolved
    // here, e.g. `tensor<1x?x4xf32>` or `buffer<2x3xf64>`.
    #[token("index", |_| Type::Index)]
    #[token("bool", |_| Type::Bool)]
    #[token("f32", |_| Type::Scalar(ElemType::F32))]
    #[token("f64", |_| Type::Scalar(ElemType::F64))]
    #[token("i32", |_| Type::Scalar(ElemType::I32))]
    #[regex(r"(tensor|buffer)<([0-9]+|\?)(x([0-9]+|\?))*x(f32|f64|i32)>", parse_array_ty)]
    #[regex(r"shape<[0-9]+>", parse_shape_ty)]
    Ty(Type),

    // ── References and literals ──
    /// Value reference including the sigil, e.g. `%arg0` or `%3`.
    #[regex(r"%[A-Za-z0-9_]+", |lex| lex.slice().to_string())]
    ValueRef(String),

    /// Function name without the sigil, e.g. `@main` lexes as `main`.
    #[regex(r"@[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice()[1..].to_string())]
    FuncName(String),

    #[regex(r"-?[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", parse_number)]
    Number(f64),

    /// Operation name (e.g. `broadcast_to`, `matmul_acc`).
    #[regex(r"[a-z_][a-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
}

fn parse_number(lex: &mut logos::Lexer<Token>) -> Option<f64> {
    lex.slice().parse().ok()
}

fn parse_array_ty(lex: &mut logos::Lexer<Token>) -> Option<Type> {
    let slice = lex.slice();
    let is_tensor = slice.starts_with("tensor");
    let open = slice.find('<')?;
    let inner = &slice[open + 1..slice.len() - 1];
    let mut dims = Vec::new();
    let mut elem = None;
    for part in inner.split('x') {
        match part {
            "?" => dims.push(DimSize::Dynamic),
            "f32" => elem = Some(ElemType::F32),
            "f64" => elem = Some(ElemType::F64),
            "i32" => elem = Some(ElemType::I32),
            n => dims.push(DimSize::Fixed(n.parse().ok()?)),
        }
    }
    let elem = elem?;
    Some(if is_tensor {
        Type::tensor(dims, elem)
    } else {
        Type::buffer(dims, elem)
    })
}

fn parse_shape_ty(lex: &mut logos::Lexer<Token>) -> Option<Type> {
    let slice = lex.slice();
    let rank: usize = slice[6..slice.len() - 1].parse().ok()?;
    Some(Type::Shape { rank })
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Func => write!(f, "func"),
            Token::For => write!(f, "for"),
            Token::To => write!(f, "to"),
            Token::Step => write!(f, "step"),
            Token::Return => write!(f, "return"),
            Token::Store => write!(f, "store"),
            Token::Fill => write!(f, "fill"),
            Token::Equals => write!(f, "="),
            Token::Colon => write!(f, ":"),
            Token::Comma => write!(f, ","),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Ty(t) => write!(f, "{}", t),
            Token::ValueRef(name) => write!(f, "{}", name),
            Token::FuncName(name) => write!(f, "@{}", name),
            Token::Number(n) => write!(f, "{}", n),
            Token::Ident(name) => write!(f, "{}", name),
        }
    }
}

/// Tokenize a .tir source string.
pub fn lex(source: &str) -> LexResult {
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    for (result, range) in Token::lexer(source).spanned() {
        let span = Span::new(range.start, range.end);
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => errors.push(LexError {
                span,
                message: format!("unrecognized token '{}'", &source[range]),
            }),
        }
    }
    LexResult { tokens, errors }
}
