pub mod error;
pub mod token;

use error::LexerError;
use nom::Parser;
use nom::bytes::complete::is_not;
use nom::character::complete::{digit1, line_ending, space0};
use nom::combinator::{not, opt, peek};
use nom::{
    IResult,
    branch::alt,
    bytes::complete::{escaped_transform, tag, take_while_m_n},
    character::complete::{alpha1, alphanumeric1, char, none_of},
    combinator::{map, map_opt, map_res, recognize, value},
    multi::many0,
    sequence::{delimited, pair, preceded},
};
use smol_str::SmolStr;
use token::{Token, TokenKind};

use crate::eval::module::ModuleId;
use crate::number::Number;
use crate::range::{Position, Range, Span};

macro_rules! define_token_parser {
    ($name:ident, $tag:expr, $kind:expr) => {
        fn $name(input: Span) -> IResult<Span, Token> {
            map(tag($tag), |span: Span| {
                let module_id = span.extra;
                Token {
                    range: span.into(),
                    kind: $kind,
                    module_id,
                }
            })
            .parse(input)
        }
    };
}

#[derive(Debug, Clone, Default)]
pub struct Lexer;

impl Lexer {
    pub fn new() -> Self {
        Self
    }

    /// Tokenizes `input`, appending a trailing `Eof` token.
    ///
    /// Stops at the first lexical error and classifies it by the character
    /// the scan got stuck on.
    pub fn tokenize(&self, input: &str, module_id: ModuleId) -> Result<Vec<Token>, LexerError> {
        match tokens(Span::new_extra(input, module_id)) {
            Ok((span, tokens)) if span.fragment().is_empty() => {
                let eof: Range = span.into();
                Ok([
                    tokens,
                    vec![Token {
                        range: eof,
                        kind: TokenKind::Eof,
                        module_id,
                    }],
                ]
                .concat())
            }
            Ok((span, _)) => Err(classify_error(span, module_id)),
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
                Err(classify_error(e.input, module_id))
            }
            Err(nom::Err::Incomplete(_)) => unreachable!(),
        }
    }
}

fn classify_error(span: Span, module_id: ModuleId) -> LexerError {
    let start: Position = span.into();
    let end = Position::new(start.line, start.column + 1);
    let token = Token {
        range: Range { start, end },
        kind: TokenKind::Eof,
        module_id,
    };

    match span.fragment().chars().next() {
        Some('"') => LexerError::UnterminatedString(token),
        Some(c) if c.is_ascii_digit() => {
            let lexeme: String = span
                .fragment()
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '.')
                .collect();
            LexerError::InvalidNumber(token, lexeme)
        }
        Some(c) => LexerError::InvalidChar(token, c),
        None => LexerError::InvalidChar(token, '\0'),
    }
}

fn unicode(input: Span) -> IResult<Span, char> {
    map_opt(
        map_res(
            preceded(
                char('u'),
                delimited(
                    char('{'),
                    take_while_m_n(1, 6, |c: char| c.is_ascii_hexdigit()),
                    char('}'),
                ),
            ),
            |span: Span| u32::from_str_radix(span.fragment(), 16),
        ),
        char::from_u32,
    )
    .parse(input)
}

fn inline_comment(input: Span) -> IResult<Span, Token> {
    map(
        preceded(char('#'), opt(is_not("\n\r"))),
        |span: Option<Span>| {
            let (module_id, range, text) = match span {
                Some(span) => (span.extra, span.into(), span.fragment().to_string()),
                None => {
                    let start: Position = input.into();
                    let end = Position::new(start.line, start.column + 1);
                    (input.extra, Range { start, end }, String::new())
                }
            };
            Token {
                range,
                kind: TokenKind::Comment(text),
                module_id,
            }
        },
    )
    .parse(input)
}

fn newline(input: Span) -> IResult<Span, Token> {
    map(line_ending, |span: Span| {
        let module_id = span.extra;
        Token {
            range: span.into(),
            kind: TokenKind::NewLine,
            module_id,
        }
    })
    .parse(input)
}

define_token_parser!(range_inclusive, "..=", TokenKind::RangeInclusive);
define_token_parser!(range_exclusive, "..", TokenKind::RangeExclusive);
define_token_parser!(eq_eq, "==", TokenKind::EqEq);
define_token_parser!(not_eq, "!=", TokenKind::NotEq);
define_token_parser!(lt_eq, "<=", TokenKind::LtEq);
define_token_parser!(gt_eq, ">=", TokenKind::GtEq);
define_token_parser!(and_and, "&&", TokenKind::AndAnd);
define_token_parser!(or_or, "||", TokenKind::OrOr);
define_token_parser!(arrow, "=>", TokenKind::Arrow);
define_token_parser!(equal, "=", TokenKind::Equal);
define_token_parser!(lt, "<", TokenKind::Lt);
define_token_parser!(gt, ">", TokenKind::Gt);
define_token_parser!(plus, "+", TokenKind::Plus);
define_token_parser!(minus, "-", TokenKind::Minus);
define_token_parser!(asterisk, "*", TokenKind::Asterisk);
define_token_parser!(slash, "/", TokenKind::Slash);
define_token_parser!(percent, "%", TokenKind::Percent);
define_token_parser!(caret, "^", TokenKind::Caret);
define_token_parser!(squared, "²", TokenKind::Superscript(2));
define_token_parser!(cubed, "³", TokenKind::Superscript(3));
define_token_parser!(not_, "!", TokenKind::Not);
define_token_parser!(comma, ",", TokenKind::Comma);
define_token_parser!(dot, ".", TokenKind::Dot);
define_token_parser!(semi_colon, ";", TokenKind::SemiColon);
define_token_parser!(colon, ":", TokenKind::Colon);
define_token_parser!(l_paren, "(", TokenKind::LParen);
define_token_parser!(r_paren, ")", TokenKind::RParen);
define_token_parser!(l_brace, "{", TokenKind::LBrace);
define_token_parser!(r_brace, "}", TokenKind::RBrace);
define_token_parser!(l_bracket, "[", TokenKind::LBracket);
define_token_parser!(r_bracket, "]", TokenKind::RBracket);
define_token_parser!(empty_string, "\"\"", TokenKind::StringLiteral(String::new()));

fn multi_char_operators(input: Span) -> IResult<Span, Token> {
    alt((
        range_inclusive,
        range_exclusive,
        eq_eq,
        not_eq,
        lt_eq,
        gt_eq,
        and_and,
        or_or,
        arrow,
    ))
    .parse(input)
}

fn single_char_operators(input: Span) -> IResult<Span, Token> {
    alt((
        equal, lt, gt, plus, minus, asterisk, slash, percent, caret, squared, cubed, not_,
    ))
    .parse(input)
}

fn punctuations(input: Span) -> IResult<Span, Token> {
    alt((
        comma, dot, semi_colon, colon, l_paren, r_paren, l_brace, r_brace, l_bracket, r_bracket,
    ))
    .parse(input)
}

fn digit_run(input: Span) -> IResult<Span, Span> {
    recognize(pair(digit1, many0(preceded(char('_'), digit1)))).parse(input)
}

fn number_literal(input: Span) -> IResult<Span, Token> {
    map_res(
        (
            recognize(pair(digit_run, opt(preceded(char('.'), digit_run)))),
            // a digit run glued to identifier characters is a malformed number
            not(peek(alt((alphanumeric1, tag("_"))))),
        ),
        |(span, _): (Span, ())| {
            span.fragment().replace('_', "").parse::<f64>().map(|n| {
                let module_id = span.extra;
                Token {
                    range: span.into(),
                    kind: TokenKind::NumberLiteral(Number::new(n)),
                    module_id,
                }
            })
        },
    )
    .parse(input)
}

fn string_literal(input: Span) -> IResult<Span, Token> {
    let (span, s) = delimited(
        char('"'),
        escaped_transform(
            none_of("\"\\"),
            '\\',
            alt((
                value('\\', char('\\')),
                value('\"', char('\"')),
                value('\r', char('r')),
                value('\n', char('n')),
                value('\t', char('t')),
                unicode,
            )),
        ),
        char('"'),
    )
    .parse(input)?;

    let mut range: Range = input.into();
    range.end = span.into();
    let module_id = input.extra;

    Ok((
        span,
        Token {
            range,
            kind: TokenKind::StringLiteral(s),
            module_id,
        },
    ))
}

fn literals(input: Span) -> IResult<Span, Token> {
    alt((number_literal, empty_string, string_literal)).parse(input)
}

fn keyword_or_ident(input: Span) -> IResult<Span, Token> {
    map(
        recognize(pair(
            alt((alpha1, tag("_"))),
            many0(alt((alphanumeric1, tag("_")))),
        )),
        |span: Span| {
            let module_id = span.extra;
            let kind = match *span.fragment() {
                "if" => TokenKind::If,
                "else" => TokenKind::Else,
                "match" => TokenKind::Match,
                "for" => TokenKind::For,
                "in" => TokenKind::In,
                "def" => TokenKind::Def,
                "fn" => TokenKind::Fn,
                "try" => TokenKind::Try,
                "catch" => TokenKind::Catch,
                "as" => TokenKind::As,
                "throw" => TokenKind::Throw,
                "use" => TokenKind::Use,
                "return" => TokenKind::Return,
                "true" => TokenKind::BoolLiteral(true),
                "false" => TokenKind::BoolLiteral(false),
                "nil" => TokenKind::NilLiteral,
                "None" => TokenKind::NoneLiteral,
                name => TokenKind::Ident(SmolStr::new(name)),
            };
            Token {
                range: span.into(),
                kind,
                module_id,
            }
        },
    )
    .parse(input)
}

fn token(input: Span) -> IResult<Span, Token> {
    alt((
        newline,
        inline_comment,
        literals,
        keyword_or_ident,
        multi_char_operators,
        punctuations,
        single_char_operators,
    ))
    .parse(input)
}

fn tokens(input: Span) -> IResult<Span, Vec<Token>> {
    many0(delimited(space0, token, space0)).parse(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn kinds(input: &str) -> Result<Vec<TokenKind>, LexerError> {
        Lexer::new()
            .tokenize(input, ModuleId::new(0))
            .map(|tokens| tokens.into_iter().map(|t| t.kind).collect())
    }

    #[rstest]
    #[case::call("print(42)", vec![
        TokenKind::Ident(SmolStr::new("print")),
        TokenKind::LParen,
        TokenKind::NumberLiteral(Number::new(42.0)),
        TokenKind::RParen,
        TokenKind::Eof,
    ])]
    #[case::underscore_number("1_000_000", vec![
        TokenKind::NumberLiteral(Number::new(1_000_000.0)),
        TokenKind::Eof,
    ])]
    #[case::float_with_separators("3.141_592", vec![
        TokenKind::NumberLiteral(Number::new(3.141_592)),
        TokenKind::Eof,
    ])]
    #[case::superscripts("x² + y³", vec![
        TokenKind::Ident(SmolStr::new("x")),
        TokenKind::Superscript(2),
        TokenKind::Plus,
        TokenKind::Ident(SmolStr::new("y")),
        TokenKind::Superscript(3),
        TokenKind::Eof,
    ])]
    #[case::ranges("1..5 1..=5", vec![
        TokenKind::NumberLiteral(Number::new(1.0)),
        TokenKind::RangeExclusive,
        TokenKind::NumberLiteral(Number::new(5.0)),
        TokenKind::NumberLiteral(Number::new(1.0)),
        TokenKind::RangeInclusive,
        TokenKind::NumberLiteral(Number::new(5.0)),
        TokenKind::Eof,
    ])]
    #[case::string_escapes(r#""a\n\t\"b""#, vec![
        TokenKind::StringLiteral("a\n\t\"b".to_string()),
        TokenKind::Eof,
    ])]
    #[case::unicode_escape(r#""\u{3042}""#, vec![
        TokenKind::StringLiteral("あ".to_string()),
        TokenKind::Eof,
    ])]
    #[case::empty_string("\"\"", vec![
        TokenKind::StringLiteral(String::new()),
        TokenKind::Eof,
    ])]
    #[case::keywords("if else match for in def fn try catch as throw use return", vec![
        TokenKind::If,
        TokenKind::Else,
        TokenKind::Match,
        TokenKind::For,
        TokenKind::In,
        TokenKind::Def,
        TokenKind::Fn,
        TokenKind::Try,
        TokenKind::Catch,
        TokenKind::As,
        TokenKind::Throw,
        TokenKind::Use,
        TokenKind::Return,
        TokenKind::Eof,
    ])]
    #[case::keyword_prefix_idents("iffy formal define", vec![
        TokenKind::Ident(SmolStr::new("iffy")),
        TokenKind::Ident(SmolStr::new("formal")),
        TokenKind::Ident(SmolStr::new("define")),
        TokenKind::Eof,
    ])]
    #[case::literal_keywords("true false nil None", vec![
        TokenKind::BoolLiteral(true),
        TokenKind::BoolLiteral(false),
        TokenKind::NilLiteral,
        TokenKind::NoneLiteral,
        TokenKind::Eof,
    ])]
    #[case::comparison_operators("== != <= >= < > && || =>", vec![
        TokenKind::EqEq,
        TokenKind::NotEq,
        TokenKind::LtEq,
        TokenKind::GtEq,
        TokenKind::Lt,
        TokenKind::Gt,
        TokenKind::AndAnd,
        TokenKind::OrOr,
        TokenKind::Arrow,
        TokenKind::Eof,
    ])]
    #[case::comment_then_code("# note\nx = 1", vec![
        TokenKind::Comment(" note".to_string()),
        TokenKind::NewLine,
        TokenKind::Ident(SmolStr::new("x")),
        TokenKind::Equal,
        TokenKind::NumberLiteral(Number::new(1.0)),
        TokenKind::Eof,
    ])]
    #[case::dot_access("json.parse", vec![
        TokenKind::Ident(SmolStr::new("json")),
        TokenKind::Dot,
        TokenKind::Ident(SmolStr::new("parse")),
        TokenKind::Eof,
    ])]
    #[case::use_std("use std/math", vec![
        TokenKind::Use,
        TokenKind::Ident(SmolStr::new("std")),
        TokenKind::Slash,
        TokenKind::Ident(SmolStr::new("math")),
        TokenKind::Eof,
    ])]
    fn test_tokenize(#[case] input: &str, #[case] expected: Vec<TokenKind>) {
        assert_eq!(kinds(input), Ok(expected));
    }

    #[rstest]
    #[case::unterminated("\"abc")]
    #[case::unterminated_with_escape("\"abc\\\"")]
    fn test_unterminated_string(#[case] input: &str) {
        assert!(matches!(
            kinds(input),
            Err(LexerError::UnterminatedString(_))
        ));
    }

    #[rstest]
    #[case("1__2")]
    #[case("12abc")]
    #[case("1_")]
    fn test_invalid_number(#[case] input: &str) {
        assert!(matches!(kinds(input), Err(LexerError::InvalidNumber(_, _))));
    }

    #[rstest]
    #[case("@", '@')]
    #[case("x & y", '&')]
    fn test_invalid_char(#[case] input: &str, #[case] expected: char) {
        match kinds(input) {
            Err(LexerError::InvalidChar(_, c)) => assert_eq!(c, expected),
            other => panic!("expected InvalidChar, got {:?}", other),
        }
    }

    #[test]
    fn test_error_position() {
        let err = Lexer::new().tokenize("x = 1\ny = @", ModuleId::new(0)).unwrap_err();
        let token = err.token();

        assert_eq!(token.range.start.line, 2);
        assert_eq!(token.range.start.column, 5);
    }
}
