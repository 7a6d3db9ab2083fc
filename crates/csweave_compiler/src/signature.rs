//! Pointcut signature parsing.
//!
//! Two grammars share the same token parsers. The lenient grammar accepts
//! any whitespace between tokens and is used to read a pointcut; the
//! canonical grammar only accepts the normalised spelling and is used to
//! re-check pointcut text during validation.

use crate::types::{MethodSignature, CONSTRUCTOR};
use chumsky::prelude::*;
use csweave_classpath::{Primitive, TypeName};
use thiserror::Error;

/// Shape every pointcut must follow in canonical form.
pub const CANONICAL_PATTERN: &str = "<type> <owner>.<method>(<type>, <type>, ...)";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot parse `{signature}`: found {offending}, expected {expected}")]
pub struct ParseFailure {
    pub signature: String,
    /// Offending text starting at the failure position.
    pub offending: String,
    pub expected: String,
    /// Character offset of the failure.
    pub position: usize,
}

/// Parses a pointcut, tolerating whitespace between tokens.
pub fn parse_signature(text: &str) -> Result<MethodSignature, ParseFailure> {
    signature_parser(Grammar::Lenient)
        .parse(text)
        .map_err(|errors| failure(text, errors))
}

/// Parses a pointcut written in canonical form.
///
/// `void java.lang.StringBuilder.<init>(java.lang.String)` is canonical,
/// `void java.lang.StringBuilder.<init>( java.lang.String )` is not.
pub fn parse_canonical(text: &str) -> Result<MethodSignature, ParseFailure> {
    signature_parser(Grammar::Canonical)
        .parse(text)
        .map_err(|errors| failure(text, errors))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grammar {
    Lenient,
    Canonical,
}

fn is_identifier_start(c: &char) -> bool {
    c.is_ascii_alphabetic() || *c == '_' || *c == '$'
}

fn is_identifier_part(c: &char) -> bool {
    c.is_ascii_alphanumeric() || *c == '_' || *c == '$'
}

fn identifier() -> impl Parser<char, String, Error = Simple<char>> + Clone {
    filter(is_identifier_start)
        .chain(filter(is_identifier_part).repeated())
        .collect::<String>()
        .labelled("identifier")
}

fn base_type(segments: &[String]) -> TypeName {
    if let [single] = segments {
        if single == "void" {
            return TypeName::Void;
        }
        if let Some(primitive) = Primitive::from_keyword(single) {
            return TypeName::Primitive(primitive);
        }
    }
    TypeName::Reference(segments.join("."))
}

fn type_name() -> impl Parser<char, TypeName, Error = Simple<char>> + Clone {
    let dimensions = just('[').then(just(']')).repeated();
    identifier()
        .separated_by(just('.'))
        .at_least(1)
        .then(dimensions)
        .map(|(segments, dimensions)| {
            let base = base_type(&segments);
            if dimensions.is_empty() {
                base
            } else {
                TypeName::array_of(base, dimensions.len())
            }
        })
        .labelled("type")
}

/// `Owner.method`, where the last segment may be `<init>`.
fn member() -> impl Parser<char, (TypeName, String), Error = Simple<char>> + Clone {
    let segment = identifier().or(just(CONSTRUCTOR).map(str::to_string));
    segment
        .separated_by(just('.'))
        .at_least(2)
        .try_map(|segments: Vec<String>, span| {
            let Some((name, owner)) = segments.split_last() else {
                return Err(Simple::custom(span, "owner and method name"));
            };
            if owner.iter().any(|segment| segment == CONSTRUCTOR) {
                return Err(Simple::custom(span, "`<init>` only as the method name"));
            }
            Ok((base_type(owner), name.clone()))
        })
        .labelled("owner and method name")
}

fn signature_parser(grammar: Grammar) -> BoxedParser<'static, char, MethodSignature, Simple<char>> {
    let whitespace = || filter(|c: &char| c.is_whitespace()).repeated().ignored();

    let (padding, gap, separator) = match grammar {
        Grammar::Lenient => (
            whitespace().boxed(),
            filter(|c: &char| c.is_whitespace())
                .repeated()
                .at_least(1)
                .ignored()
                .boxed(),
            just(',').padded_by(whitespace()).ignored().boxed(),
        ),
        Grammar::Canonical => (
            empty().boxed(),
            just(' ').ignored().boxed(),
            just(',').then(just(' ').or_not()).ignored().boxed(),
        ),
    };

    let parameters = just('(')
        .ignore_then(padding.clone())
        .ignore_then(type_name().separated_by(separator))
        .then_ignore(padding.clone())
        .then_ignore(just(')').labelled("')'"));

    padding
        .clone()
        .ignore_then(type_name())
        .then_ignore(gap)
        .then(member())
        .then_ignore(padding.clone())
        .then(parameters)
        .then_ignore(padding)
        .then_ignore(end())
        .map(|((return_type, (owner, name)), parameters)| MethodSignature {
            is_constructor: name == CONSTRUCTOR,
            return_type,
            owner,
            name,
            parameters,
        })
        .boxed()
}

fn failure(text: &str, errors: Vec<Simple<char>>) -> ParseFailure {
    let Some(error) = errors.into_iter().max_by_key(|error| error.span().start) else {
        return ParseFailure {
            signature: text.to_string(),
            offending: describe_offending(text, 0),
            expected: "signature".to_string(),
            position: 0,
        };
    };
    let position = error.span().start;
    ParseFailure {
        signature: text.to_string(),
        offending: describe_offending(text, position),
        expected: describe_expected(&error),
        position,
    }
}

fn describe_offending(text: &str, position: usize) -> String {
    let rest: String = text.chars().skip(position).collect();
    if rest.is_empty() {
        return "end of input".to_string();
    }
    let token: String = rest
        .chars()
        .enumerate()
        .take_while(|(index, c)| *index == 0 || !matches!(c, ' ' | ',' | '(' | ')'))
        .map(|(_, c)| c)
        .collect();
    format!("`{token}`")
}

fn describe_expected(error: &Simple<char>) -> String {
    if let chumsky::error::SimpleReason::Custom(message) = error.reason() {
        return message.clone();
    }
    if let Some(label) = error.label() {
        return label.to_string();
    }
    let mut expected: Vec<String> = error
        .expected()
        .map(|token| match token {
            Some(c) => format!("'{c}'"),
            None => "end of input".to_string(),
        })
        .collect();
    expected.sort();
    expected.dedup();
    if expected.is_empty() {
        "a valid signature".to_string()
    } else {
        expected.join(" or ")
    }
}
