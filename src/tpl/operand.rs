use crate::error::{Result, TemplateError};
use crate::tpl::{Arg, Expr, FilterCall, Operand, PathRoot};
use crate::value::Value;

/// Splits `text` on `sep`, ignoring separators inside quoted literals.
pub(crate) fn split_unquoted(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
            }
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == sep => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            None => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Parses `path[|filter[:arg]*]*`. Nothing is evaluated here.
pub(crate) fn parse_expr(text: &str) -> Result<Expr> {
    let mut pieces = split_unquoted(text, '|').into_iter();
    let head = pieces.next().unwrap_or_default();
    let mut path: Vec<String> = head.split('.').map(str::to_string).collect();

    let root = match path.first().and_then(|s| loop_depth(s)) {
        Some(depth) => {
            path.remove(0);
            PathRoot::Loop(depth)
        }
        None => PathRoot::Dict,
    };

    let filters = pieces.map(parse_filter).collect::<Result<Vec<_>>>()?;
    Ok(Expr {
        root,
        path,
        filters,
    })
}

// `%` -> 0, `%2` -> 2; anything else is an ordinary key.
fn loop_depth(segment: &str) -> Option<usize> {
    let rest = segment.strip_prefix('%')?;
    if rest.is_empty() {
        Some(0)
    } else {
        rest.parse().ok()
    }
}

fn parse_filter(piece: &str) -> Result<FilterCall> {
    let mut parts = split_unquoted(piece, ':').into_iter();
    let name = parts.next().unwrap_or_default().to_string();
    let args = parts.map(parse_arg).collect::<Result<Vec<_>>>()?;
    Ok(FilterCall { name, args })
}

/// A filter argument is a number, a quoted literal, or a nested path expression.
pub(crate) fn parse_arg(text: &str) -> Result<Arg> {
    let operand = match text.chars().next() {
        Some(c) if c.is_ascii_digit() || c == '-' || c == '+' => match parse_number(text) {
            Ok(v) => Operand::Literal(v),
            Err(reason) => Operand::Raw { reason },
        },
        Some('"') => Operand::Literal(Value::Str(parse_json_string(text, text)?)),
        Some('\'') => Operand::Literal(Value::Str(parse_single_quoted(text)?)),
        _ => Operand::Path(parse_expr(text)?),
    };
    Ok(Arg {
        text: text.to_string(),
        operand,
    })
}

// The error is kept as text: a filter may still read the argument verbatim.
fn parse_number(text: &str) -> std::result::Result<Value, String> {
    let digits = text.strip_prefix('+').unwrap_or(text);
    if let Ok(i) = digits.parse::<i64>() {
        return Ok(Value::Int(i));
    }
    digits
        .parse::<f64>()
        .map(Value::Float)
        .map_err(|e| e.to_string())
}

fn parse_json_string(json: &str, literal: &str) -> Result<String> {
    serde_json::from_str::<String>(json).map_err(|e| TemplateError::LiteralParse {
        literal: literal.to_string(),
        reason: e.to_string(),
    })
}

// Rewrites 'text' into "text" so the JSON parser handles every escape sequence.
fn parse_single_quoted(text: &str) -> Result<String> {
    let inner = match text.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')) {
        Some(inner) => inner,
        None => {
            return Err(TemplateError::LiteralParse {
                literal: text.to_string(),
                reason: "unterminated string".to_string(),
            });
        }
    };
    let mut json = String::with_capacity(inner.len() + 2);
    json.push('"');
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('\'') => json.push('\''),
                Some(n) => {
                    json.push('\\');
                    json.push(n);
                }
                None => json.push('\\'),
            },
            '"' => json.push_str("\\\""),
            c => json.push(c),
        }
    }
    json.push('"');
    parse_json_string(&json, text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_respects_quotes() {
        assert_eq!(split_unquoted("a|b:c", '|'), vec!["a", "b:c"]);
        assert_eq!(split_unquoted("eq:'a:b'", ':'), vec!["eq", "'a:b'"]);
        assert_eq!(split_unquoted(r#"eq:"x\"|y"|not"#, '|'), vec![r#"eq:"x\"|y""#, "not"]);
        assert_eq!(split_unquoted("", '|'), vec![""]);
    }

    #[test]
    fn test_parse_expr_path_and_filters() {
        let expr = parse_expr("user.name|safeHtml|sub:x.y").unwrap();
        assert_eq!(expr.root, PathRoot::Dict);
        assert_eq!(expr.path, vec!["user", "name"]);
        assert_eq!(expr.filters.len(), 2);
        assert_eq!(expr.filters[0].name, "safeHtml");
        assert!(expr.filters[0].args.is_empty());
        assert_eq!(expr.filters[1].args[0].text, "x.y");
    }

    #[test]
    fn test_parse_loop_roots() {
        let expr = parse_expr("%").unwrap();
        assert_eq!(expr.root, PathRoot::Loop(0));
        assert!(expr.path.is_empty());

        let expr = parse_expr("%2.name").unwrap();
        assert_eq!(expr.root, PathRoot::Loop(2));
        assert_eq!(expr.path, vec!["name"]);

        let expr = parse_expr("%x").unwrap();
        assert_eq!(expr.root, PathRoot::Dict);
        assert_eq!(expr.path, vec!["%x"]);
    }

    #[test]
    fn test_parse_literals() {
        match parse_arg("5").unwrap().operand {
            Operand::Literal(Value::Int(5)) => {}
            other => panic!("Expected Int, got {:?}", other),
        }
        match parse_arg("-2.5").unwrap().operand {
            Operand::Literal(Value::Float(f)) => assert_eq!(f, -2.5),
            other => panic!("Expected Float, got {:?}", other),
        }
        match parse_arg("+7").unwrap().operand {
            Operand::Literal(Value::Int(7)) => {}
            other => panic!("Expected Int, got {:?}", other),
        }
        match parse_arg(r#""a\nb""#).unwrap().operand {
            Operand::Literal(Value::Str(s)) => assert_eq!(s, "a\nb"),
            other => panic!("Expected Str, got {:?}", other),
        }
        match parse_arg(r#"'it\'s "ok"'"#).unwrap().operand {
            Operand::Literal(Value::Str(s)) => assert_eq!(s, "it's \"ok\""),
            other => panic!("Expected Str, got {:?}", other),
        }
        match parse_arg("limit").unwrap().operand {
            Operand::Path(expr) => assert_eq!(expr.path, vec!["limit"]),
            other => panic!("Expected Path, got {:?}", other),
        }
    }

    #[test]
    fn test_number_like_text_is_kept_raw() {
        for text in ["12abc", "0.name", "3px", "-"] {
            let arg = parse_arg(text).unwrap();
            assert_eq!(arg.text, text);
            assert!(matches!(arg.operand, Operand::Raw { .. }), "{} gave {:?}", text, arg.operand);
        }
    }

    #[test]
    fn test_bad_literals() {
        assert!(matches!(
            parse_arg("'open"),
            Err(TemplateError::LiteralParse { .. })
        ));
        assert!(matches!(
            parse_expr("x|eq:\"unterminated"),
            Err(TemplateError::LiteralParse { .. })
        ));
    }
}
