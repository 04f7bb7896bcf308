//! LDAP-style filter expressions.
//!
//! Supports the subset of RFC 4515 used to pick target and source objects:
//!
//! ```text
//! filter   = "(" ( "&" filter+ | "|" filter+ | "!" filter | item ) ")"
//! item     = attr ( "=" | ">=" | "<=" | "~=" ) value
//!          | attr ":" rule ":=" number
//! ```
//!
//! `value` of `*` tests presence; other `*` characters are wildcards.
//! Matching rules `1.2.840.113556.1.4.803` (bitwise AND) and
//! `1.2.840.113556.1.4.804` (bitwise OR) are understood. All comparisons
//! ignore ASCII case.

use crate::error::QueryError;
use crate::object::Object;
use std::cmp::Ordering;

pub const MATCHING_RULE_BIT_AND: &str = "1.2.840.113556.1.4.803";
pub const MATCHING_RULE_BIT_OR: &str = "1.2.840.113556.1.4.804";

/// Deepest nesting of `&`, `|` and `!` the parser accepts.
pub const MAX_DEPTH: usize = 256;

/// A parsed filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    And(Vec<Query>),
    Or(Vec<Query>),
    Not(Box<Query>),
    Present(String),
    Equal { attribute: String, value: Pattern },
    GreaterOrEqual { attribute: String, value: String },
    LessOrEqual { attribute: String, value: String },
    BitwiseAnd { attribute: String, mask: i64 },
    BitwiseOr { attribute: String, mask: i64 },
}

/// Right-hand side of an equality match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    Exact(String),
    /// Literal segments between `*` wildcards; the first and last may be empty.
    Wildcard(Vec<String>),
}

impl Pattern {
    fn parse(value: &str) -> Self {
        if value.contains('*') {
            Pattern::Wildcard(value.split('*').map(|s| s.to_ascii_lowercase()).collect())
        } else {
            Pattern::Exact(value.to_string())
        }
    }

    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            Pattern::Exact(expected) => candidate.eq_ignore_ascii_case(expected),
            Pattern::Wildcard(segments) => wildcard_match(segments, &candidate.to_ascii_lowercase()),
        }
    }
}

fn wildcard_match(segments: &[String], candidate: &str) -> bool {
    let (first, rest) = match segments.split_first() {
        Some(split) => split,
        None => return true,
    };
    let Some(mut remaining) = candidate.strip_prefix(first.as_str()) else {
        return false;
    };
    let Some((last, middle)) = rest.split_last() else {
        return remaining.is_empty();
    };
    for segment in middle {
        match remaining.find(segment.as_str()) {
            Some(at) => remaining = &remaining[at + segment.len()..],
            None => return false,
        }
    }
    remaining.ends_with(last.as_str())
}

impl Query {
    /// Evaluates the filter against an object. Absent attributes make a
    /// term false.
    pub fn evaluate(&self, object: &Object) -> bool {
        match self {
            Query::And(terms) => terms.iter().all(|q| q.evaluate(object)),
            Query::Or(terms) => terms.iter().any(|q| q.evaluate(object)),
            Query::Not(term) => !term.evaluate(object),
            Query::Present(attribute) => !object.attribute(attribute).is_empty(),
            Query::Equal { attribute, value } => object
                .attribute(attribute)
                .iter()
                .any(|v| value.matches(&v.as_str())),
            Query::GreaterOrEqual { attribute, value } => object
                .attribute(attribute)
                .iter()
                .any(|v| compare(&v.as_str(), value) != Ordering::Less),
            Query::LessOrEqual { attribute, value } => object
                .attribute(attribute)
                .iter()
                .any(|v| compare(&v.as_str(), value) != Ordering::Greater),
            Query::BitwiseAnd { attribute, mask } => integers(object, attribute)
                .any(|v| v & mask == *mask),
            Query::BitwiseOr { attribute, mask } => integers(object, attribute)
                .any(|v| v & mask != 0),
        }
    }
}

fn integers<'a>(object: &'a Object, attribute: &str) -> impl Iterator<Item = i64> + 'a {
    object
        .attribute(attribute)
        .iter()
        .filter_map(|v| v.as_str().trim().parse::<i64>().ok())
}

/// Numeric when both sides are integers, otherwise case-insensitive text.
fn compare(actual: &str, expected: &str) -> Ordering {
    match (actual.trim().parse::<i64>(), expected.trim().parse::<i64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => actual
            .to_ascii_lowercase()
            .cmp(&expected.to_ascii_lowercase()),
    }
}

/// Parses one filter, returning it with the unconsumed remainder.
pub fn parse_query(input: &str) -> Result<(Query, &str), QueryError> {
    let mut parser = Parser {
        input,
        pos: 0,
        depth: 0,
    };
    let query = parser.filter()?;
    Ok((query, &input[parser.pos..]))
}

/// Parses a filter that must span the whole input.
pub fn parse_query_strict(input: &str) -> Result<Query, QueryError> {
    let (query, rest) = parse_query(input)?;
    if !rest.trim().is_empty() {
        return Err(QueryError::TrailingInput(input.len() - rest.len()));
    }
    Ok(query)
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn expect(&mut self, expected: char, unterminated_at: Option<usize>) -> Result<(), QueryError> {
        self.skip_whitespace();
        match self.peek() {
            Some(c) if c == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(found) => Err(QueryError::Expected {
                expected,
                found,
                position: self.pos,
            }),
            None => Err(match unterminated_at {
                Some(open) => QueryError::Unbalanced(open),
                None => QueryError::UnexpectedEnd(self.pos),
            }),
        }
    }

    fn filter(&mut self) -> Result<Query, QueryError> {
        self.expect('(', None)?;
        let open = self.pos - 1;
        self.skip_whitespace();

        let query = match self.peek() {
            Some(op @ ('&' | '|' | '!')) => {
                if self.depth >= MAX_DEPTH {
                    return Err(QueryError::TooDeep { offset: self.pos });
                }
                self.pos += 1;
                self.depth += 1;
                let query = match op {
                    '&' => self.filter_list(open).map(Query::And),
                    '|' => self.filter_list(open).map(Query::Or),
                    _ => self.filter().map(|inner| Query::Not(Box::new(inner))),
                };
                self.depth -= 1;
                query?
            }
            Some(_) => self.item(open)?,
            None => return Err(QueryError::Unbalanced(open)),
        };

        self.expect(')', Some(open))?;
        Ok(query)
    }

    fn filter_list(&mut self, open: usize) -> Result<Vec<Query>, QueryError> {
        let mut terms = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('(') => terms.push(self.filter()?),
                Some(_) => break,
                None => return Err(QueryError::Unbalanced(open)),
            }
        }
        if terms.is_empty() {
            return Err(QueryError::EmptyTerm(self.pos));
        }
        Ok(terms)
    }

    fn item(&mut self, open: usize) -> Result<Query, QueryError> {
        let start = self.pos;
        let rest = &self.input[start..];
        let end = match rest.find(|c: char| c == '(' || c == ')') {
            Some(at) if rest.as_bytes()[at] == b')' => at,
            Some(at) => return Err(QueryError::Unbalanced(start + at)),
            None => return Err(QueryError::Unbalanced(open)),
        };
        self.pos = start + end;
        parse_item(&rest[..end], start)
    }
}

fn parse_item(text: &str, position: usize) -> Result<Query, QueryError> {
    if text.trim().is_empty() {
        return Err(QueryError::EmptyTerm(position));
    }

    let Some(eq) = text.find('=') else {
        return Err(QueryError::UnknownOperator {
            operator: text.trim().to_string(),
            position,
        });
    };
    let lhs = &text[..eq];
    let value = unescape(&text[eq + 1..]);

    if let Some(lhs) = lhs.strip_suffix(':') {
        let (attribute, rule) = lhs.split_once(':').ok_or_else(|| {
            QueryError::UnknownMatchingRule(lhs.to_string())
        })?;
        let attribute = attribute_name(attribute, position)?;
        let mask = value
            .trim()
            .parse::<i64>()
            .map_err(|_| QueryError::InvalidNumber(value.clone()))?;
        return match rule.trim() {
            MATCHING_RULE_BIT_AND => Ok(Query::BitwiseAnd { attribute, mask }),
            MATCHING_RULE_BIT_OR => Ok(Query::BitwiseOr { attribute, mask }),
            other => Err(QueryError::UnknownMatchingRule(other.to_string())),
        };
    }

    let (attribute, operator) = match lhs.chars().last() {
        Some(op @ ('>' | '<' | '~')) => (&lhs[..lhs.len() - 1], Some(op)),
        Some(c) if is_attribute_char(c) => (lhs, None),
        Some(c) => {
            return Err(QueryError::UnknownOperator {
                operator: format!("{}=", c),
                position: position + eq - c.len_utf8(),
            })
        }
        None => return Err(QueryError::EmptyTerm(position)),
    };
    let attribute = attribute_name(attribute, position)?;

    Ok(match operator {
        Some('>') => Query::GreaterOrEqual { attribute, value },
        Some('<') => Query::LessOrEqual { attribute, value },
        // Approximate match is plain equality.
        _ if value == "*" => Query::Present(attribute),
        _ => Query::Equal {
            attribute,
            value: Pattern::parse(&value),
        },
    })
}

fn is_attribute_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ';' || c == '.'
}

fn attribute_name(raw: &str, position: usize) -> Result<String, QueryError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(QueryError::EmptyTerm(position));
    }
    if let Some(bad) = name.chars().find(|c| !is_attribute_char(*c)) {
        return Err(QueryError::UnknownOperator {
            operator: bad.to_string(),
            position,
        });
    }
    Ok(name.to_string())
}

/// Decodes `\XX` hex escapes; malformed escapes are kept verbatim.
fn unescape(value: &str) -> String {
    if !value.contains('\\') {
        return value.to_string();
    }
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_digit(bytes[i + 1]), hex_digit(bytes[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_digit(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::names;
    use proptest::prelude::*;

    fn user(uac: &str) -> Object {
        let mut o = Object::new("CN=alice,CN=Users,DC=example,DC=com");
        o.set_attribute(names::OBJECT_CLASS, ["top", "person", "user"]);
        o.set_attribute(names::NAME, ["Alice Smith"]);
        o.set_attribute(names::USER_ACCOUNT_CONTROL, [uac]);
        o
    }

    fn eval(filter: &str, object: &Object) -> bool {
        parse_query_strict(filter).unwrap().evaluate(object)
    }

    #[test]
    fn test_not_disabled_user() {
        let filter = "(&(objectClass=user)(!(userAccountControl=514)))";
        assert!(eval(filter, &user("512")));
        assert!(!eval(filter, &user("514")));
    }

    #[test]
    fn test_case_insensitive() {
        let o = user("512");
        assert!(eval("(OBJECTCLASS=USER)", &o));
        assert!(eval("(name=alice smith)", &o));
    }

    #[test]
    fn test_presence_and_absence() {
        let o = user("512");
        assert!(eval("(name=*)", &o));
        assert!(!eval("(description=*)", &o));
        assert!(!eval("(description=x)", &o));
        assert!(eval("(!(description=x))", &o));
    }

    #[test]
    fn test_wildcards() {
        let o = user("512");
        assert!(eval("(name=Alice*)", &o));
        assert!(eval("(name=*smith)", &o));
        assert!(eval("(name=a*e*h)", &o));
        assert!(!eval("(name=*bob*)", &o));
        assert!(!eval("(name=Smith*)", &o));
    }

    #[test]
    fn test_ordering() {
        let o = user("512");
        assert!(eval("(userAccountControl>=500)", &o));
        assert!(eval("(userAccountControl<=512)", &o));
        assert!(!eval("(userAccountControl<=100)", &o));
        assert!(eval("(name~=ALICE SMITH)", &o));
    }

    #[test]
    fn test_bitwise() {
        let disabled = user("514");
        let enabled = user("512");
        let filter = "(userAccountControl:1.2.840.113556.1.4.803:=2)";
        assert!(eval(filter, &disabled));
        assert!(!eval(filter, &enabled));
        assert!(eval("(userAccountControl:1.2.840.113556.1.4.804:=3)", &disabled));
        assert!(!eval("(userAccountControl:1.2.840.113556.1.4.804:=1)", &enabled));
    }

    #[test]
    fn test_escapes() {
        let mut o = user("512");
        o.set_attribute(names::NAME, ["a(b)"]);
        assert!(eval(r"(name=a\28b\29)", &o));
    }

    #[test]
    fn test_remainder() {
        let (q, rest) = parse_query("(name=x) trailing").unwrap();
        assert_eq!(
            q,
            Query::Equal {
                attribute: "name".into(),
                value: Pattern::Exact("x".into())
            }
        );
        assert_eq!(rest, " trailing");
        assert_eq!(
            parse_query_strict("(name=x) trailing"),
            Err(QueryError::TrailingInput(8))
        );
        assert!(parse_query_strict("(name=x)  ").is_ok());
    }

    #[test]
    fn test_nesting_limit() {
        let nested = |depth: usize| {
            format!("{}(name=x){}", "(!".repeat(depth), ")".repeat(depth))
        };

        assert!(parse_query_strict(&nested(200)).is_ok());
        assert!(parse_query_strict(&nested(MAX_DEPTH)).is_ok());
        assert_eq!(
            parse_query_strict(&nested(MAX_DEPTH + 1)),
            Err(QueryError::TooDeep {
                offset: MAX_DEPTH * 2 + 1
            })
        );
        assert!(matches!(
            parse_query_strict(&nested(100_000)),
            Err(QueryError::TooDeep { .. })
        ));

        let wide = format!("{}(name=x){}", "(&".repeat(100_000), ")".repeat(100_000));
        assert!(matches!(
            parse_query(&wide),
            Err(QueryError::TooDeep { .. })
        ));
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            parse_query_strict("(&(name=x)"),
            Err(QueryError::Unbalanced(0))
        ));
        assert!(matches!(
            parse_query_strict("(name=x"),
            Err(QueryError::Unbalanced(0))
        ));
        assert!(matches!(
            parse_query_strict("()"),
            Err(QueryError::EmptyTerm(_))
        ));
        assert!(matches!(
            parse_query_strict("(&)"),
            Err(QueryError::EmptyTerm(_))
        ));
        assert!(matches!(
            parse_query_strict("(name!=x)"),
            Err(QueryError::UnknownOperator { .. })
        ));
        assert!(matches!(
            parse_query_strict("(namex)"),
            Err(QueryError::UnknownOperator { .. })
        ));
        assert!(matches!(
            parse_query_strict("(a:1.2.3:=4)"),
            Err(QueryError::UnknownMatchingRule(_))
        ));
        assert!(matches!(
            parse_query_strict("(a:1.2.840.113556.1.4.803:=x)"),
            Err(QueryError::InvalidNumber(_))
        ));
        assert!(matches!(
            parse_query_strict("name=x"),
            Err(QueryError::Expected { expected: '(', .. })
        ));
        assert!(matches!(
            parse_query_strict(""),
            Err(QueryError::UnexpectedEnd(0))
        ));
    }

    proptest! {
        #[test]
        fn parse_never_panics(input in "\\PC{0,40}") {
            let _ = parse_query(&input);
        }

        #[test]
        fn negation_inverts(uac in 0u32..1024, candidate in 0u32..1024) {
            let o = user(&uac.to_string());
            let filter = format!("(userAccountControl={})", candidate);
            let negated = format!("(!{})", filter);
            prop_assert_eq!(eval(&filter, &o), !eval(&negated, &o));
            prop_assert_eq!(eval(&filter, &o), uac == candidate);
        }

        #[test]
        fn bitwise_and_matches_arithmetic(uac in 0i64..65536, mask in 1i64..65536) {
            let o = user(&uac.to_string());
            let filter = format!("(userAccountControl:1.2.840.113556.1.4.803:={})", mask);
            prop_assert_eq!(eval(&filter, &o), uac & mask == mask);
        }
    }
}
