/// Value for an external variable of an architecture, from a `--var`
/// argument.
#[derive(Clone, Debug, PartialEq)]
pub struct VarBinding {
    pub name: String,
    pub value: i64,
}

impl VarBinding {
    /// Parse a binding in the form `name=value`.
    ///
    /// Names may be quoted, eg. `"my var"=4`.
    pub fn parse(spec: &str) -> Result<VarBinding, ParseError> {
        let tokens = tokenize(spec);
        let Some(eq_pos) = tokens.iter().position(|tok| matches!(tok, Token::Equals)) else {
            return Err(ParseError::new(
                spec,
                ParseErrorKind::InvalidFormat {
                    message: "expected <name>=<value> but no '=' was found".into(),
                },
            ));
        };

        let (name, value) = tokens.split_at(eq_pos);
        let [Token::Equals, Token::Text(value)] = value else {
            return Err(ParseError::new(
                spec,
                ParseErrorKind::InvalidFormat {
                    message: "expected binding to end with '=<value>'".into(),
                },
            ));
        };
        let [Token::Text(name)] = name else {
            return Err(ParseError::new(spec, ParseErrorKind::InvalidName));
        };

        let value = value
            .parse()
            .ok()
            .filter(|val: &i64| *val >= 1)
            .ok_or_else(|| ParseError::new(spec, ParseErrorKind::InvalidValue))?;

        Ok(VarBinding {
            name: name.clone(),
            value,
        })
    }

    /// Sort bindings by name, keeping only the last binding for each name.
    pub fn sort_dedup(bindings: &mut Vec<VarBinding>) {
        // `sort_by` is stable and `dedup_by` keeps the first entry, so reverse
        // to keep the last binding given.
        bindings.reverse();
        bindings.sort_by(|a, b| a.name.cmp(&b.name));
        bindings.dedup_by(|a, b| a.name == b.name);
    }
}

enum Token {
    Equals,
    Text(String),
}

fn tokenize(spec: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut in_quote = false;

    for ch in spec.chars() {
        match ch {
            '=' if !in_quote => tokens.push(Token::Equals),
            '"' => in_quote = !in_quote,
            ch => {
                if let Some(Token::Text(text)) = tokens.last_mut() {
                    text.push(ch);
                } else {
                    tokens.push(Token::Text(ch.into()));
                }
            }
        }
    }

    tokens
}

#[derive(Clone, Debug, PartialEq)]
#[allow(clippy::enum_variant_names)]
enum ParseErrorKind {
    InvalidFormat { message: String },
    InvalidName,
    InvalidValue,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParseError {
    spec: String,
    kind: ParseErrorKind,
}

impl ParseError {
    fn new(spec: &str, kind: ParseErrorKind) -> ParseError {
        ParseError {
            spec: spec.to_string(),
            kind,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ParseErrorKind::InvalidFormat { message } => write!(
                fmt,
                "invalid variable binding \"{}\": {}",
                self.spec, message
            ),
            ParseErrorKind::InvalidName => {
                write!(fmt, "invalid variable name in \"{}\"", self.spec)
            }
            ParseErrorKind::InvalidValue => write!(
                fmt,
                "invalid value in \"{}\". Must be an integer >= 1.",
                self.spec
            ),
        }
    }
}

impl std::error::Error for ParseError {}
