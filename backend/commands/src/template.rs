/// Scoped expression templates.
///
/// A template is literal text with `${expression}` segments. Expressions are
/// parsed once, at compile time, against a fixed set of binding names; any
/// other identifier is rejected before the template can ever run.
///
/// Supported expressions:
/// - a binding: `args`, `body`
/// - member access: `body.name`, `body["first name"]`, `body.items[0]`
/// - optional access: `body.owner?.login` (absent instead of an error)
/// - string and number literals: `"n/a"`, `0`
/// - fallback: `args.city || "Singapore"`
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("{message} at offset {offset}")]
    Compile { offset: usize, message: String },

    #[error("{0}")]
    Eval(String),
}

fn compile_err(offset: usize, message: impl Into<String>) -> TemplateError {
    TemplateError::Compile {
        offset,
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// AST
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Path { root: String, steps: Vec<Step> },
    Literal(Value),
    Or(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
struct Step {
    access: Access,
    optional: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum Access {
    Key(String),
    Index(usize),
}

impl std::fmt::Display for Access {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Access::Key(k) => write!(f, "{k}"),
            Access::Index(i) => write!(f, "{i}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// Values bound to template identifiers for one evaluation.
#[derive(Debug, Default)]
pub struct Scope<'a> {
    bindings: Vec<(&'a str, &'a Value)>,
}

impl<'a> Scope<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, name: &'a str, value: &'a Value) -> Self {
        self.bindings.push((name, value));
        self
    }

    fn get(&self, name: &str) -> Option<&'a Value> {
        self.bindings
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
    }
}

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Compile `source`, allowing only the identifiers in `bindings`.
    pub fn compile(source: &str, bindings: &[&str]) -> Result<Self, TemplateError> {
        let mut parser = Parser {
            chars: source.chars().collect(),
            pos: 0,
            bindings,
        };
        let segments = parser.segments()?;
        Ok(Self { segments })
    }

    /// A template that always renders `text`.
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            segments: vec![Segment::Literal(text.into())],
        }
    }

    pub fn render(&self, scope: &Scope<'_>) -> Result<String, TemplateError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Expr(expr) => {
                    if let Some(value) = eval(expr, scope)? {
                        push_value(&mut out, &value);
                    }
                }
            }
        }
        Ok(out)
    }
}

fn eval(expr: &Expr, scope: &Scope<'_>) -> Result<Option<Value>, TemplateError> {
    match expr {
        Expr::Literal(v) => Ok(Some(v.clone())),
        Expr::Or(left, right) => match eval(left, scope)? {
            Some(v) if truthy(&v) => Ok(Some(v)),
            _ => eval(right, scope),
        },
        Expr::Path { root, steps } => {
            let mut current = scope.get(root);
            let mut label = root.clone();
            for step in steps {
                let base = match current {
                    Some(Value::Null) | None if step.optional => return Ok(None),
                    Some(Value::Null) => {
                        return Err(TemplateError::Eval(format!(
                            "cannot read `{}` of null (`{label}`)",
                            step.access
                        )));
                    }
                    None => {
                        return Err(TemplateError::Eval(format!(
                            "cannot read `{}` of undefined (`{label}`)",
                            step.access
                        )));
                    }
                    Some(v) => v,
                };
                current = match (&step.access, base) {
                    (Access::Key(k), Value::Object(map)) => map.get(k),
                    (Access::Index(i), Value::Array(items)) => items.get(*i),
                    (Access::Key(k), Value::Array(items)) => match k.parse::<usize>() {
                        Ok(i) => items.get(i),
                        Err(_) => None,
                    },
                    (Access::Index(i), Value::Object(map)) => map.get(&i.to_string()),
                    _ => None,
                };
                label.push('.');
                label.push_str(&step.access.to_string());
            }
            Ok(current.cloned())
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn push_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => {}
        Value::String(s) => out.push_str(s),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => {
                out.push_str(&(f as i64).to_string())
            }
            _ => out.push_str(&n.to_string()),
        },
        other => out.push_str(&other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser<'b> {
    chars: Vec<char>,
    pos: usize,
    bindings: &'b [&'b str],
}

impl Parser<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn segments(&mut self) -> Result<Vec<Segment>, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();

        while let Some(c) = self.peek() {
            match c {
                '\\' => {
                    self.pos += 1;
                    match self.peek() {
                        Some('n') => literal.push('\n'),
                        Some('t') => literal.push('\t'),
                        Some(e @ ('$' | '\\' | '`' | '{' | '}')) => literal.push(e),
                        Some(other) => {
                            literal.push('\\');
                            literal.push(other);
                        }
                        None => {
                            literal.push('\\');
                            continue;
                        }
                    }
                    self.pos += 1;
                }
                '$' if self.peek_at(1) == Some('{') => {
                    let start = self.pos;
                    self.pos += 2;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    self.skip_ws();
                    if self.peek() == Some('}') {
                        return Err(compile_err(start, "empty expression"));
                    }
                    let expr = self.expr()?;
                    self.skip_ws();
                    match self.peek() {
                        Some('}') => self.pos += 1,
                        Some(other) => {
                            return Err(compile_err(
                                self.pos,
                                format!("unexpected `{other}` in expression"),
                            ));
                        }
                        None => return Err(compile_err(start, "unterminated `${`")),
                    }
                    segments.push(Segment::Expr(expr));
                }
                _ => {
                    literal.push(c);
                    self.pos += 1;
                }
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(segments)
    }

    fn expr(&mut self) -> Result<Expr, TemplateError> {
        let mut left = self.primary()?;
        loop {
            self.skip_ws();
            if self.peek() == Some('|') && self.peek_at(1) == Some('|') {
                self.pos += 2;
                let right = self.primary()?;
                left = Expr::Or(Box::new(left), Box::new(right));
            } else {
                return Ok(left);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, TemplateError> {
        self.skip_ws();
        match self.peek() {
            Some(q @ ('"' | '\'')) => Ok(Expr::Literal(Value::String(self.string(q)?))),
            Some(c) if c.is_ascii_digit() => self.number(),
            Some(c) if is_ident_start(c) => self.path(),
            Some(c) => Err(compile_err(self.pos, format!("unexpected `{c}` in expression"))),
            None => Err(compile_err(self.pos, "unterminated `${`")),
        }
    }

    fn ident(&mut self) -> Result<String, TemplateError> {
        let start = self.pos;
        if !self.peek().is_some_and(is_ident_start) {
            return Err(compile_err(start, "expected identifier"));
        }
        while self.peek().is_some_and(is_ident_continue) {
            self.pos += 1;
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn path(&mut self) -> Result<Expr, TemplateError> {
        let start = self.pos;
        let root = self.ident()?;
        if !self.bindings.contains(&root.as_str()) {
            return Err(compile_err(
                start,
                format!(
                    "`{root}` is not defined; available: {}",
                    self.bindings.join(", ")
                ),
            ));
        }

        let mut steps = Vec::new();
        loop {
            self.skip_ws();
            let optional = self.peek() == Some('?') && self.peek_at(1) == Some('.');
            if optional {
                self.pos += 2;
                self.skip_ws();
                if self.peek() == Some('[') {
                    steps.push(Step {
                        access: self.bracket()?,
                        optional,
                    });
                } else {
                    steps.push(Step {
                        access: Access::Key(self.ident()?),
                        optional,
                    });
                }
                continue;
            }
            match self.peek() {
                Some('.') => {
                    self.pos += 1;
                    self.skip_ws();
                    steps.push(Step {
                        access: Access::Key(self.ident()?),
                        optional: false,
                    });
                }
                Some('[') => steps.push(Step {
                    access: self.bracket()?,
                    optional: false,
                }),
                _ => break,
            }
        }
        Ok(Expr::Path { root, steps })
    }

    fn bracket(&mut self) -> Result<Access, TemplateError> {
        self.pos += 1;
        self.skip_ws();
        let access = match self.peek() {
            Some(q @ ('"' | '\'')) => Access::Key(self.string(q)?),
            Some(c) if c.is_ascii_digit() => {
                let start = self.pos;
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
                let digits: String = self.chars[start..self.pos].iter().collect();
                let index = digits
                    .parse::<usize>()
                    .map_err(|_| compile_err(start, format!("index `{digits}` is too large")))?;
                Access::Index(index)
            }
            _ => return Err(compile_err(self.pos, "expected string or index inside `[]`")),
        };
        self.skip_ws();
        if self.peek() != Some(']') {
            return Err(compile_err(self.pos, "expected `]`"));
        }
        self.pos += 1;
        Ok(access)
    }

    fn string(&mut self, quote: char) -> Result<String, TemplateError> {
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(compile_err(start, "unterminated string literal")),
                Some('\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some('n') => out.push('\n'),
                        Some('t') => out.push('\t'),
                        Some(c) => out.push(c),
                        None => return Err(compile_err(start, "unterminated string literal")),
                    }
                    self.pos += 1;
                }
                Some(c) if c == quote => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn number(&mut self) -> Result<Expr, TemplateError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '.') {
            self.pos += 1;
        }
        let raw: String = self.chars[start..self.pos].iter().collect();
        let value = if raw.contains('.') {
            raw.parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
        } else {
            raw.parse::<u64>().ok().map(Value::from)
        };
        value
            .map(Expr::Literal)
            .ok_or_else(|| compile_err(start, format!("invalid number `{raw}`")))
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TEXT_BINDINGS: &[&str] = &["args", "body"];

    fn render(source: &str, args: &Value, body: &Value) -> Result<String, TemplateError> {
        let template = Template::compile(source, TEXT_BINDINGS)?;
        template.render(&Scope::new().bind("args", args).bind("body", body))
    }

    #[test]
    fn interpolates_members() {
        let out = render(
            "https://x/${args.name}",
            &json!({"name": "Singapore"}),
            &Value::Null,
        )
        .unwrap();
        assert_eq!(out, "https://x/Singapore");
    }

    #[test]
    fn renders_the_country_sentence() {
        let body = json!({"name": "Singapore", "subregion": "ASEAN", "population": 50000000});
        let out = render(
            "${body.name} can be found in ${body.subregion}. ${body.name} has a population of ${body.population}.",
            &json!({"name": "Singapore"}),
            &body,
        )
        .unwrap();
        assert_eq!(
            out,
            "Singapore can be found in ASEAN. Singapore has a population of 50000000."
        );
    }

    #[test]
    fn rejects_identifiers_outside_the_scope() {
        let err = Template::compile("${process.env.TOKEN}", &["args"]).unwrap_err();
        assert!(err.to_string().contains("`process` is not defined"));

        let err = Template::compile("${body.name}", &["args"]).unwrap_err();
        assert!(matches!(err, TemplateError::Compile { offset: 2, .. }));
    }

    #[test]
    fn rejects_malformed_expressions() {
        assert!(Template::compile("${args.name", TEXT_BINDINGS).is_err());
        assert!(Template::compile("${}", TEXT_BINDINGS).is_err());
        assert!(Template::compile("${args.}", TEXT_BINDINGS).is_err());
        assert!(Template::compile("${args[}", TEXT_BINDINGS).is_err());
        assert!(Template::compile("${args + 1}", TEXT_BINDINGS).is_err());
        assert!(Template::compile("${'open}", TEXT_BINDINGS).is_err());
    }

    #[test]
    fn brackets_indexes_and_optional_access() {
        let body = json!({"items": [{"first name": "Ada"}], "owner": null});
        assert_eq!(
            render("${body.items[0][\"first name\"]}", &json!({}), &body).unwrap(),
            "Ada"
        );
        assert_eq!(render("[${body.owner?.login}]", &json!({}), &body).unwrap(), "[]");
        assert_eq!(render("[${body.missing?.login}]", &json!({}), &body).unwrap(), "[]");
    }

    #[test]
    fn missing_members_render_empty_but_deeper_reads_fail() {
        assert_eq!(render("<${args.city}>", &json!({}), &Value::Null).unwrap(), "<>");

        let err = render("${args.city.name}", &json!({}), &Value::Null).unwrap_err();
        assert_eq!(
            err,
            TemplateError::Eval("cannot read `name` of undefined (`args.city`)".into())
        );

        let err = render("${body.owner.login}", &json!({}), &json!({"owner": null})).unwrap_err();
        assert!(err.to_string().contains("of null"));
    }

    #[test]
    fn fallback_operator() {
        let out = render("${args.city || 'Singapore'}", &json!({}), &Value::Null).unwrap();
        assert_eq!(out, "Singapore");
        let out = render("${body.count || 0}", &json!({}), &json!({"count": 7})).unwrap();
        assert_eq!(out, "7");
        let out = render("${body.a || body.b || \"none\"}", &json!({}), &json!({"b": ""})).unwrap();
        assert_eq!(out, "none");
    }

    #[test]
    fn escapes_and_value_printing() {
        let body = json!({"tags": ["a", "b"], "ok": true, "ratio": 2.0, "pi": 3.5});
        let out = render(
            "\\${literal} ${body.tags} ${body.ok} ${body.ratio} ${body.pi}",
            &json!({}),
            &body,
        )
        .unwrap();
        assert_eq!(out, "${literal} [\"a\",\"b\"] true 2 3.5");
    }

    #[test]
    fn whole_body_binding() {
        let out = render("Quote: ${body}", &json!({}), &json!("stay hungry")).unwrap();
        assert_eq!(out, "Quote: stay hungry");
    }

    #[test]
    fn literal_template_ignores_scope() {
        let t = Template::literal("renderer error");
        assert_eq!(t.render(&Scope::new()).unwrap(), "renderer error");
    }
}
