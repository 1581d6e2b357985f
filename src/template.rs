//! `{{N}}` positional template compilation.
//!
//! A template is parsed once into literal segments interleaved with placeholder
//! indices, then rendered any number of times against positional arguments.

use std::fmt::Write as _;

use serde_json::Value;

/// Opening delimiter of a placeholder.
const OPEN: &str = "{{";
/// Closing delimiter of a placeholder.
const CLOSE: &str = "}}";

/// A compiled translation template.
///
/// `segments` always holds exactly one more element than `placeholders`:
/// rendering emits `segments[0]`, then the argument for `placeholders[0]`,
/// then `segments[1]`, and so on, finishing with the trailing segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    /// Literal text between placeholders (leading and trailing included, possibly empty).
    segments: Vec<String>,
    /// Placeholder indices in order of appearance.
    placeholders: Vec<usize>,
}

/// Compiles a template string containing `{{N}}` placeholders.
///
/// Anything that is not a well-formed `{{<digits>}}` is kept as literal text.
///
/// # Examples
/// ```
/// use i18n_resolver::template::compile;
/// use serde_json::json;
///
/// let template = compile("Hello, {{0}}!");
/// assert_eq!(template.render(&[json!("John")]), "Hello, John!");
/// ```
#[must_use]
pub fn compile(template: &str) -> Template {
    let mut segments = Vec::new();
    let mut placeholders = Vec::new();
    let mut literal = String::new();
    let mut rest = template;

    while let Some((before, after_open)) = rest.split_once(OPEN) {
        literal.push_str(before);

        let digit_len = after_open.bytes().take_while(u8::is_ascii_digit).count();
        let (digits, tail) = after_open.split_at(digit_len);

        if let Some(after_close) = tail.strip_prefix(CLOSE)
            && let Ok(index) = digits.parse::<usize>()
        {
            segments.push(std::mem::take(&mut literal));
            placeholders.push(index);
            rest = after_close;
        } else {
            // Only consume one brace so that `{{{0}}}` still finds `{{0}}`.
            literal.push('{');
            rest = rest.split_at(before.len() + 1).1;
        }
    }

    literal.push_str(rest);
    segments.push(literal);

    Template { segments, placeholders }
}

impl Template {
    /// Renders the template with positional arguments.
    ///
    /// A missing (or `null`) argument renders as the empty string for index 0
    /// and as the literal `{{N}}` text for every other index.
    #[must_use]
    pub fn render(&self, args: &[Value]) -> String {
        let mut out = String::with_capacity(self.segments.iter().map(String::len).sum());

        for (segment, &index) in self.segments.iter().zip(&self.placeholders) {
            out.push_str(segment);
            match args.get(index).filter(|arg| !arg.is_null()) {
                Some(arg) => out.push_str(&render_arg(arg)),
                None if index == 0 => {}
                None => {
                    let _ = write!(out, "{OPEN}{index}{CLOSE}");
                }
            }
        }

        if let Some(trailing) = self.segments.last() {
            out.push_str(trailing);
        }
        out
    }

    /// Placeholder indices in order of appearance.
    #[must_use]
    pub fn placeholders(&self) -> &[usize] {
        &self.placeholders
    }

    /// Returns true if the template has no placeholders and always renders the same text.
    #[must_use]
    pub fn is_constant(&self) -> bool {
        self.placeholders.is_empty()
    }
}

/// Converts an argument to display text the way a JavaScript `String(x)` call would.
#[must_use]
pub fn render_arg(arg: &Value) -> String {
    match arg {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| if item.is_null() { String::new() } else { render_arg(item) })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

/// Builds a positional argument list from heterogeneous values.
///
/// ```
/// use i18n_resolver::args;
///
/// let args = args!["John", 5, true];
/// assert_eq!(args.len(), 3);
/// ```
#[macro_export]
macro_rules! args {
    ($($arg:expr),* $(,)?) => {
        ::std::vec![$(::serde_json::Value::from($arg)),*]
    };
}
