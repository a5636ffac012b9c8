/// Locale-style numeric formatting for API response values.
///
/// Specifiers follow the familiar `[[fill]align][sign][symbol][0][width][,][.precision][~][type]`
/// mini-language with English conventions (`,` thousands, `.` decimal, `$` currency).
/// `,d` turns `50000000` into `50,000,000`; `.1%` turns `0.123` into `12.3%`.
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

static SPECIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(.)?([<>=^]))?([+\-( ])?([$#])?(0)?(\d+)?(,)?(\.\d+)?(~)?([a-zA-Z%])?$")
        .expect("static specifier pattern")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid format specifier `{0}`")]
pub struct FormatError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
    Center,
    AfterSign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sign {
    Minus,
    Plus,
    Space,
    Paren,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Decimal,
    Fixed,
    Exponent,
    General,
    Rounded,
    Si,
    Percent,
    Hex { upper: bool },
    Octal,
    Binary,
}

/// A parsed, reusable numeric format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberFormat {
    spec: String,
    fill: char,
    align: Align,
    sign: Sign,
    symbol: Option<char>,
    width: usize,
    comma: bool,
    precision: usize,
    trim: bool,
    kind: Kind,
}

impl NumberFormat {
    pub fn parse(spec: &str) -> Result<Self, FormatError> {
        let caps = SPECIFIER
            .captures(spec)
            .ok_or_else(|| FormatError(spec.to_string()))?;
        let text = |i: usize| caps.get(i).map(|m| m.as_str());

        let mut fill = text(1).and_then(|s| s.chars().next()).unwrap_or(' ');
        let mut align = match text(2) {
            Some("<") => Align::Left,
            Some("^") => Align::Center,
            Some("=") => Align::AfterSign,
            _ => Align::Right,
        };
        let sign = match text(3) {
            Some("+") => Sign::Plus,
            Some(" ") => Sign::Space,
            Some("(") => Sign::Paren,
            _ => Sign::Minus,
        };
        let symbol = text(4).and_then(|s| s.chars().next());
        let zero = text(5).is_some();
        let width = match text(6) {
            Some(w) => w.parse().map_err(|_| FormatError(spec.to_string()))?,
            None => 0,
        };
        let comma = text(7).is_some() || text(10) == Some("n");
        let explicit_precision = match text(8) {
            Some(p) => Some(
                p[1..]
                    .parse::<usize>()
                    .map_err(|_| FormatError(spec.to_string()))?,
            ),
            None => None,
        };
        let mut trim = text(9).is_some();

        let (kind, precision) = match text(10) {
            Some("d") => (Kind::Decimal, 0),
            Some("f") => (Kind::Fixed, explicit_precision.unwrap_or(6).min(20)),
            Some("e") => (Kind::Exponent, explicit_precision.unwrap_or(6).min(20)),
            Some("%") => (Kind::Percent, explicit_precision.unwrap_or(6).min(20)),
            Some("g") | Some("n") => (Kind::General, explicit_precision.unwrap_or(6).clamp(1, 21)),
            Some("r") => (Kind::Rounded, explicit_precision.unwrap_or(6).clamp(1, 21)),
            Some("s") => (Kind::Si, explicit_precision.unwrap_or(6).clamp(1, 21)),
            Some("x") => (Kind::Hex { upper: false }, 0),
            Some("X") => (Kind::Hex { upper: true }, 0),
            Some("o") => (Kind::Octal, 0),
            Some("b") => (Kind::Binary, 0),
            None => {
                trim = true;
                (Kind::General, explicit_precision.unwrap_or(12).clamp(1, 21))
            }
            Some(_) => return Err(FormatError(spec.to_string())),
        };

        if zero || (fill == '0' && align == Align::AfterSign) {
            fill = '0';
            align = Align::AfterSign;
        }

        Ok(Self {
            spec: spec.to_string(),
            fill,
            align,
            sign,
            symbol,
            width,
            comma,
            precision,
            trim,
            kind,
        })
    }

    pub fn spec(&self) -> &str {
        &self.spec
    }

    /// Format a JSON value. Numbers and numeric strings are formatted; anything
    /// else comes back unchanged.
    pub fn apply(&self, value: &Value) -> Value {
        let number = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            _ => None,
        };
        match number {
            Some(x) => Value::String(self.format(x)),
            None => value.clone(),
        }
    }

    pub fn format(&self, x: f64) -> String {
        let mut negative = x < 0.0 || (x == 0.0 && x.is_sign_negative());
        let mut unit = "";
        let mut digits = match self.kind {
            Kind::Decimal => format!("{}", round_half_up(x.abs()) as u128),
            Kind::Fixed => format!("{:.*}", self.precision, x.abs()),
            Kind::Percent => format!("{:.*}", self.precision, x.abs() * 100.0),
            Kind::Exponent => exponential(x.abs(), self.precision),
            Kind::General => to_precision(x.abs(), self.precision),
            Kind::Rounded => rounded(x.abs(), self.precision),
            Kind::Si => {
                let (digits, prefix) = si(x.abs(), self.precision);
                unit = prefix;
                digits
            }
            Kind::Hex { upper: false } => format!("{:x}", round_half_up(x.abs()) as u128),
            Kind::Hex { upper: true } => format!("{:X}", round_half_up(x.abs()) as u128),
            Kind::Octal => format!("{:o}", round_half_up(x.abs()) as u128),
            Kind::Binary => format!("{:b}", round_half_up(x.abs()) as u128),
        };

        if self.trim {
            digits = trim_zeros(&digits);
        }

        if negative && digits.chars().all(|c| matches!(c, '0' | '.')) && self.sign != Sign::Plus {
            negative = false;
        }

        let mut prefix = match (negative, self.sign) {
            (true, Sign::Paren) => "(".to_string(),
            (true, _) => "-".to_string(),
            (false, Sign::Plus) => "+".to_string(),
            (false, Sign::Space) => " ".to_string(),
            (false, _) => String::new(),
        };
        match (self.symbol, self.kind) {
            (Some('$'), _) => prefix.push('$'),
            (Some('#'), Kind::Hex { .. }) => prefix.push_str("0x"),
            (Some('#'), Kind::Octal) => prefix.push_str("0o"),
            (Some('#'), Kind::Binary) => prefix.push_str("0b"),
            _ => {}
        }

        let mut suffix = unit.to_string();
        if self.kind == Kind::Percent {
            suffix.push('%');
        }
        if negative && self.sign == Sign::Paren {
            suffix.push(')');
        }

        let fixed_len = prefix.chars().count() + suffix.chars().count();
        if self.comma {
            if self.fill == '0' && self.align == Align::AfterSign {
                let target = self.width.saturating_sub(fixed_len);
                while group(&digits).chars().count() < target {
                    digits.insert(0, '0');
                }
            }
            digits = group(&digits);
        }

        let len = fixed_len + digits.chars().count();
        let pad = self.width.saturating_sub(len);
        let padding: String = std::iter::repeat(self.fill).take(pad).collect();
        match self.align {
            Align::Left => format!("{prefix}{digits}{suffix}{padding}"),
            Align::AfterSign => format!("{prefix}{padding}{digits}{suffix}"),
            Align::Center => {
                let (left, right) = padding.split_at(padding.len() / 2 / self.fill.len_utf8() * self.fill.len_utf8());
                format!("{left}{prefix}{digits}{suffix}{right}")
            }
            Align::Right => format!("{padding}{prefix}{digits}{suffix}"),
        }
    }
}

fn round_half_up(x: f64) -> f64 {
    (x + 0.5).floor()
}

/// Insert thousands separators into the leading integer digits.
fn group(digits: &str) -> String {
    let split = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    let (int, rest) = digits.split_at(split);
    let mut out = String::with_capacity(digits.len() + int.len() / 3);
    for (i, c) in int.chars().enumerate() {
        if i > 0 && (int.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out.push_str(rest);
    out
}

/// Drop insignificant trailing zeros: `1.500` → `1.5`, `2.000e+3` → `2e+3`.
fn trim_zeros(digits: &str) -> String {
    let Some(dot) = digits.find('.') else {
        return digits.to_string();
    };
    let exp = digits.find('e').unwrap_or(digits.len());
    let fraction = digits[dot + 1..exp].trim_end_matches('0');
    let mut out = digits[..dot].to_string();
    if !fraction.is_empty() {
        out.push('.');
        out.push_str(fraction);
    }
    out.push_str(&digits[exp..]);
    out
}

/// Significant digits and decimal exponent of `x` rounded to `precision` digits.
fn significant(x: f64, precision: usize) -> (String, i32) {
    let formatted = format!("{:.*e}", precision.saturating_sub(1), x);
    let (mantissa, exp) = formatted.split_once('e').unwrap_or((&formatted, "0"));
    (mantissa.replace('.', ""), exp.parse().unwrap_or(0))
}

fn exponential(x: f64, precision: usize) -> String {
    let formatted = format!("{:.*e}", precision, x);
    match formatted.split_once('e') {
        Some((mantissa, exp)) if exp.starts_with('-') => format!("{mantissa}e{exp}"),
        Some((mantissa, exp)) => format!("{mantissa}e+{exp}"),
        None => formatted,
    }
}

fn fixed_from_significant(digits: &str, exp: i32) -> String {
    let len = digits.len() as i32;
    if exp >= len - 1 {
        let zeros = "0".repeat((exp - (len - 1)) as usize);
        format!("{digits}{zeros}")
    } else if exp >= 0 {
        let (int, frac) = digits.split_at((exp + 1) as usize);
        format!("{int}.{frac}")
    } else {
        let zeros = "0".repeat((-exp - 1) as usize);
        format!("0.{zeros}{digits}")
    }
}

fn to_precision(x: f64, precision: usize) -> String {
    if x == 0.0 {
        return if precision > 1 {
            format!("0.{}", "0".repeat(precision - 1))
        } else {
            "0".to_string()
        };
    }
    let (digits, exp) = significant(x, precision);
    if exp < -6 || exp >= precision as i32 {
        exponential(x, precision - 1)
    } else {
        fixed_from_significant(&digits, exp)
    }
}

const SI_PREFIXES: [&str; 17] = [
    "y", "z", "a", "f", "p", "n", "\u{b5}", "m", "", "k", "M", "G", "T", "P", "E", "Z", "Y",
];

/// `precision` significant digits scaled to the nearest SI prefix: `1234` → (`1.23`, `k`).
fn si(x: f64, precision: usize) -> (String, &'static str) {
    let (digits, exp) = significant(x, precision);
    let group = if x == 0.0 { 0 } else { exp.div_euclid(3).clamp(-8, 8) };
    let unit = SI_PREFIXES[(group + 8) as usize];

    let int_len = exp - group * 3 + 1;
    let len = digits.len() as i32;
    let scaled = if int_len >= len {
        format!("{digits}{}", "0".repeat((int_len - len) as usize))
    } else if int_len > 0 {
        let (int, frac) = digits.split_at(int_len as usize);
        format!("{int}.{frac}")
    } else {
        // Below the smallest prefix.
        let (tail, _) = significant(x, (precision as i32 + int_len - 1).max(1) as usize);
        format!("0.{}{tail}", "0".repeat((-int_len) as usize))
    };
    (scaled, unit)
}

fn rounded(x: f64, precision: usize) -> String {
    if x == 0.0 {
        return "0".to_string();
    }
    let (digits, exp) = significant(x, precision);
    fixed_from_significant(&digits, exp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fmt(spec: &str, x: f64) -> String {
        NumberFormat::parse(spec).unwrap().format(x)
    }

    #[test]
    fn thousands_separator() {
        assert_eq!(fmt(",d", 50_000_000.0), "50,000,000");
        assert_eq!(fmt(",d", 999.0), "999");
        assert_eq!(fmt(",d", -1234.4), "-1,234");
        assert_eq!(fmt(",.2f", 1234567.891), "1,234,567.89");
    }

    #[test]
    fn fixed_percent_and_exponent() {
        assert_eq!(fmt(".2f", 3.14159), "3.14");
        assert_eq!(fmt(".1%", 0.123), "12.3%");
        assert_eq!(fmt(".0%", 0.5), "50%");
        assert_eq!(fmt(".2e", 12345.0), "1.23e+4");
        assert_eq!(fmt(".3~f", 2.5), "2.5");
    }

    #[test]
    fn general_and_rounded() {
        assert_eq!(fmt("", 0.1 + 0.2), "0.3");
        assert_eq!(fmt("", 42.0), "42");
        assert_eq!(fmt(".3g", 1234.0), "1.23e+3");
        assert_eq!(fmt(".3r", 1234.0), "1230");
        assert_eq!(fmt(".2r", 0.000_123), "0.00012");
    }

    #[test]
    fn sign_symbol_and_padding() {
        assert_eq!(fmt("+d", 5.0), "+5");
        assert_eq!(fmt("(,.2f", -1500.0), "(1,500.00)");
        assert_eq!(fmt("$,.2f", 1500.0), "$1,500.00");
        assert_eq!(fmt("08d", -42.0), "-0000042");
        assert_eq!(fmt("010,d", 1234.0), "00,001,234");
        assert_eq!(fmt(">6d", 42.0), "    42");
        assert_eq!(fmt("*^7d", 42.0), "**42***");
        assert_eq!(fmt("#x", 255.0), "0xff");
    }

    #[test]
    fn si_prefixes() {
        assert_eq!(fmt(".3s", 1234.0), "1.23k");
        assert_eq!(fmt(".3s", 999.9), "1.00k");
        assert_eq!(fmt("s", 1500.0), "1.50000k");
        assert_eq!(fmt(".2~s", 1_500_000.0), "1.5M");
        assert_eq!(fmt(".3s", 0.000_042), "42.0\u{b5}");
        assert_eq!(fmt(".3s", 42.0), "42.0");
        assert_eq!(fmt(".3s", -2_500_000_000.0), "-2.50G");
        assert_eq!(fmt(".3s", 0.0), "0.00");
    }

    #[test]
    fn negative_zero_loses_its_sign() {
        assert_eq!(fmt(".1f", -0.01), "0.0");
    }

    #[test]
    fn rejects_unknown_specifiers() {
        assert!(NumberFormat::parse("q").is_err());
        assert!(NumberFormat::parse(",,d").is_err());
    }

    #[test]
    fn apply_is_tolerant_of_input_type() {
        let f = NumberFormat::parse(",d").unwrap();
        assert_eq!(f.apply(&json!(50000000)), json!("50,000,000"));
        assert_eq!(f.apply(&json!("1234567")), json!("1,234,567"));
        assert_eq!(f.apply(&json!("ASEAN")), json!("ASEAN"));
        assert_eq!(f.apply(&json!(null)), json!(null));
        assert_eq!(f.apply(&json!({"a": 1})), json!({"a": 1}));
    }
}
