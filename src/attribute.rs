//! Declarative instrument attributes.
//!
//! A [`Control<T>`] binds an attribute name to a query command, a write
//! template, a value format, a [`Validator`] and an optional [`TokenMap`].
//! It holds no state of its own: reading round-trips a query through the
//! [`Instrument`](crate::instrument::Instrument), writing validates and sends
//! one command.
//!
//! Templates are rendered with `strfmt`. Two placeholders are recognised:
//! `{value}` (the formatted value) and `{ch}` (the channel index).
//!
//! ```
//! use scpi_instruments::attribute::{Control, ValueFormat};
//!
//! let start = Control::<f64>::new("start_frequency", "STAR?", "STAR {value} Hz")
//!     .with_range(30e3, 6e9);
//! assert_eq!(start.write_command(&1.5e9, None).unwrap(), "STAR 1.500000e+09 Hz");
//! assert!(start.write_command(&7e9, None).is_err());
//!
//! let sweep_time = Control::<f64>::new("sweep_time", "SWET?", "SWET{value}")
//!     .with_format(ValueFormat::Exponential(2));
//! assert_eq!(sweep_time.write_command(&1.0, None).unwrap(), "SWET1.00e+00");
//! ```

use crate::error::{ScpiError, ScpiResult};
use crate::scpi;
use num_complex::Complex64;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt::{self, Debug};

// =============================================================================
// Values
// =============================================================================

/// How a value is rendered into a write command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueFormat {
    /// C `%.{n}e`; `%e` is `Exponential(6)`.
    Exponential(usize),
    /// C `%.{n}f`.
    Fixed(usize),
    /// C `%d`.
    Integer,
    /// C `%s`.
    Text,
}

/// A value type that can travel over a SCPI link.
pub trait ScpiValue: Clone + Debug + PartialEq + Send + Sync + 'static {
    /// Human readable description of the reply format, used in parse errors.
    const EXPECTED: &'static str;

    /// Format used when a control does not specify one.
    const DEFAULT_FORMAT: ValueFormat;

    /// Cast an instrument reply.
    fn from_reply(command: &str, reply: &str) -> ScpiResult<Self>;

    /// Parse user supplied text (CLI, config). `None` if it does not parse.
    fn from_text(text: &str) -> Option<Self>;

    /// Render for a write command.
    fn render(&self, format: ValueFormat) -> String;

    /// Ordering used by range validators. `None` means "not comparable".
    fn compare(&self, other: &Self) -> Option<Ordering>;

    /// Render for display to a user.
    fn display(&self) -> String;
}

fn render_number(value: f64, format: ValueFormat) -> String {
    match format {
        ValueFormat::Exponential(precision) => scpi::format_exponential(value, precision),
        ValueFormat::Fixed(precision) => format!("{:.*}", precision, value),
        ValueFormat::Integer => format!("{}", value.trunc() as i64),
        ValueFormat::Text => format!("{value}"),
    }
}

impl ScpiValue for f64 {
    const EXPECTED: &'static str = "a floating-point number";
    const DEFAULT_FORMAT: ValueFormat = ValueFormat::Exponential(6);

    fn from_reply(command: &str, reply: &str) -> ScpiResult<Self> {
        scpi::parse_f64(command, reply)
    }

    fn from_text(text: &str) -> Option<Self> {
        text.trim().parse().ok()
    }

    fn render(&self, format: ValueFormat) -> String {
        render_number(*self, format)
    }

    fn compare(&self, other: &Self) -> Option<Ordering> {
        self.partial_cmp(other)
    }

    fn display(&self) -> String {
        format!("{self}")
    }
}

impl ScpiValue for i64 {
    const EXPECTED: &'static str = "an integer";
    const DEFAULT_FORMAT: ValueFormat = ValueFormat::Integer;

    fn from_reply(command: &str, reply: &str) -> ScpiResult<Self> {
        scpi::parse_int_via_float(command, reply)
    }

    fn from_text(text: &str) -> Option<Self> {
        text.trim().parse().ok()
    }

    fn render(&self, format: ValueFormat) -> String {
        match format {
            ValueFormat::Integer | ValueFormat::Text => self.to_string(),
            other => render_number(*self as f64, other),
        }
    }

    fn compare(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }

    fn display(&self) -> String {
        self.to_string()
    }
}

impl ScpiValue for String {
    const EXPECTED: &'static str = "text";
    const DEFAULT_FORMAT: ValueFormat = ValueFormat::Text;

    fn from_reply(_command: &str, reply: &str) -> ScpiResult<Self> {
        Ok(reply.trim().trim_matches('"').to_string())
    }

    fn from_text(text: &str) -> Option<Self> {
        Some(text.to_string())
    }

    fn render(&self, _format: ValueFormat) -> String {
        self.clone()
    }

    fn compare(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }

    fn display(&self) -> String {
        self.clone()
    }
}

impl ScpiValue for bool {
    const EXPECTED: &'static str = "a boolean (1/0, ON/OFF)";
    const DEFAULT_FORMAT: ValueFormat = ValueFormat::Integer;

    fn from_reply(command: &str, reply: &str) -> ScpiResult<Self> {
        parse_bool_token(reply).ok_or_else(|| ScpiError::parse(command, reply, Self::EXPECTED))
    }

    fn from_text(text: &str) -> Option<Self> {
        parse_bool_token(text)
    }

    fn render(&self, _format: ValueFormat) -> String {
        if *self { "1" } else { "0" }.to_string()
    }

    fn compare(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }

    fn display(&self) -> String {
        self.to_string()
    }
}

fn parse_bool_token(text: &str) -> Option<bool> {
    match text.trim().to_ascii_uppercase().as_str() {
        "1" | "ON" | "TRUE" => Some(true),
        "0" | "OFF" | "FALSE" => Some(false),
        _ => None,
    }
}

impl ScpiValue for Complex64 {
    const EXPECTED: &'static str = "a 'real,imag' pair";
    const DEFAULT_FORMAT: ValueFormat = ValueFormat::Exponential(6);

    fn from_reply(command: &str, reply: &str) -> ScpiResult<Self> {
        scpi::parse_complex_pair(command, reply)
    }

    fn from_text(text: &str) -> Option<Self> {
        scpi::parse_complex_pair("", text).ok()
    }

    fn render(&self, format: ValueFormat) -> String {
        format!(
            "{},{}",
            render_number(self.re, format),
            render_number(self.im, format)
        )
    }

    fn compare(&self, _other: &Self) -> Option<Ordering> {
        None
    }

    fn display(&self) -> String {
        format!("{}{:+}j", self.re, self.im)
    }
}

// =============================================================================
// Validators
// =============================================================================

/// Domain check applied before a value is formatted into a command.
#[derive(Debug, Clone)]
pub enum Validator<T> {
    /// Accept anything.
    Any,
    /// Reject values outside `[min, max]`.
    StrictRange { min: T, max: T },
    /// Clamp values into `[min, max]`.
    TruncatedRange { min: T, max: T },
    /// Accept only the listed values.
    DiscreteSet(Vec<T>),
}

impl<T: ScpiValue> Validator<T> {
    /// Check `value`, returning the value to send.
    pub fn validate(&self, attribute: &str, value: &T) -> ScpiResult<T> {
        let accepted = match self {
            Validator::Any => Some(value.clone()),
            Validator::StrictRange { min, max } => {
                in_range(value, min, max).then(|| value.clone())
            }
            Validator::TruncatedRange { min, max } => {
                match (value.compare(min), value.compare(max)) {
                    (Some(Ordering::Less), _) => Some(min.clone()),
                    (_, Some(Ordering::Greater)) => Some(max.clone()),
                    (Some(_), Some(_)) => Some(value.clone()),
                    _ => None,
                }
            }
            Validator::DiscreteSet(values) => values.contains(value).then(|| value.clone()),
        };

        accepted.ok_or_else(|| ScpiError::InvalidValue {
            attribute: attribute.to_string(),
            value: value.display(),
            expected: self.describe(),
        })
    }

    /// Human readable description of the accepted domain.
    pub fn describe(&self) -> String {
        match self {
            Validator::Any => "any value".to_string(),
            Validator::StrictRange { min, max } => {
                format!("a value in [{}, {}]", min.display(), max.display())
            }
            Validator::TruncatedRange { min, max } => {
                format!("a value (clamped) in [{}, {}]", min.display(), max.display())
            }
            Validator::DiscreteSet(values) => {
                let values: Vec<String> = values.iter().map(ScpiValue::display).collect();
                format!("one of [{}]", values.join(", "))
            }
        }
    }
}

fn in_range<T: ScpiValue>(value: &T, min: &T, max: &T) -> bool {
    matches!(value.compare(min), Some(Ordering::Greater | Ordering::Equal))
        && matches!(value.compare(max), Some(Ordering::Less | Ordering::Equal))
}

// =============================================================================
// Token maps
// =============================================================================

/// Fixed two-way table between values and instrument tokens.
///
/// Every value has exactly one write token. Replies are looked up
/// case-insensitively against the write tokens and any reply aliases (an
/// instrument that accepts `ON`/`OFF` typically answers `1`/`0`).
#[derive(Debug, Clone)]
pub struct TokenMap<T> {
    forward: Vec<(T, String)>,
    reverse: Vec<(String, T)>,
}

impl<T: ScpiValue> TokenMap<T> {
    /// Build a map from `(value, token)` pairs.
    ///
    /// Fails if a value or a token appears twice, or a token is empty.
    pub fn new<I, S>(pairs: I) -> ScpiResult<Self>
    where
        I: IntoIterator<Item = (T, S)>,
        S: Into<String>,
    {
        let mut map = Self {
            forward: Vec::new(),
            reverse: Vec::new(),
        };
        for (value, token) in pairs {
            let token = token.into();
            if token.trim().is_empty() {
                return Err(ScpiError::Configuration(format!(
                    "empty token for {}",
                    value.display()
                )));
            }
            if map.token(&value).is_some() {
                return Err(ScpiError::Configuration(format!(
                    "value {} mapped twice",
                    value.display()
                )));
            }
            if map.value(&token).is_some() {
                return Err(ScpiError::Configuration(format!("token '{token}' mapped twice")));
            }
            map.reverse.push((token.clone(), value.clone()));
            map.forward.push((value, token));
        }
        Ok(map)
    }

    /// Accept `token` in replies as meaning `value`.
    ///
    /// `value` must already have a write token, and `token` must not mean
    /// something else.
    pub fn with_reply_alias(mut self, token: &str, value: T) -> ScpiResult<Self> {
        if self.token(&value).is_none() {
            return Err(ScpiError::Configuration(format!(
                "alias '{token}' refers to unmapped value {}",
                value.display()
            )));
        }
        match self.value(token) {
            Some(existing) if existing == value => Ok(self),
            Some(existing) => Err(ScpiError::Configuration(format!(
                "alias '{token}' already means {}",
                existing.display()
            ))),
            None => {
                self.reverse.push((token.to_string(), value));
                Ok(self)
            }
        }
    }

    /// Write token for `value`.
    pub fn token(&self, value: &T) -> Option<&str> {
        self.forward
            .iter()
            .find(|(candidate, _)| candidate == value)
            .map(|(_, token)| token.as_str())
    }

    /// Value for a reply or user token.
    pub fn value(&self, token: &str) -> Option<T> {
        let token = token.trim();
        self.reverse
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(token))
            .map(|(_, value)| value.clone())
    }

    /// All write tokens, in declaration order.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.forward.iter().map(|(_, token)| token.as_str())
    }

    /// All mapped values, in declaration order.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.forward.iter().map(|(value, _)| value)
    }
}

impl TokenMap<bool> {
    /// `true` writes `on`, `false` writes `off`.
    ///
    /// Replies are matched against `on` first, so if the two tokens are
    /// equal the reply decodes as `true`.
    pub fn boolean(on: &str, off: &str) -> Self {
        Self {
            forward: vec![(true, on.to_string()), (false, off.to_string())],
            reverse: vec![(on.to_string(), true), (off.to_string(), false)],
        }
    }

    /// Also accept `on`/`off` in replies.
    pub fn replies(mut self, on: &str, off: &str) -> Self {
        for (token, value) in [(on, true), (off, false)] {
            if self.value(token).is_none() {
                self.reverse.push((token.to_string(), value));
            }
        }
        self
    }

    /// Writes `1`/`0`, accepts `ON`/`OFF` back.
    pub fn numeric() -> Self {
        Self::boolean("1", "0").replies("ON", "OFF")
    }

    /// Writes `ON`/`OFF`, accepts `1`/`0` back.
    pub fn on_off() -> Self {
        Self::boolean("ON", "OFF").replies("1", "0")
    }
}

// =============================================================================
// Control<T>
// =============================================================================

/// Declarative descriptor for one instrument attribute.
#[derive(Debug, Clone)]
pub struct Control<T> {
    name: &'static str,
    query: Option<String>,
    template: Option<String>,
    format: ValueFormat,
    validator: Validator<T>,
    tokens: Option<TokenMap<T>>,
}

impl<T: ScpiValue> Control<T> {
    /// Read/write attribute.
    pub fn new(name: &'static str, query: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name,
            query: Some(query.into()),
            template: Some(template.into()),
            format: T::DEFAULT_FORMAT,
            validator: Validator::Any,
            tokens: None,
        }
    }

    /// Read-only attribute.
    pub fn measurement(name: &'static str, query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            template: None,
            ..Self::new(name, "", "")
        }
    }

    /// Write-only attribute.
    pub fn setting(name: &'static str, template: impl Into<String>) -> Self {
        Self {
            query: None,
            template: Some(template.into()),
            ..Self::new(name, "", "")
        }
    }

    pub fn with_format(mut self, format: ValueFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_validator(mut self, validator: Validator<T>) -> Self {
        self.validator = validator;
        self
    }

    /// Reject values outside `[min, max]`.
    pub fn with_range(self, min: T, max: T) -> Self {
        self.with_validator(Validator::StrictRange { min, max })
    }

    /// Accept only `values`.
    pub fn with_choices(self, values: impl IntoIterator<Item = T>) -> Self {
        self.with_validator(Validator::DiscreteSet(values.into_iter().collect()))
    }

    /// Translate values through `tokens` in both directions.
    pub fn with_tokens(mut self, tokens: TokenMap<T>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn validator(&self) -> &Validator<T> {
        &self.validator
    }

    pub fn is_readable(&self) -> bool {
        self.query.is_some()
    }

    pub fn is_writable(&self) -> bool {
        self.template.is_some()
    }

    /// The query to send, with `{ch}` filled in.
    pub fn query_command(&self, channel: Option<u8>) -> ScpiResult<String> {
        let query = self
            .query
            .as_deref()
            .ok_or_else(|| ScpiError::NotReadable(self.name.to_string()))?;
        render_template(query, None, channel)
    }

    /// Validate `value` and render the write command.
    pub fn write_command(&self, value: &T, channel: Option<u8>) -> ScpiResult<String> {
        let template = self
            .template
            .as_deref()
            .ok_or_else(|| ScpiError::NotWritable(self.name.to_string()))?;
        let value = self.validator.validate(self.name, value)?;
        let rendered = match &self.tokens {
            Some(tokens) => tokens
                .token(&value)
                .map(str::to_string)
                .ok_or_else(|| ScpiError::InvalidValue {
                    attribute: self.name.to_string(),
                    value: value.display(),
                    expected: format!("one of [{}]", tokens.tokens().collect::<Vec<_>>().join(", ")),
                })?,
            None => value.render(self.format),
        };
        render_template(template, Some(&rendered), channel)
    }

    /// Cast the reply to `command`.
    pub fn parse_reply(&self, command: &str, reply: &str) -> ScpiResult<T> {
        match &self.tokens {
            Some(tokens) => tokens.value(reply).ok_or_else(|| {
                ScpiError::parse(
                    command,
                    reply,
                    format!("one of [{}]", tokens.tokens().collect::<Vec<_>>().join(", ")),
                )
            }),
            None => T::from_reply(command, reply),
        }
    }

    fn value_from_text(&self, text: &str) -> ScpiResult<T> {
        let parsed = match &self.tokens {
            Some(tokens) => tokens.value(text).or_else(|| T::from_text(text)),
            None => T::from_text(text),
        };
        parsed.ok_or_else(|| ScpiError::InvalidValue {
            attribute: self.name.to_string(),
            value: text.to_string(),
            expected: T::EXPECTED.to_string(),
        })
    }
}

/// Render a command template. `{value}` and `{ch}` are the only placeholders.
pub fn render_template(template: &str, value: Option<&str>, channel: Option<u8>) -> ScpiResult<String> {
    let mut vars: HashMap<String, String> = HashMap::new();
    if let Some(value) = value {
        vars.insert("value".to_string(), value.to_string());
    }
    if let Some(channel) = channel {
        vars.insert("ch".to_string(), channel.to_string());
    }
    strfmt::strfmt(template, &vars).map_err(|err| ScpiError::Template(format!("{template:?}: {err}")))
}

// =============================================================================
// Type-erased access by name
// =============================================================================

/// Read/write access of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadWrite,
    ReadOnly,
    WriteOnly,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Access::ReadWrite => "rw",
            Access::ReadOnly => "r",
            Access::WriteOnly => "w",
        })
    }
}

/// Text-level view of a [`Control`], so attributes can be looked up by name.
pub trait Attribute: Send + Sync {
    fn name(&self) -> &'static str;

    fn access(&self) -> Access;

    /// Description of the accepted values.
    fn domain(&self) -> String;

    fn query_command(&self, channel: Option<u8>) -> ScpiResult<String>;

    /// Parse `text`, validate it and render the write command.
    fn write_command_from_text(&self, text: &str, channel: Option<u8>) -> ScpiResult<String>;

    /// Cast `reply` and render it for display.
    fn render_reply(&self, command: &str, reply: &str) -> ScpiResult<String>;
}

impl<T: ScpiValue> Attribute for Control<T> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn access(&self) -> Access {
        match (self.is_readable(), self.is_writable()) {
            (true, false) => Access::ReadOnly,
            (false, true) => Access::WriteOnly,
            _ => Access::ReadWrite,
        }
    }

    fn domain(&self) -> String {
        match &self.tokens {
            Some(tokens) => {
                let values: Vec<String> = tokens.values().map(ScpiValue::display).collect();
                format!("one of [{}]", values.join(", "))
            }
            None => self.validator.describe(),
        }
    }

    fn query_command(&self, channel: Option<u8>) -> ScpiResult<String> {
        Control::query_command(self, channel)
    }

    fn write_command_from_text(&self, text: &str, channel: Option<u8>) -> ScpiResult<String> {
        if !self.is_writable() {
            return Err(ScpiError::NotWritable(self.name.to_string()));
        }
        let value = self.value_from_text(text)?;
        self.write_command(&value, channel)
    }

    fn render_reply(&self, command: &str, reply: &str) -> ScpiResult<String> {
        self.parse_reply(command, reply).map(|value| value.display())
    }
}

/// Find an attribute by name.
pub fn find<'a>(attributes: &[&'a dyn Attribute], name: &str) -> ScpiResult<&'a dyn Attribute> {
    attributes
        .iter()
        .copied()
        .find(|attribute| attribute.name() == name)
        .ok_or_else(|| ScpiError::UnknownAttribute(name.to_string()))
}

/// Generates async getter/setter pairs that forward to the owning
/// instrument's controls. The surrounding type needs `instrument`, `controls`
/// and a `channel_index()` method.
macro_rules! control_accessors {
    ($( $(#[$meta:meta])* $getter:ident, $setter:ident: $ty:ty; )*) => {
        $(
            $(#[$meta])*
            pub async fn $getter(&mut self) -> $crate::error::ScpiResult<$ty> {
                let channel = self.channel_index();
                self.instrument.get_on(&self.controls.$getter, channel).await
            }

            #[doc = concat!("Write `", stringify!($getter), "`. Out-of-domain values fail before anything is sent.")]
            pub async fn $setter(&mut self, value: $ty) -> $crate::error::ScpiResult<()> {
                let channel = self.channel_index();
                self.instrument.set_on(&self.controls.$getter, value, channel).await
            }
        )*
    };
}

/// Read-only counterpart of `control_accessors!`.
macro_rules! measurement_accessors {
    ($( $(#[$meta:meta])* $getter:ident: $ty:ty; )*) => {
        $(
            $(#[$meta])*
            pub async fn $getter(&mut self) -> $crate::error::ScpiResult<$ty> {
                let channel = self.channel_index();
                self.instrument.get_on(&self.controls.$getter, channel).await
            }
        )*
    };
}

pub(crate) use control_accessors;
pub(crate) use measurement_accessors;
