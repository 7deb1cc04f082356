//! Built-in pipes
//!
//! Formatting: `number[:decimals]`, `date[:format]`, `date_parse[:format]`,
//! `date_math:<±N><s|m|h|d|w>`, `duration[:seconds|millis]`, `since`,
//! `lower`, `upper`, `default:<value>`.
//!
//! Predicates (for conditions): `eq`, `ne`, `in`, `contains`, `not`, `exists`,
//! `gt`, `gte`, `lt`, `lte`.
//!
//! Arguments that look like JSON (`5`, `true`, `"x"`) compare as JSON; anything
//! else compares as a string.

use crate::context::Context;
use crate::error::{ExprError, Result};
use crate::eval::{Clock, Pipe};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt::Write;
use std::sync::Arc;

type PipeFn = fn(Value, &[String], &Context) -> Result<Value>;

/// Upper bound on `number` precision
const MAX_DECIMALS: usize = 20;

pub(crate) fn builtin() -> Vec<(&'static str, Arc<dyn Pipe>)> {
    let table: [(&'static str, PipeFn); 18] = [
        ("number", number),
        ("date", date),
        ("date_parse", date_parse),
        ("date_math", date_math),
        ("duration", duration),
        ("lower", lower),
        ("upper", upper),
        ("default", default),
        ("eq", eq),
        ("ne", ne),
        ("in", one_of),
        ("contains", contains),
        ("not", not),
        ("exists", exists),
        ("gt", |v, a, _| compare("gt", v, a, |o| o == Ordering::Greater)),
        ("gte", |v, a, _| compare("gte", v, a, |o| o != Ordering::Less)),
        ("lt", |v, a, _| compare("lt", v, a, |o| o == Ordering::Less)),
        ("lte", |v, a, _| compare("lte", v, a, |o| o != Ordering::Greater)),
    ];
    table
        .into_iter()
        .map(|(name, f)| (name, Arc::new(f) as Arc<dyn Pipe>))
        .collect()
}

/// Seconds elapsed from the input date to the clock's now
pub(crate) fn since(clock: Arc<dyn Clock>) -> impl Pipe {
    move |input: Value, _args: &[String], _ctx: &Context| -> Result<Value> {
        if input.is_null() {
            return Ok(Value::Null);
        }
        let then = parse_date("since", &input, None)?;
        Ok(Value::from((clock.now() - then).num_seconds()))
    }
}

fn arg<'a>(pipe: &str, args: &'a [String], idx: usize) -> Result<&'a str> {
    args.get(idx)
        .map(String::as_str)
        .ok_or_else(|| ExprError::invalid_argument(pipe, format!("missing argument {}", idx + 1)))
}

/// Argument as JSON when it parses, otherwise as a string
fn arg_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn as_number(op: &str, value: &Value) -> Result<f64> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| ExprError::type_mismatch(op, "number", value)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| ExprError::type_mismatch(op, "number", value)),
        _ => Err(ExprError::type_mismatch(op, "number", value)),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn rfc3339(dt: DateTime<Utc>) -> Value {
    Value::String(dt.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Accepts RFC 3339, `YYYY-MM-DD`, epoch milliseconds, or text in `format`
fn parse_date(op: &str, value: &Value, format: Option<&str>) -> Result<DateTime<Utc>> {
    let parsed = match (value, format) {
        (Value::Number(n), _) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        (Value::String(s), Some(fmt)) => NaiveDateTime::parse_from_str(s, fmt)
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(s, fmt)
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
            .map(|naive| Utc.from_utc_datetime(&naive)),
        (Value::String(s), None) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|naive| Utc.from_utc_datetime(&naive))
            }),
        _ => None,
    };
    parsed.ok_or_else(|| ExprError::type_mismatch(op, "date", value))
}

fn number(input: Value, args: &[String], _ctx: &Context) -> Result<Value> {
    if input.is_null() {
        return Ok(Value::Null);
    }
    let n = as_number("number", &input)?;
    match args.first() {
        Some(decimals) => {
            let decimals: usize = decimals
                .parse()
                .map_err(|_| ExprError::invalid_argument("number", "decimals must be an integer"))?;
            if decimals > MAX_DECIMALS {
                return Err(ExprError::invalid_argument(
                    "number",
                    format!("decimals must be at most {MAX_DECIMALS}"),
                ));
            }
            Ok(Value::String(format!("{:.*}", decimals, n)))
        }
        None if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => Ok(Value::from(n as i64)),
        None => Ok(Value::from(n)),
    }
}

fn date(input: Value, args: &[String], _ctx: &Context) -> Result<Value> {
    if input.is_null() {
        return Ok(Value::Null);
    }
    let dt = parse_date("date", &input, None)?;
    match args.first() {
        Some(fmt) => {
            let mut out = String::new();
            write!(out, "{}", dt.format(fmt)).map_err(|_| {
                ExprError::invalid_argument("date", format!("bad format '{}'", fmt))
            })?;
            Ok(Value::String(out))
        }
        None => Ok(rfc3339(dt)),
    }
}

fn date_parse(input: Value, args: &[String], _ctx: &Context) -> Result<Value> {
    if input.is_null() {
        return Ok(Value::Null);
    }
    let dt = parse_date("date_parse", &input, args.first().map(String::as_str))?;
    Ok(rfc3339(dt))
}

fn date_math(input: Value, args: &[String], _ctx: &Context) -> Result<Value> {
    if input.is_null() {
        return Ok(Value::Null);
    }
    let spec = arg("date_math", args, 0)?;
    let offset = parse_offset(spec)
        .ok_or_else(|| ExprError::invalid_argument("date_math", format!("bad offset '{}'", spec)))?;
    let dt = parse_date("date_math", &input, None)?;
    dt.checked_add_signed(offset)
        .map(rfc3339)
        .ok_or_else(|| ExprError::invalid_argument("date_math", "result out of range"))
}

/// `-1d`, `+2h`, `30m`
fn parse_offset(spec: &str) -> Option<Duration> {
    let spec = spec.trim();
    let unit = spec.chars().last()?;
    let amount: i64 = spec[..spec.len() - unit.len_utf8()].parse().ok()?;
    let seconds = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3_600,
        'd' => 86_400,
        'w' => 604_800,
        _ => return None,
    };
    Duration::try_seconds(amount.checked_mul(seconds)?)
}

fn duration(input: Value, args: &[String], _ctx: &Context) -> Result<Value> {
    if input.is_null() {
        return Ok(Value::Null);
    }
    let raw = as_number("duration", &input)?;
    let total = match args.first().map(String::as_str) {
        None | Some("seconds") => raw as i64,
        Some("millis") => (raw / 1000.0) as i64,
        Some(other) => {
            return Err(ExprError::invalid_argument(
                "duration",
                format!("unknown unit '{}'", other),
            ))
        }
    };
    Ok(Value::String(format_duration(total)))
}

fn format_duration(total: i64) -> String {
    let sign = if total < 0 { "-" } else { "" };
    let mut rest = total.unsigned_abs();
    let mut parts = Vec::new();
    for (unit, size) in [("d", 86_400u64), ("h", 3_600), ("m", 60), ("s", 1)] {
        let n = rest / size;
        rest %= size;
        if n > 0 {
            parts.push(format!("{}{}", n, unit));
        }
    }
    if parts.is_empty() {
        return "0s".to_string();
    }
    format!("{}{}", sign, parts.join(" "))
}

fn lower(input: Value, _args: &[String], _ctx: &Context) -> Result<Value> {
    match input {
        Value::String(s) => Ok(Value::String(s.to_lowercase())),
        Value::Null => Ok(Value::Null),
        other => Err(ExprError::type_mismatch("lower", "string", &other)),
    }
}

fn upper(input: Value, _args: &[String], _ctx: &Context) -> Result<Value> {
    match input {
        Value::String(s) => Ok(Value::String(s.to_uppercase())),
        Value::Null => Ok(Value::Null),
        other => Err(ExprError::type_mismatch("upper", "string", &other)),
    }
}

fn default(input: Value, args: &[String], _ctx: &Context) -> Result<Value> {
    if input.is_null() {
        Ok(arg_value(arg("default", args, 0)?))
    } else {
        Ok(input)
    }
}

fn eq(input: Value, args: &[String], _ctx: &Context) -> Result<Value> {
    let expected = arg_value(arg("eq", args, 0)?);
    Ok(Value::Bool(values_equal(&input, &expected)))
}

fn ne(input: Value, args: &[String], _ctx: &Context) -> Result<Value> {
    let expected = arg_value(arg("ne", args, 0)?);
    Ok(Value::Bool(!values_equal(&input, &expected)))
}

fn one_of(input: Value, args: &[String], _ctx: &Context) -> Result<Value> {
    if args.is_empty() {
        return Err(ExprError::invalid_argument("in", "expected at least one candidate"));
    }
    Ok(Value::Bool(
        args.iter()
            .any(|candidate| values_equal(&input, &arg_value(candidate))),
    ))
}

fn contains(input: Value, args: &[String], _ctx: &Context) -> Result<Value> {
    let needle = arg("contains", args, 0)?;
    match &input {
        Value::Array(items) => {
            let needle = arg_value(needle);
            Ok(Value::Bool(items.iter().any(|item| values_equal(item, &needle))))
        }
        Value::String(s) => Ok(Value::Bool(s.contains(needle))),
        Value::Null => Ok(Value::Bool(false)),
        other => Err(ExprError::type_mismatch("contains", "array or string", other)),
    }
}

fn not(input: Value, _args: &[String], _ctx: &Context) -> Result<Value> {
    match input {
        Value::Bool(b) => Ok(Value::Bool(!b)),
        Value::Null => Ok(Value::Bool(true)),
        other => Err(ExprError::type_mismatch("not", "boolean", &other)),
    }
}

fn exists(input: Value, _args: &[String], _ctx: &Context) -> Result<Value> {
    Ok(Value::Bool(!input.is_null()))
}

/// Numeric comparison when both sides are numeric, string comparison otherwise.
/// A null input never satisfies a comparison.
fn compare(
    op: &str,
    input: Value,
    args: &[String],
    accept: impl Fn(Ordering) -> bool,
) -> Result<Value> {
    if input.is_null() {
        return Ok(Value::Bool(false));
    }
    let rhs = arg_value(arg(op, args, 0)?);
    let ordering = match (as_number(op, &input), as_number(op, &rhs)) {
        (Ok(a), Ok(b)) => a
            .partial_cmp(&b)
            .ok_or_else(|| ExprError::type_mismatch(op, "comparable number", &input))?,
        _ => match (&input, &rhs) {
            (Value::String(a), Value::String(b)) => a.cmp(b),
            _ => return Err(ExprError::type_mismatch(op, "number or string", &input)),
        },
    };
    Ok(Value::Bool(accept(ordering)))
}
