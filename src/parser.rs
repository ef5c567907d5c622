use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_while1},
    character::complete::{char, space0, space1},
    combinator::{eof, map, rest},
    multi::many0,
    sequence::{pair, preceded, separated_pair, terminated, tuple},
    IResult,
};
use regex::Regex;
use lazy_static::lazy_static;
use serde_json::Value;
use std::fs;
use anyhow::{anyhow, Context, Result};

use crate::circuit::{CircuitLayout, PinMode, PlacedComponent, Wire};

lazy_static! {
    static ref VALUE_PATTERN: Regex = Regex::new(
        r"(?i)^([-+]?(?:[0-9]+\.?[0-9]*|\.[0-9]+)(?:e[-+]?[0-9]+)?)(meg|[tgkmunpf])?(ohms?|v|a|hz|s|%|cm|c)?$"
    ).expect("value pattern is valid");

    static ref COMMENT_PATTERN: Regex = Regex::new(r"^\s*([#*;].*)?$").expect("comment pattern is valid");
}

/// One statement of the circuit text format
#[derive(Debug, Clone, PartialEq)]
enum Statement {
    Title(String),
    Part {
        id: String,
        kind: String,
        props: Vec<(String, String)>,
    },
    Wire {
        id: String,
        from: (String, String),
        to: (String, String),
    },
    Pin {
        board: String,
        pin: String,
        mode: String,
    },
}

/// Parser for the line-oriented circuit format:
///
/// ```text
/// title Blink
/// part uno arduino-uno
/// part r1 resistor resistance=330
/// part led1 led-red
/// wire w1 uno.D13 r1.t1
/// wire w2 r1.t2 led1.anode
/// wire w3 led1.cathode uno.GND
/// pin uno.D13 HIGH
/// ```
#[derive(Debug, Clone, Default)]
pub struct CircuitParser;

impl CircuitParser {
    pub fn new() -> Self {
        CircuitParser
    }

    pub fn parse_file(&self, filename: &str) -> Result<CircuitLayout> {
        let content = fs::read_to_string(filename)
            .with_context(|| format!("Failed to read file '{}'", filename))?;

        self.parse_str(&content)
            .with_context(|| format!("Failed to parse circuit file '{}'", filename))
    }

    pub fn parse_str(&self, content: &str) -> Result<CircuitLayout> {
        let mut layout = CircuitLayout::default();

        for (index, line) in content.lines().enumerate() {
            let line_num = index + 1;
            if COMMENT_PATTERN.is_match(line) {
                continue;
            }

            let (_, statement) = parse_statement(line.trim())
                .map_err(|_| anyhow!("Line {}: cannot parse '{}'", line_num, line.trim()))?;

            match statement {
                Statement::Title(title) => layout.title = title,
                Statement::Part { id, kind, props } => {
                    let mut placed = PlacedComponent::new(&id, &kind);
                    for (key, raw) in props {
                        placed.props.insert(key, parse_property_value(&raw));
                    }
                    layout.components.push(placed);
                }
                Statement::Wire { id, from, to } => {
                    layout
                        .wires
                        .push(Wire::new(&id, (&from.0, &from.1), (&to.0, &to.1)));
                }
                Statement::Pin { board, pin, mode } => {
                    let mode = PinMode::parse(&mode).ok_or_else(|| {
                        anyhow!("Line {}: unknown pin mode '{}' (HIGH, LOW or INPUT)", line_num, mode)
                    })?;
                    layout.pin_states.entry(board).or_default().insert(pin, mode);
                }
            }
        }

        Ok(layout)
    }
}

/// Property values: booleans, numbers with SI suffixes, otherwise text
fn parse_property_value(raw: &str) -> Value {
    match raw.to_lowercase().as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    match parse_value_with_unit(raw) {
        Ok(number) => Value::from(number),
        Err(_) => Value::String(raw.to_string()),
    }
}

/// Parse value with unit suffix (e.g., 220, 4.7k, 1meg, 3.3v, 20ma)
pub fn parse_value_with_unit(value_str: &str) -> Result<f64> {
    let value_str = value_str.trim();
    let captures = VALUE_PATTERN
        .captures(value_str)
        .ok_or_else(|| anyhow!("Invalid value: {}", value_str))?;

    let value = captures[1].parse::<f64>()?;
    let multiplier = match captures.get(2).map(|m| m.as_str().to_lowercase()).as_deref() {
        Some("t") => 1e12,
        Some("g") => 1e9,
        Some("meg") => 1e6,
        Some("k") => 1e3,
        Some("m") => 1e-3,
        Some("u") => 1e-6,
        Some("n") => 1e-9,
        Some("p") => 1e-12,
        Some("f") => 1e-15,
        _ => 1.0,
    };

    Ok(value * multiplier)
}

fn parse_statement(input: &str) -> IResult<&str, Statement> {
    terminated(
        alt((parse_title, parse_part, parse_wire, parse_pin)),
        pair(space0, eof),
    )(input)
}

fn parse_title(input: &str) -> IResult<&str, Statement> {
    map(preceded(pair(tag_no_case("title"), space1), rest), |title: &str| {
        Statement::Title(title.trim().to_string())
    })(input)
}

fn parse_part(input: &str) -> IResult<&str, Statement> {
    let (input, _) = pair(tag_no_case("part"), space1)(input)?;
    let (input, (id, _, kind)) = tuple((identifier, space1, identifier))(input)?;
    let (input, props) = many0(preceded(space1, parse_property))(input)?;

    Ok((
        input,
        Statement::Part {
            id: id.to_string(),
            kind: kind.to_string(),
            props,
        },
    ))
}

fn parse_wire(input: &str) -> IResult<&str, Statement> {
    let (input, _) = pair(tag_no_case("wire"), space1)(input)?;
    let (input, (id, _, from, _, to)) = tuple((identifier, space1, parse_endpoint, space1, parse_endpoint))(input)?;

    Ok((
        input,
        Statement::Wire {
            id: id.to_string(),
            from,
            to,
        },
    ))
}

fn parse_pin(input: &str) -> IResult<&str, Statement> {
    let (input, _) = pair(tag_no_case("pin"), space1)(input)?;
    let (input, ((board, pin), _, mode)) = tuple((parse_endpoint, space1, identifier))(input)?;

    Ok((
        input,
        Statement::Pin {
            board,
            pin,
            mode: mode.to_string(),
        },
    ))
}

/// `component.terminal`
fn parse_endpoint(input: &str) -> IResult<&str, (String, String)> {
    map(separated_pair(identifier, char('.'), identifier), |(c, t): (&str, &str)| {
        (c.to_string(), t.to_string())
    })(input)
}

fn parse_property(input: &str) -> IResult<&str, (String, String)> {
    map(
        separated_pair(identifier, char('='), take_while1(|c: char| !c.is_whitespace())),
        |(key, value): (&str, &str)| (key.to_string(), value.to_string()),
    )(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '-')(input)
}
