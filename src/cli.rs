use clap::ArgMatches;
use anyhow::{anyhow, Result};

use crate::circuit::PinMode;

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub input_file: String,
    pub output_file: Option<String>,
    pub output_format: OutputFormat,
    pub pressed: Vec<String>,
    pub pin_overrides: Vec<PinOverride>,
    pub max_rounds: Option<usize>,
    pub verbose_level: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Csv,
    Json,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "text" | "txt" => Ok(OutputFormat::Text),
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            other => Err(anyhow!("Invalid output format: {}", other)),
        }
    }
}

/// `--pin BOARD.PIN=MODE`
#[derive(Debug, Clone, PartialEq)]
pub struct PinOverride {
    pub board: String,
    pub pin: String,
    pub mode: PinMode,
}

impl CliArgs {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let input_file = matches
            .get_one::<String>("input")
            .ok_or_else(|| anyhow!("Input file is required"))?
            .clone();

        let output_file = matches.get_one::<String>("output").cloned();

        let verbose_level = matches.get_count("verbose");

        let output_format = match matches.get_one::<String>("format") {
            Some(format) => OutputFormat::parse(format)?,
            None => OutputFormat::Text,
        };

        let pressed = matches
            .get_many::<String>("press")
            .map(|ids| ids.cloned().collect())
            .unwrap_or_default();

        let pin_overrides = match matches.get_many::<String>("pin") {
            Some(values) => values.map(|v| parse_pin_override(v)).collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        let max_rounds = match matches.get_one::<String>("max-rounds") {
            Some(value) => {
                let rounds = value
                    .parse::<usize>()
                    .map_err(|e| anyhow!("Invalid --max-rounds '{}': {}", value, e))?;
                if rounds == 0 {
                    return Err(anyhow!("--max-rounds must be at least 1"));
                }
                Some(rounds)
            }
            None => None,
        };

        Ok(CliArgs {
            input_file,
            output_file,
            output_format,
            pressed,
            pin_overrides,
            max_rounds,
            verbose_level,
        })
    }
}

/// Parse `uno.D13=HIGH`
fn parse_pin_override(value: &str) -> Result<PinOverride> {
    let (target, mode) = value
        .split_once('=')
        .ok_or_else(|| anyhow!("Pin override '{}' must look like BOARD.PIN=MODE", value))?;
    let (board, pin) = target
        .trim()
        .split_once('.')
        .ok_or_else(|| anyhow!("Pin override '{}' is missing the board id", value))?;
    let mode = PinMode::parse(mode).ok_or_else(|| anyhow!("Unknown pin mode '{}' (HIGH, LOW or INPUT)", mode))?;

    if board.is_empty() || pin.is_empty() {
        return Err(anyhow!("Pin override '{}' has an empty board or pin", value));
    }

    Ok(PinOverride {
        board: board.to_string(),
        pin: pin.to_string(),
        mode,
    })
}
