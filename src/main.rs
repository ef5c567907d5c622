use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::*;
use log::{error, info};
use std::path::Path;

use breadsim::cli::{CliArgs, OutputFormat};
use breadsim::simulator::{write_csv, Simulator, SimulatorConfig};

fn main() {
    let matches = create_cli().get_matches();

    let level = match matches.get_count("verbose") {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run_application(&matches) {
        error!("{}", format!("Error: {:#}", e).red());
        std::process::exit(1);
    }
}

fn create_cli() -> Command {
    Command::new("breadsim")
        .version(breadsim::VERSION)
        .about("Breadboard circuit simulator: nets, voltages and wiring diagnostics")
        .arg(
            Arg::new("input")
                .help("Circuit file (.json layout or text format)")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Output file for simulation results"),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_name("FORMAT")
                .default_value("text")
                .value_parser(["text", "csv", "json"])
                .help("Output format"),
        )
        .arg(
            Arg::new("press")
                .long("press")
                .value_name("ID")
                .action(ArgAction::Append)
                .help("Press a button or close a switch before simulating (repeatable)"),
        )
        .arg(
            Arg::new("pin")
                .long("pin")
                .value_name("BOARD.PIN=MODE")
                .action(ArgAction::Append)
                .help("Drive a board pin HIGH, LOW or INPUT (repeatable)"),
        )
        .arg(
            Arg::new("max-rounds")
                .long("max-rounds")
                .value_name("N")
                .help("Cap on voltage propagation rounds"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Increase verbosity level"),
        )
}

fn run_application(matches: &ArgMatches) -> anyhow::Result<()> {
    let args = CliArgs::from_matches(matches)?;

    info!("{}", "Starting breadsim".green().bold());
    info!("Input file: {}", args.input_file.bright_blue());

    // Validate input file exists
    if !Path::new(&args.input_file).exists() {
        return Err(anyhow::anyhow!("Input file '{}' not found", args.input_file));
    }

    let mut config = SimulatorConfig::default();
    if let Some(rounds) = args.max_rounds {
        config.max_propagation_rounds = rounds;
    }

    let mut simulator = Simulator::with_config(config);
    simulator.load_file(&args.input_file)?;

    for id in &args.pressed {
        simulator.set_switch_pressed(id, true)?;
        info!("Pressed {}", id.bright_blue());
    }
    for pin in &args.pin_overrides {
        simulator.set_pin_mode(&pin.board, &pin.pin, pin.mode)?;
        info!("Set {}.{} to {:?}", pin.board, pin.pin, pin.mode);
    }

    let result = simulator.simulate();
    let valid = result.is_valid;

    match (&args.output_file, args.output_format) {
        (Some(output_file), format) => {
            simulator.export_results(output_file, format)?;
            info!("Results exported to: {}", output_file.bright_green());
        }
        (None, OutputFormat::Json) => {
            if let Some(results) = simulator.get_results() {
                println!("{}", serde_json::to_string_pretty(results)?);
            }
        }
        (None, OutputFormat::Csv) => {
            if let Some(results) = simulator.get_results() {
                write_csv(results, std::io::stdout())?;
            }
        }
        (None, OutputFormat::Text) => simulator.print_summary(),
    }

    if valid {
        info!("{}", "Circuit is valid".green().bold());
    } else {
        info!("{}", "Circuit has wiring errors".yellow().bold());
    }
    Ok(())
}
