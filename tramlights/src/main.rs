//! Live tram line A display
//!
//! Polls the vehicle position API for the three branches of the line and
//! shows every tram on a 65-LED strip, one colour per branch.
//!
//! Usage: cargo run -p tramlights -- [OPTIONS]

mod config;
mod console_strip;
mod cycle;
mod fetch;
mod leds;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use log::{info, warn, LevelFilter};
use smart_leds::{SmartLedsWrite, RGB8};
use std::fmt::Debug;
use std::path::PathBuf;

use config::Config;
use console_strip::{ConsoleStrip, NullStrip};
use cycle::CycleDriver;
use fetch::{HttpTransport, HttpVehicleSource, RetryPolicy};
use leds::LedController;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StripKind {
    /// Draw frames as coloured text on stdout
    Console,
    /// Discard frames
    None,
}

#[derive(Parser, Debug)]
#[command(name = "tramlights")]
#[command(about = "Show live tram positions on an LED strip")]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "tramlights.json")]
    config: PathBuf,

    /// Number of refresh cycles to run (0 = run forever)
    #[arg(short = 'n', long, default_value = "0")]
    cycles: u64,

    /// Where frames are rendered
    #[arg(short, long, value_enum, default_value = "console")]
    strip: StripKind,

    /// Override the API endpoint from the configuration
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Write the default configuration to the config path and exit
    #[arg(long)]
    write_default_config: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn verbosity_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Install the logger. The effective level is set afterwards with
/// `log::set_max_level` once the configuration is known.
fn init_logging(verbose: u8) {
    use env_logger::Builder;
    use std::io::Write;

    Builder::new()
        .filter_level(LevelFilter::Trace)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
    log::set_max_level(verbosity_level(verbose));
}

fn run<W>(config: &Config, cycles: u64, strip: W) -> Result<()>
where
    W: SmartLedsWrite<Color = RGB8>,
    W::Error: Debug,
{
    let layout = config.layout();
    let transport = HttpTransport::new(&config.api)?;
    let source = HttpVehicleSource::new(transport, RetryPolicy::from_config(&config.retry));
    let mut leds = LedController::new(strip, layout.led_count, config.brightness);
    if let Err(e) = leds.clear() {
        warn!("Failed to clear strip: {e:?}");
    }

    let mut driver = CycleDriver::new(source, leds, layout, config.cycle_delay());
    driver.run(cycles);
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    if args.write_default_config {
        return Config::default().save(&args.config);
    }

    let mut config = Config::load_or_default(&args.config);
    let mut level = config.log_level.as_level_filter();
    if args.verbose > 0 {
        level = level.max(verbosity_level(args.verbose));
    }
    log::set_max_level(level);
    info!("Log level set to {level}");

    if let Some(endpoint) = args.endpoint {
        config.api.endpoint = endpoint;
    }
    info!(
        "Polling {} (route {}) every {}ms",
        config.api.endpoint, config.api.route_id, config.cycle_delay_ms
    );

    match args.strip {
        StripKind::Console => run(&config, args.cycles, ConsoleStrip::stdout()),
        StripKind::None => run(&config, args.cycles, NullStrip),
    }
}
