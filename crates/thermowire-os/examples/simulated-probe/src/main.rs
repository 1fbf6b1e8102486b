use std::time::Duration;

use clap::Parser;

use tracing::level_filters::LevelFilter;
use tracing::{error, info};

use thermowire_drivers::ds18b20::Ds18b20;
use thermowire_drivers::sim::SimBus;

use thermowire_os::Poller;
use thermowire_os::error::Result;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Temperature measured by the simulated sensor, in degrees Celsius.
    #[arg(long, default_value_t = 21.5, allow_negative_numbers = true)]
    celsius: f32,

    /// Seconds between two readings.
    #[arg(long, default_value_t = 2)]
    interval: u64,

    /// Number of readings before exiting. Polls forever when omitted.
    #[arg(long)]
    samples: Option<u64>,

    /// Leaves the line without any sensor attached.
    #[arg(long)]
    absent: bool,

    /// Makes the line report it is not ready.
    #[arg(long)]
    not_ready: bool,

    /// Prints every reading as a line of JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Increases log verbosity, up to `-vv`.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

// Converts degrees to the sensor 1/16 °C register, clamped to its range.
fn to_raw(celsius: f32) -> i16 {
    (celsius.clamp(-55.0, 125.0) * 16.0).round() as i16
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let mut sim = if cli.absent {
        SimBus::empty()
    } else {
        SimBus::sensor(to_raw(cli.celsius))
    };
    if cli.not_ready {
        sim = sim.not_ready();
    }

    info!("DS18B20 probe on a simulated line");

    let mut poller = Poller::new(Ds18b20::new(sim.line(), sim.timing()))
        .interval(Duration::from_secs(cli.interval));
    if let Some(samples) = cli.samples {
        poller = poller.samples(samples);
    }

    let summary = poller
        .run(|record| {
            if !cli.json {
                return;
            }
            match record.to_json() {
                Ok(line) => println!("{line}"),
                Err(e) => error!("Unable to serialize sample: {e}"),
            }
        })
        .await?;

    info!("{} readings, {} failed", summary.samples, summary.failures);

    Ok(())
}
