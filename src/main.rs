//! linebridge - print the newest line from a serial device
//!
//! Starts a bridge on the configured port and prints the latest record at a
//! fixed interval until the duration expires or the process is interrupted.

use anyhow::Context;
use clap::Parser;
use linebridge::{
    config::{default_config_path, BridgeConfig},
    device::list_ports,
    BridgeEvent, LineBridge, ScriptedLink, SerialLink, StopToken,
};
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "linebridge", version, about = "Print the newest line from a serial device")]
struct Args {
    /// Serial port (overrides the config file)
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate (overrides the config file)
    #[arg(short, long)]
    baud: Option<u32>,

    /// Config file (default: platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// How often to poll for the newest line, in milliseconds
    #[arg(long, default_value_t = 100)]
    interval_ms: u64,

    /// Stop after this many seconds
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Print records as JSON
    #[arg(long)]
    json: bool,

    /// List available serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Read from a simulated device instead of a serial port
    #[arg(long)]
    mock: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,linebridge=debug")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    if args.list_ports {
        let ports = list_ports()?;
        if ports.is_empty() {
            println!("No serial ports found");
        }
        for port in ports {
            println!("{}", port);
        }
        return Ok(());
    }

    let mut config = match args.config {
        Some(ref path) => BridgeConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => {
            tracing::debug!("Config path: {:?}", default_config_path());
            BridgeConfig::load_or_default()
        }
    };
    if let Some(port) = args.port {
        config.device.port = port;
    }
    if let Some(baud) = args.baud {
        config.device.baud_rate = baud;
    }
    config.validate()?;

    tracing::info!(
        "Reading from {} at {} baud",
        config.device.port,
        config.device.baud_rate
    );

    let token = StopToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        tracing::info!("Interrupt received, stopping");
        handler_token.cancel();
    })
    .context("Failed to install Ctrl+C handler")?;

    let mut bridge = if args.mock {
        let device = ScriptedLink::new();
        spawn_simulator(device.clone(), token.clone());
        LineBridge::with_token(device, config, token.clone())
    } else {
        let link = SerialLink::new(config.device.clone());
        LineBridge::with_token(link, config, token.clone())
    };
    bridge.start()?;

    let poll = PollOptions {
        interval: Duration::from_millis(args.interval_ms.max(1)),
        deadline: args
            .duration_secs
            .map(|s| Instant::now() + Duration::from_secs(s)),
        json: args.json,
    };
    let printed = poll_records(&bridge, &token, &poll, &mut std::io::stdout().lock())?;

    tracing::info!("Shutting down...");
    bridge.stop()?;

    let stats = bridge.stats();
    tracing::info!(
        "{} records ({} printed), {} bytes read, {} dropped, {} disconnects",
        stats.records_published,
        printed,
        stats.bytes_read,
        stats.bytes_dropped,
        stats.disconnects
    );

    Ok(())
}

struct PollOptions {
    interval: Duration,
    deadline: Option<Instant>,
    json: bool,
}

/// Print the newest record every `interval` until the deadline passes or
/// `token` is cancelled; returns how many records were printed
fn poll_records(
    bridge: &LineBridge,
    token: &StopToken,
    options: &PollOptions,
    out: &mut impl Write,
) -> anyhow::Result<u64> {
    let events = bridge.events();
    let mut printed = 0;

    while options.deadline.map_or(true, |d| Instant::now() < d) {
        for event in events.try_iter() {
            if let BridgeEvent::StateChanged(state) = event {
                tracing::info!("Bridge is {}", state);
            }
        }

        if let Some(record) = bridge.latest() {
            if options.json {
                writeln!(out, "{}", serde_json::to_string(&record)?)?;
            } else {
                match record.values() {
                    Ok(values) => writeln!(out, "{:>8} {:?}", record.sequence, values)?,
                    Err(_) => writeln!(out, "{:>8} {}", record.sequence, record.text)?,
                }
            }
            printed += 1;
        }

        if token.wait_timeout(options.interval) {
            break;
        }
    }

    Ok(printed)
}

/// Feed the simulated device a tensile-test style `position force` line
/// every 20 ms until stopped
fn spawn_simulator(device: ScriptedLink, token: StopToken) {
    std::thread::spawn(move || {
        let start = Instant::now();
        while !token.wait_timeout(Duration::from_millis(20)) {
            let t = start.elapsed().as_secs_f64();
            let position = (t * 0.1) % 3.0;
            let force = 250.0 * (1.0 - (-position * 2.0).exp());
            device.feed(format!("{:.3} {:.2}\r\n", position, force).as_bytes());
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use linebridge::{BridgeConfig, BridgeState};

    #[test]
    fn test_poll_ends_when_token_cancelled() {
        let token = StopToken::new();
        let device = ScriptedLink::new();
        let mut config = BridgeConfig::default();
        config.bridge.read_timeout_ms = 5;
        let mut bridge = LineBridge::with_token(device.clone(), config, token.clone());
        bridge.start().unwrap();

        let feeder = {
            let token = token.clone();
            std::thread::spawn(move || {
                device.feed(b"junk\r\n1.5 2.5\r\n");
                std::thread::sleep(Duration::from_millis(200));
                token.cancel();
            })
        };

        let options = PollOptions {
            interval: Duration::from_millis(10),
            deadline: None,
            json: false,
        };
        let mut out = Vec::new();
        let printed = poll_records(&bridge, &token, &options, &mut out).unwrap();
        feeder.join().unwrap();

        assert_eq!(printed, 1);
        assert!(String::from_utf8(out).unwrap().contains("[1.5, 2.5]"));

        bridge.stop().unwrap();
        assert_eq!(bridge.state(), BridgeState::Stopped);
    }

    #[test]
    fn test_poll_json_until_deadline() {
        let device = ScriptedLink::new();
        let mut bridge = LineBridge::new(device.clone(), BridgeConfig::default());
        bridge.start().unwrap();
        device.feed(b"\nhello\n");

        let options = PollOptions {
            interval: Duration::from_millis(10),
            deadline: Some(Instant::now() + Duration::from_millis(300)),
            json: true,
        };
        let mut out = Vec::new();
        poll_records(&bridge, &bridge.stop_token(), &options, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("\"text\":\"hello\""));
        bridge.stop().unwrap();
    }
}
