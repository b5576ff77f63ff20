use clap::{Args, Parser, Subcommand};
use gcs_serial_link::link::DEFAULT_BAUD;
use gcs_serial_link::{
    logging, ConfigLoader, DataBits, FlowControl, LinkError, LinkEvent, LinkManager, Parity,
    SerialConfiguration, SettingsStore, StopBits,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::thread;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    author = "Gemini",
    version,
    about = "Serial link monitor for ground-station telemetry radios and flight controllers."
)]
struct Cli {
    /// Configuration file to use instead of the normal lookup.
    #[arg(long, global = true)]
    config_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect a link, print what it receives and send stdin lines to it.
    Monitor(MonitorArgs),
    /// List serial ports the OS knows about.
    Ports,
}

#[derive(Args, Debug)]
struct MonitorArgs {
    /// Use a stored link configuration by name.
    #[arg(long, conflicts_with = "port")]
    config: Option<String>,

    /// Serial device, e.g. /dev/ttyUSB0 or COM3.
    #[arg(short, long, required_unless_present = "config")]
    port: Option<String>,

    /// Name for an ad-hoc link.
    #[arg(long, default_value = "monitor")]
    name: String,

    #[arg(short, long, default_value_t = DEFAULT_BAUD)]
    baud: u32,

    #[arg(long, default_value_t = 8)]
    data_bits: u8,

    #[arg(long, default_value = "none")]
    parity: Parity,

    #[arg(long, default_value = "1")]
    stop_bits: StopBits,

    #[arg(long, default_value = "none")]
    flow_control: FlowControl,

    /// Print received bytes as hex instead of text.
    #[arg(long)]
    hex: bool,

    /// Pulse DTR/RTS right after connecting.
    #[arg(long)]
    reset: bool,

    /// Persist the link configuration before connecting.
    #[arg(long)]
    save: bool,
}

impl MonitorArgs {
    fn configuration(&self, port: &str) -> Result<SerialConfiguration, LinkError> {
        let mut config = SerialConfiguration::new(self.name.clone());
        config.set_port_name(port)?;
        config.set_baud(self.baud)?;
        config.set_data_bits(DataBits::try_from(self.data_bits).map_err(|e| {
            LinkError::invalid("data_bits", e.to_string())
        })?)?;
        config.set_stop_bits(self.stop_bits)?;
        config.set_parity(self.parity)?;
        config.set_flow_control(self.flow_control)?;
        Ok(config)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let loader = match &cli.config_file {
        Some(path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    logging::init(&loader.config().logging)?;

    match cli.command {
        Command::Monitor(args) => monitor(&loader, args),
        Command::Ports => list_ports(),
    }
}

fn list_ports() -> Result<(), Box<dyn std::error::Error>> {
    let ports = serialport::available_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        match port.port_type {
            serialport::SerialPortType::UsbPort(usb) => println!(
                "{}\tUSB {:04x}:{:04x}\t{}",
                port.port_name,
                usb.vid,
                usb.pid,
                usb.product.unwrap_or_default()
            ),
            other => println!("{}\t{:?}", port.port_name, other),
        }
    }
    Ok(())
}

fn monitor(loader: &ConfigLoader, args: MonitorArgs) -> Result<(), Box<dyn std::error::Error>> {
    let settings_path = loader.settings_path()?;
    let mut store = SettingsStore::load_from(&settings_path)?;
    let manager = LinkManager::with_system_ports(loader.config().link.link_options());
    manager.load_configurations(&store)?;

    let name = match (&args.config, &args.port) {
        (Some(name), _) => name.clone(),
        (None, Some(port)) => {
            let config = args.configuration(port)?;
            if manager.link(config.name()).is_some() {
                manager.remove_link(config.name())?;
            }
            manager.create_link(config)?;
            args.name.clone()
        }
        (None, None) => return Err("either --config or --port is required".into()),
    };
    let link = manager
        .link(&name)
        .ok_or_else(|| LinkError::UnknownLink(name.clone()))?;

    if args.save {
        manager.save_configurations(&mut store)?;
        store.save_to(&settings_path)?;
        info!("Saved link configurations to {}", settings_path.display());
    }

    let events = link.subscribe();
    manager.connect_link(&name)?;
    if args.reset {
        link.request_reset();
    }
    if link.is_bootloader() {
        warn!("{} is attached to a bootloader", name);
    }

    let hex = args.hex;
    let printer = thread::Builder::new()
        .name("monitor-output".to_string())
        .spawn(move || {
            let stdout = io::stdout();
            for event in events.iter() {
                let mut out = stdout.lock();
                let written = match event {
                    LinkEvent::Bytes(bytes) if hex => writeln!(out, "{}", hex_line(&bytes)),
                    LinkEvent::Bytes(bytes) => out.write_all(&bytes),
                    LinkEvent::Error { code, message } => {
                        eprintln!("[{code}] {message}");
                        Ok(())
                    }
                    LinkEvent::Disconnected => break,
                    LinkEvent::Connected | LinkEvent::AboutToClose => Ok(()),
                };
                if written.and_then(|()| out.flush()).is_err() {
                    break;
                }
            }
        })?;

    for line in io::stdin().lock().lines() {
        let mut line = line?;
        line.push('\n');
        if let Err(e) = link.write_bytes(line.as_bytes()) {
            eprintln!("write failed: {e}");
            if matches!(e, LinkError::NotConnected) {
                break;
            }
        }
    }

    manager.disconnect_link(&name)?;
    if printer.join().is_err() {
        warn!("Output thread panicked");
    }
    info!(
        "Closed {}: {} bytes in, {} bytes out",
        name,
        link.bytes_read(),
        link.bytes_written()
    );
    Ok(())
}

fn hex_line(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}
