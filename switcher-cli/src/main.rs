use clap::{Parser, Subcommand};
use std::error::Error;
use std::net::Ipv4Addr;
use std::time::Duration;
use switcher_lib::{
    DeviceId, DeviceStatus, StatusEvent, StatusListener, Switcher, SwitcherEvent, discover,
};
use tracing::warn;

#[derive(Parser)]
#[command(name = "switcher", about = "Control Switcher smart switches over the LAN")]
struct Cli {
    /// Phone id as 4 hex digits (all zeros works on stock devices)
    #[arg(long, global = true, default_value = "0000")]
    phone_id: String,

    /// Device password as 8 hex digits
    #[arg(long, global = true, default_value = "00000000")]
    device_pass: String,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Wait for a device broadcast and print its coordinates
    Discover {
        /// Device id (6 hex digits), name or IPv4 address to match
        #[arg(long)]
        identifier: Option<String>,
        /// Seconds to wait before giving up
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },
    /// Stream decoded status broadcasts from all devices
    Listen {
        /// Print one JSON object per broadcast
        #[arg(long)]
        json: bool,
    },
    /// Query a device's live status over TCP
    Status {
        #[arg(long)]
        ip: Ipv4Addr,
        #[arg(long)]
        id: DeviceId,
        #[arg(long)]
        json: bool,
        /// Keep printing this device's broadcasts after the query
        #[arg(long)]
        watch: bool,
    },
    /// Turn a device on
    On {
        #[arg(long)]
        ip: Ipv4Addr,
        #[arg(long)]
        id: DeviceId,
        /// Auto-off after this many minutes (0 stays on)
        #[arg(long, default_value_t = 0)]
        minutes: u32,
    },
    /// Turn a device off
    Off {
        #[arg(long)]
        ip: Ipv4Addr,
        #[arg(long)]
        id: DeviceId,
    },
    /// Configure the default shutdown timer
    SetShutdown {
        #[arg(long)]
        ip: Ipv4Addr,
        #[arg(long)]
        id: DeviceId,
        /// Seconds; values outside [3600, 86340] are clamped
        #[arg(long, default_value_t = 3600)]
        seconds: u32,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match &cli.command {
        Cmd::Discover { identifier, timeout } => {
            let wait = Duration::from_secs(*timeout);
            match discover(identifier.as_deref(), wait).await? {
                Some(found) => {
                    println!("Found {} [{}] at {}", found.status.name, found.id, found.addr);
                    print_status(&found.status, false)?;
                }
                None => println!("No device found within {timeout}s"),
            }
        }
        Cmd::Listen { json } => {
            let mut listener = StatusListener::bind().await?;
            println!("Listening for status broadcasts (ctrl-c to stop)...");
            while let Some(event) = listener.recv().await {
                match event {
                    StatusEvent::Status(status) => {
                        if *json {
                            println!("{}", serde_json::to_string(&status)?);
                        } else {
                            println!("{status}");
                        }
                    }
                    StatusEvent::Error(message) => warn!("listener error: {message}"),
                }
            }
        }
        Cmd::Status { ip, id, json, watch } => {
            let mut device = client(&cli, *ip, *id)?;
            let status = device.query_status().await?;
            print_status(&status, *json)?;
            if *watch {
                let mut events = device.events().expect("events taken once");
                device.watch_status().await?;
                while let Some(event) = events.recv().await {
                    match event {
                        SwitcherEvent::Status(status) => {
                            if *json {
                                println!("{}", serde_json::to_string(&status)?);
                            } else {
                                println!("{status}");
                            }
                        }
                        SwitcherEvent::Error(message) => warn!("session error: {message}"),
                        _ => {}
                    }
                }
            }
            device.close();
        }
        Cmd::On { ip, id, minutes } => {
            let mut device = client(&cli, *ip, *id)?;
            device.turn_on(*minutes).await?;
            if *minutes > 0 {
                println!("{id} is on, auto-off in {minutes} minutes");
            } else {
                println!("{id} is on");
            }
            device.close();
        }
        Cmd::Off { ip, id } => {
            let mut device = client(&cli, *ip, *id)?;
            device.turn_off().await?;
            println!("{id} is off");
            device.close();
        }
        Cmd::SetShutdown { ip, id, seconds } => {
            let mut device = client(&cli, *ip, *id)?;
            let applied = device.set_default_shutdown(*seconds).await?;
            println!("{id} default shutdown set to {}", format_duration(applied));
            device.close();
        }
    }
    Ok(())
}

fn client(cli: &Cli, ip: Ipv4Addr, id: DeviceId) -> Result<Switcher, Box<dyn Error>> {
    let phone_id = parse_hex::<2>(&cli.phone_id, "phone id")?;
    let password = parse_hex::<4>(&cli.device_pass, "device password")?;
    Ok(Switcher::new(id, ip).with_credentials(phone_id, password))
}

fn parse_hex<const N: usize>(s: &str, what: &str) -> Result<[u8; N], Box<dyn Error>> {
    let raw = hex::decode(s)?;
    raw.try_into()
        .map_err(|_| format!("{what} must be {N} bytes ({} hex digits)", N * 2).into())
}

fn print_status(status: &DeviceStatus, json: bool) -> Result<(), Box<dyn Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(status)?);
        return Ok(());
    }
    println!("Device: {} [{}] at {}", status.name, status.id, status.ip);
    println!("  State: {}", status.state);
    println!("  Power: {} W", status.power_watts);
    println!("  Remaining: {}", format_duration(status.remaining_seconds));
    println!(
        "  Default shutdown: {}",
        format_duration(status.default_shutdown_seconds)
    );
    Ok(())
}

fn format_duration(seconds: u32) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}
