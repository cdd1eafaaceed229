use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{debug, info};

use lifx_control_lib::color::ColorSpec;
use lifx_control_lib::effects::{EffectKind, EffectParams, SessionHandle};
use lifx_control_lib::net::Discovery;
use lifx_control_lib::{DeviceInfo, LifxClient, LifxConfig, LifxDevice};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    handle_cli(cli).await
}

/// This struct defines the command line interface of the application
#[derive(Parser)]
#[clap(
    name = "lifx",
    about = "Controls LIFX bulbs on the local network",
    version
)]
pub struct Cli {
    #[clap(flatten)]
    pub network: NetworkArgs,

    #[clap(subcommand)]
    pub command: Commands,
}

/// Settings shared by every subcommand. Anything given here wins over the
/// config file.
#[derive(Args)]
pub struct NetworkArgs {
    /// YAML file with library settings
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    /// Subnet to discover on, in CIDR form
    #[clap(short, long, global = true)]
    pub subnet: Option<String>,

    /// Reply window per discovery attempt, in milliseconds
    #[clap(short, long, global = true)]
    pub timeout: Option<u64>,

    /// Discovery attempts
    #[clap(short, long, global = true)]
    pub retries: Option<u32>,

    /// Bulb UDP port
    #[clap(long, global = true)]
    pub port: Option<u16>,

    /// Transition time for power and color changes, in milliseconds
    #[clap(short, long, global = true)]
    pub fade: Option<u64>,
}

/// Supported output formats for the `discover` and `info` commands.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum OutputFormat {
    /// Plain text format.
    Plaintext,
    /// JSON format.
    Json,
    /// YAML format.
    Yaml,
}

/// Subcommands available for the CLI
#[derive(Subcommand)]
pub enum Commands {
    /// Lists the bulbs that answer on the subnet
    #[clap(name = "discover")]
    Discover {
        /// Output format (plaintext, json, yaml)
        #[clap(short, long, value_enum, default_value_t = OutputFormat::Plaintext)]
        output: OutputFormat,
    },
    /// Prints everything a bulb reports about itself
    #[clap(name = "info")]
    Info {
        /// Label, serial, IP address or "all"
        target: String,

        /// Output format (plaintext, json, yaml)
        #[clap(short, long, value_enum, default_value_t = OutputFormat::Plaintext)]
        output: OutputFormat,
    },
    /// Turns bulbs on
    #[clap(name = "on")]
    On { target: String },
    /// Turns bulbs off
    #[clap(name = "off")]
    Off { target: String },
    /// Sets a color: a name, #rrggbb, rgb(r,g,b), hsb(h,s,b), hsbk(h,s,b,k) or kelvin(k,b)
    #[clap(name = "color")]
    Color {
        target: String,
        #[clap(value_parser = parse_color)]
        color: ColorSpec,
    },
    /// Renames a bulb
    #[clap(name = "label")]
    Label { target: String, label: String },
    /// Runs an effect until it finishes or Ctrl-C is pressed
    #[clap(name = "effect")]
    Effect {
        target: String,

        #[clap(value_enum)]
        effect: EffectKind,

        /// Milliseconds per cycle
        #[clap(short, long, value_parser = parse_duration, default_value = "1000")]
        period: Duration,

        /// Number of cycles
        #[clap(short, long, default_value_t = 10.0)]
        cycles: f32,

        /// Repeat until interrupted
        #[clap(short, long = "loop")]
        looped: bool,

        /// Peak brightness, 0-1
        #[clap(short, long, default_value_t = 1.0)]
        brightness: f64,

        /// Leave the last color in place instead of restoring the previous one
        #[clap(long)]
        persist: bool,
    },
    /// Lists the available effects
    #[clap(name = "effects")]
    Effects {
        /// Only effects for matrix devices
        #[clap(long)]
        matrix: bool,
    },
    /// Stops whatever effect is running on bulbs
    #[clap(name = "stop")]
    Stop { target: String },
}

fn parse_duration(s: &str) -> Result<Duration, &'static str> {
    let millis = s
        .parse::<u64>()
        .map_err(|_| "could not parse duration in milliseconds")?;
    Ok(Duration::from_millis(millis))
}

fn parse_color(s: &str) -> Result<ColorSpec, String> {
    s.parse::<ColorSpec>().map_err(|e| e.to_string())
}

fn load_config(args: &NetworkArgs) -> Result<LifxConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_yaml::from_str(&text)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        }
        None => LifxConfig::default(),
    };
    if let Some(subnet) = &args.subnet {
        config.subnet = subnet.clone();
    }
    if let Some(timeout) = args.timeout {
        config.timeout_ms = timeout;
    }
    if let Some(retries) = args.retries {
        config.retries = retries;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(fade) = args.fade {
        config.fade_ms = fade;
    }
    Ok(config)
}

/// Discovers, then resolves `target` against what answered.
async fn find_targets(client: &LifxClient, target: &str) -> Result<Vec<LifxDevice>> {
    let found = client
        .discover_configured()
        .await
        .context("Discovery failed")?;
    debug!("Discovery found {} device(s)", found.len());
    let devices = client.resolve(target)?;
    if devices.is_empty() {
        anyhow::bail!("No devices found on {}", client.config().subnet);
    }
    Ok(devices)
}

/// Renders `value` in the requested format; `plaintext` supplies the human
/// readable form.
fn format_output<T, F>(value: &T, output: OutputFormat, plaintext: F) -> Result<String>
where
    T: serde::Serialize,
    F: FnOnce(&T) -> String,
{
    Ok(match output {
        OutputFormat::Plaintext => plaintext(value),
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
    })
}

fn format_info(infos: &[DeviceInfo]) -> String {
    let mut text = String::new();
    for info in infos {
        text.push_str(&format!("{}\n", info.label));
        let mut line = |name: &str, value: String| {
            text.push_str(&format!("  {:<14}{}\n", format!("{}:", name), value));
        };
        line("Serial", info.serial.to_string());
        line("Address", info.address.to_string());
        line("Product", info.product.name.clone());
        if let Some(on) = info.power {
            line("Power", if on { "on" } else { "off" }.to_string());
        }
        if let Some(color) = info.color {
            line("Color", color.to_string());
        }
        if let Some(firmware) = &info.firmware {
            line("Firmware", firmware.clone());
        }
        if let Some(dbm) = info.wifi_signal_dbm {
            line("WiFi", format!("{:.1} dBm", dbm));
        }
        if let Some(location) = &info.location {
            line("Location", location.clone());
        }
        if let Some(group) = &info.group {
            line("Group", group.clone());
        }
        if let Some(uptime) = info.uptime_secs {
            line("Uptime", format!("{}h {}m", uptime / 3600, uptime % 3600 / 60));
        }
        if let Some(infrared) = info.infrared {
            line("Infrared", infrared.to_string());
        }
        if let Some(zones) = &info.zones {
            line("Zones", zones.len().to_string());
        }
        if let Some(effect) = &info.multizone_effect {
            line("Zone Effect", effect.type_name());
            if effect.is_running() {
                line("Speed", format!("{} ms/cycle", effect.speed));
            }
        }
        if let Some((width, height)) = info.matrix_size {
            line("Matrix", format!("{}x{}", width, height));
        }
    }
    text
}

/// Waits for every session to end on its own, or stops them all on Ctrl-C.
async fn wait_for_effects(client: &LifxClient, handles: Vec<SessionHandle>) -> Result<()> {
    let all_done = async {
        for mut handle in handles {
            handle.finished().await;
        }
    };
    tokio::select! {
        _ = all_done => info!("Effect finished"),
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            println!("Stopping...");
            client.stop_all_effects().await;
        }
    }
    Ok(())
}

async fn switch_power(client: &LifxClient, target: &str, on: bool) -> Result<()> {
    let state = if on { "on" } else { "off" };
    if target.eq_ignore_ascii_case("all") {
        client.broadcast_power(on, None).await?;
        println!("All devices turned {}", state);
        return Ok(());
    }
    for device in find_targets(client, target).await? {
        client.set_power(&device, on, None).await?;
        println!("{} turned {}", device, state);
    }
    Ok(())
}

async fn handle_cli(cli: Cli) -> Result<()> {
    if let Commands::Effects { matrix } = cli.command {
        for kind in EffectKind::list(matrix) {
            println!("{}", kind);
        }
        return Ok(());
    }

    let config = load_config(&cli.network)?;
    let client = LifxClient::new(config)
        .await
        .context("Failed to open the UDP socket")?;

    match cli.command {
        Commands::Discover { output } => {
            let devices = client.discover_configured().await?;
            let text = format_output(&devices, output, |devices| {
                Discovery::format_devices(devices)
            })?;
            print!("{}", text);
        }
        Commands::Info { target, output } => {
            let mut infos = Vec::new();
            for device in find_targets(&client, &target).await? {
                match client.query_info(&device).await {
                    Ok(info) => infos.push(info),
                    Err(e) if e.is_timeout() => println!("{}: no response", device),
                    Err(e) => return Err(e.into()),
                }
            }
            println!("{}", format_output(&infos, output, |infos| format_info(infos))?);
        }
        Commands::On { target } => switch_power(&client, &target, true).await?,
        Commands::Off { target } => switch_power(&client, &target, false).await?,
        Commands::Color { target, color } => {
            let hsbk = color.to_hsbk()?;
            if target.eq_ignore_ascii_case("all") {
                client.broadcast_color(hsbk, None).await?;
                println!("All devices set to {}", color);
            } else {
                for device in find_targets(&client, &target).await? {
                    client.set_color(&device, hsbk, None).await?;
                    println!("{} set to {}", device, color);
                }
            }
        }
        Commands::Label { target, label } => {
            let device = {
                client.discover_configured().await?;
                client.resolve_one(&target)?
            };
            client.set_label(&device, &label).await?;
            println!("{} renamed to {}", device.serial, label);
        }
        Commands::Effect {
            target,
            effect,
            period,
            cycles,
            looped,
            brightness,
            persist,
        } => {
            let params = EffectParams {
                period,
                cycles: if looped { 0.0 } else { cycles },
                brightness: brightness.clamp(0.0, 1.0),
                transient: !persist,
                ..EffectParams::default()
            };
            let mut handles = Vec::new();
            for device in find_targets(&client, &target).await? {
                let handle = client.run_effect(&device, effect, params.clone()).await?;
                println!("Running {} on {}", effect, device);
                handles.push(handle);
            }
            if looped {
                println!("Press Ctrl-C to stop");
            }
            wait_for_effects(&client, handles).await?;
        }
        Commands::Stop { target } => {
            for device in find_targets(&client, &target).await? {
                client.halt_effects(&device).await?;
                println!("Stopped effects on {}", device);
            }
        }
        Commands::Effects { .. } => {}
    }

    Ok(())
}
