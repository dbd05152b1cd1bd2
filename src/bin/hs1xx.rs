//! Command-line control of an HS1xx plug.
//!
//! Prints the reply of the chosen command as indented JSON and exits with a
//! non-zero status on any failure, including errors reported by the device.

use clap::{Parser, ValueEnum};
use hs1xx::protocol::DEFAULT_PORT;
use hs1xx::{CallContext, DeviceApi, EmeterApi, Plug, PlugApi, RpcResult, ShpError};
use log::error;
use serde::Serialize;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "hs1xx", version, about = "Control a TP-Link HS1xx smart plug")]
struct Args {
    /// Address of the plug
    #[arg(short, long)]
    device: String,

    /// Control port of the plug
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Call deadline in seconds
    #[arg(short, long, default_value_t = 10)]
    timeout: u64,

    /// Command to run
    #[arg(value_enum)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Command {
    On,
    Off,
    Sysinfo,
    Relay,
    Meter,
    Wifi,
}

const WIFI_SCAN_TIMEOUT: Duration = Duration::from_secs(20);

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(args).await {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            eprintln!("hs1xx: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<String, ShpError> {
    let plug = Plug::from_client(
        Plug::builder(args.device)
            .port(args.port)
            .timeout(Duration::from_secs(args.timeout))
            .build(),
    );
    let ctx = CallContext::new();

    match args.command {
        Command::On => render(plug.turn_on(&ctx).await),
        Command::Off => render(plug.turn_off(&ctx).await),
        Command::Sysinfo => render(plug.sys_info(&ctx).await),
        Command::Relay => {
            let state = plug.get_relay_state(&ctx).await?;
            Ok(serde_json::to_string_pretty(&state)?)
        }
        Command::Meter => render(plug.emeter().get_realtime(&ctx).await),
        Command::Wifi => {
            let ctx = ctx.with_timeout(WIFI_SCAN_TIMEOUT + Duration::from_secs(args.timeout));
            render(
                plug.device()
                    .get_wifi_scan_info(&ctx, true, WIFI_SCAN_TIMEOUT)
                    .await,
            )
        }
    }
}

fn render<T: RpcResult + Serialize>(value: T) -> Result<String, ShpError> {
    value.err()?;
    Ok(serde_json::to_string_pretty(&value)?)
}
