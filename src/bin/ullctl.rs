//! Operator CLI for the fast-path engine's control plane. Talks to the
//! Unix domain socket the engine listens on, one request per invocation.

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use ull_fastpath::config::{Config, Protocol};
use ull_fastpath::init_tracing;

const DEFAULT_SOCKET: &str = "/run/ull-fastpath/control.sock";

#[derive(Parser, Debug)]
#[command(name = "ullctl", about = "Control the ull-fastpath engine")]
struct Cli {
    #[arg(long, value_name = "PATH", default_value = DEFAULT_SOCKET)]
    socket: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the current configuration and statistics.
    Status,
    /// Enable the fast path (requires a previously set target).
    Enable,
    /// Disable the fast path; every frame bypasses.
    Disable,
    /// Set the target/response endpoint.
    Config {
        target_ip: Ipv4Addr,
        target_port: u16,
        protocol: ProtocolArg,
        #[arg(long, value_name = "GROUP")]
        multicast: Option<Ipv4Addr>,
        #[arg(long, default_value_t = 0)]
        response_port: u16,
        #[arg(long)]
        response_ip: Option<Ipv4Addr>,
    },
    /// Print statistics.
    Stats,
    /// Reset statistics to zero.
    Reset,
    /// Flush every tracked TCP connection.
    ClearConnections,
}

#[derive(Copy, Clone, Debug, clap::ValueEnum)]
enum ProtocolArg {
    Tcp,
    Udp,
}

#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum Request {
    SetConfig { config: Config },
    GetConfig,
    GetStats,
    ResetStats,
    FlushConnections,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Response {
    Config { ok: bool, config: Config },
    Stats { ok: bool, stats: ull_fastpath::StatsSnapshot },
    Ack { ok: bool },
    Error { ok: bool, error: String },
}

async fn round_trip(socket: &PathBuf, request: &Request) -> std::io::Result<Response> {
    let stream = UnixStream::connect(socket).await?;
    let (read_half, mut write_half) = stream.into_split();
    let mut payload = serde_json::to_string(request).expect("request always serializes");
    payload.push('\n');
    write_half.write_all(payload.as_bytes()).await?;
    let mut lines = BufReader::new(read_half).lines();
    match lines.next_line().await? {
        Some(line) => Ok(serde_json::from_str(&line)
            .unwrap_or_else(|e| Response::Error { ok: false, error: e.to_string() })),
        None => Ok(Response::Error { ok: false, error: "no response from control socket".into() }),
    }
}

fn print_status(config: &Config, stats: &ull_fastpath::StatsSnapshot) {
    print!("{}", ull_fastpath::status::render(config, stats));
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = run(&cli).await;
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<(), String> {
    match &cli.command {
        Command::Status => {
            let config_resp = round_trip(&cli.socket, &Request::GetConfig).await.map_err(|e| e.to_string())?;
            let stats_resp = round_trip(&cli.socket, &Request::GetStats).await.map_err(|e| e.to_string())?;
            match (config_resp, stats_resp) {
                (Response::Config { config, .. }, Response::Stats { stats, .. }) => {
                    print_status(&config, &stats);
                    Ok(())
                }
                (Response::Error { error, .. }, _) | (_, Response::Error { error, .. }) => Err(error),
                _ => Err("unexpected response shape".into()),
            }
        }
        Command::Stats => {
            let resp = round_trip(&cli.socket, &Request::GetStats).await.map_err(|e| e.to_string())?;
            match resp {
                Response::Stats { stats, .. } => {
                    println!("{stats:#?}");
                    Ok(())
                }
                Response::Error { error, .. } => Err(error),
                _ => Err("unexpected response shape".into()),
            }
        }
        Command::Enable | Command::Disable => {
            let enabled = matches!(cli.command, Command::Enable);
            let current = round_trip(&cli.socket, &Request::GetConfig).await.map_err(|e| e.to_string())?;
            let mut config = match current {
                Response::Config { config, .. } => config,
                Response::Error { error, .. } => return Err(error),
                _ => return Err("unexpected response shape".into()),
            };
            config.enabled = enabled;
            apply_config(cli, config).await
        }
        Command::Config { target_ip, target_port, protocol, multicast, response_port, response_ip } => {
            let config = Config {
                enabled: true,
                target_ip: *target_ip,
                target_port: *target_port,
                protocol: match protocol {
                    ProtocolArg::Tcp => Protocol::Tcp,
                    ProtocolArg::Udp => Protocol::Udp,
                },
                response_ip: response_ip.unwrap_or(*target_ip),
                response_port: if *response_port == 0 { *target_port } else { *response_port },
                app_logic_type: 0,
                multicast: multicast.is_some(),
                multicast_group: multicast.unwrap_or(Ipv4Addr::UNSPECIFIED),
            };
            apply_config(cli, config).await
        }
        Command::Reset => {
            let resp = round_trip(&cli.socket, &Request::ResetStats).await.map_err(|e| e.to_string())?;
            ack_or_error(resp)
        }
        Command::ClearConnections => {
            let resp = round_trip(&cli.socket, &Request::FlushConnections).await.map_err(|e| e.to_string())?;
            ack_or_error(resp)
        }
    }
}

async fn apply_config(cli: &Cli, config: Config) -> Result<(), String> {
    let resp = round_trip(&cli.socket, &Request::SetConfig { config }).await.map_err(|e| e.to_string())?;
    ack_or_error(resp)
}

fn ack_or_error(response: Response) -> Result<(), String> {
    match response {
        Response::Ack { ok: true } => {
            println!("ok");
            Ok(())
        }
        Response::Error { error, .. } => Err(error),
        _ => Err("unexpected response shape".into()),
    }
}
