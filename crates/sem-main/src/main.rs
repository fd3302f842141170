// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Solar ESS Manager (SEM).
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

mod config;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use config::{AppConfig, ConfigSource};
use sem_core::{EngineConfig, HistoryFilter, ProbeOutcome, Session};
use sem_remote::{RemoteClient, RemoteTelemetryApi, WebSocketPush};
use sem_types::{Channel, ChannelSet, RelayState, TelemetryReading};

#[derive(Debug, Parser)]
#[command(name = "sem", version, about = "Solar ESS Manager - dual-mode energy trading engine")]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Keep the session running (probe, push, poll) until Ctrl-C
    Run,
    /// Probe once and print mode, telemetry, relays and balances
    Status,
    /// Price a selection without selling
    Quote { channels: ChannelSet },
    /// Sell the given channels (e.g. "AB" or "A,C")
    Sell { channels: ChannelSet },
    /// Drive the relays so exactly these channels are on
    Relays { channels: ChannelSet },
    /// Turn every relay off
    Reset,
    /// Delete the whole trade history
    ClearHistory {
        #[arg(long)]
        yes: bool,
    },
    /// Recommend channels for a target power (W)
    Advise { target_w: f64 },
    /// Which channels can still be sold next to `selected`
    Available {
        #[arg(default_value = "")]
        selected: ChannelSet,
    },
    /// List or export trades
    History {
        #[arg(long)]
        channel: Option<Channel>,
        /// Calendar day (YYYY-MM-DD, UTC)
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, value_parser = parse_instant)]
        since: Option<DateTime<Utc>>,
        #[arg(long, value_parser = parse_instant)]
        until: Option<DateTime<Utc>>,
        /// Write CSV here ("-" for stdout) instead of a table
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Hourly telemetry for the last N hours
    Hourly {
        #[arg(default_value_t = 24)]
        hours: u32,
    },
    /// Submit a telemetry reading
    Submit { soc: f64, solar_w: f64, lux: f64 },
    /// Manual balance overrides
    #[command(subcommand)]
    Override(OverrideCommand),
    /// Re-seed every persisted record
    Defaults {
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Debug, Subcommand)]
enum OverrideCommand {
    /// Energy balance (W)
    Energy { watts: f64 },
    /// Cash balance
    Cash { amount: i64 },
    /// One channel's ledger entry (W)
    Ledger { channel: Channel, watts: f64 },
}

fn parse_instant(text: &str) -> Result<DateTime<Utc>, String> {
    sem_types::parse_timestamp(text).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, source) = AppConfig::load(&cli.config)?;
    init_tracing(&config.system.log_level)?;

    match &source {
        ConfigSource::File(path) => info!("✅ Loaded configuration from {}", path.display()),
        ConfigSource::Defaults(path) => {
            warn!(
                "No configuration at {}, using defaults with environment overrides",
                path.display()
            );
        }
    }

    let mut session = build_session(&config)?;
    let result = execute(&mut session, cli.command).await;
    session.teardown().await;
    result
}

fn init_tracing(level: &str) -> Result<()> {
    // Respects RUST_LOG, falls back to the configured level
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")
}

fn build_session(config: &AppConfig) -> Result<Session> {
    info!("📋 Configuration Summary:");
    info!("   Remote: {}", config.remote.base_url);
    info!(
        "   Probe: timeout {}ms every {}s ({:?})",
        config.timing.probe_timeout_ms, config.timing.probe_interval_secs, config.probe.policy
    );
    info!("   Poll fallback: every {}s", config.timing.poll_interval_secs);
    if config.store.in_memory {
        info!("   Store: in memory");
    } else {
        info!("   Store: {}", config.store.path.display());
    }

    let client = RemoteClient::new(config.remote.base_url.clone(), config.command_timeout())?
        .with_retry_config(config.remote.max_retries, config.retry_delay());
    let api = Arc::new(RemoteTelemetryApi::new(Arc::new(client)));

    let push = match &config.remote.push_url {
        Some(url) => WebSocketPush::new(url.clone(), config.command_timeout())?,
        None => WebSocketPush::from_base_url(&config.remote.base_url, config.command_timeout())?,
    };
    info!("   Push: {}", push.url());

    let engine = EngineConfig::from(config.clone());
    Session::init(engine, api, Arc::new(push)).context("Failed to open session")
}

async fn execute(session: &mut Session, command: Command) -> Result<()> {
    if let Command::Run = command {
        return run(session).await;
    }

    match session.probe_now().await {
        ProbeOutcome::Reachable(_) => {}
        ProbeOutcome::Stale { sample, .. } => {
            warn!("⚠️ Remote sample from {} is too old, working locally", sample.timestamp);
        }
        ProbeOutcome::Unreachable(reason) => {
            warn!("⚠️ Remote unreachable, working locally: {}", reason);
        }
    }

    match command {
        Command::Run => Ok(()),
        Command::Status => {
            print_status(session);
            Ok(())
        }
        Command::Quote { channels } => {
            let quote = session.quote(&channels);
            println!(
                "{} channel(s) {}: {} W for {}",
                quote.channel_count, channels, quote.total_watt, quote.total_price
            );
            Ok(())
        }
        Command::Sell { channels } => {
            let record = session.sell(&channels).await.context("Sale failed")?;
            println!(
                "Sold {} W on {} for {} ({} mode)",
                record.total_watt,
                ChannelSet::from_iter(record.channels.iter().copied()),
                record.total_price,
                session.mode()
            );
            print_balances(session);
            Ok(())
        }
        Command::Relays { channels } => {
            let desired = RelayState::with_on(&channels);
            let relays = session
                .apply_relays(desired)
                .await
                .context("Relay command failed")?;
            println!("Relays: {}", relays);
            Ok(())
        }
        Command::Reset => {
            let outcome = session.reset().await.context("Reset failed")?;
            println!("Relays: {}", outcome.relays);
            if !outcome.remote_acknowledged {
                println!("(local only, remote not reached)");
            }
            Ok(())
        }
        Command::ClearHistory { yes } => {
            if !yes {
                anyhow::bail!("refusing to delete the trade history without --yes");
            }
            let removed = session.clear_history()?;
            println!("Removed {} trade(s)", removed);
            Ok(())
        }
        Command::Advise { target_w } => {
            let advice = session.advise(target_w).await?;
            println!("Recommended: {} ({:?})", advice.channels, advice.source);
            Ok(())
        }
        Command::Available { selected } => {
            session.select_channels(selected);
            for (channel, available) in session.available_channels()? {
                println!("{}: {}", channel, if available { "available" } else { "unavailable" });
            }
            Ok(())
        }
        Command::History {
            channel,
            date,
            since,
            until,
            csv,
        } => {
            let filter = HistoryFilter {
                channel,
                date,
                since,
                until,
            };
            export_history(session, &filter, csv)
        }
        Command::Hourly { hours } => {
            for sample in session.hourly_telemetry(hours).await? {
                println!(
                    "{}  soc {:>5.1}%  solar {:>7.1} W  lux {:>8.0}",
                    sample.timestamp,
                    sample.state_of_charge_percent,
                    sample.solar_power_watts,
                    sample.illuminance_lux
                );
            }
            Ok(())
        }
        Command::Submit { soc, solar_w, lux } => {
            let sample = session
                .submit_telemetry(TelemetryReading {
                    state_of_charge_percent: soc,
                    solar_power_watts: solar_w,
                    illuminance_lux: lux,
                })
                .await
                .context("Telemetry submission failed")?;
            println!("Stored sample at {}", sample.timestamp);
            Ok(())
        }
        Command::Override(over) => {
            match over {
                OverrideCommand::Energy { watts } => session.set_energy_balance(watts)?,
                OverrideCommand::Cash { amount } => session.set_cash_balance(amount)?,
                OverrideCommand::Ledger { channel, watts } => {
                    session.set_ledger_entry(channel, watts)?;
                }
            }
            print_balances(session);
            Ok(())
        }
        Command::Defaults { yes } => {
            if !yes {
                anyhow::bail!("refusing to re-seed every record without --yes");
            }
            session.restore_defaults()?;
            print_balances(session);
            Ok(())
        }
    }
}

async fn run(session: &mut Session) -> Result<()> {
    info!("🚀 Starting Solar ESS Manager session");
    let mut modes = session.subscribe_mode();
    session.start().await;
    print_status(session);

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                info!("Shutdown requested");
                return Ok(());
            }
            changed = modes.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let mode = *modes.borrow_and_update();
                println!("Mode: {}", mode);
            }
        }
    }
}

fn export_history(session: &Session, filter: &HistoryFilter, csv: Option<PathBuf>) -> Result<()> {
    match csv {
        Some(path) if path.as_os_str() == "-" => {
            session.export_history_csv(filter, std::io::stdout().lock())?;
        }
        Some(path) => {
            let file = std::fs::File::create(&path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let written = session.export_history_csv(filter, file)?;
            println!("Wrote {} trade(s) to {}", written, path.display());
        }
        None => {
            let records = session.history(filter);
            if records.is_empty() {
                println!("No trades");
            }
            for record in records {
                println!(
                    "{}  {:<8}  {:>6} W  {:>8}",
                    record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    ChannelSet::from_iter(record.channels.iter().copied()).to_string(),
                    record.total_watt,
                    record.total_price
                );
            }
        }
    }
    Ok(())
}

fn print_status(session: &Session) {
    let snapshot = session.snapshot();
    println!("Mode: {}", session.mode());
    match &snapshot.telemetry {
        Some(sample) => println!(
            "Telemetry: soc {:.1}%  solar {:.1} W  lux {:.0}  at {}",
            sample.state_of_charge_percent,
            sample.solar_power_watts,
            sample.illuminance_lux,
            sample.timestamp
        ),
        None => println!("Telemetry: none"),
    }
    println!("Relays: {}", snapshot.relay_state);
    print_balances(session);
}

fn print_balances(session: &Session) {
    let snapshot = session.snapshot();
    println!("Cash balance: {}", snapshot.cash_balance);
    println!("Energy balance: {} W", snapshot.energy_balance);
    let ledger: Vec<String> = snapshot
        .energy_ledger
        .iter()
        .map(|(channel, watts)| format!("{channel}={watts}"))
        .collect();
    println!("Ledger: {}", ledger.join(" "));
}
