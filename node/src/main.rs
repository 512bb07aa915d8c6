use std::time::Duration;

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, Command};
use ludo_node::{autoplay, Actor, Config, LocalNetwork, Mailbox, Session};
use ludo_types::wire::ColorAssignment;
use ludo_types::{Color, PlayerId, COLOR_COUNT};
use tokio::task::JoinHandle;
use tracing::{info, warn};

fn main() {
    if let Err(err) = main_result() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

struct SimOptions {
    humans: usize,
    drop_peer: Option<usize>,
    drop_after: Duration,
    rejoin_after: Option<Duration>,
    deadline: Duration,
}

fn main_result() -> Result<()> {
    // Parse arguments
    let matches = Command::new("ludo-sim")
        .about("Play a networked Ludo match between in-process peers.")
        .arg(Arg::new("config").long("config").required(false))
        .arg(
            Arg::new("humans")
                .long("humans")
                .help("Peers holding a color; remaining colors are automated")
                .value_parser(value_parser!(usize))
                .default_value("2"),
        )
        .arg(
            Arg::new("drop-peer")
                .long("drop-peer")
                .help("Index of a non-host peer to disconnect mid-match")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("drop-after-ms")
                .long("drop-after-ms")
                .value_parser(value_parser!(u64))
                .default_value("50"),
        )
        .arg(
            Arg::new("rejoin-after-ms")
                .long("rejoin-after-ms")
                .help("Reattach the dropped peer after this delay")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("reconnect-timeout-ms")
                .long("reconnect-timeout-ms")
                .value_parser(value_parser!(u64)),
        )
        .arg(Arg::new("seed").long("seed").value_parser(value_parser!(u64)))
        .arg(Arg::new("log-level").long("log-level"))
        .arg(
            Arg::new("timeout-secs")
                .long("timeout-secs")
                .value_parser(value_parser!(u64))
                .default_value("120"),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Validate config and exit")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    // Load config
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Could not read config file {path}"))?;
            serde_yaml::from_str::<Config>(&raw).context("Could not parse config file")?
        }
        None => Config::default(),
    };
    if let Some(seed) = matches.get_one::<u64>("seed") {
        config.rng_seed = Some(*seed);
    }
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.log_level = level.clone();
    }
    if let Some(timeout) = matches.get_one::<u64>("reconnect-timeout-ms") {
        config.reconnect_timeout_ms = *timeout;
    }
    let dry_run = matches.get_flag("dry-run");
    if dry_run {
        println!("{config:#?}");
    }
    let config = config.validate().context("Invalid config")?;
    if dry_run {
        return Ok(());
    }

    let humans = *matches.get_one::<usize>("humans").context("missing --humans")?;
    if !(1..=COLOR_COUNT).contains(&humans) {
        anyhow::bail!("--humans must be between 1 and {COLOR_COUNT}");
    }
    let drop_peer = matches.get_one::<usize>("drop-peer").copied();
    if let Some(index) = drop_peer {
        if index == 0 || index >= humans {
            anyhow::bail!("--drop-peer must name a non-host peer below {humans}");
        }
    }
    let options = SimOptions {
        humans,
        drop_peer,
        drop_after: Duration::from_millis(
            *matches.get_one::<u64>("drop-after-ms").context("missing --drop-after-ms")?,
        ),
        rejoin_after: matches
            .get_one::<u64>("rejoin-after-ms")
            .map(|ms| Duration::from_millis(*ms)),
        deadline: Duration::from_secs(
            *matches.get_one::<u64>("timeout-secs").context("missing --timeout-secs")?,
        ),
    };

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Could not build runtime")?;
    runtime.block_on(simulate(config, options))
}

fn player_id(index: usize) -> PlayerId {
    PlayerId::new(format!("player-{index}"))
}

async fn simulate(config: ludo_node::ValidatedConfig, options: SimOptions) -> Result<()> {
    let network = LocalNetwork::new();
    let host_id = player_id(0);

    let mut mailboxes = Vec::with_capacity(options.humans);
    let mut actors = Vec::with_capacity(options.humans);
    for index in 0..options.humans {
        let id = player_id(index);
        let (transport, events) = network.join(id.clone());
        let mut peer_config = config.clone();
        peer_config.rng_seed = config.rng_seed.map(|seed| seed.wrapping_add(index as u64));
        let (actor, mailbox) = Actor::new(&peer_config, Session::new(id, host_id.clone()), transport);
        actors.push(actor.start(events));
        mailboxes.push(mailbox);
    }

    let assignments = (0..options.humans)
        .map(|index| ColorAssignment {
            player_id: player_id(index),
            color: Color::ALL[index],
        })
        .collect();
    let mut host = mailboxes[0].clone();
    host.start_match(assignments)
        .await
        .context("Could not start match")?;
    info!(humans = options.humans, "match started");

    let drivers: Vec<JoinHandle<()>> = mailboxes
        .iter()
        .enumerate()
        .map(|(index, mailbox)| tokio::spawn(autoplay::drive_seat(player_id(index), mailbox.clone())))
        .collect();

    if let Some(index) = options.drop_peer {
        let network = network.clone();
        let id = player_id(index);
        let (drop_after, rejoin_after) = (options.drop_after, options.rejoin_after);
        tokio::spawn(async move {
            tokio::time::sleep(drop_after).await;
            network.detach(&id);
            if let Some(rejoin_after) = rejoin_after {
                tokio::time::sleep(rejoin_after).await;
                network.attach(&id);
            }
        });
    }

    let finished = tokio::time::timeout(options.deadline, wait_for_game_over(&mut host)).await;
    for driver in &drivers {
        driver.abort();
    }
    let (state, roster) = finished.context("Match did not finish in time")??;

    println!("winner: {:?}", state.winner());
    for (rank, color) in state.finish_order.iter().enumerate() {
        let holder = roster
            .player_of(*color)
            .map(|id| id.to_string())
            .unwrap_or_else(|| "automated".to_string());
        println!("{}. {color} ({holder})", rank + 1);
    }

    host.close().await;
    drop(mailboxes);
    for actor in actors {
        if let Err(err) = actor.await {
            warn!(?err, "actor task failed");
        }
    }
    Ok(())
}

async fn wait_for_game_over(
    host: &mut Mailbox,
) -> Result<(ludo_types::MatchState, ludo_node::Roster)> {
    loop {
        let (state, roster) = host.state().await?;
        if state.is_game_over() {
            return Ok((state, roster));
        }
        tokio::time::sleep(autoplay::POLL_INTERVAL).await;
    }
}
