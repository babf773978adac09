use crate::config::Config;
use crate::device::{
    ConnectivityState, ControllerSettings, DeviceController, Dispatch, LinkProbe, LinkState,
    ReaderSource,
};
use crate::event::{CardUid, LocalClock};
use crate::forward::ForwardingClient;
use crate::queue::DurableQueue;
use crate::reconcile::{run_pass, Trigger};
use anyhow::{Context, Result};
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

fn build_client(config: &Config) -> Result<ForwardingClient> {
    ForwardingClient::try_new(
        &config.endpoint_url,
        config.request_timeout(),
        config.connect_timeout(),
    )
}

async fn open_queue(config: &Config) -> Result<DurableQueue> {
    DurableQueue::open(
        &config.store_path,
        config.queue_capacity(),
        LocalClock::start(),
    )
    .await
    .with_context(|| format!("Failed to open offline store {:?}", config.store_path))
}

fn build_probe(config: &Config, link: &ConnectivityState) -> Result<LinkProbe> {
    LinkProbe::for_endpoint(
        &config.endpoint()?,
        config.link_probe_interval(),
        config.link_probe_timeout(),
        link.clone(),
    )
}

fn settings(config: &Config) -> ControllerSettings {
    ControllerSettings {
        location_id: config.location_id.clone(),
        reconcile_interval: config.reconcile_interval(),
        scan_debounce: config.scan_debounce(),
    }
}

pub async fn run(config: &Config) -> Result<()> {
    // without a reader there is nothing to forward
    let source = ReaderSource::open(&config.reader_path)
        .await
        .context("Card reader initialization failed")?;

    let client = build_client(config)?;
    let queue = open_queue(config).await?;

    let link = ConnectivityState::new(LinkState::Unlinked);
    let probe = build_probe(config, &link)?;
    link.set(probe.probe_once().await);
    info!(
        "Forwarding to {} from location {} (link {})",
        client.endpoint(),
        config.location_id,
        link.current()
    );

    let shutdown = CancellationToken::new();
    let probe_task = tokio::spawn(probe.run(shutdown.clone()));

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl-C");
                signal_token.cancel();
            }
            Err(e) => warn!("Unable to listen for Ctrl-C: {}", e),
        }
    });

    let controller = DeviceController::new(client, queue, link.subscribe(), settings(config));
    let result = controller.run(source, shutdown.clone()).await;

    shutdown.cancel();
    if let Err(e) = probe_task.await {
        warn!("Link probe task ended abnormally: {}", e);
    }

    result.context("Card reader failed")
}

pub async fn drain(config: &Config) -> Result<()> {
    let client = build_client(config)?;
    let queue = open_queue(config).await?;

    let report = run_pass(&queue, &client, Trigger::Manual)
        .await
        .context("Offline store unavailable, nothing was sent")?;

    if report.attempted == 0 {
        println!("{}", "Offline backlog is empty.".green());
    } else if report.is_drained() {
        println!("{} {}", "All offline data synced:".green(), report);
    } else {
        println!("{} {}", "Some entries are still pending:".yellow(), report);
    }
    Ok(())
}

pub async fn queue(config: &Config, json: bool) -> Result<()> {
    let queue = open_queue(config).await?;
    let records = queue
        .load_all()
        .await
        .context("Failed to read offline store")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    println!(
        "{} pending in {:?} (capacity {})",
        records.len().to_string().bold(),
        queue.path(),
        queue.capacity()
    );
    for record in &records {
        println!(
            "{:>6}  {}  {}  uptime {} ms",
            record.seq, record.event.card_id, record.event.location_id, record.saved_at_uptime
        );
    }
    Ok(())
}

pub async fn scan(config: &Config, card: CardUid) -> Result<()> {
    let client = build_client(config)?;
    let queue = open_queue(config).await?;

    let link = ConnectivityState::new(LinkState::Unlinked);
    link.set(build_probe(config, &link)?.probe_once().await);

    let mut controller = DeviceController::new(client, queue, link.subscribe(), settings(config));
    match controller.dispatch(card).await {
        Dispatch::Delivered => println!("{} {}", "Delivered".green(), card),
        Dispatch::Queued { outcome, receipt } => {
            let reason = outcome
                .map(|o| o.to_string())
                .unwrap_or_else(|| "link down".to_string());
            println!(
                "{} {} as #{} ({})",
                "Saved locally".yellow(),
                card,
                receipt.seq,
                reason
            );
        }
        Dispatch::Lost(e) => {
            return Err(e).with_context(|| format!("Scan {} could not be saved", card));
        }
    }
    Ok(())
}
