//! Fan-out demo with a fast and a slow consumer
//!
//! Run with: RUST_LOG=broadcast_group=debug cargo run --example fanout
//!
//! One producer publishes ticks into a group. The fast consumer keeps up and
//! sees every tick; the slow one has a small buffer and misses ticks while it
//! is busy, without ever holding up the producer.

use std::time::Duration;

use broadcast_group::{Group, GroupConfig};
use bytes::Bytes;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("broadcast_group=info".parse()?)
                .add_directive("fanout=info".parse()?),
        )
        .init();

    let group: Group<Bytes> = Group::with_config(GroupConfig::with_name("ticks").trace_drops(true));
    let tx = group.sender();

    let mut fast = group.receiver(32);
    let mut slow = group.receiver(2);

    let fast_task = tokio::spawn(async move {
        let mut count = 0usize;
        while let Some(tick) = fast.recv().await {
            tracing::debug!(len = tick.len(), "Fast consumer got tick");
            count += 1;
        }
        count
    });

    let slow_task = tokio::spawn(async move {
        let mut count = 0usize;
        while let Some(tick) = slow.recv().await {
            tracing::debug!(len = tick.len(), "Slow consumer got tick");
            count += 1;
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        count
    });

    for i in 0..20u32 {
        let payload = Bytes::from(format!("tick {}", i));
        let accepted = tx.send(payload).await?;
        tracing::info!(tick = i, accepted = accepted, "Published");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    tx.close();
    group.terminated().await;

    let fast_count = fast_task.await?;
    let slow_count = slow_task.await?;
    let stats = group.stats();

    println!("fast consumer received {} ticks", fast_count);
    println!("slow consumer received {} ticks", slow_count);
    println!(
        "published={} delivered={} dropped={} ({:.0}% dropped)",
        stats.published,
        stats.delivered,
        stats.dropped,
        stats.drop_ratio() * 100.0
    );

    Ok(())
}
