//! The `info` command: mesh overview and member table from the agent.

use anyhow::Result;
use chrono::{Local, TimeZone};
use std::time::Duration;

use crate::agent_client::AgentClient;
use crate::cli::InfoArgs;

pub async fn run(args: InfoArgs) -> Result<()> {
    let client = AgentClient::new(&args.agent_socket);

    single_cycle(&client).await?;

    if args.watch {
        loop {
            let resp = client.wait_for_change(10).await?;
            if resp.was_timeout {
                continue;
            }
            if resp.changes_occurred {
                // let follow-up events settle before re-reading
                tokio::time::sleep(Duration::from_secs(1)).await;
                single_cycle(&client).await?;
            }
        }
    }

    Ok(())
}

async fn single_cycle(client: &AgentClient) -> Result<()> {
    let info = client.info().await?;

    println!(
        "Mesh '{}' has {} nodes, started {}",
        info.name,
        info.node_count,
        format_ts(info.mesh_creation_ts)
    );
    println!(
        "This node '{}' joined {}",
        info.node_name,
        format_ts(info.node_join_ts)
    );
    println!();

    let members = client.nodes().await?;

    let mut rows = vec![[
        "Name".to_string(),
        "Address".to_string(),
        "Status".to_string(),
        "RTT".to_string(),
        "Tags".to_string(),
    ]];
    for member in members {
        let tags = member
            .tags
            .iter()
            .filter(|t| !t.key.starts_with('_'))
            .map(|t| format!("{}={}", t.key, t.value))
            .collect::<Vec<_>>()
            .join(",");
        rows.push([
            member.node_name,
            member.addr,
            member.status,
            member.rtt_msec.to_string(),
            tags,
        ]);
    }
    print_table(&rows);

    Ok(())
}

fn format_ts(unix: i64) -> String {
    match Local.timestamp_opt(unix, 0) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M:%S %Z").to_string(),
        _ => unix.to_string(),
    }
}

fn print_table<const N: usize>(rows: &[[String; N]]) {
    let mut widths = [0usize; N];
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }
    for row in rows {
        let line = row
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{:<width$}", cell, width = widths[i]))
            .collect::<Vec<_>>()
            .join(" | ");
        println!("{}", line.trim_end());
    }
}
