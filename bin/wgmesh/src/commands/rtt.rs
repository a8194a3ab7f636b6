//! The `rtt` command: collect and print the pairwise round-trip matrix.

use std::collections::HashMap;

use anyhow::Result;

use crate::agent_client::AgentClient;
use crate::cli::RttArgs;

pub async fn run(args: RttArgs) -> Result<()> {
    let client = AgentClient::new(&args.agent_socket);

    // collection blocks on the agent for num_nodes + 2 seconds
    let infos = client.rtt().await?;

    let mut names: Vec<String> = infos.iter().map(|i| i.node_name.clone()).collect();
    names.sort();

    let mut matrix: HashMap<&str, HashMap<&str, i32>> = HashMap::new();
    for info in &infos {
        let row = matrix.entry(info.node_name.as_str()).or_default();
        for entry in &info.rtts {
            row.insert(entry.node_name.as_str(), entry.rtt_msec);
        }
    }

    let width = names.iter().map(String::len).max().unwrap_or(4).max(4);

    let header = names
        .iter()
        .map(|n| format!("{:>width$}", n, width = width))
        .collect::<Vec<_>>()
        .join(" ");
    println!("{:>width$} {}", "/", header, width = width);

    for row_name in &names {
        let cells = names
            .iter()
            .map(|col_name| {
                let rtt = matrix
                    .get(row_name.as_str())
                    .and_then(|row| row.get(col_name.as_str()))
                    .copied()
                    .unwrap_or(0);
                format!("{:>width$}", rtt, width = width)
            })
            .collect::<Vec<_>>()
            .join(" ");
        println!("{:>width$} {}", row_name, cells, width = width);
    }

    Ok(())
}
