//! The `tags` command: show, set or delete operator tags.
//!
//! Reserved keys (underscore prefix) are rejected here, before they reach
//! the agent.

use anyhow::{bail, Result};

use crate::agent_client::AgentClient;
use crate::cli::TagsArgs;

pub async fn run(args: TagsArgs) -> Result<()> {
    let client = AgentClient::new(&args.agent_socket);

    if let Some(spec) = &args.set {
        let Some((key, value)) = spec.split_once('=') else {
            bail!("set a tag using --set key=value");
        };
        if key.starts_with('_') {
            bail!("tag keys may not start with underscore _");
        }
        let result = client.tag(key, value).await?;
        if !result.ok {
            bail!("unable to set tag {}", key);
        }
        println!("set {}={}", key, value);
        return Ok(());
    }

    if let Some(key) = &args.delete {
        if key.starts_with('_') {
            bail!("tag keys may not start with underscore _");
        }
        let result = client.untag(key).await?;
        if !result.ok {
            bail!("no such tag: {}", key);
        }
        println!("deleted {}", key);
        return Ok(());
    }

    let mut tags = client.tags().await?;
    tags.sort_by(|a, b| a.key.cmp(&b.key));
    for tag in tags {
        println!("{}={}", tag.key, tag.value);
    }
    Ok(())
}
