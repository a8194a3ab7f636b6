//! The `ui` command: entry point for the embedded web dashboard.
//!
//! The dashboard is not part of this build; it lives outside the
//! membership core and consumes the same agent socket the other commands
//! use. The sub-command validates its flags and reports that.

use anyhow::{bail, Result};

use crate::cli::UiArgs;

pub async fn run(args: UiArgs) -> Result<()> {
    if args.http_bind_addr.parse::<std::net::IpAddr>().is_err() {
        bail!(
            "{} is not a valid IP address for --http-bind-addr",
            args.http_bind_addr
        );
    }

    bail!(
        "the web dashboard is not part of this build; \
         use `wgmesh info --watch` against {} instead",
        args.agent_socket
    );
}
