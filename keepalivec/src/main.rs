// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use anyhow::{bail, Context};
use clap::Parser;
use keepalive_common::sandbox::{self, Promises};
use keepalive_common::DEFAULT_TIMEOUT_SECS;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;

/// Periodically send liveness datagrams to a keepalived daemon.
#[derive(Debug, Parser)]
#[command(name = "keepalivec")]
struct Cli {
    /// Seconds to sleep between passes.
    #[arg(short = 't', value_name = "timeout", default_value_t = DEFAULT_TIMEOUT_SECS - 5)]
    timeout: u64,

    /// Daemon host.
    host: String,

    /// Daemon UDP port.
    port: u16,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    sandbox::pledge(Promises::StdioInetDns).context("pledge")?;

    let addrs: Vec<SocketAddr> =
        tokio::net::lookup_host((cli.host.as_str(), cli.port))
            .await
            .with_context(|| format!("{}:{}", cli.host, cli.port))?
            .collect();

    sandbox::pledge(Promises::StdioInet).context("pledge")?;

    // One connected socket per resolved address; each pass sends one zero
    // byte on all of them.
    let mut socks = Vec::with_capacity(addrs.len());
    for addr in addrs {
        let local: SocketAddr = if addr.is_ipv4() {
            "0.0.0.0:0".parse()?
        } else {
            "[::]:0".parse()?
        };
        let sock = UdpSocket::bind(local).await.context("socket")?;
        sock.connect(addr)
            .await
            .with_context(|| format!("connect {addr}"))?;
        socks.push((sock, addr));
    }
    if socks.is_empty() {
        bail!("{}:{} resolved to nothing", cli.host, cli.port);
    }

    sandbox::pledge(Promises::Stdio).context("pledge")?;

    let period = Duration::from_secs(cli.timeout);
    loop {
        for (sock, addr) in &socks {
            sock.send(&[0])
                .await
                .with_context(|| format!("send to {addr}"))?;
        }
        tokio::time::sleep(period).await;
    }
}
