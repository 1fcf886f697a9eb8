// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#[cfg(not(unix))]
fn main() {
    eprintln!("keepalived only runs on unix");
    std::process::exit(1);
}

#[cfg(unix)]
mod unix {
    use anyhow::Context;
    use clap::Parser;
    use keepalive_common::exec::PreparedExec;
    use keepalive_common::privdrop;
    use keepalive_common::sandbox::{self, Promises};
    use keepalived::config::Config;
    use keepalived::constants::{
        GRP_SHUTDOWN, KEEPALIVED_USER_PRIV, PATH_KEEPALIVE_CONF, PATH_SHUTDOWN,
    };
    use keepalived::{spawn, supervisor};
    use std::path::{Path, PathBuf};
    use std::process::ExitCode;
    use tracing::error;

    /// Shut the host down when the expected keepalive clients go quiet.
    #[derive(Debug, Parser)]
    #[command(name = "keepalived")]
    struct Cli {
        /// Stay in the foreground instead of detaching.
        #[arg(short = 'd')]
        debug: bool,

        /// Test the configuration and exit.
        #[arg(short = 'n')]
        configtest: bool,

        /// Run the full state machine but print a marker instead of
        /// executing the shutdown binary.
        #[arg(short = 'p')]
        pretend: bool,

        /// Configuration file.
        #[arg(short = 'f', value_name = "file", default_value = PATH_KEEPALIVE_CONF)]
        file: PathBuf,
    }

    pub fn main() -> ExitCode {
        let cli = Cli::parse();
        keepalived::init_logging();

        let config = match Config::load(&cli.file) {
            Ok(config) => config,
            Err(e) => {
                error!("configuration failed: {e}");
                return ExitCode::FAILURE;
            }
        };

        if cli.configtest {
            println!("configuration OK");
            return ExitCode::SUCCESS;
        }

        let timed_out = match run_daemon(&cli, &config) {
            Ok(timed_out) => timed_out,
            Err(e) => {
                error!("{e:#}");
                return ExitCode::FAILURE;
            }
        };

        if !timed_out {
            return ExitCode::SUCCESS;
        }

        if cli.pretend {
            println!("We're done.");
            return ExitCode::SUCCESS;
        }

        match PreparedExec::new(Path::new(PATH_SHUTDOWN), &["shutdown", "-p", "now"]) {
            Ok(prepared) => {
                let errno = prepared.exec();
                error!("{PATH_SHUTDOWN}: {errno}");
            }
            Err(e) => error!("{PATH_SHUTDOWN}: {e}"),
        }
        ExitCode::FAILURE
    }

    /// Everything between configuration and the shutdown decision. Returns
    /// the timeout flag; the session is reaped on every path past the fork.
    fn run_daemon(cli: &Cli, config: &Config) -> anyhow::Result<bool> {
        use nix::sys::signal::{signal, SigHandler, Signal};

        if !cli.debug {
            nix::unistd::daemon(false, false).context("daemon")?;
        }

        // SAFETY: ignoring SIGPIPE installs no handler code.
        unsafe { signal(Signal::SIGPIPE, SigHandler::SigIgn) }.context("signal")?;

        let (channel_end, session) = spawn::spawn_session().context("failed to start session")?;

        let result = supervise(cli, config, channel_end);
        // The channel fd is closed by now on every path; interrupt and
        // collect the session before deciding anything.
        session.reap();
        result
    }

    fn supervise(
        cli: &Cli,
        config: &Config,
        channel_end: std::os::fd::OwnedFd,
    ) -> anyhow::Result<bool> {
        privdrop::drop_privileges(KEEPALIVED_USER_PRIV, Some(GRP_SHUTDOWN))
            .context("privilege drop")?;
        if cli.pretend {
            sandbox::pledge(Promises::StdioProc).context("pledge")?;
        } else {
            sandbox::unveil_exec(Path::new(PATH_SHUTDOWN)).context("unveil")?;
            sandbox::pledge(Promises::StdioProcExec).context("pledge")?;
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("runtime")?;
        runtime.block_on(async {
            let channel = keepalive_ipc::channel_from_owned_fd(channel_end)
                .context("failed to wrap session channel")?;
            supervisor::run(channel, config)
                .await
                .context("event dispatch")
        })
    }
}

#[cfg(unix)]
fn main() -> std::process::ExitCode {
    unix::main()
}
