// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

pub const PATH_KEEPALIVE_CONF: &str = "/etc/keepalive.conf";
pub const PATH_KEEPALIVED_SESSION: &str = "/usr/local/libexec/keepalived-session";
pub const PATH_SHUTDOWN: &str = "/sbin/shutdown";

/// Unprivileged account the session process runs as.
pub const KEEPALIVED_USER: &str = "_keepalived";
/// Account the supervisor drops to once the session is running.
pub const KEEPALIVED_USER_PRIV: &str = "_keepalived-priv";
/// Group that retains permission to run the shutdown binary.
pub const GRP_SHUTDOWN: &str = "_shutdown";
