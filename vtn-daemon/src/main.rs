//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

mod config;

use std::sync::Arc;
use std::time::Duration;

use clap::{App, Arg};
use config::{Config, LoggingFileRotation, LoggingFmtStyle, StaticFlow};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::Layer;
use tracing_subscriber::prelude::*;
use vtn_flow::FlowManager;
use vtn_flow::cluster::FlowEventMap;
use vtn_flow::flow_task::FlowTask;
use vtn_flow::southbound::memory::{MemoryFlowTable, StaticTopology};
use vtn_utils::action::ActionList;
use vtn_utils::cluster::ClusterNodeId;
use vtn_utils::flow::{FlowModResult, SwitchId};

// Time given to the in-flight flow tasks on exit.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

fn init_tracing(config: &config::Logging) {
    // Enable logging to a file.
    let file = config.file.enabled.then(|| {
        let file_appender = match config.file.rotation {
            LoggingFileRotation::Never => {
                rolling::never(&config.file.dir, &config.file.name)
            }
            LoggingFileRotation::Hourly => {
                rolling::hourly(&config.file.dir, &config.file.name)
            }
            LoggingFileRotation::Daily => {
                rolling::daily(&config.file.dir, &config.file.name)
            }
        };

        let log_level_filter = LevelFilter::from_level(tracing::Level::TRACE);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(false)
            .with_thread_ids(config.file.fmt.show_thread_id)
            .with_file(config.file.fmt.show_source)
            .with_line_number(config.file.fmt.show_source)
            .with_ansi(config.file.fmt.colors);
        let layer = match config.file.fmt.style {
            LoggingFmtStyle::Compact => layer.compact().boxed(),
            LoggingFmtStyle::Full => layer.boxed(),
            LoggingFmtStyle::Json => layer.json().boxed(),
            LoggingFmtStyle::Pretty => layer.pretty().boxed(),
        };
        layer.with_filter(log_level_filter)
    });

    // Enable logging to stdout.
    let stdout = config.stdout.enabled.then(|| {
        let log_level_filter = LevelFilter::from_level(tracing::Level::TRACE);
        let layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(config.stdout.fmt.show_thread_id)
            .with_file(config.stdout.fmt.show_source)
            .with_line_number(config.stdout.fmt.show_source)
            .with_ansi(config.stdout.fmt.colors);
        let layer = match config.stdout.fmt.style {
            LoggingFmtStyle::Compact => layer.compact().boxed(),
            LoggingFmtStyle::Full => layer.boxed(),
            LoggingFmtStyle::Json => layer.json().boxed(),
            LoggingFmtStyle::Pretty => layer.pretty().boxed(),
        };
        layer.with_filter(log_level_filter)
    });

    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(env_filter)
        .with(file)
        .with(stdout)
        .init();
}

fn init_manager(
    config: &Config,
    table: Arc<MemoryFlowTable>,
) -> Result<FlowManager, vtn_flow::error::Error> {
    let topology = Arc::new(StaticTopology::new(
        ClusterNodeId(config.node_id),
        config.cluster.remote_nodes,
    ));
    for switch in &config.cluster.switches {
        topology.set_owner(SwitchId(switch.dpid), ClusterNodeId(switch.owner));
    }

    let events = Arc::new(FlowEventMap::new());
    FlowManager::new(config.flow.clone(), table, topology, events)
}

// Schedules the installation of a configured flow.
fn install_static_flow(
    manager: &FlowManager,
    static_flow: &StaticFlow,
) -> Result<Arc<FlowTask>, String> {
    let db = manager.flow_db(&static_flow.tenant);
    let mut flow = db.create();
    flow.set_timeout(static_flow.idle_timeout, static_flow.hard_timeout);
    for hop in &static_flow.hops {
        let flow_match = hop.flow_match()?;
        let mut actions = ActionList::new(SwitchId(hop.dpid), hop.in_vlan);
        actions.add_vlan_id(hop.out_vlan).add_output(hop.out_port);
        flow.add_flow(flow_match, actions, static_flow.priority);
    }
    manager
        .install_flow(&db, flow)
        .map_err(|error| error.to_string())
}

fn signal_listener() -> mpsc::Receiver<()> {
    let (signal_tx, signal_rx) = mpsc::channel(1);

    tokio::task::spawn(async move {
        let mut sigint = signal(SignalKind::interrupt()).unwrap();
        let mut sigterm = signal(SignalKind::terminate()).unwrap();

        tokio::select! {
            _ = sigint.recv() => {
                info!("received SIGINT");
                let _ = signal_tx.send(()).await;
            },
            _ = sigterm.recv() => {
                info!("received SIGTERM");
                let _ = signal_tx.send(()).await;
            }
        }
    });

    signal_rx
}

// ===== main =====

fn main() {
    // Parse command-line parameters.
    let matches = App::new("VTN flow coordination daemon")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("file")
                .help("Specify an alternative configuration file."),
        )
        .get_matches();

    // Read configuration file.
    let config_file = matches.value_of("config");
    let config = match Config::load(config_file) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("{error}");
            std::process::exit(1);
        }
    };

    // Initialize tracing.
    init_tracing(&config.logging);

    // Start the flow manager.
    let table = Arc::new(MemoryFlowTable::new());
    let manager = match init_manager(&config, table.clone()) {
        Ok(manager) => manager,
        Err(error) => {
            error!(%error, "failed to start flow manager");
            std::process::exit(1);
        }
    };

    // We're ready to go!
    info!(node = %manager.local_node(), "starting up");

    // Install the configured flows.
    for static_flow in &config.flows {
        let tenant = &static_flow.tenant;
        match install_static_flow(&manager, static_flow) {
            Ok(task) => match task.get_result(SHUTDOWN_TIMEOUT) {
                FlowModResult::Succeeded => {
                    info!(%tenant, flow = %task.flow(), "flow installed");
                }
                result => {
                    warn!(%tenant, flow = %task.flow(), %result, "failed to install flow");
                }
            },
            Err(error) => {
                warn!(%tenant, %error, "failed to install flow");
            }
        }
    }

    // Wait for a termination signal.
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to create async runtime")
        .block_on(async {
            let mut signal_rx = signal_listener();
            let _ = signal_rx.recv().await;
        });

    // Remove the flows installed by this daemon.
    for tenant in manager.tenants() {
        match manager.remove_tenant(&tenant) {
            Ok(tasks) => {
                for task in tasks {
                    let result = task.get_result(SHUTDOWN_TIMEOUT);
                    if result != FlowModResult::Succeeded {
                        warn!(%tenant, flow = %task.flow(), %result, "failed to uninstall flow");
                    }
                }
            }
            Err(error) => {
                warn!(%tenant, %error, "failed to remove tenant");
            }
        }
    }
    if !manager.shutdown(SHUTDOWN_TIMEOUT) {
        warn!("flow tasks didn't finish in time");
    }
    info!(entries = %table.len(), "exiting");
}
