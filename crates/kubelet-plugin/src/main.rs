/*
 * SPDX-FileCopyrightText: Copyright (c) 2026 IBM Corporation & Affiliates. All rights reserved.
 * SPDX-License-Identifier: Apache-2.0
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 * http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::sync::Arc;

use eyre::WrapErr;
use nx_kubelet_plugin::cdi::CdiCache;
use nx_kubelet_plugin::cfg::PluginConfig;
use nx_kubelet_plugin::command_line::{Options, PluginCommand, PublishOptions, RunOptions};
use nx_kubelet_plugin::device_state::DeviceState;
use nx_kubelet_plugin::driver::{Driver, LogRegistry};
use nx_kubelet_plugin::{discovery, instrumentation};
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let options = Options::load();
    if options.version {
        println!("nx-dra-kubeletplugin {}", nx_version::version!());
        return Ok(());
    }

    instrumentation::init_logging()?;

    let config = match &options.config_path {
        Some(path) => PluginConfig::load(path)?,
        None => PluginConfig::default(),
    };

    match options.cmd {
        Some(PluginCommand::Run(run_options)) => run(config, run_options).await,
        Some(PluginCommand::Hardware) => {
            for name in discovery::probe_nx_devices(&config.sysfs_root)? {
                println!("{name}");
            }
            Ok(())
        }
        Some(PluginCommand::ValidateConfig(validate_options)) => {
            let bytes = std::fs::read(&validate_options.path)
                .wrap_err_with(|| format!("reading {}", validate_options.path.display()))?;
            let document = nx_config::decode_config(&bytes)?;
            if let Some(sharing) = &document.sharing {
                println!("valid NxConfig, sharing strategy {}", sharing.strategy);
            }
            Ok(())
        }
        Some(PluginCommand::Publish(publish_options)) => publish(config, publish_options).await,
        None => Err(eyre::eyre!("no command given, try --help")),
    }
}

async fn build_driver(
    config: &PluginConfig,
    node_name: String,
    cdi_dir_override: Option<std::path::PathBuf>,
) -> eyre::Result<Driver> {
    let cdi_dir = cdi_dir_override.unwrap_or_else(|| config.cdi_dir.clone());
    let cdi = Arc::new(CdiCache::new(cdi_dir)?);
    cdi.refresh().await.wrap_err("initial CDI registry read")?;

    let inventory = discovery::build_inventory(config)?;
    tracing::info!(devices = inventory.len(), "built device inventory");
    let state = Arc::new(DeviceState::new(inventory, cdi));

    // The registration helper attaches the driver to the kubelet socket and
    // feeds it claim batches; started standalone, the publication only
    // reaches the log.
    Driver::start(node_name, state, &LogRegistry).await
}

async fn run(config: PluginConfig, options: RunOptions) -> eyre::Result<()> {
    tracing::info!(
        version = %nx_version::version!(),
        node = %options.node_name,
        "starting nx-dra-kubeletplugin"
    );

    let driver = build_driver(&config, options.node_name, options.cdi_dir).await?;

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("received SIGTERM"),
                _ = sigint.recv() => tracing::info!("received SIGINT"),
            }
            shutdown.cancel();
        });
    }

    shutdown.cancelled().await;
    tracing::info!("shutting down");
    drop(driver);
    Ok(())
}

async fn publish(config: PluginConfig, options: PublishOptions) -> eyre::Result<()> {
    let driver = build_driver(&config, options.node_name, None).await?;
    println!("{}", serde_json::to_string_pretty(&driver.resource_pool())?);
    Ok(())
}
