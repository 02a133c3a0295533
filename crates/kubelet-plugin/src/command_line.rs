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

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[clap(name = "nx-dra-kubeletplugin")]
pub struct Options {
    #[clap(long, default_value = "false", help = "Print version number and exit")]
    pub version: bool,

    /// Path to the plugin configuration file.
    #[clap(long, env = "NX_PLUGIN_CONFIG")]
    pub config_path: Option<PathBuf>,

    #[clap(subcommand)]
    pub cmd: Option<PluginCommand>,
}

#[derive(Parser, Debug)]
pub enum PluginCommand {
    #[clap(about = "Run the kubelet plugin until terminated")]
    Run(RunOptions),

    #[clap(about = "Detect Nx devices and exit")]
    Hardware,

    #[clap(about = "Strictly decode and validate an NxConfig document, then exit")]
    ValidateConfig(ValidateConfigOptions),

    #[clap(about = "Print the resource-pool publication for this node")]
    Publish(PublishOptions),
}

#[derive(Parser, Debug)]
pub struct RunOptions {
    #[clap(long, env = "NODE_NAME", help = "Node name the resource pool is published under")]
    pub node_name: String,

    #[clap(long, help = "Override the CDI registry directory from the config file")]
    pub cdi_dir: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct ValidateConfigOptions {
    #[clap(help = "Path to the NxConfig JSON document")]
    pub path: PathBuf,
}

#[derive(Parser, Debug)]
pub struct PublishOptions {
    #[clap(long, env = "NODE_NAME", help = "Node name the resource pool is published under")]
    pub node_name: String,
}

impl Options {
    pub fn load() -> Self {
        Self::parse()
    }
}
