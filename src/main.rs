// Copyright 2025 JiangLong.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use clap::Parser;
use kube_node_setup::cli::provision::is_config_error;
use kube_node_setup::cli::{commands, CliArgs};
use kube_node_setup::infrastructure::{constants::LOG_FILE, logging};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(err) => {
            // --help and --version land here too
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let settings = args.provision.load_settings();
    let log_file = settings
        .as_ref()
        .map(|s| s.paths.log_file.clone())
        .unwrap_or_else(|_| PathBuf::from(LOG_FILE));
    logging::init(&log_file);

    let result = match settings {
        Ok(settings) => args.provision.execute(settings).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            if is_config_error(&err) {
                eprintln!("{}", commands::usage());
            }
            ExitCode::FAILURE
        }
    }
}
