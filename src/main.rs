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
use colored::Colorize;
use k8s_cli::cli::CliArgs;
use k8s_cli::cli::k8s::error_exit_code;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8) {
    // -v flags win over RUST_LOG; stdout is reserved for command output.
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_tracing(args.global.verbose);

    let code = match args.command.execute(&args.global).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "✖".red(), e);
            error_exit_code(&e)
        }
    };

    std::process::exit(code);
}
