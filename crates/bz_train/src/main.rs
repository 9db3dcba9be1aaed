// Copyright 2024
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

//! `backzero` -- the self-play training orchestrator. Reads
//! `config.json` from `--path` if present, otherwise writes out the
//! defaults there and starts a fresh run.

mod actor;
mod error;
mod game_loop;
mod learner;
mod rating;
mod supervisor;

use std::path::PathBuf;
use std::process::ExitCode;

use bz_utils::Config;

fn parse_path_arg() -> PathBuf {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--path" {
            if let Some(path) = args.next() {
                return PathBuf::from(path);
            }
        }
    }
    PathBuf::from("./az-backgammon")
}

fn load_config(path: &std::path::Path) -> Config {
    let config_path = path.join("config.json");
    match Config::load(&config_path) {
        Ok(config) => config,
        Err(_) => Config { path: path.to_path_buf(), ..Config::default() },
    }
}

fn main() -> ExitCode {
    let path = parse_path_arg();
    let config = load_config(&path);

    match supervisor::run(config) {
        Ok(step) => {
            eprintln!("stopped cleanly at step {step}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("fatal: {err}");
            ExitCode::FAILURE
        }
    }
}
