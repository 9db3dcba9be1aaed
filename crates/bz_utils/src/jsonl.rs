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

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

/// Append-only writer for `learner.jsonl` and the per-thread `actor-<i>` /
/// `evaluator-<i>` logs. The teacher writes its diagnostics directly with
/// `eprintln!`/file handles rather than through a logging crate, so this
/// does the same: one JSON object (or, via `write_line`, one plain line)
/// per call, flushed immediately so a crash does not lose the last record.
pub struct JsonlWriter {
    file: BufWriter<File>,
}

impl JsonlWriter {
    pub fn create_or_append(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file: BufWriter::new(file) })
    }

    pub fn write_record<T: Serialize>(&mut self, record: &T) -> io::Result<()> {
        serde_json::to_writer(&mut self.file, record)?;
        self.file.write_all(b"\n")?;
        self.file.flush()
    }

    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.file, "{line}")?;
        self.file.flush()
    }
}

/// Returns the last non-empty line of a `.jsonl` file, parsed as a generic
/// JSON value. Used by the supervisor's resume logic to recover
/// `start_time`/`start_step`/`total_trajectories` from `learner.jsonl`.
pub fn last_record(path: impl AsRef<Path>) -> io::Result<Option<Value>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut last = None;

    for line in reader.lines() {
        let line = line?;
        if !line.trim().is_empty() {
            last = Some(line);
        }
    }

    match last {
        Some(line) => Ok(Some(serde_json::from_str(&line)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn reads_last_non_empty_line() {
        let dir = std::env::temp_dir().join(format!("bz_utils_jsonl_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("learner.jsonl");

        let mut file = File::create(&path).unwrap();
        writeln!(file, r#"{{"step":1}}"#).unwrap();
        writeln!(file, r#"{{"step":2}}"#).unwrap();
        writeln!(file).unwrap();

        let record = last_record(&path).unwrap().unwrap();
        assert_eq!(record["step"], 2);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
