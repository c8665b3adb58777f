//! fp-replay: run a floorplan transaction scenario and print the result.
//!
//! Usage: `fp-replay <scenario.json>`. Logging follows `RUST_LOG`.

mod scenario;

use scenario::{ReplayError, Scenario};
use std::process::ExitCode;

fn run(path: &str) -> Result<String, ReplayError> {
    let text = std::fs::read_to_string(path)?;
    let replay = Scenario::from_json(&text)?.run();
    Ok(serde_json::to_string_pretty(&replay.report())?)
}

fn main() -> ExitCode {
    env_logger::init();

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: fp-replay <scenario.json>");
        return ExitCode::from(2);
    };

    match run(&path) {
        Ok(report) => {
            println!("{report}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("fp-replay: {err}");
            ExitCode::FAILURE
        }
    }
}
