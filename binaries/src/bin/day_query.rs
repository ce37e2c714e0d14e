// SPDX-License-Identifier: MPL-2.0

//! Run one differentially private day query against a JSON record file.
//!
//! ```text
//! day_query [--debug] <records.json> <YYYY-MM-DD> <epsilon>
//! ```
//!
//! The record file maps days to per-source counts:
//!
//! ```json
//! {"2025-01-15": [{"source": "1.2.3.4", "count": 100}]}
//! ```
//!
//! Without `--debug` only the noised count is printed; with it, the full
//! diagnostic bundle. The mode is fixed for the process, mirroring how a
//! serving deployment would pin it at startup.

use chrono::NaiveDate;
use noisegate::collect::MemorySource;
use noisegate::release::{DisclosureMode, ErrorResponse, QueryRequest, ReleaseEngine};
use std::fs::File;
use std::process::exit;

fn usage() -> ! {
    eprintln!("usage: day_query [--debug] <records.json> <YYYY-MM-DD> <epsilon>");
    exit(2);
}

fn main() {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let debug = args.iter().any(|arg| arg == "--debug" || arg == "-d");
    args.retain(|arg| arg != "--debug" && arg != "-d");
    if args.len() != 3 {
        usage();
    }

    let date = match NaiveDate::parse_from_str(&args[1], "%Y-%m-%d") {
        Ok(date) => date,
        Err(_) => {
            eprintln!("invalid date {:?}: expected YYYY-MM-DD", args[1]);
            exit(2);
        }
    };
    let epsilon: f64 = match args[2].parse() {
        Ok(epsilon) => epsilon,
        Err(_) => {
            eprintln!("invalid epsilon {:?}: expected a number", args[2]);
            exit(2);
        }
    };

    let file = match File::open(&args[0]) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("cannot open {:?}: {err}", args[0]);
            exit(1);
        }
    };
    let source: MemorySource = match serde_json::from_reader(file) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("cannot parse {:?}: {err}", args[0]);
            exit(1);
        }
    };

    let mode = if debug {
        DisclosureMode::Debug
    } else {
        DisclosureMode::Production
    };
    let engine = ReleaseEngine::new(source, mode);

    match engine.handle(&QueryRequest { date, epsilon }) {
        Ok(response) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&response).expect("response serializes")
            );
        }
        Err(err) => {
            eprintln!(
                "{}",
                serde_json::to_string_pretty(&ErrorResponse::from(&err))
                    .expect("error serializes")
            );
            exit(1);
        }
    }
}
