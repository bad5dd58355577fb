//! Offline reader for rendered subevent logs.
//!
//! Extracts every complete `CS Subevent result received:` block from one or
//! more log files (or stdin) and prints a one-line summary per result, or
//! JSON with `--json`.

use std::io::{self, Read};
use std::path::PathBuf;

use clap::Parser;
use cs_ranging::telemetry::{parse_log, parse_steps, StepFrame, StepPayload, SubeventResult};
use cs_ranging::{logging, Config, VERSION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "cs-telemetry")]
#[command(version = VERSION)]
#[command(about = "Parse Channel Sounding subevent logs", long_about = None)]
struct Cli {
    /// Log files (- or none for stdin)
    files: Vec<PathBuf>,

    /// Output JSON lines
    #[arg(long)]
    json: bool,

    /// Split raw step data into step frames
    #[arg(long)]
    steps: bool,
}

fn read_input(path: &PathBuf) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    Ok(std::fs::read_to_string(path)?)
}

fn to_json(result: &SubeventResult, with_steps: bool) -> Value {
    let mut value = json!({
        "procedure_counter": result.procedure_counter,
        "procedure_done_status": result.procedure_done_status,
        "subevent_done_status": result.subevent_done_status,
        "procedure_abort_reason": result.procedure_abort_reason,
        "subevent_abort_reason": result.subevent_abort_reason,
        "reference_power_level": result.reference_power_level,
        "num_antenna_paths": result.num_antenna_paths,
        "num_steps_reported": result.num_steps_reported,
        "step_data": hex::encode(result.step_data()),
    });
    if with_steps {
        if let Some(data) = &result.step_data {
            value["steps"] = serde_json::to_value(parse_steps(data)).unwrap_or(Value::Null);
        }
    }
    value
}

fn summary(result: &SubeventResult, with_steps: bool) -> String {
    let mut line = format!(
        "#{:<5} procedure {} / subevent {} | abort {:?}/{:?} | ref power {} dBm | {} paths | {} steps | {} bytes",
        result.procedure_counter,
        result.procedure_done(),
        result.subevent_done(),
        result.procedure_abort(),
        result.subevent_abort(),
        result.reference_power_level,
        result.num_antenna_paths,
        result.num_steps_reported,
        result.step_data().len(),
    );
    if with_steps {
        if let Some(data) = &result.step_data {
            for step in parse_steps(data) {
                line.push_str(&format!("\n    {}", describe(&step)));
            }
        }
    }
    line
}

fn describe(step: &StepFrame) -> String {
    let head = format!("{:?} ch {:>2}", step.mode, step.channel);
    match &step.payload {
        StepPayload::Mode0 {
            packet_quality,
            packet_rssi,
            ..
        } => {
            let rssi = packet_rssi.map_or_else(|| "N/A".to_string(), |r| format!("{r}dBm"));
            format!("{head}: rssi {rssi} quality {packet_quality:?}")
        },
        StepPayload::Mode2 { tones, .. } => {
            let tones: Vec<String> = tones
                .iter()
                .map(|t| {
                    format!(
                        "I:{} Q:{} mag {:.2} phase {:.2} {:?}",
                        t.pct_i,
                        t.pct_q,
                        t.magnitude(),
                        t.phase(),
                        t.quality
                    )
                })
                .collect();
            format!("{head}: [{}]", tones.join(", "))
        },
        StepPayload::Opaque => format!("{head}: {}", hex::encode(&step.data)),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_stderr(&Config::from_env()?.logging);

    let inputs = if cli.files.is_empty() {
        vec![PathBuf::from("-")]
    } else {
        cli.files
    };

    let mut total = 0;
    for path in &inputs {
        let log = read_input(path)?;
        let results = parse_log(&log);
        total += results.len();

        for result in &results {
            if cli.json {
                println!("{}", to_json(result, cli.steps));
            } else {
                println!("{}", summary(result, cli.steps));
            }
        }
    }

    if !cli.json {
        eprintln!("{total} subevent results");
    }

    Ok(())
}
