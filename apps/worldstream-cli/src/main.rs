mod scenario;

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use worldstream_common::SplineTable;
use worldstream_tools::StreamerInspector;

use scenario::{EventLog, Scenario};

#[derive(Parser)]
#[command(name = "worldstream-cli", about = "CLI tool for worldstream operations")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Drive a camera through a scenario and report streaming passes
    Simulate {
        /// Scenario file (YAML, or JSON by extension). Runs the built-in demo
        /// when omitted.
        scenario: Option<PathBuf>,
        /// Number of frames to simulate
        #[arg(short, long, default_value = "120")]
        frames: u32,
        /// Seconds per frame
        #[arg(long, default_value = "0.016")]
        dt: f32,
        /// Print a summary every N frames (0 for the final one only)
        #[arg(short, long, default_value = "30")]
        report_every: u32,
        /// List every object at the end
        #[arg(short, long)]
        list: bool,
    },
    /// Evaluate a cubic Hermite curve through `x:y` control points
    Spline {
        /// Control points, e.g. `0:1 0.7:1 1:0`
        #[arg(required = true)]
        points: Vec<String>,
        /// Number of evenly spaced samples across the control range
        #[arg(short, long, default_value = "11")]
        samples: usize,
        /// Evaluate at a single x instead of sampling
        #[arg(long)]
        at: Option<f64>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("worldstream-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", worldstream_common::crate_info());
            println!("stream: {}", worldstream_stream::crate_info());
            println!("tools: {}", worldstream_tools::crate_info());
        }
        Commands::Simulate {
            scenario,
            frames,
            dt,
            report_every,
            list,
        } => {
            let scenario = match &scenario {
                Some(path) => Scenario::load(path)?,
                None => Scenario::demo()?,
            };
            simulate(&scenario, frames, dt, report_every, list)?;
        }
        Commands::Spline {
            points,
            samples,
            at,
        } => {
            for (x, y) in sample_spline(&points, samples, at)? {
                println!("{x:.4} -> {y:.4}");
            }
        }
    }

    Ok(())
}

fn simulate(
    scenario: &Scenario,
    frames: u32,
    dt: f32,
    report_every: u32,
    list: bool,
) -> anyhow::Result<()> {
    let events = EventLog::default();
    let mut streamer = scenario.build(&events)?;
    let path = scenario.camera_path();
    println!(
        "Simulating {frames} frames: {} classes, {} objects",
        scenario.classes.len(),
        scenario.objects.len()
    );

    for frame in 0..frames {
        let t = if frames > 1 {
            frame as f32 / (frames - 1) as f32
        } else {
            0.0
        };
        streamer.centre(path.at(t));
        streamer.frame_callbacks(dt);
        if report_every > 0 && (frame + 1) % report_every == 0 {
            println!("-- frame {} --", frame + 1);
            println!("{}", StreamerInspector::summary(&streamer));
        }
    }

    println!("== final ==");
    println!("{}", StreamerInspector::summary(&streamer));
    println!(
        "events: activate={} deactivate={} frame={} destroy={}",
        events.count("activate"),
        events.count("deactivate"),
        events.count("frame"),
        events.count("destroy")
    );
    if list {
        for info in StreamerInspector::list_objects(&streamer) {
            println!("{info}");
        }
    }
    streamer.shutdown();
    Ok(())
}

/// Evaluate the curve through `points` at `at`, or at `samples` evenly
/// spaced positions across the control range.
fn sample_spline(points: &[String], samples: usize, at: Option<f64>) -> anyhow::Result<Vec<(f64, f64)>> {
    let points = points
        .iter()
        .map(|p| parse_point(p.as_str()))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let table = SplineTable::from_points(points);
    if let Some(x) = at {
        if !x.is_finite() {
            bail!("evaluation point must be finite, got {x}");
        }
        return Ok(vec![(x, table.evaluate(x))]);
    }
    let (Some(lo), Some(hi)) = (table.min_x(), table.max_x()) else {
        bail!("no control points");
    };
    let steps = samples.max(2) - 1;
    Ok((0..=steps)
        .map(|i| {
            let x = lo + (hi - lo) * i as f64 / steps as f64;
            (x, table.evaluate(x))
        })
        .collect())
}

/// Parse an `x:y` control point. Both coordinates must be finite.
fn parse_point(s: &str) -> anyhow::Result<(f64, f64)> {
    let (x, y) = s
        .split_once(':')
        .with_context(|| format!("expected x:y, got {s:?}"))?;
    let x: f64 = x.trim().parse().with_context(|| format!("bad x in {s:?}"))?;
    let y: f64 = y.trim().parse().with_context(|| format!("bad y in {s:?}"))?;
    if !x.is_finite() || !y.is_finite() {
        bail!("control point {s:?} is not finite");
    }
    Ok((x, y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_points() {
        assert_eq!(parse_point("0.5:1").unwrap(), (0.5, 1.0));
        assert_eq!(parse_point(" -2 : 3.25 ").unwrap(), (-2.0, 3.25));
    }

    #[test]
    fn rejects_bad_points() {
        assert!(parse_point("1").is_err());
        assert!(parse_point("a:1").is_err());
        assert!(parse_point("1:").is_err());
        assert!(parse_point("NaN:1").is_err());
        assert!(parse_point("0:inf").is_err());
    }

    #[test]
    fn samples_across_the_control_range() {
        let points = vec!["0:0".to_owned(), "2:4".to_owned()];
        let out = sample_spline(&points, 3, None).unwrap();
        assert_eq!(out, vec![(0.0, 0.0), (1.0, 2.0), (2.0, 4.0)]);
        assert_eq!(sample_spline(&points, 3, Some(3.0)).unwrap(), vec![(3.0, 6.0)]);
    }

    #[test]
    fn non_finite_input_is_an_error() {
        let nan_point = vec!["NaN:1".to_owned(), "1:2".to_owned()];
        assert!(sample_spline(&nan_point, 5, None).is_err());

        let points = vec!["0:0".to_owned(), "1:1".to_owned()];
        assert!(sample_spline(&points, 5, Some(f64::NAN)).is_err());

        let cli = Cli::try_parse_from(["worldstream-cli", "spline", "0:0", "1:1", "--at", "NaN"]).unwrap();
        let Commands::Spline { points, samples, at } = cli.command else {
            panic!("expected spline");
        };
        assert!(sample_spline(&points, samples, at).is_err());
    }

    #[test]
    fn cli_parses_simulate() {
        let cli = Cli::try_parse_from(["worldstream-cli", "simulate", "-f", "10", "--list"]).unwrap();
        match cli.command {
            Commands::Simulate {
                scenario,
                frames,
                list,
                ..
            } => {
                assert!(scenario.is_none());
                assert_eq!(frames, 10);
                assert!(list);
            }
            _ => panic!("expected simulate"),
        }
    }

    #[test]
    fn demo_simulation_runs() {
        let scenario = Scenario::demo().unwrap();
        simulate(&scenario, 8, 0.016, 0, false).unwrap();
    }
}
