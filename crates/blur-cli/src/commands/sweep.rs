//! Sweep command
//!
//! Replays slider movement against a [`BlurSession`]: every position is
//! sent as an intensity change, moves closer together than the debounce
//! delay collapse into one blur, and revisited positions come from the
//! cache.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use blur_core::PixelBuffer;
use blur_engine::{BlurSession, CoordinatorEvent, EngineConfig};
use tracing::{info, trace, warn};

use crate::SweepArgs;

/// How long to wait for the last position to settle.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Event tallies for the summary.
#[derive(Debug, Default)]
struct Tally {
    changes: usize,
    computed: usize,
    cached: usize,
    base: usize,
    errors: usize,
    written: usize,
}

pub fn run(args: SweepArgs, mut config: EngineConfig, verbose: u8) -> Result<()> {
    trace!(input = %args.input.display(), "sweep::run");

    let positions = positions(&args)?;
    if let Some(ms) = args.debounce_ms {
        config.debounce_ms = ms;
    }
    if let Some(dir) = &args.output_dir {
        std::fs::create_dir_all(dir)?;
    }

    let image = super::load_image(&args.input)?;
    let identity = image.fingerprint();
    let stem = args
        .input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "blur".into());

    info!(
        positions = positions.len(),
        interval_ms = args.interval_ms,
        debounce_ms = config.debounce_ms,
        %identity,
        "Starting sweep"
    );
    let session = BlurSession::start(&config)?;
    session.set_base_image(image, Some(identity));

    let mut tally = Tally::default();
    let out = Output {
        dir: args.output_dir.as_deref(),
        stem: &stem,
        verbose,
    };
    let interval = Duration::from_millis(args.interval_ms);

    let mut settled = false;
    for &value in &positions {
        session.set_intensity(value);
        settled = false;
        let until = Instant::now() + interval;
        while let Some(left) = until.checked_duration_since(Instant::now()) {
            let Some(event) = session.recv_event_timeout(left) else {
                break;
            };
            settled |= out.handle(event, &mut tally)?.settles(value);
        }
    }

    let last = positions.last().copied().unwrap_or(0.0);
    let deadline = Instant::now() + SETTLE_TIMEOUT;
    while !settled {
        let Some(left) = deadline.checked_duration_since(Instant::now()) else {
            warn!(last, "Sweep did not settle");
            break;
        };
        if let Some(event) = session.recv_event_timeout(left) {
            settled = out.handle(event, &mut tally)?.settles(last);
        }
    }

    let stats = session.cache().stats();
    session.close();

    println!(
        "{} positions: {} changes, {} computed, {} from cache, {} base, {} errors",
        positions.len(),
        tally.changes,
        tally.computed,
        tally.cached,
        tally.base,
        tally.errors
    );
    println!(
        "cache: {}/{} entries, {} / {}, hit rate {:.1}%, {} evictions",
        stats.entries,
        stats.max_entries,
        super::format_size(stats.memory),
        super::format_size(stats.max_memory),
        stats.hit_rate(),
        stats.evictions
    );
    if tally.written > 0 {
        println!("wrote {} images", tally.written);
    }
    Ok(())
}

/// What a handled event means for settling.
enum Seen {
    Blur(f64),
    Base,
    Error,
    Other,
}

impl Seen {
    /// True once the coordinator has answered the final position.
    fn settles(&self, last: f64) -> bool {
        match self {
            Self::Blur(v) => (v - last).abs() < 1e-9,
            Self::Base => last <= 0.0,
            Self::Error => true,
            Self::Other => false,
        }
    }
}

struct Output<'a> {
    dir: Option<&'a Path>,
    stem: &'a str,
    verbose: u8,
}

impl Output<'_> {
    fn handle(&self, event: CoordinatorEvent, tally: &mut Tally) -> Result<Seen> {
        let seen = match event {
            CoordinatorEvent::IntensityChanged(v) => {
                tally.changes += 1;
                if self.verbose > 1 {
                    println!("  slider {:.2}", v);
                }
                Seen::Other
            }
            CoordinatorEvent::BlurReady {
                intensity,
                image,
                from_cache,
            } => {
                if from_cache {
                    tally.cached += 1;
                } else {
                    tally.computed += 1;
                }
                if self.verbose > 0 {
                    let source = if from_cache { "cache" } else { "computed" };
                    println!("  blur {:.1} ({source})", intensity);
                }
                self.write(intensity, &image, tally)?;
                Seen::Blur(intensity)
            }
            CoordinatorEvent::ShowBase(_) => {
                tally.base += 1;
                Seen::Base
            }
            CoordinatorEvent::Error(e) => {
                tally.errors += 1;
                eprintln!("error: {e}");
                Seen::Error
            }
        };
        Ok(seen)
    }

    fn write(&self, intensity: f64, image: &PixelBuffer, tally: &mut Tally) -> Result<()> {
        let Some(dir) = self.dir else {
            return Ok(());
        };
        let path = dir.join(format!("{}_{:.1}.png", self.stem, intensity));
        super::save_image(&path, image)?;
        tally.written += 1;
        Ok(())
    }
}

/// Slider positions from `--values` or the `--from/--to/--step` range.
fn positions(args: &SweepArgs) -> Result<Vec<f64>> {
    if !args.values.is_empty() {
        return Ok(args.values.clone());
    }
    if !args.step.is_finite() || args.step <= 0.0 {
        bail!("--step must be positive, got {}", args.step);
    }
    let span = args.to - args.from;
    let steps = (span.abs() / args.step + 1e-9).floor() as usize;
    let dir = span.signum();
    Ok((0..=steps)
        .map(|i| args.from + dir * args.step * i as f64)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn args(from: f64, to: f64, step: f64) -> SweepArgs {
        SweepArgs {
            input: PathBuf::from("in.png"),
            values: Vec::new(),
            from,
            to,
            step,
            interval_ms: 0,
            debounce_ms: None,
            output_dir: None,
        }
    }

    #[test]
    fn range_includes_both_ends() {
        let p = positions(&args(0.0, 1.0, 0.25)).unwrap();
        assert_eq!(p, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn range_descends() {
        let p = positions(&args(2.0, 1.0, 0.5)).unwrap();
        assert_eq!(p, vec![2.0, 1.5, 1.0]);
    }

    #[test]
    fn explicit_values_win() {
        let mut a = args(0.0, 5.0, 1.0);
        a.values = vec![3.0, 1.0];
        assert_eq!(positions(&a).unwrap(), vec![3.0, 1.0]);
    }

    #[test]
    fn zero_step_rejected() {
        assert!(positions(&args(0.0, 1.0, 0.0)).is_err());
    }

    #[test]
    fn settling() {
        assert!(Seen::Blur(2.5).settles(2.5));
        assert!(!Seen::Blur(2.0).settles(2.5));
        assert!(Seen::Base.settles(0.0));
        assert!(!Seen::Base.settles(1.0));
        assert!(Seen::Error.settles(1.0));
    }
}
