use std::collections::{BTreeMap, VecDeque};
use std::io::Write;
use std::sync::{Mutex, OnceLock};

use anyhow::{Result, anyhow};
use geo::Point;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};

use crate::cleaner::{CleanOutcome, TrackCleaner};
use crate::config::SnapConfig;
use crate::displacement::{self, Displacement};
use crate::graph::Graph;
use crate::matcher::{MapMatcher, MatchThreshold, Rejection, SeededRandom};
use crate::report::{self, ReportWriter, RouteRecord};
use crate::runway::Runway;
use crate::spatial_index::EdgeGrid;
use crate::track::Track;

/// What became of one track.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackOutcome {
    Matched {
        movements: usize,
        cleaned: bool,
        displacement: Option<Displacement>,
    },
    Unmatched {
        cleaned: bool,
        reason: Rejection,
    },
    /// The cleaner flagged too much of the trace
    Discarded,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub tracks: usize,
    pub matched: usize,
    pub displaced: usize,
    pub unmatched: usize,
    pub cleaned: usize,
    pub discarded: usize,
    pub movements: usize,
}

impl Summary {
    fn add(&mut self, outcome: &TrackOutcome) {
        self.tracks += 1;
        match outcome {
            TrackOutcome::Matched {
                movements,
                cleaned,
                displacement,
            } => {
                self.matched += 1;
                self.movements += movements;
                self.cleaned += usize::from(*cleaned);
                self.displaced += usize::from(displacement.is_some());
            }
            TrackOutcome::Unmatched { cleaned, .. } => {
                self.unmatched += 1;
                self.cleaned += usize::from(*cleaned);
            }
            TrackOutcome::Discarded => self.discarded += 1,
        }
    }
}

/// Shared, read-only state for matching a batch of tracks at one airport.
pub struct SnapContext<'a> {
    pub graph: &'a Graph,
    pub index: &'a EdgeGrid,
    pub runways: &'a BTreeMap<String, Runway>,
    pub config: &'a SnapConfig,
    pub airport: Point<f64>,
    pub intervals_explicit: bool,
    /// Threshold for the first, undisplaced attempt
    pub threshold: MatchThreshold,
}

/// Cleans, matches and reports a single track.
pub fn process_track<R: Write, T: Write>(
    ctx: &SnapContext<'_>,
    track: &Track,
    seed: u64,
    report: &ReportWriter<R, T>,
) -> Result<TrackOutcome> {
    let mut cleaner = TrackCleaner::new(&ctx.config.cleaner, ctx.airport);
    let (points, cleaned) = match cleaner.clean(&track.points) {
        CleanOutcome::Unchanged(points) => (points, false),
        CleanOutcome::Cleaned { points, removed } => {
            debug!("{}: removed {} outlying fixes", track.id, removed);
            (points, true)
        }
        CleanOutcome::Discarded { flagged } => {
            debug!("{}: discarded, {} of {} fixes flagged", track.id, flagged, track.len());
            return Ok(TrackOutcome::Discarded);
        }
    };

    let matcher = MapMatcher::new(ctx.graph, ctx.index, &ctx.config.matcher);
    let mut tie_break = SeededRandom::new(seed);
    let (route, displacement) =
        match matcher.match_track(&points, ctx.threshold, &mut tie_break, ctx.intervals_explicit) {
            Ok(route) => (route, None),
            Err(reason) => {
                debug!("{}: {}, trying displaced copies", track.id, reason);
                match displacement::match_displaced(
                    &matcher,
                    &points,
                    &ctx.config.displacement,
                    &mut tie_break,
                    ctx.intervals_explicit,
                ) {
                    Some((route, displacement)) => (route, Some(displacement)),
                    None => {
                        debug!("{}: unmatched ({})", track.id, reason);
                        return Ok(TrackOutcome::Unmatched { cleaned, reason });
                    }
                }
            }
        };

    let movements = route.split(ctx.graph);
    if movements.is_empty() {
        debug!("{}: matched route holds no complete movement", track.id);
        return Ok(TrackOutcome::Unmatched {
            cleaned,
            reason: Rejection::NoMovement,
        });
    }

    for (i, movement) in movements.iter().enumerate() {
        let record = RouteRecord::new(ctx.graph, ctx.runways, track, i, movement, displacement);
        report.write_route(&record)?;
        report.write_times(&report::edge_time_rows(ctx.graph, track, i, movement))?;
    }

    Ok(TrackOutcome::Matched {
        movements: movements.len(),
        cleaned,
        displacement,
    })
}

/// Worker count: the configured value, else available parallelism, never more than the tracks.
pub fn worker_count(configured: Option<usize>, tracks: usize) -> usize {
    let available = configured
        .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
        .unwrap_or(1);
    available.min(tracks).max(1)
}

/// Runs every track through the pipeline on a pool of workers pulling from a shared queue.
///
/// Outcomes are returned in track order whatever order the workers finish in.
pub fn run<R: Write + Send, T: Write + Send>(
    ctx: &SnapContext<'_>,
    tracks: &[Track],
    seed: u64,
    workers: usize,
    report: &ReportWriter<R, T>,
    show_progress: bool,
) -> Result<(Vec<TrackOutcome>, Summary)> {
    let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build()?;
    info!("Matching {} tracks on {} workers", tracks.len(), workers);

    let pb = if show_progress {
        let pb = ProgressBar::new(tracks.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({eta}) - {msg}")?
                .progress_chars("##-"),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let queue: Mutex<VecDeque<usize>> = Mutex::new((0..tracks.len()).collect());
    let slots: Vec<OnceLock<Result<TrackOutcome>>> = (0..tracks.len()).map(|_| OnceLock::new()).collect();

    pool.scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|_| {
                loop {
                    let next = queue.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
                    let Some(i) = next else {
                        break;
                    };
                    let track = &tracks[i];
                    let outcome = process_track(ctx, track, seed.wrapping_add(i as u64), report);
                    pb.set_message(track.id.clone());
                    pb.inc(1);
                    if slots[i].set(outcome).is_err() {
                        warn!("Track {} was processed twice", track.id);
                    }
                }
            });
        }
    });
    pb.finish_with_message("done");

    let mut outcomes = Vec::with_capacity(tracks.len());
    let mut summary = Summary::default();
    for (slot, track) in slots.into_iter().zip(tracks) {
        let outcome = slot
            .into_inner()
            .ok_or_else(|| anyhow!("Track {} was never processed", track.id))??;
        summary.add(&outcome);
        outcomes.push(outcome);
    }

    info!(
        "Matched {} of {} tracks ({} after displacement) into {} movements; {} unmatched, {} cleaned, {} discarded",
        summary.matched,
        summary.tracks,
        summary.displaced,
        summary.movements,
        summary.unmatched,
        summary.cleaned,
        summary.discarded
    );
    Ok((outcomes, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::displace;
    use crate::graph::fixtures::{origin, strip};
    use crate::runway::locate_runways;
    use crate::spatial_index::IndexConfig;
    use crate::track::{MovementDirection, TimeCoordinate};

    fn track(id: &str, north: f64) -> Track {
        let points = (0..9)
            .map(|i| TimeCoordinate {
                position: displace(origin(), 25.0 * i as f64, north),
                timestamp_ms: 1000 * i as i64,
                interval_s: 1.0,
                altitude_m: 0.0,
            })
            .collect();
        Track {
            id: id.to_string(),
            origin: None,
            destination: None,
            direction: MovementDirection::Outbound,
            points,
        }
    }

    #[test]
    fn test_worker_count_bounds() {
        assert_eq!(worker_count(Some(8), 3), 3);
        assert_eq!(worker_count(Some(2), 10), 2);
        assert_eq!(worker_count(Some(4), 0), 1);
        assert!(worker_count(None, 100) >= 1);
    }

    #[test]
    fn test_batch_outcomes_in_track_order() {
        let s = strip();
        let index = EdgeGrid::build(&s.graph, &IndexConfig::default()).unwrap();
        let runways = locate_runways(&s.graph);
        let config = SnapConfig::default();
        let ctx = SnapContext {
            graph: &s.graph,
            index: &index,
            runways: &runways,
            config: &config,
            airport: origin(),
            intervals_explicit: true,
            threshold: MatchThreshold::Harsh,
        };

        let tracks = vec![track("on-taxiway", 2.0), track("biased", 35.0), track("lost", 500.0)];
        let report: ReportWriter<Vec<u8>, Vec<u8>> = ReportWriter::new(Vec::new(), Some(Vec::new()));
        let (outcomes, summary) = run(&ctx, &tracks, 7, 2, &report, false).unwrap();

        assert!(matches!(
            outcomes[0],
            TrackOutcome::Matched {
                movements: 1,
                displacement: None,
                ..
            }
        ));
        assert!(matches!(
            outcomes[1],
            TrackOutcome::Matched {
                displacement: Some(_),
                ..
            }
        ));
        assert!(matches!(outcomes[2], TrackOutcome::Unmatched { .. }));
        assert_eq!(summary.tracks, 3);
        assert_eq!(summary.matched, 2);
        assert_eq!(summary.displaced, 1);
        assert_eq!(summary.unmatched, 1);

        let (routes, _) = report.finish().unwrap();
        let text = String::from_utf8(routes).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().all(|l| l.contains("\"stand\":\"A1\"")));
    }
}
