//! Segment planner: splits a requested duration into bounded segments.
//!
//! Planning is pure apart from drawing a seed when the job does not supply
//! one. Every entry of a plan shares the job's seed, camera motion and
//! subject lock so consecutive segments stay visually consistent.

use rand::Rng;
use serde::Serialize;
use sf_core::config::RenderConfig;
use sf_core::{
    CameraMotion, Error, Result, MAX_SEED, MAX_VIDEO_DURATION_SECS, MIN_VIDEO_DURATION_SECS,
};

/// Allowed segment length range, in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentBounds {
    pub min_secs: u32,
    pub max_secs: u32,
}

impl SegmentBounds {
    pub fn from_config(render: &RenderConfig) -> Self {
        Self {
            min_secs: render.segment_min_secs,
            max_secs: render.segment_max_secs,
        }
    }

    fn check(&self) -> Result<()> {
        if self.min_secs == 0 || self.min_secs > self.max_secs {
            return Err(Error::Validation(format!(
                "invalid segment bounds [{}, {}]",
                self.min_secs, self.max_secs
            )));
        }
        Ok(())
    }
}

impl Default for SegmentBounds {
    fn default() -> Self {
        Self {
            min_secs: 20,
            max_secs: 60,
        }
    }
}

/// Reject durations outside `1..=600` seconds.
pub fn validate_duration(duration_secs: u32) -> Result<()> {
    if !(MIN_VIDEO_DURATION_SECS..=MAX_VIDEO_DURATION_SECS).contains(&duration_secs) {
        return Err(Error::Validation(format!(
            "duration_seconds must be between {MIN_VIDEO_DURATION_SECS} and \
             {MAX_VIDEO_DURATION_SECS}, got {duration_secs}"
        )));
    }
    Ok(())
}

/// Split `total_secs` into segment lengths.
///
/// A total that fits in one segment is returned as-is. Otherwise the
/// smallest segment count `k` whose near-equal split stays within `bounds`
/// is chosen; the remainder is spread one second at a time over the first
/// segments, so the lengths are non-increasing and differ by at most one.
///
/// # Errors
///
/// [`Error::Validation`] for a zero total, invalid bounds, or a total that
/// no split can satisfy.
pub fn plan_durations(total_secs: u32, bounds: SegmentBounds) -> Result<Vec<u32>> {
    bounds.check()?;
    if total_secs == 0 {
        return Err(Error::Validation("cannot plan a zero-length video".into()));
    }
    if total_secs <= bounds.max_secs {
        return Ok(vec![total_secs]);
    }

    let first = total_secs.div_ceil(bounds.max_secs);
    let last = total_secs / bounds.min_secs;
    for k in first..=last {
        let base = total_secs / k;
        let remainder = total_secs % k;
        let longest = base + u32::from(remainder > 0);
        if base >= bounds.min_secs && longest <= bounds.max_secs {
            let mut plan = vec![base + 1; remainder as usize];
            plan.extend(std::iter::repeat(base).take((k - remainder) as usize));
            return Ok(plan);
        }
    }

    Err(Error::Validation(format!(
        "no segment plan for {total_secs}s within [{}, {}]s",
        bounds.min_secs, bounds.max_secs
    )))
}

/// Draw a fresh seed uniformly from `1..=MAX_SEED`.
pub fn draw_seed() -> u32 {
    rand::thread_rng().gen_range(1..=MAX_SEED)
}

/// Job-level rendering choices applied to every segment. `None` fields take
/// their defaults when the plan is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanOptions {
    pub seed: Option<u32>,
    pub camera_motion: Option<CameraMotion>,
    pub subject_lock: Option<bool>,
}

/// One segment of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentPlanEntry {
    pub segment_index: usize,
    pub duration_sec: u32,
    pub seed: u32,
    pub camera_motion: CameraMotion,
    pub subject_lock: bool,
}

/// The ordered segments of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentPlan {
    pub total_secs: u32,
    pub seed: u32,
    pub camera_motion: CameraMotion,
    pub subject_lock: bool,
    pub entries: Vec<SegmentPlanEntry>,
}

impl SegmentPlan {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn durations(&self) -> Vec<u32> {
        self.entries.iter().map(|e| e.duration_sec).collect()
    }
}

/// Validate `total_secs` and build the full plan.
pub fn build_plan(
    total_secs: u32,
    bounds: SegmentBounds,
    options: PlanOptions,
) -> Result<SegmentPlan> {
    validate_duration(total_secs)?;
    if let Some(seed) = options.seed {
        if !(1..=MAX_SEED).contains(&seed) {
            return Err(Error::Validation(format!(
                "seed must be between 1 and {MAX_SEED}, got {seed}"
            )));
        }
    }

    let durations = plan_durations(total_secs, bounds)?;
    let seed = options.seed.unwrap_or_else(draw_seed);
    let camera_motion = options.camera_motion.unwrap_or_default();
    let subject_lock = options.subject_lock.unwrap_or(true);

    let entries = durations
        .into_iter()
        .enumerate()
        .map(|(segment_index, duration_sec)| SegmentPlanEntry {
            segment_index,
            duration_sec,
            seed,
            camera_motion,
            subject_lock,
        })
        .collect();

    Ok(SegmentPlan {
        total_secs,
        seed,
        camera_motion,
        subject_lock,
        entries,
    })
}
