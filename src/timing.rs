//! Human behavior timing model.
//!
//! Pure generators that turn a random source into concrete pause/pointer/
//! scroll plans. Nothing here touches a page: the browser strategy plays
//! the plans back, so plan generation never holds a thread-local RNG
//! across an await point and every distribution is unit-testable with a
//! seeded RNG.
//!
//! Four sub-behaviors compose a session: pointer movement, scrolling,
//! reading simulation, and a full exploration pass. The orchestrator
//! sequences them (human mode runs all four, the default run skips
//! exploration).

use std::time::Duration;

use rand::Rng;

use crate::config::Viewport;

/// Behavior complexity tier, mapping to a (base, range) pause profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

impl Complexity {
    fn profile(self) -> (u64, u64) {
        match self {
            Complexity::Simple => (1000, 1000),
            Complexity::Medium => (2000, 2000),
            Complexity::Complex => (3000, 4000),
        }
    }
}

/// A simulated reading pause: `base + uniform(0, range)` for the tier.
pub fn reading_pause(complexity: Complexity, rng: &mut impl Rng) -> Duration {
    let (base, range) = complexity.profile();
    Duration::from_millis(base + rng.gen_range(0..range))
}

/// Randomized delay between successful page fetches: `base..2*base`.
pub fn inter_page_delay(base: Duration, rng: &mut impl Rng) -> Duration {
    let base_ms = base.as_millis() as u64;
    if base_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(base_ms + rng.gen_range(0..base_ms))
}

/// One pointer movement: target coordinates, interpolation steps, and the
/// pause that follows.
#[derive(Debug, Clone)]
pub struct PointerMove {
    pub x: u32,
    pub y: u32,
    pub steps: u32,
    pub pause: Duration,
}

/// 2-4 random on-viewport waypoints with randomized step counts.
pub fn pointer_path(viewport: Viewport, rng: &mut impl Rng) -> Vec<PointerMove> {
    let moves = rng.gen_range(2..=4);
    (0..moves)
        .map(|_| PointerMove {
            x: rng.gen_range(100..900).min(viewport.width.saturating_sub(1)),
            y: rng.gen_range(100..700).min(viewport.height.saturating_sub(1)),
            steps: rng.gen_range(5..15),
            pause: Duration::from_millis(rng.gen_range(200..700)),
        })
        .collect()
}

/// One stepped scroll burst. `step_px` is applied `pauses.len()` times,
/// pausing between steps; `pause_after` separates sessions.
#[derive(Debug, Clone)]
pub struct ScrollSession {
    pub step_px: f64,
    pub pauses: Vec<Duration>,
    pub pause_after: Option<Duration>,
}

/// A full scrolling pattern: stepped sessions plus an optional upward
/// rebound at the end.
#[derive(Debug, Clone)]
pub struct ScrollPlan {
    pub sessions: Vec<ScrollSession>,
    /// `(pause before, pixels up)` — present with 30% probability.
    pub rebound: Option<(Duration, u32)>,
}

/// 2-5 scroll sessions of 200-1000px split into 3-7 stepped increments.
pub fn scroll_plan(rng: &mut impl Rng) -> ScrollPlan {
    let session_count = rng.gen_range(2..=5);
    let sessions = (0..session_count)
        .map(|i| {
            let distance = rng.gen_range(200..1000) as f64;
            let steps = rng.gen_range(3..8);
            let pauses = (0..steps)
                .map(|_| Duration::from_millis(rng.gen_range(300..1100)))
                .collect();
            ScrollSession {
                step_px: distance / steps as f64,
                pauses,
                pause_after: (i + 1 < session_count)
                    .then(|| Duration::from_millis(rng.gen_range(1000..3000))),
            }
        })
        .collect();
    let rebound = (rng.gen::<f64>() < 0.3).then(|| {
        (
            Duration::from_millis(rng.gen_range(500..1500)),
            rng.gen_range(100..500),
        )
    });
    ScrollPlan { sessions, rebound }
}

/// A reading focus point: the pointer drifts there, then dwells.
#[derive(Debug, Clone)]
pub struct ReadingFocus {
    pub x: u32,
    pub y: u32,
    pub steps: u32,
    pub dwell: Duration,
}

/// 2-4 focus points drawn from three loose screen regions, dwell
/// 1.5-4.5s each.
pub fn reading_plan(rng: &mut impl Rng) -> Vec<ReadingFocus> {
    let focuses = rng.gen_range(2..=4);
    (0..focuses)
        .map(|_| {
            let (x, y) = match rng.gen_range(0..3) {
                0 => (rng.gen_range(100..500), rng.gen_range(100..400)),
                1 => (rng.gen_range(400..800), rng.gen_range(200..500)),
                _ => (rng.gen_range(200..800), rng.gen_range(300..700)),
            };
            ReadingFocus {
                x,
                y,
                steps: rng.gen_range(3..11),
                dwell: Duration::from_millis(rng.gen_range(1500..4500)),
            }
        })
        .collect()
}

/// One stop on the exploration circuit.
#[derive(Debug, Clone)]
pub struct ExplorationStop {
    pub x: u32,
    pub y: u32,
    pub steps: u32,
    pub dwell: Duration,
    /// Extra short hover, present with 30% probability.
    pub hover: Option<Duration>,
}

/// The full page-exploration pass: a fixed circuit of screen regions,
/// then a scroll-to-bottom / scroll-back-to-top cycle.
#[derive(Debug, Clone)]
pub struct ExplorationPlan {
    pub stops: Vec<ExplorationStop>,
    pub bottom_pause: Duration,
    pub top_pause: Duration,
}

/// Header, main content, middle, lower content, sidebar — visited in
/// order, matching how a person skims an unfamiliar page.
const EXPLORATION_POINTS: [(u32, u32); 5] =
    [(200, 150), (400, 300), (300, 500), (500, 700), (150, 400)];

pub fn exploration_plan(rng: &mut impl Rng) -> ExplorationPlan {
    let stops = EXPLORATION_POINTS
        .iter()
        .map(|&(x, y)| ExplorationStop {
            x,
            y,
            steps: rng.gen_range(8..=20),
            dwell: Duration::from_millis(rng.gen_range(800..2300)),
            hover: (rng.gen::<f64>() < 0.3)
                .then(|| Duration::from_millis(rng.gen_range(200..700))),
        })
        .collect();
    ExplorationPlan {
        stops,
        bottom_pause: Duration::from_millis(rng.gen_range(1000..3000)),
        top_pause: Duration::from_millis(rng.gen_range(500..1500)),
    }
}
