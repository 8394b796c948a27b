//! Delayed linear interpolation for remote entities.

use std::collections::{HashMap, VecDeque};

/// Samples kept per entity.
pub const MAX_SAMPLES: usize = 10;

/// Render remote entities this far in the past, in seconds.
pub const INTERPOLATION_DELAY: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub time: f64,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

impl Sample {
    fn lerp(&self, other: &Sample, t: f32) -> Sample {
        Sample {
            time: self.time + (other.time - self.time) * f64::from(t),
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
            vx: self.vx + (other.vx - self.vx) * t,
            vy: self.vy + (other.vy - self.vy) * t,
        }
    }
}

#[derive(Debug, Default)]
struct Track {
    samples: VecDeque<Sample>,
    generation: u64,
}

pub struct Interpolator {
    tracks: HashMap<u16, Track>,
    local: Option<u16>,
    delay: f64,
    generation: u64,
}

impl Interpolator {
    pub fn new() -> Self {
        Self::with_delay(INTERPOLATION_DELAY)
    }

    pub fn with_delay(delay: f64) -> Self {
        Self {
            tracks: HashMap::new(),
            local: None,
            delay: delay.max(0.0),
            generation: 0,
        }
    }

    /// The predicted entity never gets a track.
    pub fn set_local(&mut self, local: Option<u16>) {
        self.local = local;
        if let Some(id) = local {
            self.tracks.remove(&id);
        }
    }

    pub fn local(&self) -> Option<u16> {
        self.local
    }

    /// Start a new snapshot; tracks not pushed before the next
    /// [`prune_stale`](Self::prune_stale) are dropped.
    pub fn begin_snapshot(&mut self) {
        self.generation += 1;
    }

    /// Record a sample for `id`. Samples older than the newest one are ignored.
    pub fn push(&mut self, id: u16, sample: Sample) {
        if self.local == Some(id) {
            return;
        }
        let generation = self.generation;
        let track = self.tracks.entry(id).or_default();
        track.generation = generation;
        if track
            .samples
            .back()
            .is_some_and(|newest| sample.time < newest.time)
        {
            return;
        }
        if track.samples.len() == MAX_SAMPLES {
            track.samples.pop_front();
        }
        track.samples.push_back(sample);
    }

    /// Drop tracks absent from the newest snapshot. Returns how many went.
    pub fn prune_stale(&mut self) -> usize {
        let generation = self.generation;
        let before = self.tracks.len();
        self.tracks.retain(|_, track| track.generation == generation);
        before - self.tracks.len()
    }

    /// State of `id` at `now - delay`. Clamped to the oldest and newest
    /// samples; never extrapolates.
    pub fn sample(&self, id: u16, now: f64) -> Option<Sample> {
        let samples = &self.tracks.get(&id)?.samples;
        let newest = *samples.back()?;
        if samples.len() < 2 {
            return Some(newest);
        }

        let render_time = now - self.delay;
        let oldest = samples[0];
        if render_time <= oldest.time {
            return Some(oldest);
        }
        if render_time >= newest.time {
            return Some(newest);
        }

        for (from, to) in samples.iter().zip(samples.iter().skip(1)) {
            if render_time >= from.time && render_time <= to.time {
                let span = to.time - from.time;
                if span <= f64::EPSILON {
                    return Some(*to);
                }
                let t = ((render_time - from.time) / span) as f32;
                return Some(from.lerp(to, t));
            }
        }
        Some(newest)
    }

    pub fn ids(&self) -> impl Iterator<Item = u16> + '_ {
        self.tracks.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }
}

impl Default for Interpolator {
    fn default() -> Self {
        Self::new()
    }
}
