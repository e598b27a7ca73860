//! Shot profiles: a short list of `(trigger, setpoint)` steps evaluated
//! against shot progress.
//!
//! Progress `x` is either elapsed seconds or grams in the cup.  Each step
//! spans `trigger` units of `x` starting where the previous one ended.
//!
//! ```text
//!  setpoint
//!     ▲          ┌────── step 1 (stepped)
//!     │   ┌──────┘
//!     │ ──┘ step 0
//!     └──────────────────────▶ x
//!         ╱──────╲             (ramped: blend from previous target)
//! ```

use serde::{Deserialize, Serialize};

use crate::error::CommandError;

pub const MAX_PROFILE_STEPS: usize = 32;

/// Steps shorter than this are treated as instantaneous.
const ZERO_SPAN: f32 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfileStep {
    /// Length of the step along the progress axis.
    pub trigger: f32,
    /// Target pressure (bar) or flow (g/s).
    pub setpoint: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProfileShape {
    /// Hold each target until the step ends.
    Stepped,
    /// Blend linearly from the previous target across the step.
    Ramped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EspressoProfile {
    pub name: heapless::String<64>,
    pub shape: ProfileShape,
    pub steps: heapless::Vec<ProfileStep, MAX_PROFILE_STEPS>,
}

impl Default for EspressoProfile {
    fn default() -> Self {
        Self {
            name: heapless::String::new(),
            shape: ProfileShape::Ramped,
            steps: heapless::Vec::new(),
        }
    }
}

/// Shot-scoped progress through a profile.  Reset on every BREWING entry.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ShotCursor {
    index: usize,
    step_start_x: f32,
    prev_target: f32,
}

impl ShotCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn step_start_x(&self) -> f32 {
        self.step_start_x
    }

    pub fn prev_target(&self) -> f32 {
        self.prev_target
    }
}

impl EspressoProfile {
    /// Target setpoint at progress `x`, advancing `cursor` past every step
    /// whose end `x` has reached.  The cursor never moves backwards, so a
    /// shrinking `x` (e.g. a weight dip) keeps the current step.
    pub fn target_at(&self, cursor: &mut ShotCursor, x: f32) -> f32 {
        if self.steps.is_empty() {
            return 0.0;
        }

        while let Some(step) = self.steps.get(cursor.index) {
            let span = step.trigger;
            let step_end = cursor.step_start_x + span;

            if x >= step_end - ZERO_SPAN {
                cursor.index += 1;
                cursor.step_start_x = step_end;
                cursor.prev_target = step.setpoint;
                continue;
            }

            return match self.shape {
                ProfileShape::Stepped => step.setpoint,
                ProfileShape::Ramped => {
                    if span <= ZERO_SPAN {
                        return step.setpoint;
                    }
                    let ratio = ((x - cursor.step_start_x) / span).clamp(0.0, 1.0);
                    cursor.prev_target + ratio * (step.setpoint - cursor.prev_target)
                }
            };
        }

        cursor.prev_target
    }

    /// Parse the compact wire form
    /// `{"n": name, "m": 0|1, "s": [[setpoint, trigger], ...]}`.
    ///
    /// `m == 1` selects stepped, anything else ramped.  Steps past
    /// [`MAX_PROFILE_STEPS`] are dropped.
    pub fn from_json(json: &str) -> Result<Self, CommandError> {
        let wire: ProfileWire = serde_json::from_str(json).map_err(|_| CommandError::Json)?;

        let mut name = heapless::String::new();
        for ch in wire.n.as_deref().unwrap_or("Imported").chars() {
            if name.push(ch).is_err() {
                break;
            }
        }

        let mut steps = heapless::Vec::new();
        for [setpoint, trigger] in wire.s.into_iter().take(MAX_PROFILE_STEPS) {
            // Capacity is guaranteed by the take() above.
            let _ = steps.push(ProfileStep { trigger, setpoint });
        }

        Ok(Self {
            name,
            shape: if wire.m == 1 {
                ProfileShape::Stepped
            } else {
                ProfileShape::Ramped
            },
            steps,
        })
    }

    /// Inverse of [`from_json`](Self::from_json).
    pub fn to_json(&self) -> String {
        let wire = ProfileWire {
            n: Some(self.name.as_str().into()),
            m: i64::from(self.shape == ProfileShape::Stepped),
            s: self.steps.iter().map(|s| [s.setpoint, s.trigger]).collect(),
        };
        serde_json::to_string(&wire).unwrap_or_default()
    }
}

#[derive(Serialize, Deserialize)]
struct ProfileWire {
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    m: i64,
    #[serde(default)]
    s: Vec<[f32; 2]>,
}
