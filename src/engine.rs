//! Step/cycle scheduler for light shows.
//!
//! A show paints through an [`Animation`]. The engine calls `init` once,
//! shows the strip, then calls `update` once per step, `num_steps_per_cycle`
//! steps per cycle, pausing `pause_sec` after every step, until `num_cycles`
//! cycles have completed (or forever for -1). However the loop ends, the
//! strip is torn down exactly once: `shutdown` hook, clear, show, release.

use log::{debug, error, info, warn};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::error::{ParameterError, ShowError, TransportError};
use crate::strip::Strip;

/// Per-step color logic of a show
pub trait Animation {
    fn name(&self) -> &str {
        "animation"
    }

    /// Accept a parameter the engine does not own
    fn configure(&mut self, name: &str, _value: &Value) -> Result<(), ParameterError> {
        Err(ParameterError::Unrecognized(name.to_string()))
    }

    /// Called once before the first transmission; may paint a first frame
    fn init(&mut self, _strip: &mut dyn Strip) {}

    /// Paint one step. `current_step` runs from 0 to
    /// `num_steps_per_cycle - 1` and starts over every cycle; `current_cycle`
    /// counts completed cycles. Return true if the strip needs a repaint.
    fn update(&mut self, strip: &mut dyn Strip, current_step: u64, current_cycle: u64) -> bool;

    /// Called once at teardown, before the strip is cleared
    fn shutdown(&mut self, _strip: &mut dyn Strip) {
        debug!("No shutdown for {}", self.name());
    }
}

impl<A: Animation + ?Sized> Animation for Box<A> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn configure(&mut self, name: &str, value: &Value) -> Result<(), ParameterError> {
        (**self).configure(name, value)
    }

    fn init(&mut self, strip: &mut dyn Strip) {
        (**self).init(strip)
    }

    fn update(&mut self, strip: &mut dyn Strip, current_step: u64, current_cycle: u64) -> bool {
        (**self).update(strip, current_step, current_cycle)
    }

    fn shutdown(&mut self, strip: &mut dyn Strip) {
        (**self).shutdown(strip)
    }
}

/// How many cycles to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cycles {
    Count(u64),
    Forever,
}

/// Timing of a runnable show
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShowParameters {
    pub pause: Duration,
    pub steps_per_cycle: u64,
    pub cycles: Cycles,
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// All configured cycles completed
    Finished { cycles: u64, steps: u64 },
    /// Stopped by the cancel token in `cycle` at `step`
    Cancelled { cycle: u64, step: u64, steps: u64 },
}

pub struct AnimationEngine<A: Animation> {
    animation: A,
    pause_sec: Option<f64>,
    num_steps_per_cycle: Option<u64>,
    num_cycles: Option<Cycles>,
}

impl<A: Animation> AnimationEngine<A> {
    pub fn new(animation: A) -> Self {
        AnimationEngine {
            animation,
            pause_sec: None,
            num_steps_per_cycle: None,
            num_cycles: None,
        }
    }

    #[allow(dead_code)]
    pub fn animation(&self) -> &A {
        &self.animation
    }

    /// Set one show parameter. Timing parameters are handled here,
    /// anything else goes to the animation.
    pub fn configure(&mut self, name: &str, value: &Value) -> Result<(), ParameterError> {
        match name {
            "pause_sec" => {
                let secs = value
                    .as_f64()
                    .ok_or_else(|| ParameterError::invalid(name, "must be a number"))?;
                if secs < 0.0 {
                    return Err(ParameterError::invalid(name, "must not be negative"));
                }
                Duration::try_from_secs_f64(secs)
                    .map_err(|_| ParameterError::invalid(name, "is too large"))?;
                self.pause_sec = Some(secs);
            }
            "num_steps_per_cycle" => {
                let steps = value
                    .as_u64()
                    .filter(|&steps| steps > 0)
                    .ok_or_else(|| ParameterError::invalid(name, "must be a positive integer"))?;
                self.num_steps_per_cycle = Some(steps);
            }
            "num_cycles" => {
                let cycles = match value.as_i64() {
                    Some(-1) => Cycles::Forever,
                    Some(count) if count > 0 => Cycles::Count(count as u64),
                    _ => {
                        return Err(ParameterError::invalid(
                            name,
                            "must be a positive integer or -1",
                        ))
                    }
                };
                self.num_cycles = Some(cycles);
            }
            _ => self.animation.configure(name, value)?,
        }
        debug!("{}: {} = {}", self.animation.name(), name, value);
        Ok(())
    }

    /// Apply every entry of a parameter object in order, stopping at the
    /// first error
    pub fn configure_all(&mut self, parameters: &Map<String, Value>) -> Result<(), ParameterError> {
        for (name, value) in parameters {
            self.configure(name, value)?;
        }
        Ok(())
    }

    /// Fail on the first required parameter that was never set
    pub fn check_runnable(&self) -> Result<ShowParameters, ParameterError> {
        let missing = |name: &str| ParameterError::Missing(name.to_string());
        let pause_sec = self.pause_sec.ok_or_else(|| missing("pause_sec"))?;
        let steps_per_cycle = self
            .num_steps_per_cycle
            .ok_or_else(|| missing("num_steps_per_cycle"))?;
        let cycles = self.num_cycles.ok_or_else(|| missing("num_cycles"))?;

        Ok(ShowParameters {
            pause: Duration::from_secs_f64(pause_sec),
            steps_per_cycle,
            cycles,
        })
    }

    /// Run the show on `strip` until its cycles are done or `cancel` fires.
    ///
    /// Parameters are checked before the strip is touched. Once the show has
    /// started the strip is always cleared and released on the way out,
    /// including on transport errors and panics in the animation.
    pub fn run(&mut self, strip: &mut dyn Strip, cancel: &CancelToken) -> Result<RunOutcome, ShowError> {
        let params = self.check_runnable()?;

        info!(
            "Running {} ({} steps/cycle, {:?} cycles, {:?} pause)",
            self.animation.name(),
            params.steps_per_cycle,
            params.cycles,
            params.pause
        );

        let mut teardown = Teardown {
            animation: &mut self.animation,
            strip,
            done: false,
        };
        let outcome = drive(&mut teardown, &params, cancel);
        let cleaned = teardown.finish();

        match (outcome, cleaned) {
            (Ok(outcome), Ok(())) => {
                info!("Show ended: {:?}", outcome);
                Ok(outcome)
            }
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), Ok(())) => Err(e.into()),
            (Err(e), Err(cleanup_err)) => {
                warn!("Cleanup after failed show also failed: {}", cleanup_err);
                Err(e.into())
            }
        }
    }
}

/// Scoped teardown: runs the cleanup sequence once, either explicitly via
/// `finish` or on drop when the loop unwinds.
struct Teardown<'a, A: Animation> {
    animation: &'a mut A,
    strip: &'a mut dyn Strip,
    done: bool,
}

impl<A: Animation> Teardown<'_, A> {
    fn finish(&mut self) -> Result<(), TransportError> {
        if self.done {
            return Ok(());
        }
        self.done = true;

        self.animation.shutdown(&mut *self.strip);
        self.strip.clear_buffer();
        let shown = self.strip.show();
        debug!("Strip cleared");
        self.strip.close();
        debug!("Transport closed");
        shown
    }
}

impl<A: Animation> Drop for Teardown<'_, A> {
    fn drop(&mut self) {
        if !self.done {
            warn!("Show aborted, cleaning up");
            if let Err(e) = self.finish() {
                error!("Failed to clear strip: {}", e);
            }
        }
    }
}

fn drive<A: Animation>(
    teardown: &mut Teardown<'_, A>,
    params: &ShowParameters,
    cancel: &CancelToken,
) -> Result<RunOutcome, TransportError> {
    let Teardown {
        animation, strip, ..
    } = teardown;
    let mut steps = 0;

    if cancel.is_cancelled() {
        debug!("Cancelled before start");
        return Ok(RunOutcome::Cancelled {
            cycle: 0,
            step: 0,
            steps,
        });
    }

    animation.init(&mut **strip);
    strip.show()?;

    let mut cycle = 0;
    loop {
        for step in 0..params.steps_per_cycle {
            if cancel.is_cancelled() {
                debug!("Interrupted before step {} of cycle {}", step, cycle);
                return Ok(RunOutcome::Cancelled { cycle, step, steps });
            }

            let repaint = animation.update(&mut **strip, step, cycle);
            steps += 1;
            if cancel.is_cancelled() {
                debug!("Cancelled during step {} of cycle {}", step, cycle);
                return Ok(RunOutcome::Cancelled { cycle, step, steps });
            }
            if repaint {
                strip.show()?;
            }

            if cancel.sleep(params.pause) {
                debug!("Interrupted after step {} of cycle {}", step, cycle);
                return Ok(RunOutcome::Cancelled { cycle, step, steps });
            }
        }

        cycle += 1;
        if let Cycles::Count(count) = params.cycles {
            if cycle >= count {
                break;
            }
        }
    }

    Ok(RunOutcome::Finished {
        cycles: cycle,
        steps,
    })
}
