//! SPU ADSR envelope emulation.

use infierno_core::{Module, Mono, Result};

/// Sample rate the envelope generator runs at. The SPU stepped its envelopes
/// at the hardware rate regardless of the playback frequency; channels that
/// run at another output rate adapt the envelope with a linear resampler.
pub const ENVELOPE_SAMPLE_RATE: u32 = 44_100;

/// Envelope phases, in the order they advance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Attack,
    Decay,
    Sustain,
    Release,
    Stopped,
}

impl Phase {
    fn advance(self) -> Phase {
        match self {
            Phase::Attack => Phase::Decay,
            Phase::Decay => Phase::Sustain,
            Phase::Sustain => Phase::Release,
            Phase::Release | Phase::Stopped => Phase::Stopped,
        }
    }

    fn index(self) -> usize {
        match self {
            Phase::Attack => 0,
            Phase::Decay => 1,
            Phase::Sustain => 2,
            Phase::Release => 3,
            Phase::Stopped => 3,
        }
    }
}

/// Envelope change method.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    /// Fixed step size.
    Linear,
    /// Step size scaled by the current volume (decrease) or slowed near the
    /// top of the range (increase).
    Exponential,
}

/// Envelope change direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Increase,
    Decrease,
}

/// How one phase of the envelope runs, decoded from the SPU registers.
#[derive(Clone, Copy, Debug)]
pub struct PhaseConfig {
    /// Change method.
    pub method: Method,
    /// Change direction.
    pub direction: Direction,
    /// Timing shift, 0..31.
    pub shift: i32,
    /// Volume delta applied per cycle before scaling.
    pub step: i32,
    /// Volume level at which the phase ends.
    pub target: i32,
}

/// PSX SPU ADSR envelope.
///
/// Produces a lazy volume curve in [0.0, 1.0] at a fixed 44 100 Hz. The
/// envelope starts in the attack phase and advances automatically through
/// decay into sustain; the transition from sustain to release only happens
/// through an explicit [`release`](Envelope::release) call. Sustain is given
/// an unreachable target level to guarantee that.
pub struct Envelope {
    configs: [PhaseConfig; 4],
    phase: Phase,

    // Current volume: 0x0000 to 0x7fff.
    volume: i32,

    // Current cycle within the phase: how many times to repeat it, the ticks
    // to wait per step, and the step applied to the volume after each wait.
    cycle_repeats: u32,
    cycle_wait: u32,
    cycle_current_wait: u32,
    cycle_step: i32,
}

impl Envelope {
    /// Construct an envelope from the two SPU ADSR register words. The
    /// attack phase starts immediately.
    pub fn new(spu_ads: u16, spu_sr: u16) -> Self {
        let ads = spu_ads as i32;
        let sr = spu_sr as i32;

        let attack = PhaseConfig {
            method: if spu_ads & 0x8000 == 0 {
                Method::Linear
            } else {
                Method::Exponential
            },
            direction: Direction::Increase,
            shift: (ads >> 10) & 0x1f,
            step: 7 - ((ads >> 8) & 0x03),
            target: 0x7fff,
        };

        let decay = PhaseConfig {
            method: Method::Exponential,
            direction: Direction::Decrease,
            shift: (ads >> 4) & 0x0f,
            step: -8,
            target: ((ads & 0x0f) + 1) * 0x800,
        };

        // Sustain gets a dummy target that is never reached; the transition
        // to release is always triggered explicitly.
        let sustain_direction = if spu_sr & 0x4000 == 0 {
            Direction::Increase
        } else {
            Direction::Decrease
        };
        let sustain = PhaseConfig {
            method: if spu_sr & 0x8000 == 0 {
                Method::Linear
            } else {
                Method::Exponential
            },
            direction: sustain_direction,
            shift: (sr >> 8) & 0x1f,
            step: match sustain_direction {
                Direction::Increase => 7 - ((sr >> 6) & 0x03),
                Direction::Decrease => -8 + ((sr >> 6) & 0x03),
            },
            target: match sustain_direction {
                Direction::Increase => 0x8000,
                Direction::Decrease => -1,
            },
        };

        let release = PhaseConfig {
            method: if spu_sr & 0x20 == 0 {
                Method::Linear
            } else {
                Method::Exponential
            },
            direction: Direction::Decrease,
            shift: sr & 0x1f,
            step: -8,
            target: 0,
        };

        Self {
            configs: [attack, decay, sustain, release],
            phase: Phase::Attack,
            volume: 0,
            cycle_repeats: 1,
            cycle_wait: 1,
            cycle_current_wait: 1,
            cycle_step: 0,
        }
    }

    /// Start the release phase. Unlike the other transitions, release is
    /// explicitly triggered. Has no effect once the envelope has stopped.
    pub fn release(&mut self) {
        if self.phase != Phase::Stopped {
            self.phase = Phase::Release;
            self.calculate_cycle();
        }
    }

    /// The decoded configuration of the four phases, in ADSR order. Useful
    /// for diagnostic display of instrument registers.
    pub fn configs(&self) -> &[PhaseConfig; 4] {
        &self.configs
    }

    /// Calculate the next wait and step cycle.
    ///
    /// The generator works by computing a series of wait times and steps: a
    /// step is applied to the volume after the wait ticks have elapsed, and
    /// the phase advances when the volume reaches the phase's target.
    fn calculate_cycle(&mut self) {
        debug_assert!(self.phase != Phase::Stopped);
        let config = self.configs[self.phase.index()];
        let mut wait = 1u32 << (config.shift - 11).max(0);
        let mut step = ((config.step as u32) << (11 - config.shift).max(0)) as i32;
        if config.method == Method::Exponential {
            // Exponential increase isn't really exponential: it just drops
            // to a quarter of the rate above 0x6000.
            if config.direction == Direction::Increase && self.volume > 0x6000 {
                wait *= 4;
            } else if config.direction == Direction::Decrease {
                step = (step * self.volume) >> 15;
            }
        }

        // The wait and step can be coarser than they need to be. Break them
        // into smaller pieces to smooth the envelope; this decomposes by any
        // power of two (the wait is always a power of two).
        let mut repeats = 1u32;
        while wait & 0x01 == 0 && step != 0 && step & 0x01 == 0 {
            repeats <<= 1;
            wait >>= 1;
            step >>= 1;
        }
        self.cycle_repeats = repeats;
        self.cycle_wait = wait;
        self.cycle_step = step;
        self.cycle_current_wait = wait;
    }
}

impl Module<Mono> for Envelope {
    fn next(&mut self, out: &mut Mono) -> Result<bool> {
        // The level returned this tick is the volume going into it.
        *out = self.volume as f32 / 0x7fff as f32;
        let running = self.phase != Phase::Stopped;
        if running {
            debug_assert!(self.cycle_current_wait > 0);
            self.cycle_current_wait -= 1;
            if self.cycle_current_wait == 0 {
                self.volume = (self.volume + self.cycle_step).clamp(0, 0x7fff);

                // Repeat the same wait and step if required.
                debug_assert!(self.cycle_repeats > 0);
                self.cycle_repeats -= 1;
                if self.cycle_repeats > 0 {
                    self.cycle_current_wait = self.cycle_wait;
                } else {
                    // Advance to the next phase when the target is reached.
                    let config = self.configs[self.phase.index()];
                    let reached = match config.direction {
                        Direction::Increase => self.volume >= config.target,
                        Direction::Decrease => self.volume <= config.target,
                    };
                    if reached {
                        self.phase = self.phase.advance();
                    }
                    if self.phase != Phase::Stopped {
                        self.calculate_cycle();
                    }
                }
            }
        }
        Ok(running)
    }

    fn is_running(&mut self) -> bool {
        self.phase != Phase::Stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(envelope: &mut Envelope) -> (f32, bool) {
        let mut v = 0.0;
        let live = envelope.next(&mut v).unwrap();
        (v, live)
    }

    #[test]
    fn starts_silent_and_attacks_to_full_volume() {
        // Linear attack, fastest settings.
        let mut envelope = Envelope::new(0x0000, 0x0000);
        let (first, live) = tick(&mut envelope);
        assert_eq!(first, 0.0);
        assert!(live);

        let mut last = first;
        for _ in 0..16 {
            let (v, _) = tick(&mut envelope);
            assert!(v >= last, "attack must not fall");
            last = v;
            if v == 1.0 {
                return;
            }
        }
        panic!("attack never reached full volume");
    }

    #[test]
    fn sustain_holds_until_released() {
        let mut envelope = Envelope::new(0x0000, 0x0000);
        // Run well past attack and decay.
        for _ in 0..100_000 {
            let (_, live) = tick(&mut envelope);
            assert!(live, "envelope stopped without a release");
        }

        envelope.release();
        let mut ticks = 0u32;
        loop {
            let (v, live) = tick(&mut envelope);
            if !live {
                assert_eq!(v, 0.0);
                break;
            }
            ticks += 1;
            assert!(ticks < 100_000, "release never finished");
        }
        assert!(!envelope.is_running());
    }

    #[test]
    fn stopped_envelope_stays_at_zero() {
        let mut envelope = Envelope::new(0x0000, 0x0000);
        envelope.release();
        while tick(&mut envelope).1 {}
        for _ in 0..10 {
            let (v, live) = tick(&mut envelope);
            assert_eq!(v, 0.0);
            assert!(!live);
        }
    }

    #[test]
    fn exponential_attack_reaches_the_top_and_terminates() {
        // Exponential attack with a moderate shift; everything else zero.
        let mut envelope = Envelope::new(0x8fff, 0x0000);
        let mut peak = 0.0f32;
        let mut rising = true;
        for _ in 0..2_000_000 {
            let (v, _) = tick(&mut envelope);
            if rising {
                assert!(v >= peak, "attack must be monotonic");
            }
            peak = peak.max(v);
            if v == 1.0 {
                rising = false;
            }
        }
        assert_eq!(peak, 1.0, "attack never peaked");

        envelope.release();
        let mut ticks = 0u64;
        while tick(&mut envelope).1 {
            ticks += 1;
            assert!(ticks < 1_000_000, "release never finished");
        }
    }

    #[test]
    fn release_decays_from_the_current_level() {
        let mut envelope = Envelope::new(0x0000, 0x0000);
        for _ in 0..10 {
            tick(&mut envelope);
        }
        envelope.release();
        let (start, _) = tick(&mut envelope);
        let mut last = start;
        loop {
            let (v, live) = tick(&mut envelope);
            if !live {
                break;
            }
            assert!(v <= last, "release must not rise");
            last = v;
        }
    }

    #[test]
    fn release_before_any_tick_is_safe() {
        let mut envelope = Envelope::new(0x0000, 0x0000);
        envelope.release();
        let (v, live) = tick(&mut envelope);
        assert_eq!(v, 0.0);
        assert!(live);
        // Volume is already at the release target, so it stops right away.
        let mut ticks = 0;
        while tick(&mut envelope).1 {
            ticks += 1;
            assert!(ticks < 10);
        }
    }
}
