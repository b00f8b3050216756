//! Thermal sub-model shared by power-dissipating devices.
//!
//! Each accepted step integrates junction temperature against the ambient,
//! accumulates damage above `t_max`, and latches `failed` once damage
//! reaches 1. A failed device stamps as an open circuit from then on.

use voltaic_core::component::ThermalParams;

#[derive(Debug, Clone)]
pub struct ThermalState {
    pub params: ThermalParams,
    /// Current junction temperature (K).
    pub temperature: f64,
    /// Accumulated damage in [0, 1].
    pub damage: f64,
    /// Latched once damage reaches 1; never clears.
    pub failed: bool,
}

impl ThermalState {
    pub fn new(params: ThermalParams, ambient: f64) -> Self {
        Self {
            params,
            temperature: ambient,
            damage: 0.0,
            failed: false,
        }
    }

    /// Integrate one step of dissipated power `p` (W) against ambient.
    pub fn update(&mut self, p: f64, ambient: f64, dt: f64) {
        let leak = (self.temperature - ambient) / self.params.rth;
        self.temperature += dt * (p - leak) / self.params.cth;

        if self.temperature > self.params.t_max {
            self.damage += dt * (self.temperature - self.params.t_max) / self.params.t_max;
            if self.damage >= 1.0 && !self.failed {
                self.failed = true;
                log::warn!(
                    "device failed: junction reached {:.1} K (max {:.1} K)",
                    self.temperature,
                    self.params.t_max
                );
            }
        }
    }

    /// Reset to ambient (simulation restart).
    pub fn reset(&mut self, ambient: f64) {
        self.temperature = ambient;
        self.damage = 0.0;
        self.failed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heats_toward_equilibrium() {
        let mut t = ThermalState::new(ThermalParams::default(), 300.0);
        // 1 W into Rth = 100 K/W settles 100 K above ambient.
        for _ in 0..100_000 {
            t.update(1.0, 300.0, 1e-4);
        }
        assert!(
            (t.temperature - 400.0).abs() < 1.0,
            "T = {} (expected ~400 K)",
            t.temperature
        );
    }

    #[test]
    fn overload_latches_failure() {
        let mut t = ThermalState::new(
            ThermalParams {
                rth: 100.0,
                cth: 1e-3,
                t_max: 400.0,
            },
            300.0,
        );
        for _ in 0..200_000 {
            t.update(10.0, 300.0, 1e-3);
            if t.failed {
                break;
            }
        }
        assert!(t.failed);
        assert!(t.damage >= 1.0);
    }

    #[test]
    fn no_damage_below_t_max() {
        let mut t = ThermalState::new(ThermalParams::default(), 300.0);
        for _ in 0..1000 {
            t.update(0.01, 300.0, 1e-4);
        }
        assert_eq!(t.damage, 0.0);
        assert!(!t.failed);
    }
}
