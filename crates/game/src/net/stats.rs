use rand::Rng;
use serde::{Deserialize, Serialize};

/// Drops outbound datagrams at random to exercise retransmission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacketLossSimulation {
    pub enabled: bool,
    /// Fraction of datagrams dropped, 0.0-1.0.
    pub loss_percent: f32,
}

impl PacketLossSimulation {
    pub fn lossy(loss_percent: f32) -> Self {
        Self {
            enabled: true,
            loss_percent: loss_percent.clamp(0.0, 1.0),
        }
    }

    pub fn should_drop(&self) -> bool {
        if !self.enabled || self.loss_percent <= 0.0 {
            return false;
        }
        rand::thread_rng().gen_bool(f64::from(self.loss_percent.min(1.0)))
    }
}

#[derive(Debug, Clone, Default)]
pub struct NetworkStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_malformed: u64,
    pub packets_dropped: u64,
    pub send_errors: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl NetworkStats {
    pub fn loss_percent(&self) -> f32 {
        let attempted = self.packets_sent + self.packets_dropped;
        if attempted == 0 {
            return 0.0;
        }
        self.packets_dropped as f32 / attempted as f32 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_simulation_never_drops() {
        let sim = PacketLossSimulation {
            enabled: false,
            loss_percent: 1.0,
        };
        assert!((0..100).all(|_| !sim.should_drop()));
    }

    #[test]
    fn test_total_loss_always_drops() {
        let sim = PacketLossSimulation::lossy(1.0);
        assert!((0..100).all(|_| sim.should_drop()));
    }

    #[test]
    fn test_loss_percent() {
        let stats = NetworkStats {
            packets_sent: 3,
            packets_dropped: 1,
            ..Default::default()
        };
        assert_eq!(stats.loss_percent(), 25.0);
    }
}
