//! 云台电机控制 (MotorMan)
//! 光流 → 水平/垂直增量, 累积为当前朝向

use serde::Serialize;
use tracing::trace;

use crate::config::MotorConfig;
use crate::geometry::FlowVector;

/// 累积朝向 (水平 turn, 垂直 tilt)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Orientation {
    pub turn: f32,
    pub tilt: f32,
}

pub struct MotionActuator {
    gain_turn: f32,
    gain_tilt: f32,
    deadband: f32,
    orientation: Orientation,
}

impl MotionActuator {
    pub fn new(config: &MotorConfig) -> Self {
        Self {
            gain_turn: config.gain_turn,
            gain_tilt: config.gain_tilt,
            deadband: config.deadband,
            orientation: Orientation::default(),
        }
    }

    /// 光流到电机增量的映射
    pub fn deltas(&self, flow: FlowVector) -> (f32, f32) {
        if flow.magnitude() < self.deadband {
            return (0.0, 0.0);
        }
        (flow.dx * self.gain_turn, flow.dy * self.gain_tilt)
    }

    /// 按光流调整朝向, 返回累积值
    pub fn adjust_orientation(&mut self, flow: FlowVector) -> Orientation {
        let (dx, dy) = self.deltas(flow);
        self.orientation.turn += dx;
        self.orientation.tilt += dy;
        trace!(
            "🎚️ Δ=({:.1}, {:.1}) → 朝向 ({:.1}, {:.1})",
            dx,
            dy,
            self.orientation.turn,
            self.orientation.tilt
        );
        self.orientation
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulates_flow() {
        let mut motor = MotionActuator::new(&MotorConfig::default());
        motor.adjust_orientation(FlowVector::new(1.0, 1.0));
        motor.adjust_orientation(FlowVector::new(2.5, -0.5));
        let total = motor.adjust_orientation(FlowVector::new(-1.0, 0.0));
        assert_eq!(total, Orientation { turn: 2.5, tilt: 0.5 });
        assert_eq!(motor.orientation(), total);
    }

    #[test]
    fn test_gains_and_deadband() {
        let mut motor = MotionActuator::new(&MotorConfig {
            gain_turn: 0.5,
            gain_tilt: -2.0,
            deadband: 1.0,
        });
        assert_eq!(motor.deltas(FlowVector::new(0.3, 0.4)), (0.0, 0.0));
        assert_eq!(motor.adjust_orientation(FlowVector::new(4.0, 3.0)), Orientation { turn: 2.0, tilt: -6.0 });
    }
}
