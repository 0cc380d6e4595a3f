//! 总线构建
//!
//! 真实串口或 `--sim` 模拟舵机，统一为 `DynamixelBus<Box<dyn BusLink>>`。

use servo_control::AppConfig;
use servo_driver::DynamixelBus;
use servo_link::{BusLink, SerialLink, SimLink};

pub type CliBus = DynamixelBus<Box<dyn BusLink>>;

/// 按配置创建总线（不打开）
///
/// 模拟模式下，每个配置关节对应一个模拟舵机，初始位置为关节中点。
pub fn build_bus(config: &AppConfig, sim: bool) -> CliBus {
    let bus_config = config.bus_config();
    let link: Box<dyn BusLink> = if sim {
        let servos: Vec<(u8, u32)> = config
            .joints
            .iter()
            .map(|joint| (joint.id, joint.wire_position(joint.midpoint())))
            .collect();
        Box::new(
            SimLink::new(bus_config.protocol)
                .with_register_map(bus_config.registers)
                .with_servos(&servos),
        )
    } else {
        Box::new(SerialLink::new(bus_config.port.clone(), bus_config.baud_rate))
    };
    DynamixelBus::new(link, bus_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use servo_driver::{ActuatorBus, BusGuard};
    use servo_tools::Joint;

    fn config() -> AppConfig {
        let path = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../config/robot.toml");
        AppConfig::load(path).unwrap()
    }

    #[test]
    fn test_sim_bus_seeds_joint_midpoints() {
        let config = config();
        let mut guard = BusGuard::acquire(build_bus(&config, true)).unwrap();
        let ids = config.joint_ids();
        let positions = guard.read_positions(&ids).unwrap();

        let first: &Joint = &config.joints[0];
        assert_eq!(positions.len(), ids.len());
        assert_eq!(positions[&first.id], first.wire_position(first.midpoint()));
    }

    #[test]
    fn test_serial_bus_describes_port() {
        let config = config();
        let bus = build_bus(&config, false);
        assert!(bus.link().describe().contains(&config.robot.port));
    }
}
