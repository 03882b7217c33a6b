//! Built-in flight-stack topics
//!
//! Records are laid out largest-alignment first and padded explicitly so
//! the layout check in `define_topic!` holds. Flags are `u8`.

use crate::topic::{TopicId, TopicMetadata};

crate::define_topic! {
    /// Temperature reading of one sensor device
    pub struct SensorTemperature("sensor_temperature", id = 0) {
        pub timestamp: u64,
        pub device_id: u32,
        pub temperature: f32,
    }

    /// Battery state
    pub struct BatteryStatus("battery_status", id = 1) {
        pub timestamp: u64,
        pub voltage_v: f32,
        pub current_a: f32,
        pub remaining: f32,
        pub temperature: f32,
        pub cell_count: u8,
        pub connected: u8,
        pub warning: u8,
        pub _padding0: [u8; 5],
    }

    /// GNSS receiver solution
    pub struct SensorGps("sensor_gps", id = 2) {
        pub timestamp: u64,
        pub latitude_deg: f64,
        pub longitude_deg: f64,
        pub altitude_msl_m: f32,
        pub eph: f32,
        pub epv: f32,
        pub vel_n_m_s: f32,
        pub vel_e_m_s: f32,
        pub vel_d_m_s: f32,
        pub device_id: u32,
        pub fix_type: u8,
        pub satellites_used: u8,
        pub _padding0: [u8; 2],
    }

    /// Attitude estimate as a unit quaternion
    pub struct VehicleAttitude("vehicle_attitude", id = 3) {
        pub timestamp: u64,
        pub q: [f32; 4],
        pub delta_q_reset: [f32; 4],
        pub quat_reset_counter: u8,
        pub _padding0: [u8; 7],
    }

    /// Land detector state
    pub struct VehicleLandDetected("vehicle_land_detected", id = 4) {
        pub timestamp: u64,
        pub alt_max: f32,
        pub freefall: u8,
        pub ground_contact: u8,
        pub maybe_landed: u8,
        pub landed: u8,
    }

    /// Notification that one or more parameters changed
    pub struct ParameterUpdate("parameter_update", id = 5) {
        pub timestamp: u64,
        pub instance: u32,
        pub get_count: u32,
        pub set_count: u32,
        pub find_count: u32,
        pub export_count: u32,
        pub active: u16,
        pub changed: u16,
    }

    /// Command for the commander, queued so bursts are not lost
    pub struct VehicleCommand("vehicle_command", id = 6, queue = 8) {
        pub timestamp: u64,
        pub param5: f64,
        pub param6: f64,
        pub param1: f32,
        pub param2: f32,
        pub param3: f32,
        pub param4: f32,
        pub param7: f32,
        pub command: u32,
        pub target_system: u8,
        pub target_component: u8,
        pub source_system: u8,
        pub source_component: u8,
        pub confirmation: u8,
        pub from_external: u8,
        pub _padding0: [u8; 2],
    }

    /// Normalized motor setpoints
    pub struct ActuatorMotors("actuator_motors", id = 7) {
        pub timestamp: u64,
        pub timestamp_sample: u64,
        pub control: [f32; 12],
        pub reversible_flags: u16,
        pub _padding0: [u8; 6],
    }

    /// Raw accelerometer sample
    pub struct SensorAccel("sensor_accel", id = 8) {
        pub timestamp: u64,
        pub timestamp_sample: u64,
        pub device_id: u32,
        pub x: f32,
        pub y: f32,
        pub z: f32,
        pub temperature: f32,
        pub error_count: u32,
    }
}

/// Table of all built-in topics, indexed by id
pub static TOPICS: &[&TopicMetadata] = &[
    &SensorTemperature::METADATA,
    &BatteryStatus::METADATA,
    &SensorGps::METADATA,
    &VehicleAttitude::METADATA,
    &VehicleLandDetected::METADATA,
    &ParameterUpdate::METADATA,
    &VehicleCommand::METADATA,
    &ActuatorMotors::METADATA,
    &SensorAccel::METADATA,
];

/// Look up a built-in topic by name
pub fn find_by_name(name: &str) -> Option<&'static TopicMetadata> {
    TOPICS.iter().copied().find(|meta| meta.name == name)
}

/// Look up a built-in topic by id
pub fn find_by_id(id: TopicId) -> Option<&'static TopicMetadata> {
    TOPICS.get(id as usize).copied().filter(|meta| meta.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topic::{as_bytes, format_message, parse_fields, Message};

    #[test]
    fn test_table_is_indexed_by_id() {
        for (index, meta) in TOPICS.iter().enumerate() {
            assert_eq!(meta.id as usize, index, "{}", meta.name);
        }
    }

    #[test]
    fn test_every_field_list_parses() {
        for meta in TOPICS {
            parse_fields(meta).unwrap();
        }
    }

    #[test]
    fn test_format_array_topic() {
        let attitude = VehicleAttitude {
            timestamp: 5,
            q: [1.0, 0.0, 0.0, 0.0],
            quat_reset_counter: 2,
            ..Default::default()
        };
        let text = format_message(VehicleAttitude::metadata(), as_bytes(&attitude)).unwrap();
        assert_eq!(
            text,
            "    timestamp: 5\n    \
             q: [1.0000, 0.0000, 0.0000, 0.0000]\n    \
             delta_q_reset: [0.0000, 0.0000, 0.0000, 0.0000]\n    \
             quat_reset_counter: 2\n"
        );
    }

    #[test]
    fn test_lookup() {
        assert_eq!(find_by_name("sensor_gps").map(|m| m.id), Some(2));
        assert_eq!(find_by_id(6).map(|m| m.name), Some("vehicle_command"));
        assert!(find_by_name("no_such_topic").is_none());
        assert!(find_by_id(200).is_none());
    }

    #[test]
    fn test_record_sizes() {
        assert_eq!(SensorTemperature::metadata().size, 16);
        assert_eq!(BatteryStatus::metadata().size, 32);
        assert_eq!(SensorGps::metadata().size, 56);
        assert_eq!(VehicleAttitude::metadata().size, 48);
        assert_eq!(VehicleLandDetected::metadata().size, 16);
        assert_eq!(ParameterUpdate::metadata().size, 32);
        assert_eq!(VehicleCommand::metadata().size, 56);
        assert_eq!(ActuatorMotors::metadata().size, 72);
        assert_eq!(SensorAccel::metadata().size, 40);
        assert_eq!(VehicleCommand::QUEUE_LENGTH, 8);
    }
}
