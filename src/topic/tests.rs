//! Tests for topic components

#[cfg(test)]
mod tests {
    use crate::topic::{as_bytes, as_bytes_mut, parse_fields, read_message, FieldType, Message};

    crate::define_topic! {
        /// Three-axis sample used by the layout tests
        pub struct AxisSample("axis_sample", id = 60) {
            pub timestamp: u64,
            pub xyz: [f32; 3],
            pub device_id: u32,
        }

        pub struct QueuedCommand("queued_command", id = 61, queue = 4) {
            pub command: u32,
            pub param: f32,
        }
    }

    #[test]
    fn test_generated_metadata() {
        let meta = AxisSample::metadata();
        assert_eq!(meta.name, "axis_sample");
        assert_eq!(meta.id, 60);
        assert_eq!(meta.size, 24);
        assert_eq!(meta.fields, "u64 timestamp;[f32; 3] xyz;u32 device_id;");
        assert!(meta.same_topic(&AxisSample::METADATA));
        assert!(!meta.same_topic(QueuedCommand::metadata()));
    }

    #[test]
    fn test_queue_length() {
        assert_eq!(AxisSample::QUEUE_LENGTH, 1);
        assert_eq!(QueuedCommand::QUEUE_LENGTH, 4);
    }

    #[test]
    fn test_generated_fields_parse() {
        let fields = parse_fields(AxisSample::metadata()).unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[1].ty, FieldType::F32);
        assert_eq!(fields[1].count, 3);
        assert_eq!(fields[2].offset, 20);
    }

    #[test]
    fn test_byte_views() {
        let sample = AxisSample {
            timestamp: 7,
            xyz: [1.0, 2.0, 3.0],
            device_id: 0x00ab_cdef,
        };

        let bytes = as_bytes(&sample).to_vec();
        assert_eq!(bytes.len(), 24);
        assert_eq!(read_message::<AxisSample>(&bytes), Some(sample));
        assert_eq!(read_message::<AxisSample>(&bytes[..8]), None);

        let mut copy = AxisSample::default();
        as_bytes_mut(&mut copy).copy_from_slice(&bytes);
        assert_eq!(copy, sample);
    }
}
