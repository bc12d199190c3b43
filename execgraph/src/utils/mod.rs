//! Id generation and timestamp helpers.

pub mod timestamps;

pub use timestamps::{from_epoch_millis, now_utc, to_epoch_millis, Timestamp};

use uuid::Uuid;

/// Generates a new random (v4) UUID.
#[must_use]
pub fn generate_uuid() -> Uuid {
    Uuid::new_v4()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_uuid_is_v4() {
        let id = generate_uuid();
        assert_eq!(id.get_version_num(), 4);
        assert_ne!(id, generate_uuid());
    }
}
