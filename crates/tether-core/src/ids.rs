//! UUIDv7 helpers for client-generated identifiers.
//!
//! Local record ids and event ids are UUIDv7 so they sort by creation time.

use uuid::Uuid;

/// Generate a new UUIDv7 identifier.
///
/// ```
/// use tether_core::ids::new_v7;
///
/// let a = new_v7();
/// assert_eq!(a.get_version_num(), 7);
/// ```
#[inline]
pub fn new_v7() -> Uuid {
    Uuid::now_v7()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_v7_version() {
        assert_eq!(new_v7().get_version_num(), 7);
    }

    #[test]
    fn test_new_v7_sorts_by_creation() {
        let first = new_v7();
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(new_v7() > first);
    }
}
