//! Key-space convention shared by every repository.
//!
//! Primary records live at `{entity}:{id}`. Secondary index entries live at
//! `{entity}_by_{dims}:{dim values joined by ':'}:{id}` and hold only the
//! referenced id, never a denormalized copy. Listing by a dimension is a
//! half-open prefix range scan followed by a primary fetch per pointer.
//!
//! The store guarantees lexicographic key order only; repositories sort
//! client-side when callers need an application order.

use uuid::Uuid;

pub const KEY_SEP: char = ':';

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn primary_key(entity: &str, id: &str) -> Vec<u8> {
    format!("{entity}{KEY_SEP}{id}").into_bytes()
}

pub fn primary_prefix(entity: &str) -> Vec<u8> {
    format!("{entity}{KEY_SEP}").into_bytes()
}

/// Index entry key for one record under one query dimension set.
///
/// `dims` names the dimensions (joined by `_`) and `values` carries the
/// record's value for each, in the same order.
pub fn index_key(entity: &str, dims: &[&str], values: &[&str], id: &str) -> Vec<u8> {
    let mut key = index_prefix(entity, dims, values);
    key.extend_from_slice(id.as_bytes());
    key
}

/// Prefix covering every index entry with the given leading dimension values.
/// Fewer values than dimensions widens the scan.
pub fn index_prefix(entity: &str, dims: &[&str], values: &[&str]) -> Vec<u8> {
    let mut key = format!("{entity}_by_{}", dims.join("_"));
    for value in values {
        key.push(KEY_SEP);
        key.push_str(value);
    }
    key.push(KEY_SEP);
    key.into_bytes()
}

/// Half-open range `[prefix, prefix ++ 0xFF)` covering every key that starts
/// with `prefix`. Application keys are UTF-8 and never contain 0xFF.
pub fn prefix_range(prefix: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut end = prefix.to_vec();
    end.push(0xFF);
    (prefix.to_vec(), end)
}

/// Recovers the record id from an index entry value.
pub fn pointer_id(value: &[u8]) -> Option<String> {
    std::str::from_utf8(value).ok().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_key_shape() {
        assert_eq!(primary_key("program", "p1"), b"program:p1".to_vec());
        assert_eq!(primary_prefix("program"), b"program:".to_vec());
    }

    #[test]
    fn index_key_joins_dims_and_values() {
        let key = index_key(
            "assessment_session",
            &["program", "player"],
            &["t1", "prog9", "kid4"],
            "s7",
        );
        assert_eq!(
            key,
            b"assessment_session_by_program_player:t1:prog9:kid4:s7".to_vec()
        );
    }

    #[test]
    fn partial_dimension_prefix_widens_the_scan() {
        let narrow = index_prefix("attendance", &["program", "date"], &["t1", "p1", "2024-05-01"]);
        let wide = index_prefix("attendance", &["program", "date"], &["t1", "p1"]);
        assert!(narrow.starts_with(&wide));
    }

    #[test]
    fn prefix_range_is_half_open() {
        let (start, end) = prefix_range(b"course:");
        assert_eq!(start, b"course:".to_vec());
        assert_eq!(end, b"course:\xFF".to_vec());
        assert!(start < end);
        // A key under a sibling entity falls outside the range.
        assert!(b"course_enrollment:x".to_vec() > end);
    }

    #[test]
    fn generated_ids_are_distinct() {
        assert_ne!(new_id(), new_id());
    }
}
