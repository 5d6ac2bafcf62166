//! Row distribution planner.
//!
//! A generation batch renders `total_rows` rows from an ordered list of
//! requested scenes. The planner decides which scene each row belongs to,
//! and must be a deterministic pure function: the same ordered scene list
//! always reproduces the same assignment, because a later remake may need
//! to reconstruct which scene produced a given row. When a per-row prompt
//! has been persisted it always takes precedence over recomputation; the
//! planner is the authority only for fresh batches and for legacy rows
//! without a stored prompt.

use crate::credits::MAX_BATCH_ROWS;
use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Distribution
// ---------------------------------------------------------------------------

/// Number of rows assigned to each scene, in input order.
///
/// `base = total_rows / scenes`, with the remainder distributed one extra
/// row each to the first `total_rows % scenes` scenes. Returns an empty
/// vector when `scene_count` is zero.
pub fn row_counts(total_rows: usize, scene_count: usize) -> Vec<usize> {
    if scene_count == 0 {
        return Vec::new();
    }
    let base = total_rows / scene_count;
    let remainder = total_rows % scene_count;
    (0..scene_count)
        .map(|i| if i < remainder { base + 1 } else { base })
        .collect()
}

/// Assign a scene to every row of a batch.
///
/// The output has length `total_rows` (zero when `scenes` is empty) and is
/// the flattened, in-scene-order concatenation of each scene repeated by
/// its row count.
pub fn distribute<T: Clone>(total_rows: usize, scenes: &[T]) -> Vec<T> {
    let counts = row_counts(total_rows, scenes.len());
    let mut out = Vec::with_capacity(total_rows);
    for (scene, count) in scenes.iter().zip(counts) {
        for _ in 0..count {
            out.push(scene.clone());
        }
    }
    out
}

/// Index of the scene that produced `row_index`, recomputed from the same
/// inputs used at generation time.
///
/// Returns `None` when the row index is out of range or there are no
/// scenes.
pub fn scene_for_row(total_rows: usize, scene_count: usize, row_index: usize) -> Option<usize> {
    if row_index >= total_rows {
        return None;
    }
    let counts = row_counts(total_rows, scene_count);
    let mut covered = 0;
    for (scene_idx, count) in counts.iter().enumerate() {
        covered += count;
        if row_index < covered {
            return Some(scene_idx);
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate the shape of a batch generation request before any credits move.
pub fn validate_batch_shape(rows: u32, scene_count: usize) -> Result<(), CoreError> {
    if rows == 0 {
        return Err(CoreError::Validation(
            "A batch must request at least one row".to_string(),
        ));
    }
    if rows > MAX_BATCH_ROWS {
        return Err(CoreError::Validation(format!(
            "A batch is limited to {MAX_BATCH_ROWS} rows, got {rows}"
        )));
    }
    if scene_count == 0 {
        return Err(CoreError::Validation(
            "A batch must request at least one scene".to_string(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remainder_goes_to_leading_scenes() {
        // 7 rows over 3 scenes: base 2, remainder 1 -> first scene gets 3.
        assert_eq!(row_counts(7, 3), vec![3, 2, 2]);
    }

    #[test]
    fn even_split_has_no_remainder() {
        assert_eq!(row_counts(6, 3), vec![2, 2, 2]);
    }

    #[test]
    fn more_scenes_than_rows_leaves_trailing_scenes_empty() {
        // base 0, remainder 2 -> first two scenes get one row each.
        assert_eq!(row_counts(2, 3), vec![1, 1, 0]);
    }

    #[test]
    fn zero_scenes_yields_empty_plan() {
        assert_eq!(row_counts(4, 0), Vec::<usize>::new());
        assert_eq!(distribute::<&str>(4, &[]), Vec::<&str>::new());
    }

    #[test]
    fn distribute_flattens_in_scene_order() {
        let scenes = ["beach", "office", "studio"];
        let plan = distribute(7, &scenes);
        assert_eq!(
            plan,
            vec!["beach", "beach", "beach", "office", "office", "studio", "studio"]
        );
    }

    #[test]
    fn distribute_is_deterministic() {
        let scenes = ["a", "b", "c"];
        assert_eq!(distribute(20, &scenes), distribute(20, &scenes));
        // 20 over 3: base 6, remainder 2 -> 7, 7, 6.
        let plan = distribute(20, &scenes);
        assert_eq!(plan.iter().filter(|s| **s == "a").count(), 7);
        assert_eq!(plan.iter().filter(|s| **s == "b").count(), 7);
        assert_eq!(plan.iter().filter(|s| **s == "c").count(), 6);
    }

    #[test]
    fn scene_for_row_matches_distribute() {
        let scenes = ["a", "b", "c"];
        let plan = distribute(7, &scenes);
        for (row, expected) in plan.iter().enumerate() {
            let idx = scene_for_row(7, scenes.len(), row).unwrap();
            assert_eq!(&scenes[idx], expected, "row {row}");
        }
    }

    #[test]
    fn scene_for_row_rejects_out_of_range() {
        assert_eq!(scene_for_row(7, 3, 7), None);
        assert_eq!(scene_for_row(0, 3, 0), None);
        assert_eq!(scene_for_row(7, 0, 2), None);
    }

    #[test]
    fn batch_shape_accepts_limits() {
        assert!(validate_batch_shape(1, 1).is_ok());
        assert!(validate_batch_shape(MAX_BATCH_ROWS, 3).is_ok());
    }

    #[test]
    fn batch_shape_rejects_zero_and_oversize() {
        assert!(validate_batch_shape(0, 1).is_err());
        assert!(validate_batch_shape(MAX_BATCH_ROWS + 1, 1).is_err());
        assert!(validate_batch_shape(4, 0).is_err());
    }
}
