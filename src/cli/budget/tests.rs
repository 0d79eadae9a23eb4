use super::*;

#[test]
fn test_merge_keeps_clears_and_replaces() {
    assert_eq!(merge(Some(5.0), None, false), Some(5.0));
    assert_eq!(merge(Some(5.0), Some(2.0), false), Some(2.0));
    assert_eq!(merge(Some(5.0), None, true), None);
    assert_eq!(merge(None, None, false), None);
}
