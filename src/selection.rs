use crate::record::StudentRecord;
use std::collections::BTreeSet;

/// Explicit selection set keyed by stable record id.
///
/// Toggle-all operations are scoped to the ids currently visible under
/// the caller's filter; ids outside that slice keep their prior state,
/// so narrowing a filter never drops off-screen selections.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    ids: BTreeSet<i64>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_selected(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn toggle(&mut self, id: i64) {
        if !self.ids.remove(&id) {
            self.ids.insert(id);
        }
    }

    /// Select-all / deselect-all over the visible ids only. When every
    /// visible id is already selected, the visible ids are deselected;
    /// otherwise all visible ids become selected.
    pub fn toggle_all(&mut self, visible: &[i64]) {
        let all_selected =
            !visible.is_empty() && visible.iter().all(|id| self.ids.contains(id));
        if all_selected {
            for id in visible {
                self.ids.remove(id);
            }
        } else {
            for id in visible {
                self.ids.insert(*id);
            }
        }
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Selected records in the order the record store delivered them.
    pub fn ordered<'a>(&self, records: &'a [StudentRecord]) -> Vec<&'a StudentRecord> {
        records
            .iter()
            .filter(|record| self.ids.contains(&record.id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::sample_record;

    #[test]
    fn toggle_flips_membership() {
        let mut selection = Selection::new();
        selection.toggle(5);
        assert!(selection.is_selected(5));
        selection.toggle(5);
        assert!(!selection.is_selected(5));
    }

    #[test]
    fn toggle_all_only_touches_visible_ids() {
        let mut selection = Selection::new();
        selection.toggle(1);
        selection.toggle(99);

        // Filtered view shows 1..=3; 99 is off-screen.
        selection.toggle_all(&[1, 2, 3]);
        assert!(selection.is_selected(1));
        assert!(selection.is_selected(2));
        assert!(selection.is_selected(3));
        assert!(selection.is_selected(99));

        // All visible selected, so the same call now deselects them.
        selection.toggle_all(&[1, 2, 3]);
        assert!(!selection.is_selected(1));
        assert!(!selection.is_selected(2));
        assert!(!selection.is_selected(3));
        assert!(selection.is_selected(99));
    }

    #[test]
    fn toggle_all_on_empty_view_is_a_no_op() {
        let mut selection = Selection::new();
        selection.toggle(4);
        selection.toggle_all(&[]);
        assert!(selection.is_selected(4));
        assert_eq!(selection.len(), 1);
    }

    #[test]
    fn ordered_follows_record_store_order() {
        let records: Vec<_> = [3, 1, 2].into_iter().map(sample_record).collect();
        let mut selection = Selection::new();
        selection.toggle(2);
        selection.toggle(3);
        let picked = selection.ordered(&records);
        let ids: Vec<i64> = picked.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 2]);
    }
}
