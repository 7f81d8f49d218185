use flnet_abstract::{ActiveSet, ClientId};

/// Translates the simulator's per-round local indices back to logical client ids.
///
/// Local index `i` is `active[i]`; a map is only valid for the round it was built for.
#[derive(Debug, Clone, Copy)]
pub struct LocalIdMap<'a> {
    active: &'a ActiveSet,
}

impl<'a> LocalIdMap<'a> {
    pub fn new(active: &'a ActiveSet) -> Self {
        Self { active }
    }

    /// Logical id for a reported local index, or `None` when the index is out of range.
    pub fn logical(&self, local: i64) -> Option<ClientId> {
        usize::try_from(local)
            .ok()
            .and_then(|i| self.active.as_slice().get(i).copied())
    }

    /// `(local index, logical id)` pairs in local-index order.
    pub fn iter(&self) -> impl Iterator<Item = (i64, ClientId)> + 'a {
        let active: &'a ActiveSet = self.active;
        active.iter().enumerate().map(|(i, id)| (i as i64, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flnet_abstract::ActiveClients;

    #[test]
    fn maps_in_range_indices_only() {
        let active = ActiveClients::Ids(vec![3, 7, 9]).normalize();
        let map = LocalIdMap::new(&active);
        assert_eq!(map.logical(0), Some(3));
        assert_eq!(map.logical(2), Some(9));
        assert_eq!(map.logical(3), None);
        assert_eq!(map.logical(-1), None);
        assert_eq!(map.iter().collect::<Vec<_>>(), vec![(0, 3), (1, 7), (2, 9)]);
    }
}
