use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use raoa_types::AlbumId;
use tracing::warn;

/// Merged autoadd markers of all albums: instant to owning album.
///
/// A timestamp routes to the album owning the greatest marker at or before
/// it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AutoaddIndex {
    markers: BTreeMap<DateTime<Utc>, AlbumId>,
}

impl AutoaddIndex {
    /// Build the index. When two albums claim the same instant the greater
    /// album id wins.
    pub fn from_markers<I>(markers: I) -> Self
    where
        I: IntoIterator<Item = (DateTime<Utc>, AlbumId)>,
    {
        let mut index = BTreeMap::new();
        for (instant, album) in markers {
            match index.entry(instant) {
                Entry::Vacant(slot) => {
                    slot.insert(album);
                }
                Entry::Occupied(mut slot) => {
                    let existing = *slot.get();
                    if existing != album {
                        let winner = existing.max(album);
                        warn!(
                            instant = %instant,
                            first = %existing,
                            second = %album,
                            winner = %winner,
                            "two albums claim the same autoadd instant"
                        );
                        slot.insert(winner);
                    }
                }
            }
        }
        Self { markers: index }
    }

    /// The album owning `t`, or `None` if `t` precedes every marker.
    pub fn resolve(&self, t: DateTime<Utc>) -> Option<AlbumId> {
        self.markers
            .range(..=t)
            .next_back()
            .map(|(_, album)| *album)
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DateTime<Utc>, &AlbumId)> {
        self.markers.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn floor_lookup_with_inclusive_boundary() {
        let a = AlbumId::random();
        let b = AlbumId::random();
        let index = AutoaddIndex::from_markers([(day(2023, 1, 1), a), (day(2023, 6, 1), b)]);
        assert_eq!(index.resolve(day(2023, 3, 15)), Some(a));
        assert_eq!(index.resolve(day(2022, 12, 31)), None);
        assert_eq!(index.resolve(day(2023, 6, 1)), Some(b));
        assert_eq!(index.resolve(day(2030, 1, 1)), Some(b));
    }

    #[test]
    fn tie_goes_to_greater_album_id() {
        let a = AlbumId::random();
        let b = AlbumId::random();
        let t = day(2023, 1, 1);
        let forward = AutoaddIndex::from_markers([(t, a), (t, b)]);
        let backward = AutoaddIndex::from_markers([(t, b), (t, a)]);
        assert_eq!(forward.resolve(t), Some(a.max(b)));
        assert_eq!(forward, backward);
        assert_eq!(forward.len(), 1);
    }

    #[test]
    fn empty_index_matches_nothing() {
        let index = AutoaddIndex::default();
        assert!(index.is_empty());
        assert_eq!(index.resolve(day(2023, 1, 1)), None);
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    proptest! {
        #[test]
        fn resolve_is_greatest_marker_at_or_before(
            markers in proptest::collection::vec((0i64..1_000_000, 0usize..4), 0..20),
            probe in 0i64..1_000_000,
        ) {
            let albums: Vec<AlbumId> = (0..4).map(|_| AlbumId::random()).collect();
            let at = |secs: i64| DateTime::<Utc>::from_timestamp(secs, 0).unwrap();
            let index = AutoaddIndex::from_markers(
                markers.iter().map(|(secs, album)| (at(*secs), albums[*album])),
            );

            let expected = markers
                .iter()
                .filter(|(secs, _)| *secs <= probe)
                .map(|(secs, _)| *secs)
                .max()
                .map(|best| {
                    markers
                        .iter()
                        .filter(|(secs, _)| *secs == best)
                        .map(|(_, album)| albums[*album])
                        .max()
                        .unwrap()
                });
            prop_assert_eq!(index.resolve(at(probe)), expected);
        }

        #[test]
        fn markers_after_probe_do_not_change_routing(
            base in proptest::collection::vec(0i64..500_000, 1..10),
            later in proptest::collection::vec(500_001i64..1_000_000, 0..10),
            probe in 0i64..=500_000,
        ) {
            let a = AlbumId::random();
            let b = AlbumId::random();
            let at = |secs: i64| DateTime::<Utc>::from_timestamp(secs, 0).unwrap();
            let before = AutoaddIndex::from_markers(base.iter().map(|s| (at(*s), a)));
            let after = AutoaddIndex::from_markers(
                base.iter().map(|s| (at(*s), a)).chain(later.iter().map(|s| (at(*s), b))),
            );
            prop_assert_eq!(before.resolve(at(probe)), after.resolve(at(probe)));
        }
    }
}
