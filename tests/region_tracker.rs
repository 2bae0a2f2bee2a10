// tests/region_tracker.rs

mod common;
use crate::common::host;

use proptest::prelude::*;

use hetsched::region::rect::{coalesce, covered_volume, difference};
use hetsched::region::{DataRegion, Rect, RegionTracker};

#[test]
fn outdated_regions_are_the_complement_of_valid_ones() {
    let mut tracker = RegionTracker::new();
    tracker.mark_range_valid(host(0), &Rect::span(10, 40));

    let outdated = tracker.get_outdated_regions(host(0), &Rect::span(0, 50));
    assert_eq!(outdated, vec![Rect::span(0, 10), Rect::span(40, 50)]);

    assert!(tracker.get_outdated_regions(host(0), &Rect::span(15, 30)).is_empty());
    assert_eq!(
        tracker.get_outdated_regions(host(1), &Rect::span(0, 5)),
        vec![Rect::span(0, 5)]
    );
}

#[test]
fn update_candidates_follow_registration_order_and_skip_target() {
    let mut tracker = RegionTracker::new();
    tracker.register_device(host(2));
    tracker.register_device(host(0));
    tracker.register_device(host(1));
    tracker.mark_range_valid(host(0), &Rect::span(0, 100));
    tracker.mark_range_valid(host(2), &Rect::span(50, 60));
    tracker.mark_range_valid(host(1), &Rect::span(0, 100));

    let candidates = tracker.get_update_source_candidates(host(1), &Rect::span(40, 70));
    assert_eq!(
        candidates,
        vec![(host(2), Rect::span(50, 60)), (host(0), Rect::span(40, 70))]
    );
}

#[test]
fn mark_current_invalidates_other_devices() {
    let mut tracker = RegionTracker::new();
    tracker.mark_range_valid(host(0), &Rect::span(0, 100));
    tracker.mark_range_valid(host(1), &Rect::span(0, 100));

    tracker.mark_range_current(host(1), &Rect::span(20, 30));

    assert_eq!(
        tracker.valid_regions(host(0)),
        &[Rect::span(0, 20), Rect::span(30, 100)]
    );
    assert_eq!(tracker.valid_regions(host(1)), &[Rect::span(0, 100)]);
}

#[test]
fn adjacent_valid_ranges_are_coalesced() {
    let mut tracker = RegionTracker::new();
    tracker.mark_range_valid(host(0), &Rect::span(0, 10));
    tracker.mark_range_valid(host(0), &Rect::span(20, 30));
    tracker.mark_range_valid(host(0), &Rect::span(10, 20));

    assert_eq!(tracker.valid_regions(host(0)), &[Rect::span(0, 30)]);
}

#[test]
fn two_dimensional_subtraction_keeps_the_frame() {
    let outer = Rect::new([0, 0, 0], [4, 4, 1]);
    let inner = Rect::new([1, 1, 0], [2, 2, 1]);

    let pieces = outer.subtract(&inner);
    assert_eq!(covered_volume(&pieces), 16 - 4);
    assert!(pieces.iter().all(|p| !p.intersects(&inner)));
    for (i, a) in pieces.iter().enumerate() {
        for b in &pieces[i + 1..] {
            assert!(!a.intersects(b), "{a} overlaps {b}");
        }
    }

    let restored = coalesce(pieces.into_iter().chain([inner]).collect());
    assert_eq!(restored, vec![outer]);
}

#[test]
fn boxes_fit_only_inside_the_extent() {
    let extent = [16, 1, 1];
    assert!(Rect::span(0, 16).fits_in(&extent));
    assert!(!Rect::span(10, 20).fits_in(&extent));
    assert!(!Rect::new([usize::MAX, 0, 0], [2, 1, 1]).fits_in(&extent));
    assert!(!Rect::new([0, 0, 0], [16, 1, usize::MAX]).fits_in(&extent));
}

#[test]
fn forgetting_a_device_drops_it_from_candidates() {
    let region = DataRegion::new([8, 1, 1], 4);
    region.mark_range_current(host(0), &region.whole());
    assert_eq!(region.valid_devices(&region.whole()), vec![host(0)]);

    let mut tracker = region.tracker();
    tracker.forget_device(host(0));
    assert!(tracker
        .get_update_source_candidates(host(1), &Rect::span(0, 8))
        .is_empty());
}

fn span_strategy(limit: usize) -> impl Strategy<Value = Rect> {
    (0..limit, 1..=limit).prop_map(move |(begin, len)| {
        let end = (begin + len).min(limit);
        Rect::span(begin, end.max(begin + 1))
    })
}

fn box_strategy() -> impl Strategy<Value = Rect> {
    (0..6usize, 0..6usize, 1..5usize, 1..5usize)
        .prop_map(|(x, y, w, h)| Rect::new([x, y, 0], [w, h, 1]))
}

proptest! {
    #[test]
    fn mark_valid_is_idempotent(
        ops in proptest::collection::vec((0..3usize, span_strategy(64)), 1..12),
    ) {
        let mut tracker = RegionTracker::new();
        for (device, rect) in &ops {
            tracker.mark_range_valid(host(*device), rect);
        }
        let snapshot = tracker.clone();
        for (device, rect) in &ops {
            tracker.mark_range_valid(host(*device), rect);
        }
        prop_assert_eq!(tracker, snapshot);
    }

    #[test]
    fn mark_current_leaves_one_holder(
        valid in proptest::collection::vec((0..3usize, box_strategy()), 0..10),
        target in 0..3usize,
        current in box_strategy(),
    ) {
        let mut tracker = RegionTracker::new();
        for (device, rect) in &valid {
            tracker.mark_range_valid(host(*device), rect);
        }
        tracker.mark_range_current(host(target), &current);

        prop_assert!(tracker.is_valid(host(target), &current));
        for other in (0..3).filter(|d| *d != target) {
            prop_assert!(tracker.get_update_source_candidates(host(target), &current)
                .iter()
                .all(|(d, _)| *d != host(other)));
            prop_assert!(tracker
                .valid_regions(host(other))
                .iter()
                .all(|r| !r.intersects(&current)));
        }
    }

    #[test]
    fn difference_and_coverage_partition_a_box(
        rect in box_strategy(),
        covered in proptest::collection::vec(box_strategy(), 0..6),
    ) {
        let covered = coalesce(
            covered
                .iter()
                .fold(Vec::<Rect>::new(), |acc, c| {
                    let mut next: Vec<Rect> = acc.iter().flat_map(|a| a.subtract(c)).collect();
                    next.push(*c);
                    next
                }),
        );
        let outside = difference(&rect, &covered);
        let inside: usize = covered
            .iter()
            .filter_map(|c| c.intersection(&rect))
            .map(|r| r.volume())
            .sum();

        prop_assert_eq!(covered_volume(&outside) + inside, rect.volume());
        prop_assert!(outside.iter().all(|o| covered.iter().all(|c| !o.intersects(c))));
    }
}
