//! Tests for region tree construction

mod common;

use classwalk_core::builder::{build, ImageLocation};
use classwalk_core::error::WalkError;
use classwalk_core::memory::UnavailableMemory;
use classwalk_core::render::{render_to_string, RenderOptions};
use classwalk_core::types::{Address, ByteOrder, PointerWidth, ScalarType};
use classwalk_core::walker::StoredClassWalker;
use common::{stored_memory, three_sections, zeroed, ScriptedWalker, ROM_BASE};

const BASE: u64 = 0x1000;

fn at(base: u64) -> ImageLocation
{
    ImageLocation::new(Address::from(base))
}

#[test]
fn test_threshold_zero_leaves_every_section_unexpanded()
{
    let memory = stored_memory(ByteOrder::Little);
    let walker = StoredClassWalker::new(ByteOrder::Little);
    let tree = build(&memory, at(ROM_BASE), &walker, 0).unwrap();

    assert_eq!(tree.sections().len(), 7);
    for section in tree.sections() {
        assert!(section.children.is_none(), "{} was expanded", section.name);
    }
    assert_eq!(tree.node_count(), 8);
}

#[test]
fn test_three_section_scenario()
{
    let memory = zeroed(BASE, 64);
    let walker = three_sections(BASE);
    let tree = build(&memory, at(BASE), &walker, 2).unwrap();

    assert_eq!(tree.sections().len(), 3);
    assert_eq!(tree.sections()[1].name, "methods");
    assert_eq!(tree.sections()[1].children().len(), 2);
    assert_eq!(tree.root.length, 64);
    assert!(tree.is_clean());

    let options = RenderOptions {
        byte_order: ByteOrder::Little,
        pointer_width: PointerWidth::Bits64,
        max_depth: 2,
        max_dump_bytes: 8,
    };
    let text = render_to_string(&memory, &tree, &options).unwrap();
    assert_eq!(text.lines().count(), 5);
}

#[test]
fn test_siblings_never_overlap_in_clean_parents()
{
    let memory = stored_memory(ByteOrder::Little);
    let walker = StoredClassWalker::new(ByteOrder::Little);
    let tree = build(&memory, at(ROM_BASE), &walker, 8).unwrap();
    assert!(tree.is_clean());

    for (_, region) in tree.root.iter() {
        if region.corrupt {
            continue;
        }
        for pair in region.children().windows(2) {
            assert!(
                pair[1].address >= pair[0].end(),
                "{} overlaps {} under {}",
                pair[1].name,
                pair[0].name,
                region.name
            );
        }
    }
}

#[test]
fn test_one_failing_child_keeps_its_siblings()
{
    let memory = zeroed(BASE, 64);
    let mut walker = ScriptedWalker::new();
    let a = walker.blob("a", BASE, 8);
    let broken = walker.faulted("broken", BASE + 8);
    let c = walker.scalar("c", BASE + 8, ScalarType::unsigned(4));
    walker.top(vec![a, broken, c]);

    let tree = build(&memory, at(BASE), &walker, 1).unwrap();
    let names: Vec<&str> = tree.sections().iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["a", "broken", "c"]);

    let broken = &tree.sections()[1];
    assert!(broken.corrupt);
    assert_eq!(broken.length, 0);
    assert!(broken.children().is_empty());
    assert!(!tree.sections()[0].corrupt);
    assert!(!tree.sections()[2].corrupt);
    assert!(!tree.root.corrupt);
    assert_eq!(tree.faults, 1);
}

#[test]
fn test_overlapping_member_stops_the_parent()
{
    let memory = zeroed(BASE, 64);
    let mut walker = ScriptedWalker::new();
    let a = walker.blob("a", BASE, 8);
    let b = walker.blob("b", BASE + 4, 8);
    let c = walker.blob("c", BASE + 16, 8);
    let group = walker.group("group", BASE, 24, vec![a, b, c]);
    let after = walker.blob("after", BASE + 24, 8);
    walker.top(vec![group, after]);

    let tree = build(&memory, at(BASE), &walker, 1).unwrap();
    let group = &tree.sections()[0];
    assert!(group.corrupt);
    assert_eq!(group.children().len(), 1);
    assert_eq!(group.children()[0].name, "a");
    assert_eq!(tree.sections()[1].name, "after");
    assert_eq!(tree.violations, 1);
    assert!(!tree.is_clean());
}

#[test]
fn test_dropped_member_is_never_walked()
{
    let memory = zeroed(BASE, 64);
    let mut walker = ScriptedWalker::new();
    let a = walker.blob("a", BASE, 8);
    let b = walker.broken_group("b", BASE + 4, 8);
    let group = walker.group("group", BASE, 16, vec![a, b]);
    walker.top(vec![group]);

    let tree = build(&memory, at(BASE), &walker, 2).unwrap();
    let group = &tree.sections()[0];
    assert!(group.corrupt);
    assert_eq!(group.children().len(), 1);
    assert_eq!(tree.violations, 1);
    assert_eq!(tree.faults, 0);
    assert_eq!(tree.node_count(), 3);
}

#[test]
fn test_faulting_listing_marks_compound_only()
{
    let memory = zeroed(BASE, 64);
    let mut walker = ScriptedWalker::new();
    let broken = walker.broken_group("broken", BASE, 16);
    let next = walker.blob("next", BASE + 16, 4);
    walker.top(vec![broken, next]);

    let tree = build(&memory, at(BASE), &walker, 3).unwrap();
    let broken = &tree.sections()[0];
    assert!(broken.corrupt);
    assert!(broken.children.is_none());
    assert_eq!(broken.length, 16);
    assert!(!tree.sections()[1].corrupt);
}

#[test]
fn test_unreadable_leaf_becomes_empty_blob()
{
    let memory = zeroed(BASE, 8);
    let mut walker = ScriptedWalker::new();
    let inside = walker.blob("inside", BASE, 8);
    let outside = walker.scalar("outside", BASE + 8, ScalarType::unsigned(4));
    walker.top(vec![inside, outside]);

    let tree = build(&memory, at(BASE), &walker, 1).unwrap();
    let outside = &tree.sections()[1];
    assert!(outside.corrupt);
    assert_eq!(outside.length, 0);
    assert_eq!(tree.faults, 1);
}

#[test]
fn test_root_length_sources()
{
    let memory = zeroed(BASE, 64);

    let mut sized = three_sections(BASE);
    sized.extent(100);
    assert_eq!(build(&memory, at(BASE), &sized, 1).unwrap().root.length, 100);

    let empty = ScriptedWalker::new();
    let hinted = at(BASE).with_length_hint(48);
    assert_eq!(build(&memory, hinted, &empty, 1).unwrap().root.length, 48);
    assert_eq!(build(&memory, at(BASE), &empty, 1).unwrap().root.length, 0);
}

#[test]
fn test_unavailable_accessor_aborts_the_build()
{
    let memory = UnavailableMemory::new("target detached");
    let walker = StoredClassWalker::new(ByteOrder::Little);
    let err = build(&memory, at(ROM_BASE), &walker, 2).unwrap_err();
    assert!(matches!(err, WalkError::AccessorUnavailable(_)));
}

#[test]
fn test_threshold_out_of_range()
{
    let memory = zeroed(BASE, 64);
    let err = build(&memory, at(BASE), &three_sections(BASE), 65).unwrap_err();
    assert!(matches!(err, WalkError::InvalidArgument(_)));
}
