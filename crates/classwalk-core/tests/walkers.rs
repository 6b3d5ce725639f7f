//! End-to-end tests for the stored and loaded class walkers

mod common;

use classwalk_core::builder::{build, ImageLocation, RegionTree};
use classwalk_core::memory::SnapshotMemory;
use classwalk_core::query::resolve;
use classwalk_core::region::{Region, RegionKind};
use classwalk_core::render::{render_to_string, RenderOptions};
use classwalk_core::types::{Address, ByteOrder, PointerWidth};
use classwalk_core::walker::{ClassWalker, ImageKind, LoadedClassWalker, SectionWalker, StoredClassWalker};
use common::{loaded_memory, stored_class, stored_memory, RAM_BASE, ROM_BASE, ROM_SIZE};

fn names(regions: &[Region]) -> Vec<&str>
{
    regions.iter().map(|r| r.name.as_str()).collect()
}

fn stored_tree(memory: &SnapshotMemory, threshold: usize) -> RegionTree
{
    let walker = StoredClassWalker::new(ByteOrder::Little);
    build(memory, ImageLocation::new(Address::from(ROM_BASE)), &walker, threshold).unwrap()
}

#[test]
fn test_stored_sections_and_members()
{
    let memory = stored_memory(ByteOrder::Little);
    let tree = stored_tree(&memory, 4);

    assert_eq!(tree.kind_name, "romClass");
    assert_eq!(tree.root.length, ROM_SIZE);
    assert_eq!(
        names(tree.sections()),
        vec![
            "romHeader",
            "constantPool",
            "interfacesSRPs",
            "methods",
            "fields",
            "cpShapeDescription",
            "optionalInfo"
        ]
    );

    let header = &tree.sections()[0];
    assert_eq!(header.children().len(), 17);
    assert_eq!(header.children_length(), 64);

    let pool = &tree.sections()[1];
    assert_eq!(names(pool.children()), vec!["cpUnused", "cpInt", "cpLong"]);

    let methods = &tree.sections()[3];
    assert_eq!(methods.length, 76);
    assert_eq!(methods.children()[0].length, 28);
    assert_eq!(methods.children()[1].length, 48);
    let exception = methods.children()[1].children().last().unwrap();
    assert_eq!(exception.name, "exceptionInfo");
    assert_eq!(
        names(exception.children()),
        vec!["catchCount", "throwCount", "exceptionHandler", "throwNameUTF8"]
    );

    let fields = &tree.sections()[4];
    assert_eq!(names(fields.children()[0].children()), vec!["name", "signature", "modifiers", "initialValue"]);
    assert_eq!(
        names(fields.children()[1].children()),
        vec!["name", "signature", "modifiers", "fieldAnnotation"]
    );

    assert_eq!(names(tree.sections()[6].children()), vec!["sourceFileName", "simpleName"]);
}

#[test]
fn test_stored_values_render()
{
    let memory = stored_memory(ByteOrder::Little);
    let tree = stored_tree(&memory, 4);
    let options = RenderOptions {
        byte_order: ByteOrder::Little,
        pointer_width: PointerWidth::Bits64,
        max_depth: 4,
        max_dump_bytes: 16,
    };
    let text = render_to_string(&memory, &tree, &options).unwrap();

    assert!(text.contains("romMethodCount = 2 (0x2)"));
    assert!(text.contains("]     value = 7\n"));
    assert!(text.contains("]     value = -2\n"));
    assert!(text.contains("bytecodes = 2a b7 00 01 b1\n"));
    assert!(text.contains("cpShapeDescription = 30 05 00 00\n"));
}

#[test]
fn test_truncated_stored_image_keeps_sections()
{
    let full = stored_class(ByteOrder::Little);
    let memory = SnapshotMemory::with_segment(Address::from(ROM_BASE), full[..100].to_vec()).unwrap();
    let tree = stored_tree(&memory, 4);

    assert_eq!(tree.sections().len(), 7);
    assert!(tree.faults > 0);
    assert_eq!(tree.violations, 0);

    let methods = &tree.sections()[3];
    assert_eq!(methods.length, 0);
    assert_eq!(methods.children().len(), 1);
    assert!(methods.children()[0].corrupt);

    let pool = &tree.sections()[1];
    assert!(pool.children().iter().all(|entry| entry.name == "cpEntry"));
    assert!(tree.sections()[5].corrupt);
}

#[test]
fn test_inconsistent_counts_are_contained()
{
    let mut bytes = stored_class(ByteOrder::Little);
    // A constant pool larger than the whole image
    bytes[44..48].copy_from_slice(&1_000_000u32.to_le_bytes());
    let memory = SnapshotMemory::with_segment(Address::from(ROM_BASE), bytes).unwrap();
    let tree = stored_tree(&memory, 4);

    let pool = &tree.sections()[1];
    assert_eq!(pool.name, "constantPool");
    assert!(pool.corrupt);
    assert_eq!(pool.length, 0);
    assert!(!tree.sections()[3].corrupt);
}

#[test]
fn test_loaded_sections_follow_addresses()
{
    let memory = loaded_memory();
    let walker = LoadedClassWalker::new(ByteOrder::Little, PointerWidth::Bits64);
    let tree = build(&memory, ImageLocation::new(Address::from(RAM_BASE)), &walker, 3).unwrap();

    assert!(tree.is_clean());
    assert_eq!(tree.kind_name, "ramClass");
    assert_eq!(
        names(tree.sections()),
        vec!["ramHeader", "superclasses", "ramMethods", "ramStatics", "ramConstantPool"]
    );
    assert_eq!(tree.root.length, 0x400 + 3 * 16);

    let header = &tree.sections()[0];
    assert_eq!(header.children().len(), 12);
    assert!(header
        .children()
        .iter()
        .all(|slot| slot.kind == RegionKind::Scalar(classwalk_core::types::ScalarType::unsigned(8))));

    assert_eq!(tree.sections()[1].children().len(), 2);
    assert_eq!(names(tree.sections()[2].children()), vec!["method", "method"]);
    assert_eq!(
        names(tree.sections()[2].children()[0].children()),
        vec!["bytecodes", "constantPool", "methodRunAddress", "extra"]
    );
    assert_eq!(tree.sections()[3].children().len(), 1);
    assert_eq!(tree.sections()[4].children().len(), 3);
}

#[test]
fn test_loaded_without_stored_image()
{
    let memory = SnapshotMemory::with_segment(Address::from(RAM_BASE), common::loaded_class()).unwrap();
    let walker = LoadedClassWalker::new(ByteOrder::Little, PointerWidth::Bits64);
    let tree = build(&memory, ImageLocation::new(Address::from(RAM_BASE)), &walker, 3).unwrap();

    assert_eq!(tree.faults, 3);
    assert_eq!(tree.sections()[0].name, "ramHeader");
    assert!(!tree.sections()[0].corrupt);
    assert!(tree.sections()[1..].iter().skip(1).all(|s| s.corrupt));
}

#[test]
fn test_class_walker_dispatch()
{
    let memory = loaded_memory();
    let stored = ClassWalker::new(ImageKind::Stored, ByteOrder::Little, PointerWidth::Bits64);
    let loaded = ClassWalker::new(ImageKind::Loaded, ByteOrder::Little, PointerWidth::Bits64);
    assert_eq!(stored.kind(), ImageKind::Stored);
    assert_eq!(loaded.root_name(), "ramClass");

    let direct = stored_tree(&memory, 5);
    let wrapped = build(&memory, ImageLocation::new(Address::from(ROM_BASE)), &stored, 5).unwrap();
    assert_eq!(direct.root, wrapped.root);

    let tree = build(&memory, ImageLocation::new(Address::from(RAM_BASE)), &loaded, 2).unwrap();
    let outcomes = resolve(&tree, &["/ramConstantPool/ramCpEntry[2]/info"]).unwrap();
    assert_eq!(
        outcomes[0].region().unwrap().address,
        Address::from(RAM_BASE + 0x400 + 2 * 16 + 8)
    );
}
