//! Cache store round trips through the portable container

use evaldata_nexus::{AttrValue, Attributes, ContainerFormat, NexusStore, NxDataset, NxGroup, NX_CLASS};
use pretty_assertions::assert_eq;

fn entry(number: i64, detector: Vec<f64>) -> NxGroup {
    let mut data = NxGroup::new("NXdata");
    data.insert_dataset("Detector", NxDataset::vector(detector));
    let mut group = NxGroup::new("NXentry").with_attr("number", number);
    group.insert_group("data", data);
    group
}

fn root_attrs(fingerprint: &str) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert(NX_CLASS.to_string(), "NXroot".into());
    attrs.insert("raw_fingerprint".to_string(), fingerprint.into());
    attrs
}

fn store_in(dir: &tempfile::TempDir) -> NexusStore {
    let path = dir.path().join("cache").join(format!("run.{}", ContainerFormat::JsonGz.extension()));
    NexusStore::open(path, ContainerFormat::JsonGz).unwrap()
}

#[test]
fn index_keeps_shapes_but_drops_values() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    store
        .write_entries(&root_attrs("aa"), &[("entry1".to_string(), entry(1, vec![1.0, 2.0, 3.0]))])
        .unwrap();
    assert!(store.exists());

    let index = store.read_index().unwrap();
    let detector = index.entry("entry1").unwrap().group("data").unwrap().dataset("Detector").unwrap();
    assert_eq!(detector.shape, vec![3]);
    assert!(!detector.is_loaded());

    let full = store.read_entry("entry1").unwrap().unwrap();
    assert_eq!(full, entry(1, vec![1.0, 2.0, 3.0]));
}

#[test]
fn later_writes_upsert_entries_and_attrs() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    store
        .write_entries(
            &root_attrs("aa"),
            &[
                ("entry1".to_string(), entry(1, vec![1.0])),
                ("entry2".to_string(), entry(2, vec![2.0])),
            ],
        )
        .unwrap();
    store
        .write_entries(&root_attrs("bb"), &[("entry2".to_string(), entry(2, vec![2.0, f64::NAN]))])
        .unwrap();

    let file = store.read_full().unwrap();
    assert_eq!(file.entries.keys().collect::<Vec<_>>(), vec!["entry1", "entry2"]);
    assert_eq!(file.attrs.get("raw_fingerprint"), Some(&AttrValue::from("bb")));
    let values = &file.entry("entry2").unwrap().group("data").unwrap().dataset("Detector").unwrap().values;
    assert_eq!(values[0], 2.0);
    assert!(values[1].is_nan());
}

#[test]
fn reset_starts_from_scratch() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    store
        .write_entries(&root_attrs("aa"), &[("entry1".to_string(), entry(1, vec![1.0]))])
        .unwrap();
    store.reset().unwrap();
    assert!(!store.exists());
    assert!(store.read_index().unwrap().entries.is_empty());
    assert_eq!(store.read_entry("entry1").unwrap(), None);
}

#[test]
fn format_follows_file_extension() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    assert_eq!(ContainerFormat::from_path(store.path()), Some(ContainerFormat::JsonGz));
    assert_eq!(store.format(), ContainerFormat::JsonGz);
}
