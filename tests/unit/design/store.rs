use super::*;
use crate::foundation::core::Canvas;

fn store_with_design() -> (InMemoryDesignStore, DesignId) {
    let store = InMemoryDesignStore::new();
    let design = Design::new("s", Canvas::new(10, 10).unwrap()).unwrap();
    let id = store.insert(design).unwrap();
    (store, id)
}

#[test]
fn edit_commits_on_success() {
    let (store, id) = store_with_design();
    let layer = store
        .edit(id, |d| d.add_layer("group", serde_json::Value::Null, None))
        .unwrap();
    let snap = store.snapshot(id).unwrap();
    assert!(snap.contains(layer));
}

#[test]
fn edit_rolls_back_on_error() {
    let (store, id) = store_with_design();
    let res = store.edit(id, |d| {
        d.add_layer("group", serde_json::Value::Null, None)?;
        d.add_layer("nope", serde_json::Value::Null, None)
    });
    assert!(res.is_err());
    assert!(store.snapshot(id).unwrap().is_empty());
}

#[test]
fn missing_design_is_not_found() {
    let store = InMemoryDesignStore::new();
    let id = DesignId::new();
    assert!(matches!(store.snapshot(id), Err(StratumError::NotFound(_))));
    assert!(!store.exists(id));
    assert!(store.edit(id, |_| Ok(())).is_err());
}

#[test]
fn concurrent_edits_are_serialized() {
    let (store, id) = store_with_design();
    let store = Arc::new(store);
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for _ in 0..25 {
                    store
                        .edit(id, |d| {
                            let l = d.add_layer("group", serde_json::Value::Null, None)?;
                            d.move_to_bottom(l)
                        })
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    let snap = store.snapshot(id).unwrap();
    assert_eq!(snap.len(), 200);
    snap.check_integrity().unwrap();
}

#[test]
fn remove_drops_design() {
    let (store, id) = store_with_design();
    assert_eq!(store.ids().unwrap(), vec![id]);
    store.remove(id).unwrap();
    assert!(!store.exists(id));
}
