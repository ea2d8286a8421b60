/// Lazy load tests
///
/// Lazy groups, batched loading across resources read together, and
/// projections through `select`.
/// Run with: cargo test --test lazy_load_tests

use memomapper::{
    MapperError, MemoryStore, ModelBuilder, ModelRegistry, PropertySpec, Record, Repository,
    StateKind, Value,
};
use std::rc::Rc;

fn setup() -> (Repository, Rc<MemoryStore>) {
    let registry = Rc::new(ModelRegistry::default());
    let model = registry
        .register(
            ModelBuilder::new("Post")
                .property(PropertySpec::new("id", "Serial"))
                .property(PropertySpec::new("title", "String"))
                .property(PropertySpec::new("body", "Text"))
                .property(PropertySpec::new("summary", "String").lazy_in("details"))
                .property(PropertySpec::new("notes", "String").lazy_in("details")),
        )
        .unwrap();

    let store = Rc::new(MemoryStore::new());
    for id in 1..=3 {
        let mut row = Record::new();
        row.insert("id".into(), Value::Integer(id));
        row.insert("title".into(), Value::Text(format!("Post {}", id)));
        row.insert("body".into(), Value::Text(format!("Body {}", id)));
        row.insert("summary".into(), Value::Text(format!("Summary {}", id)));
        row.insert("notes".into(), Value::Text(format!("Notes {}", id)));
        store.insert_row(&model, row);
    }
    (Repository::new(registry, store.clone()), store)
}

#[test]
fn test_lazy_properties_are_not_read_by_default() {
    let (repo, _) = setup();
    let post = repo.get("Post", 2).unwrap().unwrap();

    assert!(post.attribute_loaded("title"));
    assert!(!post.attribute_loaded("body"));
    assert!(!post.attribute_loaded("summary"));
}

#[test]
fn test_group_loads_together() {
    let (repo, store) = setup();
    let post = repo.get("Post", 1).unwrap().unwrap();
    store.reset_stats();

    assert_eq!(post.get(&repo, "summary").unwrap(), Value::from("Summary 1"));
    assert!(post.attribute_loaded("notes"));
    assert!(!post.attribute_loaded("body"));
    assert_eq!(post.get(&repo, "notes").unwrap(), Value::from("Notes 1"));
    assert_eq!(store.stats().reads, 1);
}

#[test]
fn test_batch_loads_siblings_in_one_read() {
    let (repo, store) = setup();
    let posts = repo.all("Post").unwrap();
    assert_eq!(posts.len(), 3);
    store.reset_stats();

    assert_eq!(posts[0].get(&repo, "body").unwrap(), Value::from("Body 1"));
    assert_eq!(store.stats().reads, 1);

    for (index, post) in posts.iter().enumerate() {
        assert!(post.attribute_loaded("body"));
        assert_eq!(
            post.get(&repo, "body").unwrap(),
            Value::Text(format!("Body {}", index + 1))
        );
    }
    assert_eq!(store.stats().reads, 1);
}

#[test]
fn test_vanished_row_loads_as_null() {
    let (repo, store) = setup();
    let post = repo.get("Post", 3).unwrap().unwrap();
    let model = Rc::clone(post.model());
    memomapper::Store::delete(store.as_ref(), &model, &memomapper::KeyTuple::from(3)).unwrap();

    assert_eq!(post.get(&repo, "body").unwrap(), Value::Null);
    store.reset_stats();
    assert_eq!(post.get(&repo, "body").unwrap(), Value::Null);
    assert_eq!(store.stats().reads, 0);
}

#[test]
fn test_setting_a_lazy_property_loads_it_first() {
    let (repo, _) = setup();
    let post = repo.get("Post", 1).unwrap().unwrap();

    post.set(&repo, "body", "Body 1").unwrap();
    assert_eq!(post.state_kind(), StateKind::Clean);

    post.set(&repo, "body", "Rewritten").unwrap();
    assert_eq!(post.state_kind(), StateKind::Dirty);
    assert_eq!(
        post.original_attributes().get("body"),
        Some(&Value::from("Body 1"))
    );
}

#[test]
fn test_select_with_key_is_clean_and_mapped() {
    let (repo, store) = setup();
    let posts = repo.select("Post", &["id", "title"]).unwrap();
    assert_eq!(posts.len(), 3);

    let first = &posts[0];
    assert_eq!(first.state_kind(), StateKind::Clean);
    assert_eq!(repo.get("Post", 1).unwrap().as_ref(), Some(first));

    store.reset_stats();
    assert_eq!(first.get(&repo, "summary").unwrap(), Value::from("Summary 1"));
    assert!(posts[2].attribute_loaded("summary"));
    assert_eq!(store.stats().reads, 1);
}

#[test]
fn test_select_without_key_is_immutable() {
    let (repo, _) = setup();
    let titles = repo.select("Post", &["title"]).unwrap();
    assert_eq!(titles.len(), 3);

    let first = &titles[0];
    assert_eq!(first.state_kind(), StateKind::Immutable);
    assert_eq!(first.get(&repo, "title").unwrap(), Value::from("Post 1"));
    assert!(matches!(
        first.get(&repo, "body"),
        Err(MapperError::Immutable { .. })
    ));
    assert!(matches!(
        first.set(&repo, "title", "Changed"),
        Err(MapperError::Immutable { .. })
    ));
    assert!(repo.identity_map("Post").unwrap().is_empty());
}
