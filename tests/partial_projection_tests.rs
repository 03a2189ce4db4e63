mod common;

use common::{Fixture, doc, fixture, stored};
use memodoc::{
    Attribute, DocError, DocumentStore, EntitySchema, EntityType, FieldPath, Registry, UpdateOp,
    ValueKind,
};
use serde_json::{Value, json};

async fn seeded(f: &Fixture, data: Value) -> i64 {
    let mut instance = f.object.create(doc(data)).unwrap();
    instance.save().await.unwrap();
    f.store.clear();
    instance.id().as_int().unwrap()
}

/// Type whose list attribute defaults to a non-empty list.
fn tagged(f: &Fixture) -> EntityType {
    let mut registry = Registry::new(f.store.clone());
    registry
        .register(
            EntitySchema::root("TaggedModel", "tagged")
                .attribute(Attribute::new("delta", ValueKind::Str).default_value(""))
                .attribute(Attribute::new("tags", ValueKind::List).default_value(json!(["x"])))
                .build()
                .unwrap(),
        )
        .unwrap()
}

async fn stored_tags(f: &Fixture, id: i64) -> Value {
    f.store.inner.fetch_one("tagged", id, None).await.unwrap()["tags"].clone()
}

#[tokio::test]
async fn test_get_with_fields() {
    let f = fixture();
    let id = seeded(&f, json!({"meta": "onigiri", "delta": "hinkali", "multi": [1, 2]})).await;

    let mut partial = f.object.get(id, Some(&["delta"])).await.unwrap();
    let loaded: Vec<&str> = partial.loaded_fields().iter().map(String::as_str).collect();
    assert_eq!(loaded, vec!["delta", "id"]);
    assert_eq!(partial.specified_fields().unwrap().len(), 2);

    assert_eq!(partial.get("delta").unwrap(), json!("hinkali"));
    assert_eq!(partial.get("extra").unwrap(), json!("uhinkalio"));
    assert_eq!(partial.get("meta").unwrap(), Value::Null);
    assert_eq!(partial.get("multi").unwrap(), json!([]));

    assert!(matches!(
        f.object.get(id, Some(&["missing"])).await,
        Err(DocError::UnknownAttribute { .. })
    ));
}

#[tokio::test]
async fn test_save_partial_without_changes() {
    let f = fixture();
    let id = seeded(&f, json!({"meta": "onigiri", "multi": [1, 2]})).await;

    let mut partial = f.object.get(id, Some(&["delta"])).await.unwrap();
    partial.get("multi").unwrap();
    partial.get("extra").unwrap();
    partial.save().await.unwrap();

    let ops = f.store.last_update();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].path().root(), "updated");

    let raw = stored(&f, id).await;
    assert_eq!(raw["meta"], json!("onigiri"));
    assert_eq!(raw["multi"], json!([1, 2]));
    assert!(!raw.contains_key("delta"));
}

#[tokio::test]
async fn test_save_partial_with_data() {
    let f = fixture();
    let id = seeded(&f, json!({"meta": "onigiri", "delta": "hinkali", "multi": [1, 2]})).await;

    let mut partial = f.object.get(id, Some(&["delta"])).await.unwrap();
    partial.set("meta", "ramen").unwrap();
    partial.set("delta", "pelmeni").unwrap();
    partial.save().await.unwrap();

    let ops = f.store.last_update();
    assert_eq!(
        ops[..2],
        [
            UpdateOp::set(FieldPath::field("meta"), "ramen"),
            UpdateOp::set(FieldPath::field("delta"), "pelmeni"),
        ]
    );
    assert!(partial.specified_fields().unwrap().contains("meta"));

    let raw = stored(&f, id).await;
    assert_eq!(raw["meta"], json!("ramen"));
    assert_eq!(raw["delta"], json!("pelmeni"));
    assert_eq!(raw["multi"], json!([1, 2]));
}

#[tokio::test]
async fn test_delete_unprojected_field() {
    let f = fixture();
    let id = seeded(&f, json!({"meta": "onigiri", "delta": "hinkali"})).await;

    let mut partial = f.object.get(id, Some(&["delta"])).await.unwrap();
    partial.delete("meta").unwrap();
    partial.save().await.unwrap();

    assert_eq!(f.store.last_update()[0], UpdateOp::unset(FieldPath::field("meta")));
    let raw = stored(&f, id).await;
    assert!(!raw.contains_key("meta"));
    assert_eq!(raw["delta"], json!("hinkali"));
}

#[tokio::test]
async fn test_disjoint_partial_loads_both_land() {
    let f = fixture();
    let id = seeded(&f, json!({"meta": "onigiri", "delta": "hinkali"})).await;

    let mut first = f.object.get(id, Some(&["meta"])).await.unwrap();
    let mut second = f.object.get(id, Some(&["delta"])).await.unwrap();
    first.set("meta", "ramen").unwrap();
    second.set("delta", "pelmeni").unwrap();
    first.save().await.unwrap();
    second.save().await.unwrap();

    let mut full = f.object.get(id, None).await.unwrap();
    assert_eq!(full.get("meta").unwrap(), json!("ramen"));
    assert_eq!(full.get("delta").unwrap(), json!("pelmeni"));
}

#[tokio::test]
async fn test_append_to_unprojected_list() {
    let f = fixture();
    let first = f.sub.create(doc(json!({"taiga": 1}))).unwrap();
    let id = seeded(&f, json!({"multi": [Value::Object(first.json(None, false).unwrap())]})).await;

    let second = f.sub.create(doc(json!({"taiga": 2}))).unwrap();
    let second_doc = Value::Object(second.json(None, false).unwrap());

    let mut partial = f.object.get(id, Some(&["delta"])).await.unwrap();
    partial.push("multi", second_doc.clone()).unwrap();
    partial.save().await.unwrap();

    assert_eq!(
        f.store.last_update()[0],
        UpdateOp::append(FieldPath::field("multi"), vec![second_doc.clone()])
    );
    assert!(!partial.loaded_fields().contains("multi"));

    let mut full = f.object.get(id, None).await.unwrap();
    let multi = full.get("multi").unwrap();
    let items = multi.as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(f.sub.from_document(&items[0]).unwrap().id(), first.id());
    assert_eq!(items[1], second_doc);

    // Appending again after the save still leaves stored elements alone.
    partial.push("multi", json!({"id": "third"})).unwrap();
    partial.save().await.unwrap();
    let raw = stored(&f, id).await;
    assert_eq!(raw["multi"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_set_grown_unprojected_list_appends() {
    let f = fixture();
    let id = seeded(&f, json!({"multi": [1, 2, 3]})).await;

    let mut partial = f.object.get(id, Some(&["delta"])).await.unwrap();
    partial.set("multi", json!([9])).unwrap();
    partial.save().await.unwrap();

    assert_eq!(
        f.store.last_update()[0],
        UpdateOp::append(FieldPath::field("multi"), vec![json!(9)])
    );
    assert_eq!(stored(&f, id).await["multi"], json!([1, 2, 3, 9]));
    assert!(!partial.loaded_fields().contains("multi"));
}

#[tokio::test]
async fn test_get_push_set_unprojected_list() {
    let f = fixture();
    let first = f.sub.create(doc(json!({"taiga": 1}))).unwrap();
    let first_doc = Value::Object(first.json(None, false).unwrap());
    let id = seeded(&f, json!({"multi": [first_doc.clone()]})).await;

    let second = f.sub.create(doc(json!({"taiga": 2}))).unwrap();
    let second_doc = Value::Object(second.json(None, false).unwrap());

    let mut partial = f.object.get(id, Some(&["delta"])).await.unwrap();
    let mut multi = partial.get("multi").unwrap();
    if let Value::Array(items) = &mut multi {
        items.push(second_doc.clone());
    }
    partial.set("multi", multi).unwrap();
    partial.save().await.unwrap();

    assert_eq!(
        f.store.last_update()[0],
        UpdateOp::append(FieldPath::field("multi"), vec![second_doc.clone()])
    );
    assert_eq!(stored(&f, id).await["multi"], json!([first_doc, second_doc]));
}

#[tokio::test]
async fn test_push_unprojected_list_skips_default_items() {
    let f = fixture();
    let tagged = tagged(&f);
    let mut instance = tagged.create(doc(json!({"tags": ["a"]}))).unwrap();
    instance.save().await.unwrap();
    let id = instance.id().as_int().unwrap();

    let mut partial = tagged.get(id, Some(&["delta"])).await.unwrap();
    partial.push("tags", "b").unwrap();
    partial.save().await.unwrap();

    assert_eq!(
        f.store.last_update()[0],
        UpdateOp::append(FieldPath::field("tags"), vec![json!("b")])
    );
    assert_eq!(stored_tags(&f, id).await, json!(["a", "b"]));
}

#[tokio::test]
async fn test_set_unprojected_list_replaces_when_not_grown() {
    let f = fixture();
    let tagged = tagged(&f);
    let mut instance = tagged.create(doc(json!({"tags": ["a", "b"]}))).unwrap();
    instance.save().await.unwrap();
    let id = instance.id().as_int().unwrap();

    let mut partial = tagged.get(id, Some(&["delta"])).await.unwrap();
    partial.set("tags", json!(["z"])).unwrap();
    partial.save().await.unwrap();

    assert_eq!(
        f.store.last_update()[0],
        UpdateOp::set(FieldPath::field("tags"), json!(["z"]))
    );
    assert_eq!(stored_tags(&f, id).await, json!(["z"]));
    assert!(partial.loaded_fields().contains("tags"));
    assert_eq!(partial.get("tags").unwrap(), json!(["z"]));
}

#[tokio::test]
async fn test_untouched_get_mut_on_unloaded_field_sends_nothing() {
    let f = fixture();
    let id = seeded(&f, json!({"meta": "onigiri", "delta": "hinkali"})).await;

    let mut partial = f.object.get(id, Some(&["delta"])).await.unwrap();
    partial.get_mut("meta").unwrap();
    partial.save().await.unwrap();

    let ops = f.store.last_update();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].path().root(), "updated");
    assert_eq!(stored(&f, id).await["meta"], json!("onigiri"));
    assert!(!partial.loaded_fields().contains("meta"));
}

#[tokio::test]
async fn test_edit_through_get_mut_on_unloaded_field() {
    let f = fixture();
    let id = seeded(&f, json!({"meta": "onigiri", "delta": "hinkali"})).await;

    let mut partial = f.object.get(id, Some(&["delta"])).await.unwrap();
    *partial.get_mut("meta").unwrap() = json!("ramen");
    partial.save().await.unwrap();

    assert_eq!(
        f.store.last_update()[0],
        UpdateOp::set(FieldPath::field("meta"), "ramen")
    );
    assert_eq!(stored(&f, id).await["meta"], json!("ramen"));
    assert_eq!(stored(&f, id).await["delta"], json!("hinkali"));
}

#[tokio::test]
async fn test_pull_and_edit_list() {
    let f = fixture();
    let id = seeded(&f, json!({"multi": [1, 2, 3]})).await;

    let mut loaded = f.object.get(id, None).await.unwrap();
    if let Value::Array(items) = loaded.get_mut("multi").unwrap() {
        items.remove(0);
        if let Some(last) = items.last_mut() {
            *last = json!(30);
        }
    }
    loaded.save().await.unwrap();

    let ops = f.store.last_update();
    assert_eq!(
        ops[..3],
        [
            UpdateOp::set(FieldPath::field("multi").index(0), 2),
            UpdateOp::set(FieldPath::field("multi").index(1), 30),
            UpdateOp::truncate(FieldPath::field("multi"), 2),
        ]
    );
    assert_eq!(stored(&f, id).await["multi"], json!([2, 30]));
}

#[tokio::test]
async fn test_nested_edits_are_key_level() {
    let f = fixture();
    let first = f.sub.create(doc(json!({"taiga": 1}))).unwrap();
    let second = f.sub.create(doc(json!({"taiga": 2, "tundra": 1}))).unwrap();
    let id = seeded(
        &f,
        json!({"multi": [
            Value::Object(first.json(None, false).unwrap()),
            Value::Object(second.json(None, false).unwrap()),
        ]}),
    )
    .await;

    let mut loaded = f.object.get(id, None).await.unwrap();
    if let Value::Array(items) = loaded.get_mut("multi").unwrap() {
        items[0]["taiga"] = json!(5);
        items[1]["tundra"] = json!(0);
    }
    loaded.save().await.unwrap();

    let ops = f.store.last_update();
    assert_eq!(ops.len(), 3);
    assert_eq!(ops[0].to_string(), "set multi.0.taiga = 5");
    assert_eq!(ops[1].to_string(), "set multi.1.tundra = 0");

    let mut reloaded = f.object.get(id, None).await.unwrap();
    let multi = reloaded.get("multi").unwrap();
    let mut edited = f.sub.from_document(&multi[1]).unwrap();
    assert_eq!(edited.id(), second.id());
    assert_eq!(edited.get("tundra").unwrap(), json!(0));
    assert_eq!(edited.get("taiga").unwrap(), json!(2));
    assert_eq!(multi[0]["taiga"], json!(5));
}

#[tokio::test]
async fn test_pull_first_and_edit_last_sub_entity() {
    let f = fixture();
    let subs: Vec<_> = [1, 2, 3]
        .into_iter()
        .map(|taiga| f.sub.create(doc(json!({"taiga": taiga}))).unwrap())
        .collect();
    let docs: Vec<Value> = subs
        .iter()
        .map(|sub| Value::Object(sub.json(None, false).unwrap()))
        .collect();
    let id = seeded(&f, json!({"multi": docs})).await;

    let mut loaded = f.object.get(id, None).await.unwrap();
    if let Value::Array(items) = loaded.get_mut("multi").unwrap() {
        items.remove(0);
        if let Some(last) = items.last_mut() {
            last["taiga"] = json!(30);
        }
    }
    loaded.save().await.unwrap();

    let mut reloaded = f.object.get(id, None).await.unwrap();
    let multi = reloaded.get("multi").unwrap();
    let items = multi.as_array().unwrap();
    assert_eq!(items.len(), 2);

    let mut kept = f.sub.from_document(&items[0]).unwrap();
    let mut edited = f.sub.from_document(&items[1]).unwrap();
    assert_eq!(kept.id(), subs[1].id());
    assert_eq!(kept.get("taiga").unwrap(), json!(2));
    assert_eq!(edited.id(), subs[2].id());
    assert_eq!(edited.get("taiga").unwrap(), json!(30));
}

#[tokio::test]
async fn test_invalid_in_place_edit_is_rejected_at_save() {
    let f = fixture();
    let id = seeded(&f, json!({"meta": "onigiri"})).await;

    let mut loaded = f.object.get(id, None).await.unwrap();
    *loaded.get_mut("meta").unwrap() = json!(12);
    assert!(matches!(
        loaded.save().await,
        Err(DocError::TypeMismatch { .. })
    ));
    assert!(f.store.updates().is_empty());
}
