#![cfg(feature = "serde")]

use scene::{
    Animation, AnimationSequence, MemoryScene, ObjectId, PropertyValue, SceneEngine, SceneObject,
    Vec3,
};

#[test]
fn scene_objects_load_from_json() {
    let json = r#"[
        {"id": 1, "name": "cube", "properties": {"location": [1.0, 2.0, 3.0], "mass": 2.5}},
        {"id": 2, "name": "login", "properties": {"label": "enter name"}},
        {"id": 3}
    ]"#;
    let objects: Vec<SceneObject> = serde_json::from_str(json).unwrap();
    let scene = MemoryScene::from_objects(objects).unwrap();

    assert_eq!(
        scene.object_ids(),
        vec![ObjectId::new(1), ObjectId::new(2), ObjectId::new(3)]
    );
    assert_eq!(
        scene.property(ObjectId::new(1), "location"),
        Some(PropertyValue::Vector(Vec3::new(1.0, 2.0, 3.0)))
    );
    assert_eq!(
        scene.property(ObjectId::new(1), "mass"),
        Some(PropertyValue::Scalar(2.5))
    );
    assert_eq!(
        scene.property(ObjectId::new(2), "label"),
        Some(PropertyValue::Text("enter name".to_string()))
    );
    assert!(!scene.object(ObjectId::new(3)).unwrap().is_dirty());
}

#[test]
fn animation_sequence_serializes_as_step_list() {
    let seq = AnimationSequence::new(vec![Animation::new(
        0.5,
        "location",
        Vec3::new(0.0, 1.0, 0.0),
    )]);
    let value = serde_json::to_value(&seq).unwrap();
    assert_eq!(
        value,
        serde_json::json!([{"seconds": 0.5, "property": "location", "delta": [0.0, 1.0, 0.0]}])
    );
    let back: AnimationSequence = serde_json::from_value(value).unwrap();
    assert_eq!(back, seq);
}
