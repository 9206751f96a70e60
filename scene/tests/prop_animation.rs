use proptest::prelude::*;
use scene::{
    Animation, AnimationEngine, AnimationSequence, Animator, MemoryScene, ObjectId,
    PropertyValue, SceneEngine, SceneObject, Vec3,
};

fn location(scene: &MemoryScene) -> Vec3 {
    match scene.property(ObjectId::new(1), "location") {
        Some(PropertyValue::Vector(v)) => v,
        other => panic!("unexpected {other:?}"),
    }
}

proptest! {
    #[test]
    fn animation_converges_to_full_delta(
        steps in prop::collection::vec((0.0f32..2.0, -10.0f32..10.0), 1..6),
        dts in prop::collection::vec(0.001f32..0.5, 1..64),
    ) {
        let mut scene = MemoryScene::from_objects([
            SceneObject::new(ObjectId::new(1), "cube").with_property("location", Vec3::ZERO)
        ])
        .unwrap();
        let sequence = AnimationSequence::new(
            steps
                .iter()
                .map(|&(seconds, dx)| Animation::new(seconds, "location", Vec3::new(dx, 0.0, 0.0)))
                .collect(),
        );
        let expected: f32 = steps.iter().map(|&(_, dx)| dx).sum();
        let magnitude: f32 = steps.iter().map(|&(_, dx)| dx.abs()).sum();

        let mut animator = Animator::new();
        animator.play(ObjectId::new(1), sequence);
        for dt in dts.iter().cycle().take(100_000) {
            animator.tick(*dt, &mut scene);
            scene.commit();
            if animator.is_idle() {
                break;
            }
        }

        prop_assert!(animator.is_idle());
        let tolerance = 1e-2 * (1.0 + magnitude);
        prop_assert!((location(&scene).x - expected).abs() < tolerance);
    }

    #[test]
    fn staged_reads_match_last_write(values in prop::collection::vec(-100.0f32..100.0, 1..16)) {
        let mut scene = MemoryScene::from_objects([SceneObject::new(ObjectId::new(1), "dial")])
            .unwrap();
        for value in &values {
            scene.set_property(ObjectId::new(1), "angle", PropertyValue::Scalar(*value)).unwrap();
        }
        let last = *values.last().unwrap();
        prop_assert_eq!(scene.property(ObjectId::new(1), "angle"), Some(PropertyValue::Scalar(last)));
        let commit = scene.commit();
        prop_assert_eq!(commit.applied, values.len());
        prop_assert!(commit.touches(ObjectId::new(1), "angle"));
        prop_assert_eq!(
            scene.object(ObjectId::new(1)).unwrap().properties.get("angle"),
            Some(&PropertyValue::Scalar(last))
        );
    }
}
