//! Converts validated descriptors into the two representations the scene
//! needs: a [`MarkerState`] for visualization and a [`SpawnBlueprint`] for
//! the simulator.
//!
//! | Shape | Primitive | Scale |
//! |---|---|---|
//! | sphere | sphere | `2r` on every axis |
//! | cylinder | cylinder | `(r, r, halfLength)` |
//! | box | cube | `(x, y, z)` |
//! | capsule | cylinder | `(r, r, halfLength)` |
//!
//! Capsules are drawn as plain cylinders; the end caps only exist in the
//! simulator model.

use std::time::Duration;

use obstacle_sim::GeometryDescriptorGenerator;
use obstacle_types::{
    MarkerPrimitive, MarkerState, ObstacleDescriptor, RenderShape, Rgba, ShapeParams,
    SpawnBlueprint, Vec3,
};

/// Semi-transparent purple.
pub const MARKER_COLOR: Rgba = Rgba::new(0.58, 0.0, 0.98, 0.7);

/// One broadcast period, so a stalled broadcaster makes markers vanish.
pub const MARKER_TTL: Duration = Duration::from_millis(100);

pub fn render_shape(params: &ShapeParams) -> RenderShape {
    let (primitive, scale) = match *params {
        ShapeParams::Sphere { radius } => (MarkerPrimitive::Sphere, Vec3::splat(2.0 * radius)),
        ShapeParams::Cylinder {
            radius,
            half_length,
        }
        | ShapeParams::Capsule {
            radius,
            half_length,
        } => (
            MarkerPrimitive::Cylinder,
            Vec3::new(radius, radius, half_length),
        ),
        ShapeParams::Box { x, y, z } => (MarkerPrimitive::Cube, Vec3::new(x, y, z)),
    };
    RenderShape { primitive, scale }
}

/// Build the marker and the spawn blueprint for one obstacle.
///
/// `index` is the obstacle's position in registry order and
/// `reference_frame` the frame its initial pose is expressed in.
pub fn build(
    descriptor: &ObstacleDescriptor,
    index: u32,
    reference_frame: &str,
    generator: &dyn GeometryDescriptorGenerator,
) -> (MarkerState, SpawnBlueprint) {
    let marker = MarkerState {
        id: descriptor.id.clone(),
        index,
        frame_id: reference_frame.to_string(),
        pose: descriptor.initial_pose,
        render_shape: render_shape(&descriptor.params),
        color: MARKER_COLOR,
        ttl: MARKER_TTL,
    };
    let blueprint = SpawnBlueprint {
        id: descriptor.id.clone(),
        geometry_descriptor: generator.generate(&descriptor.id, &descriptor.params),
        initial_pose: descriptor.initial_pose,
        reference_frame: reference_frame.to_string(),
    };
    (marker, blueprint)
}

/// [`build`] every descriptor, assigning indices in order.
pub fn build_all(
    descriptors: &[ObstacleDescriptor],
    reference_frame: &str,
    generator: &dyn GeometryDescriptorGenerator,
) -> (Vec<MarkerState>, Vec<SpawnBlueprint>) {
    (0u32..)
        .zip(descriptors)
        .map(|(index, descriptor)| build(descriptor, index, reference_frame, generator))
        .unzip()
}

#[cfg(test)]
mod tests {
    use super::*;
    use obstacle_types::{Pose, Quaternion};
    use std::sync::Mutex;

    /// Records the names it was asked to generate for.
    #[derive(Default)]
    struct RecordingGenerator {
        names: Mutex<Vec<String>>,
    }

    impl GeometryDescriptorGenerator for RecordingGenerator {
        fn generate(&self, name: &str, params: &ShapeParams) -> String {
            self.names.lock().unwrap().push(name.to_string());
            format!("{name}:{}", params.kind())
        }
    }

    fn descriptor(id: &str, params: ShapeParams) -> ObstacleDescriptor {
        ObstacleDescriptor {
            id: id.into(),
            params,
            initial_pose: Pose::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity()),
        }
    }

    #[test]
    fn scale_mapping_per_shape() {
        let cases = [
            (
                ShapeParams::Sphere { radius: 0.1 },
                MarkerPrimitive::Sphere,
                Vec3::new(0.2, 0.2, 0.2),
            ),
            (
                ShapeParams::Cylinder {
                    radius: 0.1,
                    half_length: 0.5,
                },
                MarkerPrimitive::Cylinder,
                Vec3::new(0.1, 0.1, 0.5),
            ),
            (
                ShapeParams::Box {
                    x: 1.0,
                    y: 2.0,
                    z: 3.0,
                },
                MarkerPrimitive::Cube,
                Vec3::new(1.0, 2.0, 3.0),
            ),
            (
                ShapeParams::Capsule {
                    radius: 0.2,
                    half_length: 0.4,
                },
                MarkerPrimitive::Cylinder,
                Vec3::new(0.2, 0.2, 0.4),
            ),
        ];
        for (params, primitive, scale) in cases {
            let shape = render_shape(&params);
            assert_eq!(shape.primitive, primitive, "{params:?}");
            assert_eq!(shape.scale, scale, "{params:?}");
        }
    }

    #[test]
    fn build_fills_marker_defaults_and_blueprint() {
        let generator = RecordingGenerator::default();
        let (marker, blueprint) = build(
            &descriptor("obstacle1", ShapeParams::Sphere { radius: 0.1 }),
            3,
            "world",
            &generator,
        );

        assert_eq!(marker.id, "obstacle1");
        assert_eq!(marker.index, 3);
        assert_eq!(marker.frame_id, "world");
        assert_eq!(marker.color, MARKER_COLOR);
        assert_eq!(marker.ttl, Duration::from_millis(100));
        assert_eq!(marker.pose.translation, Vec3::new(1.0, 0.0, 0.0));

        assert_eq!(blueprint.id, "obstacle1");
        assert_eq!(blueprint.reference_frame, "world");
        assert_eq!(blueprint.geometry_descriptor, "obstacle1:sphere");
        assert_eq!(blueprint.initial_pose, marker.pose);
    }

    #[test]
    fn build_all_assigns_indices_in_order() {
        let generator = RecordingGenerator::default();
        let descriptors = [
            descriptor("b", ShapeParams::Sphere { radius: 1.0 }),
            descriptor(
                "a",
                ShapeParams::Box {
                    x: 1.0,
                    y: 1.0,
                    z: 1.0,
                },
            ),
        ];
        let (markers, blueprints) = build_all(&descriptors, "world", &generator);

        assert_eq!(
            markers.iter().map(|m| (m.id.as_str(), m.index)).collect::<Vec<_>>(),
            [("b", 0), ("a", 1)]
        );
        assert_eq!(blueprints.len(), 2);
        assert_eq!(*generator.names.lock().unwrap(), ["b", "a"]);
    }
}
