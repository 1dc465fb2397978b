//! SDF model generation.
//!
//! Each obstacle becomes a static model with a single link whose collision
//! and visual geometry match the configured shape.  Capsules are emitted as a
//! cylinder capped by two spheres so that they load on simulators whose SDF
//! parser predates the native `<capsule>` element.

use std::fmt::Write;

use obstacle_types::{ShapeParams, Vec3};

/// Turns a shape into a simulator-specific model description.
pub trait GeometryDescriptorGenerator: Send + Sync {
    /// `name` is the obstacle id; it becomes the model name.
    fn generate(&self, name: &str, params: &ShapeParams) -> String;
}

/// SDF 1.6 generator.
#[derive(Debug, Clone)]
pub struct SdfGenerator {
    /// RGBA written into the visual material.
    color: [f32; 4],
}

impl Default for SdfGenerator {
    fn default() -> Self {
        Self {
            color: [0.58, 0.0, 0.98, 0.7],
        }
    }
}

impl SdfGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_color(mut self, color: [f32; 4]) -> Self {
        self.color = color;
        self
    }
}

/// One geometry element, optionally offset from the link origin.
struct Part {
    offset: Option<Vec3>,
    geometry: String,
}

fn parts(params: &ShapeParams) -> Vec<Part> {
    let whole = |geometry: String| vec![Part { offset: None, geometry }];
    match *params {
        ShapeParams::Sphere { radius } => whole(sphere(radius)),
        ShapeParams::Cylinder {
            radius,
            half_length,
        } => whole(cylinder(radius, 2.0 * half_length)),
        ShapeParams::Box { x, y, z } => whole(format!("<box><size>{x} {y} {z}</size></box>")),
        ShapeParams::Capsule {
            radius,
            half_length,
        } => vec![
            Part {
                offset: None,
                geometry: cylinder(radius, 2.0 * half_length),
            },
            Part {
                offset: Some(Vec3::new(0.0, 0.0, half_length)),
                geometry: sphere(radius),
            },
            Part {
                offset: Some(Vec3::new(0.0, 0.0, -half_length)),
                geometry: sphere(radius),
            },
        ],
    }
}

fn sphere(radius: f64) -> String {
    format!("<sphere><radius>{radius}</radius></sphere>")
}

fn cylinder(radius: f64, length: f64) -> String {
    format!("<cylinder><radius>{radius}</radius><length>{length}</length></cylinder>")
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

impl GeometryDescriptorGenerator for SdfGenerator {
    fn generate(&self, name: &str, params: &ShapeParams) -> String {
        let name = escape(name);
        let [r, g, b, a] = self.color;
        let mut sdf = String::new();

        // Writing into a String cannot fail.
        let _ = writeln!(sdf, "<?xml version=\"1.0\"?>");
        let _ = writeln!(sdf, "<sdf version=\"1.6\">");
        let _ = writeln!(sdf, "  <model name=\"{name}\">");
        let _ = writeln!(sdf, "    <static>true</static>");
        let _ = writeln!(sdf, "    <link name=\"{name}_link\">");
        for (i, part) in parts(params).iter().enumerate() {
            let pose = part
                .offset
                .map(|o| format!("<pose>{} {} {} 0 0 0</pose>", o.x, o.y, o.z))
                .unwrap_or_default();
            let _ = writeln!(
                sdf,
                "      <collision name=\"{name}_collision_{i}\">{pose}<geometry>{}</geometry></collision>",
                part.geometry
            );
            let _ = writeln!(
                sdf,
                "      <visual name=\"{name}_visual_{i}\">{pose}<geometry>{}</geometry>\
                 <material><ambient>{r} {g} {b} {a}</ambient><diffuse>{r} {g} {b} {a}</diffuse></material></visual>",
                part.geometry
            );
        }
        let _ = writeln!(sdf, "    </link>");
        let _ = writeln!(sdf, "  </model>");
        let _ = write!(sdf, "</sdf>");
        sdf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sphere_model_carries_radius_and_name() {
        let sdf = SdfGenerator::new().generate("obstacle1", &ShapeParams::Sphere { radius: 0.1 });
        assert!(sdf.starts_with("<?xml"));
        assert!(sdf.contains("<model name=\"obstacle1\">"));
        assert!(sdf.contains("<sphere><radius>0.1</radius></sphere>"));
        assert_eq!(sdf.matches("<collision").count(), 1);
        assert!(sdf.trim_end().ends_with("</sdf>"));
    }

    #[test]
    fn cylinder_length_is_twice_half_length() {
        let sdf = SdfGenerator::new().generate(
            "post",
            &ShapeParams::Cylinder {
                radius: 0.05,
                half_length: 0.4,
            },
        );
        assert!(sdf.contains("<length>0.8</length>"));
    }

    #[test]
    fn box_size_lists_full_extents() {
        let sdf = SdfGenerator::new().generate(
            "table",
            &ShapeParams::Box {
                x: 1.0,
                y: 0.5,
                z: 0.75,
            },
        );
        assert!(sdf.contains("<size>1 0.5 0.75</size>"));
    }

    #[test]
    fn capsule_is_cylinder_with_two_end_caps() {
        let sdf = SdfGenerator::new().generate(
            "arm",
            &ShapeParams::Capsule {
                radius: 0.1,
                half_length: 0.3,
            },
        );
        assert_eq!(sdf.matches("<collision").count(), 3);
        assert_eq!(sdf.matches("<visual").count(), 3);
        assert!(sdf.contains("<pose>0 0 0.3 0 0 0</pose>"));
        assert!(sdf.contains("<pose>0 0 -0.3 0 0 0</pose>"));
        assert!(sdf.contains("<length>0.6</length>"));
    }

    #[test]
    fn model_name_is_xml_escaped() {
        let sdf = SdfGenerator::new().generate("a<b>&\"c\"", &ShapeParams::Sphere { radius: 1.0 });
        assert!(sdf.contains("name=\"a&lt;b&gt;&amp;&quot;c&quot;\""));
    }

    #[test]
    fn material_uses_configured_color() {
        let sdf = SdfGenerator::new()
            .with_color([1.0, 0.0, 0.0, 1.0])
            .generate("red", &ShapeParams::Sphere { radius: 1.0 });
        assert!(sdf.contains("<ambient>1 0 0 1</ambient>"));
    }
}
