//! Decompiler configuration
//!
//! Builds the per-request specialization and the device capability snapshot
//! the decompiler needs. Neither can fail.

use serde::{Deserialize, Serialize};

/// Number of vertex attribute slots on the guest GPU.
pub const NUM_VERTEX_ATTRIBUTES: usize = 32;

/// Guest vertex attribute component type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VertexAttributeType {
    SignedNorm,
    UnsignedNorm,
    SignedInt,
    UnsignedInt,
    UnsignedScaled,
    SignedScaled,
    Float,
}

/// Request-scoped parameters for one decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Specialization {
    pub base_binding: u32,
    pub custom_input_varyings: Vec<u8>,
    /// Clip-space depth runs from -1 to 1
    pub ndc_minus_one_to_one: bool,
    pub point_size: f32,
    pub shared_memory_size: u32,
    pub enabled_attributes: [bool; NUM_VERTEX_ATTRIBUTES],
    pub attribute_types: [VertexAttributeType; NUM_VERTEX_ATTRIBUTES],
}

impl Specialization {
    /// Build the specialization for a request.
    ///
    /// Every vertex attribute is enabled as float; the varyings are copied.
    pub fn new(base_binding: u32, custom_input_varyings: &[u8]) -> Self {
        Self {
            base_binding,
            custom_input_varyings: custom_input_varyings.to_vec(),
            ndc_minus_one_to_one: true,
            point_size: 1.0,
            shared_memory_size: 0,
            enabled_attributes: [true; NUM_VERTEX_ATTRIBUTES],
            attribute_types: [VertexAttributeType::Float; NUM_VERTEX_ATTRIBUTES],
        }
    }
}

impl Default for Specialization {
    fn default() -> Self {
        Self::new(0, &[])
    }
}

/// Feature support of the host the generated SPIR-V targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCapabilities {
    pub float16_supported: bool,
    pub warp_size_potentially_bigger_than_guest: bool,
    pub formatless_image_load_supported: bool,
    pub nv_viewport_swizzle_supported: bool,
    pub khr_uniform_buffer_standard_layout_supported: bool,
    pub ext_index_type_uint8_supported: bool,
    pub ext_depth_range_unrestricted_supported: bool,
    pub ext_shader_viewport_index_layer_supported: bool,
    pub ext_transform_feedback_supported: bool,
    pub ext_custom_border_color_supported: bool,
    pub ext_extended_dynamic_state_supported: bool,
}

/// Named device capability profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DeviceProfile {
    /// Conservative web/desktop target
    #[default]
    Baseline,
    /// Every optional capability available
    Full,
}

impl DeviceProfile {
    pub fn capabilities(self) -> DeviceCapabilities {
        match self {
            DeviceProfile::Baseline => DeviceCapabilities {
                float16_supported: false,
                warp_size_potentially_bigger_than_guest: true,
                formatless_image_load_supported: true,
                nv_viewport_swizzle_supported: false,
                khr_uniform_buffer_standard_layout_supported: false,
                ext_index_type_uint8_supported: false,
                ext_depth_range_unrestricted_supported: true,
                ext_shader_viewport_index_layer_supported: true,
                ext_transform_feedback_supported: false,
                ext_custom_border_color_supported: false,
                ext_extended_dynamic_state_supported: false,
            },
            DeviceProfile::Full => DeviceCapabilities {
                float16_supported: true,
                warp_size_potentially_bigger_than_guest: true,
                formatless_image_load_supported: true,
                nv_viewport_swizzle_supported: true,
                khr_uniform_buffer_standard_layout_supported: true,
                ext_index_type_uint8_supported: true,
                ext_depth_range_unrestricted_supported: true,
                ext_shader_viewport_index_layer_supported: true,
                ext_transform_feedback_supported: true,
                ext_custom_border_color_supported: true,
                ext_extended_dynamic_state_supported: true,
            },
        }
    }
}

impl From<DeviceProfile> for DeviceCapabilities {
    fn from(profile: DeviceProfile) -> Self {
        profile.capabilities()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specialization_defaults() {
        let spec = Specialization::new(4, &[]);
        assert_eq!(spec.base_binding, 4);
        assert!(spec.custom_input_varyings.is_empty());
        assert!(spec.ndc_minus_one_to_one);
        assert_eq!(spec.point_size, 1.0);
        assert_eq!(spec.shared_memory_size, 0);
        assert!(spec.enabled_attributes.iter().all(|&e| e));
        assert!(spec
            .attribute_types
            .iter()
            .all(|&t| t == VertexAttributeType::Float));
    }

    #[test]
    fn test_varyings_are_copied_in_order() {
        let mut varyings = vec![0u8, 2, 5];
        let spec = Specialization::new(0, &varyings);
        varyings[0] = 9;
        assert_eq!(spec.custom_input_varyings, vec![0, 2, 5]);
    }

    #[test]
    fn test_baseline_profile_snapshot() {
        let caps = DeviceProfile::Baseline.capabilities();
        assert!(!caps.float16_supported);
        assert!(caps.formatless_image_load_supported);
        assert!(!caps.nv_viewport_swizzle_supported);
        assert!(!caps.ext_extended_dynamic_state_supported);
        assert!(!caps.ext_transform_feedback_supported);
        assert!(!caps.ext_custom_border_color_supported);
        assert!(caps.ext_depth_range_unrestricted_supported);
        assert_eq!(DeviceCapabilities::from(DeviceProfile::default()), caps);
    }

    #[test]
    fn test_specialization_wire_keys() {
        let json = serde_json::to_value(Specialization::default()).unwrap();
        assert_eq!(json["baseBinding"], 0);
        assert_eq!(json["ndcMinusOneToOne"], true);
        assert_eq!(json["attributeTypes"][31], "float");
        assert_eq!(json["enabledAttributes"].as_array().unwrap().len(), NUM_VERTEX_ATTRIBUTES);
    }
}
