//! Descriptor binding declarations.
//!
//! A binding declaration is the contract between the host side and the
//! compute shader: slot, array count, resource kind and visible stages.
//! The shader is not reflected, so these must match what it declares.

/// Kind of resource bound at a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    /// Storage image (read-write, accessed in GENERAL layout).
    StorageImage,
    /// Sampled image.
    SampledImage,
    /// Uniform buffer.
    UniformBuffer,
    /// Storage buffer.
    StorageBuffer,
}

bitflags::bitflags! {
    /// Shader stages that can access a binding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        /// Vertex shader stage.
        const VERTEX = 1 << 0;
        /// Fragment shader stage.
        const FRAGMENT = 1 << 1;
        /// Compute shader stage.
        const COMPUTE = 1 << 2;
    }
}

/// Describes a single binding slot of a descriptor set layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorBinding {
    /// Binding index within the set.
    pub binding: u32,
    /// Number of descriptors in the slot (1 for non-arrays).
    pub count: u32,
    /// Type of resource expected at this binding.
    pub kind: DescriptorKind,
    /// Shader stages that can access this binding.
    pub stages: ShaderStages,
    /// Whether the shader writes through this binding.
    pub writable: bool,
}

impl DescriptorBinding {
    /// Create a single storage image binding visible to the compute stage.
    pub const fn storage_image(binding: u32) -> Self {
        Self {
            binding,
            count: 1,
            kind: DescriptorKind::StorageImage,
            stages: ShaderStages::COMPUTE,
            writable: true,
        }
    }

    /// Mark the binding as only read by the shader.
    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    /// Set the array count.
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }
}

/// The images the denoiser shader reads and writes, by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageSlot {
    /// Path-traced color input.
    Color,
    /// Denoised output.
    Output,
    /// Surface normals G-buffer channel.
    Normals,
    /// World positions G-buffer channel.
    Positions,
}

impl ImageSlot {
    /// All slots in binding order.
    pub const ALL: [ImageSlot; 4] = [Self::Color, Self::Output, Self::Normals, Self::Positions];

    /// Slot index the shader declares for this image.
    pub const fn binding(self) -> u32 {
        match self {
            Self::Color => 0,
            Self::Output => 1,
            Self::Normals => 2,
            Self::Positions => 3,
        }
    }

    /// Returns true for the image the shader writes.
    pub const fn is_written(self) -> bool {
        matches!(self, Self::Output)
    }

    /// Returns the binding declarations of the denoiser shader.
    pub fn bindings() -> Vec<DescriptorBinding> {
        Self::ALL
            .iter()
            .map(|slot| {
                let binding = DescriptorBinding::storage_image(slot.binding());
                if slot.is_written() {
                    binding
                } else {
                    binding.read_only()
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denoiser_bindings() {
        let bindings = ImageSlot::bindings();
        assert_eq!(bindings.len(), 4);
        for (index, binding) in bindings.iter().enumerate() {
            assert_eq!(binding.binding, index as u32);
            assert_eq!(binding.count, 1);
            assert_eq!(binding.kind, DescriptorKind::StorageImage);
            assert_eq!(binding.stages, ShaderStages::COMPUTE);
        }
        let written: Vec<u32> = bindings
            .iter()
            .filter(|b| b.writable)
            .map(|b| b.binding)
            .collect();
        assert_eq!(written, vec![ImageSlot::Output.binding()]);
    }

    #[test]
    fn test_output_slot() {
        assert_eq!(ImageSlot::Output.binding(), 1);
        assert_eq!(ImageSlot::Color.binding(), 0);
    }

    #[test]
    fn test_with_count() {
        let binding = DescriptorBinding::storage_image(5).with_count(3);
        assert_eq!(binding.count, 3);
        assert_eq!(binding.binding, 5);
    }
}
