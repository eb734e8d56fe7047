//! Per-swapchain-image descriptor sets.
//!
//! One set is allocated per swapchain image from a pool sized exactly for
//! them. Every set is written once with the same views. Sets are freed
//! together with the pool.

use crate::backend::{
    ComputeBackend, DescriptorImageWrite, DescriptorPoolHandle, DescriptorPoolSize,
    DescriptorSetHandle, ImageViewHandle,
};
use crate::error::{DenoiseError, DenoiseResult};
use crate::pipeline::ComputePipeline;
use crate::types::{DescriptorBinding, DescriptorKind, ImageLayout};

/// Pool sizes holding `image_count` copies of every binding.
///
/// Fails if a descriptor count does not fit in `u32`.
pub fn pool_sizes(
    bindings: &[DescriptorBinding],
    image_count: u32,
) -> DenoiseResult<Vec<DescriptorPoolSize>> {
    let overflow = |binding: &DescriptorBinding| {
        DenoiseError::InvalidParameter(format!(
            "descriptor count for binding {} overflows with {} swapchain images",
            binding.binding, image_count
        ))
    };

    let mut sizes: Vec<DescriptorPoolSize> = Vec::new();
    for binding in bindings {
        let count = binding
            .count
            .checked_mul(image_count)
            .ok_or_else(|| overflow(binding))?;
        match sizes.iter_mut().find(|size| size.kind == binding.kind) {
            Some(size) => {
                size.count = size.count.checked_add(count).ok_or_else(|| overflow(binding))?;
            }
            None => sizes.push(DescriptorPoolSize {
                kind: binding.kind,
                count,
            }),
        }
    }
    Ok(sizes)
}

/// Descriptor pool and the sets allocated from it.
#[derive(Debug)]
pub struct DescriptorSetPool {
    pool: DescriptorPoolHandle,
    sets: Vec<DescriptorSetHandle>,
    destroyed: bool,
}

impl DescriptorSetPool {
    /// Allocate `count` sets with the pipeline's set layout and write `views` into each.
    ///
    /// `views` maps binding slots to image views; every binding of the
    /// pipeline must have one. Storage images are written in `General`.
    pub fn allocate_and_bind(
        backend: &dyn ComputeBackend,
        pipeline: &ComputePipeline,
        views: &[(u32, ImageViewHandle)],
        count: u32,
    ) -> DenoiseResult<Self> {
        if count == 0 {
            return Err(DenoiseError::InvalidParameter(
                "descriptor set count is zero".to_string(),
            ));
        }

        let bindings = pipeline.bindings();
        let mut bound = Vec::with_capacity(bindings.len());
        for binding in bindings {
            let layout = match binding.kind {
                DescriptorKind::StorageImage => ImageLayout::General,
                DescriptorKind::SampledImage => ImageLayout::ShaderReadOnly,
                DescriptorKind::UniformBuffer | DescriptorKind::StorageBuffer => {
                    return Err(DenoiseError::InvalidParameter(format!(
                        "binding {} is a buffer; only image bindings are supported",
                        binding.binding
                    )));
                }
            };
            let view = views
                .iter()
                .find(|(slot, _)| *slot == binding.binding)
                .map(|(_, view)| *view)
                .ok_or_else(|| {
                    DenoiseError::InvalidParameter(format!(
                        "no image view supplied for binding {}",
                        binding.binding
                    ))
                })?;
            bound.push((binding, view, layout));
        }

        let sizes = pool_sizes(bindings, count)?;
        let pool = backend.create_descriptor_pool(&sizes, count)?;
        let sets = backend
            .allocate_descriptor_sets(pool, pipeline.set_layout(), count)
            .inspect_err(|_| backend.destroy_descriptor_pool(pool))?;

        let writes: Vec<DescriptorImageWrite> = sets
            .iter()
            .flat_map(|&set| {
                bound
                    .iter()
                    .map(move |&(binding, view, layout)| DescriptorImageWrite {
                        set,
                        binding: binding.binding,
                        kind: binding.kind,
                        view,
                        layout,
                    })
            })
            .collect();
        backend.update_descriptor_sets(&writes);

        log::debug!(
            "Allocated {} descriptor set(s) with {} write(s)",
            sets.len(),
            writes.len()
        );

        Ok(Self {
            pool,
            sets,
            destroyed: false,
        })
    }

    /// Sets ordered by swapchain image index.
    pub fn sets(&self) -> &[DescriptorSetHandle] {
        &self.sets
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Set for swapchain image `index`.
    pub fn get(&self, index: u32) -> Option<DescriptorSetHandle> {
        self.sets.get(index as usize).copied()
    }

    /// Destroy the pool, freeing every set.
    pub fn destroy(&mut self, backend: &dyn ComputeBackend) {
        if self.destroyed {
            return;
        }
        backend.destroy_descriptor_pool(self.pool);
        self.sets.clear();
        self.destroyed = true;
    }
}

impl Drop for DescriptorSetPool {
    fn drop(&mut self) {
        if !self.destroyed {
            log::warn!("DescriptorSetPool dropped without calling destroy()");
        }
    }
}
