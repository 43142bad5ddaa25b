/// VulkanReadbackDevice - headless Vulkan implementation of ReadbackDevice

use async_readback::device::{
    CopyTextureInfo, GpuFence, MapMode, MappedSurface, ReadbackDevice, ResourceAccess,
    Texture as ReadbackTexture, TextureDesc, TextureInfo, TextureUsage,
};
use async_readback::format::PixelFormat;
use async_readback::{engine_bail, engine_debug, engine_err, engine_error, engine_info, engine_trace, engine_warn};
use async_readback::{Error, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc};
use gpu_allocator::MemoryLocation;
use std::borrow::Cow;
use std::ffi::{c_char, CString};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, MutexGuard};

use crate::vulkan_context::{CommandRecorder, GpuContext};
use crate::vulkan_fence::Fence;
use crate::vulkan_format::{
    access_to_layout, barrier_aspect, copy_aspect, layout_access_mask, pixel_format_to_vk,
    staging_row_pitch, texture_usage_to_vk,
};
use crate::vulkan_staging::StagingTexture;
use crate::vulkan_texture::Texture;

/// Configuration of the headless Vulkan device
#[derive(Debug, Clone)]
pub struct VulkanDeviceConfig {
    /// Enable `VK_LAYER_KHRONOS_validation`, reported through the engine logger.
    /// Needs the `vulkan-validation` feature; ignored (with a warning) otherwise.
    pub enable_validation: bool,
    /// Application name reported to the driver
    pub app_name: String,
    /// Byte alignment of staging rows (0 or 1 packs rows tightly)
    pub staging_row_alignment: u32,
}

impl Default for VulkanDeviceConfig {
    fn default() -> Self {
        Self {
            enable_validation: cfg!(all(debug_assertions, feature = "vulkan-validation")),
            app_name: "Async Readback".to_string(),
            staging_row_alignment: 256,
        }
    }
}

/// Headless Vulkan readback device
///
/// Owns no surface or swapchain: one graphics queue, one allocator, one
/// command pool. Copies and barriers are recorded into a pending command
/// buffer that `write_fence` submits.
pub struct VulkanReadbackDevice {
    /// Shared GPU context (also held by every resource handed out)
    ctx: Arc<GpuContext>,
    /// Physical device
    physical_device: vk::PhysicalDevice,
    /// Driver-reported device name
    device_name: String,
    config: VulkanDeviceConfig,
    staging_counter: AtomicU64,
}

impl VulkanReadbackDevice {
    /// Create a headless device on the first GPU exposing a graphics queue
    pub fn new(config: VulkanDeviceConfig) -> Result<Self> {
        unsafe {
            // Create Vulkan Entry
            let entry = ash::Entry::load()
                .map_err(|e| {
                    engine_error!("readback::vulkan", "Failed to load Vulkan library: {:?}", e);
                    Error::InitializationFailed(format!("Failed to load Vulkan library: {:?}", e))
                })?;

            // Application Info
            let app_name = CString::new(config.app_name.as_str())
                .map_err(|e| Error::InitializationFailed(format!("Invalid application name: {}", e)))?;
            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(0, 1, 0, 0))
                .engine_name(c"AsyncReadback")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_3);

            let validation = config.enable_validation && cfg!(feature = "vulkan-validation");
            if config.enable_validation && !validation {
                engine_warn!("readback::vulkan", "Validation requested but the vulkan-validation feature is disabled");
            }

            let extension_names: Vec<*const c_char> = if validation {
                vec![ash::ext::debug_utils::NAME.as_ptr()]
            } else {
                vec![]
            };
            let layer_names: Vec<*const c_char> = if validation {
                vec![c"VK_LAYER_KHRONOS_validation".as_ptr()]
            } else {
                vec![]
            };

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);

            let instance = entry
                .create_instance(&create_info, None)
                .map_err(|e| {
                    engine_error!("readback::vulkan", "Failed to create Vulkan instance: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create instance: {:?}", e))
                })?;

            let (debug_utils_loader, debug_messenger) = if validation {
                Self::create_debug_messenger(&entry, &instance)?
            } else {
                (None, None)
            };

            // Pick Physical Device
            let (physical_device, graphics_family_index) = match Self::pick_physical_device(&instance) {
                Ok(picked) => picked,
                Err(e) => {
                    if let (Some(debug_utils), Some(messenger)) = (&debug_utils_loader, &debug_messenger) {
                        debug_utils.destroy_debug_utils_messenger(*messenger, None);
                    }
                    instance.destroy_instance(None);
                    return Err(e);
                }
            };

            let properties = instance.get_physical_device_properties(physical_device);
            let device_name = properties
                .device_name_as_c_str()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();

            // Create Logical Device
            let queue_priorities = [1.0];
            let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
                .queue_family_index(graphics_family_index)
                .queue_priorities(&queue_priorities)];

            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos);

            let device = instance
                .create_device(physical_device, &device_create_info, None)
                .map_err(|e| {
                    engine_error!("readback::vulkan", "Failed to create logical device: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create device: {:?}", e))
                })?;

            let graphics_queue = device.get_device_queue(graphics_family_index, 0);

            // Create GPU allocator
            let allocator = Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            })
            .map_err(|e| {
                engine_error!("readback::vulkan", "Failed to create GPU allocator: {:?}", e);
                Error::InitializationFailed(format!("Failed to create allocator: {:?}", e))
            })?;

            // Command pool for copies, barriers and uploads
            let pool_create_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(graphics_family_index)
                .flags(vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

            let command_pool = device.create_command_pool(&pool_create_info, None)
                .map_err(|e| {
                    engine_error!("readback::vulkan", "Failed to create command pool: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create command pool: {:?}", e))
                })?;

            // GpuContext owns device, instance, and debug messenger destruction
            let ctx = Arc::new(GpuContext::new(
                entry,
                instance,
                device,
                allocator,
                graphics_queue,
                graphics_family_index,
                properties.limits.non_coherent_atom_size,
                command_pool,
                debug_utils_loader,
                debug_messenger,
            ));

            engine_info!(
                "readback::vulkan",
                "Headless Vulkan device ready: {} (queue family {}, staging row alignment {})",
                device_name,
                graphics_family_index,
                config.staging_row_alignment
            );

            Ok(Self {
                ctx,
                physical_device,
                device_name,
                config,
                staging_counter: AtomicU64::new(0),
            })
        }
    }

    #[cfg(feature = "vulkan-validation")]
    unsafe fn create_debug_messenger(
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> Result<(Option<ash::ext::debug_utils::Instance>, Option<vk::DebugUtilsMessengerEXT>)> {
        let debug_utils = ash::ext::debug_utils::Instance::new(entry, instance);

        let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(crate::debug::messenger_severity_flags())
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE
            )
            .pfn_user_callback(Some(crate::debug::vulkan_debug_callback));

        let messenger = debug_utils
            .create_debug_utils_messenger(&debug_info, None)
            .map_err(|e| {
                engine_error!("readback::vulkan", "Failed to create debug messenger: {:?}", e);
                Error::InitializationFailed(format!("Failed to create debug messenger: {:?}", e))
            })?;

        Ok((Some(debug_utils), Some(messenger)))
    }

    #[cfg(not(feature = "vulkan-validation"))]
    unsafe fn create_debug_messenger(
        _entry: &ash::Entry,
        _instance: &ash::Instance,
    ) -> Result<(Option<ash::ext::debug_utils::Instance>, Option<vk::DebugUtilsMessengerEXT>)> {
        Ok((None, None))
    }

    unsafe fn pick_physical_device(instance: &ash::Instance) -> Result<(vk::PhysicalDevice, u32)> {
        let physical_devices = instance
            .enumerate_physical_devices()
            .map_err(|e| {
                engine_error!("readback::vulkan", "Failed to enumerate physical devices: {:?}", e);
                Error::InitializationFailed(format!("Failed to enumerate physical devices: {:?}", e))
            })?;

        physical_devices
            .into_iter()
            .find_map(|physical_device| {
                instance
                    .get_physical_device_queue_family_properties(physical_device)
                    .iter()
                    .position(|qf| qf.queue_flags.contains(vk::QueueFlags::GRAPHICS))
                    .map(|index| (physical_device, index as u32))
            })
            .ok_or_else(|| {
                engine_error!("readback::vulkan", "No Vulkan GPU with a graphics queue found");
                Error::InitializationFailed("No Vulkan GPU with a graphics queue found".to_string())
            })
    }

    /// Driver-reported name of the physical device
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn config(&self) -> &VulkanDeviceConfig {
        &self.config
    }

    /// Block until the queue is idle
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.ctx.device
                .device_wait_idle()
                .map_err(|e| engine_err!("readback::vulkan", "Failed to wait idle: {:?}", e))
        }
    }

    // ===== INTERNAL HELPERS =====

    fn lock_commands(&self) -> Result<MutexGuard<'_, CommandRecorder>> {
        self.ctx.commands.lock()
            .map_err(|_| engine_err!("readback::vulkan", "Command recorder lock poisoned"))
    }

    unsafe fn begin_command_buffer(&self, pool: vk::CommandPool) -> Result<vk::CommandBuffer> {
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let command_buffer = self.ctx.device.allocate_command_buffers(&allocate_info)
            .map_err(|e| engine_err!("readback::vulkan", "Failed to allocate command buffer: {:?}", e))?
            .into_iter()
            .next()
            .ok_or_else(|| engine_err!("readback::vulkan", "Driver returned no command buffer"))?;

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        if let Err(e) = self.ctx.device.begin_command_buffer(command_buffer, &begin_info) {
            self.ctx.device.free_command_buffers(pool, &[command_buffer]);
            engine_bail!("readback::vulkan", "Failed to begin command buffer: {:?}", e);
        }

        Ok(command_buffer)
    }

    /// Record into the pending command buffer, starting one if needed
    fn record<F: FnOnce(&ash::Device, vk::CommandBuffer)>(&self, record: F) -> Result<()> {
        let mut commands = self.lock_commands()?;
        let command_buffer = match commands.pending {
            Some(command_buffer) => command_buffer,
            None => {
                let command_buffer = unsafe { self.begin_command_buffer(commands.pool)? };
                commands.pending = Some(command_buffer);
                command_buffer
            }
        };
        record(&self.ctx.device, command_buffer);
        Ok(())
    }

    fn allocate(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> Result<Allocation> {
        let mut allocator = self.ctx.allocator.lock()
            .map_err(|_| engine_err!("readback::vulkan", "Allocator lock poisoned"))?;

        allocator.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })
        .map_err(|e| {
            let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
            engine_error!("readback::vulkan", "Out of GPU memory for {} ({:.2} MB): {:?}", name, size_mb, e);
            Error::OutOfMemory
        })
    }

    fn free(&self, allocation: Allocation) {
        if let Ok(mut allocator) = self.ctx.allocator.lock() {
            if allocator.free(allocation).is_err() {
                engine_warn!("readback::vulkan", "Failed to free GPU allocation");
            }
        }
    }

    /// Upload tightly packed pixels into `texture`, leaving it in TRANSFER_DST_OPTIMAL
    fn upload(&self, texture: &Texture, data: &[u8]) -> Result<()> {
        unsafe {
            let device = &self.ctx.device;

            let buffer_create_info = vk::BufferCreateInfo::default()
                .size(data.len() as u64)
                .usage(vk::BufferUsageFlags::TRANSFER_SRC)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);

            let buffer = device.create_buffer(&buffer_create_info, None)
                .map_err(|e| engine_err!("readback::vulkan", "Failed to create upload buffer: {:?}", e))?;

            let requirements = device.get_buffer_memory_requirements(buffer);
            let allocation = match self.allocate("texture_upload_buffer", requirements, MemoryLocation::CpuToGpu, true) {
                Ok(allocation) => allocation,
                Err(e) => {
                    device.destroy_buffer(buffer, None);
                    return Err(e);
                }
            };

            let result = self.submit_upload(texture, buffer, &allocation, data);

            device.destroy_buffer(buffer, None);
            self.free(allocation);
            result
        }
    }

    unsafe fn submit_upload(
        &self,
        texture: &Texture,
        buffer: vk::Buffer,
        allocation: &Allocation,
        data: &[u8],
    ) -> Result<()> {
        let device = &self.ctx.device;

        device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
            .map_err(|e| engine_err!("readback::vulkan", "Failed to bind upload buffer memory: {:?}", e))?;

        let mapped_ptr = allocation.mapped_ptr()
            .ok_or_else(|| engine_err!("readback::vulkan", "Upload buffer is not mapped"))?
            .as_ptr() as *mut u8;
        std::ptr::copy_nonoverlapping(data.as_ptr(), mapped_ptr, data.len());

        let info = &texture.info;
        let subresource_range = vk::ImageSubresourceRange {
            aspect_mask: barrier_aspect(info.format),
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        };

        // Uploads bypass the pending command buffer: submitted and waited on here
        let commands = self.lock_commands()?;
        let command_buffer = self.begin_command_buffer(commands.pool)?;

        let old_layout = texture.swap_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        let barrier_to_transfer = vk::ImageMemoryBarrier::default()
            .old_layout(old_layout)
            .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(texture.image)
            .subresource_range(subresource_range)
            .src_access_mask(layout_access_mask(old_layout))
            .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE);

        device.cmd_pipeline_barrier(
            command_buffer,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier_to_transfer],
        );

        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: copy_aspect(info.format),
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(vk::Extent3D {
                width: info.width,
                height: info.height,
                depth: 1,
            });

        device.cmd_copy_buffer_to_image(
            command_buffer,
            buffer,
            texture.image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );

        let result = device.end_command_buffer(command_buffer)
            .map_err(|e| engine_err!("readback::vulkan", "Failed to end upload command buffer: {:?}", e))
            .and_then(|_| {
                let command_buffers = [command_buffer];
                let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
                device.queue_submit(self.ctx.graphics_queue, &[submit_info], vk::Fence::null())
                    .map_err(|e| engine_err!("readback::vulkan", "Failed to submit texture upload: {:?}", e))
            })
            .and_then(|_| {
                device.queue_wait_idle(self.ctx.graphics_queue)
                    .map_err(|e| engine_err!("readback::vulkan", "Failed to wait for texture upload: {:?}", e))
            });

        device.free_command_buffers(commands.pool, &[command_buffer]);
        result
    }
}

// ===== DOWNCASTS =====

fn as_texture(texture: &dyn ReadbackTexture) -> Result<&Texture> {
    texture.as_any().downcast_ref::<Texture>()
        .ok_or_else(|| Error::InvalidResource("texture was not created by this Vulkan device".to_string()))
}

fn as_staging(texture: &dyn ReadbackTexture) -> Result<&StagingTexture> {
    texture.as_any().downcast_ref::<StagingTexture>()
        .ok_or_else(|| Error::InvalidResource("texture is not a Vulkan staging texture".to_string()))
}

fn as_fence(fence: &dyn GpuFence) -> Result<&Fence> {
    fence.as_any().downcast_ref::<Fence>()
        .ok_or_else(|| Error::InvalidResource(format!("fence '{}' was not created by this Vulkan device", fence.name())))
}

impl ReadbackDevice for VulkanReadbackDevice {
    fn create_texture(&self, desc: TextureDesc) -> Result<Arc<dyn ReadbackTexture>> {
        if desc.width == 0 || desc.height == 0 {
            engine_bail!("readback::vulkan", "Cannot create texture '{}' with size {}x{}", desc.name, desc.width, desc.height);
        }
        if let Some(data) = &desc.data {
            if data.len() != desc.packed_size() {
                engine_bail!(
                    "readback::vulkan",
                    "Texture '{}' data is {} bytes, expected {}",
                    desc.name,
                    data.len(),
                    desc.packed_size()
                );
            }
        }

        unsafe {
            let device = &self.ctx.device;

            let image_create_info = vk::ImageCreateInfo::default()
                .image_type(vk::ImageType::TYPE_2D)
                .format(pixel_format_to_vk(desc.format))
                .extent(vk::Extent3D {
                    width: desc.width,
                    height: desc.height,
                    depth: 1,
                })
                .mip_levels(1)
                .array_layers(1)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(texture_usage_to_vk(desc.usage, desc.format, desc.data.is_some()))
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);

            let image = device.create_image(&image_create_info, None)
                .map_err(|e| engine_err!("readback::vulkan", "Failed to create texture image '{}': {:?}", desc.name, e))?;

            let requirements = device.get_image_memory_requirements(image);
            let allocation = match self.allocate(&desc.name, requirements, MemoryLocation::GpuOnly, false) {
                Ok(allocation) => allocation,
                Err(e) => {
                    device.destroy_image(image, None);
                    return Err(e);
                }
            };
            let memory = allocation.memory();
            let offset = allocation.offset();

            // From here on, Texture::drop releases the image and its memory
            let texture = Texture::new(
                Arc::clone(&self.ctx),
                image,
                allocation,
                vk::ImageLayout::UNDEFINED,
                desc.name.clone(),
                TextureInfo {
                    width: desc.width,
                    height: desc.height,
                    format: desc.format,
                    usage: desc.usage,
                },
            );

            device.bind_image_memory(image, memory, offset)
                .map_err(|e| engine_err!("readback::vulkan", "Failed to bind texture image memory: {:?}", e))?;

            if let Some(data) = &desc.data {
                self.upload(&texture, data)?;
            }

            engine_trace!(
                "readback::vulkan",
                "Created texture '{}' ({}x{} {:?})",
                desc.name,
                desc.width,
                desc.height,
                desc.format
            );

            Ok(Arc::new(texture))
        }
    }

    fn create_staging_texture(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Arc<dyn ReadbackTexture>> {
        if width == 0 || height == 0 {
            engine_bail!("readback::vulkan", "Cannot create staging texture with size {}x{}", width, height);
        }

        let row_pitch_in_pixels = staging_row_pitch(width, format, self.config.staging_row_alignment);
        let size = row_pitch_in_pixels as u64 * height as u64 * format.block_bytes() as u64;
        let index = self.staging_counter.fetch_add(1, Ordering::Relaxed);

        unsafe {
            let device = &self.ctx.device;

            let buffer_create_info = vk::BufferCreateInfo::default()
                .size(size)
                .usage(vk::BufferUsageFlags::TRANSFER_DST)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);

            let buffer = device.create_buffer(&buffer_create_info, None)
                .map_err(|e| engine_err!("readback::vulkan", "Failed to create staging buffer: {:?}", e))?;

            let requirements = device.get_buffer_memory_requirements(buffer);
            let allocation = match self.allocate(&format!("staging#{}", index), requirements, MemoryLocation::GpuToCpu, true) {
                Ok(allocation) => allocation,
                Err(e) => {
                    device.destroy_buffer(buffer, None);
                    return Err(e);
                }
            };
            let memory = allocation.memory();
            let offset = allocation.offset();

            let staging = StagingTexture::new(
                Arc::clone(&self.ctx),
                buffer,
                allocation,
                row_pitch_in_pixels,
                size,
                TextureInfo {
                    width,
                    height,
                    format,
                    usage: TextureUsage::STAGING,
                },
            );

            device.bind_buffer_memory(buffer, memory, offset)
                .map_err(|e| engine_err!("readback::vulkan", "Failed to bind staging buffer memory: {:?}", e))?;

            Ok(Arc::new(staging))
        }
    }

    fn transition(&self, texture: &dyn ReadbackTexture, from: ResourceAccess, to: ResourceAccess) -> Result<()> {
        if let Ok(staging) = as_staging(texture) {
            // Buffers have no layout; only make copy writes visible to the host
            if from == ResourceAccess::CopyDest && to == ResourceAccess::CopySrc {
                let barrier = vk::BufferMemoryBarrier::default()
                    .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                    .dst_access_mask(vk::AccessFlags::HOST_READ)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .buffer(staging.buffer)
                    .offset(0)
                    .size(vk::WHOLE_SIZE);

                self.record(|device, command_buffer| unsafe {
                    device.cmd_pipeline_barrier(
                        command_buffer,
                        vk::PipelineStageFlags::TRANSFER,
                        vk::PipelineStageFlags::HOST,
                        vk::DependencyFlags::empty(),
                        &[],
                        &[barrier],
                        &[],
                    );
                })?;
            }
            return Ok(());
        }

        let texture = as_texture(texture)?;
        let current = texture.layout();
        if from != ResourceAccess::Unknown && access_to_layout(from, current) != current {
            engine_debug!(
                "readback::vulkan",
                "Texture '{}' transition from {:?} but tracked layout is {:?}",
                texture.name(),
                from,
                current
            );
        }

        let new_layout = access_to_layout(to, current);
        if new_layout == current {
            return Ok(());
        }

        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(current)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(texture.image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: barrier_aspect(texture.info.format),
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            })
            .src_access_mask(layout_access_mask(current))
            .dst_access_mask(layout_access_mask(new_layout));

        self.record(|device, command_buffer| unsafe {
            device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::ALL_COMMANDS,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        })?;

        texture.swap_layout(new_layout);
        Ok(())
    }

    fn copy_region(&self, source: &dyn ReadbackTexture, dest: &dyn ReadbackTexture, info: &CopyTextureInfo) -> Result<()> {
        let source = as_texture(source)?;
        let dest = as_staging(dest)?;

        let source_end = info.source_position + info.size;
        let dest_end = info.dest_position + info.size;
        if source_end.x > source.info.width || source_end.y > source.info.height {
            engine_bail!("readback::vulkan", "Copy region {:?} exceeds texture '{}'", info, source.name());
        }
        if dest_end.x > dest.info.width || dest_end.y > dest.info.height {
            engine_bail!("readback::vulkan", "Copy region {:?} exceeds the staging texture", info);
        }
        if source.info.format != dest.info.format {
            engine_bail!(
                "readback::vulkan",
                "Cannot copy {:?} texture '{}' into a {:?} staging texture",
                source.info.format,
                source.name(),
                dest.info.format
            );
        }

        let layout = source.layout();
        if layout != vk::ImageLayout::TRANSFER_SRC_OPTIMAL && layout != vk::ImageLayout::GENERAL {
            engine_bail!("readback::vulkan", "Texture '{}' is in layout {:?}, not readable by copies", source.name(), layout);
        }

        let block = dest.info.format.block_bytes() as u64;
        let buffer_offset =
            (info.dest_position.y as u64 * dest.row_pitch_in_pixels as u64 + info.dest_position.x as u64) * block;

        let region = vk::BufferImageCopy::default()
            .buffer_offset(buffer_offset)
            .buffer_row_length(dest.row_pitch_in_pixels)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: copy_aspect(source.info.format),
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D {
                x: info.source_position.x as i32,
                y: info.source_position.y as i32,
                z: 0,
            })
            .image_extent(vk::Extent3D {
                width: info.size.x,
                height: info.size.y,
                depth: 1,
            });

        self.record(|device, command_buffer| unsafe {
            device.cmd_copy_image_to_buffer(command_buffer, source.image, layout, dest.buffer, &[region]);
        })
    }

    fn create_fence(&self, name: &str) -> Result<Arc<dyn GpuFence>> {
        let fence = unsafe {
            self.ctx.device.create_fence(&vk::FenceCreateInfo::default(), None)
                .map_err(|e| engine_err!("readback::vulkan", "Failed to create fence '{}': {:?}", name, e))?
        };
        Ok(Arc::new(Fence::new(Arc::clone(&self.ctx), fence, name.to_string())))
    }

    fn write_fence(&self, fence: &dyn GpuFence) -> Result<()> {
        let fence = as_fence(fence)?;
        let mut commands = self.lock_commands()?;
        let mut submitted = fence.submitted.lock()
            .map_err(|_| engine_err!("readback::vulkan", "Fence '{}' lock poisoned", fence.name()))?;
        if submitted.is_some() {
            engine_bail!("readback::vulkan", "Fence '{}' was already written", fence.name());
        }

        unsafe {
            let device = &self.ctx.device;
            match commands.pending.take() {
                Some(command_buffer) => {
                    let result = device.end_command_buffer(command_buffer)
                        .map_err(|e| engine_err!("readback::vulkan", "Failed to end command buffer: {:?}", e))
                        .and_then(|_| {
                            let command_buffers = [command_buffer];
                            let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
                            device.queue_submit(self.ctx.graphics_queue, &[submit_info], fence.fence)
                                .map_err(|e| engine_err!("readback::vulkan", "Failed to submit readback commands: {:?}", e))
                        });
                    if let Err(e) = result {
                        device.free_command_buffers(commands.pool, &[command_buffer]);
                        return Err(e);
                    }
                    *submitted = Some(command_buffer);
                }
                None => {
                    // Empty submission: signals once earlier work retires
                    device.queue_submit(self.ctx.graphics_queue, &[], fence.fence)
                        .map_err(|e| engine_err!("readback::vulkan", "Failed to submit fence '{}': {:?}", fence.name(), e))?;
                    *submitted = Some(vk::CommandBuffer::null());
                }
            }
        }

        engine_trace!("readback::vulkan", "Submitted fence '{}'", fence.name());
        Ok(())
    }

    fn abandon_recorded(&self) -> Result<()> {
        let mut commands = self.lock_commands()?;
        let Some(command_buffer) = commands.pending.take() else {
            return Ok(());
        };

        // Executed rather than dropped: the barriers already moved tracked layouts
        let result = unsafe {
            let device = &self.ctx.device;
            device.end_command_buffer(command_buffer)
                .map_err(|e| engine_err!("readback::vulkan", "Failed to end abandoned commands: {:?}", e))
                .and_then(|_| {
                    let command_buffers = [command_buffer];
                    let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
                    device.queue_submit(self.ctx.graphics_queue, &[submit_info], vk::Fence::null())
                        .map_err(|e| engine_err!("readback::vulkan", "Failed to submit abandoned commands: {:?}", e))
                })
                .and_then(|_| {
                    device.queue_wait_idle(self.ctx.graphics_queue)
                        .map_err(|e| engine_err!("readback::vulkan", "Failed to wait for abandoned commands: {:?}", e))
                })
        };

        unsafe {
            if result.is_err() {
                self.ctx.device.device_wait_idle().ok();
            }
            self.ctx.device.free_command_buffers(commands.pool, &[command_buffer]);
        }

        engine_debug!("readback::vulkan", "Retired abandoned readback commands");
        result
    }

    fn poll_fence(&self, fence: &dyn GpuFence) -> bool {
        let fence = match as_fence(fence) {
            Ok(fence) => fence,
            Err(e) => {
                engine_error!("readback::vulkan", "Cannot poll fence: {}", e);
                return false;
            }
        };
        if !fence.is_submitted() {
            return false;
        }
        match unsafe { self.ctx.device.get_fence_status(fence.fence) } {
            Ok(signaled) => signaled,
            Err(e) => {
                engine_error!("readback::vulkan", "Failed to query fence '{}': {:?}", fence.name(), e);
                false
            }
        }
    }

    fn map_staging_surface<'a>(
        &self,
        staging: &'a dyn ReadbackTexture,
        fence: &dyn GpuFence,
        mode: MapMode,
    ) -> Result<MappedSurface<'a>> {
        let staging = as_staging(staging)?;
        let fence = as_fence(fence)?;
        if !fence.is_submitted() {
            return Err(Error::InvalidResource(format!("fence '{}' was never written", fence.name())));
        }

        unsafe {
            match mode {
                MapMode::Poll => {
                    let signaled = self.ctx.device.get_fence_status(fence.fence)
                        .map_err(|e| engine_err!("readback::vulkan", "Failed to query fence '{}': {:?}", fence.name(), e))?;
                    if !signaled {
                        return Err(Error::FenceNotSignaled(fence.name().to_string()));
                    }
                }
                MapMode::Flush => {
                    self.ctx.device.wait_for_fences(&[fence.fence], true, u64::MAX)
                        .map_err(|e| engine_err!("readback::vulkan", "Failed to wait for fence '{}': {:?}", fence.name(), e))?;
                }
            }
        }

        if !staging.begin_map() {
            engine_bail!("readback::vulkan", "Staging texture is already mapped");
        }
        let data = match staging.read_mapped() {
            Ok(data) => data,
            Err(e) => {
                staging.end_map();
                return Err(e);
            }
        };

        Ok(MappedSurface {
            data: Cow::Borrowed(data),
            row_pitch_in_pixels: staging.row_pitch_in_pixels(),
            height: staging.info.height,
        })
    }

    fn unmap_staging_surface(&self, staging: &dyn ReadbackTexture) -> Result<()> {
        let staging = as_staging(staging)?;
        if !staging.end_map() {
            engine_bail!("readback::vulkan", "Staging texture is not mapped");
        }
        Ok(())
    }
}

impl Drop for VulkanReadbackDevice {
    fn drop(&mut self) {
        unsafe {
            // Wait for device to finish
            self.ctx.device.device_wait_idle().ok();

            // Recorded work nobody fenced is dropped
            if let Ok(mut commands) = self.ctx.commands.lock() {
                if let Some(command_buffer) = commands.pending.take() {
                    self.ctx.device.free_command_buffers(commands.pool, &[command_buffer]);
                }
            }
        }

        // Device and instance go with the last GpuContext owner
        engine_debug!("readback::vulkan", "Vulkan readback device '{}' released", self.device_name);
    }
}
